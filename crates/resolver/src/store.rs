//! Collaborator traits for configuration and history lookups.
//!
//! The resolver only depends on these traits. Every method is a batch
//! lookup keyed by identifiers collected from the whole request, so a
//! resolution call issues a bounded number of queries regardless of how
//! many texts it carries. Implementations must apply the caller's
//! permission filter themselves; rows the caller cannot see are simply
//! absent from the result.

use std::collections::HashMap;

use confmacro_core::{
    AggregateFunction, FunctionHost, FunctionId, FunctionInterface, FunctionItem, HostId,
    HostMacroSet, HostRecord, InterfaceRecord, InterfaceType, ItemHost, ItemId, ItemMeta,
    ItemSample, MacroDefinition, StoreError, TriggerId,
};
use serde::{Deserialize, Serialize};

use crate::format::format_history_value;

/// Technical host name plus item key, as written in a functional macro.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostKey {
    pub host: String,
    pub key: String,
}

impl HostKey {
    pub fn new(host: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
        }
    }
}

/// Configuration lookups: hosts, interfaces, trigger functions, items, macros.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    async fn hosts_by_ids(&self, host_ids: &[HostId]) -> Result<Vec<HostRecord>, StoreError>;

    /// Primary (`main`) interfaces of the given types for each host.
    async fn primary_interfaces(
        &self,
        host_ids: &[HostId],
        types: &[InterfaceType],
    ) -> Result<Vec<InterfaceRecord>, StoreError>;

    async fn function_hosts(
        &self,
        function_ids: &[FunctionId],
    ) -> Result<Vec<FunctionHost>, StoreError>;

    /// Primary interfaces of each function's host, one row per interface.
    async fn function_interfaces(
        &self,
        function_ids: &[FunctionId],
    ) -> Result<Vec<FunctionInterface>, StoreError>;

    async fn function_items(
        &self,
        function_ids: &[FunctionId],
    ) -> Result<Vec<FunctionItem>, StoreError>;

    /// Hosts whose items feed each trigger.
    async fn trigger_host_ids(
        &self,
        trigger_ids: &[TriggerId],
    ) -> Result<HashMap<TriggerId, Vec<HostId>>, StoreError>;

    /// Macros and template links of hosts or templates. Unknown ids are absent.
    async fn host_macros(
        &self,
        host_ids: &[HostId],
    ) -> Result<HashMap<HostId, HostMacroSet>, StoreError>;

    async fn global_macros(&self) -> Result<Vec<MacroDefinition>, StoreError>;

    /// Items visible to the caller matching any of the host/key pairs.
    async fn items_by_host_keys(&self, pairs: &[HostKey]) -> Result<Vec<ItemMeta>, StoreError>;

    /// Items joined to their hosts. Web items are included.
    async fn item_hosts(&self, item_ids: &[ItemId]) -> Result<Vec<ItemHost>, StoreError>;

    /// Every interface of the given hosts, primary or not.
    async fn host_interfaces(&self, host_ids: &[HostId]) -> Result<Vec<InterfaceRecord>, StoreError>;
}

/// History lookups and value formatting.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recent sample of each item. Items without history are absent.
    async fn last_values(
        &self,
        item_ids: &[ItemId],
    ) -> Result<HashMap<ItemId, ItemSample>, StoreError>;

    /// The sample current at `clock`/`ns`: the latest one not after it.
    async fn value_at(
        &self,
        item: &ItemMeta,
        clock: i64,
        ns: i64,
    ) -> Result<Option<ItemSample>, StoreError>;

    /// Aggregate over the trailing `period_secs`. `None` when no samples fall in the window.
    async fn aggregate(
        &self,
        item: &ItemMeta,
        function: AggregateFunction,
        period_secs: i64,
    ) -> Result<Option<String>, StoreError>;

    fn format_value(&self, raw: &str, item: &ItemMeta, trim_length: usize) -> String {
        format_history_value(raw, item, trim_length)
    }
}

/// Item key and trigger function parameter grammar.
///
/// Macros in item keys and function parameters only count inside
/// parameters, and a substituted value may need quoting to stay a single
/// parameter. Both concerns belong to the key parser the caller already
/// has; the resolver reaches it through this trait.
pub trait KeyParams: Send + Sync {
    /// Parameters of an item key, arrays flattened and quotes removed.
    /// `None` when the key does not parse.
    fn item_key_params(&self, key: &str) -> Option<Vec<String>>;

    /// Rewrite every item key parameter through `rewrite`, quoting the
    /// result where needed. A key that does not parse comes back unchanged.
    fn rewrite_item_key(&self, key: &str, rewrite: &dyn Fn(&str) -> String) -> String;

    /// Parameters of a trigger function's parameter list, quotes removed.
    fn function_params(&self, parameter: &str) -> Option<Vec<String>>;

    /// Rewrite every function parameter through `rewrite`, quoting the
    /// result where needed.
    fn rewrite_function_params(&self, parameter: &str, rewrite: &dyn Fn(&str) -> String) -> String;
}

/// Fail open: a failed lookup is logged and treated as "no rows".
pub(crate) fn or_empty<T: Default>(result: Result<T, StoreError>, lookup: &'static str) -> T {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(lookup, error = %e, "Store lookup failed, treating as empty");
            T::default()
        }
    }
}
