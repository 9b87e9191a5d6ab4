//! In-memory collaborator backed by a [`Snapshot`].
//!
//! Implements [`ConfigStore`], [`HistoryStore`] and [`KeyParams`]. Every
//! store call is
//! recorded so tests can assert how many lookups a resolution issued and
//! with which ids.

mod keys;
mod snapshot;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use confmacro_core::{
    AggregateFunction, FunctionHost, FunctionId, FunctionInterface, FunctionItem, HostId,
    HostMacroSet, HostRecord, InterfaceRecord, InterfaceType, ItemHost, ItemId, ItemMeta, ItemSample,
    MacroDefinition, StoreError, TriggerId,
};

use crate::store::{ConfigStore, HistoryStore, HostKey, KeyParams};

pub use snapshot::{Snapshot, SnapshotFunction, SnapshotHost, SnapshotItem, SnapshotTrigger};

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub method: &'static str,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone)]
struct FunctionRef {
    trigger_id: TriggerId,
    item_id: ItemId,
}

pub struct MemoryStore {
    snapshot: Snapshot,
    hosts: HashMap<HostId, usize>,
    items: HashMap<ItemId, usize>,
    functions: HashMap<FunctionId, FunctionRef>,
    calls: Mutex<Vec<StoreCall>>,
}

impl MemoryStore {
    pub fn new(snapshot: Snapshot) -> Self {
        let hosts = snapshot
            .hosts
            .iter()
            .enumerate()
            .map(|(i, h)| (h.id.clone(), i))
            .collect();
        let items = snapshot
            .items
            .iter()
            .enumerate()
            .map(|(i, it)| (it.id.clone(), i))
            .collect();
        let functions = snapshot
            .triggers
            .iter()
            .flat_map(|t| {
                t.functions.iter().map(|f| {
                    (
                        f.id.clone(),
                        FunctionRef {
                            trigger_id: t.id.clone(),
                            item_id: f.item_id.clone(),
                        },
                    )
                })
            })
            .collect();
        Self {
            snapshot,
            hosts,
            items,
            functions,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, StoreError> {
        Snapshot::from_yaml_str(yaml).map(Self::new)
    }

    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let snapshot = Snapshot::from_path(path)?;
        tracing::info!(
            path = %path.display(),
            hosts = snapshot.hosts.len(),
            items = snapshot.items.len(),
            triggers = snapshot.triggers.len(),
            "Loaded snapshot"
        );
        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record<S: ToString>(&self, method: &'static str, ids: &[S]) {
        let ids = ids.iter().map(ToString::to_string).collect();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoreCall { method, ids });
    }

    fn now(&self) -> i64 {
        self.snapshot
            .now
            .unwrap_or_else(|| chrono::Utc::now().timestamp())
    }

    fn host(&self, host_id: &str) -> Option<&SnapshotHost> {
        self.hosts.get(host_id).map(|&i| &self.snapshot.hosts[i])
    }

    fn item(&self, item_id: &str) -> Option<&SnapshotItem> {
        self.items.get(item_id).map(|&i| &self.snapshot.items[i])
    }

    fn item_meta(&self, item: &SnapshotItem) -> ItemMeta {
        let host = self
            .host(&item.host_id)
            .map(|h| h.host.clone())
            .unwrap_or_default();
        let value_map = (item.valuemap_id > 0)
            .then(|| {
                self.snapshot
                    .value_maps
                    .iter()
                    .find(|m| m.id == item.valuemap_id)
                    .cloned()
            })
            .flatten();
        ItemMeta {
            item_id: item.id.clone(),
            host,
            key: item.key.clone(),
            name: item.name.clone(),
            value_type: item.value_type,
            units: item.units.clone(),
            valuemap_id: item.valuemap_id,
            value_map,
        }
    }

    /// Trigger and item host behind a function id.
    fn function_item(&self, function_id: &str) -> Option<(&FunctionRef, &SnapshotItem)> {
        let func = self.functions.get(function_id)?;
        let item = self.item(&func.item_id)?;
        Some((func, item))
    }

    fn main_interfaces<'s>(
        &'s self,
        host_id: &'s str,
    ) -> impl Iterator<Item = &'s InterfaceRecord> + 's {
        self.snapshot
            .interfaces
            .iter()
            .filter(move |i| i.main && i.host_id == host_id)
    }

    fn samples(&self, item_id: &str) -> impl Iterator<Item = &ItemSample> {
        let item_id = item_id.to_string();
        self.snapshot
            .history
            .iter()
            .filter(move |s| s.item_id == item_id)
    }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryStore {
    async fn hosts_by_ids(&self, host_ids: &[HostId]) -> Result<Vec<HostRecord>, StoreError> {
        self.record("hosts_by_ids", host_ids);
        Ok(host_ids
            .iter()
            .filter_map(|id| self.host(id))
            .map(|h| HostRecord {
                host_id: h.id.clone(),
                host: h.host.clone(),
                name: h.visible_name().to_string(),
            })
            .collect())
    }

    async fn primary_interfaces(
        &self,
        host_ids: &[HostId],
        types: &[InterfaceType],
    ) -> Result<Vec<InterfaceRecord>, StoreError> {
        self.record("primary_interfaces", host_ids);
        let wanted: HashSet<&str> = host_ids.iter().map(String::as_str).collect();
        Ok(self
            .snapshot
            .interfaces
            .iter()
            .filter(|i| i.main && types.contains(&i.kind) && wanted.contains(i.host_id.as_str()))
            .cloned()
            .collect())
    }

    async fn host_interfaces(
        &self,
        host_ids: &[HostId],
    ) -> Result<Vec<InterfaceRecord>, StoreError> {
        self.record("host_interfaces", host_ids);
        let wanted: HashSet<&str> = host_ids.iter().map(String::as_str).collect();
        Ok(self
            .snapshot
            .interfaces
            .iter()
            .filter(|i| wanted.contains(i.host_id.as_str()))
            .cloned()
            .collect())
    }

    async fn item_hosts(&self, item_ids: &[ItemId]) -> Result<Vec<ItemHost>, StoreError> {
        self.record("item_hosts", item_ids);
        Ok(item_ids
            .iter()
            .filter_map(|id| {
                let item = self.item(id)?;
                let host = self.host(&item.host_id)?;
                Some(ItemHost {
                    item_id: item.id.clone(),
                    host_id: host.id.clone(),
                    host: host.host.clone(),
                    name: host.visible_name().to_string(),
                    interface_id: item.interface_id.clone(),
                })
            })
            .collect())
    }

    async fn function_hosts(
        &self,
        function_ids: &[FunctionId],
    ) -> Result<Vec<FunctionHost>, StoreError> {
        self.record("function_hosts", function_ids);
        Ok(function_ids
            .iter()
            .filter_map(|fid| {
                let (func, item) = self.function_item(fid)?;
                let host = self.host(&item.host_id)?;
                Some(FunctionHost {
                    trigger_id: func.trigger_id.clone(),
                    function_id: fid.clone(),
                    host_id: host.id.clone(),
                    host: host.host.clone(),
                    name: host.visible_name().to_string(),
                })
            })
            .collect())
    }

    async fn function_interfaces(
        &self,
        function_ids: &[FunctionId],
    ) -> Result<Vec<FunctionInterface>, StoreError> {
        self.record("function_interfaces", function_ids);
        let mut rows = Vec::new();
        for fid in function_ids {
            let Some((func, item)) = self.function_item(fid) else {
                continue;
            };
            for iface in self.main_interfaces(&item.host_id) {
                rows.push(FunctionInterface {
                    trigger_id: func.trigger_id.clone(),
                    function_id: fid.clone(),
                    interface: iface.clone(),
                });
            }
        }
        Ok(rows)
    }

    async fn function_items(
        &self,
        function_ids: &[FunctionId],
    ) -> Result<Vec<FunctionItem>, StoreError> {
        self.record("function_items", function_ids);
        Ok(function_ids
            .iter()
            .filter_map(|fid| {
                let (func, item) = self.function_item(fid)?;
                Some(FunctionItem {
                    trigger_id: func.trigger_id.clone(),
                    function_id: fid.clone(),
                    item: self.item_meta(item),
                })
            })
            .collect())
    }

    async fn trigger_host_ids(
        &self,
        trigger_ids: &[TriggerId],
    ) -> Result<HashMap<TriggerId, Vec<HostId>>, StoreError> {
        self.record("trigger_host_ids", trigger_ids);
        let mut out: HashMap<TriggerId, Vec<HostId>> = HashMap::new();
        for trigger in &self.snapshot.triggers {
            if !trigger_ids.contains(&trigger.id) {
                continue;
            }
            let hosts = out.entry(trigger.id.clone()).or_default();
            for f in &trigger.functions {
                if let Some(item) = self.item(&f.item_id) {
                    if !hosts.contains(&item.host_id) {
                        hosts.push(item.host_id.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    async fn host_macros(
        &self,
        host_ids: &[HostId],
    ) -> Result<HashMap<HostId, HostMacroSet>, StoreError> {
        self.record("host_macros", host_ids);
        Ok(host_ids
            .iter()
            .filter_map(|id| self.host(id))
            .map(|h| {
                (
                    h.id.clone(),
                    HostMacroSet {
                        parent_template_ids: h.templates.clone(),
                        macros: h.macros.clone(),
                    },
                )
            })
            .collect())
    }

    async fn global_macros(&self) -> Result<Vec<MacroDefinition>, StoreError> {
        self.record::<&str>("global_macros", &[]);
        Ok(self.snapshot.global_macros.clone())
    }

    async fn items_by_host_keys(&self, pairs: &[HostKey]) -> Result<Vec<ItemMeta>, StoreError> {
        let labels: Vec<String> = pairs.iter().map(|p| format!("{}:{}", p.host, p.key)).collect();
        self.record("items_by_host_keys", &labels);
        Ok(self
            .snapshot
            .items
            .iter()
            .filter(|item| item.web_visible)
            .filter(|item| {
                self.host(&item.host_id).is_some_and(|h| {
                    pairs.iter().any(|p| p.host == h.host && p.key == item.key)
                })
            })
            .map(|item| self.item_meta(item))
            .collect())
    }
}

impl KeyParams for MemoryStore {
    fn item_key_params(&self, key: &str) -> Option<Vec<String>> {
        keys::item_key_params(key)
    }

    fn rewrite_item_key(&self, key: &str, rewrite: &dyn Fn(&str) -> String) -> String {
        keys::rewrite_item_key(key, rewrite)
    }

    fn function_params(&self, parameter: &str) -> Option<Vec<String>> {
        keys::function_params(parameter)
    }

    fn rewrite_function_params(
        &self,
        parameter: &str,
        rewrite: &dyn Fn(&str) -> String,
    ) -> String {
        keys::rewrite_function_params(parameter, rewrite)
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryStore {
    async fn last_values(
        &self,
        item_ids: &[ItemId],
    ) -> Result<HashMap<ItemId, ItemSample>, StoreError> {
        self.record("last_values", item_ids);
        let mut out = HashMap::new();
        for id in item_ids {
            if let Some(latest) = self.samples(id).max_by_key(|s| (s.clock, s.ns)) {
                out.insert(id.clone(), latest.clone());
            }
        }
        Ok(out)
    }

    async fn value_at(
        &self,
        item: &ItemMeta,
        clock: i64,
        ns: i64,
    ) -> Result<Option<ItemSample>, StoreError> {
        self.record("value_at", std::slice::from_ref(&item.item_id));
        Ok(self
            .samples(&item.item_id)
            .filter(|s| (s.clock, s.ns) <= (clock, ns))
            .max_by_key(|s| (s.clock, s.ns))
            .cloned())
    }

    async fn aggregate(
        &self,
        item: &ItemMeta,
        function: AggregateFunction,
        period_secs: i64,
    ) -> Result<Option<String>, StoreError> {
        self.record("aggregate", std::slice::from_ref(&item.item_id));
        let now = self.now();
        let window: Vec<(&ItemSample, f64)> = self
            .samples(&item.item_id)
            .filter(|s| s.clock > now - period_secs && s.clock <= now)
            .filter_map(|s| s.value.trim().parse::<f64>().ok().map(|v| (s, v)))
            .collect();
        if window.is_empty() {
            return Ok(None);
        }

        let values = window.iter().map(|(_, v)| *v);
        let result = match function {
            AggregateFunction::Last => window
                .iter()
                .max_by_key(|(s, _)| (s.clock, s.ns))
                .map(|(_, v)| *v),
            AggregateFunction::Min => values.reduce(f64::min),
            AggregateFunction::Max => values.reduce(f64::max),
            AggregateFunction::Avg => Some(values.sum::<f64>() / window.len() as f64),
        };
        Ok(result.map(|v| v.to_string()))
    }
}
