//! Batch lookups: one collaborator call per family per request, scoped to
//! the ids actually referenced.
//!
//! Ids the store does not return are simply absent from the result maps;
//! callers treat absence as unresolved.

use std::collections::{BTreeSet, HashMap};

use confmacro_core::{FunctionId, HostId, HostRecord, InterfaceRecord, InterfaceType};

use crate::scenario::InterfaceMode;
use crate::store::{or_empty, ConfigStore};

pub(crate) async fn host_rows(
    store: &dyn ConfigStore,
    host_ids: &BTreeSet<HostId>,
) -> HashMap<HostId, HostRecord> {
    if host_ids.is_empty() {
        return HashMap::new();
    }
    let ids: Vec<HostId> = host_ids.iter().cloned().collect();
    tracing::debug!(hosts = ids.len(), "Fetching hosts");
    or_empty(store.hosts_by_ids(&ids).await, "hosts_by_ids")
        .into_iter()
        .map(|h| (h.host_id.clone(), h))
        .collect()
}

/// Interface per host backing `{HOST.IP}` and friends in text scenarios.
pub(crate) async fn host_interfaces(
    store: &dyn ConfigStore,
    host_ids: &BTreeSet<HostId>,
    mode: Option<InterfaceMode>,
) -> HashMap<HostId, InterfaceRecord> {
    let Some(mode) = mode else {
        return HashMap::new();
    };
    if host_ids.is_empty() {
        return HashMap::new();
    }
    let ids: Vec<HostId> = host_ids.iter().cloned().collect();
    tracing::debug!(hosts = ids.len(), ?mode, "Fetching primary interfaces");
    match mode {
        InterfaceMode::MainAgent => {
            let rows = or_empty(
                store.primary_interfaces(&ids, &[InterfaceType::Agent]).await,
                "primary_interfaces",
            );
            let mut out = HashMap::new();
            for row in rows {
                out.entry(row.host_id.clone()).or_insert(row);
            }
            out
        }
        InterfaceMode::Priority => {
            let rows = or_empty(
                store.primary_interfaces(&ids, &InterfaceType::ALL).await,
                "primary_interfaces",
            );
            pick_by_priority(rows.into_iter().map(|r| (r.host_id.clone(), r)))
        }
    }
}

/// Highest-priority interface per key. On equal priority the first row wins.
pub(crate) fn pick_by_priority<I>(rows: I) -> HashMap<String, InterfaceRecord>
where
    I: IntoIterator<Item = (String, InterfaceRecord)>,
{
    let mut best: HashMap<String, InterfaceRecord> = HashMap::new();
    for (key, row) in rows {
        match best.get(&key) {
            Some(current) if current.kind.priority() >= row.kind.priority() => {}
            _ => {
                best.insert(key, row);
            }
        }
    }
    best
}

/// Interface per trigger function, by priority.
pub(crate) async fn function_interfaces(
    store: &dyn ConfigStore,
    function_ids: &BTreeSet<FunctionId>,
) -> HashMap<FunctionId, InterfaceRecord> {
    if function_ids.is_empty() {
        return HashMap::new();
    }
    let ids: Vec<FunctionId> = function_ids.iter().cloned().collect();
    tracing::debug!(functions = ids.len(), "Fetching function interfaces");
    let rows = or_empty(store.function_interfaces(&ids).await, "function_interfaces");
    pick_by_priority(rows.into_iter().map(|r| (r.function_id, r.interface)))
}

pub(crate) fn host_macro_value(base: &str, host: &HostRecord) -> Option<String> {
    match base {
        "HOSTNAME" | "HOST.HOST" => Some(host.host.clone()),
        "HOST.NAME" => Some(host.name.clone()),
        "HOST.ID" => Some(host.host_id.clone()),
        _ => None,
    }
}

pub(crate) fn interface_macro_value(base: &str, iface: &InterfaceRecord) -> Option<String> {
    match base {
        "IPADDRESS" | "HOST.IP" => Some(iface.ip.clone()),
        "HOST.DNS" => Some(iface.dns.clone()),
        "HOST.CONN" => Some(iface.connection().to_string()),
        "HOST.PORT" => Some(iface.port.clone()),
        _ => None,
    }
}
