//! Functional item macros in graph names: `{host:key.func(period)}`.
//!
//! The host part may be a positional `{HOST.HOST<n>}` referring to the
//! n-th graph item. Unknown positions, unknown or hidden host/key pairs and
//! items without data all resolve to the unresolved marker.

use std::collections::{BTreeSet, HashMap};

use confmacro_core::{AggregateFunction, ItemId, ItemMeta, ResolverConfig};
use futures::future::join_all;
use indexmap::IndexMap;

use crate::patterns::{MacroFamily, FUNCTIONAL_PARTS};
use crate::request::GraphRecord;
use crate::scenario::ScenarioConfig;
use crate::store::{or_empty, ConfigStore, HistoryStore, HostKey};
use crate::substitute::{substitute, ResolvedMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionalMacro {
    pub token: String,
    /// `None` when a positional host points past the graph's items.
    pub host_key: Option<HostKey>,
    pub function: AggregateFunction,
    pub period: String,
}

/// Parse one functional macro token against the graph's items.
pub fn parse_functional(token: &str, graph: &GraphRecord) -> Option<FunctionalMacro> {
    let caps = FUNCTIONAL_PARTS.captures(token)?;
    let host = &caps["host"];
    let host = if host.starts_with('{') {
        let position = caps
            .name("pos")
            .map(|m| m.as_str())
            .filter(|p| !p.is_empty())
            .and_then(|p| p.parse::<usize>().ok())
            .unwrap_or(1);
        graph.items.get(position - 1).map(|item| item.host.clone())
    } else {
        Some(host.to_string())
    };
    Some(FunctionalMacro {
        token: token.to_string(),
        host_key: host.map(|h| HostKey::new(h, &caps["key"])),
        function: AggregateFunction::parse(&caps["func"])?,
        period: caps["param"].to_string(),
    })
}

/// Seconds in a period such as `300`, `5m` or `1w`.
pub fn parse_period(period: &str) -> Option<i64> {
    let split = period
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(period.len());
    let (digits, unit) = period.split_at(split);
    let n: i64 = digits.parse().ok()?;
    let mult = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        _ => return None,
    };
    n.checked_mul(mult)
}

pub(crate) async fn resolve_graph_names(
    store: &dyn ConfigStore,
    history: &dyn HistoryStore,
    config: &ResolverConfig,
    scenario: &ScenarioConfig,
    mut graphs: IndexMap<String, GraphRecord>,
) -> IndexMap<String, GraphRecord> {
    let matcher = &scenario.matcher;
    let marker = config.unresolved_marker.as_str();

    let mut values: HashMap<String, ResolvedMap> = HashMap::new();
    let mut pending: Vec<(String, FunctionalMacro)> = Vec::new();
    let mut pairs: BTreeSet<HostKey> = BTreeSet::new();

    for (graph_id, graph) in &graphs {
        let tokens = matcher.find(MacroFamily::Functional, [graph.name.as_str()]);
        if tokens.is_empty() {
            continue;
        }
        let map = values.entry(graph_id.clone()).or_default();
        for token in tokens {
            map.insert_unresolved(token.clone(), marker);
            let Some(parsed) = parse_functional(&token, graph) else {
                continue;
            };
            if let Some(pair) = &parsed.host_key {
                pairs.insert(pair.clone());
                pending.push((graph_id.clone(), parsed));
            }
        }
    }
    tracing::debug!(graphs = graphs.len(), macros = pending.len(), "Resolving graph names");

    let items: HashMap<HostKey, ItemMeta> = if pairs.is_empty() {
        HashMap::new()
    } else {
        let pairs: Vec<HostKey> = pairs.into_iter().collect();
        let mut by_pair = HashMap::new();
        for item in or_empty(store.items_by_host_keys(&pairs).await, "items_by_host_keys") {
            by_pair
                .entry(HostKey::new(item.host.clone(), item.key.clone()))
                .or_insert(item);
        }
        by_pair
    };

    // Latest values in one batch; aggregates one lookup per distinct window.
    let mut last_ids: BTreeSet<ItemId> = BTreeSet::new();
    let mut windows: Vec<(ItemId, AggregateFunction, i64)> = Vec::new();
    for (_, m) in &pending {
        let Some(item) = m.host_key.as_ref().and_then(|k| items.get(k)) else {
            continue;
        };
        match m.function {
            AggregateFunction::Last => {
                last_ids.insert(item.item_id.clone());
            }
            function => {
                if let Some(secs) = parse_period(&m.period) {
                    let window = (item.item_id.clone(), function, secs);
                    if !windows.contains(&window) {
                        windows.push(window);
                    }
                }
            }
        }
    }

    let last = if last_ids.is_empty() {
        HashMap::new()
    } else {
        let ids: Vec<ItemId> = last_ids.into_iter().collect();
        or_empty(history.last_values(&ids).await, "last_values")
    };

    let metas: HashMap<&str, &ItemMeta> =
        items.values().map(|i| (i.item_id.as_str(), i)).collect();
    let lookups = windows.iter().filter_map(|(id, function, secs)| {
        let meta = metas.get(id.as_str())?;
        Some(history.aggregate(meta, *function, *secs))
    });
    let aggregated: HashMap<(ItemId, AggregateFunction, i64), String> = windows
        .iter()
        .filter(|(id, _, _)| metas.contains_key(id.as_str()))
        .cloned()
        .zip(join_all(lookups).await)
        .filter_map(|(window, result)| or_empty(result, "aggregate").map(|v| (window, v)))
        .collect();

    for (graph_id, m) in &pending {
        let Some(item) = m.host_key.as_ref().and_then(|k| items.get(k)) else {
            continue;
        };
        let raw = match m.function {
            AggregateFunction::Last => last.get(&item.item_id).map(|s| s.value.clone()),
            function => parse_period(&m.period).and_then(|secs| {
                aggregated
                    .get(&(item.item_id.clone(), function, secs))
                    .cloned()
            }),
        };
        if let (Some(raw), Some(map)) = (raw, values.get_mut(graph_id)) {
            map.insert(
                m.token.clone(),
                history.format_value(&raw, item, config.trim_length),
            );
        }
    }

    for (graph_id, graph) in graphs.iter_mut() {
        if let Some(map) = values.get(graph_id) {
            graph.name = substitute(&graph.name, matcher, map);
        }
    }
    graphs
}
