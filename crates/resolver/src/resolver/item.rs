//! Item scenarios: macros in item keys and item names.
//!
//! Key macros only count inside key parameters. Names read `$1`..`$9`
//! from the parameters of the expanded key.

use std::collections::{BTreeSet, HashMap};

use confmacro_core::{HostId, HostRecord, InterfaceRecord, ItemHost, ItemId, ResolveError};
use indexmap::IndexMap;

use super::MacroResolver;
use crate::functions::reference_value;
use crate::patterns::{MacroFamily, MacroOccurrence};
use crate::planner;
use crate::request::ItemRecord;
use crate::scenario::{ItemField, Scenario, Strategy};
use crate::store::or_empty;
use crate::substitute::{substitute, ResolvedMap};
use crate::usermacros::{UserMacroRequest, UserMacroResolver};

/// An item polled through no particular interface.
fn no_interface(interface_id: &str) -> bool {
    matches!(interface_id, "" | "0")
}

impl MacroResolver {
    pub(super) async fn resolve_item_field(
        &self,
        scenario: Scenario,
        mut items: IndexMap<String, ItemRecord>,
    ) -> Result<IndexMap<String, ItemRecord>, ResolveError> {
        let config = scenario.config();
        let Strategy::Item { field } = config.strategy else {
            return Err(ResolveError::InputMismatch {
                scenario: scenario.name().to_string(),
                expected: config.strategy.input_kind(),
            });
        };
        tracing::debug!(scenario = %scenario, items = items.len(), "Resolving item macros");

        let mut users = UserMacroResolver::new(self.store.as_ref(), &self.config);
        match field {
            ItemField::Key => {
                let keys = self.expand_item_keys(&items, &mut users).await?;
                for (key, item) in items.iter_mut() {
                    if let Some(expanded) = keys.get(key) {
                        item.key = expanded.clone();
                    }
                }
            }
            ItemField::Name => self.expand_item_names(&mut items, &mut users).await?,
        }
        Ok(items)
    }

    /// Expanded key of every item whose key parameters carry macros.
    /// Items without any are absent.
    async fn expand_item_keys(
        &self,
        items: &IndexMap<String, ItemRecord>,
        users: &mut UserMacroResolver<'_>,
    ) -> Result<HashMap<String, String>, ResolveError> {
        let matcher = &Scenario::ItemKey.config().matcher;
        let marker = self.config.unresolved_marker.as_str();

        let mut values: HashMap<String, ResolvedMap> = HashMap::new();
        let mut pending: Vec<(ItemId, MacroOccurrence, String)> = Vec::new();
        let mut item_ids = BTreeSet::new();
        let mut wants_interfaces = false;
        let mut user_requests: IndexMap<String, UserMacroRequest> = IndexMap::new();

        for (key, item) in items {
            let Some(params) = self.key_params.item_key_params(&item.key) else {
                continue;
            };
            let occurrences = matcher.occurrences(params.iter().map(String::as_str));
            if occurrences.is_empty() {
                continue;
            }
            let map = values.entry(key.clone()).or_default();
            let mut user_tokens = BTreeSet::new();
            for occ in occurrences {
                match occ.family {
                    MacroFamily::Host | MacroFamily::Interface => {
                        wants_interfaces |= occ.family == MacroFamily::Interface;
                        map.insert_unresolved(occ.token.clone(), marker);
                        item_ids.insert(item.item_id.clone());
                        pending.push((item.item_id.clone(), occ, key.clone()));
                    }
                    MacroFamily::User => {
                        user_tokens.insert(occ.token);
                    }
                    _ => {}
                }
            }
            if !user_tokens.is_empty() {
                user_requests.insert(
                    key.clone(),
                    UserMacroRequest {
                        host_ids: vec![item.host_id.clone()],
                        tokens: user_tokens,
                    },
                );
            }
        }

        let item_hosts = self.item_hosts(&item_ids).await;
        let interfaces = if wants_interfaces {
            self.item_interfaces(&item_hosts, users).await?
        } else {
            HashMap::new()
        };

        for (item_id, occ, key) in pending {
            let value = match occ.family {
                MacroFamily::Host => item_hosts.get(&item_id).and_then(|h| {
                    let host = HostRecord {
                        host_id: h.host_id.clone(),
                        host: h.host.clone(),
                        name: h.name.clone(),
                    };
                    planner::host_macro_value(&occ.base, &host)
                }),
                MacroFamily::Interface => interfaces
                    .get(&item_id)
                    .and_then(|i| planner::interface_macro_value(&occ.base, i)),
                _ => None,
            };
            if let (Some(value), Some(map)) = (value, values.get_mut(&key)) {
                map.insert(occ.token, value);
            }
        }

        if !user_requests.is_empty() {
            for (key, resolved) in users.resolve(user_requests).await {
                values.entry(key).or_default().extend(resolved);
            }
        }

        Ok(values
            .into_iter()
            .filter_map(|(key, map)| {
                let item = items.get(&key)?;
                let expanded = self
                    .key_params
                    .rewrite_item_key(&item.key, &|p: &str| substitute(p, matcher, &map));
                Some((key, expanded))
            })
            .collect())
    }

    async fn expand_item_names(
        &self,
        items: &mut IndexMap<String, ItemRecord>,
        users: &mut UserMacroResolver<'_>,
    ) -> Result<(), ResolveError> {
        let matcher = &Scenario::ItemName.config().matcher;

        let mut references: Vec<(String, String)> = Vec::new();
        let mut unexpanded: IndexMap<String, ItemRecord> = IndexMap::new();
        let mut user_requests: IndexMap<String, UserMacroRequest> = IndexMap::new();

        for (key, item) in items.iter() {
            let mut user_tokens = BTreeSet::new();
            for occ in matcher.occurrences([item.name.as_str()]) {
                match occ.family {
                    MacroFamily::Reference => {
                        if item.key_expanded.is_none() && !unexpanded.contains_key(key) {
                            unexpanded.insert(key.clone(), item.clone());
                        }
                        references.push((key.clone(), occ.token));
                    }
                    MacroFamily::User => {
                        user_tokens.insert(occ.token);
                    }
                    _ => {}
                }
            }
            if !user_tokens.is_empty() {
                user_requests.insert(
                    key.clone(),
                    UserMacroRequest {
                        host_ids: vec![item.host_id.clone()],
                        tokens: user_tokens,
                    },
                );
            }
        }
        if references.is_empty() && user_requests.is_empty() {
            return Ok(());
        }

        let expanded_keys = if unexpanded.is_empty() {
            HashMap::new()
        } else {
            self.expand_item_keys(&unexpanded, users).await?
        };

        let mut values: HashMap<String, ResolvedMap> = HashMap::new();
        let mut params: HashMap<String, Vec<String>> = HashMap::new();
        for (key, token) in references {
            let Some(item) = items.get(&key) else {
                continue;
            };
            let key_params = params.entry(key.clone()).or_insert_with(|| {
                let expanded = item
                    .key_expanded
                    .as_deref()
                    .or_else(|| expanded_keys.get(&key).map(String::as_str))
                    .unwrap_or(item.key.as_str());
                self.key_params.item_key_params(expanded).unwrap_or_default()
            });
            let value = reference_value(key_params, &token);
            values.entry(key).or_default().insert(token, value);
        }

        if !user_requests.is_empty() {
            for (key, resolved) in users.resolve(user_requests).await {
                values.entry(key).or_default().extend(resolved);
            }
        }

        for (key, item) in items.iter_mut() {
            if let Some(map) = values.get(key) {
                item.name = substitute(&item.name, matcher, map);
            }
        }
        Ok(())
    }

    async fn item_hosts(&self, item_ids: &BTreeSet<ItemId>) -> HashMap<ItemId, ItemHost> {
        if item_ids.is_empty() {
            return HashMap::new();
        }
        let ids: Vec<ItemId> = item_ids.iter().cloned().collect();
        tracing::debug!(items = ids.len(), "Fetching item hosts");
        or_empty(self.store.item_hosts(&ids).await, "item_hosts")
            .into_iter()
            .map(|h| (h.item_id.clone(), h))
            .collect()
    }

    /// Interface per item: its own interface when set and known, otherwise
    /// the host's highest-priority primary interface. Addresses are expanded
    /// with the request's user macro resolver.
    async fn item_interfaces(
        &self,
        item_hosts: &HashMap<ItemId, ItemHost>,
        users: &mut UserMacroResolver<'_>,
    ) -> Result<HashMap<ItemId, InterfaceRecord>, ResolveError> {
        let host_ids: Vec<HostId> = item_hosts
            .values()
            .map(|h| h.host_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if host_ids.is_empty() {
            return Ok(HashMap::new());
        }
        tracing::debug!(hosts = host_ids.len(), "Fetching host interfaces");
        let rows = or_empty(self.store.host_interfaces(&host_ids).await, "host_interfaces");

        let mut by_id: HashMap<String, InterfaceRecord> = HashMap::new();
        let mut main_rows = Vec::new();
        for row in rows {
            if row.main {
                main_rows.push((row.host_id.clone(), row.clone()));
            }
            if !no_interface(&row.interface_id) {
                by_id.insert(row.interface_id.clone(), row);
            }
        }
        let primary = planner::pick_by_priority(main_rows);

        let selected: HashMap<ItemId, InterfaceRecord> = item_hosts
            .values()
            .filter_map(|h| {
                let own = (!no_interface(&h.interface_id))
                    .then(|| by_id.get(&h.interface_id))
                    .flatten();
                let iface = own.or_else(|| primary.get(&h.host_id))?;
                Some((h.item_id.clone(), iface.clone()))
            })
            .collect();
        self.expand_interface_fields(selected, 0, users).await
    }
}
