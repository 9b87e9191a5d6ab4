//! Text scenarios: free texts keyed by host id.

use std::collections::{BTreeSet, HashMap};

use confmacro_core::{HostId, InterfaceRecord, ResolveError};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;

use super::MacroResolver;
use crate::patterns::{MacroFamily, MacroOccurrence};
use crate::planner;
use crate::scenario::{Scenario, Strategy};
use crate::substitute::{substitute, ResolvedMap};
use crate::usermacros::{UserMacroRequest, UserMacroResolver};

/// Scenario used to expand macros inside interface addresses.
const INTERFACE_FIELD_SCENARIO: Scenario = Scenario::HostInterfaceIpDnsAgentPrimary;

impl MacroResolver {
    /// Text strategy at nesting `depth` (0 for the outer call). Nested
    /// calls share the caller's `users` so host macro sets and the global
    /// table are fetched once per request.
    pub(super) fn resolve_texts_at<'a, 'b: 'a>(
        &'a self,
        scenario: Scenario,
        data: IndexMap<HostId, Vec<String>>,
        depth: usize,
        users: &'a mut UserMacroResolver<'b>,
    ) -> BoxFuture<'a, Result<IndexMap<HostId, Vec<String>>, ResolveError>> {
        async move {
            let config = scenario.config();
            let Strategy::Text { interfaces } = config.strategy else {
                return Err(ResolveError::InputMismatch {
                    scenario: scenario.name().to_string(),
                    expected: config.strategy.input_kind(),
                });
            };
            if depth >= self.config.max_nesting_depth {
                return Err(ResolveError::NestingTooDeep { depth });
            }
            let matcher = &config.matcher;
            let marker = self.config.unresolved_marker.as_str();

            tracing::debug!(scenario = %scenario, hosts = data.len(), depth, "Resolving texts");

            let mut values: HashMap<HostId, ResolvedMap> = HashMap::new();
            let mut pending: Vec<(HostId, MacroOccurrence)> = Vec::new();
            let mut host_ids = BTreeSet::new();
            let mut interface_host_ids = BTreeSet::new();
            let mut user_requests: IndexMap<HostId, UserMacroRequest> = IndexMap::new();

            for (host_id, texts) in &data {
                let occurrences = matcher.occurrences(texts.iter().map(String::as_str));
                if occurrences.is_empty() {
                    continue;
                }
                let map = values.entry(host_id.clone()).or_default();
                let mut user_tokens = BTreeSet::new();
                for occ in occurrences {
                    match occ.family {
                        MacroFamily::Host => {
                            map.insert_unresolved(occ.token.clone(), marker);
                            host_ids.insert(host_id.clone());
                            pending.push((host_id.clone(), occ));
                        }
                        MacroFamily::HostId => map.insert(occ.token, host_id.clone()),
                        MacroFamily::Interface => {
                            map.insert_unresolved(occ.token.clone(), marker);
                            interface_host_ids.insert(host_id.clone());
                            pending.push((host_id.clone(), occ));
                        }
                        MacroFamily::User => {
                            user_tokens.insert(occ.token);
                        }
                        _ => {}
                    }
                }
                if !user_tokens.is_empty() {
                    user_requests.insert(
                        host_id.clone(),
                        UserMacroRequest {
                            host_ids: vec![host_id.clone()],
                            tokens: user_tokens,
                        },
                    );
                }
            }

            let store = self.store.as_ref();
            let (hosts, interfaces) = tokio::join!(
                planner::host_rows(store, &host_ids),
                planner::host_interfaces(store, &interface_host_ids, interfaces),
            );
            let interfaces = self
                .expand_interface_fields(interfaces, depth, &mut *users)
                .await?;

            for (host_id, occ) in pending {
                let value = match occ.family {
                    MacroFamily::Host => hosts
                        .get(&host_id)
                        .and_then(|h| planner::host_macro_value(&occ.base, h)),
                    MacroFamily::Interface => interfaces
                        .get(&host_id)
                        .and_then(|i| planner::interface_macro_value(&occ.base, i)),
                    _ => None,
                };
                if let (Some(value), Some(map)) = (value, values.get_mut(&host_id)) {
                    map.insert(occ.token, value);
                }
            }

            if !user_requests.is_empty() {
                for (host_id, resolved) in users.resolve(user_requests).await {
                    values.entry(host_id).or_default().extend(resolved);
                }
            }

            Ok(data
                .into_iter()
                .map(|(host_id, texts)| {
                    let texts = match values.get(&host_id) {
                        Some(map) => texts.iter().map(|t| substitute(t, matcher, map)).collect(),
                        None => texts,
                    };
                    (host_id, texts)
                })
                .collect())
        }
        .boxed()
    }

    /// Expand host and user macros inside interface `ip`/`dns` fields with
    /// one nested text resolution covering every affected interface.
    pub(super) async fn expand_interface_fields(
        &self,
        mut interfaces: HashMap<String, InterfaceRecord>,
        depth: usize,
        users: &mut UserMacroResolver<'_>,
    ) -> Result<HashMap<String, InterfaceRecord>, ResolveError> {
        let nested = INTERFACE_FIELD_SCENARIO.config();
        let mut input: IndexMap<HostId, Vec<String>> = IndexMap::new();
        let mut slots: Vec<(String, HostId, usize)> = Vec::new();

        for (key, iface) in &interfaces {
            if !nested
                .matcher
                .has_macros([iface.ip.as_str(), iface.dns.as_str()])
            {
                continue;
            }
            let texts = input.entry(iface.host_id.clone()).or_default();
            slots.push((key.clone(), iface.host_id.clone(), texts.len()));
            texts.push(iface.ip.clone());
            texts.push(iface.dns.clone());
        }
        if slots.is_empty() {
            return Ok(interfaces);
        }
        if depth + 1 >= self.config.max_nesting_depth {
            tracing::warn!(
                depth,
                interfaces = slots.len(),
                "Nesting limit reached, interface addresses left unexpanded"
            );
            return Ok(interfaces);
        }

        tracing::debug!(interfaces = slots.len(), depth = depth + 1, "Expanding interface addresses");
        let resolved = self
            .resolve_texts_at(INTERFACE_FIELD_SCENARIO, input, depth + 1, users)
            .await?;

        for (key, host_id, offset) in slots {
            let (Some(iface), Some(texts)) = (interfaces.get_mut(&key), resolved.get(&host_id)) else {
                continue;
            };
            if let (Some(ip), Some(dns)) = (texts.get(offset), texts.get(offset + 1)) {
                iface.ip = ip.clone();
                iface.dns = dns.clone();
            }
        }
        Ok(interfaces)
    }
}
