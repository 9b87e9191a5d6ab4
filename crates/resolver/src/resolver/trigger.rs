//! Trigger scenarios: one display field per trigger, with indexed macros
//! bound to the functions of the trigger expression.

use std::collections::{BTreeSet, HashMap};

use confmacro_core::{
    FunctionHost, FunctionId, FunctionItem, HostRecord, ItemId, ResolveError, TriggerId, ValueType,
};
use futures::future::join_all;
use indexmap::IndexMap;

use super::MacroResolver;
use crate::functions::{expression_constants, reference_value, FunctionIndex};
use crate::patterns::{MacroFamily, MacroOccurrence};
use crate::planner;
use crate::request::{ResolveOptions, TriggerRecord};
use crate::scenario::{Scenario, Strategy, TriggerField};
use crate::store::or_empty;
use crate::substitute::{substitute, ResolvedMap};
use crate::usermacros::{UserMacroRequest, UserMacroResolver};

/// An indexed macro occurrence bound to the function it refers to.
struct FunctionMacro {
    trigger_id: TriggerId,
    function_id: FunctionId,
    occ: MacroOccurrence,
}

fn field(trigger: &TriggerRecord, field: TriggerField) -> &str {
    match field {
        TriggerField::Description => &trigger.description,
        TriggerField::Comments => &trigger.comments,
        TriggerField::Url => &trigger.url,
        TriggerField::Expression => &trigger.expression,
    }
}

fn field_mut(trigger: &mut TriggerRecord, field: TriggerField) -> &mut String {
    match field {
        TriggerField::Description => &mut trigger.description,
        TriggerField::Comments => &mut trigger.comments,
        TriggerField::Url => &mut trigger.url,
        TriggerField::Expression => &mut trigger.expression,
    }
}

impl MacroResolver {
    pub(super) async fn resolve_trigger_field(
        &self,
        scenario: Scenario,
        mut triggers: IndexMap<TriggerId, TriggerRecord>,
        options: ResolveOptions,
    ) -> Result<IndexMap<TriggerId, TriggerRecord>, ResolveError> {
        let config = scenario.config();
        let Strategy::Trigger {
            field: target,
            event_values,
            expand_expression,
        } = config.strategy
        else {
            return Err(ResolveError::InputMismatch {
                scenario: scenario.name().to_string(),
                expected: config.strategy.input_kind(),
            });
        };
        let matcher = &config.matcher;
        let marker = self.config.unresolved_marker.as_str();
        let references_only = options.references_only && matcher.includes(MacroFamily::Reference);

        tracing::debug!(
            scenario = %scenario,
            triggers = triggers.len(),
            field = target.label(),
            references_only,
            "Resolving trigger macros"
        );

        let store = self.store.as_ref();
        let mut users = UserMacroResolver::new(store, &self.config);
        let expression_user = &Scenario::TriggerExpressionUser.config().matcher;

        // Triggers needing their hosts for user macro lookups.
        let user_trigger_ids: Vec<TriggerId> = triggers
            .iter()
            .filter(|(_, t)| {
                let in_expression =
                    (expand_expression || target == TriggerField::Expression)
                        && expression_user.has_macros([t.expression.as_str()]);
                let in_field = !references_only
                    && matcher.includes(MacroFamily::User)
                    && expression_user.has_macros([field(t, target)]);
                in_expression || in_field
            })
            .map(|(id, _)| id.clone())
            .collect();
        let trigger_hosts = if user_trigger_ids.is_empty() {
            HashMap::new()
        } else {
            or_empty(store.trigger_host_ids(&user_trigger_ids).await, "trigger_host_ids")
        };

        let expressions: HashMap<TriggerId, String> =
            if expand_expression || target == TriggerField::Expression {
                self.expand_expression_user_macros(&mut users, &triggers, &trigger_hosts)
                    .await
            } else {
                HashMap::new()
            };

        if target == TriggerField::Expression {
            for (id, trigger) in triggers.iter_mut() {
                if let Some(expanded) = expressions.get(id) {
                    trigger.expression = expanded.clone();
                }
            }
            return Ok(triggers);
        }

        // ── Discover macros ──
        let mut values: HashMap<TriggerId, ResolvedMap> = HashMap::new();
        let mut bound: Vec<FunctionMacro> = Vec::new();
        let mut user_requests: IndexMap<TriggerId, UserMacroRequest> = IndexMap::new();

        for (trigger_id, trigger) in &triggers {
            let occurrences = matcher.occurrences([field(trigger, target)]);
            if occurrences.is_empty() {
                continue;
            }
            let expression = expressions
                .get(trigger_id)
                .map(String::as_str)
                .unwrap_or(&trigger.expression);
            let index = FunctionIndex::build(expression);
            let mut constants: Option<Vec<String>> = None;
            let mut user_tokens = BTreeSet::new();
            let map = values.entry(trigger_id.clone()).or_default();

            for occ in occurrences {
                match occ.family {
                    MacroFamily::Reference => {
                        let constants =
                            constants.get_or_insert_with(|| expression_constants(expression));
                        let value = reference_value(constants, &occ.token);
                        map.insert(occ.token, value);
                    }
                    _ if references_only => {}
                    MacroFamily::TriggerId => map.insert(occ.token, trigger_id.clone()),
                    MacroFamily::Host
                    | MacroFamily::HostId
                    | MacroFamily::Interface
                    | MacroFamily::InterfacePort
                    | MacroFamily::Item => {
                        map.insert_unresolved(occ.token.clone(), marker);
                        if let Some(function_id) = index.function_id(occ.ordinal) {
                            bound.push(FunctionMacro {
                                trigger_id: trigger_id.clone(),
                                function_id: function_id.clone(),
                                occ,
                            });
                        }
                    }
                    MacroFamily::User => {
                        user_tokens.insert(occ.token);
                    }
                    MacroFamily::Functional => {}
                }
            }

            if !user_tokens.is_empty() {
                user_requests.insert(
                    trigger_id.clone(),
                    UserMacroRequest {
                        host_ids: trigger_hosts.get(trigger_id).cloned().unwrap_or_default(),
                        tokens: user_tokens,
                    },
                );
            }
        }

        // ── Batch lookups ──
        let functions_of = |families: &[MacroFamily]| -> BTreeSet<FunctionId> {
            bound
                .iter()
                .filter(|b| families.contains(&b.occ.family))
                .map(|b| b.function_id.clone())
                .collect()
        };
        let host_fids = functions_of(&[MacroFamily::Host, MacroFamily::HostId]);
        let interface_fids = functions_of(&[MacroFamily::Interface, MacroFamily::InterfacePort]);
        let item_fids = functions_of(&[MacroFamily::Item]);

        let (function_hosts, function_interfaces, function_items) = tokio::join!(
            self.function_hosts(&host_fids),
            planner::function_interfaces(store, &interface_fids),
            self.function_items(&item_fids),
        );
        let function_interfaces = self
            .expand_interface_fields(function_interfaces, 0, &mut users)
            .await?;
        let item_values = self
            .item_values(&bound, &function_items, &triggers, event_values)
            .await;

        for b in &bound {
            let value = match b.occ.family {
                MacroFamily::Host | MacroFamily::HostId => function_hosts
                    .get(&b.function_id)
                    .and_then(|h| planner::host_macro_value(&b.occ.base, h)),
                MacroFamily::Interface | MacroFamily::InterfacePort => function_interfaces
                    .get(&b.function_id)
                    .and_then(|i| planner::interface_macro_value(&b.occ.base, i)),
                MacroFamily::Item => item_values
                    .get(&(b.trigger_id.clone(), b.occ.token.clone()))
                    .cloned(),
                _ => None,
            };
            if let (Some(value), Some(map)) = (value, values.get_mut(&b.trigger_id)) {
                map.insert(b.occ.token.clone(), value);
            }
        }

        if !user_requests.is_empty() {
            for (trigger_id, resolved) in users.resolve(user_requests).await {
                values.entry(trigger_id).or_default().extend(resolved);
            }
        }

        // ── Substitute ──
        for (trigger_id, trigger) in triggers.iter_mut() {
            if let Some(map) = values.get(trigger_id) {
                let text = field_mut(trigger, target);
                *text = substitute(text, matcher, map);
            }
        }
        Ok(triggers)
    }

    /// Expression of each trigger with user macros expanded against the
    /// trigger's hosts. Triggers without user macros are absent.
    async fn expand_expression_user_macros(
        &self,
        users: &mut UserMacroResolver<'_>,
        triggers: &IndexMap<TriggerId, TriggerRecord>,
        trigger_hosts: &HashMap<TriggerId, Vec<confmacro_core::HostId>>,
    ) -> HashMap<TriggerId, String> {
        let matcher = &Scenario::TriggerExpressionUser.config().matcher;
        let mut requests = IndexMap::new();
        for (trigger_id, trigger) in triggers {
            let tokens = matcher.find(MacroFamily::User, [trigger.expression.as_str()]);
            if tokens.is_empty() {
                continue;
            }
            requests.insert(
                trigger_id.clone(),
                UserMacroRequest {
                    host_ids: trigger_hosts.get(trigger_id).cloned().unwrap_or_default(),
                    tokens,
                },
            );
        }
        if requests.is_empty() {
            return HashMap::new();
        }

        users
            .resolve(requests)
            .await
            .into_iter()
            .filter_map(|(trigger_id, resolved)| {
                let trigger = triggers.get(&trigger_id)?;
                Some((trigger_id, substitute(&trigger.expression, matcher, &resolved)))
            })
            .collect()
    }

    async fn function_hosts(&self, function_ids: &BTreeSet<FunctionId>) -> HashMap<FunctionId, HostRecord> {
        if function_ids.is_empty() {
            return HashMap::new();
        }
        let ids: Vec<FunctionId> = function_ids.iter().cloned().collect();
        tracing::debug!(functions = ids.len(), "Fetching function hosts");
        or_empty(self.store.function_hosts(&ids).await, "function_hosts")
            .into_iter()
            .map(|FunctionHost { function_id, host_id, host, name, .. }| {
                (function_id, HostRecord { host_id, host, name })
            })
            .collect()
    }

    async fn function_items(&self, function_ids: &BTreeSet<FunctionId>) -> HashMap<FunctionId, FunctionItem> {
        if function_ids.is_empty() {
            return HashMap::new();
        }
        let ids: Vec<FunctionId> = function_ids.iter().cloned().collect();
        tracing::debug!(functions = ids.len(), "Fetching function items");
        or_empty(self.store.function_items(&ids).await, "function_items")
            .into_iter()
            .map(|f| (f.function_id.clone(), f))
            .collect()
    }

    /// Formatted item values keyed by (trigger, token). `{ITEM.VALUE}` reads
    /// the sample at the event time when `event_values` is set and the
    /// record carries a clock; everything else reads the latest sample.
    /// Binary items never produce a value.
    async fn item_values(
        &self,
        bound: &[FunctionMacro],
        function_items: &HashMap<FunctionId, FunctionItem>,
        triggers: &IndexMap<TriggerId, TriggerRecord>,
        event_values: bool,
    ) -> HashMap<(TriggerId, String), String> {
        let mut latest_ids: BTreeSet<ItemId> = BTreeSet::new();
        let mut at_event: Vec<(&FunctionMacro, &FunctionItem, i64, i64)> = Vec::new();
        let mut latest: Vec<(&FunctionMacro, &FunctionItem)> = Vec::new();

        for b in bound.iter().filter(|b| b.occ.family == MacroFamily::Item) {
            let Some(fi) = function_items.get(&b.function_id) else {
                continue;
            };
            if fi.item.value_type == ValueType::Binary {
                continue;
            }
            let event_clock = triggers
                .get(&b.trigger_id)
                .and_then(|t| t.clock.map(|clock| (clock, t.ns.unwrap_or(0))));
            match event_clock {
                Some((clock, ns)) if event_values && b.occ.base == "ITEM.VALUE" => {
                    at_event.push((b, fi, clock, ns));
                }
                _ => {
                    latest_ids.insert(fi.item.item_id.clone());
                    latest.push((b, fi));
                }
            }
        }

        let trim = self.config.trim_length;
        let mut out = HashMap::new();

        if !latest_ids.is_empty() {
            let ids: Vec<ItemId> = latest_ids.into_iter().collect();
            tracing::debug!(items = ids.len(), "Fetching last values");
            let samples = or_empty(self.history.last_values(&ids).await, "last_values");
            for (b, fi) in latest {
                if let Some(sample) = samples.get(&fi.item.item_id) {
                    out.insert(
                        (b.trigger_id.clone(), b.occ.token.clone()),
                        self.history.format_value(&sample.value, &fi.item, trim),
                    );
                }
            }
        }

        if !at_event.is_empty() {
            tracing::debug!(lookups = at_event.len(), "Fetching values at event time");
            let lookups = at_event
                .iter()
                .map(|(_, fi, clock, ns)| self.history.value_at(&fi.item, *clock, *ns));
            let results = join_all(lookups).await;
            for ((b, fi, _, _), result) in at_event.iter().zip(results) {
                if let Some(sample) = or_empty(result, "value_at") {
                    out.insert(
                        (b.trigger_id.clone(), b.occ.token.clone()),
                        self.history.format_value(&sample.value, &fi.item, trim),
                    );
                }
            }
        }
        out
    }
}
