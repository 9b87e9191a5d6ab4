//! Scenario dispatch.
//!
//! [`MacroResolver`] owns the collaborators and the config. Every call
//! starts from empty caches; nothing is shared between calls.

mod function;
mod item;
mod text;
mod trigger;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use confmacro_core::{HostId, ResolveError, ResolverConfig, TriggerId};
use indexmap::IndexMap;

use crate::functional;
use crate::request::{
    FunctionRecord, GraphRecord, ItemRecord, MacroInputs, ResolutionRequest, ResolveOptions,
    TriggerRecord,
};
use crate::scenario::{Scenario, Strategy};
use crate::store::{ConfigStore, HistoryStore, KeyParams};
use crate::substitute::ResolvedMap;
use crate::usermacros::UserMacroResolver;

pub struct MacroResolver {
    config: ResolverConfig,
    store: Arc<dyn ConfigStore>,
    history: Arc<dyn HistoryStore>,
    key_params: Arc<dyn KeyParams>,
}

impl MacroResolver {
    /// A `max_nesting_depth` of 0 is raised to 1 so top-level text calls
    /// still run.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        history: Arc<dyn HistoryStore>,
        key_params: Arc<dyn KeyParams>,
        mut config: ResolverConfig,
    ) -> Self {
        if config.max_nesting_depth == 0 {
            tracing::warn!("max_nesting_depth of 0 raised to 1");
            config.max_nesting_depth = 1;
        }
        Self {
            config,
            store,
            history,
            key_params,
        }
    }

    /// Use one collaborator for configuration, history and key parsing.
    pub fn with_store<S>(store: Arc<S>, config: ResolverConfig) -> Self
    where
        S: ConfigStore + HistoryStore + KeyParams + 'static,
    {
        let history: Arc<dyn HistoryStore> = store.clone();
        let key_params: Arc<dyn KeyParams> = store.clone();
        Self::new(store, history, key_params, config)
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a request. Outputs have the same keys, order and text
    /// counts as the inputs.
    pub async fn resolve(&self, request: ResolutionRequest) -> Result<MacroInputs, ResolveError> {
        self.dispatch(request.scenario, request.inputs, request.options).await
    }

    /// Resolve by scenario name; an unknown name is a configuration error.
    pub async fn resolve_named(
        &self,
        scenario: &str,
        inputs: MacroInputs,
        options: ResolveOptions,
    ) -> Result<MacroInputs, ResolveError> {
        let scenario: Scenario = scenario.parse().inspect_err(|e| {
            tracing::error!(error = %e, "Rejected macro resolution request");
        })?;
        self.dispatch(scenario, inputs, options).await
    }

    async fn dispatch(
        &self,
        scenario: Scenario,
        inputs: MacroInputs,
        options: ResolveOptions,
    ) -> Result<MacroInputs, ResolveError> {
        let strategy = scenario.config().strategy;
        let mismatch = || ResolveError::InputMismatch {
            scenario: scenario.name().to_string(),
            expected: strategy.input_kind(),
        };
        tracing::debug!(
            scenario = %scenario,
            input = inputs.kind(),
            entities = inputs.len(),
            "Dispatching macro resolution"
        );

        match (strategy, inputs) {
            (Strategy::Text { .. }, MacroInputs::Texts(data)) => {
                self.resolve_texts(scenario, data).await.map(MacroInputs::Texts)
            }
            (Strategy::Trigger { .. }, MacroInputs::Triggers(data)) => self
                .resolve_triggers(scenario, data, options)
                .await
                .map(MacroInputs::Triggers),
            (Strategy::Graph, MacroInputs::Graphs(data)) => {
                Ok(MacroInputs::Graphs(self.resolve_graph_names(data).await))
            }
            (Strategy::Item { .. }, MacroInputs::Items(data)) => {
                self.resolve_items(scenario, data).await.map(MacroInputs::Items)
            }
            (Strategy::FunctionParameter, MacroInputs::Functions(data)) => Ok(
                MacroInputs::Functions(self.resolve_function_parameters(data).await),
            ),
            _ => Err(mismatch()),
        }
    }

    /// Resolve free texts keyed by host id (text scenarios only).
    pub async fn resolve_texts(
        &self,
        scenario: Scenario,
        data: IndexMap<HostId, Vec<String>>,
    ) -> Result<IndexMap<HostId, Vec<String>>, ResolveError> {
        if data.is_empty() {
            return Ok(data);
        }
        let mut users = UserMacroResolver::new(self.store.as_ref(), &self.config);
        self.resolve_texts_at(scenario, data, 0, &mut users).await
    }

    /// Resolve one display field of each trigger (trigger scenarios only).
    pub async fn resolve_triggers(
        &self,
        scenario: Scenario,
        triggers: IndexMap<TriggerId, TriggerRecord>,
        options: ResolveOptions,
    ) -> Result<IndexMap<TriggerId, TriggerRecord>, ResolveError> {
        if triggers.is_empty() {
            return Ok(triggers);
        }
        self.resolve_trigger_field(scenario, triggers, options).await
    }

    /// Resolve the name or key of each item (item scenarios only).
    pub async fn resolve_items(
        &self,
        scenario: Scenario,
        items: IndexMap<String, ItemRecord>,
    ) -> Result<IndexMap<String, ItemRecord>, ResolveError> {
        if items.is_empty() {
            return Ok(items);
        }
        self.resolve_item_field(scenario, items).await
    }

    /// Expand user macros in trigger function parameters.
    pub async fn resolve_function_parameters(
        &self,
        functions: IndexMap<String, FunctionRecord>,
    ) -> IndexMap<String, FunctionRecord> {
        if functions.is_empty() {
            return functions;
        }
        self.resolve_function_field(functions).await
    }

    pub async fn resolve_graph_names(
        &self,
        graphs: IndexMap<String, GraphRecord>,
    ) -> IndexMap<String, GraphRecord> {
        if graphs.is_empty() {
            return graphs;
        }
        functional::resolve_graph_names(
            self.store.as_ref(),
            self.history.as_ref(),
            &self.config,
            Scenario::GraphName.config(),
            graphs,
        )
        .await
    }

    /// Resolve user macro tokens for one host through its template chain
    /// and the global table.
    pub async fn resolve_user_macros(
        &self,
        host_id: &HostId,
        tokens: impl IntoIterator<Item = String>,
    ) -> ResolvedMap {
        let mut users = UserMacroResolver::new(self.store.as_ref(), &self.config);
        users
            .resolve_for_host(host_id, tokens.into_iter().collect())
            .await
    }
}
