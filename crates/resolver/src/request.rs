//! Request and response shapes. Outputs mirror inputs: same keys in the
//! same order, same number of texts per key.

use confmacro_core::{HostId, ItemId, TriggerId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::scenario::Scenario;

/// A trigger, or a trigger event when `clock`/`ns` are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    /// Expression in collapsed form, functions written as `{<functionid>}`.
    pub expression: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns: Option<i64>,
}

impl TriggerRecord {
    pub fn new(expression: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            description: description.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphItem {
    #[serde(default)]
    pub host_id: HostId,
    /// Technical name of the item's host.
    pub host: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub name: String,
    /// Graph items in display order; `{HOST.HOST<n>}` refers to the n-th one.
    #[serde(default)]
    pub items: Vec<GraphItem>,
}

/// An item whose name or key carries macros.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: ItemId,
    pub host_id: HostId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
    /// Key with its macros already expanded. Item names read `$1`..`$9`
    /// from it when set instead of expanding `key` again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_expanded: Option<String>,
}

/// A trigger function's parameter list, e.g. `#3,{$PERIOD}` for `last(#3,{$PERIOD})`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Host of the function's item.
    pub host_id: HostId,
    #[serde(default)]
    pub function: String,
    pub parameter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum MacroInputs {
    /// Free texts keyed by host id.
    Texts(IndexMap<HostId, Vec<String>>),
    Triggers(IndexMap<TriggerId, TriggerRecord>),
    /// Graphs keyed by graph id.
    Graphs(IndexMap<String, GraphRecord>),
    /// Items keyed by caller-chosen ids.
    Items(IndexMap<String, ItemRecord>),
    /// Trigger functions keyed by caller-chosen ids.
    Functions(IndexMap<String, FunctionRecord>),
}

impl MacroInputs {
    pub fn len(&self) -> usize {
        match self {
            MacroInputs::Texts(m) => m.len(),
            MacroInputs::Triggers(m) => m.len(),
            MacroInputs::Graphs(m) => m.len(),
            MacroInputs::Items(m) => m.len(),
            MacroInputs::Functions(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MacroInputs::Texts(_) => "texts",
            MacroInputs::Triggers(_) => "triggers",
            MacroInputs::Graphs(_) => "graphs",
            MacroInputs::Items(_) => "items",
            MacroInputs::Functions(_) => "functions",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Trigger names: resolve only `$1`..`$9`.
    #[serde(default)]
    pub references_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub scenario: Scenario,
    pub inputs: MacroInputs,
    #[serde(default)]
    pub options: ResolveOptions,
}
