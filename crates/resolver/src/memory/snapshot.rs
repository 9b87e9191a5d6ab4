//! YAML snapshot of monitoring configuration and history.

use std::path::Path;

use confmacro_core::{
    HostId, InterfaceRecord, ItemId, ItemSample, MacroDefinition, StoreError, TriggerId,
    ValueMap, ValueType,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Anchor for aggregation windows, unix seconds. Defaults to the wall clock.
    #[serde(default)]
    pub now: Option<i64>,
    /// Hosts and templates.
    #[serde(default)]
    pub hosts: Vec<SnapshotHost>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceRecord>,
    #[serde(default)]
    pub items: Vec<SnapshotItem>,
    #[serde(default)]
    pub triggers: Vec<SnapshotTrigger>,
    #[serde(default)]
    pub history: Vec<ItemSample>,
    #[serde(default)]
    pub value_maps: Vec<ValueMap>,
    #[serde(default)]
    pub global_macros: Vec<MacroDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotHost {
    pub id: HostId,
    pub host: String,
    /// Visible name; empty means same as `host`.
    #[serde(default)]
    pub name: String,
    /// Linked templates, in link order.
    #[serde(default)]
    pub templates: Vec<HostId>,
    #[serde(default)]
    pub macros: Vec<MacroDefinition>,
}

impl SnapshotHost {
    pub fn visible_name(&self) -> &str {
        if self.name.is_empty() {
            &self.host
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub id: ItemId,
    pub host_id: HostId,
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub valuemap_id: u64,
    #[serde(default)]
    pub interface_id: String,
    /// Whether the caller may read this item through functional macros.
    #[serde(default = "visible")]
    pub web_visible: bool,
}

fn visible() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotTrigger {
    pub id: TriggerId,
    #[serde(default)]
    pub functions: Vec<SnapshotFunction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFunction {
    pub id: String,
    pub item_id: ItemId,
}

impl Snapshot {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, StoreError> {
        serde_yaml::from_str(yaml).map_err(|e| StoreError::Snapshot(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}
