use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Host or template identifier. Templates share the host id space.
pub type HostId = String;
pub type TriggerId = String;
/// Identifier of a trigger function, referenced as `{<id>}` in expressions.
pub type FunctionId = String;
pub type ItemId = String;

// ── Hosts ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub host_id: HostId,
    /// Technical host name (`{HOST.HOST}`).
    pub host: String,
    /// Visible host name (`{HOST.NAME}`).
    pub name: String,
}

// ── Interfaces ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Agent,
    Snmp,
    Jmx,
    Ipmi,
}

impl InterfaceType {
    /// Every interface type, highest priority first.
    pub const ALL: [InterfaceType; 4] = [
        InterfaceType::Agent,
        InterfaceType::Snmp,
        InterfaceType::Jmx,
        InterfaceType::Ipmi,
    ];

    /// Priority used when a host has primary interfaces of several types.
    /// Higher wins.
    pub fn priority(self) -> u8 {
        match self {
            InterfaceType::Agent => 4,
            InterfaceType::Snmp => 3,
            InterfaceType::Jmx => 2,
            InterfaceType::Ipmi => 1,
        }
    }
}

impl std::fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceType::Agent => write!(f, "agent"),
            InterfaceType::Snmp => write!(f, "snmp"),
            InterfaceType::Jmx => write!(f, "jmx"),
            InterfaceType::Ipmi => write!(f, "ipmi"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub host_id: HostId,
    #[serde(default)]
    pub interface_id: String,
    #[serde(rename = "type")]
    pub kind: InterfaceType,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub dns: String,
    #[serde(default = "default_true")]
    pub use_ip: bool,
    /// Primary (default) interface of its type on the host.
    #[serde(default = "default_true")]
    pub main: bool,
    #[serde(default)]
    pub port: String,
}

impl InterfaceRecord {
    /// Address used for `{HOST.CONN}`: the IP when `use_ip` is set, the DNS name otherwise.
    pub fn connection(&self) -> &str {
        if self.use_ip {
            &self.ip
        } else {
            &self.dns
        }
    }
}

fn default_true() -> bool {
    true
}

// ── Trigger functions ─────────────────────────────────────────

/// A trigger function joined to the host of its item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionHost {
    pub trigger_id: TriggerId,
    pub function_id: FunctionId,
    pub host_id: HostId,
    pub host: String,
    pub name: String,
}

/// A trigger function joined to one primary interface of its item's host.
/// A function yields one row per primary interface type on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInterface {
    pub trigger_id: TriggerId,
    pub function_id: FunctionId,
    pub interface: InterfaceRecord,
}

/// A trigger function joined to its item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionItem {
    pub trigger_id: TriggerId,
    pub function_id: FunctionId,
    pub item: ItemMeta,
}

// ── Items and history ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Float,
    Str,
    Log,
    Uint64,
    Text,
    Binary,
}

impl ValueType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Float | ValueType::Uint64)
    }
}

/// Value map attached to an item: raw value → display text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMap {
    pub id: u64,
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

/// Item metadata needed to fetch and format its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub item_id: ItemId,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub units: String,
    /// `0` means no value map.
    #[serde(default)]
    pub valuemap_id: u64,
    #[serde(default)]
    pub value_map: Option<ValueMap>,
}

/// An item joined to its host, backing host and interface macros in item keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemHost {
    pub item_id: ItemId,
    pub host_id: HostId,
    pub host: String,
    pub name: String,
    /// Interface the item is polled through; empty when it has none.
    #[serde(default)]
    pub interface_id: String,
}

/// One history value, read-only for the duration of a resolution call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSample {
    pub item_id: ItemId,
    pub clock: i64,
    #[serde(default)]
    pub ns: i64,
    pub value: String,
}

/// Aggregations supported inside functional item macros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Last,
    Min,
    Max,
    Avg,
}

impl AggregateFunction {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "last" => Some(AggregateFunction::Last),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            "avg" => Some(AggregateFunction::Avg),
            _ => None,
        }
    }
}

impl std::fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateFunction::Last => write!(f, "last"),
            AggregateFunction::Min => write!(f, "min"),
            AggregateFunction::Max => write!(f, "max"),
            AggregateFunction::Avg => write!(f, "avg"),
        }
    }
}

// ── User macros ───────────────────────────────────────────────

/// A stored user macro definition, e.g. `{$SNMP_COMMUNITY:"core"}` = `public`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDefinition {
    #[serde(rename = "macro")]
    pub macro_name: String,
    #[serde(default)]
    pub value: String,
    /// Secret values are never exposed; they resolve to the configured mask.
    #[serde(default)]
    pub secret: bool,
}

impl MacroDefinition {
    pub fn new(macro_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            macro_name: macro_name.into(),
            value: value.into(),
            secret: false,
        }
    }
}

/// Macros defined directly on one host or template, plus its template links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMacroSet {
    #[serde(default)]
    pub parent_template_ids: Vec<HostId>,
    #[serde(default)]
    pub macros: Vec<MacroDefinition>,
}
