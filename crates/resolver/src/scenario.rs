//! Scenario table: which macro families apply where, and how they resolve.
//!
//! The table is immutable and built once. Dispatch is a match over
//! [`Strategy`], never a lookup by method name.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use confmacro_core::ResolveError;
use serde::{Deserialize, Serialize};

use crate::patterns::{MacroFamily, MacroMatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scenario {
    #[serde(rename = "scriptConfirmation")]
    ScriptConfirmation,
    #[serde(rename = "httpTestName")]
    HttpTestName,
    #[serde(rename = "hostInterfaceIpDns")]
    HostInterfaceIpDns,
    #[serde(rename = "hostInterfaceIpDnsAgentPrimary")]
    HostInterfaceIpDnsAgentPrimary,
    #[serde(rename = "hostInterfacePort")]
    HostInterfacePort,
    #[serde(rename = "screenElementURL")]
    ScreenElementUrl,
    #[serde(rename = "screenElementURLUser")]
    ScreenElementUrlUser,
    #[serde(rename = "graphName")]
    GraphName,
    #[serde(rename = "triggerName")]
    TriggerName,
    #[serde(rename = "eventName")]
    EventName,
    #[serde(rename = "triggerDescription")]
    TriggerDescription,
    #[serde(rename = "triggerUrl")]
    TriggerUrl,
    #[serde(rename = "triggerExpressionUser")]
    TriggerExpressionUser,
    #[serde(rename = "itemName")]
    ItemName,
    #[serde(rename = "itemKey")]
    ItemKey,
    #[serde(rename = "functionParameter")]
    FunctionParameter,
}

impl Scenario {
    pub const ALL: [Scenario; 16] = [
        Scenario::ScriptConfirmation,
        Scenario::HttpTestName,
        Scenario::HostInterfaceIpDns,
        Scenario::HostInterfaceIpDnsAgentPrimary,
        Scenario::HostInterfacePort,
        Scenario::ScreenElementUrl,
        Scenario::ScreenElementUrlUser,
        Scenario::GraphName,
        Scenario::TriggerName,
        Scenario::EventName,
        Scenario::TriggerDescription,
        Scenario::TriggerUrl,
        Scenario::TriggerExpressionUser,
        Scenario::ItemName,
        Scenario::ItemKey,
        Scenario::FunctionParameter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::ScriptConfirmation => "scriptConfirmation",
            Scenario::HttpTestName => "httpTestName",
            Scenario::HostInterfaceIpDns => "hostInterfaceIpDns",
            Scenario::HostInterfaceIpDnsAgentPrimary => "hostInterfaceIpDnsAgentPrimary",
            Scenario::HostInterfacePort => "hostInterfacePort",
            Scenario::ScreenElementUrl => "screenElementURL",
            Scenario::ScreenElementUrlUser => "screenElementURLUser",
            Scenario::GraphName => "graphName",
            Scenario::TriggerName => "triggerName",
            Scenario::EventName => "eventName",
            Scenario::TriggerDescription => "triggerDescription",
            Scenario::TriggerUrl => "triggerUrl",
            Scenario::TriggerExpressionUser => "triggerExpressionUser",
            Scenario::ItemName => "itemName",
            Scenario::ItemKey => "itemKey",
            Scenario::FunctionParameter => "functionParameter",
        }
    }

    pub fn config(self) -> &'static ScenarioConfig {
        &TABLE[&self]
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|sc| sc.name() == s)
            .ok_or_else(|| ResolveError::UnknownScenario(s.to_string()))
    }
}

// ── Strategies ────────────────────────────────────────────────

/// Which primary interface backs interface macros in text scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceMode {
    /// The main agent interface only.
    MainAgent,
    /// The highest-priority primary interface of any type.
    Priority,
}

/// Trigger field rewritten by a trigger scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerField {
    Description,
    Comments,
    Url,
    Expression,
}

impl TriggerField {
    pub fn label(self) -> &'static str {
        match self {
            TriggerField::Description => "description",
            TriggerField::Comments => "comments",
            TriggerField::Url => "url",
            TriggerField::Expression => "expression",
        }
    }
}

/// Item field rewritten by an item scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    /// `$1`..`$9` read from the expanded key, plus user macros.
    Name,
    /// Host, interface and user macros inside key parameters.
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Free texts keyed by host id.
    Text { interfaces: Option<InterfaceMode> },
    /// One trigger record per key; indexed macros follow the expression's functions.
    Trigger {
        field: TriggerField,
        /// `{ITEM.VALUE}` reads the value at the record's event time.
        event_values: bool,
        /// Expand user macros in the expression before reading constants.
        expand_expression: bool,
    },
    /// Graph name plus its ordered items.
    Graph,
    Item { field: ItemField },
    /// User macros inside trigger function parameters.
    FunctionParameter,
}

impl Strategy {
    pub fn input_kind(self) -> &'static str {
        match self {
            Strategy::Text { .. } => "texts",
            Strategy::Trigger { .. } => "triggers",
            Strategy::Graph => "graphs",
            Strategy::Item { .. } => "items",
            Strategy::FunctionParameter => "functions",
        }
    }
}

#[derive(Debug)]
pub struct ScenarioConfig {
    pub scenario: Scenario,
    pub families: Vec<MacroFamily>,
    pub strategy: Strategy,
    /// Whether `{HOSTNAME}` and `{IPADDRESS}` count as macros.
    pub aliases: bool,
    pub matcher: MacroMatcher,
}

static TABLE: LazyLock<HashMap<Scenario, ScenarioConfig>> = LazyLock::new(|| {
    use MacroFamily::*;

    let priority = Strategy::Text {
        interfaces: Some(InterfaceMode::Priority),
    };
    let no_interfaces = Strategy::Text { interfaces: None };
    let trigger = |field, event_values, expand_expression| Strategy::Trigger {
        field,
        event_values,
        expand_expression,
    };

    let entries: Vec<(Scenario, Vec<MacroFamily>, Strategy)> = vec![
        (Scenario::ScriptConfirmation, vec![Host, Interface, User], priority),
        (Scenario::HttpTestName, vec![Host, Interface, User], priority),
        (
            Scenario::HostInterfaceIpDns,
            vec![Host, Interface, User],
            Strategy::Text {
                interfaces: Some(InterfaceMode::MainAgent),
            },
        ),
        (Scenario::HostInterfaceIpDnsAgentPrimary, vec![Host, User], no_interfaces),
        (Scenario::HostInterfacePort, vec![User], no_interfaces),
        (Scenario::ScreenElementUrl, vec![Host, HostId, Interface, User], priority),
        (Scenario::ScreenElementUrlUser, vec![User], no_interfaces),
        (Scenario::GraphName, vec![Functional], Strategy::Graph),
        (
            Scenario::TriggerName,
            vec![Host, Interface, InterfacePort, Item, Reference, User],
            trigger(TriggerField::Description, false, true),
        ),
        (
            Scenario::EventName,
            vec![Host, Interface, InterfacePort, Item, Reference, User],
            trigger(TriggerField::Description, true, true),
        ),
        (
            Scenario::TriggerDescription,
            vec![Host, Interface, InterfacePort, Item, User],
            trigger(TriggerField::Comments, false, false),
        ),
        (
            Scenario::TriggerUrl,
            vec![TriggerId, Host, HostId, Interface, InterfacePort, User],
            trigger(TriggerField::Url, false, false),
        ),
        (
            Scenario::TriggerExpressionUser,
            vec![User],
            trigger(TriggerField::Expression, false, false),
        ),
        (
            Scenario::ItemName,
            vec![User, Reference],
            Strategy::Item {
                field: ItemField::Name,
            },
        ),
        (
            Scenario::ItemKey,
            vec![Host, Interface, User],
            Strategy::Item {
                field: ItemField::Key,
            },
        ),
        (Scenario::FunctionParameter, vec![User], Strategy::FunctionParameter),
    ];

    entries
        .into_iter()
        .map(|(scenario, families, strategy)| {
            let indexed = matches!(strategy, Strategy::Trigger { .. });
            // URLs only know the `HOST.*` spellings.
            let aliases = scenario != Scenario::TriggerUrl;
            let matcher = if aliases {
                MacroMatcher::new(&families, indexed)
            } else {
                MacroMatcher::without_aliases(&families, indexed)
            };
            (
                scenario,
                ScenarioConfig {
                    scenario,
                    families,
                    strategy,
                    aliases,
                    matcher,
                },
            )
        })
        .collect()
});
