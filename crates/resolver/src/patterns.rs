//! Macro grammar: which tokens count as macros for a given scenario.
//!
//! A [`MacroMatcher`] is compiled once from a list of families. `find`
//! collects the distinct tokens per family (families are matched
//! independently, so a token may be reported by more than one), while
//! `positions` scans with a single alternation and yields leftmost,
//! non-overlapping matches with their byte offsets for substitution.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `{$NAME}`, `{$NAME:context}` or `{$NAME:"quoted context"}`.
const USER_MACRO: &str = r#"\{\$[A-Z0-9_.]+(?::(?:\s*"(?:[^"\\]|\\.)*"\s*|[^}]*))?\}"#;
const REFERENCE: &str = r"\$[1-9]";
const FUNCTIONAL: &str = r"\{(?:[0-9A-Za-z_. \-]+|\{(?:HOSTNAME|HOST\.HOST)[1-9]?\}):[0-9A-Za-z_.\-]+(?:\[[^\]]*\])?\.(?:last|max|min|avg)\((?:[0-9]+[smhdw]?)?\)\}";

/// Captures the parts of a functional item macro.
pub(crate) static FUNCTIONAL_PARTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{(?P<host>[0-9A-Za-z_. \-]+|\{(?:HOSTNAME|HOST\.HOST)(?P<pos>[1-9]?)\}):(?P<key>[0-9A-Za-z_.\-]+(?:\[[^\]]*\])?)\.(?P<func>last|max|min|avg)\((?P<param>(?:[0-9]+[smhdw]?)?)\)\}$")
        .expect("constant regex pattern is valid")
});

// ── Families ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroFamily {
    /// `{HOSTNAME}`, `{HOST.HOST}`, `{HOST.NAME}`
    Host,
    /// `{HOST.ID}`
    HostId,
    /// `{IPADDRESS}`, `{HOST.IP}`, `{HOST.DNS}`, `{HOST.CONN}`
    Interface,
    /// `{HOST.PORT}`
    InterfacePort,
    /// `{ITEM.LASTVALUE}`, `{ITEM.VALUE}`
    Item,
    /// `{TRIGGER.ID}`
    TriggerId,
    /// `{$NAME}` with optional context
    User,
    /// `$1` .. `$9`
    Reference,
    /// `{host:key.func(param)}`
    Functional,
}

impl MacroFamily {
    /// Built-in macro names of a named family, without braces.
    pub fn names(self) -> &'static [&'static str] {
        match self {
            MacroFamily::Host => &["HOSTNAME", "HOST.HOST", "HOST.NAME"],
            MacroFamily::HostId => &["HOST.ID"],
            MacroFamily::Interface => &["IPADDRESS", "HOST.IP", "HOST.DNS", "HOST.CONN"],
            MacroFamily::InterfacePort => &["HOST.PORT"],
            MacroFamily::Item => &["ITEM.LASTVALUE", "ITEM.VALUE"],
            MacroFamily::TriggerId => &["TRIGGER.ID"],
            MacroFamily::User | MacroFamily::Reference | MacroFamily::Functional => &[],
        }
    }

    /// Whether the family accepts a `1`-`9` suffix selecting a trigger function.
    pub fn supports_index(self) -> bool {
        matches!(
            self,
            MacroFamily::Host
                | MacroFamily::HostId
                | MacroFamily::Interface
                | MacroFamily::InterfacePort
                | MacroFamily::Item
        )
    }

    /// Whether `name` is a pre-`HOST.*` spelling kept for older configs.
    pub fn is_alias(name: &str) -> bool {
        matches!(name, "HOSTNAME" | "IPADDRESS")
    }

    fn pattern(self, indexed: bool, aliases: bool) -> String {
        match self {
            MacroFamily::User => USER_MACRO.to_string(),
            MacroFamily::Reference => REFERENCE.to_string(),
            MacroFamily::Functional => FUNCTIONAL.to_string(),
            named => {
                let names: Vec<String> = named
                    .names()
                    .iter()
                    .filter(|n| aliases || !MacroFamily::is_alias(n))
                    .map(|n| regex::escape(n))
                    .collect();
                let suffix = if indexed && named.supports_index() { "[1-9]?" } else { "" };
                format!(r"\{{(?:{}){}\}}", names.join("|"), suffix)
            }
        }
    }
}

// ── Occurrences ───────────────────────────────────────────────

/// One distinct macro token found in a text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MacroOccurrence {
    pub family: MacroFamily,
    /// Exact spelling as it appears in the text, e.g. `{HOST.HOST2}`.
    pub token: String,
    /// Macro name without braces or index, e.g. `HOST.HOST`.
    /// Empty for user, reference and functional macros.
    pub base: String,
    /// Function ordinal for indexed macros; `0` when unsuffixed.
    pub ordinal: usize,
}

// ── Matcher ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MacroMatcher {
    families: Vec<MacroFamily>,
    indexed: bool,
    per_family: Vec<(MacroFamily, Regex)>,
    combined: Regex,
}

impl MacroMatcher {
    /// Compile a matcher for `families`. With `indexed`, families that
    /// support it also match a trailing function ordinal.
    pub fn new(families: &[MacroFamily], indexed: bool) -> Self {
        Self::build(families, indexed, true)
    }

    /// Like [`MacroMatcher::new`], but `{HOSTNAME}` and `{IPADDRESS}` are
    /// left as plain text.
    pub fn without_aliases(families: &[MacroFamily], indexed: bool) -> Self {
        Self::build(families, indexed, false)
    }

    fn build(families: &[MacroFamily], indexed: bool, aliases: bool) -> Self {
        let mut families = families.to_vec();
        families.sort();
        families.dedup();

        let per_family: Vec<(MacroFamily, Regex)> = families
            .iter()
            .map(|f| {
                let re = Regex::new(&f.pattern(indexed, aliases)).expect("constant regex pattern is valid");
                (*f, re)
            })
            .collect();

        // Functional macros start with `{` followed by a host, so they are
        // tried before the named families that share the opening brace.
        let mut ordered = families.clone();
        ordered.sort_by_key(|f| if *f == MacroFamily::Functional { 0 } else { 1 });
        let alternation: Vec<String> = ordered
            .iter()
            .map(|f| format!("(?:{})", f.pattern(indexed, aliases)))
            .collect();
        let combined = if alternation.is_empty() {
            // Matches nothing.
            Regex::new(r"\b\B").expect("constant regex pattern is valid")
        } else {
            Regex::new(&alternation.join("|")).expect("constant regex pattern is valid")
        };

        Self {
            families,
            indexed,
            per_family,
            combined,
        }
    }

    pub fn families(&self) -> &[MacroFamily] {
        &self.families
    }

    pub fn includes(&self, family: MacroFamily) -> bool {
        self.families.contains(&family)
    }

    /// Distinct tokens of one family across `texts`.
    pub fn find<'a, I>(&self, family: MacroFamily, texts: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut found = BTreeSet::new();
        let Some((_, re)) = self.per_family.iter().find(|(f, _)| *f == family) else {
            return found;
        };
        for text in texts {
            for m in re.find_iter(text) {
                found.insert(m.as_str().to_string());
            }
        }
        found
    }

    /// Distinct occurrences of every family across `texts`, sorted by
    /// family then token.
    pub fn occurrences<'a, I>(&self, texts: I) -> Vec<MacroOccurrence>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let mut out = BTreeSet::new();
        for (family, _) in &self.per_family {
            for token in self.find(*family, texts.clone()) {
                out.insert(self.classify(*family, token));
            }
        }
        out.into_iter().collect()
    }

    /// True when any family matches anywhere in `texts`.
    pub fn has_macros<'a, I>(&self, texts: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        texts.into_iter().any(|t| self.combined.is_match(t))
    }

    /// Leftmost, non-overlapping matches in ascending offset order.
    pub fn positions<'t>(&self, text: &'t str) -> Vec<(usize, &'t str)> {
        self.combined
            .find_iter(text)
            .map(|m| (m.start(), m.as_str()))
            .collect()
    }

    fn classify(&self, family: MacroFamily, token: String) -> MacroOccurrence {
        if !family.supports_index() {
            return MacroOccurrence {
                family,
                base: match family {
                    MacroFamily::User | MacroFamily::Reference | MacroFamily::Functional => {
                        String::new()
                    }
                    _ => token.trim_start_matches('{').trim_end_matches('}').to_string(),
                },
                token,
                ordinal: 0,
            };
        }

        let inner = token.trim_start_matches('{').trim_end_matches('}');
        let (base, ordinal) = match inner.chars().last().and_then(|c| c.to_digit(10)) {
            Some(d) if self.indexed && family.names().contains(&&inner[..inner.len() - 1]) => {
                (inner[..inner.len() - 1].to_string(), d as usize)
            }
            _ => (inner.to_string(), 0),
        };
        MacroOccurrence {
            family,
            token,
            base,
            ordinal,
        }
    }
}
