//! User macro token and definition parsing.

use std::collections::{BTreeMap, HashMap};

use confmacro_core::MacroDefinition;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroContext {
    Exact(String),
    /// Only valid in stored definitions: `{$NAME:regex:"pattern"}`.
    Regex(String),
}

/// A parsed `{$NAME}` / `{$NAME:context}` token or definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMacroName {
    pub name: String,
    pub context: Option<MacroContext>,
}

impl UserMacroName {
    pub fn exact_context(&self) -> Option<&str> {
        match &self.context {
            Some(MacroContext::Exact(ctx)) => Some(ctx),
            _ => None,
        }
    }
}

/// Parse a user macro. Regex contexts are recognised only with
/// `allow_regex`; otherwise `regex:...` is an ordinary context string.
pub fn parse_user_macro(text: &str, allow_regex: bool) -> Option<UserMacroName> {
    let inner = text.strip_prefix("{$")?.strip_suffix('}')?;
    let (name, rest) = match inner.find(':') {
        Some(i) => (&inner[..i], Some(&inner[i + 1..])),
        None => (inner, None),
    };
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '.')
    {
        return None;
    }

    let context = match rest {
        None => None,
        Some(rest) => {
            let trimmed = rest.trim_start();
            match trimmed.strip_prefix("regex:") {
                Some(pattern) if allow_regex => Some(MacroContext::Regex(parse_context(pattern)?)),
                _ => Some(MacroContext::Exact(parse_context(rest)?)),
            }
        }
    };

    Some(UserMacroName {
        name: name.to_string(),
        context,
    })
}

fn parse_context(raw: &str) -> Option<String> {
    let trimmed = raw.trim_start();
    let Some(quoted) = trimmed.strip_prefix('"') else {
        return Some(trimmed.to_string());
    };

    let mut out = String::new();
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return None,
            },
            '"' => {
                // Only whitespace may follow the closing quote.
                return chars.as_str().trim().is_empty().then_some(out);
            }
            c => out.push(c),
        }
    }
    None
}

// ── Definition tables ─────────────────────────────────────────

/// Every definition of one macro name on one host, template or the global table.
#[derive(Debug, Clone, Default)]
pub(crate) struct MacroEntry {
    value: Option<String>,
    contexts: HashMap<String, String>,
    /// Compiled context patterns, sorted by pattern so they are tried in a
    /// stable order.
    regex: BTreeMap<String, (Regex, String)>,
}

pub(crate) type MacroTable = HashMap<String, MacroEntry>;

pub(crate) fn build_table(definitions: &[MacroDefinition], secret_mask: &str) -> MacroTable {
    let mut table = MacroTable::new();
    for def in definitions {
        let Some(parsed) = parse_user_macro(&def.macro_name, true) else {
            tracing::debug!(macro_name = %def.macro_name, "Skipping malformed macro definition");
            continue;
        };
        let value = if def.secret {
            secret_mask.to_string()
        } else {
            def.value.clone()
        };
        let entry = table.entry(parsed.name).or_default();
        match parsed.context {
            None => entry.value = Some(value),
            Some(MacroContext::Exact(ctx)) => {
                entry.contexts.insert(ctx, value);
            }
            Some(MacroContext::Regex(pattern)) => match Regex::new(&pattern) {
                Ok(re) => {
                    entry.regex.insert(pattern, (re, value));
                }
                Err(e) => {
                    tracing::debug!(pattern = %pattern, error = %e, "Invalid macro context regex");
                }
            },
        }
    }
    table
}

/// Progress of one macro through the lookup chain.
#[derive(Debug, Clone, Default)]
pub(crate) struct LookupState {
    pub value: Option<String>,
    /// Base value kept for a macro with context, used if no context matches anywhere.
    pub default: Option<String>,
}

impl LookupState {
    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }
}

/// Look `wanted` up in one table: exact context, regex context, then base value.
pub(crate) fn lookup(table: &MacroTable, wanted: &UserMacroName, state: &mut LookupState) {
    let Some(entry) = table.get(&wanted.name) else {
        return;
    };

    if let Some(ctx) = wanted.exact_context() {
        if let Some(v) = entry.contexts.get(ctx) {
            state.value = Some(v.clone());
            return;
        }
        if let Some((_, v)) = entry.regex.values().find(|(re, _)| re.is_match(ctx)) {
            state.value = Some(v.clone());
            return;
        }
    }

    if let Some(base) = &entry.value {
        if wanted.context.is_none() {
            state.value = Some(base.clone());
        } else if state.default.is_none() {
            state.default = Some(base.clone());
        }
    }
}
