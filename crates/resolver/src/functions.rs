//! Trigger expression helpers: function ordinals and expression constants.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use confmacro_core::FunctionId;
use regex::Regex;

static FUNCTION_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([0-9]+)\}").expect("constant regex pattern is valid"));

/// Expression tokens that count as constants, plus `{id}` references to skip.
static EXPRESSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\{[0-9]+\}|\{\$[^}]*\}|"(?:[^"\\]|\\.)*"|[0-9]+(?:\.[0-9]+)?[KMGTsmhdw]?"#,
    )
    .expect("constant regex pattern is valid")
});

// ── Function index ────────────────────────────────────────────

/// Maps the 1-based position of each `{<functionid>}` in an expression
/// to the function id. Ordinal `0` (an unsuffixed macro) aliases `1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionIndex {
    by_ordinal: BTreeMap<usize, FunctionId>,
}

impl FunctionIndex {
    pub fn build(expression: &str) -> Self {
        let mut by_ordinal = BTreeMap::new();
        for (i, caps) in FUNCTION_REF.captures_iter(expression).enumerate() {
            by_ordinal.insert(i + 1, caps[1].to_string());
        }
        if let Some(first) = by_ordinal.get(&1).cloned() {
            by_ordinal.insert(0, first);
        }
        Self { by_ordinal }
    }

    pub fn function_id(&self, ordinal: usize) -> Option<&FunctionId> {
        self.by_ordinal.get(&ordinal)
    }

    /// Number of function references, not counting the `0` alias.
    pub fn len(&self) -> usize {
        self.by_ordinal.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.by_ordinal.is_empty()
    }
}

/// Spelling of an indexed macro: `{HOST.HOST}` for ordinal 0, `{HOST.HOST2}` otherwise.
pub fn function_macro_name(base: &str, ordinal: usize) -> String {
    if ordinal == 0 {
        format!("{{{base}}}")
    } else {
        format!("{{{base}{ordinal}}}")
    }
}

// ── Expression constants ──────────────────────────────────────

/// Constants of a trigger expression in order of appearance: numbers
/// (with optional unit suffix), quoted strings (unquoted) and user macro
/// tokens left after expansion. Function references are skipped.
pub fn expression_constants(expression: &str) -> Vec<String> {
    let mut constants = Vec::new();
    let mut prev_end = 0;
    for m in EXPRESSION_TOKEN.find_iter(expression) {
        let token = m.as_str();
        let glued = expression[prev_end..m.start()]
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        prev_end = m.end();

        if token.starts_with('{') && !token.starts_with("{$") {
            continue;
        }
        if let Some(quoted) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            constants.push(quoted.replace("\\\"", "\"").replace("\\\\", "\\"));
        } else if token.starts_with("{$") {
            constants.push(token.to_string());
        } else if !glued {
            constants.push(token.to_string());
        }
    }
    constants
}

/// Value of reference `$n` (1-based); an absent constant resolves to "".
pub fn reference_value(constants: &[String], reference: &str) -> String {
    reference
        .strip_prefix('$')
        .and_then(|d| d.parse::<usize>().ok())
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| constants.get(i))
        .cloned()
        .unwrap_or_default()
}
