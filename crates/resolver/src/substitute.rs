//! Replacement of macro tokens with resolved values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::patterns::MacroMatcher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub token: String,
    pub value: String,
    pub is_unresolved: bool,
}

/// Token spelling → value, for one entity key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMap {
    values: HashMap<String, ResolvedValue>,
}

impl ResolvedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        let token = token.into();
        self.values.insert(
            token.clone(),
            ResolvedValue {
                token,
                value: value.into(),
                is_unresolved: false,
            },
        );
    }

    /// Record `token` as unresolved with `marker` as its value. A later
    /// `insert` for the same token replaces it.
    pub fn insert_unresolved(&mut self, token: impl Into<String>, marker: &str) {
        let token = token.into();
        self.values.insert(
            token.clone(),
            ResolvedValue {
                token,
                value: marker.to_string(),
                is_unresolved: true,
            },
        );
    }

    pub fn get(&self, token: &str) -> Option<&ResolvedValue> {
        self.values.get(token)
    }

    pub fn value(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(|v| v.value.as_str())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.values.contains_key(token)
    }

    pub fn extend(&mut self, other: ResolvedMap) {
        self.values.extend(other.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn unresolved_tokens(&self) -> impl Iterator<Item = &str> {
        self.values
            .values()
            .filter(|v| v.is_unresolved)
            .map(|v| v.token.as_str())
    }
}

/// Replace every macro the matcher finds in `text` by its value in `values`.
///
/// Matches are applied from the highest offset down so earlier offsets stay
/// valid. Tokens without an entry are left verbatim.
pub fn substitute(text: &str, matcher: &MacroMatcher, values: &ResolvedMap) -> String {
    if values.is_empty() {
        return text.to_string();
    }
    let mut out = text.to_string();
    for (offset, token) in matcher.positions(text).into_iter().rev() {
        if let Some(value) = values.value(token) {
            out.replace_range(offset..offset + token.len(), value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::MacroFamily;

    fn matcher() -> MacroMatcher {
        MacroMatcher::new(&[MacroFamily::Host, MacroFamily::User], false)
    }

    #[test]
    fn replaces_every_occurrence() {
        let mut values = ResolvedMap::new();
        values.insert("{HOST.HOST}", "web01");
        let out = substitute("{HOST.HOST}/{HOST.HOST}", &matcher(), &values);
        assert_eq!(out, "web01/web01");
    }

    #[test]
    fn missing_tokens_stay_verbatim() {
        let mut values = ResolvedMap::new();
        values.insert("{$A}", "1");
        let out = substitute("{HOST.NAME} {$A} {$B}", &matcher(), &values);
        assert_eq!(out, "{HOST.NAME} 1 {$B}");
    }

    #[test]
    fn unresolved_marker_is_substituted() {
        let mut values = ResolvedMap::new();
        values.insert_unresolved("{HOST.NAME}", "*UNKNOWN*");
        assert_eq!(substitute("{HOST.NAME}", &matcher(), &values), "*UNKNOWN*");
        assert_eq!(values.unresolved_tokens().collect::<Vec<_>>(), vec!["{HOST.NAME}"]);
    }

    #[test]
    fn right_to_left_matches_fresh_copy_rebuild() {
        let text = "a{HOST.HOST}bb{$LONGER_NAME}c{HOST.NAME}";
        let mut values = ResolvedMap::new();
        values.insert("{HOST.HOST}", "x");
        values.insert("{$LONGER_NAME}", "a much longer replacement value");
        values.insert("{HOST.NAME}", "");

        let m = matcher();
        // Rebuild left to right from the original offsets.
        let mut expected = String::new();
        let mut cursor = 0;
        for (offset, token) in m.positions(text) {
            expected.push_str(&text[cursor..offset]);
            expected.push_str(values.value(token).unwrap_or(token));
            cursor = offset + token.len();
        }
        expected.push_str(&text[cursor..]);

        assert_eq!(substitute(text, &m, &values), expected);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let mut values = ResolvedMap::new();
        values.insert("{HOST.HOST}", "db01");
        let m = matcher();
        let once = substitute("on {HOST.HOST}", &m, &values);
        assert_eq!(substitute(&once, &m, &values), once);
    }
}
