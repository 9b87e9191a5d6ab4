use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub const DEFAULT_UNRESOLVED_MARKER: &str = "*UNKNOWN*";
pub const DEFAULT_SECRET_MASK: &str = "******";
pub const DEFAULT_TRIM_LENGTH: usize = 20;
/// One nested resolution of interface fields, on top of the outer call.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 2;

// ── Resolver config ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Substituted for host, interface, item and functional macros that cannot be resolved.
    pub unresolved_marker: String,
    /// Substituted for secret user macros.
    pub secret_mask: String,
    /// Text history values longer than this are cut and suffixed with `...`.
    pub trim_length: usize,
    /// Levels of nested text resolution allowed. At least 1; the resolver
    /// raises 0 to 1.
    pub max_nesting_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            unresolved_marker: DEFAULT_UNRESOLVED_MARKER.to_string(),
            secret_mask: DEFAULT_SECRET_MASK.to_string(),
            trim_length: DEFAULT_TRIM_LENGTH,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl ResolverConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CONFMACRO_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CONFMACRO_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let mut max_nesting_depth =
            profiled_env_usize(p, "MAX_NESTING_DEPTH", DEFAULT_MAX_NESTING_DEPTH);
        if max_nesting_depth == 0 {
            tracing::warn!("MAX_NESTING_DEPTH=0 would reject every call, using 1");
            max_nesting_depth = 1;
        }
        Self {
            profile: p.to_string(),
            unresolved_marker: profiled_env_or(p, "UNRESOLVED_MACRO_STRING", DEFAULT_UNRESOLVED_MARKER),
            secret_mask: profiled_env_or(p, "SECRET_MACRO_MASK", DEFAULT_SECRET_MASK),
            trim_length: profiled_env_usize(p, "HISTORY_TRIM_LENGTH", DEFAULT_TRIM_LENGTH),
            max_nesting_depth,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Resolver config loaded (profile: {}):", self.profile_label());
        tracing::info!("  unresolved marker: {}", self.unresolved_marker);
        tracing::info!("  history trim:      {} chars", self.trim_length);
        tracing::info!("  nesting depth:     {}", self.max_nesting_depth);
    }
}
