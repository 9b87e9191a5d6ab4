use thiserror::Error;

/// Structurally invalid resolution requests.
///
/// These indicate a defect in the calling code. Missing data (unknown hosts,
/// items, functions or denied permissions) is never reported through this
/// type; it resolves to the unresolved marker instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown macro resolution scenario: {0}")]
    UnknownScenario(String),

    #[error("scenario '{scenario}' expects {expected} input")]
    InputMismatch {
        scenario: String,
        expected: &'static str,
    },

    #[error("nested macro resolution exceeded depth {depth}")]
    NestingTooDeep { depth: usize },
}

/// Failures reported by configuration and history collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
