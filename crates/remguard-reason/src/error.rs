//! Reasoning errors

use thiserror::Error;

/// Errors raised while producing a hypothesis
#[derive(Debug, Error)]
pub enum ReasonError {
    /// Primary backend reported a transient failure (network, throttling)
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Primary backend rejected the request outright
    #[error("backend rejected request: {0}")]
    BackendRejected(String),

    /// Primary backend returned output that could not be interpreted
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// Primary backend did not answer within the deadline
    #[error("backend timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Evidence was empty; nothing to reason about
    #[error("cluster evidence is empty")]
    EmptyEvidence,
}

impl ReasonError {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReasonError::BackendUnavailable(_) | ReasonError::Timeout { .. }
        )
    }
}
