//! Agent-level error taxonomy

use remguard_signal::{IssueId, ValidationError};
use thiserror::Error;

/// State store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No issue with that id
    #[error("issue {0} not found")]
    NotFound(IssueId),

    /// Optimistic save lost the race
    #[error("version conflict on issue {issue_id}: expected {expected}, found {found}")]
    VersionConflict {
        issue_id: IssueId,
        expected: u64,
        found: u64,
    },
}

/// Top-level agent errors
///
/// The taxonomy determines handling: validation errors are never
/// retried, transient errors back off, capacity errors throttle without
/// attempting, fatal errors move the issue to `Failed`.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Malformed input; never retried
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Worth retrying with backoff
    #[error("transient: {0}")]
    Transient(String),

    /// A guard refused; not attempted at all
    #[error("capacity: {0}")]
    Capacity(String),

    /// Unrecoverable for this issue
    #[error("fatal: {0}")]
    Fatal(String),

    /// Store-level failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Transition not in the allowed table
    #[error("illegal transition {from} -> {to} on issue {issue_id}")]
    IllegalTransition {
        issue_id: IssueId,
        from: &'static str,
        to: &'static str,
    },

    /// No pending plan with that id
    #[error("no pending plan {0}")]
    UnknownPlan(String),
}

impl AgentError {
    /// Whether a retry of the same operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Transient(_) | AgentError::Capacity(_))
    }
}
