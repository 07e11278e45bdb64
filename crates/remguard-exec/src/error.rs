//! Execution errors

use thiserror::Error;

/// Errors raised while executing a plan
#[derive(Debug, Error)]
pub enum ExecError {
    /// Plan requires approval and has none
    #[error("plan {0} is not approved for execution")]
    NotApproved(String),

    /// No integration registered for the plan's action kind
    #[error("no integration registered for action kind {0}")]
    NoIntegration(&'static str),

    /// Integration failed in a way worth retrying
    #[error("integration failure: {0}")]
    IntegrationFailure(String),

    /// Integration failed in a way that retrying cannot fix
    #[error("permanent integration failure: {0}")]
    PermanentFailure(String),

    /// Audit chain verification failed
    #[error("audit trail integrity violation at entry {index}")]
    AuditIntegrity { index: usize },
}

impl ExecError {
    /// Whether a retry of the same attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecError::IntegrationFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ExecError::IntegrationFailure("502".into()).is_retryable());
        assert!(!ExecError::PermanentFailure("bad params".into()).is_retryable());
        assert!(!ExecError::NotApproved("plan".into()).is_retryable());
        assert!(!ExecError::NoIntegration("support_guidance").is_retryable());
    }
}
