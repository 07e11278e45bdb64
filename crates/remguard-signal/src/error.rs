use crate::ids::SignalId;

/// Malformed input rejected at the boundary, never retried
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Required field is missing or empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Timestamp is outside the acceptable window
    #[error("timestamp out of range for signal {0}")]
    TimestampOutOfRange(SignalId),

    /// Free-text field required but empty
    #[error("empty feedback text: {0}")]
    EmptyFeedback(&'static str),
}
