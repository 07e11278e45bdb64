//! Execution outcomes

use chrono::{DateTime, Utc};
use remguard_signal::PlanId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Terminal status of one plan execution
///
/// `Timeout` and `Throttled` are deliberately distinct from `Failed`:
/// neither says anything about whether the action itself works, and the
/// calibration loop must not count them against the hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Integration confirmed the action
    Success,
    /// Integration reported failure, retries exhausted
    Failed,
    /// Deadline elapsed without an answer
    Timeout,
    /// A guard refused the attempt (rate quota or open breaker)
    Throttled,
}

impl OutcomeStatus {
    /// Stable label used in metrics and audit entries
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Timeout => "timeout",
            OutcomeStatus::Throttled => "throttled",
        }
    }

    /// Whether this outcome should feed calibration
    ///
    /// Only definitive answers teach the loop anything.
    #[inline]
    #[must_use]
    pub fn is_definitive(&self) -> bool {
        matches!(self, OutcomeStatus::Success | OutcomeStatus::Failed)
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one plan execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Plan that was executed
    pub plan_id: PlanId,
    /// Terminal status
    pub status: OutcomeStatus,
    /// Wall-clock time spent, guards included
    pub latency: Duration,
    /// Integration result payload, when one was returned
    pub result: Option<serde_json::Value>,
    /// When the outcome was recorded
    pub recorded_at: DateTime<Utc>,
}

impl Outcome {
    /// Record an outcome for a plan
    #[must_use]
    pub fn new(plan_id: PlanId, status: OutcomeStatus, latency: Duration) -> Self {
        Self {
            plan_id,
            status,
            latency,
            result: None,
            recorded_at: Utc::now(),
        }
    }

    /// Attach the integration's result payload
    #[inline]
    #[must_use]
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }
}
