//! Signal similarity features
//!
//! Distance between two signals is a weighted disagreement over source
//! kind, error code, affected resource, and timestamp proximity. Weights
//! and the time scale are tunables, not constants.

use chrono::Duration;
use remguard_signal::Signal;
use serde::{Deserialize, Serialize};

/// Weights for the per-feature disagreement terms
///
/// Each weight contributes its full value when the feature disagrees and
/// zero when it agrees; time proximity contributes proportionally to the
/// gap, saturating at `time_scale`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureWeights {
    /// Weight for differing source kinds
    pub source: f64,
    /// Weight for differing error codes
    pub error_code: f64,
    /// Weight for differing affected resources
    pub resource: f64,
    /// Weight for timestamp distance
    pub time: f64,
    /// Gap at which the time term saturates
    pub time_scale: Duration,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            source: 0.35,
            error_code: 0.35,
            resource: 0.15,
            time: 0.15,
            time_scale: Duration::minutes(15),
        }
    }
}

impl FeatureWeights {
    fn total(&self) -> f64 {
        self.source + self.error_code + self.resource + self.time
    }
}

/// Normalized distance between two signals, in [0, 1]
///
/// Symmetric in its arguments. Two identical-looking signals at the same
/// instant have distance 0; fully disagreeing signals approach 1.
#[must_use]
pub fn signal_distance(a: &Signal, b: &Signal, weights: &FeatureWeights) -> f64 {
    let mut distance = 0.0;

    if a.source != b.source {
        distance += weights.source;
    }
    if !optional_eq(&a.error_code, &b.error_code) {
        distance += weights.error_code;
    }
    if !optional_eq(&a.affected_resource, &b.affected_resource) {
        distance += weights.resource;
    }

    let gap = (a.timestamp - b.timestamp).num_milliseconds().unsigned_abs() as f64;
    let scale = weights.time_scale.num_milliseconds().max(1) as f64;
    distance += weights.time * (gap / scale).min(1.0);

    distance / weights.total()
}

/// Equality over optional normalized fields; two missing values agree
fn optional_eq(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        (None, None) => true,
        _ => false,
    }
}
