//! Confidence calibration tracking
//!
//! Every executed plan feeds back an outcome; the tracker buckets them
//! by predicted confidence and compares prediction against observation.
//! Two trip wires feed Safe Mode: aggregate drift over well-sampled
//! buckets, and a run of consecutive failures.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

const BUCKETS: usize = 10;

/// Calibration tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Aggregate drift above this trips Safe Mode
    pub drift_threshold: f64,
    /// Buckets below this sample count are excluded from drift
    pub min_bucket_samples: u64,
    /// This many consecutive failures trips Safe Mode
    pub consecutive_failure_trip: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 0.05,
            min_bucket_samples: 10,
            consecutive_failure_trip: 5,
        }
    }
}

/// One confidence range and its observed outcomes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CalibrationBucket {
    /// Midpoint of the confidence range, the predicted success rate
    pub midpoint: f64,
    /// Outcomes recorded in this range
    pub samples: u64,
    /// Outcomes that confirmed the hypothesis
    pub confirmed: u64,
}

impl CalibrationBucket {
    /// Absolute gap between predicted and observed success rate
    #[must_use]
    pub fn error(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        let observed = self.confirmed as f64 / self.samples as f64;
        (self.midpoint - observed).abs()
    }
}

/// What a recorded outcome means for Safe Mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationVerdict {
    /// Calibration still healthy
    Healthy,
    /// Aggregate drift crossed the threshold
    DriftExceeded { drift: f64 },
    /// Too many failures in a row
    ConsecutiveFailures { count: u32 },
}

#[derive(Debug)]
struct State {
    buckets: [CalibrationBucket; BUCKETS],
    consecutive_failures: u32,
    total_recorded: u64,
}

/// Outcome-vs-confidence tracker
#[derive(Debug)]
pub struct CalibrationTracker {
    config: CalibrationConfig,
    state: RwLock<State>,
}

impl CalibrationTracker {
    /// Create a tracker with the given tunables
    #[must_use]
    pub fn new(config: CalibrationConfig) -> Self {
        let mut buckets = [CalibrationBucket::default(); BUCKETS];
        for (i, bucket) in buckets.iter_mut().enumerate() {
            bucket.midpoint = (i as f64 + 0.5) / BUCKETS as f64;
        }
        Self {
            config,
            state: RwLock::new(State {
                buckets,
                consecutive_failures: 0,
                total_recorded: 0,
            }),
        }
    }

    /// Record one outcome against the confidence that predicted it
    ///
    /// Returns the resulting Safe Mode verdict. The caller owns acting
    /// on it; the tracker never flips Safe Mode itself.
    pub fn record(&self, confidence: f64, success: bool) -> CalibrationVerdict {
        let confidence = confidence.clamp(0.0, 1.0);
        let index = ((confidence * BUCKETS as f64) as usize).min(BUCKETS - 1);

        let mut state = self.state.write();
        state.total_recorded += 1;
        state.buckets[index].samples += 1;
        if success {
            state.buckets[index].confirmed += 1;
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
        }

        if state.consecutive_failures >= self.config.consecutive_failure_trip {
            let count = state.consecutive_failures;
            tracing::warn!(count, "consecutive failure trip wire hit");
            return CalibrationVerdict::ConsecutiveFailures { count };
        }

        let drift = Self::aggregate_drift(&state.buckets, self.config.min_bucket_samples);
        if drift > self.config.drift_threshold {
            tracing::warn!(drift, "calibration drift exceeded threshold");
            return CalibrationVerdict::DriftExceeded { drift };
        }

        CalibrationVerdict::Healthy
    }

    /// Sample-weighted mean error over well-sampled buckets
    #[must_use]
    pub fn drift(&self) -> f64 {
        let state = self.state.read();
        Self::aggregate_drift(&state.buckets, self.config.min_bucket_samples)
    }

    /// Current failure run length
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.state.read().consecutive_failures
    }

    /// Total outcomes recorded
    #[must_use]
    pub fn total_recorded(&self) -> u64 {
        self.state.read().total_recorded
    }

    /// Snapshot of all buckets
    #[must_use]
    pub fn buckets(&self) -> Vec<CalibrationBucket> {
        self.state.read().buckets.to_vec()
    }

    fn aggregate_drift(buckets: &[CalibrationBucket], min_samples: u64) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0u64;
        for bucket in buckets {
            if bucket.samples >= min_samples {
                weighted += bucket.error() * bucket.samples as f64;
                total += bucket.samples;
            }
        }
        if total == 0 {
            0.0
        } else {
            weighted / total as f64
        }
    }
}

impl Default for CalibrationTracker {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}
