//! Hypothesis value object

use remguard_signal::SignalId;
use serde::{Deserialize, Serialize};

/// Root-cause category for an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisCategory {
    /// Tenant executed a migration step incorrectly or out of order
    MigrationMisstep,
    /// The platform itself regressed; likely affects many tenants
    PlatformRegression,
    /// Tenant-side configuration is wrong (credentials, endpoints)
    ConfigError,
    /// Documentation is missing or misleading for this flow
    DocumentationGap,
}

impl HypothesisCategory {
    /// Stable label used in metrics and audit entries
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HypothesisCategory::MigrationMisstep => "migration_misstep",
            HypothesisCategory::PlatformRegression => "platform_regression",
            HypothesisCategory::ConfigError => "config_error",
            HypothesisCategory::DocumentationGap => "documentation_gap",
        }
    }
}

impl std::fmt::Display for HypothesisCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path produced the hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonerPath {
    /// Pluggable primary backend answered
    Primary,
    /// Deterministic rule table answered
    Fallback,
}

/// A candidate cause that was considered and set aside
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    /// Category that was considered
    pub category: HypothesisCategory,
    /// Confidence it would have carried
    pub confidence: f64,
    /// Why it lost to the chosen hypothesis
    pub rejected_because: String,
}

/// A single root-cause hypothesis with confidence
///
/// Confidence is always in [0, 1]; constructors clamp rather than error
/// so a sloppy backend cannot poison downstream policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Root-cause category
    pub category: HypothesisCategory,
    /// Confidence in [0, 1], post-calibration-scale
    pub confidence: f64,
    /// Human-readable explanation of the reasoning
    pub explanation: String,
    /// Signals the hypothesis rests on
    pub evidence: Vec<SignalId>,
    /// Causes considered but set aside
    pub alternatives: Vec<Alternative>,
    /// Which reasoning path produced this
    pub path: ReasonerPath,
}

impl Hypothesis {
    /// Create a hypothesis; confidence is clamped into [0, 1]
    #[must_use]
    pub fn new(
        category: HypothesisCategory,
        confidence: f64,
        explanation: impl Into<String>,
        path: ReasonerPath,
    ) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            explanation: explanation.into(),
            evidence: Vec::new(),
            alternatives: Vec::new(),
            path,
        }
    }

    /// Attach the evidence signal ids
    #[inline]
    #[must_use]
    pub fn with_evidence(mut self, evidence: Vec<SignalId>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Record a cause that was considered but set aside
    #[inline]
    #[must_use]
    pub fn with_alternative(
        mut self,
        category: HypothesisCategory,
        confidence: f64,
        rejected_because: impl Into<String>,
    ) -> Self {
        self.alternatives.push(Alternative {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            rejected_because: rejected_because.into(),
        });
        self
    }

    /// Apply a multiplicative calibration adjustment, re-clamping
    #[inline]
    #[must_use]
    pub fn scaled(mut self, factor: f64) -> Self {
        self.confidence = (self.confidence * factor).clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn confidence_is_clamped() {
        let high = Hypothesis::new(
            HypothesisCategory::ConfigError,
            1.7,
            "over-confident backend",
            ReasonerPath::Primary,
        );
        assert_eq!(high.confidence, 1.0);

        let low = Hypothesis::new(
            HypothesisCategory::ConfigError,
            -0.2,
            "under-confident backend",
            ReasonerPath::Primary,
        );
        assert_eq!(low.confidence, 0.0);
    }

    #[test]
    fn scaling_reclamps() {
        let h = Hypothesis::new(
            HypothesisCategory::MigrationMisstep,
            0.9,
            "test",
            ReasonerPath::Fallback,
        )
        .scaled(2.0);
        assert_eq!(h.confidence, 1.0);
    }

    #[test]
    fn category_labels() {
        assert_eq!(HypothesisCategory::PlatformRegression.as_str(), "platform_regression");
        assert_eq!(HypothesisCategory::DocumentationGap.as_str(), "documentation_gap");
    }
}
