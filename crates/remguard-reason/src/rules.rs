//! Deterministic rule-based reasoner
//!
//! The fallback path: a fixed, ordered rule table over the evidence.
//! First matching rule wins. Confidences are fixed per rule and sit
//! deliberately below what a well-functioning primary backend returns,
//! so fallback hypotheses tend to route through human approval.

use crate::backend::{ClusterEvidence, ReasoningBackend};
use crate::error::ReasonError;
use crate::hypothesis::{Hypothesis, HypothesisCategory, ReasonerPath};
use remguard_signal::SourceKind;

const CONFIG_KEYWORDS: &[&str] = &[
    "config",
    "configuration",
    "environment",
    "env var",
    "endpoint",
    "setting",
    "credential",
];

const DOCS_KEYWORDS: &[&str] = &[
    "documentation",
    "docs",
    "guide",
    "tutorial",
    "unclear",
    "instructions",
];

/// Rule-table reasoner; always answers
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleReasoner;

impl RuleReasoner {
    /// Apply the rule table; total over all evidence
    #[must_use]
    pub fn evaluate(&self, evidence: &ClusterEvidence) -> Hypothesis {
        let ids = evidence.signals.iter().map(|s| s.id).collect();
        self.classify(evidence).with_evidence(ids)
    }

    fn classify(&self, evidence: &ClusterEvidence) -> Hypothesis {
        if has_auth_errors(evidence) {
            return Hypothesis::new(
                HypothesisCategory::MigrationMisstep,
                0.75,
                "authentication rejections (401/403) during an active migration \
                 usually mean credentials were rotated or scoped incorrectly",
                ReasonerPath::Fallback,
            );
        }

        if mentions_any(evidence, CONFIG_KEYWORDS) {
            return Hypothesis::new(
                HypothesisCategory::ConfigError,
                0.70,
                "error messages reference configuration or environment settings",
                ReasonerPath::Fallback,
            );
        }

        if dominant_source(evidence) == Some(SourceKind::WebhookFailure) {
            return Hypothesis::new(
                HypothesisCategory::ConfigError,
                0.65,
                "webhook deliveries failing; endpoint or secret is likely misconfigured",
                ReasonerPath::Fallback,
            );
        }

        if has_not_found_errors(evidence) {
            return if evidence.is_widespread() {
                Hypothesis::new(
                    HypothesisCategory::PlatformRegression,
                    0.68,
                    "404/405 responses across multiple tenants suggest a route was \
                     removed or renamed platform-side",
                    ReasonerPath::Fallback,
                )
                .with_alternative(
                    HypothesisCategory::MigrationMisstep,
                    0.65,
                    "spread across tenants makes a single-tenant misstep unlikely",
                )
            } else {
                Hypothesis::new(
                    HypothesisCategory::MigrationMisstep,
                    0.65,
                    "404/405 responses for one tenant suggest calls against a \
                     not-yet-migrated or already-retired endpoint",
                    ReasonerPath::Fallback,
                )
                .with_alternative(
                    HypothesisCategory::PlatformRegression,
                    0.68,
                    "no other tenant shows the same fingerprint",
                )
            };
        }

        if dominant_source(evidence) == Some(SourceKind::CheckoutError) {
            return Hypothesis::new(
                HypothesisCategory::MigrationMisstep,
                0.60,
                "checkout breakage during migration most often traces back to an \
                 incomplete cutover step",
                ReasonerPath::Fallback,
            );
        }

        if evidence.is_widespread() {
            return Hypothesis::new(
                HypothesisCategory::PlatformRegression,
                0.70,
                "the same failure fingerprint appears for several tenants at once",
                ReasonerPath::Fallback,
            );
        }

        if mentions_any(evidence, DOCS_KEYWORDS) {
            return Hypothesis::new(
                HypothesisCategory::DocumentationGap,
                0.60,
                "reports reference documentation or unclear instructions",
                ReasonerPath::Fallback,
            );
        }

        Hypothesis::new(
            HypothesisCategory::MigrationMisstep,
            0.50,
            "no specific rule matched; defaulting to a migration misstep at low confidence",
            ReasonerPath::Fallback,
        )
    }
}

#[async_trait::async_trait]
impl ReasoningBackend for RuleReasoner {
    fn name(&self) -> &str {
        "rule_table"
    }

    async fn reason(&self, evidence: &ClusterEvidence) -> Result<Hypothesis, ReasonError> {
        if evidence.signals.is_empty() {
            return Err(ReasonError::EmptyEvidence);
        }
        Ok(self.evaluate(evidence))
    }
}

fn has_auth_errors(evidence: &ClusterEvidence) -> bool {
    evidence.signals.iter().any(|s| {
        s.error_code.as_deref().is_some_and(|code| {
            let code = code.to_ascii_lowercase();
            code.contains("401")
                || code.contains("403")
                || code.contains("unauthorized")
                || code.contains("forbidden")
        })
    })
}

fn has_not_found_errors(evidence: &ClusterEvidence) -> bool {
    evidence.signals.iter().any(|s| {
        s.error_code
            .as_deref()
            .is_some_and(|code| code.contains("404") || code.contains("405"))
    })
}

fn mentions_any(evidence: &ClusterEvidence, keywords: &[&str]) -> bool {
    evidence.signals.iter().any(|s| {
        s.error_message.as_deref().is_some_and(|message| {
            let message = message.to_ascii_lowercase();
            keywords.iter().any(|k| message.contains(k))
        })
    })
}

fn dominant_source(evidence: &ClusterEvidence) -> Option<SourceKind> {
    let mut counts = std::collections::BTreeMap::new();
    for signal in &evidence.signals {
        *counts.entry(signal.source).or_insert(0usize) += 1;
    }
    counts.into_iter().max_by_key(|(_, n)| *n).map(|(k, _)| k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use remguard_pattern::PatternLabel;
    use remguard_signal::{Severity, Signal, TenantId};

    fn evidence_from(signals: Vec<Signal>, correlated: usize) -> ClusterEvidence {
        let severity = signals.iter().map(|s| s.severity).max().unwrap_or_default();
        ClusterEvidence {
            tenant: TenantId::new("m1"),
            label: PatternLabel::ConfigDrift,
            severity,
            similarity: 1.0,
            correlated_tenants: correlated,
            signals,
        }
    }

    fn api(code: &str) -> Signal {
        Signal::new(SourceKind::ApiFailure, TenantId::new("m1"), Severity::High)
            .with_error_code(code)
    }

    #[test]
    fn auth_rejections_mean_migration_misstep() {
        let h = RuleReasoner.evaluate(&evidence_from(vec![api("401"), api("401")], 0));
        assert_eq!(h.category, HypothesisCategory::MigrationMisstep);
        assert_eq!(h.confidence, 0.75);
        assert_eq!(h.path, ReasonerPath::Fallback);
        assert_eq!(h.evidence.len(), 2);
    }

    #[test]
    fn config_keywords_trump_source() {
        let signal = api("500").with_error_message("invalid environment configuration");
        let h = RuleReasoner.evaluate(&evidence_from(vec![signal], 0));
        assert_eq!(h.category, HypothesisCategory::ConfigError);
        assert_eq!(h.confidence, 0.70);
    }

    #[test]
    fn webhook_failures_point_at_config() {
        let signal = Signal::new(
            SourceKind::WebhookFailure,
            TenantId::new("m1"),
            Severity::Medium,
        )
        .with_error_code("timeout");
        let h = RuleReasoner.evaluate(&evidence_from(vec![signal], 0));
        assert_eq!(h.category, HypothesisCategory::ConfigError);
        assert_eq!(h.confidence, 0.65);
    }

    #[test]
    fn widespread_not_found_is_platform_regression() {
        let h = RuleReasoner.evaluate(&evidence_from(vec![api("404")], 3));
        assert_eq!(h.category, HypothesisCategory::PlatformRegression);
        assert_eq!(h.confidence, 0.68);
    }

    #[test]
    fn isolated_not_found_is_migration_misstep() {
        let h = RuleReasoner.evaluate(&evidence_from(vec![api("404")], 0));
        assert_eq!(h.category, HypothesisCategory::MigrationMisstep);
        assert_eq!(h.confidence, 0.65);
    }

    #[test]
    fn checkout_errors_default_to_migration() {
        let signal = Signal::new(
            SourceKind::CheckoutError,
            TenantId::new("m1"),
            Severity::High,
        )
        .with_error_code("cart_failed");
        let h = RuleReasoner.evaluate(&evidence_from(vec![signal], 0));
        assert_eq!(h.category, HypothesisCategory::MigrationMisstep);
        assert_eq!(h.confidence, 0.60);
    }

    #[test]
    fn multi_tenant_spread_is_platform_regression() {
        let h = RuleReasoner.evaluate(&evidence_from(vec![api("500")], 4));
        assert_eq!(h.category, HypothesisCategory::PlatformRegression);
        assert_eq!(h.confidence, 0.70);
    }

    #[test]
    fn docs_keywords_mean_documentation_gap() {
        let signal = Signal::new(
            SourceKind::SupportTicket,
            TenantId::new("m1"),
            Severity::Low,
        )
        .with_error_message("the migration guide instructions are unclear");
        let h = RuleReasoner.evaluate(&evidence_from(vec![signal], 0));
        assert_eq!(h.category, HypothesisCategory::DocumentationGap);
        assert_eq!(h.confidence, 0.60);
    }

    #[test]
    fn unmatched_evidence_gets_low_confidence_default() {
        let signal = Signal::new(
            SourceKind::SupportTicket,
            TenantId::new("m1"),
            Severity::Low,
        );
        let h = RuleReasoner.evaluate(&evidence_from(vec![signal], 0));
        assert_eq!(h.category, HypothesisCategory::MigrationMisstep);
        assert_eq!(h.confidence, 0.50);
    }

    #[tokio::test]
    async fn empty_evidence_is_rejected() {
        let result = RuleReasoner.reason(&evidence_from(Vec::new(), 0)).await;
        assert!(matches!(result, Err(ReasonError::EmptyEvidence)));
    }
}
