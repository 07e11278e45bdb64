//! Reasoning policy wrapper
//!
//! Drives the primary backend under a deadline with bounded retries, and
//! substitutes the rule table when the primary cannot answer. Every
//! cluster gets a hypothesis; the only hard error is empty evidence.

use crate::backend::{ClusterEvidence, ReasoningBackend};
use crate::error::ReasonError;
use crate::hypothesis::Hypothesis;
use crate::rules::RuleReasoner;
use std::sync::Arc;
use std::time::Duration;

/// Reasoner tunables
#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    /// Deadline per primary-backend attempt
    pub backend_timeout: Duration,
    /// Retries after the first attempt, transient failures only
    pub max_retries: u32,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(10),
            max_retries: 2,
        }
    }
}

/// Primary-with-fallback reasoner
pub struct Reasoner {
    primary: Option<Arc<dyn ReasoningBackend>>,
    fallback: RuleReasoner,
    config: ReasonerConfig,
}

impl Reasoner {
    /// Rule table only; no primary backend configured
    #[must_use]
    pub fn rules_only() -> Self {
        Self {
            primary: None,
            fallback: RuleReasoner,
            config: ReasonerConfig::default(),
        }
    }

    /// With a primary backend in front of the rule table
    #[must_use]
    pub fn with_primary(primary: Arc<dyn ReasoningBackend>, config: ReasonerConfig) -> Self {
        Self {
            primary: Some(primary),
            fallback: RuleReasoner,
            config,
        }
    }

    /// Produce a hypothesis for the evidence
    ///
    /// # Errors
    /// `ReasonError::EmptyEvidence` if the cluster carries no signals.
    pub async fn reason(&self, evidence: &ClusterEvidence) -> Result<Hypothesis, ReasonError> {
        if evidence.signals.is_empty() {
            return Err(ReasonError::EmptyEvidence);
        }

        if let Some(primary) = &self.primary {
            match self.try_primary(primary.as_ref(), evidence).await {
                Ok(hypothesis) => return Ok(hypothesis),
                Err(err) => {
                    tracing::warn!(
                        backend = primary.name(),
                        error = %err,
                        tenant = %evidence.tenant,
                        "primary reasoner failed, substituting rule table"
                    );
                }
            }
        }

        Ok(self.fallback.evaluate(evidence))
    }

    async fn try_primary(
        &self,
        backend: &dyn ReasoningBackend,
        evidence: &ClusterEvidence,
    ) -> Result<Hypothesis, ReasonError> {
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(self.config.backend_timeout, backend.reason(evidence))
                .await
                .map_err(|_| ReasonError::Timeout {
                    timeout_secs: self.config.backend_timeout.as_secs(),
                })
                .and_then(|inner| inner);

            match result {
                Ok(hypothesis) => return Ok(hypothesis),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        backend = backend.name(),
                        attempt,
                        error = %err,
                        "retrying primary reasoner"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::{HypothesisCategory, ReasonerPath};
    use pretty_assertions::assert_eq;
    use remguard_pattern::PatternLabel;
    use remguard_signal::{Severity, Signal, SourceKind, TenantId};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn evidence() -> ClusterEvidence {
        let signal = Signal::new(SourceKind::ApiFailure, TenantId::new("m1"), Severity::High)
            .with_error_code("401");
        ClusterEvidence {
            tenant: TenantId::new("m1"),
            label: PatternLabel::AuthenticationFailure,
            severity: Severity::High,
            similarity: 1.0,
            correlated_tenants: 0,
            signals: vec![signal],
        }
    }

    struct FixedBackend(f64);

    #[async_trait::async_trait]
    impl ReasoningBackend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn reason(&self, e: &ClusterEvidence) -> Result<Hypothesis, ReasonError> {
            Ok(
                Hypothesis::new(
                    HypothesisCategory::ConfigError,
                    self.0,
                    "fixed answer",
                    ReasonerPath::Primary,
                )
                .with_evidence(e.signals.iter().map(|s| s.id).collect()),
            )
        }
    }

    struct FailingBackend {
        calls: AtomicU32,
        transient: bool,
    }

    #[async_trait::async_trait]
    impl ReasoningBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        async fn reason(&self, _: &ClusterEvidence) -> Result<Hypothesis, ReasonError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.transient {
                Err(ReasonError::BackendUnavailable("503".into()))
            } else {
                Err(ReasonError::BackendRejected("nope".into()))
            }
        }
    }

    #[tokio::test]
    async fn primary_answer_wins() {
        let reasoner =
            Reasoner::with_primary(Arc::new(FixedBackend(0.9)), ReasonerConfig::default());
        let h = reasoner.reason(&evidence()).await.unwrap();
        assert_eq!(h.path, ReasonerPath::Primary);
        assert_eq!(h.confidence, 0.9);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_fall_back() {
        let backend = Arc::new(FailingBackend {
            calls: AtomicU32::new(0),
            transient: true,
        });
        let reasoner = Reasoner::with_primary(backend.clone(), ReasonerConfig::default());

        let h = reasoner.reason(&evidence()).await.unwrap();
        assert_eq!(h.path, ReasonerPath::Fallback);
        // first attempt + 2 retries
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_failures_skip_retries() {
        let backend = Arc::new(FailingBackend {
            calls: AtomicU32::new(0),
            transient: false,
        });
        let reasoner = Reasoner::with_primary(backend.clone(), ReasonerConfig::default());

        let h = reasoner.reason(&evidence()).await.unwrap();
        assert_eq!(h.path, ReasonerPath::Fallback);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_backend_times_out_to_fallback() {
        struct SlowBackend;

        #[async_trait::async_trait]
        impl ReasoningBackend for SlowBackend {
            fn name(&self) -> &str {
                "slow"
            }

            async fn reason(&self, _: &ClusterEvidence) -> Result<Hypothesis, ReasonError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                unreachable!("deadline should fire first")
            }
        }

        let config = ReasonerConfig {
            backend_timeout: Duration::from_millis(10),
            max_retries: 0,
        };
        let reasoner = Reasoner::with_primary(Arc::new(SlowBackend), config);

        let h = reasoner.reason(&evidence()).await.unwrap();
        assert_eq!(h.path, ReasonerPath::Fallback);
        assert_eq!(h.category, HypothesisCategory::MigrationMisstep);
    }

    #[tokio::test]
    async fn rules_only_goes_straight_to_fallback() {
        let h = Reasoner::rules_only().reason(&evidence()).await.unwrap();
        assert_eq!(h.path, ReasonerPath::Fallback);
        assert_eq!(h.confidence, 0.75);
    }

    #[tokio::test]
    async fn empty_evidence_errors() {
        let mut e = evidence();
        e.signals.clear();
        let result = Reasoner::rules_only().reason(&e).await;
        assert!(matches!(result, Err(ReasonError::EmptyEvidence)));
    }
}
