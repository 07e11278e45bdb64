//! Guarded plan executor
//!
//! One `ActionIntegration` per external system, registered by action
//! kind. Guards are applied in a fixed order: approval check, rate
//! quota, circuit breaker, then the attempt loop with retry and a hard
//! deadline. Operational trouble becomes an `Outcome`, never an `Err`;
//! errors are reserved for contract violations (unapproved plan, missing
//! integration).

use crate::audit::{AuditEntry, AuditTrail};
use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::error::ExecError;
use crate::outcome::{Outcome, OutcomeStatus};
use crate::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::retry::RetryPolicy;
use dashmap::DashMap;
use remguard_policy::{ActionKind, ActionPlan, RiskTier};
use remguard_signal::TenantId;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Executor tunables
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Hard deadline per integration attempt
    pub execution_timeout: Duration,
    /// Retry policy for transient integration failures
    pub retry: RetryPolicy,
    /// Per-tenant rate quota
    pub rate_limiter: RateLimiterConfig,
    /// Per-integration breaker settings
    pub breaker: BreakerConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limiter: RateLimiterConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// An external system the agent can act through
#[async_trait::async_trait]
pub trait ActionIntegration: Send + Sync {
    /// Name used in logs and audit entries
    fn name(&self) -> &str;

    /// Perform the plan's action, returning a result payload
    async fn execute(&self, plan: &ActionPlan) -> Result<serde_json::Value, ExecError>;
}

/// What one execution produced
#[derive(Debug)]
pub struct ExecutionReport {
    /// Terminal outcome
    pub outcome: Outcome,
    /// Escalation synthesized when the plan failed outright
    pub follow_up: Option<ActionPlan>,
}

/// Guarded plan executor
pub struct Executor {
    config: ExecutorConfig,
    integrations: DashMap<ActionKind, Arc<dyn ActionIntegration>>,
    breakers: DashMap<ActionKind, CircuitBreaker>,
    rate_limiter: RateLimiter,
    audit: Arc<AuditTrail>,
}

impl Executor {
    /// Create an executor writing to the given audit trail
    #[must_use]
    pub fn new(config: ExecutorConfig, audit: Arc<AuditTrail>) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limiter.clone());
        Self {
            config,
            integrations: DashMap::new(),
            breakers: DashMap::new(),
            rate_limiter,
            audit,
        }
    }

    /// Register the integration handling one action kind
    pub fn register(&self, kind: ActionKind, integration: Arc<dyn ActionIntegration>) {
        self.integrations.insert(kind, integration);
    }

    /// The audit trail this executor writes to
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.audit
    }

    /// Execute an approved plan for a tenant
    ///
    /// # Errors
    /// `ExecError::NotApproved` when the plan is approval-gated without
    /// an approval; `ExecError::NoIntegration` when nothing handles the
    /// plan's action kind. All operational failures are reported through
    /// the returned `Outcome` instead.
    pub async fn execute(
        &self,
        plan: &ActionPlan,
        tenant: &TenantId,
    ) -> Result<ExecutionReport, ExecError> {
        if !plan.is_executable() {
            return Err(ExecError::NotApproved(plan.id.to_string()));
        }
        let integration = self
            .integrations
            .get(&plan.kind)
            .map(|i| Arc::clone(&i))
            .ok_or(ExecError::NoIntegration(plan.kind.as_str()))?;

        let started = Instant::now();
        let subject = plan.id.to_string();

        if !self.rate_limiter.try_acquire(tenant) {
            self.audit.append(AuditEntry::new(
                "executor",
                "throttled",
                &subject,
                format!("tenant {tenant} at rate quota"),
            ));
            return Ok(self.report(plan, OutcomeStatus::Throttled, started, None));
        }

        {
            let breaker = self.breakers.entry(plan.kind).or_insert_with(|| {
                CircuitBreaker::new(self.config.breaker.clone())
            });
            if !breaker.allow() {
                self.audit.append(AuditEntry::new(
                    "executor",
                    "breaker_open",
                    &subject,
                    format!("integration {} circuit open", integration.name()),
                ));
                return Ok(self.report(plan, OutcomeStatus::Throttled, started, None));
            }
        }

        let (status, result) = self.attempt_loop(plan, integration.as_ref(), &subject).await;
        let report = self.report(plan, status, started, result);
        Ok(report)
    }

    async fn attempt_loop(
        &self,
        plan: &ActionPlan,
        integration: &dyn ActionIntegration,
        subject: &str,
    ) -> (OutcomeStatus, Option<serde_json::Value>) {
        let mut attempt = 1;
        loop {
            self.audit.append(AuditEntry::new(
                "executor",
                "attempt",
                subject,
                format!("attempt {attempt} via {}", integration.name()),
            ));

            let call = integration.execute(plan);
            match tokio::time::timeout(self.config.execution_timeout, call).await {
                Err(_) => {
                    self.breaker_failure(plan.kind);
                    self.audit.append(AuditEntry::new(
                        "executor",
                        "timeout",
                        subject,
                        format!(
                            "no answer within {}s",
                            self.config.execution_timeout.as_secs()
                        ),
                    ));
                    return (OutcomeStatus::Timeout, None);
                }
                Ok(Ok(payload)) => {
                    self.breaker_success(plan.kind);
                    self.audit.append(AuditEntry::new(
                        "executor",
                        "succeeded",
                        subject,
                        format!("attempt {attempt}"),
                    ));
                    return (OutcomeStatus::Success, Some(payload));
                }
                Ok(Err(err)) => {
                    self.breaker_failure(plan.kind);
                    let retryable =
                        err.is_retryable() && attempt < self.config.retry.max_attempts();
                    self.audit.append(AuditEntry::new(
                        "executor",
                        if retryable { "retrying" } else { "failed" },
                        subject,
                        err.to_string(),
                    ));
                    if !retryable {
                        return (OutcomeStatus::Failed, None);
                    }
                    tokio::time::sleep(self.config.retry.delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn report(
        &self,
        plan: &ActionPlan,
        status: OutcomeStatus,
        started: Instant,
        result: Option<serde_json::Value>,
    ) -> ExecutionReport {
        let mut outcome = Outcome::new(plan.id, status, started.elapsed());
        if let Some(result) = result {
            outcome = outcome.with_result(result);
        }

        metrics::counter!("remguard_executions_total", "status" => status.as_str())
            .increment(1);
        tracing::info!(
            plan_id = %plan.id,
            issue_id = %plan.issue_id,
            kind = %plan.kind,
            status = %status,
            latency_ms = outcome.latency.as_millis() as u64,
            "plan executed"
        );

        let follow_up = (status == OutcomeStatus::Failed).then(|| self.escalate(plan));
        ExecutionReport { outcome, follow_up }
    }

    /// A plan that failed after all retries turns into an engineering
    /// escalation that a human must sign off on
    fn escalate(&self, failed: &ActionPlan) -> ActionPlan {
        let follow_up = ActionPlan::new(
            failed.issue_id,
            ActionKind::EngineeringEscalation,
            RiskTier::High,
        )
        .with_approval_required()
        .with_rationale(format!(
            "automatic remediation {} ({}) failed after retries",
            failed.id, failed.kind,
        ))
        .with_param("failed_plan", failed.id.to_string());

        self.audit.append(AuditEntry::new(
            "executor",
            "follow_up_created",
            follow_up.id.to_string(),
            format!("escalation for failed plan {}", failed.id),
        ));
        follow_up
    }

    fn breaker_success(&self, kind: ActionKind) {
        if let Some(breaker) = self.breakers.get(&kind) {
            breaker.record_success();
        }
    }

    fn breaker_failure(&self, kind: ActionKind) {
        if let Some(breaker) = self.breakers.get(&kind) {
            breaker.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use remguard_signal::IssueId;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedIntegration {
        calls: AtomicU32,
        fail_first: u32,
        permanent: bool,
    }

    impl ScriptedIntegration {
        fn always_ok() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first: 0,
                permanent: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl ActionIntegration for ScriptedIntegration {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, _: &ActionPlan) -> Result<serde_json::Value, ExecError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(ExecError::PermanentFailure("bad params".into()));
            }
            if call < self.fail_first {
                return Err(ExecError::IntegrationFailure("502".into()));
            }
            Ok(serde_json::json!({ "ticket": "SUP-1" }))
        }
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            execution_timeout: Duration::from_millis(50),
            retry: RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            ..ExecutorConfig::default()
        }
    }

    fn plan() -> ActionPlan {
        ActionPlan::new(IssueId::new(), ActionKind::SupportGuidance, RiskTier::Low)
    }

    fn tenant() -> TenantId {
        TenantId::new("m1")
    }

    #[tokio::test]
    async fn success_with_payload_and_audit() {
        let executor = Executor::new(fast_config(), Arc::new(AuditTrail::new()));
        executor.register(
            ActionKind::SupportGuidance,
            Arc::new(ScriptedIntegration::always_ok()),
        );

        let report = executor.execute(&plan(), &tenant()).await.unwrap();
        assert_eq!(report.outcome.status, OutcomeStatus::Success);
        assert!(report.outcome.result.is_some());
        assert!(report.follow_up.is_none());
        assert!(executor.audit().verify_integrity().is_ok());
        assert!(executor.audit().len() >= 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let integration = Arc::new(ScriptedIntegration {
            calls: AtomicU32::new(0),
            fail_first: 2,
            permanent: false,
        });
        let executor = Executor::new(fast_config(), Arc::new(AuditTrail::new()));
        executor.register(ActionKind::SupportGuidance, integration.clone());

        let report = executor.execute(&plan(), &tenant()).await.unwrap();
        assert_eq!(report.outcome.status, OutcomeStatus::Success);
        assert_eq!(integration.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries_and_escalates() {
        let integration = Arc::new(ScriptedIntegration {
            calls: AtomicU32::new(0),
            fail_first: 0,
            permanent: true,
        });
        let executor = Executor::new(fast_config(), Arc::new(AuditTrail::new()));
        executor.register(ActionKind::SupportGuidance, integration.clone());

        let source = plan();
        let report = executor.execute(&source, &tenant()).await.unwrap();
        assert_eq!(report.outcome.status, OutcomeStatus::Failed);
        assert_eq!(integration.calls.load(Ordering::SeqCst), 1);

        let follow_up = report.follow_up.unwrap();
        assert_eq!(follow_up.kind, ActionKind::EngineeringEscalation);
        assert_eq!(follow_up.issue_id, source.issue_id);
        assert!(follow_up.requires_approval);
    }

    #[tokio::test]
    async fn slow_integration_yields_timeout_outcome() {
        struct SlowIntegration;

        #[async_trait::async_trait]
        impl ActionIntegration for SlowIntegration {
            fn name(&self) -> &str {
                "slow"
            }

            async fn execute(&self, _: &ActionPlan) -> Result<serde_json::Value, ExecError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(serde_json::Value::Null)
            }
        }

        let executor = Executor::new(fast_config(), Arc::new(AuditTrail::new()));
        executor.register(ActionKind::SupportGuidance, Arc::new(SlowIntegration));

        let report = executor.execute(&plan(), &tenant()).await.unwrap();
        assert_eq!(report.outcome.status, OutcomeStatus::Timeout);
        assert!(report.follow_up.is_none());
    }

    #[tokio::test]
    async fn rate_quota_throttles() {
        let config = ExecutorConfig {
            rate_limiter: RateLimiterConfig {
                max_actions: 1,
                window: Duration::from_secs(60),
            },
            ..fast_config()
        };
        let executor = Executor::new(config, Arc::new(AuditTrail::new()));
        executor.register(
            ActionKind::SupportGuidance,
            Arc::new(ScriptedIntegration::always_ok()),
        );

        let first = executor.execute(&plan(), &tenant()).await.unwrap();
        assert_eq!(first.outcome.status, OutcomeStatus::Success);

        let second = executor.execute(&plan(), &tenant()).await.unwrap();
        assert_eq!(second.outcome.status, OutcomeStatus::Throttled);
    }

    #[tokio::test]
    async fn open_breaker_short_circuits() {
        let config = ExecutorConfig {
            breaker: BreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
            },
            ..fast_config()
        };
        let integration = Arc::new(ScriptedIntegration {
            calls: AtomicU32::new(0),
            fail_first: 0,
            permanent: true,
        });
        let executor = Executor::new(config, Arc::new(AuditTrail::new()));
        executor.register(ActionKind::SupportGuidance, integration.clone());

        let first = executor.execute(&plan(), &tenant()).await.unwrap();
        assert_eq!(first.outcome.status, OutcomeStatus::Failed);

        let second = executor.execute(&plan(), &tenant()).await.unwrap();
        assert_eq!(second.outcome.status, OutcomeStatus::Throttled);
        // Breaker refused before the integration was called again
        assert_eq!(integration.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unapproved_plan_is_a_contract_violation() {
        let executor = Executor::new(fast_config(), Arc::new(AuditTrail::new()));
        executor.register(
            ActionKind::TemporaryMitigation,
            Arc::new(ScriptedIntegration::always_ok()),
        );

        let gated = ActionPlan::new(
            IssueId::new(),
            ActionKind::TemporaryMitigation,
            RiskTier::High,
        )
        .with_approval_required();

        let result = executor.execute(&gated, &tenant()).await;
        assert!(matches!(result, Err(ExecError::NotApproved(_))));
    }

    #[tokio::test]
    async fn missing_integration_errors() {
        let executor = Executor::new(fast_config(), Arc::new(AuditTrail::new()));
        let result = executor.execute(&plan(), &tenant()).await;
        assert!(matches!(result, Err(ExecError::NoIntegration(_))));
    }
}
