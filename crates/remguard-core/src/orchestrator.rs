//! The observe-to-learn loop
//!
//! The orchestrator is the sole writer of issue state. Every signal
//! enters through `ingest`, which is idempotent on signal id; each
//! issue then moves through the pipeline under its own async mutex, so
//! trouble with one issue never blocks or corrupts another.

use crate::error::AgentError;
use crate::issue::{Issue, IssueStatus};
use crate::store::StateStore;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use remguard_exec::{AuditEntry, ExecutionReport, Executor, OutcomeStatus};
use remguard_pattern::{CandidateCluster, DetectorConfig, PatternDetector};
use remguard_policy::{
    decide, ActionPlan, CalibrationConfig, CalibrationTracker, CalibrationVerdict, IssueContext,
    PolicyConfig, SafeMode,
};
use remguard_reason::{ClusterEvidence, Reasoner};
use remguard_signal::{IssueId, PlanId, Signal, SignalId, SignalStore, SourceKind, TenantId};
use std::sync::Arc;

/// Orchestrator tunables
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Detector settings
    pub detector: DetectorConfig,
    /// Decision policy settings
    pub policy: PolicyConfig,
    /// Calibration settings
    pub calibration: CalibrationConfig,
    /// How long a plan may wait for an operator before going stale
    pub approval_timeout: Duration,
    /// Signal retention horizon
    pub signal_lookback: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            policy: PolicyConfig::default(),
            calibration: CalibrationConfig::default(),
            approval_timeout: Duration::minutes(30),
            signal_lookback: Duration::minutes(120),
        }
    }
}

/// An operator's answer to a pending plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Execute the plan
    Approve,
    /// Do not execute; feedback is mandatory
    Reject,
}

/// Drives issues through observe, detect, reason, decide, act, learn
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn StateStore>,
    signals: SignalStore,
    detector: PatternDetector,
    reasoner: Reasoner,
    executor: Executor,
    safe_mode: SafeMode,
    calibration: CalibrationTracker,
    locks: DashMap<IssueId, Arc<tokio::sync::Mutex<()>>>,
    tenant_locks: DashMap<TenantId, Arc<tokio::sync::Mutex<()>>>,
    signal_issue: DashMap<SignalId, IssueId>,
    pending_plans: DashMap<PlanId, IssueId>,
}

impl Orchestrator {
    /// Assemble the loop from its parts
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn StateStore>,
        reasoner: Reasoner,
        executor: Executor,
    ) -> Self {
        let signals = SignalStore::new(config.signal_lookback);
        let detector = PatternDetector::new(config.detector.clone());
        let calibration = CalibrationTracker::new(config.calibration.clone());
        Self {
            config,
            store,
            signals,
            detector,
            reasoner,
            executor,
            safe_mode: SafeMode::new(),
            calibration,
            locks: DashMap::new(),
            tenant_locks: DashMap::new(),
            signal_issue: DashMap::new(),
            pending_plans: DashMap::new(),
        }
    }

    /// The global Safe Mode flag
    #[must_use]
    pub fn safe_mode(&self) -> &SafeMode {
        &self.safe_mode
    }

    /// The calibration tracker
    #[must_use]
    pub fn calibration(&self) -> &CalibrationTracker {
        &self.calibration
    }

    /// Ingest one signal; idempotent on signal id
    ///
    /// Returns the id of the issue the signal belongs to. Pipeline
    /// trouble downstream of clustering moves that issue to `Failed`
    /// but does not fail the ingest.
    ///
    /// # Errors
    /// `AgentError::Validation` for malformed signals.
    pub async fn ingest(&self, signal: Signal) -> Result<IssueId, AgentError> {
        signal.validate()?;
        metrics::counter!("remguard_signals_ingested_total").increment(1);

        if !self.signals.insert(signal.clone()) {
            if let Some(existing) = self.signal_issue.get(&signal.id) {
                tracing::debug!(signal_id = %signal.id, issue_id = %*existing, "replayed signal");
                return Ok(*existing);
            }
        }

        // Detection and absorption serialize per tenant; two concurrent
        // ingests for one tenant must agree on the owning issue
        let tenant_lock = self.tenant_lock(&signal.tenant);
        let issue_id = {
            let _guard = tenant_lock.lock().await;
            let now = Utc::now();
            let window = self.signals.tenant_window(&signal.tenant, now);
            let clusters = self.detector.detect(&window);
            let cluster = clusters
                .into_iter()
                .find(|c| c.signal_ids.contains(&signal.id));

            match cluster {
                Some(cluster) => self.absorb_cluster(&cluster).await?,
                // Below the emission threshold; park the signal on a watch
                // issue that stays in Clustering until the cluster grows
                None => self.open_watch_issue(&signal).await?,
            }
        };

        if let Err(err) = self.advance(issue_id).await {
            self.quarantine(issue_id, &err).await;
        }
        Ok(issue_id)
    }

    /// Plans currently waiting on an operator
    pub async fn list_pending(&self) -> Vec<ActionPlan> {
        let mut pending = Vec::new();
        for entry in self.pending_plans.iter() {
            if let Ok(issue) = self.store.load(*entry.value()).await {
                if let Some(plan) = issue.open_plan() {
                    if plan.id == *entry.key() {
                        pending.push(plan.clone());
                    }
                }
            }
        }
        pending
    }

    /// Resolve a pending plan
    ///
    /// # Errors
    /// `AgentError::Validation` for a missing operator id or an empty
    /// rejection feedback — raised before any state changes.
    /// `AgentError::UnknownPlan` when no pending plan matches.
    pub async fn resolve(
        &self,
        plan_id: PlanId,
        decision: ApprovalDecision,
        operator: &str,
        feedback: &str,
    ) -> Result<(), AgentError> {
        // Validation happens before any lookup or mutation
        if operator.is_empty() {
            return Err(remguard_signal::ValidationError::MissingField("operator").into());
        }
        if decision == ApprovalDecision::Reject && feedback.trim().is_empty() {
            return Err(
                remguard_signal::ValidationError::EmptyFeedback("rejection feedback").into(),
            );
        }

        let issue_id = self
            .pending_plans
            .get(&plan_id)
            .map(|e| *e.value())
            .ok_or_else(|| AgentError::UnknownPlan(plan_id.to_string()))?;

        let lock = self.issue_lock(issue_id);
        let _guard = lock.lock().await;

        let mut issue = self.store.load(issue_id).await?;
        let record = issue
            .actions
            .iter_mut()
            .find(|r| r.plan.id == plan_id && r.outcome.is_none())
            .ok_or_else(|| AgentError::UnknownPlan(plan_id.to_string()))?;

        match decision {
            ApprovalDecision::Approve => {
                record.plan.approve(operator)?;
                let plan = record.plan.clone();
                issue.transition(IssueStatus::Executing)?;
                self.store.append_audit(AuditEntry::new(
                    operator,
                    "plan_approved",
                    plan.id.to_string(),
                    feedback,
                ));
                issue.version = self.store.save(&issue).await?;
                self.pending_plans.remove(&plan_id);
                self.record_pending_gauge();

                // The lock is already held here, so a fatal execution
                // error parks the issue in Failed before it surfaces
                if let Err(err) = self.run_plan(&mut issue, &plan).await {
                    self.fail_in_place(&mut issue, &err).await;
                    return Err(err);
                }
            }
            ApprovalDecision::Reject => {
                record.plan.reject(operator, feedback)?;
                let confidence = issue.hypothesis.as_ref().map(|h| h.confidence);
                issue.transition(IssueStatus::Learning)?;
                self.store.append_audit(AuditEntry::new(
                    operator,
                    "plan_rejected",
                    plan_id.to_string(),
                    feedback,
                ));
                self.pending_plans.remove(&plan_id);
                self.record_pending_gauge();

                // A rejection is evidence the hypothesis was wrong
                if let Some(confidence) = confidence {
                    self.learn(confidence, false);
                }
                issue.transition(IssueStatus::Resolved)?;
                issue.version = self.store.save(&issue).await?;
            }
        }
        Ok(())
    }

    /// Expire pending plans past the approval window
    ///
    /// Returns the issues moved to `Stale`.
    pub async fn expire_approvals(&self, now: DateTime<Utc>) -> Vec<IssueId> {
        let mut expired = Vec::new();
        let pending: Vec<(PlanId, IssueId)> = self
            .pending_plans
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();

        for (plan_id, issue_id) in pending {
            let lock = self.issue_lock(issue_id);
            let _guard = lock.lock().await;

            let Ok(mut issue) = self.store.load(issue_id).await else {
                self.pending_plans.remove(&plan_id);
                self.record_pending_gauge();
                continue;
            };
            let Some(record) = issue
                .actions
                .iter_mut()
                .find(|r| r.plan.id == plan_id && r.plan.resolution.is_none())
            else {
                self.pending_plans.remove(&plan_id);
                self.record_pending_gauge();
                continue;
            };

            if record.plan.created_at + self.config.approval_timeout > now {
                continue;
            }

            record.plan.time_out();
            if issue.transition(IssueStatus::Stale).is_ok() {
                self.store.append_audit(AuditEntry::new(
                    "agent",
                    "approval_timed_out",
                    plan_id.to_string(),
                    format!("issue {} marked stale", issue.id),
                ));
                if let Ok(version) = self.store.save(&issue).await {
                    issue.version = version;
                    expired.push(issue_id);
                }
            }
            self.pending_plans.remove(&plan_id);
            self.record_pending_gauge();
        }
        expired
    }

    /// Move a signal between issues; explicit and audited
    ///
    /// # Errors
    /// `AgentError::Fatal` when the signal is not a member of the source
    /// issue; store errors propagate.
    pub async fn reassign_signal(
        &self,
        signal_id: SignalId,
        from: IssueId,
        to: IssueId,
        operator: &str,
    ) -> Result<(), AgentError> {
        if operator.is_empty() {
            return Err(remguard_signal::ValidationError::MissingField("operator").into());
        }

        // Lock both issues in id order so concurrent reassignments
        // cannot deadlock
        let (first, second) = if from <= to { (from, to) } else { (to, from) };
        let first_lock = self.issue_lock(first);
        let second_lock = self.issue_lock(second);
        let _first_guard = first_lock.lock().await;
        let _second_guard = if first == second {
            None
        } else {
            Some(second_lock.lock().await)
        };

        let mut source = self.store.load(from).await?;
        let mut target = self.store.load(to).await?;

        if !source.detach_signal(signal_id) {
            return Err(AgentError::Fatal(format!(
                "signal {signal_id} is not a member of issue {from}"
            )));
        }
        let severity = self
            .signals
            .get(signal_id)
            .map(|s| s.severity)
            .unwrap_or(target.severity);
        target.attach_signal(signal_id, severity);
        self.signal_issue.insert(signal_id, to);

        self.store.append_audit(AuditEntry::new(
            operator,
            "signal_reassigned",
            signal_id.to_string(),
            format!("from issue {from} to issue {to}"),
        ));
        source.version = self.store.save(&source).await?;
        target.version = self.store.save(&target).await?;
        Ok(())
    }

    /// Drop signals past the retention horizon
    pub fn prune_signals(&self, now: DateTime<Utc>) -> usize {
        self.signals.prune(now)
    }

    // ----- internals -------------------------------------------------

    fn issue_lock(&self, id: IssueId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    fn tenant_lock(&self, tenant: &TenantId) -> Arc<tokio::sync::Mutex<()>> {
        self.tenant_locks.entry(tenant.clone()).or_default().clone()
    }

    fn record_pending_gauge(&self) {
        metrics::gauge!("remguard_pending_approvals").set(self.pending_plans.len() as f64);
    }

    /// Fold a detected cluster into an existing open issue, or open a
    /// new one
    async fn absorb_cluster(&self, cluster: &CandidateCluster) -> Result<IssueId, AgentError> {
        let existing = cluster
            .signal_ids
            .iter()
            .find_map(|id| self.signal_issue.get(id).map(|e| *e.value()));

        match existing {
            Some(issue_id) => {
                let lock = self.issue_lock(issue_id);
                let _guard = lock.lock().await;

                let mut issue = self.store.load(issue_id).await?;
                let mut joined = Vec::new();
                for signal_id in &cluster.signal_ids {
                    let severity = self
                        .signals
                        .get(*signal_id)
                        .map(|s| s.severity)
                        .unwrap_or(cluster.severity);
                    if issue.attach_signal(*signal_id, severity) {
                        joined.push(*signal_id);
                    }
                }
                issue.correlated_tenants = cluster.correlated_tenants;

                // New evidence on a settled issue reopens reasoning
                if !joined.is_empty()
                    && matches!(
                        issue.status,
                        IssueStatus::Resolved | IssueStatus::Learning | IssueStatus::Stale
                    )
                {
                    issue.transition(IssueStatus::Reasoning)?;
                    self.store.append_audit(AuditEntry::new(
                        "agent",
                        "issue_reopened",
                        issue_id.to_string(),
                        "new signals joined the cluster",
                    ));
                }
                issue.version = self.store.save(&issue).await?;
                // Membership is published only once the save landed
                for signal_id in joined {
                    self.signal_issue.insert(signal_id, issue_id);
                }
                Ok(issue_id)
            }
            None => {
                let mut issue = Issue::new(cluster.tenant.clone(), cluster.label, cluster.severity);
                issue.correlated_tenants = cluster.correlated_tenants;
                for signal_id in &cluster.signal_ids {
                    let severity = self
                        .signals
                        .get(*signal_id)
                        .map(|s| s.severity)
                        .unwrap_or(cluster.severity);
                    issue.attach_signal(*signal_id, severity);
                }
                issue.transition(IssueStatus::Clustering)?;
                issue.version = self.store.save(&issue).await?;
                // The mapping goes up only after the issue is durable, so
                // no reader can resolve an id the store has never seen
                for signal_id in &cluster.signal_ids {
                    self.signal_issue.insert(*signal_id, issue.id);
                }

                metrics::counter!("remguard_issues_created_total").increment(1);
                self.store.append_audit(AuditEntry::new(
                    "agent",
                    "issue_opened",
                    issue.id.to_string(),
                    format!(
                        "{} signals, label {}, tenant {}",
                        issue.signal_ids.len(),
                        issue.label.as_str(),
                        issue.tenant,
                    ),
                ));
                Ok(issue.id)
            }
        }
    }

    /// Track a signal that did not make a cluster yet
    async fn open_watch_issue(&self, signal: &Signal) -> Result<IssueId, AgentError> {
        if let Some(existing) = self.signal_issue.get(&signal.id) {
            return Ok(*existing);
        }
        let label = match signal.source {
            SourceKind::WebhookFailure => remguard_pattern::PatternLabel::WebhookProblem,
            SourceKind::CheckoutError => remguard_pattern::PatternLabel::CheckoutIssue,
            SourceKind::SupportTicket => remguard_pattern::PatternLabel::MigrationStageIssue,
            SourceKind::ApiFailure => remguard_pattern::PatternLabel::ConfigDrift,
        };
        let mut issue = Issue::new(signal.tenant.clone(), label, signal.severity);
        issue.attach_signal(signal.id, signal.severity);
        issue.transition(IssueStatus::Clustering)?;
        issue.version = self.store.save(&issue).await?;
        self.signal_issue.insert(signal.id, issue.id);
        Ok(issue.id)
    }

    /// Drive one issue as far as it can go right now
    async fn advance(&self, issue_id: IssueId) -> Result<(), AgentError> {
        let lock = self.issue_lock(issue_id);
        let _guard = lock.lock().await;

        loop {
            let mut issue = self.store.load(issue_id).await?;
            match issue.status {
                IssueStatus::Clustering => {
                    // A watch issue advances only once its cluster is
                    // big enough to have been emitted
                    if issue.signal_ids.len() < self.config.detector.min_cluster_size
                        && issue.severity < self.config.detector.solo_severity_floor
                    {
                        return Ok(());
                    }
                    issue.transition(IssueStatus::Reasoning)?;
                    issue.version = self.store.save(&issue).await?;
                }
                IssueStatus::Reasoning => {
                    let evidence = self.evidence_for(&issue);
                    let hypothesis = self
                        .reasoner
                        .reason(&evidence)
                        .await
                        .map_err(|e| AgentError::Fatal(e.to_string()))?;
                    self.store.append_audit(AuditEntry::new(
                        "agent",
                        "hypothesis_formed",
                        issue.id.to_string(),
                        format!(
                            "{} at {:.2} via {:?}",
                            hypothesis.category, hypothesis.confidence, hypothesis.path
                        ),
                    ));
                    issue.hypothesis = Some(hypothesis);
                    issue.transition(IssueStatus::Deciding)?;
                    issue.version = self.store.save(&issue).await?;
                }
                IssueStatus::Deciding => {
                    let Some(hypothesis) = issue.hypothesis.clone() else {
                        return Err(AgentError::Fatal(format!(
                            "issue {} reached deciding without a hypothesis",
                            issue.id
                        )));
                    };
                    let ctx = self.context_for(&issue);
                    let snapshot = self.safe_mode.snapshot();
                    match decide(&hypothesis, &ctx, &snapshot, &self.config.policy) {
                        None => {
                            metrics::counter!(
                                "remguard_decisions_total",
                                "decision" => "observe_only"
                            )
                            .increment(1);
                            self.store.append_audit(AuditEntry::new(
                                "agent",
                                "observe_only",
                                issue.id.to_string(),
                                "confidence below floor on a low-severity issue",
                            ));
                            issue.transition(IssueStatus::Resolved)?;
                            issue.version = self.store.save(&issue).await?;
                            return Ok(());
                        }
                        Some(plan) => {
                            let gated = plan.requires_approval;
                            let plan_id = plan.id;
                            metrics::counter!(
                                "remguard_decisions_total",
                                "decision" => plan.kind.as_str()
                            )
                            .increment(1);
                            self.store.append_audit(AuditEntry::new(
                                "agent",
                                "plan_created",
                                plan_id.to_string(),
                                plan.rationale.clone(),
                            ));
                            issue.record_plan(plan);
                            if gated {
                                issue.transition(IssueStatus::AwaitingApproval)?;
                                issue.version = self.store.save(&issue).await?;
                                self.pending_plans.insert(plan_id, issue.id);
                                self.record_pending_gauge();
                                return Ok(());
                            }
                            issue.transition(IssueStatus::Executing)?;
                            issue.version = self.store.save(&issue).await?;
                        }
                    }
                }
                IssueStatus::Executing => {
                    let Some(plan) = issue.open_plan().cloned().or_else(|| {
                        issue
                            .actions
                            .last()
                            .filter(|r| r.outcome.is_none() && r.plan.is_executable())
                            .map(|r| r.plan.clone())
                    }) else {
                        return Err(AgentError::Fatal(format!(
                            "issue {} is executing without a plan",
                            issue.id
                        )));
                    };
                    self.run_plan(&mut issue, &plan).await?;
                    return Ok(());
                }
                IssueStatus::New
                | IssueStatus::AwaitingApproval
                | IssueStatus::Learning
                | IssueStatus::Resolved
                | IssueStatus::Failed
                | IssueStatus::Stale => return Ok(()),
            }
        }
    }

    /// Execute a plan and absorb what the outcome teaches
    ///
    /// Caller holds the issue lock and has already saved the issue in
    /// `Executing`.
    async fn run_plan(&self, issue: &mut Issue, plan: &ActionPlan) -> Result<(), AgentError> {
        let ExecutionReport { outcome, follow_up } = self
            .executor
            .execute(plan, &issue.tenant)
            .await
            .map_err(|e| AgentError::Fatal(e.to_string()))?;

        let status = outcome.status;
        self.store.append_audit(AuditEntry::new(
            "agent",
            "outcome_recorded",
            plan.id.to_string(),
            status.as_str(),
        ));
        issue.record_outcome(outcome);
        issue.transition(IssueStatus::Learning)?;

        if status.is_definitive() {
            if let Some(hypothesis) = &issue.hypothesis {
                self.learn(hypothesis.confidence, status == OutcomeStatus::Success);
            }
        }

        match (status, follow_up) {
            (OutcomeStatus::Failed, Some(follow_up)) => {
                let follow_up_id = follow_up.id;
                issue.record_plan(follow_up);
                issue.transition(IssueStatus::AwaitingApproval)?;
                issue.version = self.store.save(issue).await?;
                self.pending_plans.insert(follow_up_id, issue.id);
                self.record_pending_gauge();
            }
            _ => {
                issue.transition(IssueStatus::Resolved)?;
                issue.version = self.store.save(issue).await?;
            }
        }
        Ok(())
    }

    /// Feed calibration and trip Safe Mode when it says so
    fn learn(&self, confidence: f64, success: bool) {
        match self.calibration.record(confidence, success) {
            CalibrationVerdict::Healthy => {}
            CalibrationVerdict::DriftExceeded { drift } => {
                if self.safe_mode.activate(format!("calibration drift {drift:.3}")) {
                    metrics::gauge!("remguard_safe_mode_active").set(1.0);
                }
            }
            CalibrationVerdict::ConsecutiveFailures { count } => {
                if self
                    .safe_mode
                    .activate(format!("{count} consecutive failed outcomes"))
                {
                    metrics::gauge!("remguard_safe_mode_active").set(1.0);
                }
            }
        }
    }

    fn evidence_for(&self, issue: &Issue) -> ClusterEvidence {
        let signals: Vec<Signal> = issue
            .signal_ids
            .iter()
            .filter_map(|id| self.signals.get(*id))
            .collect();
        ClusterEvidence {
            tenant: issue.tenant.clone(),
            label: issue.label,
            severity: issue.severity,
            similarity: 1.0,
            correlated_tenants: issue.correlated_tenants,
            signals,
        }
    }

    fn context_for(&self, issue: &Issue) -> IssueContext {
        let touches_revenue = issue.signal_ids.iter().any(|id| {
            self.signals.get(*id).is_some_and(|s| {
                s.source == SourceKind::CheckoutError
                    || s.affected_resource.as_deref().is_some_and(|r| {
                        r.contains("checkout") || r.contains("payment") || r.contains("billing")
                    })
            })
        });
        IssueContext {
            issue_id: issue.id,
            tenant: issue.tenant.clone(),
            severity: issue.severity,
            touches_revenue,
            correlated_tenants: issue.correlated_tenants,
        }
    }

    /// Per-issue error isolation: park the issue in `Failed`, audited
    async fn quarantine(&self, issue_id: IssueId, err: &AgentError) {
        let lock = self.issue_lock(issue_id);
        let _guard = lock.lock().await;
        if let Ok(mut issue) = self.store.load(issue_id).await {
            self.fail_in_place(&mut issue, err).await;
        }
    }

    /// Move an issue to `Failed`; the caller holds its lock
    async fn fail_in_place(&self, issue: &mut Issue, err: &AgentError) {
        tracing::error!(issue_id = %issue.id, error = %err, "issue pipeline failed");
        metrics::counter!("remguard_issue_failures_total").increment(1);

        if issue.transition(IssueStatus::Failed).is_ok() {
            self.store.append_audit(AuditEntry::new(
                "agent",
                "issue_failed",
                issue.id.to_string(),
                err.to_string(),
            ));
            if let Ok(version) = self.store.save(issue).await {
                issue.version = version;
            }
        }
    }
}
