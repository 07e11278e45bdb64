//! Issue aggregate and its state machine
//!
//! An issue is the unit of work: a cluster of signals for one tenant,
//! the current hypothesis about it, and the history of actions taken.
//! Status moves only along the allowed-transition table below; the
//! orchestrator is the sole writer.

use crate::error::AgentError;
use chrono::{DateTime, Utc};
use remguard_exec::Outcome;
use remguard_pattern::PatternLabel;
use remguard_policy::ActionPlan;
use remguard_reason::Hypothesis;
use remguard_signal::{IssueId, Severity, SignalId, TenantId};
use serde::{Deserialize, Serialize};

/// Issue lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Just created, nothing evaluated yet
    New,
    /// Gathering and regrouping member signals
    Clustering,
    /// Producing or refreshing the hypothesis
    Reasoning,
    /// Turning the hypothesis into a plan
    Deciding,
    /// Plan emitted, waiting on an operator
    AwaitingApproval,
    /// Plan handed to the executor
    Executing,
    /// Outcome recorded, calibration updating
    Learning,
    /// Done until new evidence arrives
    Resolved,
    /// Unrecoverable error; terminal
    Failed,
    /// Approval window expired without a decision
    Stale,
}

impl IssueStatus {
    /// Stable label used in metrics and audit entries
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::New => "new",
            IssueStatus::Clustering => "clustering",
            IssueStatus::Reasoning => "reasoning",
            IssueStatus::Deciding => "deciding",
            IssueStatus::AwaitingApproval => "awaiting_approval",
            IssueStatus::Executing => "executing",
            IssueStatus::Learning => "learning",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Failed => "failed",
            IssueStatus::Stale => "stale",
        }
    }

    /// Whether no further transition can leave this state
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, IssueStatus::Failed)
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: IssueStatus) -> Vec<IssueStatus> {
    use IssueStatus::*;
    match from {
        New => vec![Clustering, Failed],
        Clustering => vec![Reasoning, Failed],
        Reasoning => vec![Deciding, Failed],
        // Deciding may conclude nothing is worth doing yet
        Deciding => vec![AwaitingApproval, Executing, Resolved, Failed],
        AwaitingApproval => vec![Executing, Learning, Stale, Failed],
        Executing => vec![Learning, Failed],
        // A failed execution can park its escalation follow-up for approval
        Learning => vec![Resolved, Reasoning, AwaitingApproval, Failed],
        // New evidence reopens the loop, never skipping stages
        Resolved => vec![Reasoning],
        Stale => vec![Reasoning],
        Failed => vec![],
    }
}

/// Validate one transition against the table
///
/// # Errors
/// `AgentError::IllegalTransition` when `to` is not reachable from
/// `from`.
pub fn validate_transition(
    issue_id: IssueId,
    from: IssueStatus,
    to: IssueStatus,
) -> Result<(), AgentError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(AgentError::IllegalTransition {
            issue_id,
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

/// One plan and, once known, its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// The plan as decided
    pub plan: ActionPlan,
    /// Outcome, once execution finished
    pub outcome: Option<Outcome>,
}

/// The issue aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Issue identifier
    pub id: IssueId,
    /// Tenant the issue belongs to
    pub tenant: TenantId,
    /// Current lifecycle state
    pub status: IssueStatus,
    /// Detector label for the underlying cluster
    pub label: PatternLabel,
    /// Highest severity among member signals
    pub severity: Severity,
    /// Member signals in arrival order; grows, never shrinks, except
    /// through an explicit audited reassignment
    pub signal_ids: Vec<SignalId>,
    /// Other tenants showing the same fingerprint, as last detected
    pub correlated_tenants: usize,
    /// Current hypothesis, replaced wholesale on re-evaluation
    pub hypothesis: Option<Hypothesis>,
    /// Plans taken so far, oldest first
    pub actions: Vec<ActionRecord>,
    /// When the issue was opened
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped by the store on save
    pub version: u64,
}

impl Issue {
    /// Open a new issue for a tenant
    #[must_use]
    pub fn new(tenant: TenantId, label: PatternLabel, severity: Severity) -> Self {
        let now = Utc::now();
        Self {
            id: IssueId::new(),
            tenant,
            status: IssueStatus::New,
            label,
            severity,
            signal_ids: Vec::new(),
            correlated_tenants: 0,
            hypothesis: None,
            actions: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Move to a new status, validating against the transition table
    ///
    /// # Errors
    /// `AgentError::IllegalTransition` for moves outside the table.
    pub fn transition(&mut self, to: IssueStatus) -> Result<(), AgentError> {
        validate_transition(self.id, self.status, to)?;
        tracing::debug!(issue_id = %self.id, from = %self.status, %to, "issue transition");
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append a member signal; duplicates are ignored
    ///
    /// Returns `true` when the signal was new to this issue.
    pub fn attach_signal(&mut self, signal_id: SignalId, severity: Severity) -> bool {
        if self.signal_ids.contains(&signal_id) {
            return false;
        }
        self.signal_ids.push(signal_id);
        self.severity = self.severity.max(severity);
        self.updated_at = Utc::now();
        true
    }

    /// Detach a signal as part of an audited reassignment
    ///
    /// Returns `true` when the signal was a member.
    pub fn detach_signal(&mut self, signal_id: SignalId) -> bool {
        let before = self.signal_ids.len();
        self.signal_ids.retain(|id| *id != signal_id);
        let removed = self.signal_ids.len() < before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    /// The plan currently awaiting execution or approval, if any
    #[must_use]
    pub fn open_plan(&self) -> Option<&ActionPlan> {
        self.actions
            .last()
            .filter(|record| record.outcome.is_none() && record.plan.resolution.is_none())
            .map(|record| &record.plan)
    }

    /// Record a newly decided plan
    ///
    /// At most one plan may be open; callers check `open_plan` first.
    pub fn record_plan(&mut self, plan: ActionPlan) {
        self.actions.push(ActionRecord {
            plan,
            outcome: None,
        });
        self.updated_at = Utc::now();
    }

    /// Attach the outcome to the most recent plan
    pub fn record_outcome(&mut self, outcome: Outcome) {
        if let Some(record) = self
            .actions
            .iter_mut()
            .rev()
            .find(|r| r.plan.id == outcome.plan_id)
        {
            record.outcome = Some(outcome);
            self.updated_at = Utc::now();
        }
    }
}
