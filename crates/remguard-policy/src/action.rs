//! Action plans and their lifecycle

use chrono::{DateTime, Utc};
use remguard_signal::{IssueId, PlanId, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What kind of remediation a plan performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Send the tenant targeted guidance through the support channel
    SupportGuidance,
    /// Notify affected tenants before they notice
    ProactiveCommunication,
    /// Open an engineering escalation for a platform-side cause
    EngineeringEscalation,
    /// Apply a reversible mitigation (e.g. re-enable a legacy endpoint)
    TemporaryMitigation,
    /// File a documentation fix request
    DocumentationUpdate,
}

impl ActionKind {
    /// Stable label used in metrics and audit entries
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SupportGuidance => "support_guidance",
            ActionKind::ProactiveCommunication => "proactive_communication",
            ActionKind::EngineeringEscalation => "engineering_escalation",
            ActionKind::TemporaryMitigation => "temporary_mitigation",
            ActionKind::DocumentationUpdate => "documentation_update",
        }
    }

    /// Whether the action changes tenant-facing behavior
    ///
    /// Mitigations mutate platform state; everything else is advisory.
    #[inline]
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(self, ActionKind::TemporaryMitigation)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk tier assigned by the decision engine, ordered low to critical
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Advisory action, no tenant-facing state change
    #[default]
    Low,
    /// Single risk factor present
    Medium,
    /// Multiple risk factors present
    High,
    /// Revenue or payment flow in the blast radius
    Critical,
}

impl RiskTier {
    /// Stable label used in metrics and audit entries
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an approval-gated plan was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "resolution")]
pub enum PlanResolution {
    /// Operator approved execution
    Approved { operator: String },
    /// Operator rejected; feedback is mandatory and feeds calibration
    Rejected { operator: String, feedback: String },
    /// No operator answered within the approval window
    TimedOut,
}

/// A concrete remediation plan for one issue
///
/// At most one open plan exists per issue; the orchestrator enforces
/// that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    /// Plan identifier
    pub id: PlanId,
    /// Issue the plan remediates
    pub issue_id: IssueId,
    /// What the plan does
    pub kind: ActionKind,
    /// Assessed risk tier
    pub risk: RiskTier,
    /// Whether a human must approve before execution
    pub requires_approval: bool,
    /// Why this plan was chosen
    pub rationale: String,
    /// Action kinds considered but not chosen
    pub alternatives: Vec<ActionKind>,
    /// Structured parameters for the integration
    pub params: BTreeMap<String, String>,
    /// When the plan was created
    pub created_at: DateTime<Utc>,
    /// Resolution, once one exists
    pub resolution: Option<PlanResolution>,
}

impl ActionPlan {
    /// Create a plan for an issue
    #[must_use]
    pub fn new(issue_id: IssueId, kind: ActionKind, risk: RiskTier) -> Self {
        Self {
            id: PlanId::new(),
            issue_id,
            kind,
            risk,
            requires_approval: false,
            rationale: String::new(),
            alternatives: Vec::new(),
            params: BTreeMap::new(),
            created_at: Utc::now(),
            resolution: None,
        }
    }

    /// Mark the plan as approval-gated
    #[inline]
    #[must_use]
    pub fn with_approval_required(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Attach the decision rationale
    #[inline]
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Record an action kind that was considered but not chosen
    #[inline]
    #[must_use]
    pub fn with_alternative(mut self, kind: ActionKind) -> Self {
        self.alternatives.push(kind);
        self
    }

    /// Attach an integration parameter
    #[inline]
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Whether the plan may be handed to the executor right now
    #[inline]
    #[must_use]
    pub fn is_executable(&self) -> bool {
        !self.requires_approval
            || matches!(self.resolution, Some(PlanResolution::Approved { .. }))
    }

    /// Approve the plan
    ///
    /// # Errors
    /// `ValidationError::MissingField` if the operator id is empty.
    pub fn approve(&mut self, operator: impl Into<String>) -> Result<(), ValidationError> {
        let operator = operator.into();
        if operator.is_empty() {
            return Err(ValidationError::MissingField("operator"));
        }
        self.resolution = Some(PlanResolution::Approved { operator });
        Ok(())
    }

    /// Reject the plan; feedback is mandatory
    ///
    /// # Errors
    /// `ValidationError::EmptyFeedback` if feedback is empty — rejections
    /// without a reason teach the calibration loop nothing. The plan is
    /// not mutated on error.
    pub fn reject(
        &mut self,
        operator: impl Into<String>,
        feedback: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let operator = operator.into();
        let feedback = feedback.into();
        if operator.is_empty() {
            return Err(ValidationError::MissingField("operator"));
        }
        if feedback.trim().is_empty() {
            return Err(ValidationError::EmptyFeedback("rejection feedback"));
        }
        self.resolution = Some(PlanResolution::Rejected { operator, feedback });
        Ok(())
    }

    /// Mark the plan as expired without an operator decision
    #[inline]
    pub fn time_out(&mut self) {
        self.resolution = Some(PlanResolution::TimedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unguarded_plan_is_executable() {
        let plan = ActionPlan::new(IssueId::new(), ActionKind::SupportGuidance, RiskTier::Low);
        assert!(plan.is_executable());
    }

    #[test]
    fn gated_plan_needs_approval() {
        let mut plan = ActionPlan::new(
            IssueId::new(),
            ActionKind::TemporaryMitigation,
            RiskTier::High,
        )
        .with_approval_required();

        assert!(!plan.is_executable());
        plan.approve("op_1").unwrap();
        assert!(plan.is_executable());
    }

    #[test]
    fn rejection_requires_feedback() {
        let mut plan = ActionPlan::new(
            IssueId::new(),
            ActionKind::TemporaryMitigation,
            RiskTier::High,
        )
        .with_approval_required();

        let err = plan.reject("op_1", "   ").unwrap_err();
        assert!(matches!(err, ValidationError::EmptyFeedback(_)));
        assert_eq!(plan.resolution, None);

        plan.reject("op_1", "wrong tenant, this is a platform bug").unwrap();
        assert!(matches!(
            plan.resolution,
            Some(PlanResolution::Rejected { .. })
        ));
        assert!(!plan.is_executable());
    }

    #[test]
    fn approval_requires_operator_identity() {
        let mut plan = ActionPlan::new(
            IssueId::new(),
            ActionKind::EngineeringEscalation,
            RiskTier::High,
        )
        .with_approval_required();

        assert!(plan.approve("").is_err());
        assert_eq!(plan.resolution, None);
    }

    #[test]
    fn risk_tier_ordering() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::High < RiskTier::Critical);
    }

    #[test]
    fn only_mitigation_mutates() {
        assert!(ActionKind::TemporaryMitigation.is_mutating());
        assert!(!ActionKind::SupportGuidance.is_mutating());
        assert!(!ActionKind::EngineeringEscalation.is_mutating());
    }
}
