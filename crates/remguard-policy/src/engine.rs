//! Decision engine
//!
//! A pure function from hypothesis plus issue context to an action plan.
//! No I/O, no clocks beyond the plan timestamp, no store access: the
//! orchestrator supplies everything, including the Safe Mode snapshot it
//! wants the decision evaluated against.

use crate::action::{ActionKind, ActionPlan, RiskTier};
use crate::safe_mode::SafeModeSnapshot;
use remguard_reason::{Hypothesis, HypothesisCategory};
use remguard_signal::{IssueId, Severity, TenantId};
use serde::{Deserialize, Serialize};

/// Policy tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Below this confidence, plans are advisory and approval-gated
    pub confidence_floor: f64,
    /// Automatic mitigation requires at least this confidence
    pub auto_fix_floor: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.7,
            auto_fix_floor: 0.8,
        }
    }
}

/// Issue facts the decision needs beyond the hypothesis
#[derive(Debug, Clone)]
pub struct IssueContext {
    /// Issue being decided
    pub issue_id: IssueId,
    /// Tenant the issue belongs to
    pub tenant: TenantId,
    /// Highest severity among constituent signals
    pub severity: Severity,
    /// Whether checkout or payment flows sit in the blast radius
    pub touches_revenue: bool,
    /// Other tenants showing the same fingerprint
    pub correlated_tenants: usize,
}

/// Decide what to do about an issue
///
/// Returns `None` when the right move is to keep watching: confidence is
/// below the floor and the issue is low-severity, so acting would be
/// guesswork with nothing forcing a guess.
#[must_use]
pub fn decide(
    hypothesis: &Hypothesis,
    ctx: &IssueContext,
    safe_mode: &SafeModeSnapshot,
    config: &PolicyConfig,
) -> Option<ActionPlan> {
    let below_floor = hypothesis.confidence < config.confidence_floor;

    if below_floor && ctx.severity == Severity::Low {
        tracing::debug!(
            issue_id = %ctx.issue_id,
            confidence = hypothesis.confidence,
            "below confidence floor on a low-severity issue, observing"
        );
        return None;
    }

    let (kind, alternative) = preferred_action(hypothesis, ctx, config);
    let risk = assess_risk(hypothesis, ctx, kind, config);

    let requires_approval = risk >= RiskTier::High
        || below_floor
        || safe_mode.active
        || kind == ActionKind::TemporaryMitigation;

    let mut plan = ActionPlan::new(ctx.issue_id, kind, risk)
        .with_rationale(rationale(hypothesis, ctx, kind, risk, safe_mode))
        .with_param("tenant", ctx.tenant.as_str())
        .with_param("category", hypothesis.category.as_str())
        .with_param("confidence", format!("{:.2}", hypothesis.confidence));
    if let Some(alt) = alternative {
        plan = plan.with_alternative(alt);
    }
    if requires_approval {
        plan = plan.with_approval_required();
    }

    tracing::info!(
        issue_id = %ctx.issue_id,
        plan_id = %plan.id,
        kind = %kind,
        risk = %risk,
        requires_approval,
        safe_mode = safe_mode.active,
        "decision made"
    );
    Some(plan)
}

/// Category → action mapping, with the alternative that lost
fn preferred_action(
    hypothesis: &Hypothesis,
    ctx: &IssueContext,
    config: &PolicyConfig,
) -> (ActionKind, Option<ActionKind>) {
    if hypothesis.confidence < config.confidence_floor {
        // Guidance is the safe default when the hypothesis is shaky
        return (ActionKind::SupportGuidance, Some(category_action(hypothesis.category)));
    }

    match hypothesis.category {
        HypothesisCategory::ConfigError => {
            if hypothesis.confidence >= config.auto_fix_floor && !ctx.touches_revenue {
                (ActionKind::TemporaryMitigation, Some(ActionKind::SupportGuidance))
            } else {
                (ActionKind::SupportGuidance, Some(ActionKind::TemporaryMitigation))
            }
        }
        // Several tenants are about to hit the same wall; escalation wins
        // but notifying them first was a close call
        HypothesisCategory::PlatformRegression if ctx.correlated_tenants >= 2 => (
            ActionKind::EngineeringEscalation,
            Some(ActionKind::ProactiveCommunication),
        ),
        category => (category_action(category), None),
    }
}

fn category_action(category: HypothesisCategory) -> ActionKind {
    match category {
        HypothesisCategory::MigrationMisstep => ActionKind::SupportGuidance,
        HypothesisCategory::PlatformRegression => ActionKind::EngineeringEscalation,
        HypothesisCategory::ConfigError => ActionKind::TemporaryMitigation,
        HypothesisCategory::DocumentationGap => ActionKind::DocumentationUpdate,
    }
}

/// Count risk factors; revenue impact short-circuits to Critical
fn assess_risk(
    hypothesis: &Hypothesis,
    ctx: &IssueContext,
    kind: ActionKind,
    config: &PolicyConfig,
) -> RiskTier {
    if ctx.touches_revenue {
        return RiskTier::Critical;
    }

    let factors = [
        kind.is_mutating(),
        hypothesis.confidence < config.confidence_floor,
        ctx.correlated_tenants >= 2,
        ctx.severity == Severity::Critical,
    ]
    .iter()
    .filter(|f| **f)
    .count();

    match factors {
        0 => RiskTier::Low,
        1 => RiskTier::Medium,
        _ => RiskTier::High,
    }
}

fn rationale(
    hypothesis: &Hypothesis,
    ctx: &IssueContext,
    kind: ActionKind,
    risk: RiskTier,
    safe_mode: &SafeModeSnapshot,
) -> String {
    let mut text = format!(
        "{} at {:.2} confidence for tenant {}; {} at {} risk",
        hypothesis.category, hypothesis.confidence, ctx.tenant, kind, risk,
    );
    if safe_mode.active {
        text.push_str(" (safe mode active, approval forced)");
    }
    text
}
