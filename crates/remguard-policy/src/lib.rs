//! Decision policy for Remguard
//!
//! Turns a hypothesis into an action plan through a pure decision
//! function, gated by a risk table, confidence floors, and the global
//! Safe Mode flag. Also owns the calibration tracker that decides when
//! the agent has earned distrust.

pub mod action;
pub mod calibration;
pub mod engine;
pub mod safe_mode;

pub use action::{ActionKind, ActionPlan, PlanResolution, RiskTier};
pub use calibration::{CalibrationBucket, CalibrationConfig, CalibrationTracker, CalibrationVerdict};
pub use engine::{decide, IssueContext, PolicyConfig};
pub use safe_mode::{SafeMode, SafeModeSnapshot};
