//! Remguard core
//!
//! Owns the issue aggregate, its state machine, the state store
//! boundary, and the orchestrator that drives each issue through
//! observe, detect, reason, decide, act, and learn.

pub mod error;
pub mod issue;
pub mod orchestrator;
pub mod store;
pub mod telemetry;

pub use error::{AgentError, StoreError};
pub use issue::{allowed_transitions, validate_transition, ActionRecord, Issue, IssueStatus};
pub use orchestrator::{ApprovalDecision, Orchestrator, OrchestratorConfig};
pub use store::{InMemoryStateStore, StateStore};
