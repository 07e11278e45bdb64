//! Root-cause reasoning for Remguard
//!
//! Takes a candidate cluster plus its evidence and produces a single
//! hypothesis with calibrated-scale confidence. A pluggable primary
//! backend is tried first under a timeout; a deterministic rule table
//! answers when the backend cannot. The issue never proceeds without a
//! hypothesis, so the fallback is total.

pub mod backend;
pub mod error;
pub mod hypothesis;
pub mod reasoner;
pub mod rules;

pub use backend::{ClusterEvidence, ReasoningBackend};
pub use error::ReasonError;
pub use hypothesis::{Alternative, Hypothesis, HypothesisCategory, ReasonerPath};
pub use reasoner::{Reasoner, ReasonerConfig};
pub use rules::RuleReasoner;
