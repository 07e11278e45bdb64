//! Signal foundation for Remguard
//!
//! Defines the immutable [`Signal`] value object, the identifier newtypes
//! shared across the workspace, and the append-only [`SignalStore`] that
//! holds the recent signal window per tenant.

pub mod error;
pub mod ids;
pub mod signal;
pub mod store;

pub use error::ValidationError;
pub use ids::{IssueId, PlanId, SignalId, TenantId};
pub use signal::{Severity, Signal, SourceKind};
pub use store::{SignalStore, StoreStats};
