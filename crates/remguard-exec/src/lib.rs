//! Guarded execution for Remguard
//!
//! Runs approved action plans against external integrations behind a
//! layered set of guards: per-tenant rate quotas, per-integration
//! circuit breakers, bounded retries, and a hard timeout. Every attempt
//! lands in a hash-chained audit trail.

pub mod audit;
pub mod breaker;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod rate_limit;
pub mod retry;

pub use audit::{AuditEntry, AuditTrail};
pub use breaker::{BreakerConfig, CircuitBreaker};
pub use error::ExecError;
pub use executor::{ActionIntegration, ExecutionReport, Executor, ExecutorConfig};
pub use outcome::{Outcome, OutcomeStatus};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use retry::RetryPolicy;
