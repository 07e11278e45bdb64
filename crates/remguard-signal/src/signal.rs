//! The immutable signal value object
//!
//! A signal is a single normalized fact about a possible problem, created
//! once at ingestion and never mutated afterwards.

use crate::error::ValidationError;
use crate::ids::{SignalId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a signal originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Failed platform API call observed at the edge
    ApiFailure,
    /// Webhook delivery to the tenant failed
    WebhookFailure,
    /// Error surfaced in the tenant's checkout flow
    CheckoutError,
    /// Ticket filed by the tenant with support
    SupportTicket,
}

impl SourceKind {
    /// Stable label used in metrics and audit entries
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ApiFailure => "api_failure",
            SourceKind::WebhookFailure => "webhook_failure",
            SourceKind::CheckoutError => "checkout_error",
            SourceKind::SupportTicket => "support_ticket",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal severity, ordered low to critical
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, no tenant impact yet
    #[default]
    Low,
    /// Degraded behavior, workaround exists
    Medium,
    /// Tenant-visible breakage
    High,
    /// Revenue-impacting or widespread breakage
    Critical,
}

impl Severity {
    /// Stable label used in metrics and audit entries
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized fact about a possible problem
///
/// Immutable after construction. The raw payload is carried opaquely; the
/// normalized fields (`error_code`, `error_message`, `affected_resource`)
/// are what pattern detection and reasoning operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique identifier; ingestion is idempotent on this
    pub id: SignalId,
    /// When the underlying event occurred
    pub timestamp: DateTime<Utc>,
    /// Where the signal came from
    pub source: SourceKind,
    /// Tenant the signal belongs to
    pub tenant: TenantId,
    /// Severity as assessed at normalization time
    pub severity: Severity,
    /// Normalized error code, if the source carried one
    pub error_code: Option<String>,
    /// Normalized error message
    pub error_message: Option<String>,
    /// Resource path affected by the problem (e.g. `/checkout`)
    pub affected_resource: Option<String>,
    /// Raw payload from the source, kept for evidence
    pub raw_payload: serde_json::Value,
    /// Additional normalized context
    pub context: BTreeMap<String, String>,
}

impl Signal {
    /// Create a new signal with a fresh id, stamped now
    #[must_use]
    pub fn new(source: SourceKind, tenant: TenantId, severity: Severity) -> Self {
        Self {
            id: SignalId::new(),
            timestamp: Utc::now(),
            source,
            tenant,
            severity,
            error_code: None,
            error_message: None,
            affected_resource: None,
            raw_payload: serde_json::Value::Null,
            context: BTreeMap::new(),
        }
    }

    /// With an explicit id (ingestion boundary replays carry their own ids)
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: SignalId) -> Self {
        self.id = id;
        self
    }

    /// With an explicit event timestamp
    #[inline]
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// With a normalized error code
    #[inline]
    #[must_use]
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// With a normalized error message
    #[inline]
    #[must_use]
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// With the affected resource path
    #[inline]
    #[must_use]
    pub fn with_affected_resource(mut self, resource: impl Into<String>) -> Self {
        self.affected_resource = Some(resource.into());
        self
    }

    /// With the raw source payload
    #[inline]
    #[must_use]
    pub fn with_raw_payload(mut self, payload: serde_json::Value) -> Self {
        self.raw_payload = payload;
        self
    }

    /// With a context entry
    #[inline]
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Validate boundary requirements before the signal enters the store
    ///
    /// # Errors
    /// `ValidationError::MissingField` if the tenant id is empty, or
    /// `ValidationError::TimestampOutOfRange` for an event stamped in
    /// the future beyond clock-skew tolerance.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tenant.as_str().is_empty() {
            return Err(ValidationError::MissingField("tenant"));
        }
        // Allow modest clock skew between sources and the agent
        if self.timestamp > Utc::now() + chrono::Duration::minutes(5) {
            return Err(ValidationError::TimestampOutOfRange(self.id));
        }
        Ok(())
    }
}
