//! Pluggable reasoning backend

use crate::error::ReasonError;
use crate::hypothesis::Hypothesis;
use remguard_pattern::{CandidateCluster, PatternLabel};
use remguard_signal::{Severity, Signal, TenantId};
use serde::{Deserialize, Serialize};

/// Everything a backend may consider when forming a hypothesis
///
/// Built from the cluster plus the full member signals; backends never
/// read stores directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvidence {
    /// Tenant the issue belongs to
    pub tenant: TenantId,
    /// Coarse label the detector assigned
    pub label: PatternLabel,
    /// Highest member severity
    pub severity: Severity,
    /// Cluster cohesion in [0, 1]
    pub similarity: f64,
    /// Other tenants showing the same fingerprint in the same window
    pub correlated_tenants: usize,
    /// Full member signals, in canonical order
    pub signals: Vec<Signal>,
}

impl ClusterEvidence {
    /// Assemble evidence from a cluster and its resolved member signals
    #[must_use]
    pub fn from_cluster(cluster: &CandidateCluster, signals: Vec<Signal>) -> Self {
        Self {
            tenant: cluster.tenant.clone(),
            label: cluster.label,
            severity: cluster.severity,
            similarity: cluster.similarity,
            correlated_tenants: cluster.correlated_tenants,
            signals,
        }
    }

    /// Whether the same fingerprint shows up for other tenants
    ///
    /// Multi-tenant spread is the main signal for a platform-side cause.
    #[inline]
    #[must_use]
    pub fn is_widespread(&self) -> bool {
        self.correlated_tenants >= 2
    }
}

/// A reasoning strategy that turns evidence into a hypothesis
///
/// Implementations must be side-effect free with respect to agent state;
/// the orchestrator owns all persistence.
#[async_trait::async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Name used in logs and audit entries
    fn name(&self) -> &str;

    /// Produce a hypothesis for the evidence
    async fn reason(&self, evidence: &ClusterEvidence) -> Result<Hypothesis, ReasonError>;
}
