//! Candidate cluster detection
//!
//! Pure threshold clustering over a signal window. The window is put into
//! a canonical order (by signal id) before clustering, so the output does
//! not depend on arrival order. Tenants are partitioned first and never
//! merged; cross-tenant correlation is reported as a fingerprint count on
//! each cluster, not as membership.

use crate::feature::{signal_distance, FeatureWeights};
use remguard_signal::{Severity, Signal, SignalId, SourceKind, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Coarse label describing what a cluster looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternLabel {
    /// Repeated authentication rejections (401/403-class errors)
    AuthenticationFailure,
    /// Webhook deliveries failing
    WebhookProblem,
    /// Checkout flow breakage
    CheckoutIssue,
    /// Problems reported through support during a migration stage
    MigrationStageIssue,
    /// Everything else; usually points at configuration
    ConfigDrift,
}

impl PatternLabel {
    /// Stable label used in metrics and audit entries
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternLabel::AuthenticationFailure => "authentication_failure",
            PatternLabel::WebhookProblem => "webhook_problem",
            PatternLabel::CheckoutIssue => "checkout_issue",
            PatternLabel::MigrationStageIssue => "migration_stage_issue",
            PatternLabel::ConfigDrift => "config_drift",
        }
    }
}

/// Detector tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Maximum distance for two signals to share a cluster
    pub distance_threshold: f64,
    /// Minimum cluster size to emit
    pub min_cluster_size: usize,
    /// A lone signal at or above this severity is emitted regardless of
    /// `min_cluster_size`
    pub solo_severity_floor: Severity,
    /// Distance feature weights
    pub weights: FeatureWeights,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            // Admits a differing source kind when the error code and
            // timing still agree
            distance_threshold: 0.45,
            min_cluster_size: 1,
            solo_severity_floor: Severity::High,
            weights: FeatureWeights::default(),
        }
    }
}

/// A candidate issue: signals that look like one problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateCluster {
    /// Tenant the cluster belongs to
    pub tenant: TenantId,
    /// Member signal ids, in canonical (id) order
    pub signal_ids: Vec<SignalId>,
    /// Cohesion score in [0, 1]; 1.0 for singletons
    pub similarity: f64,
    /// Coarse pattern label
    pub label: PatternLabel,
    /// Highest severity among members
    pub severity: Severity,
    /// How many *other* tenants show the same (source, error code)
    /// fingerprint in the same window; evidence only, never membership
    pub correlated_tenants: usize,
}

/// Pure clustering over a signal window
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: DetectorConfig,
}

impl PatternDetector {
    /// Create a detector with the given tunables
    #[inline]
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Detector configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Cluster a signal window into candidate issues
    ///
    /// The window may span tenants; output clusters never do. No side
    /// effects: callers decide what becomes an issue.
    #[must_use]
    pub fn detect(&self, window: &[Signal]) -> Vec<CandidateCluster> {
        if window.is_empty() {
            return Vec::new();
        }

        let fingerprints = tenant_fingerprints(window);

        let mut by_tenant: BTreeMap<TenantId, Vec<&Signal>> = BTreeMap::new();
        for signal in window {
            by_tenant.entry(signal.tenant.clone()).or_default().push(signal);
        }

        let mut clusters = Vec::new();
        for (tenant, mut signals) in by_tenant {
            // Canonical order makes the greedy pass arrival-order independent
            signals.sort_by_key(|s| s.id);
            clusters.extend(self.cluster_tenant(&tenant, &signals, &fingerprints));
        }

        tracing::debug!(
            window = window.len(),
            clusters = clusters.len(),
            "pattern detection pass complete"
        );
        clusters
    }

    fn cluster_tenant(
        &self,
        tenant: &TenantId,
        signals: &[&Signal],
        fingerprints: &BTreeMap<(SourceKind, Option<String>), BTreeSet<TenantId>>,
    ) -> Vec<CandidateCluster> {
        let mut groups: Vec<Vec<&Signal>> = Vec::new();

        for signal in signals {
            let home = groups.iter_mut().find(|group| {
                group.iter().any(|member| {
                    signal_distance(member, signal, &self.config.weights)
                        <= self.config.distance_threshold
                })
            });
            match home {
                Some(group) => group.push(signal),
                None => groups.push(vec![signal]),
            }
        }

        groups
            .into_iter()
            .filter(|group| {
                group.len() >= self.config.min_cluster_size
                    || group
                        .iter()
                        .any(|s| s.severity >= self.config.solo_severity_floor)
            })
            .map(|group| self.build_cluster(tenant, &group, fingerprints))
            .collect()
    }

    fn build_cluster(
        &self,
        tenant: &TenantId,
        group: &[&Signal],
        fingerprints: &BTreeMap<(SourceKind, Option<String>), BTreeSet<TenantId>>,
    ) -> CandidateCluster {
        let similarity = self.cohesion(group);
        let severity = group
            .iter()
            .map(|s| s.severity)
            .max()
            .unwrap_or(Severity::Low);

        let correlated_tenants = group
            .iter()
            .filter_map(|s| fingerprints.get(&(s.source, s.error_code.clone())))
            .map(|tenants| tenants.len().saturating_sub(1))
            .max()
            .unwrap_or(0);

        CandidateCluster {
            tenant: tenant.clone(),
            signal_ids: group.iter().map(|s| s.id).collect(),
            similarity,
            label: classify(group),
            severity,
            correlated_tenants,
        }
    }

    /// 1 minus the mean pairwise distance; singletons score 1.0
    fn cohesion(&self, group: &[&Signal]) -> f64 {
        if group.len() < 2 {
            return 1.0;
        }
        let mut total = 0.0;
        let mut pairs = 0u32;
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                total += signal_distance(a, b, &self.config.weights);
                pairs += 1;
            }
        }
        1.0 - total / f64::from(pairs)
    }
}

/// Tenants observed per (source, error code) fingerprint across the window
fn tenant_fingerprints(
    window: &[Signal],
) -> BTreeMap<(SourceKind, Option<String>), BTreeSet<TenantId>> {
    let mut map: BTreeMap<(SourceKind, Option<String>), BTreeSet<TenantId>> = BTreeMap::new();
    for signal in window {
        map.entry((signal.source, signal.error_code.clone()))
            .or_default()
            .insert(signal.tenant.clone());
    }
    map
}

/// Derive the coarse label from the dominant member characteristics
fn classify(group: &[&Signal]) -> PatternLabel {
    let auth = group.iter().filter(|s| is_auth_error(s)).count();
    if auth * 2 >= group.len() && auth > 0 {
        return PatternLabel::AuthenticationFailure;
    }

    let mut counts: BTreeMap<SourceKind, usize> = BTreeMap::new();
    for signal in group {
        *counts.entry(signal.source).or_default() += 1;
    }
    let dominant = counts
        .into_iter()
        .max_by_key(|(_, n)| *n)
        .map(|(kind, _)| kind);

    match dominant {
        Some(SourceKind::WebhookFailure) => PatternLabel::WebhookProblem,
        Some(SourceKind::CheckoutError) => PatternLabel::CheckoutIssue,
        Some(SourceKind::SupportTicket) => PatternLabel::MigrationStageIssue,
        _ => PatternLabel::ConfigDrift,
    }
}

fn is_auth_error(signal: &Signal) -> bool {
    signal
        .error_code
        .as_deref()
        .is_some_and(|code| {
            let code = code.to_ascii_lowercase();
            code.contains("401")
                || code.contains("403")
                || code.contains("unauthorized")
                || code.contains("forbidden")
                || code.contains("auth")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn signal(tenant: &str, source: SourceKind, code: Option<&str>, offset_min: i64) -> Signal {
        let mut s = Signal::new(source, TenantId::new(tenant), Severity::Medium)
            .with_timestamp(Utc::now() + Duration::minutes(offset_min));
        if let Some(code) = code {
            s = s.with_error_code(code);
        }
        s
    }

    #[test]
    fn clusters_auth_failures_with_related_ticket() {
        // Two 401 api failures and one related support ticket within
        // 15 minutes for the same merchant form one issue.
        let detector = PatternDetector::default();
        let window = vec![
            signal("m1", SourceKind::ApiFailure, Some("401"), 0),
            signal("m1", SourceKind::ApiFailure, Some("401"), 5),
            signal("m1", SourceKind::SupportTicket, Some("401"), 10),
        ];

        let clusters = detector.detect(&window);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].signal_ids.len(), 3);
        assert_eq!(clusters[0].label, PatternLabel::AuthenticationFailure);
    }

    #[test]
    fn never_merges_tenants() {
        let detector = PatternDetector::default();
        let window = vec![
            signal("m1", SourceKind::ApiFailure, Some("401"), 0),
            signal("m2", SourceKind::ApiFailure, Some("401"), 0),
        ];

        let clusters = detector.detect(&window);
        assert_eq!(clusters.len(), 2);
        for cluster in &clusters {
            assert_eq!(cluster.signal_ids.len(), 1);
        }
    }

    #[test]
    fn cross_tenant_fingerprint_is_evidence_only() {
        let detector = PatternDetector::default();
        let window = vec![
            signal("m1", SourceKind::ApiFailure, Some("404"), 0),
            signal("m2", SourceKind::ApiFailure, Some("404"), 1),
            signal("m3", SourceKind::ApiFailure, Some("404"), 2),
        ];

        let clusters = detector.detect(&window);
        assert_eq!(clusters.len(), 3);
        for cluster in &clusters {
            assert_eq!(cluster.correlated_tenants, 2);
        }
    }

    #[test]
    fn min_cluster_size_filters_small_groups() {
        let config = DetectorConfig {
            min_cluster_size: 2,
            ..DetectorConfig::default()
        };
        let detector = PatternDetector::new(config);
        let window = vec![signal("m1", SourceKind::ApiFailure, Some("500"), 0)];

        assert!(detector.detect(&window).is_empty());
    }

    #[test]
    fn high_severity_singleton_is_emitted() {
        let config = DetectorConfig {
            min_cluster_size: 3,
            ..DetectorConfig::default()
        };
        let detector = PatternDetector::new(config);

        let critical = Signal::new(
            SourceKind::CheckoutError,
            TenantId::new("m1"),
            Severity::Critical,
        );
        let clusters = detector.detect(&[critical]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].severity, Severity::Critical);
        assert_eq!(clusters[0].label, PatternLabel::CheckoutIssue);
    }

    #[test]
    fn dissimilar_signals_split() {
        let detector = PatternDetector::default();
        let window = vec![
            signal("m1", SourceKind::ApiFailure, Some("401"), 0),
            signal("m1", SourceKind::WebhookFailure, Some("timeout"), 90),
        ];

        let clusters = detector.detect(&window);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn empty_window_yields_nothing() {
        assert!(PatternDetector::default().detect(&[]).is_empty());
    }

    #[test]
    fn singleton_similarity_is_one() {
        let detector = PatternDetector::default();
        let clusters = detector.detect(&[signal("m1", SourceKind::ApiFailure, Some("500"), 0)]);
        assert_eq!(clusters[0].similarity, 1.0);
    }
}
