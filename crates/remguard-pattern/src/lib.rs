//! Pattern detection for Remguard
//!
//! Groups a tenant's recent signals into candidate issue clusters. The
//! detector is a pure function over the signal window: same window, same
//! clusters, regardless of arrival order. Signals from different tenants
//! are never merged.

pub mod detector;
pub mod feature;

pub use detector::{CandidateCluster, DetectorConfig, PatternDetector, PatternLabel};
pub use feature::{signal_distance, FeatureWeights};
