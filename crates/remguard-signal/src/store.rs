//! Append-only signal store
//!
//! Holds the recent signal window, keyed by signal id and indexed by
//! (tenant, time). Insertion is idempotent on signal id: re-inserting a
//! known id is a no-op. Signals are retained for a bounded lookback window
//! (the pattern-detection horizon) and pruned past it.

use crate::ids::{SignalId, TenantId};
use crate::signal::Signal;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Signals currently retained
    pub retained: usize,
    /// Total inserts accepted (excludes idempotent replays)
    pub total_inserted: u64,
    /// Idempotent replays seen
    pub duplicates_ignored: u64,
}

/// Append-only, time-windowed signal store
#[derive(Debug)]
pub struct SignalStore {
    /// Signals by id
    signals: DashMap<SignalId, Signal>,
    /// Per-tenant index ordered by (timestamp, signal id)
    by_tenant: DashMap<TenantId, BTreeMap<(DateTime<Utc>, SignalId), SignalId>>,
    /// Retention horizon
    lookback: Duration,
    /// Counters
    stats: RwLock<StoreStats>,
}

impl SignalStore {
    /// Create a store with the given lookback horizon
    #[must_use]
    pub fn new(lookback: Duration) -> Self {
        Self {
            signals: DashMap::new(),
            by_tenant: DashMap::new(),
            lookback,
            stats: RwLock::new(StoreStats::default()),
        }
    }

    /// Insert a signal; idempotent on signal id
    ///
    /// Returns `true` if the signal was newly inserted, `false` if the id
    /// was already known (no state changes in that case).
    pub fn insert(&self, signal: Signal) -> bool {
        if self.signals.contains_key(&signal.id) {
            self.stats.write().duplicates_ignored += 1;
            tracing::debug!(signal_id = %signal.id, "duplicate signal ignored");
            return false;
        }

        self.by_tenant
            .entry(signal.tenant.clone())
            .or_default()
            .insert((signal.timestamp, signal.id), signal.id);
        self.signals.insert(signal.id, signal);

        let mut stats = self.stats.write();
        stats.total_inserted += 1;
        stats.retained = self.signals.len();
        true
    }

    /// Look up a signal by id
    #[must_use]
    pub fn get(&self, id: SignalId) -> Option<Signal> {
        self.signals.get(&id).map(|s| s.clone())
    }

    /// Whether the store already holds this id
    #[inline]
    #[must_use]
    pub fn contains(&self, id: SignalId) -> bool {
        self.signals.contains_key(&id)
    }

    /// Signals for one tenant within the lookback window ending at `now`,
    /// in timestamp order
    #[must_use]
    pub fn tenant_window(&self, tenant: &TenantId, now: DateTime<Utc>) -> Vec<Signal> {
        let cutoff = now - self.lookback;
        let Some(index) = self.by_tenant.get(tenant) else {
            return Vec::new();
        };
        index
            .values()
            .filter_map(|id| self.signals.get(id).map(|s| s.clone()))
            .filter(|s| s.timestamp >= cutoff && s.timestamp <= now)
            .collect()
    }

    /// Drop signals older than the lookback window
    ///
    /// Returns the number of signals pruned.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.lookback;
        let mut pruned = 0;

        for mut entry in self.by_tenant.iter_mut() {
            let expired: Vec<(DateTime<Utc>, SignalId)> = entry
                .range(..(cutoff, SignalId(ulid::Ulid::nil())))
                .map(|(k, _)| *k)
                .collect();
            for key in expired {
                entry.remove(&key);
                self.signals.remove(&key.1);
                pruned += 1;
            }
        }

        if pruned > 0 {
            self.stats.write().retained = self.signals.len();
            tracing::debug!(pruned, "pruned expired signals");
        }
        pruned
    }

    /// Store statistics snapshot
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.stats.read().clone()
    }

    /// Number of signals currently retained
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl Default for SignalStore {
    fn default() -> Self {
        // Two-hour horizon matches the default pattern-detection window
        Self::new(Duration::minutes(120))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Severity, SourceKind};

    fn sample(tenant: &str) -> Signal {
        Signal::new(SourceKind::ApiFailure, TenantId::new(tenant), Severity::Medium)
            .with_error_code("500")
    }

    #[test]
    fn insert_is_idempotent() {
        let store = SignalStore::default();
        let signal = sample("t1");
        let id = signal.id;

        assert!(store.insert(signal.clone()));
        assert!(!store.insert(signal));
        assert_eq!(store.len(), 1);
        assert!(store.contains(id));

        let stats = store.stats();
        assert_eq!(stats.total_inserted, 1);
        assert_eq!(stats.duplicates_ignored, 1);
    }

    #[test]
    fn tenant_window_is_scoped_and_ordered() {
        let store = SignalStore::default();
        let now = Utc::now();

        let s1 = sample("t1").with_timestamp(now - Duration::minutes(30));
        let s2 = sample("t1").with_timestamp(now - Duration::minutes(5));
        let other = sample("t2").with_timestamp(now - Duration::minutes(1));
        let (id1, id2) = (s1.id, s2.id);

        store.insert(s2);
        store.insert(s1);
        store.insert(other);

        let window = store.tenant_window(&TenantId::new("t1"), now);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].id, id1);
        assert_eq!(window[1].id, id2);
    }

    #[test]
    fn window_excludes_expired() {
        let store = SignalStore::new(Duration::minutes(15));
        let now = Utc::now();

        store.insert(sample("t1").with_timestamp(now - Duration::minutes(60)));
        store.insert(sample("t1").with_timestamp(now - Duration::minutes(5)));

        let window = store.tenant_window(&TenantId::new("t1"), now);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn prune_removes_expired() {
        let store = SignalStore::new(Duration::minutes(15));
        let now = Utc::now();

        store.insert(sample("t1").with_timestamp(now - Duration::minutes(60)));
        store.insert(sample("t1").with_timestamp(now - Duration::minutes(5)));

        assert_eq!(store.prune(now), 1);
        assert_eq!(store.len(), 1);
    }
}
