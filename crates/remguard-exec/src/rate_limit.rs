//! Per-tenant sliding-window rate quota
//!
//! Caps how many actions the agent may take against one tenant inside a
//! rolling window. A refused acquire becomes a `Throttled` outcome, not
//! an error: the plan stays valid and may be retried later.

use dashmap::DashMap;
use remguard_signal::TenantId;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rate limiter tunables
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum actions per tenant inside the window
    pub max_actions: usize,
    /// Rolling window length
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_actions: 5,
            window: Duration::from_secs(600),
        }
    }
}

/// Sliding-window limiter keyed by tenant
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    history: DashMap<TenantId, VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given tunables
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
        }
    }

    /// Try to take one slot for the tenant
    ///
    /// Returns `false` without consuming a slot when the tenant is at
    /// quota.
    pub fn try_acquire(&self, tenant: &TenantId) -> bool {
        self.try_acquire_at(tenant, Instant::now())
    }

    fn try_acquire_at(&self, tenant: &TenantId, now: Instant) -> bool {
        let mut entry = self.history.entry(tenant.clone()).or_default();
        let cutoff = now.checked_sub(self.config.window);

        while let Some(front) = entry.front() {
            match cutoff {
                Some(cutoff) if *front <= cutoff => {
                    entry.pop_front();
                }
                _ => break,
            }
        }

        if entry.len() >= self.config.max_actions {
            tracing::debug!(tenant = %tenant, "rate quota exhausted");
            return false;
        }
        entry.push_back(now);
        true
    }

    /// Slots currently consumed for the tenant
    #[must_use]
    pub fn in_flight(&self, tenant: &TenantId) -> usize {
        self.history.get(tenant).map_or(0, |e| e.len())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_enforced_per_tenant() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_actions: 2,
            window: Duration::from_secs(60),
        });
        let t1 = TenantId::new("m1");
        let t2 = TenantId::new("m2");

        assert!(limiter.try_acquire(&t1));
        assert!(limiter.try_acquire(&t1));
        assert!(!limiter.try_acquire(&t1));

        // Other tenants are unaffected
        assert!(limiter.try_acquire(&t2));
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_actions: 1,
            window: Duration::from_millis(50),
        });
        let tenant = TenantId::new("m1");
        let start = Instant::now();

        assert!(limiter.try_acquire_at(&tenant, start));
        assert!(!limiter.try_acquire_at(&tenant, start + Duration::from_millis(10)));
        assert!(limiter.try_acquire_at(&tenant, start + Duration::from_millis(100)));
    }

    #[test]
    fn refused_acquire_consumes_nothing() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_actions: 1,
            window: Duration::from_secs(60),
        });
        let tenant = TenantId::new("m1");

        assert!(limiter.try_acquire(&tenant));
        assert!(!limiter.try_acquire(&tenant));
        assert_eq!(limiter.in_flight(&tenant), 1);
    }
}
