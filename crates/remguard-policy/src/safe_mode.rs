//! Global Safe Mode flag
//!
//! Entered automatically when calibration degrades; left only by an
//! explicit operator action. While active, every emitted plan requires
//! approval regardless of risk tier. Snapshots carry a version so a
//! decision can record exactly which Safe Mode state it saw.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Point-in-time view of Safe Mode, taken at decision time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeModeSnapshot {
    /// Whether Safe Mode is active
    pub active: bool,
    /// Monotonic version, bumped on every activation and deactivation
    pub version: u64,
    /// Why Safe Mode was entered, when active
    pub reason: Option<String>,
}

impl SafeModeSnapshot {
    /// Snapshot of an inactive Safe Mode at version zero
    #[inline]
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            active: false,
            version: 0,
            reason: None,
        }
    }
}

#[derive(Debug)]
struct State {
    active: bool,
    version: u64,
    reason: Option<String>,
    entered_at: Option<DateTime<Utc>>,
}

/// Shared Safe Mode state
#[derive(Debug)]
pub struct SafeMode {
    state: RwLock<State>,
}

impl SafeMode {
    /// Create an inactive Safe Mode
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                active: false,
                version: 0,
                reason: None,
                entered_at: None,
            }),
        }
    }

    /// Enter Safe Mode; idempotent while already active
    ///
    /// Returns `true` if this call performed the transition.
    pub fn activate(&self, reason: impl Into<String>) -> bool {
        let mut state = self.state.write();
        if state.active {
            return false;
        }
        let reason = reason.into();
        state.active = true;
        state.version += 1;
        state.reason = Some(reason.clone());
        state.entered_at = Some(Utc::now());
        tracing::warn!(version = state.version, %reason, "safe mode activated");
        true
    }

    /// Leave Safe Mode; only an operator may do this
    ///
    /// Returns `false` when Safe Mode was not active or the operator id
    /// is empty; the state is untouched in either case.
    pub fn deactivate(&self, operator_id: &str) -> bool {
        if operator_id.is_empty() {
            return false;
        }
        let mut state = self.state.write();
        if !state.active {
            return false;
        }
        state.active = false;
        state.version += 1;
        state.reason = None;
        state.entered_at = None;
        tracing::info!(version = state.version, operator_id, "safe mode deactivated");
        true
    }

    /// Whether Safe Mode is currently active
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.read().active
    }

    /// Consistent point-in-time snapshot for a decision
    #[must_use]
    pub fn snapshot(&self) -> SafeModeSnapshot {
        let state = self.state.read();
        SafeModeSnapshot {
            active: state.active,
            version: state.version,
            reason: state.reason.clone(),
        }
    }

    /// When Safe Mode was entered, if active
    #[must_use]
    pub fn entered_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().entered_at
    }
}

impl Default for SafeMode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn activation_is_idempotent() {
        let safe_mode = SafeMode::new();
        assert!(safe_mode.activate("calibration drift"));
        assert!(!safe_mode.activate("again"));
        assert!(safe_mode.is_active());

        let snapshot = safe_mode.snapshot();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.reason.as_deref(), Some("calibration drift"));
    }

    #[test]
    fn deactivation_needs_operator() {
        let safe_mode = SafeMode::new();
        safe_mode.activate("five consecutive failures");

        assert!(!safe_mode.deactivate(""));
        assert!(safe_mode.is_active());

        assert!(safe_mode.deactivate("op_7"));
        assert!(!safe_mode.is_active());
        assert_eq!(safe_mode.snapshot().version, 2);
    }

    #[test]
    fn deactivating_inactive_is_a_noop() {
        let safe_mode = SafeMode::new();
        assert!(!safe_mode.deactivate("op_7"));
        assert_eq!(safe_mode.snapshot().version, 0);
    }

    #[test]
    fn version_tracks_every_transition() {
        let safe_mode = SafeMode::new();
        safe_mode.activate("a");
        safe_mode.deactivate("op");
        safe_mode.activate("b");
        assert_eq!(safe_mode.snapshot().version, 3);
    }
}
