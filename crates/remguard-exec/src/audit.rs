//! Hash-chained audit trail
//!
//! Append-only log of everything the agent does. Each entry hashes its
//! predecessor, so any tampering with history breaks verification from
//! that point forward.

use crate::error::ExecError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ulid::Ulid;

/// One audited action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier
    pub id: Ulid,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Who acted ("agent", an operator id, an integration name)
    pub actor: String,
    /// What happened
    pub action: String,
    /// Plan or issue id the action concerns
    pub subject: String,
    /// Free-form detail
    pub detail: String,
    /// Hash of the previous entry, zero for the first
    pub prev_hash: [u8; 32],
    /// Hash over this entry's fields and `prev_hash`
    pub hash: [u8; 32],
}

impl AuditEntry {
    /// Create an unchained entry; `AuditTrail::append` links and hashes it
    #[must_use]
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Ulid::new(),
            timestamp_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
            actor: actor.into(),
            action: action.into(),
            subject: subject.into(),
            detail: detail.into(),
            prev_hash: [0u8; 32],
            hash: [0u8; 32],
        }
    }
}

/// Append-only hash-chained log
#[derive(Debug, Default)]
pub struct AuditTrail {
    inner: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    /// Create an empty trail
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain and append an entry, returning its id
    pub fn append(&self, mut entry: AuditEntry) -> Ulid {
        let mut guard = self.inner.lock();
        entry.prev_hash = guard.last().map_or([0u8; 32], |e| e.hash);
        entry.hash = compute_hash(&entry);
        let id = entry.id;
        guard.push(entry);
        id
    }

    /// Snapshot of all entries in append order
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().clone()
    }

    /// Entries whose subject matches
    #[must_use]
    pub fn entries_for(&self, subject: &str) -> Vec<AuditEntry> {
        self.inner
            .lock()
            .iter()
            .filter(|e| e.subject == subject)
            .cloned()
            .collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the trail is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Walk the chain and re-derive every hash
    ///
    /// # Errors
    /// `ExecError::AuditIntegrity` naming the first entry whose link or
    /// hash does not check out.
    pub fn verify_integrity(&self) -> Result<(), ExecError> {
        let guard = self.inner.lock();
        let mut prev = [0u8; 32];
        for (index, entry) in guard.iter().enumerate() {
            if entry.prev_hash != prev {
                return Err(ExecError::AuditIntegrity { index });
            }
            if entry.hash != compute_hash(entry) {
                return Err(ExecError::AuditIntegrity { index });
            }
            prev = entry.hash;
        }
        Ok(())
    }
}

fn compute_hash(entry: &AuditEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.id.to_bytes());
    hasher.update(entry.timestamp_ms.to_le_bytes());
    hasher.update(entry.actor.as_bytes());
    hasher.update([0]);
    hasher.update(entry.action.as_bytes());
    hasher.update([0]);
    hasher.update(entry.subject.as_bytes());
    hasher.update([0]);
    hasher.update(entry.detail.as_bytes());
    hasher.update([0]);
    hasher.update(entry.prev_hash);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_links_and_verifies() {
        let trail = AuditTrail::new();
        trail.append(AuditEntry::new("agent", "plan_created", "plan_1", ""));
        trail.append(AuditEntry::new("executor", "attempt", "plan_1", "attempt 1"));
        trail.append(AuditEntry::new("executor", "outcome", "plan_1", "success"));

        assert_eq!(trail.len(), 3);
        assert!(trail.verify_integrity().is_ok());

        let entries = trail.entries();
        assert_eq!(entries[0].prev_hash, [0u8; 32]);
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert_eq!(entries[2].prev_hash, entries[1].hash);
    }

    #[test]
    fn tampering_breaks_verification() {
        let trail = AuditTrail::new();
        trail.append(AuditEntry::new("agent", "plan_created", "plan_1", ""));
        trail.append(AuditEntry::new("executor", "outcome", "plan_1", "success"));

        {
            let mut guard = trail.inner.lock();
            guard[0].detail = "rewritten history".into();
        }
        assert!(matches!(
            trail.verify_integrity(),
            Err(ExecError::AuditIntegrity { index: 0 })
        ));
    }

    #[test]
    fn subject_filter() {
        let trail = AuditTrail::new();
        trail.append(AuditEntry::new("agent", "a", "plan_1", ""));
        trail.append(AuditEntry::new("agent", "b", "plan_2", ""));
        trail.append(AuditEntry::new("agent", "c", "plan_1", ""));

        assert_eq!(trail.entries_for("plan_1").len(), 2);
        assert_eq!(trail.entries_for("plan_3").len(), 0);
    }

    #[test]
    fn empty_trail_verifies() {
        assert!(AuditTrail::new().verify_integrity().is_ok());
    }
}
