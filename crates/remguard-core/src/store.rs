//! Issue state store boundary
//!
//! The orchestrator is the only writer; everything it does to an issue
//! goes through `StateStore`. Saves are optimistic: the caller presents
//! the version it loaded, and the save fails if someone else got there
//! first. The in-memory implementation is the reference for the
//! contract and backs all tests.

use crate::error::StoreError;
use crate::issue::Issue;
use dashmap::DashMap;
use remguard_exec::{AuditEntry, AuditTrail};
use remguard_signal::IssueId;
use std::sync::Arc;

/// Persistence boundary for issues plus the audit sink
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Load an issue by id
    async fn load(&self, id: IssueId) -> Result<Issue, StoreError>;

    /// Save an issue, failing on a version conflict
    ///
    /// On success the stored version is `issue.version + 1`; the caller
    /// reloads rather than assuming.
    async fn save(&self, issue: &Issue) -> Result<u64, StoreError>;

    /// All issue ids currently known
    async fn list(&self) -> Vec<IssueId>;

    /// Append to the audit trail
    fn append_audit(&self, entry: AuditEntry);
}

/// Reference in-memory store
#[derive(Debug)]
pub struct InMemoryStateStore {
    issues: DashMap<IssueId, Issue>,
    audit: Arc<AuditTrail>,
}

impl InMemoryStateStore {
    /// Create an empty store writing to the given trail
    #[must_use]
    pub fn new(audit: Arc<AuditTrail>) -> Self {
        Self {
            issues: DashMap::new(),
            audit,
        }
    }

    /// The audit trail this store appends to
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.audit
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, id: IssueId) -> Result<Issue, StoreError> {
        self.issues
            .get(&id)
            .map(|i| i.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, issue: &Issue) -> Result<u64, StoreError> {
        match self.issues.entry(issue.id) {
            dashmap::Entry::Occupied(mut occupied) => {
                let stored = occupied.get();
                if stored.version != issue.version {
                    return Err(StoreError::VersionConflict {
                        issue_id: issue.id,
                        expected: issue.version,
                        found: stored.version,
                    });
                }
                let mut updated = issue.clone();
                updated.version += 1;
                let version = updated.version;
                occupied.insert(updated);
                Ok(version)
            }
            dashmap::Entry::Vacant(vacant) => {
                let mut stored = issue.clone();
                stored.version = issue.version + 1;
                let version = stored.version;
                vacant.insert(stored);
                Ok(version)
            }
        }
    }

    async fn list(&self) -> Vec<IssueId> {
        self.issues.iter().map(|e| *e.key()).collect()
    }

    fn append_audit(&self, entry: AuditEntry) {
        self.audit.append(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueStatus;
    use pretty_assertions::assert_eq;
    use remguard_pattern::PatternLabel;
    use remguard_signal::{Severity, TenantId};

    fn store() -> InMemoryStateStore {
        InMemoryStateStore::new(Arc::new(AuditTrail::new()))
    }

    fn issue() -> Issue {
        Issue::new(TenantId::new("m1"), PatternLabel::ConfigDrift, Severity::Medium)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = store();
        let issue = issue();
        let id = issue.id;

        let version = store.save(&issue).await.unwrap();
        assert_eq!(version, 1);

        let loaded = store.load(id).await.unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn stale_save_is_rejected() {
        let store = store();
        let issue = issue();
        store.save(&issue).await.unwrap();

        // First writer wins
        let mut fresh = store.load(issue.id).await.unwrap();
        fresh.transition(IssueStatus::Clustering).unwrap();
        store.save(&fresh).await.unwrap();

        // Second writer still holds the old version
        let stale = issue;
        let err = store.save(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { found: 2, .. }));
    }

    #[tokio::test]
    async fn load_of_unknown_issue_fails() {
        let result = store().load(IssueId::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_returns_all_ids() {
        let store = store();
        let a = issue();
        let b = issue();
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        let mut ids = store.list().await;
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
    }
}
