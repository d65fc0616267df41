//! # Lease Store
//!
//! Storage for one named lease with optimistic concurrency. Writes carry the
//! `resourceVersion` that was read; a stale version fails with
//! [`ElectionError::Conflict`] and the caller simply tries again next round.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ElectionError;
use crate::lease::Lease;

/// Access to one lease object.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Namespace of the lease.
    fn namespace(&self) -> &str;

    /// Name of the lease.
    fn lease_name(&self) -> &str;

    /// Read the lease. `None` when it does not exist.
    async fn get(&self) -> Result<Option<Lease>, ElectionError>;

    /// Create the lease. Fails with `Conflict` if it already exists.
    async fn create(&self, lease: &Lease) -> Result<Lease, ElectionError>;

    /// Replace the lease. Fails with `Conflict` if `lease`'s resource version
    /// is stale.
    async fn update(&self, lease: &Lease) -> Result<Lease, ElectionError>;
}

#[derive(Debug, Default)]
struct Slot {
    lease: Option<Lease>,
    version: u64,
}

/// In-memory store. Clones share the same slot, so several electors built
/// from clones behave like replicas of one deployment.
#[derive(Debug, Clone)]
pub struct MemoryLeaseStore {
    namespace: String,
    name: String,
    slot: Arc<Mutex<Slot>>,
}

impl MemoryLeaseStore {
    /// An empty store for `namespace/name`.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Current lease, bypassing concurrency control.
    pub fn snapshot(&self) -> Option<Lease> {
        self.slot.lock().lease.clone()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn lease_name(&self) -> &str {
        &self.name
    }

    async fn get(&self) -> Result<Option<Lease>, ElectionError> {
        Ok(self.slot.lock().lease.clone())
    }

    async fn create(&self, lease: &Lease) -> Result<Lease, ElectionError> {
        let mut slot = self.slot.lock();
        if slot.lease.is_some() {
            return Err(ElectionError::Conflict);
        }
        slot.version += 1;
        let mut stored = lease.clone();
        stored.metadata.resource_version = Some(slot.version.to_string());
        slot.lease = Some(stored.clone());
        Ok(stored)
    }

    async fn update(&self, lease: &Lease) -> Result<Lease, ElectionError> {
        let mut slot = self.slot.lock();
        let current = slot
            .lease
            .as_ref()
            .and_then(|l| l.metadata.resource_version.clone());
        if current.is_none() || current != lease.metadata.resource_version {
            return Err(ElectionError::Conflict);
        }
        slot.version += 1;
        let mut stored = lease.clone();
        stored.metadata.resource_version = Some(slot.version.to_string());
        slot.lease = Some(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::LeaseSpec;

    fn lease(holder: &str) -> Lease {
        Lease::new(
            "ops",
            "leader",
            LeaseSpec {
                holder_identity: Some(holder.into()),
                ..LeaseSpec::default()
            },
        )
    }

    #[tokio::test]
    async fn create_then_conflict() {
        let store = MemoryLeaseStore::new("ops", "leader");
        assert!(store.get().await.unwrap().is_none());
        let created = store.create(&lease("a")).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(store.create(&lease("b")).await, Err(ElectionError::Conflict));
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = MemoryLeaseStore::new("ops", "leader");
        let replica = store.clone();
        let v1 = store.create(&lease("a")).await.unwrap();

        let mut mine = v1.clone();
        mine.spec.holder_identity = Some("a".into());
        store.update(&mine).await.unwrap();

        let mut theirs = v1;
        theirs.spec.holder_identity = Some("b".into());
        assert_eq!(replica.update(&theirs).await, Err(ElectionError::Conflict));
        assert_eq!(
            store.snapshot().unwrap().spec.holder_identity.as_deref(),
            Some("a")
        );
    }

    #[tokio::test]
    async fn update_of_missing_lease_conflicts() {
        let store = MemoryLeaseStore::new("ops", "leader");
        assert_eq!(store.update(&lease("a")).await, Err(ElectionError::Conflict));
    }
}
