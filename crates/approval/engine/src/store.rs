//! Persistence seam for approval instances
//!
//! The engine owns all writes. `update` enforces optimistic
//! concurrency: the caller hands back the instance at the version it
//! read, and the store refuses the write when the record has moved on.
//! The in-memory adapter is the deterministic reference implementation;
//! production deployments back this trait with a transactional store.

use approval_types::{ApprovalError, ApprovalInstance, ApprovalResult, InstanceId, InstanceStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Storage interface for approval instances
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert a newly created instance. Fails when the id already exists.
    async fn insert(&self, instance: ApprovalInstance) -> ApprovalResult<ApprovalInstance>;

    /// Fetch one instance by id
    async fn get(&self, id: &InstanceId) -> ApprovalResult<Option<ApprovalInstance>>;

    /// Persist a mutation.
    ///
    /// The write succeeds only when `instance.version` matches the
    /// stored record. On success the store bumps the version and
    /// returns the stored copy; on mismatch it returns
    /// `ConcurrencyConflict` and leaves the record untouched.
    async fn update(&self, instance: ApprovalInstance) -> ApprovalResult<ApprovalInstance>;

    /// List instances in any of the given statuses, oldest first
    async fn list_by_status(
        &self,
        statuses: &[InstanceStatus],
    ) -> ApprovalResult<Vec<ApprovalInstance>>;

    /// List every instance, oldest first
    async fn list_all(&self) -> ApprovalResult<Vec<ApprovalInstance>>;

    /// List every open (pending or in-progress) instance
    async fn list_open(&self) -> ApprovalResult<Vec<ApprovalInstance>> {
        self.list_by_status(&[InstanceStatus::Pending, InstanceStatus::InProgress])
            .await
    }
}

/// In-memory instance store
#[derive(Default)]
pub struct InMemoryInstanceStore {
    instances: RwLock<HashMap<InstanceId, ApprovalInstance>>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn insert(&self, instance: ApprovalInstance) -> ApprovalResult<ApprovalInstance> {
        let mut guard = self
            .instances
            .write()
            .map_err(|_| ApprovalError::Storage("instances lock poisoned".to_string()))?;

        if guard.contains_key(&instance.id) {
            return Err(ApprovalError::Storage(format!(
                "instance {} already exists",
                instance.id
            )));
        }
        guard.insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    async fn get(&self, id: &InstanceId) -> ApprovalResult<Option<ApprovalInstance>> {
        let guard = self
            .instances
            .read()
            .map_err(|_| ApprovalError::Storage("instances lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn update(&self, mut instance: ApprovalInstance) -> ApprovalResult<ApprovalInstance> {
        let mut guard = self
            .instances
            .write()
            .map_err(|_| ApprovalError::Storage("instances lock poisoned".to_string()))?;

        let stored = guard
            .get(&instance.id)
            .ok_or_else(|| ApprovalError::InstanceNotFound(instance.id.clone()))?;

        if stored.version != instance.version {
            return Err(ApprovalError::ConcurrencyConflict(instance.id.clone()));
        }

        instance.version += 1;
        guard.insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    async fn list_by_status(
        &self,
        statuses: &[InstanceStatus],
    ) -> ApprovalResult<Vec<ApprovalInstance>> {
        let guard = self
            .instances
            .read()
            .map_err(|_| ApprovalError::Storage("instances lock poisoned".to_string()))?;

        let mut matching: Vec<ApprovalInstance> = guard
            .values()
            .filter(|i| statuses.contains(&i.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    async fn list_all(&self) -> ApprovalResult<Vec<ApprovalInstance>> {
        let guard = self
            .instances
            .read()
            .map_err(|_| ApprovalError::Storage("instances lock poisoned".to_string()))?;

        let mut all: Vec<ApprovalInstance> = guard.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}
