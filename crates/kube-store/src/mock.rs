//! Mock ObjectStore for unit testing
//!
//! This module provides an in-memory implementation of `ObjectStore` that
//! behaves like the API server where the reconciler cares:
//! - every write bumps `resourceVersion`, stale writes return `Conflict`
//! - deleting a Dummy with finalizers only sets `deletionTimestamp`; the
//!   object disappears once an update removes the last finalizer
//! - `update_dummy` ignores status, `update_dummy_status` ignores everything else
//!
//! Successful writes are journaled so tests can assert on write counts, and
//! errors can be queued per operation.

use crate::error::StoreError;
use crate::store_trait::ObjectStore;
use crds::Dummy;
use k8s_openapi::api::core::v1::{Pod, PodStatus as CorePodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (String, String);

/// Store operations, used for fault injection and the write journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetDummy,
    CreateDummy,
    UpdateDummy,
    UpdateDummyStatus,
    DeleteDummy,
    GetPod,
    CreatePod,
    DeletePod,
}

/// One successful write recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWrite {
    pub op: StoreOp,
    pub namespace: String,
    pub name: String,
}

/// Mock ObjectStore for testing
#[derive(Clone, Default)]
pub struct MockObjectStore {
    dummies: Arc<Mutex<HashMap<Key, Dummy>>>,
    pods: Arc<Mutex<HashMap<Key, Pod>>>,
    failures: Arc<Mutex<HashMap<StoreOp, VecDeque<StoreError>>>>,
    writes: Arc<Mutex<Vec<StoreWrite>>>,
    pod_phase_on_create: Arc<Mutex<Option<String>>>,
    next_version: Arc<Mutex<u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key_of<K: ResourceExt>(obj: &K) -> Result<Key, StoreError> {
    let namespace = obj
        .namespace()
        .ok_or_else(|| StoreError::Schema(format!("{} has no namespace", obj.name_any())))?;
    Ok((namespace, obj.name_any()))
}

fn not_found(kind: &str, key: &Key) -> StoreError {
    StoreError::NotFound(format!("{} {}/{}", kind, key.0, key.1))
}

/// Rejects writes carrying a resourceVersion other than the stored one
fn check_version<K: ResourceExt>(stored: &K, incoming: &K, key: &Key) -> Result<(), StoreError> {
    match incoming.resource_version() {
        Some(version) if Some(&version) != stored.resource_version().as_ref() => {
            Err(StoreError::Conflict(format!(
                "{}/{}: resourceVersion {} is stale",
                key.0, key.1, version
            )))
        }
        _ => Ok(()),
    }
}

fn deletion_time() -> Option<Time> {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).ok()
}

impl MockObjectStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Pods created through the store report this `status.phase`,
    /// as if the kubelet started them instantly.
    #[must_use]
    pub fn with_pod_phase_on_create(self, phase: &str) -> Self {
        *lock(&self.pod_phase_on_create) = Some(phase.to_string());
        self
    }

    fn bump_version(&self) -> String {
        let mut next = lock(&self.next_version);
        *next += 1;
        next.to_string()
    }

    fn record(&self, op: StoreOp, key: &Key) {
        lock(&self.writes).push(StoreWrite {
            op,
            namespace: key.0.clone(),
            name: key.1.clone(),
        });
    }

    fn take_failure(&self, op: StoreOp) -> Result<(), StoreError> {
        match lock(&self.failures).get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Queue an error returned by the next call of `op`
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        lock(&self.failures).entry(op).or_default().push_back(err);
    }

    /// Add a Dummy directly (for test setup, not journaled)
    pub fn insert_dummy(&self, mut dummy: Dummy) {
        if let Ok(key) = key_of(&dummy) {
            dummy.metadata.resource_version = Some(self.bump_version());
            if dummy.metadata.uid.is_none() {
                dummy.metadata.uid = Some(format!("uid-{}-{}", key.0, key.1));
            }
            lock(&self.dummies).insert(key, dummy);
        }
    }

    /// Add a Pod directly (for test setup, not journaled)
    pub fn insert_pod(&self, mut pod: Pod) {
        if let Ok(key) = key_of(&pod) {
            pod.metadata.resource_version = Some(self.bump_version());
            lock(&self.pods).insert(key, pod);
        }
    }

    /// Set `status.phase` of a stored Pod, as the kubelet would
    pub fn set_pod_phase(&self, namespace: &str, name: &str, phase: &str) {
        let key = (namespace.to_string(), name.to_string());
        if let Some(pod) = lock(&self.pods).get_mut(&key) {
            pod.status.get_or_insert_with(CorePodStatus::default).phase = Some(phase.to_string());
        }
    }

    /// Apply a change to a stored Dummy behind the controller's back,
    /// bumping its resourceVersion (not journaled)
    pub fn modify_dummy(&self, namespace: &str, name: &str, change: impl FnOnce(&mut Dummy)) {
        let key = (namespace.to_string(), name.to_string());
        let version = self.bump_version();
        if let Some(dummy) = lock(&self.dummies).get_mut(&key) {
            change(dummy);
            dummy.metadata.resource_version = Some(version);
        }
    }

    /// Snapshot of a stored Dummy
    pub fn dummy(&self, namespace: &str, name: &str) -> Option<Dummy> {
        lock(&self.dummies)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Snapshot of a stored Pod
    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        lock(&self.pods)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of Pods in a namespace
    pub fn pod_count(&self, namespace: &str) -> usize {
        lock(&self.pods).keys().filter(|(ns, _)| ns == namespace).count()
    }

    /// All successful writes so far
    pub fn writes(&self) -> Vec<StoreWrite> {
        lock(&self.writes).clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn get_dummy(&self, namespace: &str, name: &str) -> Result<Dummy, StoreError> {
        self.take_failure(StoreOp::GetDummy)?;
        let key = (namespace.to_string(), name.to_string());
        lock(&self.dummies)
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found("Dummy", &key))
    }

    async fn create_dummy(&self, dummy: &Dummy) -> Result<Dummy, StoreError> {
        self.take_failure(StoreOp::CreateDummy)?;
        let key = key_of(dummy)?;
        let mut created = dummy.clone();
        created.metadata.resource_version = Some(self.bump_version());
        created.metadata.uid = Some(format!("uid-{}-{}", key.0, key.1));
        created.metadata.deletion_timestamp = None;
        {
            let mut dummies = lock(&self.dummies);
            if dummies.contains_key(&key) {
                return Err(StoreError::AlreadyExists(format!("Dummy {}/{}", key.0, key.1)));
            }
            dummies.insert(key.clone(), created.clone());
        }
        self.record(StoreOp::CreateDummy, &key);
        Ok(created)
    }

    async fn update_dummy(&self, dummy: &Dummy) -> Result<Dummy, StoreError> {
        self.take_failure(StoreOp::UpdateDummy)?;
        let key = key_of(dummy)?;
        let version = self.bump_version();
        let updated = {
            let mut dummies = lock(&self.dummies);
            let stored = dummies.get(&key).ok_or_else(|| not_found("Dummy", &key))?;
            check_version(stored, dummy, &key)?;

            let mut updated = dummy.clone();
            updated.status = stored.status.clone();
            updated.metadata.uid = stored.metadata.uid.clone();
            updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
            updated.metadata.resource_version = Some(version);

            if updated.is_deleting() && updated.finalizers().is_empty() {
                dummies.remove(&key);
            } else {
                dummies.insert(key.clone(), updated.clone());
            }
            updated
        };
        self.record(StoreOp::UpdateDummy, &key);
        Ok(updated)
    }

    async fn update_dummy_status(&self, dummy: &Dummy) -> Result<Dummy, StoreError> {
        self.take_failure(StoreOp::UpdateDummyStatus)?;
        let key = key_of(dummy)?;
        let version = self.bump_version();
        let updated = {
            let mut dummies = lock(&self.dummies);
            let stored = dummies.get_mut(&key).ok_or_else(|| not_found("Dummy", &key))?;
            check_version(&*stored, dummy, &key)?;
            stored.status = dummy.status.clone();
            stored.metadata.resource_version = Some(version);
            stored.clone()
        };
        self.record(StoreOp::UpdateDummyStatus, &key);
        Ok(updated)
    }

    async fn delete_dummy(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.take_failure(StoreOp::DeleteDummy)?;
        let key = (namespace.to_string(), name.to_string());
        let version = self.bump_version();
        {
            let mut dummies = lock(&self.dummies);
            let stored = dummies.get_mut(&key).ok_or_else(|| not_found("Dummy", &key))?;
            if stored.finalizers().is_empty() {
                dummies.remove(&key);
            } else if stored.metadata.deletion_timestamp.is_none() {
                stored.metadata.deletion_timestamp = deletion_time();
                stored.metadata.resource_version = Some(version);
            }
        }
        self.record(StoreOp::DeleteDummy, &key);
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, StoreError> {
        self.take_failure(StoreOp::GetPod)?;
        let key = (namespace.to_string(), name.to_string());
        lock(&self.pods)
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found("Pod", &key))
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, StoreError> {
        self.take_failure(StoreOp::CreatePod)?;
        let key = key_of(pod)?;
        let mut created = pod.clone();
        created.metadata.resource_version = Some(self.bump_version());
        created.metadata.uid = Some(format!("uid-pod-{}-{}", key.0, key.1));
        if let Some(phase) = lock(&self.pod_phase_on_create).clone() {
            created.status.get_or_insert_with(CorePodStatus::default).phase = Some(phase);
        }
        {
            let mut pods = lock(&self.pods);
            if pods.contains_key(&key) {
                return Err(StoreError::AlreadyExists(format!("Pod {}/{}", key.0, key.1)));
            }
            pods.insert(key.clone(), created.clone());
        }
        self.record(StoreOp::CreatePod, &key);
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.take_failure(StoreOp::DeletePod)?;
        let key = (namespace.to_string(), name.to_string());
        if lock(&self.pods).remove(&key).is_none() {
            return Err(not_found("Pod", &key));
        }
        self.record(StoreOp::DeletePod, &key);
        Ok(())
    }
}
