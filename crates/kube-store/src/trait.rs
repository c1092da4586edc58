//! ObjectStore trait for mocking
//!
//! This trait abstracts the Kubernetes API so the reconciler can be unit
//! tested against an in-memory store. `KubeObjectStore` implements it for a
//! real cluster and `MockObjectStore` (feature `test-util`) for tests.

use crate::error::StoreError;
use crds::Dummy;
use k8s_openapi::api::core::v1::Pod;

/// Key-addressed CRUD over `Dummy` and `Pod`
///
/// Updates carry the object's `resourceVersion`; a stale version yields
/// `StoreError::Conflict` instead of overwriting.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    // Dummy operations
    async fn get_dummy(&self, namespace: &str, name: &str) -> Result<Dummy, StoreError>;
    async fn create_dummy(&self, dummy: &Dummy) -> Result<Dummy, StoreError>;
    /// Replace metadata and spec (finalizers live here); status is ignored.
    async fn update_dummy(&self, dummy: &Dummy) -> Result<Dummy, StoreError>;
    /// Write the status subresource only.
    async fn update_dummy_status(&self, dummy: &Dummy) -> Result<Dummy, StoreError>;
    async fn delete_dummy(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    // Pod operations
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, StoreError>;
    async fn create_pod(&self, pod: &Pod) -> Result<Pod, StoreError>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
