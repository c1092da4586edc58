//! Kubernetes-backed object store

use crate::error::StoreError;
use crate::store_trait::ObjectStore;
use crds::Dummy;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Object store talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Creates a store using the given kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dummies(&self, namespace: &str) -> Api<Dummy> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Namespace of an object about to be written, rejecting namespace-less input
fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, StoreError> {
    obj.namespace()
        .ok_or_else(|| StoreError::Schema(format!("{} has no namespace", obj.name_any())))
}

#[async_trait::async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_dummy(&self, namespace: &str, name: &str) -> Result<Dummy, StoreError> {
        debug!("GET Dummy {}/{}", namespace, name);
        Ok(self.dummies(namespace).get(name).await?)
    }

    async fn create_dummy(&self, dummy: &Dummy) -> Result<Dummy, StoreError> {
        let namespace = namespace_of(dummy)?;
        debug!("CREATE Dummy {}/{}", namespace, dummy.name_any());
        Ok(self
            .dummies(&namespace)
            .create(&PostParams::default(), dummy)
            .await?)
    }

    async fn update_dummy(&self, dummy: &Dummy) -> Result<Dummy, StoreError> {
        let namespace = namespace_of(dummy)?;
        let name = dummy.name_any();
        debug!("UPDATE Dummy {}/{}", namespace, name);
        Ok(self
            .dummies(&namespace)
            .replace(&name, &PostParams::default(), dummy)
            .await?)
    }

    async fn update_dummy_status(&self, dummy: &Dummy) -> Result<Dummy, StoreError> {
        let namespace = namespace_of(dummy)?;
        let name = dummy.name_any();
        debug!("UPDATE STATUS Dummy {}/{}", namespace, name);

        // resourceVersion in a merge patch makes the API server enforce
        // optimistic concurrency just like a full replace
        let status_patch = json!({
            "metadata": { "resourceVersion": dummy.resource_version() },
            "status": dummy.status,
        });

        Ok(self
            .dummies(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await?)
    }

    async fn delete_dummy(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        debug!("DELETE Dummy {}/{}", namespace, name);
        self.dummies(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, StoreError> {
        debug!("GET Pod {}/{}", namespace, name);
        Ok(self.pods(namespace).get(name).await?)
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, StoreError> {
        let namespace = namespace_of(pod)?;
        debug!("CREATE Pod {}/{}", namespace, pod.name_any());
        Ok(self.pods(&namespace).create(&PostParams::default(), pod).await?)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        debug!("DELETE Pod {}/{}", namespace, name);
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
