//! Desired Pod for a Dummy
//!
//! Pure mapping with no I/O. The Pod name is derived from the owner's name so
//! the reconciler can look it up without listing.

use crds::Dummy;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Appended to the owner name to form the Pod name
pub const POD_NAME_SUFFIX: &str = "nginx-pod";
/// Label carrying the owner name
pub const APP_LABEL: &str = "app";
pub const CONTAINER_NAME: &str = "nginx";
pub const CONTAINER_IMAGE: &str = "nginx:latest";
pub const CONTAINER_COMMAND: [&str; 2] = ["sleep", "3600"];

/// Name of the Pod owned by the Dummy called `owner`
pub fn pod_name(owner: &str) -> String {
    format!("{owner}{POD_NAME_SUFFIX}")
}

/// Builds the Pod a Dummy should own.
///
/// The controller owner reference is only attached when the Dummy has a uid
/// (i.e. it came from the API server).
pub fn build_pod(dummy: &Dummy) -> Pod {
    let owner = dummy.name_any();
    Pod {
        metadata: ObjectMeta {
            name: Some(pod_name(&owner)),
            namespace: dummy.namespace(),
            labels: Some(BTreeMap::from([(APP_LABEL.to_string(), owner)])),
            owner_references: dummy.controller_owner_ref(&()).map(|owner_ref| vec![owner_ref]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: CONTAINER_NAME.to_string(),
                image: Some(CONTAINER_IMAGE.to_string()),
                command: Some(CONTAINER_COMMAND.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: None,
    }
}

/// True once the kubelet reports the Pod phase as Running
pub fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some("Running")
}
