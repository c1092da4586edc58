//! Dummy CRD
//!
//! Declares a managed workload: the controller echoes `spec.message` into
//! status and keeps a single nginx Pod alive for every Dummy.

use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "interview.com",
    version = "v1alpha1",
    kind = "Dummy",
    plural = "dummies",
    shortname = "dmy",
    namespaced,
    status = "DummyStatus",
    printcolumn = r#"{"name":"Echo","type":"string","jsonPath":".status.specEcho"}"#,
    printcolumn = r#"{"name":"Pod","type":"string","jsonPath":".status.podStatus"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DummySpec {
    /// Arbitrary user-supplied message
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DummyStatus {
    /// Last observed copy of `spec.message`
    #[serde(default)]
    pub spec_echo: String,

    /// Lifecycle of the dependent Pod
    #[serde(default)]
    pub pod_status: PodStatus,

    /// Reconciliation conditions (e.g., Degraded)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Dependent Pod lifecycle as tracked on the Dummy
///
/// Variants are declared in lifecycle order so `Ord` reflects progress:
/// `Unknown < Pending < Running`. Serializes as PascalCase.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "PascalCase")]
pub enum PodStatus {
    /// Not yet observed by the controller
    #[default]
    Unknown,

    /// Pod requested but not yet running
    Pending,

    /// Pod observed running
    Running,
}

impl PodStatus {
    /// Move forward to `next`, never backwards.
    #[must_use]
    pub fn advance(self, next: Self) -> Self {
        self.max(next)
    }

    /// String form used in logs and status
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Pending => "Pending",
            Self::Running => "Running",
        }
    }
}

impl std::fmt::Display for PodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Dummy {
    /// Current pod status, `Unknown` when no status has been written yet
    pub fn pod_status(&self) -> PodStatus {
        self.status.as_ref().map(|s| s.pod_status).unwrap_or_default()
    }

    /// Current spec echo, empty when no status has been written yet
    pub fn spec_echo(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.spec_echo.as_str())
    }

    /// True once the API server has set `deletionTimestamp`
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Mutable access to status, creating the default status if absent
    pub fn status_mut(&mut self) -> &mut DummyStatus {
        self.status.get_or_insert_with(DummyStatus::default)
    }
}
