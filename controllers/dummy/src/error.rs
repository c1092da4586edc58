//! Controller-specific error types.
//!
//! `ControllerError` covers process-level failures (client setup, config,
//! watch loop, health server). `ReconcileError` is the failure arm of a single
//! reconcile pass and records which step failed.

use kube_store::StoreError;
use std::fmt;
use thiserror::Error;

/// Errors that can occur in the Dummy Controller process.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Health/metrics server I/O error
    #[error("Health server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Reconcile step a store call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    GetDummy,
    UpdateStatus,
    GetPod,
    CreatePod,
    DeletePod,
    UpdateFinalizers,
}

impl Step {
    /// CamelCase name, used as condition reason
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetDummy => "GetDummy",
            Self::UpdateStatus => "UpdateStatus",
            Self::GetPod => "GetPod",
            Self::CreatePod => "CreatePod",
            Self::DeletePod => "DeletePod",
            Self::UpdateFinalizers => "UpdateFinalizers",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a reconcile pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A store call failed
    #[error("{step} failed: {source}")]
    Store { step: Step, source: StoreError },

    /// Optimistic concurrency kept failing after fresh re-reads
    #[error("{step} still conflicting after {attempts} attempts: {source}")]
    ConflictRetriesExhausted {
        step: Step,
        attempts: u32,
        source: StoreError,
    },

    /// The pass was cancelled before finishing
    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub const fn store(step: Step, source: StoreError) -> Self {
        Self::Store { step, source }
    }

    /// Malformed objects are reported but not retried
    pub const fn is_permanent(&self) -> bool {
        match self {
            Self::Store { source, .. } => source.is_permanent(),
            Self::ConflictRetriesExhausted { .. } | Self::Cancelled => false,
        }
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short machine-readable name, used in metrics labels and conditions
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Store { step, .. } | Self::ConflictRetriesExhausted { step, .. } => step.as_str(),
            Self::Cancelled => "Cancelled",
        }
    }

    /// Store error kind, `Cancelled` for cancelled passes
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Store { source, .. } | Self::ConflictRetriesExhausted { source, .. } => {
                source.kind()
            }
            Self::Cancelled => "Cancelled",
        }
    }
}
