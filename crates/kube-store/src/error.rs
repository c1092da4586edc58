//! Object store errors
//!
//! Every Kubernetes API failure is classified into one of five kinds so the
//! reconciler can decide between "expected", "retry from a fresh read",
//! "back off and retry" and "report, don't retry".

use thiserror::Error;

/// Errors that can occur when reading or writing objects
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create collided with an existing object
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency collision (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network, availability or throttling failure
    #[error("Transient store error: {0}")]
    Transient(String),

    /// Malformed object rejected by the API server or undecodable response
    #[error("Schema error: {0}")]
    Schema(String),
}

impl StoreError {
    /// True for errors that will not go away by retrying the same request
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Short machine-readable name, used in metrics labels and conditions
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::Conflict(_) => "Conflict",
            Self::Transient(_) => "Transient",
            Self::Schema(_) => "Schema",
        }
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(response) => match response.code {
                404 => Self::NotFound(response.message.clone()),
                409 if response.reason == "AlreadyExists" => {
                    Self::AlreadyExists(response.message.clone())
                }
                409 => Self::Conflict(response.message.clone()),
                400 | 422 => Self::Schema(response.message.clone()),
                _ => Self::Transient(err.to_string()),
            },
            kube::Error::SerdeError(e) => Self::Schema(e.to_string()),
            _ => Self::Transient(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Schema(err.to_string())
    }
}
