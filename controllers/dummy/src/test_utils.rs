//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and wiring a
//! `Reconciler` to an in-memory store.

use crate::reconciler::{Reconciler, ReconcilerConfig};
use crds::{Dummy, DummySpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube_store::MockObjectStore;
use std::time::Duration;

/// Helper to create a test Dummy as the API server would return it
pub fn create_test_dummy(name: &str, namespace: &str, message: &str) -> Dummy {
    Dummy {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{namespace}-{name}")),
            ..Default::default()
        },
        spec: DummySpec {
            message: message.to_string(),
        },
        status: None,
    }
}

/// Config with a short readiness poll, otherwise defaults
pub fn test_config() -> ReconcilerConfig {
    ReconcilerConfig {
        readiness_poll_interval: Duration::from_secs(2),
        ..ReconcilerConfig::default()
    }
}

/// Reconciler backed by `store`; the returned clone shares its state
pub fn test_reconciler(store: MockObjectStore) -> (Reconciler, MockObjectStore) {
    let reconciler = Reconciler::new(Box::new(store.clone()), test_config());
    (reconciler, store)
}
