//! Kubernetes resource watcher.
//!
//! Drives the Reconciler from a kube_runtime::Controller watching Dummies and
//! the Pods they own. The Controller handles reconnection, per-object
//! serialization, debouncing and bounded concurrency; this module maps pass
//! results to requeue actions.

use crate::error::{ControllerError, ReconcileError};
use crate::metrics::Metrics;
use crate::pod_builder::APP_LABEL;
use crate::reconciler::{Outcome, Reconciler};
use crds::Dummy;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as RuntimeConfig},
};
use kube_store::ObjectKey;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Delay before retrying a pass that was cancelled mid-flight
pub const CANCELLED_REQUEUE: Duration = Duration::from_secs(1);

/// Shared state handed to every reconcile invocation
pub struct Context {
    pub reconciler: Arc<Reconciler>,
    pub metrics: Arc<Metrics>,
    pub shutdown: CancellationToken,
}

/// Maps a successful pass to the Controller's next action
pub fn into_action(outcome: Outcome) -> Action {
    match outcome {
        Outcome::Done => Action::await_change(),
        Outcome::Requeue(delay) => Action::requeue(delay),
    }
}

fn object_key(dummy: &Dummy) -> ObjectKey {
    ObjectKey::new(
        dummy.namespace().unwrap_or_else(|| "default".to_string()),
        dummy.name_any(),
    )
}

async fn reconcile_dummy(dummy: Arc<Dummy>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = object_key(&dummy);
    debug!("Reconciling Dummy {}", key);

    let started = Instant::now();
    let result = ctx.reconciler.reconcile(&key, &ctx.shutdown.child_token()).await;
    ctx.metrics.observe(&result, started.elapsed());

    let outcome = result?;
    ctx.reconciler.reset_backoff(&key);
    Ok(into_action(outcome))
}

fn error_policy(dummy: Arc<Dummy>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    let key = object_key(&dummy);

    if error.is_cancelled() {
        debug!("Reconciliation of Dummy {} cancelled, retrying shortly", key);
        return Action::requeue(CANCELLED_REQUEUE);
    }
    if error.is_permanent() {
        error!(
            "Reconciliation of Dummy {} failed permanently: {}. Waiting for the object to change",
            key, error
        );
        return Action::await_change();
    }

    let (delay, error_count) = ctx.reconciler.next_backoff(&key);
    warn!(
        "Reconciliation of Dummy {} failed (error #{}): {}. Retrying in {}s",
        key,
        error_count,
        error,
        delay.as_secs()
    );
    Action::requeue(delay)
}

/// Watches Dummies and their Pods.
pub struct Watcher {
    client: Client,
    namespace: Option<String>,
    runtime_config: RuntimeConfig,
    context: Arc<Context>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        client: Client,
        namespace: Option<String>,
        debounce: Duration,
        concurrency: u16,
        context: Arc<Context>,
    ) -> Self {
        Self {
            client,
            namespace,
            runtime_config: RuntimeConfig::default().debounce(debounce).concurrency(concurrency),
            context,
        }
    }

    fn apis(&self) -> (Api<Dummy>, Api<Pod>) {
        match &self.namespace {
            Some(ns) => (
                Api::namespaced(self.client.clone(), ns),
                Api::namespaced(self.client.clone(), ns),
            ),
            None => (Api::all(self.client.clone()), Api::all(self.client.clone())),
        }
    }

    /// Runs until the shutdown token is cancelled.
    ///
    /// Pod events are mapped back to the owning Dummy through the controller
    /// owner reference, so a deleted or changed Pod triggers a pass.
    pub async fn watch_dummies(&self) -> Result<(), ControllerError> {
        info!("Starting Dummy watcher");
        let (dummies, pods) = self.apis();
        let shutdown = self.context.shutdown.clone();

        self.context.metrics.set_ready();
        Controller::new(dummies, watcher::Config::default())
            .owns(pods, watcher::Config::default().labels(APP_LABEL))
            .with_config(self.runtime_config.clone())
            .graceful_shutdown_on(async move { shutdown.cancelled().await })
            .run(reconcile_dummy, error_policy, self.context.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!("Reconciled Dummy {}: {:?}", obj, action),
                    Err(e) => warn!("Dummy controller error: {}", e),
                }
            })
            .await;

        info!("Dummy watcher stopped");
        Ok(())
    }
}
