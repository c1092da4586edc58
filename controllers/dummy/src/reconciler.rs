//! Reconciliation logic for the Dummy CRD.
//!
//! One pass reads the Dummy, echoes its spec into status, makes sure the
//! owned nginx Pod exists, tracks the Pod's lifecycle in `status.podStatus`
//! and manages the cleanup finalizer. Every write is skipped when the stored
//! state already matches, so a pass over a converged Dummy performs no writes.
//!
//! Failures are returned, never swallowed: the caller requeues with backoff.
//! A failing pass additionally records a `Degraded` condition on the Dummy.

use crate::backoff::BackoffLedger;
use crate::error::{ReconcileError, Step};
use crate::finalizer::{self, DUMMY_FINALIZER};
use crate::pod_builder;
use crds::{
    CONDITION_DEGRADED, Condition, ConditionStatus, Dummy, PodStatus, find_condition,
    set_condition,
};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use kube_store::{ObjectKey, ObjectStore, StoreError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Converged; wait for the next change
    Done,
    /// Check again after the delay (e.g. Pod not running yet)
    Requeue(Duration),
}

/// Tunables of the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub readiness_poll_interval: Duration,
    pub max_conflict_retries: u32,
    pub backoff_min_minutes: u64,
    pub backoff_max_minutes: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            readiness_poll_interval: Duration::from_secs(10),
            max_conflict_retries: 3,
            backoff_min_minutes: 1,
            backoff_max_minutes: 10,
        }
    }
}

/// What the pass found out about the owned Pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PodObservation {
    Running,
    NotReady,
    Absent,
}

/// Runs a store call unless the pass is cancelled first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<Result<T, StoreError>, ReconcileError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ReconcileError::Cancelled),
        result = call => Ok(result),
    }
}

fn at(step: Step) -> impl Fn(StoreError) -> ReconcileError {
    move |source| ReconcileError::store(step, source)
}

/// Reconciles Dummy resources.
pub struct Reconciler {
    store: Box<dyn ObjectStore>,
    config: ReconcilerConfig,
    backoff: BackoffLedger,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(store: Box<dyn ObjectStore>, config: ReconcilerConfig) -> Self {
        let backoff = BackoffLedger::new(config.backoff_min_minutes, config.backoff_max_minutes);
        Self {
            store,
            config,
            backoff,
        }
    }

    /// Reconciles the Dummy identified by `key`.
    ///
    /// A conflicting write restarts the pass from a fresh read, up to
    /// `max_conflict_retries` times. Any other failure ends the pass.
    ///
    /// # Errors
    ///
    /// Returns the first store failure that could not be resolved, or
    /// `ReconcileError::Cancelled` if `cancel` fired mid-pass.
    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ReconcileError> {
        let mut attempt: u32 = 0;
        let result = loop {
            match self.reconcile_pass(key, cancel).await {
                Err(ReconcileError::Store {
                    step,
                    source: source @ StoreError::Conflict(_),
                }) => {
                    attempt = attempt.saturating_add(1);
                    if attempt > self.config.max_conflict_retries {
                        break Err(ReconcileError::ConflictRetriesExhausted {
                            step,
                            attempts: attempt,
                            source,
                        });
                    }
                    debug!(
                        "Dummy {}: {} conflicted ({}), retrying from a fresh read (attempt {})",
                        key, step, source, attempt
                    );
                }
                other => break other,
            }
        };

        if let Err(err) = &result {
            if !err.is_cancelled() {
                self.record_degraded(key, err, cancel).await;
            }
        }
        result
    }

    /// Next requeue delay after a failed pass, with the consecutive error count
    pub fn next_backoff(&self, key: &ObjectKey) -> (Duration, u32) {
        self.backoff.next_backoff(&key.to_string())
    }

    /// Clears the failure history after a successful pass
    pub fn reset_backoff(&self, key: &ObjectKey) {
        self.backoff.reset(&key.to_string());
    }

    async fn reconcile_pass(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ReconcileError> {
        let mut dummy =
            match cancellable(cancel, self.store.get_dummy(&key.namespace, &key.name)).await? {
                Ok(dummy) => dummy,
                Err(StoreError::NotFound(_)) => {
                    debug!("Dummy {} not found, nothing to do", key);
                    return Ok(Outcome::Done);
                }
                Err(e) => return Err(ReconcileError::store(Step::GetDummy, e)),
            };
        debug!(
            "Reconciling Dummy {} (message: {:?}, podStatus: {})",
            key,
            dummy.spec.message,
            dummy.pod_status()
        );

        if dummy.spec_echo() != dummy.spec.message {
            dummy.status_mut().spec_echo = dummy.spec.message.clone();
            dummy = cancellable(cancel, self.store.update_dummy_status(&dummy))
                .await?
                .map_err(at(Step::UpdateStatus))?;
            info!("Dummy {} specEcho updated to {:?}", key, dummy.spec_echo());
        }

        if dummy.pod_status() == PodStatus::Unknown {
            dummy = self
                .advance_pod_status(dummy, PodStatus::Pending, key, cancel)
                .await?;
        }

        let desired = pod_builder::build_pod(&dummy);
        let observation = self.ensure_pod(&dummy, &desired, key, cancel).await?;

        if observation == PodObservation::Running {
            dummy = self
                .advance_pod_status(dummy, PodStatus::Running, key, cancel)
                .await?;
        }

        let Some(dummy) = self.manage_finalizer(dummy, key, cancel).await? else {
            return Ok(Outcome::Done);
        };

        self.clear_degraded(dummy, key, cancel).await?;

        if observation == PodObservation::NotReady {
            debug!(
                "Dummy {}: Pod not running yet, checking again in {:?}",
                key, self.config.readiness_poll_interval
            );
            return Ok(Outcome::Requeue(self.config.readiness_poll_interval));
        }
        Ok(Outcome::Done)
    }

    /// Moves `status.podStatus` forward to `next`; never backwards, no write if unchanged.
    async fn advance_pod_status(
        &self,
        mut dummy: Dummy,
        next: PodStatus,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Dummy, ReconcileError> {
        let current = dummy.pod_status();
        let advanced = current.advance(next);
        if advanced == current {
            return Ok(dummy);
        }
        dummy.status_mut().pod_status = advanced;
        let dummy = cancellable(cancel, self.store.update_dummy_status(&dummy))
            .await?
            .map_err(at(Step::UpdateStatus))?;
        info!("Dummy {} podStatus {} -> {}", key, current, advanced);
        Ok(dummy)
    }

    /// Looks up the owned Pod and creates it when absent.
    ///
    /// No Pod is created for a Dummy that is being deleted.
    async fn ensure_pod(
        &self,
        dummy: &Dummy,
        desired: &Pod,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<PodObservation, ReconcileError> {
        let pod_name = desired.name_any();
        match cancellable(cancel, self.store.get_pod(&key.namespace, &pod_name)).await? {
            Ok(pod) => {
                debug!("Pod {}/{} already exists", key.namespace, pod_name);
                Ok(observe(&pod))
            }
            Err(StoreError::NotFound(_)) if dummy.is_deleting() => {
                debug!(
                    "Dummy {} is being deleted, not creating Pod {}",
                    key, pod_name
                );
                Ok(PodObservation::Absent)
            }
            Err(StoreError::NotFound(_)) => {
                match cancellable(cancel, self.store.create_pod(desired)).await? {
                    Ok(created) => {
                        info!("Created Pod {}/{} for Dummy {}", key.namespace, pod_name, key);
                        Ok(observe(&created))
                    }
                    Err(StoreError::AlreadyExists(_)) => {
                        debug!(
                            "Pod {}/{} appeared concurrently, treating as present",
                            key.namespace, pod_name
                        );
                        Ok(PodObservation::NotReady)
                    }
                    Err(e) => Err(ReconcileError::store(Step::CreatePod, e)),
                }
            }
            Err(e) => Err(ReconcileError::store(Step::GetPod, e)),
        }
    }

    /// Adds the cleanup finalizer to live Dummies; on deletion removes the
    /// Pod and then the finalizer.
    ///
    /// Returns `None` when the finalizer was released, since the Dummy may
    /// already be gone from the store.
    async fn manage_finalizer(
        &self,
        mut dummy: Dummy,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Option<Dummy>, ReconcileError> {
        let has_finalizer = finalizer::contains(dummy.finalizers(), DUMMY_FINALIZER);

        if !dummy.is_deleting() {
            if has_finalizer {
                return Ok(Some(dummy));
            }
            dummy.metadata.finalizers = Some(finalizer::with(dummy.finalizers(), DUMMY_FINALIZER));
            let dummy = cancellable(cancel, self.store.update_dummy(&dummy))
                .await?
                .map_err(at(Step::UpdateFinalizers))?;
            info!("Added finalizer {} to Dummy {}", DUMMY_FINALIZER, key);
            return Ok(Some(dummy));
        }

        if !has_finalizer {
            debug!("Dummy {} is being deleted and holds no finalizer of ours", key);
            return Ok(Some(dummy));
        }

        let pod_name = pod_builder::pod_name(&key.name);
        match cancellable(cancel, self.store.delete_pod(&key.namespace, &pod_name)).await? {
            Ok(()) => info!("Deleted Pod {}/{} of Dummy {}", key.namespace, pod_name, key),
            Err(StoreError::NotFound(_)) => {
                debug!("Pod {}/{} already gone", key.namespace, pod_name);
            }
            Err(e) => return Err(ReconcileError::store(Step::DeletePod, e)),
        }

        dummy.metadata.finalizers = Some(finalizer::without(dummy.finalizers(), DUMMY_FINALIZER));
        cancellable(cancel, self.store.update_dummy(&dummy))
            .await?
            .map_err(at(Step::UpdateFinalizers))?;
        info!("Removed finalizer {} from Dummy {}", DUMMY_FINALIZER, key);
        Ok(None)
    }

    /// Flips a `Degraded=True` condition back to False once a pass succeeds.
    async fn clear_degraded(
        &self,
        mut dummy: Dummy,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let degraded = dummy
            .status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, CONDITION_DEGRADED))
            .is_some_and(|c| c.status == ConditionStatus::True);
        if !degraded {
            return Ok(());
        }

        set_condition(
            &mut dummy.status_mut().conditions,
            Condition::new(
                CONDITION_DEGRADED,
                ConditionStatus::False,
                "Reconciled",
                "Reconciliation succeeded",
            ),
        );
        cancellable(cancel, self.store.update_dummy_status(&dummy))
            .await?
            .map_err(at(Step::UpdateStatus))?;
        info!("Dummy {} recovered, Degraded condition cleared", key);
        Ok(())
    }

    /// Best-effort `Degraded=True` condition describing `err`.
    ///
    /// The message only names the step and error kind, so repeated failures of
    /// the same step leave the condition untouched.
    async fn record_degraded(&self, key: &ObjectKey, err: &ReconcileError, cancel: &CancellationToken) {
        let mut dummy =
            match cancellable(cancel, self.store.get_dummy(&key.namespace, &key.name)).await {
                Ok(Ok(dummy)) => dummy,
                Ok(Err(StoreError::NotFound(_))) | Err(_) => return,
                Ok(Err(e)) => {
                    warn!("Could not read Dummy {} to record failure: {}", key, e);
                    return;
                }
            };

        let changed = set_condition(
            &mut dummy.status_mut().conditions,
            Condition::new(
                CONDITION_DEGRADED,
                ConditionStatus::True,
                err.reason(),
                format!("{} failed with a {} error", err.reason(), err.kind()),
            ),
        );
        if !changed {
            return;
        }

        match cancellable(cancel, self.store.update_dummy_status(&dummy)).await {
            Ok(Ok(_)) => warn!("Dummy {} marked Degraded: {}", key, err),
            Ok(Err(e)) => warn!("Could not record Degraded condition on Dummy {}: {}", key, e),
            Err(_) => {}
        }
    }
}

fn observe(pod: &Pod) -> PodObservation {
    if pod_builder::is_running(pod) {
        PodObservation::Running
    } else {
        PodObservation::NotReady
    }
}
