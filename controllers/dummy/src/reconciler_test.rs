//! Unit tests for the Dummy reconciler against the in-memory store

use crate::error::{ReconcileError, Step};
use crate::finalizer::DUMMY_FINALIZER;
use crate::pod_builder::{CONTAINER_IMAGE, pod_name};
use crate::reconciler::{Outcome, Reconciler};
use crate::test_utils::{create_test_dummy, test_config, test_reconciler};
use crds::{CONDITION_DEGRADED, ConditionStatus, PodStatus, find_condition};
use kube::ResourceExt;
use crds::Dummy;
use k8s_openapi::api::core::v1::Pod;
use kube_store::{MockObjectStore, ObjectKey, ObjectStore, StoreError, StoreOp};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn key() -> ObjectKey {
    ObjectKey::new("ns", "w1")
}

/// Store whose Pods start running as soon as they are created
fn running_store() -> MockObjectStore {
    MockObjectStore::new().with_pod_phase_on_create("Running")
}

fn ops(store: &MockObjectStore) -> Vec<StoreOp> {
    store.writes().into_iter().map(|w| w.op).collect()
}

fn degraded_status(store: &MockObjectStore) -> Option<ConditionStatus> {
    let dummy = store.dummy("ns", "w1")?;
    let status = dummy.status?;
    find_condition(&status.conditions, CONDITION_DEGRADED).map(|c| c.status)
}

#[tokio::test]
async fn test_create_converges_in_one_pass() {
    let (reconciler, store) = test_reconciler(running_store());
    store.create_dummy(&create_test_dummy("w1", "ns", "hello")).await.unwrap();

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);

    let pod = store.pod("ns", "w1nginx-pod").expect("Pod should be created");
    assert_eq!(pod.labels().get("app").map(String::as_str), Some("w1"));
    let image = pod
        .spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .and_then(|c| c.image.clone());
    assert_eq!(image.as_deref(), Some(CONTAINER_IMAGE));

    let dummy = store.dummy("ns", "w1").unwrap();
    assert_eq!(dummy.spec_echo(), "hello");
    assert_eq!(dummy.pod_status(), PodStatus::Running);
    assert!(dummy.finalizers().iter().any(|f| f == DUMMY_FINALIZER));
}

#[tokio::test]
async fn test_converged_pass_makes_no_writes() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    store.clear_writes();

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());
}

#[tokio::test]
async fn test_spec_change_only_rewrites_echo() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    store.clear_writes();

    store.modify_dummy("ns", "w1", |d| d.spec.message = "bye".to_string());
    reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();

    assert_eq!(ops(&store), vec![StoreOp::UpdateDummyStatus]);
    let dummy = store.dummy("ns", "w1").unwrap();
    assert_eq!(dummy.spec_echo(), "bye");
    assert_eq!(dummy.pod_status(), PodStatus::Running);
    assert_eq!(store.pod_count("ns"), 1);
}

#[tokio::test]
async fn test_deletion_removes_pod_then_finalizer() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();

    store.delete_dummy("ns", "w1").await.unwrap();
    assert!(store.dummy("ns", "w1").is_some_and(|d| d.is_deleting()));
    store.clear_writes();

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(store.pod("ns", "w1nginx-pod").is_none());
    assert!(store.dummy("ns", "w1").is_none(), "Dummy should be gone once the finalizer is released");
    assert_eq!(ops(&store), vec![StoreOp::DeletePod, StoreOp::UpdateDummy]);
}

#[tokio::test]
async fn test_no_pod_created_while_deleting() {
    let (reconciler, store) = test_reconciler(running_store());
    let mut dummy = create_test_dummy("w1", "ns", "hello");
    dummy.metadata.finalizers = Some(vec![DUMMY_FINALIZER.to_string()]);
    store.insert_dummy(dummy);

    store.delete_dummy("ns", "w1").await.unwrap();
    store.clear_writes();

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(store.pod_count("ns"), 0);
    assert!(!ops(&store).contains(&StoreOp::CreatePod));
    assert!(store.dummy("ns", "w1").is_none());
}

#[tokio::test]
async fn test_foreign_finalizer_is_left_alone() {
    let (reconciler, store) = test_reconciler(running_store());
    let mut dummy = create_test_dummy("w1", "ns", "hello");
    dummy.metadata.finalizers = Some(vec!["other.example.com/keep".to_string()]);
    store.insert_dummy(dummy);

    store.delete_dummy("ns", "w1").await.unwrap();

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(store.pod_count("ns"), 0);
    let dummy = store.dummy("ns", "w1").expect("foreign finalizer keeps the Dummy");
    assert_eq!(dummy.finalizers(), ["other.example.com/keep".to_string()]);
}

#[tokio::test]
async fn test_absent_dummy_is_a_noop() {
    let (reconciler, store) = test_reconciler(running_store());

    let outcome = reconciler
        .reconcile(&ObjectKey::new("ns", "never-created"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_pending_pod_requeues_until_running() {
    let (reconciler, store) = test_reconciler(MockObjectStore::new());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Requeue(Duration::from_secs(2)));
    assert_eq!(store.dummy("ns", "w1").unwrap().pod_status(), PodStatus::Pending);

    store.set_pod_phase("ns", &pod_name("w1"), "Pending");
    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, Outcome::Requeue(_)));

    store.set_pod_phase("ns", &pod_name("w1"), "Running");
    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(store.dummy("ns", "w1").unwrap().pod_status(), PodStatus::Running);
}

#[tokio::test]
async fn test_pod_status_never_moves_backwards() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();

    store.set_pod_phase("ns", &pod_name("w1"), "Failed");
    reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(store.dummy("ns", "w1").unwrap().pod_status(), PodStatus::Running);
}

#[tokio::test]
async fn test_concurrently_created_pod_counts_as_present() {
    let (reconciler, store) = test_reconciler(MockObjectStore::new());
    let dummy = create_test_dummy("w1", "ns", "hello");
    store.insert_pod(crate::pod_builder::build_pod(&dummy));
    store.insert_dummy(dummy);
    store.fail_next(StoreOp::GetPod, StoreError::NotFound("Pod ns/w1nginx-pod".into()));

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, Outcome::Requeue(_)));
    assert_eq!(store.pod_count("ns"), 1);
    assert!(!ops(&store).contains(&StoreOp::CreatePod));
}

#[tokio::test]
async fn test_conflict_restarts_from_fresh_read() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    store.fail_next(StoreOp::UpdateDummyStatus, StoreError::Conflict("stale".into()));

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    let dummy = store.dummy("ns", "w1").unwrap();
    assert_eq!(dummy.spec_echo(), "hello");
    assert_eq!(dummy.pod_status(), PodStatus::Running);
}

#[tokio::test]
async fn test_conflict_retries_are_bounded() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    for _ in 0..4 {
        store.fail_next(StoreOp::UpdateDummyStatus, StoreError::Conflict("stale".into()));
    }

    let err = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::ConflictRetriesExhausted {
            step: Step::UpdateStatus,
            attempts: 4,
            ..
        }
    ));
    assert!(!err.is_permanent());
    assert_eq!(degraded_status(&store), Some(ConditionStatus::True));
}

#[tokio::test]
async fn test_transient_error_propagates_and_marks_degraded() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    store.fail_next(StoreOp::CreatePod, StoreError::Transient("connection reset".into()));

    let err = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Store {
            step: Step::CreatePod,
            source: StoreError::Transient(_)
        }
    ));
    assert_eq!(store.pod_count("ns"), 0);

    let dummy = store.dummy("ns", "w1").unwrap();
    let status = dummy.status.unwrap();
    let condition = find_condition(&status.conditions, CONDITION_DEGRADED).unwrap();
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.reason, "CreatePod");

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(degraded_status(&store), Some(ConditionStatus::False));
    assert_eq!(store.pod_count("ns"), 1);
}

#[tokio::test]
async fn test_schema_error_is_permanent() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    store.fail_next(StoreOp::GetPod, StoreError::Schema("invalid Pod".into()));

    let err = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(err.reason(), "GetPod");
    assert_eq!(degraded_status(&store), Some(ConditionStatus::True));
}

#[tokio::test]
async fn test_cancelled_pass_writes_nothing() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = reconciler.reconcile(&key(), &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(store.writes().is_empty());
    assert_eq!(store.pod_count("ns"), 0);
}

/// Creates `w1/ns`, converges it, then marks it for deletion
async fn deleting_dummy(store: &MockObjectStore, reconciler: &Reconciler) {
    store.create_dummy(&create_test_dummy("w1", "ns", "hello")).await.unwrap();
    reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    store.delete_dummy("ns", "w1").await.unwrap();
    store.clear_writes();
}

#[tokio::test]
async fn test_pod_delete_failure_keeps_finalizer() {
    let (reconciler, store) = test_reconciler(running_store());
    deleting_dummy(&store, &reconciler).await;
    store.fail_next(StoreOp::DeletePod, StoreError::Transient("connection reset".into()));

    let err = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Store {
            step: Step::DeletePod,
            source: StoreError::Transient(_)
        }
    ));
    let dummy = store.dummy("ns", "w1").expect("Dummy must survive a failed cleanup");
    assert!(dummy.finalizers().iter().any(|f| f == DUMMY_FINALIZER));
    assert!(store.pod("ns", "w1nginx-pod").is_some());
    assert!(!ops(&store).contains(&StoreOp::UpdateDummy));

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(store.pod("ns", "w1nginx-pod").is_none());
    assert!(store.dummy("ns", "w1").is_none());
}

#[tokio::test]
async fn test_finalizer_release_failure_keeps_dummy() {
    let (reconciler, store) = test_reconciler(running_store());
    deleting_dummy(&store, &reconciler).await;
    store.fail_next(StoreOp::UpdateDummy, StoreError::Transient("connection reset".into()));

    let err = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Store {
            step: Step::UpdateFinalizers,
            source: StoreError::Transient(_)
        }
    ));
    let dummy = store.dummy("ns", "w1").expect("Dummy must survive a failed finalizer release");
    assert!(dummy.finalizers().iter().any(|f| f == DUMMY_FINALIZER));
    assert!(store.pod("ns", "w1nginx-pod").is_none());

    let outcome = reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(store.dummy("ns", "w1").is_none());
}

#[tokio::test]
async fn test_repeated_failure_does_not_rewrite_degraded() {
    let (reconciler, store) = test_reconciler(running_store());
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    store.fail_next(StoreOp::CreatePod, StoreError::Transient("connection reset by peer".into()));
    reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap_err();

    let condition = |store: &MockObjectStore| {
        let status = store.dummy("ns", "w1").and_then(|d| d.status).unwrap();
        find_condition(&status.conditions, CONDITION_DEGRADED).cloned().unwrap()
    };
    let first = condition(&store);
    assert_eq!(first.message, "CreatePod failed with a Transient error");
    store.clear_writes();

    store.fail_next(StoreOp::CreatePod, StoreError::Transient("i/o timeout".into()));
    reconciler.reconcile(&key(), &CancellationToken::new()).await.unwrap_err();
    assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());
    assert_eq!(condition(&store), first);
}

/// Store that cancels the pass while it is looking up the Pod
struct CancelOnGetPod {
    inner: MockObjectStore,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl ObjectStore for CancelOnGetPod {
    async fn get_dummy(&self, namespace: &str, name: &str) -> Result<Dummy, StoreError> {
        self.inner.get_dummy(namespace, name).await
    }

    async fn create_dummy(&self, dummy: &Dummy) -> Result<Dummy, StoreError> {
        self.inner.create_dummy(dummy).await
    }

    async fn update_dummy(&self, dummy: &Dummy) -> Result<Dummy, StoreError> {
        self.inner.update_dummy(dummy).await
    }

    async fn update_dummy_status(&self, dummy: &Dummy) -> Result<Dummy, StoreError> {
        self.inner.update_dummy_status(dummy).await
    }

    async fn delete_dummy(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.inner.delete_dummy(namespace, name).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, StoreError> {
        self.cancel.cancel();
        self.inner.get_pod(namespace, name).await
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, StoreError> {
        self.inner.create_pod(pod).await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.inner.delete_pod(namespace, name).await
    }
}

#[tokio::test]
async fn test_cancellation_mid_pass_stops_before_next_write() {
    let store = running_store();
    store.insert_dummy(create_test_dummy("w1", "ns", "hello"));
    let cancel = CancellationToken::new();
    let reconciler = Reconciler::new(
        Box::new(CancelOnGetPod {
            inner: store.clone(),
            cancel: cancel.clone(),
        }),
        test_config(),
    );

    let err = reconciler.reconcile(&key(), &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(
        ops(&store),
        vec![StoreOp::UpdateDummyStatus, StoreOp::UpdateDummyStatus],
        "only the writes before the Pod lookup may happen"
    );
    assert_eq!(store.pod_count("ns"), 0);
    assert_eq!(degraded_status(&store), None);
}
