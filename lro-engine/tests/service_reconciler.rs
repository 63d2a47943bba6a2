//! Integration tests for multi-spec service reconcilers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{DiskSpec, FakeClient, Step};
use lro_engine::status::Reason;
use lro_engine::{
    AsyncService, Conditions, EngineConfig, ErrorKind, MemoryStore, ProviderError,
    ReconcileContext, Reconciler, Requeue, Response, ServiceReconciler,
};

fn reconciler(
    client: &FakeClient,
    specs: Vec<DiskSpec>,
) -> (ServiceReconciler<DiskSpec, FakeClient, FakeClient>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(AsyncService::new(
        client.clone(),
        client.clone(),
        store.clone(),
        EngineConfig::default(),
    ));
    (ServiceReconciler::new("disks", specs, service), store)
}

#[tokio::test]
async fn all_specs_converge() {
    let client = FakeClient::new();
    let (reconciler, store) = reconciler(
        &client,
        vec![DiskSpec::new("disk-1", 10), DiskSpec::new("disk-2", 20)],
    );

    reconciler
        .reconcile(&ReconcileContext::background())
        .await
        .unwrap();

    assert_eq!(reconciler.name(), "disks");
    assert_eq!(client.create_calls().len(), 2);
    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn not_done_spec_does_not_stop_the_rest() {
    let client = FakeClient::new();
    client.script_create([Step::Stall(Some("op-1".into())), Step::Complete]);
    let (reconciler, store) = reconciler(
        &client,
        vec![DiskSpec::new("disk-1", 10), DiskSpec::new("disk-2", 20)],
    );

    let result = reconciler.reconcile(&ReconcileContext::background()).await;
    let err = result.as_ref().unwrap_err();

    assert!(err.is_operation_not_done());
    assert_eq!(client.create_calls().len(), 2);
    assert_eq!(store.len().await, 1);
    assert_eq!(
        Requeue::from_result(&result),
        Requeue::After(Duration::from_secs(15))
    );

    let mut conditions = Conditions::new();
    conditions.update_put_status("DisksReady", reconciler.name(), result.as_ref().err());
    assert_eq!(
        conditions.get("DisksReady").unwrap().reason,
        Some(Reason::Creating)
    );
}

#[tokio::test(start_paused = true)]
async fn failure_outranks_not_done() {
    let client = FakeClient::new();
    client.script_create([
        Step::Stall(Some("op-1".into())),
        Step::Fail(ProviderError::Response(Response::new(422, "bad sku"))),
    ]);
    let (reconciler, _store) = reconciler(
        &client,
        vec![DiskSpec::new("disk-1", 10), DiskSpec::new("disk-2", 20)],
    );

    let err = reconciler
        .reconcile(&ReconcileContext::background())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Terminal);
    assert!(err.to_string().contains("rg/disk-2"));
}

#[tokio::test(start_paused = true)]
async fn service_timeout_bounds_the_pass() {
    let client = FakeClient::new();
    client.script_create([Step::Stall(Some("op-1".into()))]);
    let (reconciler, store) = reconciler(&client, vec![DiskSpec::new("disk-1", 10)]);
    let reconciler = reconciler.with_timeout(Duration::from_secs(3));

    let started = tokio::time::Instant::now();
    let err = reconciler
        .reconcile(&ReconcileContext::background())
        .await
        .unwrap_err();

    assert!(err.is_operation_not_done());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn finalize_deletes_everything() {
    let client = FakeClient::new();
    let (reconciler, store) = reconciler(
        &client,
        vec![DiskSpec::new("disk-1", 10), DiskSpec::new("disk-2", 20)],
    );

    reconciler
        .reconcile(&ReconcileContext::background())
        .await
        .unwrap();
    let result = reconciler.finalize(&ReconcileContext::background()).await;

    assert!(result.is_ok());
    assert_eq!(client.delete_calls().len(), 2);
    assert!(store.is_empty().await);

    let mut conditions = Conditions::new();
    conditions.update_delete_status("DisksReady", reconciler.name(), result.as_ref().err());
    assert_eq!(
        conditions.get("DisksReady").unwrap().reason,
        Some(Reason::Deleted)
    );
}
