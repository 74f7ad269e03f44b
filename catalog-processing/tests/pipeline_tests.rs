mod common;

use catalog_processing::{
    DeadLetterQueue, Pipeline, PipelineError, PipelineState, Plugin, ShutdownOutcome, Submission,
    WriteKind,
};
use catalog_store::{MemoryStore, StoreError, StoreGateway, StoreOperation, Subject};
use catalog_types::{OperationKind, ProcessBatch, ProcessItem, Record, RecordId};
use common::*;
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

async fn seeded_store(ids: &[&str]) -> (Arc<MemoryStore>, Vec<Record>) {
    let store = Arc::new(MemoryStore::new("local"));
    let mut records = Vec::new();
    for id in ids {
        let record = Record::new(*id).with_attribute("title", format!("record {id}"));
        store.insert(record.clone()).await;
        records.push(record);
    }
    (store, records)
}

// ── Plugin chain ─────────────────────────────────────────────────

#[tokio::test]
async fn failing_plugin_does_not_block_the_chain() {
    let (store, records) = seeded_store(&["r1"]).await;
    let pipeline = pipeline(
        vec![Tag::new("first", "1"), Arc::new(Failing), Tag::new("third", "3")],
        &store,
    );
    assert_ok!(pipeline.start());

    assert_eq!(
        pipeline.submit(batch(OperationKind::Create, &[&records[0]])),
        Ok(Submission::Queued)
    );
    wait_completed(&pipeline, 1).await;

    let stored = store.record(&RecordId::from("r1")).await.unwrap();
    assert_eq!(stored.get_str("first"), Some("1"));
    assert_eq!(stored.get_str("third"), Some("3"));
    assert!(stored.get("poisoned").is_none());
    assert_eq!(pipeline.stats().plugin_failures, 1);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn panicking_plugin_is_treated_as_failed() {
    let (store, records) = seeded_store(&["r1"]).await;
    let pipeline = pipeline(
        vec![Tag::new("first", "1"), Arc::new(Panicking), Tag::new("third", "3")],
        &store,
    );
    pipeline.start().unwrap();

    pipeline.submit(batch(OperationKind::Create, &[&records[0]])).unwrap();
    wait_completed(&pipeline, 1).await;

    let stored = store.record(&RecordId::from("r1")).await.unwrap();
    assert_eq!(stored.get_str("first"), Some("1"));
    assert_eq!(stored.get_str("third"), Some("3"));
    assert_eq!(pipeline.stats().plugin_failures, 1);
    assert_eq!(pipeline.state(), PipelineState::Running);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn later_plugins_see_earlier_mutations() {
    let (store, records) = seeded_store(&["r1"]).await;
    let observer = Arc::new(Observer::default());
    let pipeline = pipeline(
        vec![Tag::new("stamp", "yes"), observer.clone() as Arc<dyn Plugin>],
        &store,
    );
    pipeline.start().unwrap();

    pipeline.submit(batch(OperationKind::Update, &[&records[0]])).unwrap();
    wait_completed(&pipeline, 1).await;

    let seen = observer.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, OperationKind::Update);
    assert!(seen[0].1.contains(&"stamp".to_string()));
    pipeline.shutdown().await;
}

// ── Persistence ──────────────────────────────────────────────────

#[tokio::test]
async fn unchanged_batches_are_never_written() {
    let (store, records) = seeded_store(&["r1", "r2"]).await;
    let pipeline = pipeline(
        vec![Arc::new(Observer::default()), Arc::new(PassThrough), Arc::new(Failing)],
        &store,
    );
    pipeline.start().unwrap();

    pipeline
        .submit(batch(OperationKind::Create, &[&records[0], &records[1]]))
        .unwrap();
    wait_completed(&pipeline, 1).await;

    assert_eq!(store.write_calls(), 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn metadata_changes_are_written_in_one_call() {
    let (store, records) = seeded_store(&["r1", "r2", "r3"]).await;
    let pipeline = pipeline(vec![Tag::new("indexed", "true")], &store);
    pipeline.start().unwrap();

    pipeline
        .submit(batch(OperationKind::Create, &[&records[0], &records[1], &records[2]]))
        .unwrap();
    wait_completed(&pipeline, 1).await;

    assert_eq!(store.calls(StoreOperation::Update), 1);
    assert_eq!(store.calls(StoreOperation::UpdateContent), 0);
    for record in store.records().await {
        assert_eq!(record.get_str("indexed"), Some("true"));
    }
    pipeline.shutdown().await;
}

#[tokio::test]
async fn content_is_written_before_metadata() {
    let (store, records) = seeded_store(&["with-content", "metadata-only"]).await;
    let (resource, _) = CountingReader::resource(b"original");
    let mut batch = ProcessBatch::new(OperationKind::Create);
    batch.push(ProcessItem::new(records[0].clone()).with_resource(resource));
    let mut metadata_only = ProcessItem::new(records[1].clone());
    metadata_only.set_attribute("checked", true);
    batch.push(metadata_only);

    let pipeline = pipeline(vec![Arc::new(Rewrite(b"rewritten"))], &store);
    pipeline.start().unwrap();
    pipeline.submit(batch).unwrap();
    wait_completed(&pipeline, 1).await;

    let writes: Vec<StoreOperation> = store.write_subjects().await.into_iter().map(|(op, _)| op).collect();
    assert_eq!(writes, vec![StoreOperation::UpdateContent, StoreOperation::Update]);

    let content = store.content(&RecordId::from("with-content")).await.unwrap();
    assert_eq!(content.bytes, b"rewritten".to_vec());
    assert_eq!(content.name, "rewritten.txt");
    assert!(store.content(&RecordId::from("metadata-only")).await.is_none());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn content_failure_skips_metadata_write() {
    let (store, records) = seeded_store(&["a", "b"]).await;
    store
        .fail_next(StoreOperation::UpdateContent, StoreError::Unavailable("disk full".into()))
        .await;
    let dlq = Arc::new(DeadLetterQueue::new(10));

    let (resource, _) = CountingReader::resource(b"bytes");
    let mut batch = ProcessBatch::new(OperationKind::Create);
    batch.push(ProcessItem::new(records[0].clone()).with_resource(resource));
    let mut other = ProcessItem::new(records[1].clone());
    other.set_attribute("checked", true);
    batch.push(other);

    let pipeline = pipeline(vec![Arc::new(Rewrite(b"new"))], &store).with_failure_policy(dlq.clone());
    pipeline.start().unwrap();
    pipeline.submit(batch).unwrap();
    wait_completed(&pipeline, 1).await;

    assert_eq!(store.calls(StoreOperation::Update), 0);
    let failures = dlq.peek(10);
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].kind, WriteKind::Content);
    assert!(failures[0].transient);
    assert_eq!(failures[1].kind, WriteKind::Metadata);
    assert_eq!(failures[1].record_ids(), vec![&RecordId::from("b")]);
    assert_eq!(pipeline.stats().failed_writes, 2);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn refused_records_go_to_the_failure_policy() {
    let (store, records) = seeded_store(&["ok", "bad"]).await;
    store.reject_record("bad", "read only").await;
    let dlq = Arc::new(DeadLetterQueue::new(10));

    let pipeline = pipeline(vec![Tag::new("seen", "y")], &store).with_failure_policy(dlq.clone());
    pipeline.start().unwrap();
    pipeline
        .submit(batch(OperationKind::Update, &[&records[0], &records[1]]))
        .unwrap();
    wait_completed(&pipeline, 1).await;

    let failures = dlq.drain(10);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].record_ids(), vec![&RecordId::from("bad")]);
    assert_eq!(failures[0].operation, OperationKind::Update);
    assert!(failures[0].reason.contains("read only"));
    assert!(dlq.is_empty());
    assert_eq!(
        store.record(&RecordId::from("ok")).await.unwrap().get_str("seen"),
        Some("y")
    );
    pipeline.shutdown().await;
}

#[tokio::test]
async fn writes_run_under_the_service_subject() {
    let (store, records) = seeded_store(&["r1"]).await;
    let pipeline = pipeline(vec![Tag::new("t", "v")], &store);
    pipeline.start().unwrap();

    Subject::user("alice")
        .run_as(async {
            pipeline.submit(batch(OperationKind::Create, &[&records[0]])).unwrap();
        })
        .await;
    wait_completed(&pipeline, 1).await;

    let subjects = store.write_subjects().await;
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].1, Some(Subject::service("indexer")));
    pipeline.shutdown().await;
}

#[tokio::test]
async fn delete_batches_run_plugins_but_are_not_persisted() {
    let (store, records) = seeded_store(&["r1"]).await;
    let observer = Arc::new(Observer::default());
    let pipeline = pipeline(
        vec![Tag::new("tombstone", "yes"), observer.clone() as Arc<dyn Plugin>],
        &store,
    );
    pipeline.start().unwrap();

    pipeline.submit(batch(OperationKind::Delete, &[&records[0]])).unwrap();
    wait_completed(&pipeline, 1).await;

    assert_eq!(observer.seen()[0].0, OperationKind::Delete);
    assert_eq!(store.write_calls(), 0);
    pipeline.shutdown().await;
}

// ── Resources ────────────────────────────────────────────────────

#[tokio::test]
async fn resources_are_closed_exactly_once_when_a_plugin_fails() {
    let (store, records) = seeded_store(&["r1"]).await;
    let (resource, drops) = CountingReader::resource(b"payload");
    let handle = resource.clone();
    let mut batch = ProcessBatch::new(OperationKind::Create);
    batch.push(ProcessItem::new(records[0].clone()).with_resource(resource));

    let pipeline = pipeline(vec![Arc::new(Failing), Arc::new(Panicking)], &store);
    pipeline.start().unwrap();
    pipeline.submit(batch).unwrap();
    wait_completed(&pipeline, 1).await;

    assert!(handle.is_closed().await);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    // Closing again is a no-op.
    assert!(!handle.close().await);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn resources_are_closed_when_a_forced_shutdown_aborts_the_run() {
    let (store, records) = seeded_store(&["r1"]).await;
    let (resource, drops) = CountingReader::resource(b"payload");
    let handle = resource.clone();
    let mut batch = ProcessBatch::new(OperationKind::Create);
    batch.push(ProcessItem::new(records[0].clone()).with_resource(resource));

    let mut cfg = config();
    cfg.graceful_timeout_ms = 50;
    cfg.force_timeout_ms = 50;
    let pipeline = Pipeline::new(cfg, vec![Arc::new(Stuck)], store.clone() as Arc<dyn StoreGateway>);
    pipeline.start().unwrap();
    pipeline.submit(batch).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(pipeline.shutdown().await, ShutdownOutcome::Forced);
    assert!(handle.is_closed().await);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.stats().completed, 0);
}

#[tokio::test]
async fn replaced_resources_are_closed_too() {
    let (store, records) = seeded_store(&["r1"]).await;
    let (original, drops) = CountingReader::resource(b"old");
    let original_handle = original.clone();
    let mut batch = ProcessBatch::new(OperationKind::Create);
    batch.push(ProcessItem::new(records[0].clone()).with_resource(original));

    let pipeline = pipeline(vec![Arc::new(Rewrite(b"new"))], &store);
    pipeline.start().unwrap();
    pipeline.submit(batch).unwrap();
    wait_completed(&pipeline, 1).await;

    assert!(original_handle.is_closed().await);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.content(&RecordId::from("r1")).await.unwrap().bytes,
        b"new".to_vec()
    );
    pipeline.shutdown().await;
}

// ── Submission and lifecycle ─────────────────────────────────────

#[tokio::test]
async fn empty_chain_skips_submissions() {
    let (store, records) = seeded_store(&["r1"]).await;
    let pipeline = pipeline(Vec::new(), &store);
    pipeline.start().unwrap();

    assert_eq!(
        pipeline.submit(batch(OperationKind::Create, &[&records[0]])),
        Ok(Submission::Skipped)
    );
    assert_eq!(pipeline.stats().skipped, 1);
    assert_eq!(pipeline.stats().submitted, 0);
    assert_eq!(store.total_calls(), 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn submit_requires_a_running_pipeline() {
    let (store, records) = seeded_store(&["r1"]).await;
    let pipeline = pipeline(vec![Tag::new("t", "v")], &store);

    assert_eq!(
        pipeline.submit(batch(OperationKind::Create, &[&records[0]])),
        Err(PipelineError::NotRunning)
    );
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let (store, _) = seeded_store(&[]).await;
    let pipeline = pipeline(vec![Tag::new("t", "v")], &store);
    pipeline.start().unwrap();
    assert_eq!(pipeline.start(), Err(PipelineError::AlreadyRunning));
    pipeline.shutdown().await;
}

#[test]
fn start_outside_a_runtime_fails() {
    let store = Arc::new(MemoryStore::new("local"));
    let pipeline = Pipeline::new(config(), vec![Tag::new("t", "v")], store as Arc<dyn StoreGateway>);
    assert_eq!(pipeline.start(), Err(PipelineError::NoRuntime));
}

#[tokio::test]
async fn full_queue_rejects_immediately() {
    let (store, records) = seeded_store(&["r1"]).await;
    let gate = Arc::new(Gate::default());
    let mut cfg = config();
    cfg.pool_size = 1;
    cfg.queue_capacity = 1;
    let pipeline = Pipeline::new(cfg, vec![gate.clone() as Arc<dyn Plugin>], store.clone() as Arc<dyn StoreGateway>);
    pipeline.start().unwrap();

    // The only worker takes the first batch and blocks.
    pipeline.submit(batch(OperationKind::Create, &[&records[0]])).unwrap();
    gate.started.notified().await;

    // One batch fits in the queue, the next does not.
    assert_eq!(
        pipeline.submit(batch(OperationKind::Create, &[&records[0]])),
        Ok(Submission::Queued)
    );
    let rejected = pipeline.submit(batch(OperationKind::Create, &[&records[0]]));
    assert_eq!(assert_err!(rejected), PipelineError::QueueFull { capacity: 1 });
    assert_eq!(pipeline.stats().rejected, 1);

    gate.release.notify_one();
    gate.started.notified().await;
    gate.release.notify_one();
    wait_completed(&pipeline, 2).await;
    assert_eq!(pipeline.shutdown().await, ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn graceful_shutdown_drains_queued_batches() {
    let (store, records) = seeded_store(&["r1"]).await;
    let mut cfg = config();
    cfg.pool_size = 1;
    let pipeline = Pipeline::new(
        cfg,
        vec![Arc::new(Slow(Duration::from_millis(10))), Tag::new("done", "y")],
        store.clone() as Arc<dyn StoreGateway>,
    );
    pipeline.start().unwrap();

    for _ in 0..5 {
        pipeline.submit(batch(OperationKind::Create, &[&records[0]])).unwrap();
    }
    assert_eq!(pipeline.shutdown().await, ShutdownOutcome::Graceful);

    assert_eq!(pipeline.stats().completed, 5);
    assert_eq!(store.calls(StoreOperation::Update), 5);
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(
        pipeline.submit(batch(OperationKind::Create, &[&records[0]])),
        Err(PipelineError::NotRunning)
    );
}

#[tokio::test]
async fn shutdown_is_bounded_with_a_stuck_worker() {
    let (store, records) = seeded_store(&["r1"]).await;
    let mut cfg = config();
    cfg.graceful_timeout_ms = 100;
    cfg.force_timeout_ms = 100;
    let pipeline = Pipeline::new(cfg, vec![Arc::new(Stuck)], store.clone() as Arc<dyn StoreGateway>);
    pipeline.start().unwrap();
    pipeline.submit(batch(OperationKind::Create, &[&records[0]])).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let outcome = pipeline.shutdown().await;

    assert_eq!(outcome, ShutdownOutcome::Forced);
    assert!(started.elapsed() < Duration::from_millis(1_000));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_overruns_when_a_worker_ignores_abort() {
    let (store, records) = seeded_store(&["r1"]).await;
    let mut cfg = config();
    cfg.graceful_timeout_ms = 100;
    cfg.force_timeout_ms = 100;
    let pipeline = Pipeline::new(
        cfg,
        vec![Arc::new(Blocking(Duration::from_millis(800)))],
        store.clone() as Arc<dyn StoreGateway>,
    );
    pipeline.start().unwrap();
    pipeline.submit(batch(OperationKind::Create, &[&records[0]])).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let outcome = pipeline.shutdown().await;

    assert_eq!(outcome, ShutdownOutcome::Overrun);
    assert!(started.elapsed() < Duration::from_millis(700));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn concurrent_shutdown_waits_for_the_drain_in_progress() {
    let (store, records) = seeded_store(&["r1"]).await;
    let gate = Arc::new(Gate::default());
    let pipeline = pipeline(vec![gate.clone() as Arc<dyn Plugin>], &store);
    pipeline.start().unwrap();
    pipeline.submit(batch(OperationKind::Create, &[&records[0]])).unwrap();
    gate.started.notified().await;

    let second = async {
        while pipeline.state() != PipelineState::Draining {
            tokio::task::yield_now().await;
        }
        let outcome = pipeline.shutdown().await;
        (outcome, pipeline.stats().completed, pipeline.state())
    };
    let release = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.release.notify_one();
    };
    let (first, second, ()) = tokio::join!(pipeline.shutdown(), second, release);

    assert_eq!(first, ShutdownOutcome::Graceful);
    assert_eq!(second, (ShutdownOutcome::Graceful, 1, PipelineState::Stopped));
}

#[tokio::test]
async fn shutdown_when_stopped_is_a_no_op() {
    let (store, _) = seeded_store(&[]).await;
    let pipeline = pipeline(vec![Tag::new("t", "v")], &store);
    assert_eq!(pipeline.shutdown().await, ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn reconfigure_swaps_the_chain_and_restarts() {
    let (store, records) = seeded_store(&["r1"]).await;
    let pipeline = pipeline(vec![Tag::new("old", "1")], &store);
    pipeline.start().unwrap();

    let outcome = pipeline.reconfigure(vec![Tag::new("new", "2")]).await;
    assert_eq!(outcome, Ok(ShutdownOutcome::Graceful));
    assert_eq!(pipeline.state(), PipelineState::Running);
    assert_eq!(pipeline.plugin_names(), vec!["new".to_string()]);

    pipeline.submit(batch(OperationKind::Create, &[&records[0]])).unwrap();
    wait_completed(&pipeline, 1).await;

    let stored = store.record(&RecordId::from("r1")).await.unwrap();
    assert_eq!(stored.get_str("new"), Some("2"));
    assert!(stored.get("old").is_none());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn reconfigure_leaves_a_stopped_pipeline_stopped() {
    let (store, _) = seeded_store(&[]).await;
    let pipeline = pipeline(vec![Tag::new("old", "1")], &store);

    pipeline.reconfigure(Vec::new()).await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(pipeline.plugin_names().is_empty());
}
