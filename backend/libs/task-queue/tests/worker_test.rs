use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use task_queue::{
    MemoryBroker, TaskBroker, TaskFailure, TaskHandler, TaskOutcome, TaskRegistry, TaskSignature,
    TaskState, Worker, WorkerConfig, WorkerMetrics, LOW_PRIORITY_QUEUE,
};
use tokio::sync::watch;

struct Upper;

#[async_trait]
impl TaskHandler for Upper {
    async fn run(&self, args: &[Value]) -> Result<Value, TaskFailure> {
        let s = task_queue::registry::arg_str(args, 0)?;
        if s.is_empty() {
            return Err(TaskFailure::new("RuntimeError", "disk full"));
        }
        Ok(json!(s.to_uppercase()))
    }
}

/// Fails with a retryable error until `succeed_on` attempts were made
struct Flaky {
    calls: AtomicU32,
    succeed_on: u32,
}

#[async_trait]
impl TaskHandler for Flaky {
    async fn run(&self, _args: &[Value]) -> Result<Value, TaskFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.succeed_on {
            Ok(Value::Null)
        } else {
            Err(TaskFailure::new("StorageError", "connection reset").retryable())
        }
    }
}

fn config() -> WorkerConfig {
    WorkerConfig {
        queue: LOW_PRIORITY_QUEUE.to_string(),
        concurrency: 2,
        max_retries: 2,
        backoff_base: Duration::ZERO,
        poll_timeout: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_drain_records_success_and_failure() {
    let broker = Arc::new(MemoryBroker::new());
    let registry = TaskRegistry::new().register("upper", Arc::new(Upper));
    let worker = Worker::new(broker.clone(), registry, config());

    let handle = broker
        .enqueue_batch(
            LOW_PRIORITY_QUEUE,
            vec![
                TaskSignature::immutable("upper", vec![json!("a")]),
                TaskSignature::immutable("upper", vec![json!("")]),
                TaskSignature::immutable("missing", vec![]),
            ],
        )
        .await
        .unwrap();

    assert_eq!(worker.drain().await.unwrap(), 3);

    let records = broker.collect_results(&handle).await.unwrap();
    assert_eq!(records[0].state, TaskState::Success);
    assert_eq!(records[0].outcome, Some(TaskOutcome::Success(json!("A"))));
    assert_eq!(records[1].state, TaskState::Failure);
    assert_eq!(records[1].outcome.as_ref().unwrap().category(), "RuntimeError");
    assert_eq!(records[2].outcome.as_ref().unwrap().category(), "NotRegistered");

    let status = broker.poll_status(&handle).await.unwrap();
    assert!(!status.waiting());
}

#[tokio::test]
async fn test_retryable_failure_is_retried_until_success() {
    let broker = Arc::new(MemoryBroker::new());
    let flaky = Arc::new(Flaky {
        calls: AtomicU32::new(0),
        succeed_on: 2,
    });
    let registry = TaskRegistry::new().register("flaky", flaky.clone());
    let worker = Worker::new(broker.clone(), registry, config());

    let handle = broker
        .enqueue_batch(LOW_PRIORITY_QUEUE, vec![TaskSignature::new("flaky", vec![])])
        .await
        .unwrap();

    // first attempt re-queues, second succeeds
    assert_eq!(worker.drain().await.unwrap(), 2);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        broker.record(handle.task_ids[0]).map(|r| r.state),
        Some(TaskState::Success)
    );
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let broker = Arc::new(MemoryBroker::new());
    let flaky = Arc::new(Flaky {
        calls: AtomicU32::new(0),
        succeed_on: u32::MAX,
    });
    let registry = TaskRegistry::new().register("flaky", flaky.clone());
    let worker = Worker::new(broker.clone(), registry, config());

    let handle = broker
        .enqueue_batch(LOW_PRIORITY_QUEUE, vec![TaskSignature::new("flaky", vec![])])
        .await
        .unwrap();

    // initial attempt + max_retries
    assert_eq!(worker.drain().await.unwrap(), 3);

    let record = broker.record(handle.task_ids[0]).unwrap();
    assert_eq!(record.state, TaskState::Failure);
    assert_eq!(record.outcome.unwrap().category(), "StorageError");
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let broker = Arc::new(MemoryBroker::new());
    let registry = TaskRegistry::new().register("upper", Arc::new(Upper));
    let worker = Worker::new(broker.clone(), registry, config());

    let handle = broker
        .enqueue_batch(
            LOW_PRIORITY_QUEUE,
            vec![
                TaskSignature::immutable("upper", vec![json!("x")]),
                TaskSignature::immutable("upper", vec![json!("y")]),
            ],
        )
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run(shutdown_rx).await }
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while broker.poll_status(&handle).await.unwrap().waiting() {
        assert!(tokio::time::Instant::now() < deadline, "worker did not finish the group");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown_tx.send(true).unwrap();
    running.await.unwrap().unwrap();
    assert_eq!(broker.queued(LOW_PRIORITY_QUEUE), 0);
}

#[tokio::test]
async fn test_metrics_count_outcomes() {
    let broker = Arc::new(MemoryBroker::new());
    let flaky = Arc::new(Flaky {
        calls: AtomicU32::new(0),
        succeed_on: 2,
    });
    let registry = TaskRegistry::new()
        .register("upper", Arc::new(Upper))
        .register("flaky", flaky);
    let metrics = WorkerMetrics::new("worker-test").unwrap();
    let worker = Worker::new(broker.clone(), registry, config()).with_metrics(metrics.clone());

    broker
        .enqueue_batch(
            LOW_PRIORITY_QUEUE,
            vec![
                TaskSignature::immutable("upper", vec![json!("a")]),
                TaskSignature::immutable("upper", vec![json!("")]),
                TaskSignature::new("flaky", vec![]),
            ],
        )
        .await
        .unwrap();
    worker.drain().await.unwrap();

    assert_eq!(metrics.succeeded.get(), 2);
    assert_eq!(metrics.failed.get(), 1);
    assert_eq!(metrics.retried.get(), 1);
    assert_eq!(metrics.in_flight.get(), 0);
}
