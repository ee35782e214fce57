//! Bulk Task Worker - executes task group members
//!
//! Consumes the low-priority queue and runs `bucket.push_file`,
//! `bucket.pull_file` and `tools.async_exception` against the CDN bucket.
//!
//! Environment variables:
//! - REDIS_URL: broker connection (default: redis://localhost)
//! - TASK_QUEUE_NAME: queue to consume (default: "Z_lopri_Q")
//! - WORKER_CONCURRENCY: tasks run at once (default: 4)
//! - WORKER_MAX_RETRIES: retries for transient storage failures (default: 3)
//! - WORKER_METRICS_PORT: port serving `GET /metrics` (default: 9102)
//! - CDN_*: bucket credentials and mirror directory

use anyhow::Context;
use bulk_task_service::{metrics, tasks, telemetry, Config};
use cdn_bucket::Bucket;
use std::sync::Arc;
use task_queue::{RedisBroker, Worker, WorkerMetrics};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing(&[
        "bulk_task_worker=info",
        "bulk_task_service=info",
        "task_queue=info",
        "cdn_bucket=info",
    ])?;

    info!("Starting Bulk Task Worker");

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    info!(
        bucket = %config.cdn.bucket,
        queue = %config.queue.name,
        concurrency = config.queue.concurrency,
        "Configuration loaded"
    );

    let bucket = Bucket::open(&config.cdn)
        .await
        .context("Failed to open CDN bucket")?;
    if let Err(e) = bucket.health_check().await {
        warn!(error = %e, "Bucket health check failed, continuing");
    }

    let broker = Arc::new(
        RedisBroker::connect(&config.cache.redis_url)
            .await
            .context("Failed to connect task broker")?,
    );

    let mut worker = Worker::new(broker, tasks::registry(bucket), config.queue.worker_config());
    match WorkerMetrics::new("bulk-task-worker") {
        Ok(metrics) => worker = worker.with_metrics(metrics),
        Err(e) => warn!(error = %e, "Worker metrics disabled"),
    }

    let metrics_server = metrics::metrics_server(&config.app.host, config.queue.metrics_port)
        .context("Failed to bind metrics endpoint")?;
    let metrics_handle = metrics_server.handle();
    actix_rt::spawn(async move {
        if let Err(e) = metrics_server.await {
            error!(error = %e, "Metrics server failed");
        }
    });
    info!(port = config.queue.metrics_port, "Serving worker metrics");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await?;
    metrics_handle.stop(true).await;

    info!("Bulk Task Worker stopped");
    Ok(())
}
