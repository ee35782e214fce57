use prometheus::{IntCounter, IntGauge, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct WorkerMetrics {
    pub succeeded: IntCounter,
    pub failed: IntCounter,
    pub retried: IntCounter,
    pub in_flight: IntGauge,
}

impl WorkerMetrics {
    pub fn new(service: &str) -> prometheus::Result<Self> {
        let registry = prometheus::default_registry();

        let succeeded = IntCounter::with_opts(
            Opts::new("task_queue_succeeded_total", "Tasks finished in SUCCESS state")
                .const_label("service", service.to_string()),
        )?;
        let failed = IntCounter::with_opts(
            Opts::new("task_queue_failed_total", "Tasks finished in FAILURE state")
                .const_label("service", service.to_string()),
        )?;
        let retried = IntCounter::with_opts(
            Opts::new("task_queue_retried_total", "Task attempts re-queued for retry")
                .const_label("service", service.to_string()),
        )?;
        let in_flight = IntGauge::with_opts(
            Opts::new("task_queue_in_flight", "Tasks currently executing on this worker")
                .const_label("service", service.to_string()),
        )?;

        for metric in [
            Box::new(succeeded.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(failed.clone()),
            Box::new(retried.clone()),
            Box::new(in_flight.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register task queue metric: {}", e);
            }
        }

        Ok(Self {
            succeeded,
            failed,
            retried,
            in_flight,
        })
    }
}
