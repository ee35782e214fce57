/// Configuration management for bulk-task-service
///
/// Loads configuration from environment variables with sensible defaults.
/// Both the HTTP service and the worker binary read the same variables.
use cdn_bucket::BucketConfig;
use serde::Deserialize;
use std::time::Duration;
use task_queue::{WorkerConfig, LOW_PRIORITY_QUEUE};

#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub cdn: BucketConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
    pub redis_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct QueueConfig {
    /// Queue every group is submitted to and workers consume
    pub name: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub poll_timeout_secs: u64,
    /// Port of the worker's `/metrics` endpoint
    pub metrics_port: u16,
}

impl QueueConfig {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            queue: self.name.clone(),
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            backoff_base: Duration::from_secs(self.backoff_base_secs),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Config {
            app: AppConfig {
                host: std::env::var("BULK_TASK_SERVICE_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("BULK_TASK_SERVICE_PORT")
                    .unwrap_or_else(|_| "8090".to_string())
                    .parse()?,
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/nova".to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
            },
            cache: CacheConfig {
                redis_url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost".to_string()),
            },
            queue: QueueConfig {
                name: std::env::var("TASK_QUEUE_NAME")
                    .unwrap_or_else(|_| LOW_PRIORITY_QUEUE.to_string()),
                concurrency: env_or("WORKER_CONCURRENCY", 4),
                max_retries: env_or("WORKER_MAX_RETRIES", 3),
                backoff_base_secs: env_or("WORKER_BACKOFF_BASE_SECS", 1),
                poll_timeout_secs: env_or("WORKER_POLL_TIMEOUT_SECS", 5),
                metrics_port: env_or("WORKER_METRICS_PORT", 9102),
            },
            cdn: BucketConfig::from_env(),
        })
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_from_queue_section() {
        let queue = QueueConfig {
            name: LOW_PRIORITY_QUEUE.to_string(),
            concurrency: 8,
            max_retries: 2,
            backoff_base_secs: 3,
            poll_timeout_secs: 1,
            metrics_port: 9102,
        };

        let worker = queue.worker_config();
        assert_eq!(worker.queue, "Z_lopri_Q");
        assert_eq!(worker.concurrency, 8);
        assert_eq!(worker.max_retries, 2);
        assert_eq!(worker.backoff_base, Duration::from_secs(3));
        assert_eq!(worker.poll_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("BULK_TASK_TEST_NUMBER", "not-a-number");
        assert_eq!(env_or("BULK_TASK_TEST_NUMBER", 7u32), 7);
        assert_eq!(env_or("BULK_TASK_TEST_UNSET", 9u32), 9);
    }
}
