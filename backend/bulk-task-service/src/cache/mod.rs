/// Tracking cache for task groups
///
/// This module handles:
/// - Group start timestamps (`{group_id}_timestart`)
/// - Round-robin counters (`{path}_indexedfile`)
/// - Finalization claims (`{group_id}_finalizing`)
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

mod memory;

pub use memory::MemoryCache;

/// Format of the stored group start timestamp, e.g.
/// `2024-01-31 09:15:02.123456 +0000`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f %z";

/// Plain key/value operations the orchestration layer needs.
///
/// Only keys written through `set_if_absent` expire on their own; whoever
/// writes any other key deletes it.
#[async_trait]
pub trait TrackingCache: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Atomically create `key` with a time to live; false if it already exists
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    /// Atomically increment an integer key, creating it at 0 first
    async fn incr(&self, key: &str) -> Result<i64>;
}

/// Cache key holding the start time of a group
pub fn timestart_key(group_id: &str) -> String {
    format!("{group_id}_timestart")
}

/// Cache key claimed by the poll that finalizes a group
pub fn finalizing_key(group_id: &str) -> String {
    format!("{group_id}_finalizing")
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
}

/// Redis-backed tracking cache
#[derive(Clone)]
pub struct RedisTrackingCache {
    conn: Arc<Mutex<ConnectionManager>>,
}

impl RedisTrackingCache {
    /// Initialize cache from Redis client
    pub async fn new(client: redis::Client) -> Result<Self> {
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to connect to Redis: {e}")))?;

        Ok(Self::with_manager(Arc::new(Mutex::new(manager))))
    }

    pub fn with_manager(manager: Arc<Mutex<ConnectionManager>>) -> Self {
        Self { conn: manager }
    }
}

#[async_trait]
impl TrackingCache for RedisTrackingCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        conn.exists(key)
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to check cache key: {e}")))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.lock().await;
        conn.get(key)
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to read from cache: {e}")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.set(key, value)
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to write to cache: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.del(key)
            .await
            .map(|_: usize| ())
            .map_err(|e| AppError::CacheError(format!("Failed to delete cache key: {e}")))
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        // SET NX EX replies OK when written, nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to claim cache key: {e}")))?;
        Ok(reply.is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.lock().await;
        conn.incr(key, 1)
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to increment cache key: {e}")))
    }
}
