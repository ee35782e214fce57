//! Bulk Task Service
//!
//! Submits bulk administrative work (reference-data export, media asset
//! sync with the CDN bucket) as task groups, and reports their progress
//! until a final summary is produced.

pub mod aggregator;
pub mod assets;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod handlers;
pub mod indexer;
pub mod keys;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod submitter;
pub mod tasks;
pub mod telemetry;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
