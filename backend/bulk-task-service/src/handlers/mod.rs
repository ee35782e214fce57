/// HTTP handlers for bulk task endpoints
///
/// This module contains handlers for:
/// - Tasks: export reference data, move media assets, poll group progress
/// - Keys: import the bucket key list
/// - Health: bucket reachability
pub mod health;
pub mod keys;
pub mod tasks;

use crate::aggregator::ResultAggregator;
use crate::cache::TrackingCache;
use crate::export::MessageCatalog;
use crate::keys::{KeyImporter, KeyRepository};
use crate::progress::ProgressTracker;
use crate::submitter::TaskGroupSubmitter;
use actix_web::web;
use cdn_bucket::Bucket;
use std::sync::Arc;
use task_queue::TaskBroker;

pub use health::health_check;
pub use keys::import_keys;
pub use tasks::{export_entity, group_progress, move_assets};

/// Everything the handlers share
#[derive(Clone)]
pub struct AppState {
    pub bucket: Bucket,
    pub submitter: TaskGroupSubmitter,
    pub tracker: ProgressTracker,
    pub catalog: Arc<dyn MessageCatalog>,
    pub keys: KeyImporter,
}

impl AppState {
    pub fn new(
        broker: Arc<dyn TaskBroker>,
        cache: Arc<dyn TrackingCache>,
        bucket: Bucket,
        catalog: Arc<dyn MessageCatalog>,
        key_repo: Arc<dyn KeyRepository>,
        queue: &str,
    ) -> Self {
        let aggregator = ResultAggregator::new(broker.clone(), cache.clone(), bucket.clone());
        Self {
            submitter: TaskGroupSubmitter::new(broker.clone(), cache, queue),
            tracker: ProgressTracker::new(broker, aggregator),
            keys: KeyImporter::new(bucket.clone(), key_repo),
            catalog,
            bucket,
        }
    }
}

/// Mount every route under `/api/v1`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/tasks")
                    .route("/export/{entity}", web::post().to(export_entity))
                    .route("/assets/{action}", web::post().to(move_assets))
                    .route(
                        "/progress/{group_id}/{should_update_version}",
                        web::get().to(group_progress),
                    ),
            )
            .service(web::scope("/keys").route("/import", web::post().to(import_keys))),
    );
}
