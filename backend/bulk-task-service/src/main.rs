/// Bulk Task Service - HTTP Server
///
/// Accepts bulk export and asset jobs, submits them as task groups and
/// serves progress polls.
use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use anyhow::Context;
use bulk_task_service::cache::RedisTrackingCache;
use bulk_task_service::export::PgMessageCatalog;
use bulk_task_service::handlers::{self, AppState};
use bulk_task_service::keys::PgKeyRepository;
use bulk_task_service::telemetry;
use bulk_task_service::Config;
use cdn_bucket::Bucket;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use task_queue::RedisBroker;
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing(&["bulk_task_service=info", "actix_web=info"])?;

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    let bind_address = format!("{}:{}", config.app.host, config.app.port);

    info!(
        env = %config.app.env,
        bucket = %config.cdn.bucket,
        queue = %config.queue.name,
        "Bulk task service starting"
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    let redis_client = redis::Client::open(config.cache.redis_url.as_str())
        .context("Invalid REDIS_URL")?;
    let cache = Arc::new(
        RedisTrackingCache::new(redis_client)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize cache: {e}"))?,
    );
    let broker = Arc::new(
        RedisBroker::connect(&config.cache.redis_url)
            .await
            .context("Failed to connect task broker")?,
    );
    let bucket = Bucket::open(&config.cdn)
        .await
        .context("Failed to open CDN bucket")?;

    let state = AppState::new(
        broker,
        cache,
        bucket,
        Arc::new(PgMessageCatalog::new(db_pool.clone())),
        Arc::new(PgKeyRepository::new(db_pool)),
        &config.queue.name,
    );

    info!("HTTP server listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(actix_middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await?;

    info!("Bulk task service shutting down");
    Ok(())
}
