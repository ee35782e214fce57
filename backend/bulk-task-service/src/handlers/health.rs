use actix_web::{web, HttpResponse};

use super::AppState;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    match state.bucket.health_check().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({"status": "ok"})),
        Err(e) => {
            tracing::warn!(error = %e, "Bucket health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unavailable",
                "detail": e.to_string(),
            }))
        }
    }
}
