/// Key list handlers
use actix_web::{web, HttpResponse};

use super::AppState;
use crate::error::{AppError, Result};

/// Replace the key table with the bucket's current `keylist.json`
pub async fn import_keys(state: web::Data<AppState>) -> Result<HttpResponse> {
    let errors = state.keys.import().await?;
    if !errors.is_empty() {
        return Err(AppError::InvalidKeys(errors));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "Keys imported" })))
}
