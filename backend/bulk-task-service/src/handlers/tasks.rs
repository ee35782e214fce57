/// Task group handlers - submit and poll bulk work
use actix_web::{web, HttpResponse};

use super::AppState;
use crate::assets::{build_asset_signatures, AssetAction};
use crate::error::{AppError, Result};
use crate::export::{build_signatures, entity_by_name};
use crate::models::{AssetSelection, Progress, RunningResponse};

/// Export one reference-data entity to the bucket; the final poll republishes
pub async fn export_entity(
    state: web::Data<AppState>,
    entity: web::Path<String>,
) -> Result<HttpResponse> {
    let entity = entity.into_inner();
    let exportable = entity_by_name(&entity, state.catalog.clone())
        .ok_or_else(|| AppError::BadRequest(format!("Unknown export entity: {entity}")))?;

    let signatures = build_signatures(&[exportable], &state.bucket).await;
    let response = state.submitter.submit(signatures, true).await?;

    Ok(HttpResponse::Ok().json(response))
}

/// Upload or download a selection of logos and maps
pub async fn move_assets(
    state: web::Data<AppState>,
    action: web::Path<AssetAction>,
    selection: web::Json<AssetSelection>,
) -> Result<HttpResponse> {
    let signatures = build_asset_signatures(action.into_inner(), &selection.assets, &state.bucket);
    let response = state.submitter.submit(signatures, false).await?;

    Ok(HttpResponse::Ok().json(response))
}

/// Poll a group; the first poll after completion returns the summary
pub async fn group_progress(
    state: web::Data<AppState>,
    path: web::Path<(String, u8)>,
) -> Result<HttpResponse> {
    let (group_id, should_update_version) = path.into_inner();

    match state.tracker.poll(&group_id, should_update_version != 0).await? {
        Progress::NotFound => Err(AppError::NotFound),
        Progress::Running { percent } => Ok(HttpResponse::Ok().json(RunningResponse { percent })),
        Progress::Finalized(summary) => Ok(HttpResponse::Ok().json(summary)),
    }
}
