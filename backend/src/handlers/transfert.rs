//! HTTP handlers for transfert endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentIdentity;
use crate::services::transfert::{TransfertDetail, TransfertService};
use crate::AppState;

/// Get a transfert with its lines
pub async fn get_transfert(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(transfert_id): Path<Uuid>,
) -> AppResult<Json<TransfertDetail>> {
    let service = TransfertService::new(state.db);
    let transfert = service.get(transfert_id).await?;
    Ok(Json(transfert))
}

/// Confirm a pending transfert: units are picked and shipped
pub async fn confirm_transfert(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(transfert_id): Path<Uuid>,
) -> AppResult<Json<TransfertDetail>> {
    let service = TransfertService::new(state.db);
    let transfert = service.confirm(transfert_id, &identity).await?;
    Ok(Json(transfert))
}

/// Validate a confirmed transfert on arrival at the target
pub async fn validate_transfert(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(transfert_id): Path<Uuid>,
) -> AppResult<Json<TransfertDetail>> {
    let service = TransfertService::new(state.db);
    let transfert = service.validate(transfert_id, &identity).await?;
    Ok(Json(transfert))
}

/// Cancel a pending transfert
pub async fn cancel_transfert(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(transfert_id): Path<Uuid>,
) -> AppResult<Json<TransfertDetail>> {
    let service = TransfertService::new(state.db);
    let transfert = service.cancel(transfert_id, &identity).await?;
    Ok(Json(transfert))
}
