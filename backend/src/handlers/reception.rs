//! HTTP handlers for reception endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentIdentity;
use crate::services::reception::{ReceivedLine, ReceptionDetail, ReceptionService};
use crate::AppState;
use shared::Reception;

#[derive(Deserialize)]
pub struct ListReceptionsQuery {
    pub storage_point_id: Uuid,
}

#[derive(Deserialize, Default)]
pub struct ValidateReceptionInput {
    #[serde(default)]
    pub received: Option<Vec<ReceivedLine>>,
}

/// Get a reception with its lines
pub async fn get_reception(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(reception_id): Path<Uuid>,
) -> AppResult<Json<ReceptionDetail>> {
    let service = ReceptionService::new(state.db);
    let reception = service.get(reception_id).await?;
    Ok(Json(reception))
}

/// List pending receptions at a storage point
pub async fn list_pending_receptions(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Query(query): Query<ListReceptionsQuery>,
) -> AppResult<Json<Vec<Reception>>> {
    let service = ReceptionService::new(state.db);
    let receptions = service.list_pending(query.storage_point_id).await?;
    Ok(Json(receptions))
}

/// Validate a pending reception, turning its units into real stock
pub async fn validate_reception(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(reception_id): Path<Uuid>,
    Json(input): Json<ValidateReceptionInput>,
) -> AppResult<Json<ReceptionDetail>> {
    let service = ReceptionService::new(state.db);
    let reception = service
        .validate(reception_id, input.received.as_deref(), &identity)
        .await?;
    Ok(Json(reception))
}

/// Cancel a pending reception that holds no units yet
pub async fn cancel_reception(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(reception_id): Path<Uuid>,
) -> AppResult<Json<ReceptionDetail>> {
    let service = ReceptionService::new(state.db);
    let reception = service.cancel(reception_id, &identity).await?;
    Ok(Json(reception))
}
