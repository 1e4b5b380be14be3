//! HTTP handlers for storage point endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentIdentity;
use crate::services::StoragePointService;
use crate::AppState;
use shared::{Location, StoragePoint};

/// List storage points by configured priority
pub async fn list_storage_points(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
) -> AppResult<Json<Vec<StoragePoint>>> {
    let service = StoragePointService::new(state.db);
    let storage_points = service.list().await?;
    Ok(Json(storage_points))
}

/// Get a storage point
pub async fn get_storage_point(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(storage_point_id): Path<Uuid>,
) -> AppResult<Json<StoragePoint>> {
    let service = StoragePointService::new(state.db);
    let storage_point = service.get(storage_point_id).await?;
    Ok(Json(storage_point))
}

/// Locations of a storage point's subtree
pub async fn list_locations(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(storage_point_id): Path<Uuid>,
) -> AppResult<Json<Vec<Location>>> {
    let service = StoragePointService::new(state.db);
    let locations = service.locations(storage_point_id).await?;
    Ok(Json(locations))
}

/// Resolve which storage point a location belongs to
pub async fn get_location_storage_point(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(location_id): Path<Uuid>,
) -> AppResult<Json<StoragePoint>> {
    let service = StoragePointService::new(state.db);
    let storage_point = service.storage_point_of_location(location_id).await?;
    Ok(Json(storage_point))
}
