//! HTTP handlers for stock ledger and availability endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentIdentity;
use crate::services::{AvailabilityService, LedgerService};
use crate::AppState;
use shared::{AvailabilityReport, LineRequest, StockLevels};

#[derive(Deserialize)]
pub struct LevelsQuery {
    pub storage_point_id: Uuid,
}

#[derive(Deserialize)]
pub struct ResolveAvailabilityInput {
    pub storage_point_id: Uuid,
    pub lines: Vec<LineRequest>,
}

/// Current bucket counts for a variant at a storage point
pub async fn get_variant_levels(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(variant_id): Path<Uuid>,
    Query(query): Query<LevelsQuery>,
) -> AppResult<Json<StockLevels>> {
    let service = LedgerService::new(state.db);
    let levels = service
        .variant_levels(variant_id, query.storage_point_id)
        .await?;
    Ok(Json(levels))
}

/// Current bucket counts for a product aggregate at a storage point
pub async fn get_product_levels(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(product_id): Path<Uuid>,
    Query(query): Query<LevelsQuery>,
) -> AppResult<Json<StockLevels>> {
    let service = LedgerService::new(state.db);
    let levels = service
        .product_levels(product_id, query.storage_point_id)
        .await?;
    Ok(Json(levels))
}

/// Resolve availability for a set of requested lines. Advisory: placement
/// re-resolves under lock before committing anything.
pub async fn resolve_availability(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Json(input): Json<ResolveAvailabilityInput>,
) -> AppResult<Json<AvailabilityReport>> {
    let service = AvailabilityService::new(state.db);
    let report = service
        .resolve(input.storage_point_id, &input.lines)
        .await?;
    Ok(Json(report))
}
