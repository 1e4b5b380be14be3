//! HTTP handlers for purchase order endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentIdentity;
use crate::services::purchase::{LineCost, PurchaseDetail, PurchaseService};
use crate::AppState;

#[derive(Deserialize)]
pub struct SavePurchaseInput {
    #[serde(default)]
    pub costs: Vec<LineCost>,
}

/// Get a purchase order with its lines
pub async fn get_purchase(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseDetail>> {
    let service = PurchaseService::new(state.db);
    let purchase = service.get(purchase_id).await?;
    Ok(Json(purchase))
}

/// Save a pending purchase order with negotiated unit costs
pub async fn save_purchase(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(purchase_id): Path<Uuid>,
    Json(input): Json<SavePurchaseInput>,
) -> AppResult<Json<PurchaseDetail>> {
    let service = PurchaseService::new(state.db);
    let purchase = service.save(purchase_id, &input.costs, &identity).await?;
    Ok(Json(purchase))
}

/// Validate a saved purchase order, opening its intake reception
pub async fn validate_purchase(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseDetail>> {
    let service = PurchaseService::new(state.db);
    let purchase = service.validate(purchase_id, &identity).await?;
    Ok(Json(purchase))
}

/// Cancel a purchase order before validation
pub async fn cancel_purchase(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseDetail>> {
    let service = PurchaseService::new(state.db);
    let purchase = service.cancel(purchase_id, &identity).await?;
    Ok(Json(purchase))
}
