//! HTTP handlers for order orchestration endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentIdentity;
use crate::services::order::{
    OrderDetail, OrderService, PickedLine, PlaceOrderRequest, PlacedOrder, ValidatedOrder,
};
use crate::services::{CancellationService, ProcessingService};
use crate::AppState;
use shared::{CancelReason, Order, OrderChange, OrderProcessing};

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub storage_point_id: Uuid,
}

#[derive(Deserialize)]
pub struct ValidateOrderInput {
    pub picked: Vec<PickedLine>,
}

#[derive(Deserialize)]
pub struct ValidateDeliveryInput {
    pub cash_collected: bool,
}

#[derive(Deserialize)]
pub struct CancelOrderInput {
    pub reason: CancelReason,
}

#[derive(Deserialize)]
pub struct RegisterChangesInput {
    pub changes: Vec<OrderChange>,
}

/// Place an order
pub async fn place_order(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(input): Json<PlaceOrderRequest>,
) -> AppResult<Json<PlacedOrder>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let placed = service.place(&input, &identity).await?;
    Ok(Json(placed))
}

/// Get an order with its lines
pub async fn get_order(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service.get(order_id).await?;
    Ok(Json(order))
}

/// List current orders at a storage point
pub async fn list_orders(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Query(query): Query<ListOrdersQuery>,
) -> AppResult<Json<Vec<Order>>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let orders = service.list(query.storage_point_id).await?;
    Ok(Json(orders))
}

/// Audit trail of an order
pub async fn get_order_trail(
    State(state): State<AppState>,
    _identity: CurrentIdentity,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Vec<OrderProcessing>>> {
    let service = ProcessingService::new(state.db);
    let trail = service.trail(order_id).await?;
    Ok(Json(trail))
}

/// Validate pick-pack, splitting off a child order on partial picks
pub async fn validate_order(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
    Json(input): Json<ValidateOrderInput>,
) -> AppResult<Json<ValidatedOrder>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let validated = service.validate(order_id, &input.picked, &identity).await?;
    Ok(Json(validated))
}

/// Record the arrival of an order travelling between storage points
pub async fn mark_order_arrived(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service.mark_arrived(order_id, &identity).await?;
    Ok(Json(order))
}

/// Output the order to delivery or the agency counter
pub async fn output_order(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service.output(order_id, &identity).await?;
    Ok(Json(order))
}

/// Assign the order to the delivery fleet
pub async fn assign_order(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service.assign(order_id, &identity).await?;
    Ok(Json(order))
}

/// Confirm delivery at the customer
pub async fn validate_delivery(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
    Json(input): Json<ValidateDeliveryInput>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service
        .validate_delivery(order_id, input.cash_collected, &identity)
        .await?;
    Ok(Json(order))
}

/// Record cash collection
pub async fn register_cashing(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service.register_cashing(order_id, &identity).await?;
    Ok(Json(order))
}

/// Report a failed delivery attempt
pub async fn report_order(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service.report(order_id, &identity).await?;
    Ok(Json(order))
}

/// Refund a paid order
pub async fn refund_order(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service.refund(order_id, &identity).await?;
    Ok(Json(order))
}

/// Cancel an order
pub async fn cancel_order(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
    Json(input): Json<CancelOrderInput>,
) -> AppResult<Json<OrderDetail>> {
    let service = CancellationService::new(state.db);
    let order = service.cancel(order_id, input.reason, &identity).await?;
    Ok(Json(order))
}

/// Edit order lines directly, re-sourcing the remainder
pub async fn edit_order_lines(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
    Json(input): Json<RegisterChangesInput>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service
        .edit_lines(order_id, &input.changes, &identity)
        .await?;
    Ok(Json(order))
}

/// Record sensitive edits for separate approval
pub async fn register_order_changes(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
    Json(input): Json<RegisterChangesInput>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service
        .register_changes(order_id, &input.changes, &identity)
        .await?;
    Ok(Json(order))
}

/// Apply the order's pending changes
pub async fn apply_order_changes(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db, state.config.fulfillment.clone());
    let order = service.apply_changes(order_id, &identity).await?;
    Ok(Json(order))
}
