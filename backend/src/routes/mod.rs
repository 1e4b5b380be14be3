//! Route definitions for the warehouse fulfillment platform

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::{handlers, middleware::identity_middleware, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - order orchestration
        .nest("/orders", order_routes())
        // Protected routes - transfert sub-workflow
        .nest("/transferts", transfert_routes())
        // Protected routes - purchase sub-workflow
        .nest("/purchases", purchase_routes())
        // Protected routes - reception sub-workflow
        .nest("/receptions", reception_routes())
        // Protected routes - stock ledger and availability
        .nest("/stock", stock_routes())
        // Protected routes - storage points and locations
        .nest("/storage-points", storage_point_routes())
}

/// Order orchestration routes (protected)
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::place_order))
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/trail", get(handlers::get_order_trail))
        .route("/:order_id/validate", post(handlers::validate_order))
        .route("/:order_id/arrival", post(handlers::mark_order_arrived))
        .route("/:order_id/output", post(handlers::output_order))
        .route("/:order_id/assign", post(handlers::assign_order))
        .route("/:order_id/delivery", post(handlers::validate_delivery))
        .route("/:order_id/cashing", post(handlers::register_cashing))
        .route("/:order_id/report", post(handlers::report_order))
        .route("/:order_id/refund", post(handlers::refund_order))
        .route("/:order_id/cancel", post(handlers::cancel_order))
        .route("/:order_id/lines", patch(handlers::edit_order_lines))
        .route(
            "/:order_id/changes",
            post(handlers::register_order_changes),
        )
        .route(
            "/:order_id/changes/apply",
            post(handlers::apply_order_changes),
        )
        .route_layer(middleware::from_fn(identity_middleware))
}

/// Transfert routes (protected)
fn transfert_routes() -> Router<AppState> {
    Router::new()
        .route("/:transfert_id", get(handlers::get_transfert))
        .route("/:transfert_id/confirm", post(handlers::confirm_transfert))
        .route(
            "/:transfert_id/validate",
            post(handlers::validate_transfert),
        )
        .route("/:transfert_id/cancel", post(handlers::cancel_transfert))
        .route_layer(middleware::from_fn(identity_middleware))
}

/// Purchase order routes (protected)
fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route("/:purchase_id", get(handlers::get_purchase))
        .route("/:purchase_id/save", post(handlers::save_purchase))
        .route("/:purchase_id/validate", post(handlers::validate_purchase))
        .route("/:purchase_id/cancel", post(handlers::cancel_purchase))
        .route_layer(middleware::from_fn(identity_middleware))
}

/// Reception routes (protected)
fn reception_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_pending_receptions))
        .route("/:reception_id", get(handlers::get_reception))
        .route(
            "/:reception_id/validate",
            post(handlers::validate_reception),
        )
        .route("/:reception_id/cancel", post(handlers::cancel_reception))
        .route_layer(middleware::from_fn(identity_middleware))
}

/// Stock ledger and availability routes (protected)
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/variants/:variant_id", get(handlers::get_variant_levels))
        .route("/products/:product_id", get(handlers::get_product_levels))
        .route("/availability", post(handlers::resolve_availability))
        .route_layer(middleware::from_fn(identity_middleware))
}

/// Storage point routes (protected)
fn storage_point_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_storage_points))
        .route("/:storage_point_id", get(handlers::get_storage_point))
        .route(
            "/:storage_point_id/locations",
            get(handlers::list_locations),
        )
        .route(
            "/locations/:location_id",
            get(handlers::get_location_storage_point),
        )
        .route_layer(middleware::from_fn(identity_middleware))
}
