//! HTTP handlers for the warehouse fulfillment platform

pub mod health;
pub mod order;
pub mod purchase;
pub mod reception;
pub mod stock;
pub mod storage_point;
pub mod transfert;

pub use health::health_check;
pub use order::{
    apply_order_changes, assign_order, cancel_order, edit_order_lines, get_order, get_order_trail,
    list_orders, mark_order_arrived, output_order, place_order, refund_order, register_cashing,
    register_order_changes, report_order, validate_delivery, validate_order,
};
pub use purchase::{cancel_purchase, get_purchase, save_purchase, validate_purchase};
pub use reception::{cancel_reception, get_reception, list_pending_receptions, validate_reception};
pub use stock::{get_product_levels, get_variant_levels, resolve_availability};
pub use storage_point::{
    get_location_storage_point, get_storage_point, list_locations, list_storage_points,
};
pub use transfert::{cancel_transfert, confirm_transfert, get_transfert, validate_transfert};
