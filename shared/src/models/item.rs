//! Physical units: individually tracked, barcoded items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::StepStatus;
use super::stock::StockBucket;

/// Physical lifecycle state of a single unit.
///
/// Every state maps to exactly one ledger bucket via [`ItemState::bucket`];
/// the ledger is mutated only through paired bucket movements when a unit
/// changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Available,
    Reserved,
    InTransit,
    PendingReception,
    DeliveryProcessing,
    Delivered,
    IsDead,
    Discovered,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Available => "available",
            ItemState::Reserved => "reserved",
            ItemState::InTransit => "in_transit",
            ItemState::PendingReception => "pending_reception",
            ItemState::DeliveryProcessing => "delivery_processing",
            ItemState::Delivered => "delivered",
            ItemState::IsDead => "is_dead",
            ItemState::Discovered => "discovered",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "available" => Some(ItemState::Available),
            "reserved" => Some(ItemState::Reserved),
            "in_transit" => Some(ItemState::InTransit),
            "pending_reception" => Some(ItemState::PendingReception),
            "delivery_processing" => Some(ItemState::DeliveryProcessing),
            "delivered" => Some(ItemState::Delivered),
            "is_dead" => Some(ItemState::IsDead),
            "discovered" => Some(ItemState::Discovered),
            _ => None,
        }
    }

    /// The fixed state -> ledger bucket mapping
    pub fn bucket(&self) -> StockBucket {
        match self {
            ItemState::Available => StockBucket::Available,
            ItemState::Reserved => StockBucket::Reserved,
            ItemState::InTransit => StockBucket::InTransit,
            ItemState::PendingReception => StockBucket::PendingReception,
            ItemState::DeliveryProcessing => StockBucket::DeliveryProcessing,
            ItemState::Delivered => StockBucket::Delivered,
            ItemState::IsDead => StockBucket::IsDead,
            ItemState::Discovered => StockBucket::Discovered,
        }
    }
}

/// One physical, individually tracked unit.
///
/// `order_id`, `transfert_id` and `reception_id` are weak back-references:
/// the unit's lifecycle is independent of any single order, and it belongs
/// to at most one in-flight order, transfer or reception at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductItem {
    pub id: Uuid,
    pub barcode: String,
    pub variant_id: Uuid,
    pub state: ItemState,
    pub status: Option<StepStatus>,
    pub location_id: Uuid,
    pub order_id: Option<Uuid>,
    pub transfert_id: Option<Uuid>,
    pub reception_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
