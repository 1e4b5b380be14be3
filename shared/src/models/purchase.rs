//! Procurement requests for shortfall with no transferable source

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purchase order lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Saved,
    Validated,
    Canceled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Saved => "saved",
            PurchaseStatus::Validated => "validated",
            PurchaseStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PurchaseStatus::Pending),
            "saved" => Some(PurchaseStatus::Saved),
            "validated" => Some(PurchaseStatus::Validated),
            "canceled" => Some(PurchaseStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseStatus::Validated | PurchaseStatus::Canceled)
    }

    /// A purchase order can be cancelled outright only before validation
    pub fn is_cancellable(&self) -> bool {
        matches!(self, PurchaseStatus::Pending | PurchaseStatus::Saved)
    }
}

/// Procurement request aggregating every purchase-routed shortfall line of
/// one allocation. `order_id` is a weak back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub reference: String,
    pub status: PurchaseStatus,
    pub storage_point_id: Uuid,
    pub order_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One variant line of a purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i64,
    pub unit_cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}
