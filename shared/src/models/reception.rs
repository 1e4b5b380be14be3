//! Incoming-stock intake records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::CancelReason;

/// Reception lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceptionStatus {
    Pending,
    Validated,
    Canceled,
}

impl ReceptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceptionStatus::Pending => "pending",
            ReceptionStatus::Validated => "validated",
            ReceptionStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReceptionStatus::Pending),
            "validated" => Some(ReceptionStatus::Validated),
            "canceled" => Some(ReceptionStatus::Canceled),
            _ => None,
        }
    }
}

/// What kind of intake a reception records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceptionType {
    Transfert,
    Purchase,
    OrderCancellation,
    CustomerReturn,
}

impl ReceptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceptionType::Transfert => "transfert",
            ReceptionType::Purchase => "purchase",
            ReceptionType::OrderCancellation => "order_cancellation",
            ReceptionType::CustomerReturn => "customer_return",
        }
    }

    /// Intake type for a cancellation reversal, derived from the reason
    pub fn from_cancel_reason(reason: CancelReason) -> Self {
        match reason {
            CancelReason::DeliveryFailed => ReceptionType::CustomerReturn,
            _ => ReceptionType::OrderCancellation,
        }
    }
}

/// Incoming stock record at a storage point. At most one of `transfert_id`,
/// `purchase_order_id` is set; `order_id` links cancellation reversals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reception {
    pub id: Uuid,
    pub reference: String,
    pub reception_type: ReceptionType,
    pub status: ReceptionStatus,
    pub storage_point_id: Uuid,
    pub transfert_id: Option<Uuid>,
    pub purchase_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expected quantity per variant on a reception
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptionLine {
    pub id: Uuid,
    pub reception_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i64,
    pub received_quantity: i64,
    pub created_at: DateTime<Utc>,
}
