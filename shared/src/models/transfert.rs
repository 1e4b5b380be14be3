//! Inter-storage-point stock movement requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transfert lifecycle.
///
/// The fulfillment core only creates PENDING transferts and cancels or
/// detaches them; CONFIRMED and VALIDATED are reached through the transfert's
/// own clerk-driven workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransfertStatus {
    Pending,
    Confirmed,
    Validated,
    Canceled,
}

impl TransfertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransfertStatus::Pending => "pending",
            TransfertStatus::Confirmed => "confirmed",
            TransfertStatus::Validated => "validated",
            TransfertStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransfertStatus::Pending),
            "confirmed" => Some(TransfertStatus::Confirmed),
            "validated" => Some(TransfertStatus::Validated),
            "canceled" => Some(TransfertStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransfertStatus::Validated | TransfertStatus::Canceled)
    }
}

/// Stock movement request from a source storage point to a target one.
/// `order_id` is a weak back-reference to the triggering order, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfert {
    pub id: Uuid,
    pub reference: String,
    pub status: TransfertStatus,
    pub source_storage_point_id: Uuid,
    pub target_storage_point_id: Uuid,
    pub order_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One variant line of a transfert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransfertLine {
    pub id: Uuid,
    pub transfert_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i64,
    pub picked_quantity: i64,
    pub created_at: DateTime<Utc>,
}
