//! Order aggregate: the order, its lines and its compound workflow state

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order-facing status, the first half of the compound workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    ToPickPack,
    ToTransfer,
    ToTreat,
    ToBuy,
    ToReceived,
    Ready,
    ToDeliver,
    PickedUp,
    Assigned,
    Delivered,
    Complete,
    Reported,
    Refunded,
    Canceled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::ToPickPack => "to_pick_pack",
            StepStatus::ToTransfer => "to_transfer",
            StepStatus::ToTreat => "to_treat",
            StepStatus::ToBuy => "to_buy",
            StepStatus::ToReceived => "to_received",
            StepStatus::Ready => "ready",
            StepStatus::ToDeliver => "to_deliver",
            StepStatus::PickedUp => "picked_up",
            StepStatus::Assigned => "assigned",
            StepStatus::Delivered => "delivered",
            StepStatus::Complete => "complete",
            StepStatus::Reported => "reported",
            StepStatus::Refunded => "refunded",
            StepStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "to_pick_pack" => Some(StepStatus::ToPickPack),
            "to_transfer" => Some(StepStatus::ToTransfer),
            "to_treat" => Some(StepStatus::ToTreat),
            "to_buy" => Some(StepStatus::ToBuy),
            "to_received" => Some(StepStatus::ToReceived),
            "ready" => Some(StepStatus::Ready),
            "to_deliver" => Some(StepStatus::ToDeliver),
            "picked_up" => Some(StepStatus::PickedUp),
            "assigned" => Some(StepStatus::Assigned),
            "delivered" => Some(StepStatus::Delivered),
            "complete" => Some(StepStatus::Complete),
            "reported" => Some(StepStatus::Reported),
            "refunded" => Some(StepStatus::Refunded),
            "canceled" => Some(StepStatus::Canceled),
            _ => None,
        }
    }

    /// Terminal statuses admit no further workflow transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Complete | StepStatus::Refunded | StepStatus::Canceled
        )
    }
}

/// Processing step, the second half of the compound workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStep {
    PreparationInProgress,
    TransferInProgress,
    TreatmentInProgress,
    PurchaseInProgress,
    InTransit,
    AwaitingReception,
    DeliveryTreatment,
    PendingWithdrawal,
    DeliveryInProgress,
    PaymentInProgress,
    Closed,
}

impl OrderStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStep::PreparationInProgress => "preparation_in_progress",
            OrderStep::TransferInProgress => "transfer_in_progress",
            OrderStep::TreatmentInProgress => "treatment_in_progress",
            OrderStep::PurchaseInProgress => "purchase_in_progress",
            OrderStep::InTransit => "in_transit",
            OrderStep::AwaitingReception => "awaiting_reception",
            OrderStep::DeliveryTreatment => "delivery_treatment",
            OrderStep::PendingWithdrawal => "pending_withdrawal",
            OrderStep::DeliveryInProgress => "delivery_in_progress",
            OrderStep::PaymentInProgress => "payment_in_progress",
            OrderStep::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "preparation_in_progress" => Some(OrderStep::PreparationInProgress),
            "transfer_in_progress" => Some(OrderStep::TransferInProgress),
            "treatment_in_progress" => Some(OrderStep::TreatmentInProgress),
            "purchase_in_progress" => Some(OrderStep::PurchaseInProgress),
            "in_transit" => Some(OrderStep::InTransit),
            "awaiting_reception" => Some(OrderStep::AwaitingReception),
            "delivery_treatment" => Some(OrderStep::DeliveryTreatment),
            "pending_withdrawal" => Some(OrderStep::PendingWithdrawal),
            "delivery_in_progress" => Some(OrderStep::DeliveryInProgress),
            "payment_in_progress" => Some(OrderStep::PaymentInProgress),
            "closed" => Some(OrderStep::Closed),
            _ => None,
        }
    }
}

/// Which version of a fulfillment lineage an order row represents.
/// Exactly one CURRENT row exists per lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderVersion {
    Current,
    Previous,
}

impl OrderVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderVersion::Current => "current",
            OrderVersion::Previous => "previous",
        }
    }
}

/// Commercial origin of the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Default,
    DeadStock,
    Destockage,
    Magento,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Default => "default",
            OrderType::DeadStock => "dead_stock",
            OrderType::Destockage => "destockage",
            OrderType::Magento => "magento",
        }
    }
}

/// How the fulfilled order reaches the customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    AtHome,
    InAgency,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::AtHome => "at_home",
            DeliveryMode::InAgency => "in_agency",
        }
    }
}

/// Why an order was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    CustomerRequest,
    OutOfStock,
    DeliveryFailed,
    Duplicate,
    Other,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::CustomerRequest => "customer_request",
            CancelReason::OutOfStock => "out_of_stock",
            CancelReason::DeliveryFailed => "delivery_failed",
            CancelReason::Duplicate => "duplicate",
            CancelReason::Other => "other",
        }
    }
}

/// Payment arrangement for an order.
///
/// Stored as JSON at the persistence boundary only; in memory it is always
/// this tagged enum with its own validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaymentTerms {
    #[default]
    Immediate,
    Advance {
        amount: Decimal,
        paid_at: Option<DateTime<Utc>>,
    },
    Instalments {
        schedule: Vec<Instalment>,
    },
}

/// One instalment of a payment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instalment {
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentTerms {
    /// Serialize for the storage boundary; in memory the terms stay typed
    pub fn to_storage(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_storage(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// A sensitive edit recorded against an order, awaiting separate approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderChange {
    AddLine {
        variant_id: Uuid,
        quantity: i64,
        price: Decimal,
    },
    RemoveLine {
        line_id: Uuid,
    },
    ChangeQuantity {
        line_id: Uuid,
        quantity: i64,
    },
    ChangeDeliveryMode {
        delivery_mode: DeliveryMode,
    },
}

impl OrderChange {
    /// Serialize a change list for the storage boundary
    pub fn list_to_storage(changes: &[OrderChange]) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(changes)
    }

    pub fn list_from_storage(
        value: serde_json::Value,
    ) -> Result<Vec<OrderChange>, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Order aggregate root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub reference: String,
    pub barcode: String,
    pub version: OrderVersion,
    pub order_type: OrderType,
    pub delivery_mode: DeliveryMode,
    pub status: StepStatus,
    pub step: OrderStep,
    pub sub_total: Decimal,
    pub total: Decimal,
    pub storage_point_id: Uuid,
    /// Partial-fulfillment lineage: a child keeps the unfulfilled remainder
    pub parent_id: Option<Uuid>,
    pub purchase_order_id: Option<Uuid>,
    pub payment: PaymentTerms,
    pub changes_to_apply: Vec<OrderChange>,
    pub cancel_reason: Option<CancelReason>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cashed_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Current compound workflow state
    pub fn state(&self) -> crate::fulfillment::OrderState {
        crate::fulfillment::OrderState {
            status: self.status,
            step: self.step,
        }
    }
}

/// Line status within pick/pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    ToPickPack,
    Packed,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::ToPickPack => "to_pick_pack",
            ArticleStatus::Packed => "packed",
        }
    }
}

/// One order line, owned exclusively by one order version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleOrdered {
    pub id: Uuid,
    pub order_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i64,
    pub picked_quantity: i64,
    pub price: Decimal,
    pub discount: Decimal,
    pub status: ArticleStatus,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl ArticleOrdered {
    /// Net line total: (unit price - unit discount) * quantity
    pub fn line_total(&self) -> Decimal {
        (self.price - self.discount) * Decimal::from(self.quantity)
    }

    /// Net total for an arbitrary quantity of this line's article
    pub fn total_for(&self, quantity: i64) -> Decimal {
        (self.price - self.discount) * Decimal::from(quantity)
    }
}
