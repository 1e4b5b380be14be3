//! Order processing audit intervals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::{OrderStep, StepStatus};

/// One interval of the order's durable audit trail.
///
/// Exactly one open record (ended_at = NULL) exists per order at any time;
/// every workflow transition closes it and opens a new one. Closed records
/// are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProcessing {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reference: String,
    pub status: StepStatus,
    pub step: OrderStep,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
