//! Order processing audit trail: one open interval per order, closed and
//! reopened on every workflow transition

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::reference::next_reference;
use shared::{OrderProcessing, OrderState, OrderStep, ReferenceKind, StepStatus};

/// Read service for the audit trail
#[derive(Clone)]
pub struct ProcessingService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct ProcessingRow {
    id: Uuid,
    order_id: Uuid,
    reference: String,
    status: String,
    step: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProcessingRow> for OrderProcessing {
    type Error = AppError;

    fn try_from(row: ProcessingRow) -> Result<Self, AppError> {
        let status = StepStatus::from_str(&row.status).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown processing status {}", row.status))
        })?;
        let step = OrderStep::from_str(&row.step).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown processing step {}", row.step))
        })?;
        Ok(OrderProcessing {
            id: row.id,
            order_id: row.order_id,
            reference: row.reference,
            status,
            step,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}

impl ProcessingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Full audit trail of an order, oldest interval first
    pub async fn trail(&self, order_id: Uuid) -> AppResult<Vec<OrderProcessing>> {
        let rows = sqlx::query_as::<_, ProcessingRow>(
            r#"
            SELECT id, order_id, reference, status, step, started_at, ended_at
            FROM order_processings
            WHERE order_id = $1
            ORDER BY started_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Close the currently-open interval, if any. Returns whether one was open.
pub async fn close_open_interval(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE order_processings SET ended_at = NOW() WHERE order_id = $1 AND ended_at IS NULL",
    )
    .bind(order_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Open a fresh interval for the new workflow state
pub async fn open_interval(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    state: OrderState,
) -> AppResult<()> {
    let reference = next_reference(tx, ReferenceKind::OrderProcessing).await?;
    sqlx::query(
        r#"
        INSERT INTO order_processings (id, order_id, reference, status, step, started_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(reference)
    .bind(state.status.as_str())
    .bind(state.step.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Mandatory bookkeeping for every workflow transition: close the open
/// interval and open one for the new state.
pub async fn record_transition(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    new_state: OrderState,
) -> AppResult<()> {
    close_open_interval(tx, order_id).await?;
    open_interval(tx, order_id, new_state).await
}
