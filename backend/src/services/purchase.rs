//! Procurement sub-workflow for shortfall no sibling storage point covers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::reception;
use crate::services::reference::next_reference;
use shared::{
    IdentityContext, PurchaseLine, PurchaseOrder, PurchaseStatus, ReceptionType, ReferenceKind,
};

/// Purchase order lifecycle service
#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
}

/// Purchase order with its lines, for API responses
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseDetail {
    #[serde(flatten)]
    pub purchase: PurchaseOrder,
    pub lines: Vec<PurchaseLine>,
}

/// Unit cost assignment carried by the save request
#[derive(Debug, Clone, Deserialize)]
pub struct LineCost {
    pub variant_id: Uuid,
    pub unit_cost: Decimal,
}

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: Uuid,
    reference: String,
    status: String,
    storage_point_id: Uuid,
    order_id: Option<Uuid>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for PurchaseOrder {
    type Error = AppError;

    fn try_from(row: PurchaseRow) -> Result<Self, AppError> {
        let status = PurchaseStatus::from_str(&row.status).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown purchase status {}", row.status))
        })?;
        Ok(PurchaseOrder {
            id: row.id,
            reference: row.reference,
            status,
            storage_point_id: row.storage_point_id,
            order_id: row.order_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PurchaseLineRow {
    id: Uuid,
    purchase_order_id: Uuid,
    variant_id: Uuid,
    quantity: i64,
    unit_cost: Option<Decimal>,
    created_at: DateTime<Utc>,
}

impl From<PurchaseLineRow> for PurchaseLine {
    fn from(row: PurchaseLineRow) -> Self {
        PurchaseLine {
            id: row.id,
            purchase_order_id: row.purchase_order_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            created_at: row.created_at,
        }
    }
}

const PURCHASE_COLUMNS: &str =
    "id, reference, status, storage_point_id, order_id, created_by, created_at, updated_at";

/// Load a purchase order inside an existing transaction, locking its row
pub async fn get_purchase(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> AppResult<PurchaseOrder> {
    let row = sqlx::query_as::<_, PurchaseRow>(&format!(
        "SELECT {} FROM purchase_orders WHERE id = $1 FOR UPDATE",
        PURCHASE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

    row.try_into()
}

pub async fn get_lines(
    tx: &mut Transaction<'_, Postgres>,
    purchase_order_id: Uuid,
) -> AppResult<Vec<PurchaseLine>> {
    let rows = sqlx::query_as::<_, PurchaseLineRow>(
        r#"
        SELECT id, purchase_order_id, variant_id, quantity, unit_cost, created_at
        FROM purchase_lines
        WHERE purchase_order_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(purchase_order_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Purchase orders weakly referencing an order, locked for the caller
pub async fn purchases_of_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> AppResult<Vec<PurchaseOrder>> {
    let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
        "SELECT {} FROM purchase_orders WHERE order_id = $1 ORDER BY created_at FOR UPDATE",
        PURCHASE_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// Create a PENDING purchase order with its lines. Called by the allocation
/// planner's commit path, inside the placement transaction.
pub async fn create_pending(
    tx: &mut Transaction<'_, Postgres>,
    storage_point_id: Uuid,
    order_id: Option<Uuid>,
    lines: &[(Uuid, i64)],
    identity: &IdentityContext,
) -> AppResult<PurchaseOrder> {
    let reference = next_reference(tx, ReferenceKind::PurchaseOrder).await?;
    let row = sqlx::query_as::<_, PurchaseRow>(&format!(
        r#"
        INSERT INTO purchase_orders (id, reference, status, storage_point_id, order_id, created_by)
        VALUES ($1, $2, 'pending', $3, $4, $5)
        RETURNING {}
        "#,
        PURCHASE_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&reference)
    .bind(storage_point_id)
    .bind(order_id)
    .bind(identity.user_id)
    .fetch_one(&mut **tx)
    .await?;

    for (variant_id, quantity) in lines {
        sqlx::query(
            r#"
            INSERT INTO purchase_lines (id, purchase_order_id, variant_id, quantity)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.id)
        .bind(variant_id)
        .bind(quantity)
        .execute(&mut **tx)
        .await?;
    }

    tracing::info!(
        purchase = %reference,
        storage_point = %storage_point_id,
        lines = lines.len(),
        "purchase order created"
    );

    row.try_into()
}

/// Cancel a purchase order if it has not been validated yet
pub async fn cancel_if_cancellable(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<()> {
    let purchase = get_purchase(tx, id).await?;
    if !purchase.status.is_cancellable() {
        return Err(AppError::Conflict {
            resource: "purchase_order".to_string(),
            message: format!(
                "Purchase order {} is {} and can no longer be cancelled",
                purchase.reference,
                purchase.status.as_str()
            ),
        });
    }
    sqlx::query("UPDATE purchase_orders SET status = 'canceled', updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Detach a purchase order from its order without cancelling it
pub async fn detach_from_order(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE purchase_orders SET order_id = NULL, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

impl PurchaseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<PurchaseDetail> {
        let mut tx = self.db.begin().await?;
        let purchase = get_purchase(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(PurchaseDetail { purchase, lines })
    }

    /// Save a PENDING purchase order: record negotiated unit costs and mark
    /// it ready to be sent to the supplier.
    pub async fn save(
        &self,
        id: Uuid,
        costs: &[LineCost],
        _identity: &IdentityContext,
    ) -> AppResult<PurchaseDetail> {
        let mut tx = self.db.begin().await?;

        let purchase = get_purchase(&mut tx, id).await?;
        if purchase.status != PurchaseStatus::Pending {
            return Err(AppError::InvalidStateTransition(format!(
                "purchase order {} is {}, expected pending",
                purchase.reference,
                purchase.status.as_str()
            )));
        }

        for cost in costs {
            if cost.unit_cost < Decimal::ZERO {
                return Err(AppError::Validation {
                    field: "unit_cost".to_string(),
                    message: "Unit cost must not be negative".to_string(),
                });
            }
            sqlx::query(
                "UPDATE purchase_lines SET unit_cost = $3 \
                 WHERE purchase_order_id = $1 AND variant_id = $2",
            )
            .bind(id)
            .bind(cost.variant_id)
            .bind(cost.unit_cost)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE purchase_orders SET status = 'saved', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let purchase = get_purchase(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(purchase = %purchase.reference, "purchase order saved");
        Ok(PurchaseDetail { purchase, lines })
    }

    /// Validate a SAVED purchase order: the supplier shipment is due, so a
    /// PENDING reception is opened at the destination for the ordered
    /// quantities. Units only enter stock when that reception is validated.
    pub async fn validate(&self, id: Uuid, identity: &IdentityContext) -> AppResult<PurchaseDetail> {
        let mut tx = self.db.begin().await?;

        let purchase = get_purchase(&mut tx, id).await?;
        if purchase.status != PurchaseStatus::Saved {
            return Err(AppError::InvalidStateTransition(format!(
                "purchase order {} is {}, expected saved",
                purchase.reference,
                purchase.status.as_str()
            )));
        }

        let lines = get_lines(&mut tx, id).await?;
        let expected: Vec<(Uuid, i64)> =
            lines.iter().map(|l| (l.variant_id, l.quantity)).collect();

        let rec = reception::create_pending(
            &mut tx,
            purchase.storage_point_id,
            ReceptionType::Purchase,
            None,
            Some(purchase.id),
            purchase.order_id,
            &expected,
            identity,
        )
        .await?;

        sqlx::query(
            "UPDATE purchase_orders SET status = 'validated', updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let purchase = get_purchase(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(purchase = %purchase.reference, reception = %rec.reference, "purchase order validated");
        Ok(PurchaseDetail { purchase, lines })
    }

    /// Cancel a purchase order through the API
    pub async fn cancel(&self, id: Uuid, _identity: &IdentityContext) -> AppResult<PurchaseDetail> {
        let mut tx = self.db.begin().await?;
        cancel_if_cancellable(&mut tx, id).await?;
        let purchase = get_purchase(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(PurchaseDetail { purchase, lines })
    }
}
