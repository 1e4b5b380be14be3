//! Inter-storage-point transfert sub-workflow.
//!
//! The fulfillment core creates transferts in PENDING and cancels or
//! detaches them; confirmation (picking/shipping) and validation (arrival)
//! are clerk actions arriving through this service's own endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::ledger;
use crate::services::reception;
use crate::services::reference::next_reference;
use crate::services::storage_point::default_location;
use shared::{
    DefaultLocation, IdentityContext, ReceptionType, ReferenceKind, StockBucket, StockOperation,
    Transfert, TransfertLine, TransfertStatus,
};

/// Transfert lifecycle service
#[derive(Clone)]
pub struct TransfertService {
    db: PgPool,
}

/// Transfert with its lines, for API responses
#[derive(Debug, Clone, Serialize)]
pub struct TransfertDetail {
    #[serde(flatten)]
    pub transfert: Transfert,
    pub lines: Vec<TransfertLine>,
}

#[derive(Debug, FromRow)]
struct TransfertRow {
    id: Uuid,
    reference: String,
    status: String,
    source_storage_point_id: Uuid,
    target_storage_point_id: Uuid,
    order_id: Option<Uuid>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransfertRow> for Transfert {
    type Error = AppError;

    fn try_from(row: TransfertRow) -> Result<Self, AppError> {
        let status = TransfertStatus::from_str(&row.status).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown transfert status {}", row.status))
        })?;
        Ok(Transfert {
            id: row.id,
            reference: row.reference,
            status,
            source_storage_point_id: row.source_storage_point_id,
            target_storage_point_id: row.target_storage_point_id,
            order_id: row.order_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransfertLineRow {
    id: Uuid,
    transfert_id: Uuid,
    variant_id: Uuid,
    quantity: i64,
    picked_quantity: i64,
    created_at: DateTime<Utc>,
}

impl From<TransfertLineRow> for TransfertLine {
    fn from(row: TransfertLineRow) -> Self {
        TransfertLine {
            id: row.id,
            transfert_id: row.transfert_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            picked_quantity: row.picked_quantity,
            created_at: row.created_at,
        }
    }
}

const TRANSFERT_COLUMNS: &str = "id, reference, status, source_storage_point_id, \
     target_storage_point_id, order_id, created_by, created_at, updated_at";

/// Load a transfert inside an existing transaction, locking its row
pub async fn get_transfert(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> AppResult<Transfert> {
    let row = sqlx::query_as::<_, TransfertRow>(&format!(
        "SELECT {} FROM transferts WHERE id = $1 FOR UPDATE",
        TRANSFERT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Transfert".to_string()))?;

    row.try_into()
}

/// Lines of a transfert inside an existing transaction
pub async fn get_lines(
    tx: &mut Transaction<'_, Postgres>,
    transfert_id: Uuid,
) -> AppResult<Vec<TransfertLine>> {
    let rows = sqlx::query_as::<_, TransfertLineRow>(
        r#"
        SELECT id, transfert_id, variant_id, quantity, picked_quantity, created_at
        FROM transfert_lines
        WHERE transfert_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(transfert_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Transferts weakly referencing an order, locked for the caller
pub async fn transferts_of_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> AppResult<Vec<Transfert>> {
    let rows = sqlx::query_as::<_, TransfertRow>(&format!(
        "SELECT {} FROM transferts WHERE order_id = $1 ORDER BY created_at FOR UPDATE",
        TRANSFERT_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// Create a PENDING transfert with its lines. Called by the allocation
/// planner's commit path, inside the placement transaction.
pub async fn create_pending(
    tx: &mut Transaction<'_, Postgres>,
    source_storage_point_id: Uuid,
    target_storage_point_id: Uuid,
    order_id: Option<Uuid>,
    lines: &[(Uuid, i64)],
    identity: &IdentityContext,
) -> AppResult<Transfert> {
    let reference = next_reference(tx, ReferenceKind::Transfert).await?;
    let row = sqlx::query_as::<_, TransfertRow>(&format!(
        r#"
        INSERT INTO transferts
            (id, reference, status, source_storage_point_id, target_storage_point_id,
             order_id, created_by)
        VALUES ($1, $2, 'pending', $3, $4, $5, $6)
        RETURNING {}
        "#,
        TRANSFERT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&reference)
    .bind(source_storage_point_id)
    .bind(target_storage_point_id)
    .bind(order_id)
    .bind(identity.user_id)
    .fetch_one(&mut **tx)
    .await?;

    for (variant_id, quantity) in lines {
        sqlx::query(
            r#"
            INSERT INTO transfert_lines (id, transfert_id, variant_id, quantity)
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
        transfert = %reference,
        source = %source_storage_point_id,
        target = %target_storage_point_id,
        lines = lines.len(),
        "transfert created"
    );

    row.try_into()
}

/// Cancel a PENDING transfert outright; no stock has moved yet
pub async fn cancel_pending(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE transferts SET status = 'canceled', updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict {
            resource: "transfert".to_string(),
            message: "Only a pending transfert can be cancelled outright".to_string(),
        });
    }
    Ok(())
}

/// Detach a transfert from its order without cancelling it. Used when the
/// order goes away but the stock movement already happened (VALIDATED).
pub async fn detach_from_order(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE transferts SET order_id = NULL, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

impl TransfertService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Transfert with lines
    pub async fn get(&self, id: Uuid) -> AppResult<TransfertDetail> {
        let mut tx = self.db.begin().await?;
        let transfert = get_transfert(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(TransfertDetail { transfert, lines })
    }

    /// Confirm a PENDING transfert: pick available units at the source and
    /// put them in transit toward the target's reception dock. Picks what
    /// physically exists; `picked_quantity` records the actual count.
    pub async fn confirm(&self, id: Uuid, _identity: &IdentityContext) -> AppResult<TransfertDetail> {
        let mut tx = self.db.begin().await?;

        let transfert = get_transfert(&mut tx, id).await?;
        if transfert.status != TransfertStatus::Pending {
            return Err(AppError::InvalidStateTransition(format!(
                "transfert {} is {}, expected pending",
                transfert.reference,
                transfert.status.as_str()
            )));
        }

        let dock =
            default_location(&mut tx, transfert.target_storage_point_id, DefaultLocation::Reception)
                .await?;

        let lines = get_lines(&mut tx, id).await?;
        for line in &lines {
            let picked = pick_line_items(
                &mut tx,
                &transfert,
                line.variant_id,
                line.quantity,
                dock.id,
            )
            .await?;
            sqlx::query("UPDATE transfert_lines SET picked_quantity = $2 WHERE id = $1")
                .bind(line.id)
                .bind(picked)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE transferts SET status = 'confirmed', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let transfert = get_transfert(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(transfert = %transfert.reference, "transfert confirmed");
        Ok(TransfertDetail { transfert, lines })
    }

    /// Validate a CONFIRMED transfert on arrival: units land on the target's
    /// reception dock and a PENDING reception is opened to absorb them.
    pub async fn validate(&self, id: Uuid, identity: &IdentityContext) -> AppResult<TransfertDetail> {
        let mut tx = self.db.begin().await?;

        let transfert = get_transfert(&mut tx, id).await?;
        if transfert.status != TransfertStatus::Confirmed {
            return Err(AppError::InvalidStateTransition(format!(
                "transfert {} is {}, expected confirmed",
                transfert.reference,
                transfert.status.as_str()
            )));
        }

        let lines = get_lines(&mut tx, id).await?;
        let expected: Vec<(Uuid, i64)> = lines
            .iter()
            .filter(|l| l.picked_quantity > 0)
            .map(|l| (l.variant_id, l.picked_quantity))
            .collect();

        let rec = reception::create_pending(
            &mut tx,
            transfert.target_storage_point_id,
            ReceptionType::Transfert,
            Some(transfert.id),
            None,
            transfert.order_id,
            &expected,
            identity,
        )
        .await?;

        // In-transit units become pending reception stock at the target
        let moved = sqlx::query_as::<_, (Uuid,)>(
            r#"
            UPDATE product_items
            SET state = 'pending_reception', reception_id = $2, updated_at = NOW()
            WHERE transfert_id = $1 AND state = 'in_transit'
            RETURNING variant_id
            "#,
        )
        .bind(id)
        .bind(rec.id)
        .fetch_all(&mut *tx)
        .await?;

        let mut counts: std::collections::HashMap<Uuid, i64> = std::collections::HashMap::new();
        for (variant_id,) in moved {
            *counts.entry(variant_id).or_default() += 1;
        }
        for (variant_id, count) in counts {
            ledger::apply_operations(
                &mut tx,
                variant_id,
                transfert.target_storage_point_id,
                &[
                    StockOperation::remove(StockBucket::InTransit, count),
                    StockOperation::add(StockBucket::PendingReception, count),
                ],
            )
            .await?;
        }

        sqlx::query("UPDATE transferts SET status = 'validated', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let transfert = get_transfert(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(transfert = %transfert.reference, reception = %rec.reference, "transfert validated");
        Ok(TransfertDetail { transfert, lines })
    }

    /// Cancel a PENDING transfert through the API
    pub async fn cancel(&self, id: Uuid, _identity: &IdentityContext) -> AppResult<TransfertDetail> {
        let mut tx = self.db.begin().await?;
        cancel_pending(&mut tx, id).await?;
        let transfert = get_transfert(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(TransfertDetail { transfert, lines })
    }
}

/// Pick up to `quantity` available units of a variant at the transfert's
/// source and put them in transit on the target's dock. Returns the picked
/// count, which may fall short of the request if stock moved since planning.
async fn pick_line_items(
    tx: &mut Transaction<'_, Postgres>,
    transfert: &Transfert,
    variant_id: Uuid,
    quantity: i64,
    dock_location_id: Uuid,
) -> AppResult<i64> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT pi.id
        FROM product_items pi
        JOIN locations l ON l.id = pi.location_id
        WHERE pi.variant_id = $1
          AND l.storage_point_id = $2
          AND pi.state = 'available'
        ORDER BY pi.barcode
        LIMIT $3
        FOR UPDATE OF pi SKIP LOCKED
        "#,
    )
    .bind(variant_id)
    .bind(transfert.source_storage_point_id)
    .bind(quantity)
    .fetch_all(&mut **tx)
    .await?;

    if ids.is_empty() {
        return Ok(0);
    }
    let picked = ids.len() as i64;

    sqlx::query(
        r#"
        UPDATE product_items
        SET state = 'in_transit', transfert_id = $2, location_id = $3, updated_at = NOW()
        WHERE id = ANY($1)
        "#,
    )
    .bind(&ids)
    .bind(transfert.id)
    .bind(dock_location_id)
    .execute(&mut **tx)
    .await?;

    ledger::apply_operations(
        tx,
        variant_id,
        transfert.source_storage_point_id,
        &[StockOperation::remove(StockBucket::Available, picked)],
    )
    .await?;
    ledger::apply_operations(
        tx,
        variant_id,
        transfert.target_storage_point_id,
        &[StockOperation::add(StockBucket::InTransit, picked)],
    )
    .await?;

    Ok(picked)
}
