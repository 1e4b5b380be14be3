//! Stock intake sub-workflow.
//!
//! Receptions absorb every way units enter a storage point: transfert
//! arrivals, supplier deliveries, cancellation returns and customer returns.
//! Validation is the single point where pending units become real stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::ledger;
use crate::services::order;
use crate::services::reference::{next_barcode, next_reference};
use crate::services::storage_point::default_location;
use shared::{
    DefaultLocation, IdentityContext, Reception, ReceptionLine, ReceptionStatus, ReceptionType,
    ReferenceKind, StockBucket, StockOperation,
};

/// Reception lifecycle service
#[derive(Clone)]
pub struct ReceptionService {
    db: PgPool,
}

/// Reception with its lines, for API responses
#[derive(Debug, Clone, Serialize)]
pub struct ReceptionDetail {
    #[serde(flatten)]
    pub reception: Reception,
    pub lines: Vec<ReceptionLine>,
}

/// Actual received quantity per variant, carried by the validate request.
/// Only meaningful for purchase receptions; other types count what is
/// physically pending.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceivedLine {
    pub variant_id: Uuid,
    pub received_quantity: i64,
}

#[derive(Debug, FromRow)]
struct ReceptionRow {
    id: Uuid,
    reference: String,
    reception_type: String,
    status: String,
    storage_point_id: Uuid,
    transfert_id: Option<Uuid>,
    purchase_order_id: Option<Uuid>,
    order_id: Option<Uuid>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReceptionRow> for Reception {
    type Error = AppError;

    fn try_from(row: ReceptionRow) -> Result<Self, AppError> {
        let status = ReceptionStatus::from_str(&row.status).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown reception status {}", row.status))
        })?;
        let reception_type = match row.reception_type.as_str() {
            "transfert" => ReceptionType::Transfert,
            "purchase" => ReceptionType::Purchase,
            "order_cancellation" => ReceptionType::OrderCancellation,
            "customer_return" => ReceptionType::CustomerReturn,
            other => {
                return Err(AppError::ConsistencyViolation(format!(
                    "unknown reception type {other}"
                )))
            }
        };
        Ok(Reception {
            id: row.id,
            reference: row.reference,
            reception_type,
            status,
            storage_point_id: row.storage_point_id,
            transfert_id: row.transfert_id,
            purchase_order_id: row.purchase_order_id,
            order_id: row.order_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReceptionLineRow {
    id: Uuid,
    reception_id: Uuid,
    variant_id: Uuid,
    quantity: i64,
    received_quantity: i64,
    created_at: DateTime<Utc>,
}

impl From<ReceptionLineRow> for ReceptionLine {
    fn from(row: ReceptionLineRow) -> Self {
        ReceptionLine {
            id: row.id,
            reception_id: row.reception_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            received_quantity: row.received_quantity,
            created_at: row.created_at,
        }
    }
}

const RECEPTION_COLUMNS: &str = "id, reference, reception_type, status, storage_point_id, \
     transfert_id, purchase_order_id, order_id, created_by, created_at, updated_at";

pub async fn get_reception(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> AppResult<Reception> {
    let row = sqlx::query_as::<_, ReceptionRow>(&format!(
        "SELECT {} FROM receptions WHERE id = $1 FOR UPDATE",
        RECEPTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Reception".to_string()))?;

    row.try_into()
}

pub async fn get_lines(
    tx: &mut Transaction<'_, Postgres>,
    reception_id: Uuid,
) -> AppResult<Vec<ReceptionLine>> {
    let rows = sqlx::query_as::<_, ReceptionLineRow>(
        r#"
        SELECT id, reception_id, variant_id, quantity, received_quantity, created_at
        FROM reception_lines
        WHERE reception_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(reception_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Create a PENDING reception with expected lines
#[allow(clippy::too_many_arguments)]
pub async fn create_pending(
    tx: &mut Transaction<'_, Postgres>,
    storage_point_id: Uuid,
    reception_type: ReceptionType,
    transfert_id: Option<Uuid>,
    purchase_order_id: Option<Uuid>,
    order_id: Option<Uuid>,
    expected: &[(Uuid, i64)],
    identity: &IdentityContext,
) -> AppResult<Reception> {
    let reference = next_reference(tx, ReferenceKind::Reception).await?;
    let row = sqlx::query_as::<_, ReceptionRow>(&format!(
        r#"
        INSERT INTO receptions
            (id, reference, reception_type, status, storage_point_id,
             transfert_id, purchase_order_id, order_id, created_by)
        VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        RECEPTION_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&reference)
    .bind(reception_type.as_str())
    .bind(storage_point_id)
    .bind(transfert_id)
    .bind(purchase_order_id)
    .bind(order_id)
    .bind(identity.user_id)
    .fetch_one(&mut **tx)
    .await?;

    for (variant_id, quantity) in expected {
        sqlx::query(
            r#"
            INSERT INTO reception_lines (id, reception_id, variant_id, quantity)
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
        reception = %reference,
        kind = reception_type.as_str(),
        storage_point = %storage_point_id,
        "reception created"
    );

    row.try_into()
}

impl ReceptionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<ReceptionDetail> {
        let mut tx = self.db.begin().await?;
        let reception = get_reception(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(ReceptionDetail { reception, lines })
    }

    /// Pending receptions at a storage point
    pub async fn list_pending(&self, storage_point_id: Uuid) -> AppResult<Vec<Reception>> {
        let rows = sqlx::query_as::<_, ReceptionRow>(&format!(
            "SELECT {} FROM receptions \
             WHERE storage_point_id = $1 AND status = 'pending' ORDER BY created_at",
            RECEPTION_COLUMNS
        ))
        .bind(storage_point_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Validate a PENDING reception.
    ///
    /// Purchase receptions mint new units for the received quantities.
    /// Every other type flips the units already parked in pending reception:
    /// order-bound units go back to reserved, free units become available.
    /// Afterwards any order waiting on this intake is advanced.
    pub async fn validate(
        &self,
        id: Uuid,
        received: Option<&[ReceivedLine]>,
        identity: &IdentityContext,
    ) -> AppResult<ReceptionDetail> {
        let mut tx = self.db.begin().await?;

        let reception = get_reception(&mut tx, id).await?;
        if reception.status != ReceptionStatus::Pending {
            return Err(AppError::InvalidStateTransition(format!(
                "reception {} is {}, expected pending",
                reception.reference,
                reception.status.as_str()
            )));
        }

        match reception.reception_type {
            ReceptionType::Purchase => {
                mint_purchased_units(&mut tx, &reception, received).await?;
            }
            _ => {
                absorb_pending_units(&mut tx, &reception).await?;
            }
        }

        sqlx::query("UPDATE receptions SET status = 'validated', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // An order waiting for this intake can now move forward
        if let Some(order_id) = reception.order_id {
            match reception.reception_type {
                ReceptionType::Transfert | ReceptionType::Purchase => {
                    order::try_fulfill_sourcing(&mut tx, order_id, identity).await?;
                    order::on_reception_validated(&mut tx, order_id, identity).await?;
                }
                _ => {}
            }
        }

        let reception = get_reception(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(reception = %reception.reference, "reception validated");
        Ok(ReceptionDetail { reception, lines })
    }

    /// Cancel a PENDING reception that holds no physical units yet.
    ///
    /// Intakes with units already parked in pending reception cannot be
    /// cancelled here; those units have to be absorbed or written off first.
    pub async fn cancel(&self, id: Uuid, _identity: &IdentityContext) -> AppResult<ReceptionDetail> {
        let mut tx = self.db.begin().await?;

        let reception = get_reception(&mut tx, id).await?;
        if reception.status != ReceptionStatus::Pending {
            return Err(AppError::InvalidStateTransition(format!(
                "reception {} is {}, expected pending",
                reception.reference,
                reception.status.as_str()
            )));
        }

        let parked = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM product_items WHERE reception_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if parked > 0 {
            return Err(AppError::Conflict {
                resource: "reception".to_string(),
                message: format!(
                    "Reception {} holds {} parked units and cannot be cancelled",
                    reception.reference, parked
                ),
            });
        }

        sqlx::query("UPDATE receptions SET status = 'canceled', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let reception = get_reception(&mut tx, id).await?;
        let lines = get_lines(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(reception = %reception.reference, "reception cancelled");
        Ok(ReceptionDetail { reception, lines })
    }
}

/// Flip units parked in pending reception on this intake into real stock.
/// Units still bound to a live order return to reserved and move to the
/// preparation area; free units become available where they stand.
async fn absorb_pending_units(
    tx: &mut Transaction<'_, Postgres>,
    reception: &Reception,
) -> AppResult<()> {
    let prep =
        default_location(tx, reception.storage_point_id, DefaultLocation::Preparation).await?;

    let bound = sqlx::query_as::<_, (Uuid,)>(
        r#"
        UPDATE product_items
        SET state = 'reserved', location_id = $2, updated_at = NOW()
        WHERE reception_id = $1 AND state = 'pending_reception' AND order_id IS NOT NULL
        RETURNING variant_id
        "#,
    )
    .bind(reception.id)
    .bind(prep.id)
    .fetch_all(&mut **tx)
    .await?;

    let free = sqlx::query_as::<_, (Uuid,)>(
        r#"
        UPDATE product_items
        SET state = 'available', updated_at = NOW()
        WHERE reception_id = $1 AND state = 'pending_reception' AND order_id IS NULL
        RETURNING variant_id
        "#,
    )
    .bind(reception.id)
    .fetch_all(&mut **tx)
    .await?;

    let mut received: HashMap<Uuid, i64> = HashMap::new();

    let mut counts: HashMap<Uuid, i64> = HashMap::new();
    for (variant_id,) in bound {
        *counts.entry(variant_id).or_default() += 1;
    }
    for (&variant_id, &count) in &counts {
        *received.entry(variant_id).or_default() += count;
        ledger::apply_operations(
            tx,
            variant_id,
            reception.storage_point_id,
            &[
                StockOperation::remove(StockBucket::PendingReception, count),
                StockOperation::add(StockBucket::Reserved, count),
            ],
        )
        .await?;
    }

    let mut counts: HashMap<Uuid, i64> = HashMap::new();
    for (variant_id,) in free {
        *counts.entry(variant_id).or_default() += 1;
    }
    for (&variant_id, &count) in &counts {
        *received.entry(variant_id).or_default() += count;
        ledger::apply_operations(
            tx,
            variant_id,
            reception.storage_point_id,
            &[
                StockOperation::remove(StockBucket::PendingReception, count),
                StockOperation::add(StockBucket::Available, count),
            ],
        )
        .await?;
    }

    for (variant_id, count) in received {
        sqlx::query(
            "UPDATE reception_lines SET received_quantity = $3 \
             WHERE reception_id = $1 AND variant_id = $2",
        )
        .bind(reception.id)
        .bind(variant_id)
        .bind(count)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Mint new units for a supplier delivery. The received quantities default
/// to the ordered ones; short or over deliveries adjust per line.
async fn mint_purchased_units(
    tx: &mut Transaction<'_, Postgres>,
    reception: &Reception,
    received: Option<&[ReceivedLine]>,
) -> AppResult<()> {
    let dock = default_location(tx, reception.storage_point_id, DefaultLocation::Reception).await?;
    let lines = get_lines(tx, reception.id).await?;

    let overrides: HashMap<Uuid, i64> = received
        .unwrap_or_default()
        .iter()
        .map(|r| (r.variant_id, r.received_quantity))
        .collect();

    for line in &lines {
        let count = *overrides.get(&line.variant_id).unwrap_or(&line.quantity);
        if count < 0 {
            return Err(AppError::Validation {
                field: "received_quantity".to_string(),
                message: "Received quantity must not be negative".to_string(),
            });
        }

        for _ in 0..count {
            let barcode = next_barcode(tx, ReferenceKind::ProductItem).await?;
            sqlx::query(
                r#"
                INSERT INTO product_items
                    (id, barcode, variant_id, state, location_id, reception_id)
                VALUES ($1, $2, $3, 'available', $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&barcode)
            .bind(line.variant_id)
            .bind(dock.id)
            .bind(reception.id)
            .execute(&mut **tx)
            .await?;
        }

        if count > 0 {
            // Entering units, the one unpaired addition the ledger allows
            ledger::apply_operations(
                tx,
                line.variant_id,
                reception.storage_point_id,
                &[StockOperation::add(StockBucket::Available, count)],
            )
            .await?;
        }

        sqlx::query("UPDATE reception_lines SET received_quantity = $2 WHERE id = $1")
            .bind(line.id)
            .bind(count)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}
