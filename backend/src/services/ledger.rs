//! Quantity ledger: per-(variant, storage point) bucket rows on the variant
//! and product aggregates, mutated only through paired ADD/REMOVE operations.
//!
//! Every function here that moves a physical unit updates the item row and
//! both ledger rows in the same transaction; peripheral code never touches
//! the bucket columns directly.

use std::collections::HashMap;

use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::{
    check_invariant, ItemState, SourceStock, StepStatus, StockBucket, StockLevels, StockOperation,
};

/// Ledger read service for peripheral callers
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct StockRow {
    available: i64,
    reserved: i64,
    pending_reception: i64,
    in_transit: i64,
    delivery_processing: i64,
    delivered: i64,
    is_dead: i64,
    discovered: i64,
}

impl From<StockRow> for StockLevels {
    fn from(r: StockRow) -> Self {
        StockLevels {
            available: r.available,
            reserved: r.reserved,
            pending_reception: r.pending_reception,
            in_transit: r.in_transit,
            delivery_processing: r.delivery_processing,
            delivered: r.delivered,
            is_dead: r.is_dead,
            discovered: r.discovered,
        }
    }
}

const BUCKET_COLUMNS: &str = "available, reserved, pending_reception, in_transit, \
     delivery_processing, delivered, is_dead, discovered";

impl LedgerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Current bucket counts for one variant at one storage point
    pub async fn variant_levels(
        &self,
        variant_id: Uuid,
        storage_point_id: Uuid,
    ) -> AppResult<StockLevels> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {} FROM variant_stock WHERE variant_id = $1 AND storage_point_id = $2",
            BUCKET_COLUMNS
        ))
        .bind(variant_id)
        .bind(storage_point_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into).unwrap_or_default())
    }

    /// Current bucket counts for one product at one storage point
    pub async fn product_levels(
        &self,
        product_id: Uuid,
        storage_point_id: Uuid,
    ) -> AppResult<StockLevels> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {} FROM product_stock WHERE product_id = $1 AND storage_point_id = $2",
            BUCKET_COLUMNS
        ))
        .bind(product_id)
        .bind(storage_point_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into).unwrap_or_default())
    }
}

/// Lock and load the variant bucket row, creating it at zero if absent
async fn lock_variant_row(
    tx: &mut Transaction<'_, Postgres>,
    variant_id: Uuid,
    storage_point_id: Uuid,
) -> AppResult<StockLevels> {
    sqlx::query(
        r#"
        INSERT INTO variant_stock (variant_id, storage_point_id)
        VALUES ($1, $2)
        ON CONFLICT (variant_id, storage_point_id) DO NOTHING
        "#,
    )
    .bind(variant_id)
    .bind(storage_point_id)
    .execute(&mut **tx)
    .await?;

    let row = sqlx::query_as::<_, StockRow>(&format!(
        r#"
        SELECT {} FROM variant_stock
        WHERE variant_id = $1 AND storage_point_id = $2
        FOR UPDATE
        "#,
        BUCKET_COLUMNS
    ))
    .bind(variant_id)
    .bind(storage_point_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.into())
}

async fn lock_product_row(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    storage_point_id: Uuid,
) -> AppResult<StockLevels> {
    sqlx::query(
        r#"
        INSERT INTO product_stock (product_id, storage_point_id)
        VALUES ($1, $2)
        ON CONFLICT (product_id, storage_point_id) DO NOTHING
        "#,
    )
    .bind(product_id)
    .bind(storage_point_id)
    .execute(&mut **tx)
    .await?;

    let row = sqlx::query_as::<_, StockRow>(&format!(
        r#"
        SELECT {} FROM product_stock
        WHERE product_id = $1 AND storage_point_id = $2
        FOR UPDATE
        "#,
        BUCKET_COLUMNS
    ))
    .bind(product_id)
    .bind(storage_point_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.into())
}

async fn write_variant_row(
    tx: &mut Transaction<'_, Postgres>,
    variant_id: Uuid,
    storage_point_id: Uuid,
    levels: &StockLevels,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE variant_stock
        SET available = $3, reserved = $4, pending_reception = $5, in_transit = $6,
            delivery_processing = $7, delivered = $8, is_dead = $9, discovered = $10,
            updated_at = NOW()
        WHERE variant_id = $1 AND storage_point_id = $2
        "#,
    )
    .bind(variant_id)
    .bind(storage_point_id)
    .bind(levels.available)
    .bind(levels.reserved)
    .bind(levels.pending_reception)
    .bind(levels.in_transit)
    .bind(levels.delivery_processing)
    .bind(levels.delivered)
    .bind(levels.is_dead)
    .bind(levels.discovered)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn write_product_row(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    storage_point_id: Uuid,
    levels: &StockLevels,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE product_stock
        SET available = $3, reserved = $4, pending_reception = $5, in_transit = $6,
            delivery_processing = $7, delivered = $8, is_dead = $9, discovered = $10,
            updated_at = NOW()
        WHERE product_id = $1 AND storage_point_id = $2
        "#,
    )
    .bind(product_id)
    .bind(storage_point_id)
    .bind(levels.available)
    .bind(levels.reserved)
    .bind(levels.pending_reception)
    .bind(levels.in_transit)
    .bind(levels.delivery_processing)
    .bind(levels.delivered)
    .bind(levels.is_dead)
    .bind(levels.discovered)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Apply a batch of bucket deltas to one (variant, storage point) pair,
/// mirrored onto the variant's product aggregate. Rejects any batch that
/// would drive a bucket negative, without partial application.
pub async fn apply_operations(
    tx: &mut Transaction<'_, Postgres>,
    variant_id: Uuid,
    storage_point_id: Uuid,
    ops: &[StockOperation],
) -> AppResult<StockLevels> {
    if ops.is_empty() {
        return lock_variant_row(tx, variant_id, storage_point_id).await;
    }

    let product_id = sqlx::query_scalar::<_, Uuid>("SELECT product_id FROM variants WHERE id = $1")
        .bind(variant_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Variant".to_string()))?;

    let mut variant_levels = lock_variant_row(tx, variant_id, storage_point_id).await?;
    variant_levels.apply_all(ops)?;
    write_variant_row(tx, variant_id, storage_point_id, &variant_levels).await?;

    let mut product_levels = lock_product_row(tx, product_id, storage_point_id).await?;
    product_levels.apply_all(ops)?;
    write_product_row(tx, product_id, storage_point_id, &product_levels).await?;

    Ok(variant_levels)
}

/// Available-bucket snapshot per variant at one storage point
pub async fn availability_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    storage_point_id: Uuid,
    variant_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, i64>> {
    let rows = sqlx::query_as::<_, (Uuid, i64)>(
        r#"
        SELECT variant_id, available
        FROM variant_stock
        WHERE storage_point_id = $1 AND variant_id = ANY($2)
        "#,
    )
    .bind(storage_point_id)
    .bind(variant_ids)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Sibling storage points holding available stock of the given variants,
/// excluding the requesting storage point. Input for the allocation planner.
pub async fn sibling_sources(
    tx: &mut Transaction<'_, Postgres>,
    variant_ids: &[Uuid],
    exclude_storage_point_id: Uuid,
) -> AppResult<HashMap<Uuid, Vec<SourceStock>>> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, i32, i64)>(
        r#"
        SELECT vs.variant_id, vs.storage_point_id, sp.priority, vs.available
        FROM variant_stock vs
        JOIN storage_points sp ON sp.id = vs.storage_point_id
        WHERE vs.variant_id = ANY($1)
          AND vs.storage_point_id <> $2
          AND vs.available > 0
        ORDER BY sp.priority, vs.storage_point_id
        "#,
    )
    .bind(variant_ids)
    .bind(exclude_storage_point_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut sources: HashMap<Uuid, Vec<SourceStock>> = HashMap::new();
    for (variant_id, storage_point_id, priority, available) in rows {
        sources.entry(variant_id).or_default().push(SourceStock {
            storage_point_id,
            priority,
            available,
        });
    }
    Ok(sources)
}

/// Verify the accounting invariant for one (variant, storage point) pair:
/// the bucket sum must equal the number of item rows physically located in
/// the storage point's subtree (plus its in-transit units).
pub async fn verify_invariant(
    tx: &mut Transaction<'_, Postgres>,
    variant_id: Uuid,
    storage_point_id: Uuid,
) -> AppResult<()> {
    let row = sqlx::query_as::<_, StockRow>(&format!(
        "SELECT {} FROM variant_stock WHERE variant_id = $1 AND storage_point_id = $2",
        BUCKET_COLUMNS
    ))
    .bind(variant_id)
    .bind(storage_point_id)
    .fetch_optional(&mut **tx)
    .await?;
    let levels: StockLevels = row.map(Into::into).unwrap_or_default();

    let item_count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM product_items pi
        JOIN locations l ON l.id = pi.location_id
        WHERE pi.variant_id = $1 AND l.storage_point_id = $2
        "#,
    )
    .bind(variant_id)
    .bind(storage_point_id)
    .fetch_one(&mut **tx)
    .await?;

    check_invariant(&levels, item_count).map_err(|e| {
        AppError::ConsistencyViolation(format!(
            "variant {} at storage point {}: {}",
            variant_id, storage_point_id, e
        ))
    })
}

/// Reserve `quantity` available units of a variant within a storage point
/// for an order, oldest barcode first. Fails with `StaleAvailability` when
/// fewer units exist than the availability snapshot promised.
pub async fn reserve_items(
    tx: &mut Transaction<'_, Postgres>,
    variant_id: Uuid,
    storage_point_id: Uuid,
    quantity: i64,
    order_id: Uuid,
    status: StepStatus,
) -> AppResult<Vec<Uuid>> {
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
    .bind(storage_point_id)
    .bind(quantity)
    .fetch_all(&mut **tx)
    .await?;

    if (ids.len() as i64) < quantity {
        return Err(AppError::StaleAvailability(format!(
            "variant {}: wanted {} available units, found {}",
            variant_id,
            quantity,
            ids.len()
        )));
    }

    sqlx::query(
        r#"
        UPDATE product_items
        SET state = 'reserved', status = $2, order_id = $3, updated_at = NOW()
        WHERE id = ANY($1)
        "#,
    )
    .bind(&ids)
    .bind(status.as_str())
    .bind(order_id)
    .execute(&mut **tx)
    .await?;

    apply_operations(
        tx,
        variant_id,
        storage_point_id,
        &[
            StockOperation::remove(StockBucket::Available, quantity),
            StockOperation::add(StockBucket::Reserved, quantity),
        ],
    )
    .await?;

    Ok(ids)
}

/// Rows returned by bulk item transitions, grouped for ledger application
#[derive(Debug, FromRow)]
struct MovedItem {
    variant_id: Uuid,
    storage_point_id: Uuid,
}

/// Move every item of an order currently in `from` to `to`, optionally
/// relocating and re-statusing them, and apply the paired ledger movements
/// per (variant, storage point) group. Returns the number of units moved.
pub async fn transition_order_items(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    from: ItemState,
    to: ItemState,
    new_status: Option<StepStatus>,
    new_location_id: Option<Uuid>,
    clear_order: bool,
) -> AppResult<i64> {
    let moved = sqlx::query_as::<_, MovedItem>(
        r#"
        UPDATE product_items pi
        SET state = $3,
            status = COALESCE($4, pi.status),
            location_id = COALESCE($5, pi.location_id),
            order_id = CASE WHEN $6 THEN NULL ELSE pi.order_id END,
            updated_at = NOW()
        FROM locations l
        WHERE pi.order_id = $1
          AND pi.state = $2
          AND l.id = pi.location_id
        RETURNING pi.variant_id, l.storage_point_id
        "#,
    )
    .bind(order_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .bind(new_status.map(|s| s.as_str()))
    .bind(new_location_id)
    .bind(clear_order)
    .fetch_all(&mut **tx)
    .await?;

    // The RETURNING row carries the storage point of the *previous* location;
    // the REMOVE lands there and the ADD at the new location's storage point.
    let add_storage_point = match new_location_id {
        Some(location_id) => Some(
            sqlx::query_scalar::<_, Uuid>("SELECT storage_point_id FROM locations WHERE id = $1")
                .bind(location_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| AppError::NotFound("Location".to_string()))?,
        ),
        None => None,
    };

    let mut groups: HashMap<(Uuid, Uuid), i64> = HashMap::new();
    for item in &moved {
        *groups
            .entry((item.variant_id, item.storage_point_id))
            .or_default() += 1;
    }

    for ((variant_id, old_sp), count) in groups {
        let new_sp = add_storage_point.unwrap_or(old_sp);
        if old_sp == new_sp {
            if from.bucket() != to.bucket() {
                apply_operations(
                    tx,
                    variant_id,
                    old_sp,
                    &[
                        StockOperation::remove(from.bucket(), count),
                        StockOperation::add(to.bucket(), count),
                    ],
                )
                .await?;
            }
        } else {
            apply_operations(
                tx,
                variant_id,
                old_sp,
                &[StockOperation::remove(from.bucket(), count)],
            )
            .await?;
            apply_operations(
                tx,
                variant_id,
                new_sp,
                &[StockOperation::add(to.bucket(), count)],
            )
            .await?;
        }
    }

    Ok(moved.len() as i64)
}
