//! Order orchestration: placement, pick-pack validation with partial split,
//! delivery lifecycle and sourcing follow-up.
//!
//! Every workflow move goes through the shared transition table and records
//! an audit interval; every ledger effect happens in the same transaction as
//! the state change.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::FulfillmentConfig;
use crate::error::{AppError, AppResult};
use crate::services::reference::{next_barcode, next_reference};
use crate::services::storage_point::{default_location, get_storage_point};
use crate::services::{allocation, availability, ledger, processing, purchase, transfert};
use shared::{
    next_state, placement_state, plan_allocation, split_order, validate_instalments,
    validate_line_requests, validate_pricing, ArticleOrdered, ArticleStatus, AvailabilityReport,
    AvailabilityStatus, CancelReason, DefaultLocation, DeliveryMode, IdentityContext, ItemState,
    LineRequest, Order, OrderChange, OrderEvent, OrderState, OrderStep, OrderType, OrderVersion,
    PaymentTerms, PlacementOutcome, PurchaseOrder, ReceptionType, ReferenceKind, StepStatus,
    StockBucket, StockOperation, Transfert,
};

/// Order orchestration service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    fulfillment: FulfillmentConfig,
}

/// One requested line at placement
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceLineRequest {
    pub variant_id: Uuid,
    pub quantity: i64,
    pub price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
}

/// Order placement request
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub storage_point_id: Uuid,
    pub delivery_mode: DeliveryMode,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    pub lines: Vec<PlaceLineRequest>,
    #[serde(default)]
    pub payment: PaymentTerms,
    /// Availability the caller resolved before placing; placement fails with
    /// a stale-availability conflict when it no longer holds under lock
    #[serde(default)]
    pub expected_availability: Option<AvailabilityStatus>,
}

fn default_order_type() -> OrderType {
    OrderType::Default
}

/// Per-line picked count reported by the pick-pack clerk
#[derive(Debug, Clone, Deserialize)]
pub struct PickedLine {
    pub line_id: Uuid,
    pub picked_quantity: i64,
}

/// Order with its lines, for API responses
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub lines: Vec<ArticleOrdered>,
}

/// Placement response: the created order plus how sourcing resolved
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    #[serde(flatten)]
    pub order: Order,
    pub lines: Vec<ArticleOrdered>,
    pub availability: AvailabilityReport,
    pub outcome: PlacementOutcome,
    pub transferts: Vec<Transfert>,
    pub purchase_order: Option<PurchaseOrder>,
}

/// Validation response: the validated parent and the child carrying any
/// unfulfilled remainder
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedOrder {
    #[serde(flatten)]
    pub order: Order,
    pub lines: Vec<ArticleOrdered>,
    pub child: Option<OrderDetail>,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    reference: String,
    barcode: String,
    version: String,
    order_type: String,
    delivery_mode: String,
    status: String,
    step: String,
    sub_total: Decimal,
    total: Decimal,
    storage_point_id: Uuid,
    parent_id: Option<Uuid>,
    purchase_order_id: Option<Uuid>,
    payment: serde_json::Value,
    changes_to_apply: serde_json::Value,
    cancel_reason: Option<String>,
    canceled_at: Option<DateTime<Utc>>,
    cashed_at: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn bad_enum(column: &str, value: &str) -> AppError {
    AppError::ConsistencyViolation(format!("unknown order {column} {value}"))
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, AppError> {
        let version = match row.version.as_str() {
            "current" => OrderVersion::Current,
            "previous" => OrderVersion::Previous,
            other => return Err(bad_enum("version", other)),
        };
        let order_type = match row.order_type.as_str() {
            "default" => OrderType::Default,
            "dead_stock" => OrderType::DeadStock,
            "destockage" => OrderType::Destockage,
            "magento" => OrderType::Magento,
            other => return Err(bad_enum("type", other)),
        };
        let delivery_mode = match row.delivery_mode.as_str() {
            "at_home" => DeliveryMode::AtHome,
            "in_agency" => DeliveryMode::InAgency,
            other => return Err(bad_enum("delivery mode", other)),
        };
        let status =
            StepStatus::from_str(&row.status).ok_or_else(|| bad_enum("status", &row.status))?;
        let step = OrderStep::from_str(&row.step).ok_or_else(|| bad_enum("step", &row.step))?;
        let cancel_reason = match row.cancel_reason.as_deref() {
            None => None,
            Some("customer_request") => Some(CancelReason::CustomerRequest),
            Some("out_of_stock") => Some(CancelReason::OutOfStock),
            Some("delivery_failed") => Some(CancelReason::DeliveryFailed),
            Some("duplicate") => Some(CancelReason::Duplicate),
            Some("other") => Some(CancelReason::Other),
            Some(other) => return Err(bad_enum("cancel reason", other)),
        };
        let payment = PaymentTerms::from_storage(row.payment)
            .map_err(|e| AppError::ConsistencyViolation(format!("order payment blob: {e}")))?;
        let changes_to_apply = OrderChange::list_from_storage(row.changes_to_apply)
            .map_err(|e| AppError::ConsistencyViolation(format!("order changes blob: {e}")))?;

        Ok(Order {
            id: row.id,
            reference: row.reference,
            barcode: row.barcode,
            version,
            order_type,
            delivery_mode,
            status,
            step,
            sub_total: row.sub_total,
            total: row.total,
            storage_point_id: row.storage_point_id,
            parent_id: row.parent_id,
            purchase_order_id: row.purchase_order_id,
            payment,
            changes_to_apply,
            cancel_reason,
            canceled_at: row.canceled_at,
            cashed_at: row.cashed_at,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: Uuid,
    order_id: Uuid,
    variant_id: Uuid,
    quantity: i64,
    picked_quantity: i64,
    price: Decimal,
    discount: Decimal,
    status: String,
    position: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<LineRow> for ArticleOrdered {
    type Error = AppError;

    fn try_from(row: LineRow) -> Result<Self, AppError> {
        let status = match row.status.as_str() {
            "to_pick_pack" => ArticleStatus::ToPickPack,
            "packed" => ArticleStatus::Packed,
            other => return Err(bad_enum("line status", other)),
        };
        Ok(ArticleOrdered {
            id: row.id,
            order_id: row.order_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            picked_quantity: row.picked_quantity,
            price: row.price,
            discount: row.discount,
            status,
            position: row.position,
            created_at: row.created_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, reference, barcode, version, order_type, delivery_mode, \
     status, step, sub_total, total, storage_point_id, parent_id, purchase_order_id, \
     payment, changes_to_apply, cancel_reason, canceled_at, cashed_at, created_by, \
     created_at, updated_at";

const LINE_COLUMNS: &str = "id, order_id, variant_id, quantity, picked_quantity, price, \
     discount, status, position, created_at";

/// Load an order inside an existing transaction, locking its row. Workflow
/// operations always start here: the lock gives at-most-one concurrent
/// mutation per order.
pub async fn get_order(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<Order> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

    row.try_into()
}

pub async fn get_order_lines(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> AppResult<Vec<ArticleOrdered>> {
    let rows = sqlx::query_as::<_, LineRow>(&format!(
        "SELECT {} FROM article_ordered WHERE order_id = $1 ORDER BY position",
        LINE_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// Persist a workflow move and record its audit interval
async fn apply_transition(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    event: OrderEvent,
) -> AppResult<OrderState> {
    let next = next_state(order.state(), event)?;
    sqlx::query("UPDATE orders SET status = $2, step = $3, updated_at = NOW() WHERE id = $1")
        .bind(order.id)
        .bind(next.status.as_str())
        .bind(next.step.as_str())
        .execute(&mut **tx)
        .await?;
    processing::record_transition(tx, order.id, next).await?;

    tracing::info!(
        order = %order.reference,
        from = %order.state(),
        to = %next,
        event = event.name(),
        "order transition"
    );
    Ok(next)
}

async fn insert_line(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    variant_id: Uuid,
    quantity: i64,
    price: Decimal,
    discount: Decimal,
    position: i32,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO article_ordered
            (id, order_id, variant_id, quantity, price, discount, status, position)
        VALUES ($1, $2, $3, $4, $5, $6, 'to_pick_pack', $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(variant_id)
    .bind(quantity)
    .bind(price)
    .bind(discount)
    .bind(position)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_totals(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    sub_total: Decimal,
    total: Decimal,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE orders SET sub_total = $2, total = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(order_id)
    .bind(sub_total)
    .bind(total)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Edits only apply while the order is still sourcing or awaiting pick-pack
fn check_editable(order: &Order) -> AppResult<()> {
    let editable = matches!(
        order.status,
        StepStatus::ToPickPack | StepStatus::ToTransfer | StepStatus::ToTreat | StepStatus::ToBuy
    );
    if !editable {
        return Err(AppError::Conflict {
            resource: "order".to_string(),
            message: format!(
                "Order {} is {}; changes apply only before pick-pack validation",
                order.reference,
                order.state()
            ),
        });
    }
    Ok(())
}

/// Reserved unit counts per variant for an order
async fn reserved_counts(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> AppResult<HashMap<Uuid, i64>> {
    let rows = sqlx::query_as::<_, (Uuid, i64)>(
        r#"
        SELECT variant_id, COUNT(*)
        FROM product_items
        WHERE order_id = $1 AND state = 'reserved'
        GROUP BY variant_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Whether every reserved unit of the order sits in the order's own storage
/// point. Decides READY versus the in-transit leg at validation.
async fn fulfilled_in_own_storage_point(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> AppResult<bool> {
    let elsewhere = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM product_items pi
        JOIN locations l ON l.id = pi.location_id
        WHERE pi.order_id = $1 AND pi.state = 'reserved' AND l.storage_point_id <> $2
        "#,
    )
    .bind(order.id)
    .bind(order.storage_point_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(elsewhere == 0)
}

/// Advance a sourcing order once its spawned transferts/purchases have
/// landed stock. Reserves the still-missing units and fires the
/// sourcing-fulfilled transition when the order's storage point now covers
/// everything; otherwise leaves the order waiting for the next intake.
pub async fn try_fulfill_sourcing(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    _identity: &IdentityContext,
) -> AppResult<bool> {
    let order = get_order(tx, order_id).await?;
    let sourcing = matches!(
        order.status,
        StepStatus::ToTransfer | StepStatus::ToTreat | StepStatus::ToBuy
    );
    if !sourcing {
        return Ok(false);
    }

    let lines = get_order_lines(tx, order_id).await?;
    let reserved = reserved_counts(tx, order_id).await?;

    let missing: Vec<LineRequest> = lines
        .iter()
        .filter_map(|line| {
            let already = reserved.get(&line.variant_id).copied().unwrap_or(0);
            let need = line.quantity - already;
            (need > 0).then_some(LineRequest {
                variant_id: line.variant_id,
                quantity: need,
            })
        })
        .collect();

    if !missing.is_empty() {
        let pairs: Vec<(Uuid, Uuid)> = missing
            .iter()
            .map(|l| (l.variant_id, order.storage_point_id))
            .collect();
        allocation::lock_pairs(tx, &pairs).await?;

        let report = availability::resolve_in_tx(tx, order.storage_point_id, &missing).await?;
        if report.status != AvailabilityStatus::All {
            return Ok(false);
        }
        for line in &missing {
            ledger::reserve_items(
                tx,
                line.variant_id,
                order.storage_point_id,
                line.quantity,
                order.id,
                StepStatus::ToPickPack,
            )
            .await?;
        }
    }

    apply_transition(tx, &order, OrderEvent::SourcingFulfilled).await?;
    Ok(true)
}

/// Advance an order waiting on its arrival reception. No-op for orders in
/// any other state; reception validation calls this unconditionally.
pub async fn on_reception_validated(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    _identity: &IdentityContext,
) -> AppResult<bool> {
    let order = get_order(tx, order_id).await?;
    if order.state() != OrderState::new(StepStatus::ToReceived, OrderStep::AwaitingReception) {
        return Ok(false);
    }

    apply_transition(
        tx,
        &order,
        OrderEvent::ReceptionValidated {
            delivery_mode: order.delivery_mode,
        },
    )
    .await?;
    Ok(true)
}

impl OrderService {
    pub fn new(db: PgPool, fulfillment: FulfillmentConfig) -> Self {
        Self { db, fulfillment }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;
        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    /// Current orders at a storage point, newest first
    pub async fn list(&self, storage_point_id: Uuid) -> AppResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders \
             WHERE storage_point_id = $1 AND version = 'current' \
             ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(storage_point_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Place an order: resolve availability, reserve what the storage point
    /// covers, and spawn transferts/purchases for the rest, all in one
    /// transaction serialized per (variant, storage point).
    pub async fn place(
        &self,
        request: &PlaceOrderRequest,
        identity: &IdentityContext,
    ) -> AppResult<PlacedOrder> {
        let line_requests: Vec<LineRequest> = request
            .lines
            .iter()
            .map(|l| LineRequest {
                variant_id: l.variant_id,
                quantity: l.quantity,
            })
            .collect();
        validate_line_requests(&line_requests)
            .map_err(|msg| AppError::ValidationError(msg.to_string()))?;
        for line in &request.lines {
            validate_pricing(line.price, line.discount)
                .map_err(|msg| AppError::ValidationError(msg.to_string()))?;
        }
        if let PaymentTerms::Instalments { schedule } = &request.payment {
            validate_instalments(schedule)
                .map_err(|msg| AppError::ValidationError(msg.to_string()))?;
        }

        let mut tx = self.db.begin().await?;

        // Unknown storage point fails before anything is written
        get_storage_point(&mut tx, request.storage_point_id).await?;

        let pairs: Vec<(Uuid, Uuid)> = line_requests
            .iter()
            .map(|l| (l.variant_id, request.storage_point_id))
            .collect();
        allocation::lock_pairs(&mut tx, &pairs).await?;

        let report =
            availability::resolve_in_tx(&mut tx, request.storage_point_id, &line_requests).await?;
        if let Some(expected) = request.expected_availability {
            if expected != report.status {
                return Err(AppError::StaleAvailability(format!(
                    "availability drifted from {} to {} since resolution",
                    expected.as_str(),
                    report.status.as_str()
                )));
            }
        }

        let variant_ids: Vec<Uuid> = report.shortfalls.iter().map(|s| s.variant_id).collect();
        let sources = if variant_ids.is_empty() {
            HashMap::new()
        } else {
            ledger::sibling_sources(&mut tx, &variant_ids, request.storage_point_id).await?
        };
        let plan = plan_allocation(&report.shortfalls, &sources, request.delivery_mode);
        let outcome = PlacementOutcome::classify(report.status, &plan);
        let state = placement_state(outcome);

        let sub_total: Decimal = request
            .lines
            .iter()
            .map(|l| (l.price - l.discount) * Decimal::from(l.quantity))
            .sum();

        let reference = next_reference(&mut tx, ReferenceKind::Order).await?;
        let barcode = next_barcode(&mut tx, ReferenceKind::Order).await?;
        let payment_blob = request
            .payment
            .to_storage()
            .map_err(|e| AppError::Internal(format!("payment serialization: {e}")))?;

        let order_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, reference, barcode, version, order_type, delivery_mode, status, step,
                 sub_total, total, storage_point_id, payment, changes_to_apply, created_by)
            VALUES ($1, $2, $3, 'current', $4, $5, $6, $7, $8, $8, $9, $10, '[]'::jsonb, $11)
            "#,
        )
        .bind(order_id)
        .bind(&reference)
        .bind(&barcode)
        .bind(request.order_type.as_str())
        .bind(request.delivery_mode.as_str())
        .bind(state.status.as_str())
        .bind(state.step.as_str())
        .bind(sub_total)
        .bind(request.storage_point_id)
        .bind(&payment_blob)
        .bind(identity.user_id)
        .execute(&mut *tx)
        .await?;

        for (position, line) in request.lines.iter().enumerate() {
            insert_line(
                &mut tx,
                order_id,
                line.variant_id,
                line.quantity,
                line.price,
                line.discount,
                position as i32,
            )
            .await?;
        }

        // Reserve the locally covered share now, so concurrent placements
        // cannot claim it between sourcing and pick-pack
        for line in &line_requests {
            let missing = report
                .shortfalls
                .iter()
                .find(|s| s.variant_id == line.variant_id)
                .map(|s| s.missing)
                .unwrap_or(0);
            let local = line.quantity - missing;
            if local > 0 {
                ledger::reserve_items(
                    &mut tx,
                    line.variant_id,
                    request.storage_point_id,
                    local,
                    order_id,
                    StepStatus::ToPickPack,
                )
                .await?;
            }
        }

        let committed = allocation::commit_plan(
            &mut tx,
            order_id,
            request.storage_point_id,
            &plan,
            identity,
        )
        .await?;
        if let Some(purchase) = &committed.purchase {
            sqlx::query("UPDATE orders SET purchase_order_id = $2 WHERE id = $1")
                .bind(order_id)
                .bind(purchase.id)
                .execute(&mut *tx)
                .await?;
        }

        processing::open_interval(&mut tx, order_id, state).await?;

        let order = get_order(&mut tx, order_id).await?;
        let lines = get_order_lines(&mut tx, order_id).await?;
        tx.commit().await?;

        tracing::info!(
            order = %order.reference,
            availability = report.status.as_str(),
            state = %order.state(),
            "order placed"
        );

        Ok(PlacedOrder {
            order,
            lines,
            availability: report,
            outcome,
            transferts: committed.transferts,
            purchase_order: committed.purchase,
        })
    }

    /// Validate pick-pack. Fully picked orders move on whole; a partially
    /// picked order splits, the validated subset staying on the parent and
    /// the remainder moving to a child order that restarts pick-pack.
    pub async fn validate(
        &self,
        id: Uuid,
        picked: &[PickedLine],
        identity: &IdentityContext,
    ) -> AppResult<ValidatedOrder> {
        let mut tx = self.db.begin().await?;

        let order = get_order(&mut tx, id).await?;
        let expected = OrderState::new(StepStatus::ToPickPack, OrderStep::PreparationInProgress);
        if order.state() != expected {
            return Err(AppError::InvalidStateTransition(format!(
                "order {} is {}, expected {}",
                order.reference,
                order.state(),
                expected
            )));
        }

        let lines = get_order_lines(&mut tx, id).await?;
        let picked_pairs: Vec<(Uuid, i64)> = picked
            .iter()
            .map(|p| (p.line_id, p.picked_quantity))
            .collect();
        let split = split_order(&lines, &picked_pairs)?;

        if !split.is_complete() && !self.fulfillment.partial_validation_enabled {
            return Err(AppError::ValidationError(
                "Partial validation is disabled; pick every line in full".to_string(),
            ));
        }

        // Parent keeps the picked subset
        for line_split in &split.lines {
            if line_split.parent_quantity == 0 {
                sqlx::query("DELETE FROM article_ordered WHERE id = $1")
                    .bind(line_split.line_id)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query(
                    "UPDATE article_ordered \
                     SET quantity = $2, picked_quantity = $2, status = 'packed' WHERE id = $1",
                )
                .bind(line_split.line_id)
                .bind(line_split.parent_quantity)
                .execute(&mut *tx)
                .await?;
            }
        }
        update_totals(&mut tx, id, split.parent_total, split.parent_total).await?;

        let child = if split.is_complete() {
            None
        } else {
            Some(self.spawn_child(&mut tx, &order, &lines, &split, identity).await?)
        };

        let own = fulfilled_in_own_storage_point(&mut tx, &order).await?;
        let next = apply_transition(
            &mut tx,
            &order,
            OrderEvent::Validate {
                fulfilled_in_own_storage_point: own,
                delivery_mode: order.delivery_mode,
            },
        )
        .await?;

        if next == OrderState::new(StepStatus::ToReceived, OrderStep::InTransit) {
            // Units picked elsewhere start travelling to the order's own dock
            let dock =
                default_location(&mut tx, order.storage_point_id, DefaultLocation::Reception)
                    .await?;
            ledger::transition_order_items(
                &mut tx,
                id,
                ItemState::Reserved,
                ItemState::InTransit,
                Some(StepStatus::ToReceived),
                Some(dock.id),
                false,
            )
            .await?;
        } else {
            sqlx::query(
                "UPDATE product_items SET status = $2, updated_at = NOW() \
                 WHERE order_id = $1 AND state = 'reserved'",
            )
            .bind(id)
            .bind(next.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;

        Ok(ValidatedOrder {
            order,
            lines,
            child,
        })
    }

    /// Create the child order carrying the unfulfilled remainder of a
    /// partial validation. The child restarts in the parent's pre-validation
    /// state with its own fresh reference and lineage link.
    async fn spawn_child(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        parent: &Order,
        parent_lines: &[ArticleOrdered],
        split: &shared::OrderSplit,
        _identity: &IdentityContext,
    ) -> AppResult<OrderDetail> {
        let reference = next_reference(tx, ReferenceKind::Order).await?;
        let barcode = next_barcode(tx, ReferenceKind::Order).await?;
        let payment_blob = parent
            .payment
            .to_storage()
            .map_err(|e| AppError::Internal(format!("payment serialization: {e}")))?;

        let child_id = Uuid::new_v4();
        let state = OrderState::new(StepStatus::ToPickPack, OrderStep::PreparationInProgress);
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, reference, barcode, version, order_type, delivery_mode, status, step,
                 sub_total, total, storage_point_id, parent_id, payment, changes_to_apply,
                 created_by)
            VALUES ($1, $2, $3, 'current', $4, $5, $6, $7, $8, $8, $9, $10, $11,
                    '[]'::jsonb, $12)
            "#,
        )
        .bind(child_id)
        .bind(&reference)
        .bind(&barcode)
        .bind(parent.order_type.as_str())
        .bind(parent.delivery_mode.as_str())
        .bind(state.status.as_str())
        .bind(state.step.as_str())
        .bind(split.child_total)
        .bind(parent.storage_point_id)
        .bind(parent.id)
        .bind(&payment_blob)
        .bind(parent.created_by)
        .execute(&mut **tx)
        .await?;

        let mut position = 0i32;
        for line_split in split.child_lines() {
            let original = parent_lines
                .iter()
                .find(|l| l.id == line_split.line_id)
                .ok_or_else(|| {
                    AppError::ConsistencyViolation(format!(
                        "split references line {} missing from the order",
                        line_split.line_id
                    ))
                })?;
            insert_line(
                tx,
                child_id,
                line_split.variant_id,
                line_split.child_quantity,
                original.price,
                original.discount,
                position,
            )
            .await?;
            position += 1;

            // Reserved units beyond the picked count follow their lines
            sqlx::query(
                r#"
                UPDATE product_items
                SET order_id = $3, updated_at = NOW()
                WHERE id IN (
                    SELECT id FROM product_items
                    WHERE order_id = $1 AND variant_id = $2 AND state = 'reserved'
                    ORDER BY barcode DESC
                    LIMIT $4
                )
                "#,
            )
            .bind(parent.id)
            .bind(line_split.variant_id)
            .bind(child_id)
            .bind(line_split.child_quantity)
            .execute(&mut **tx)
            .await?;
        }

        processing::open_interval(tx, child_id, state).await?;

        let order = get_order(tx, child_id).await?;
        let lines = get_order_lines(tx, child_id).await?;
        tracing::info!(
            parent = %parent.reference,
            child = %order.reference,
            remainder = %split.child_total,
            "partial validation split"
        );
        Ok(OrderDetail { order, lines })
    }

    /// Record the arrival of an order travelling between storage points:
    /// its units park on the reception dock and an absorbing reception opens.
    pub async fn mark_arrived(&self, id: Uuid, identity: &IdentityContext) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;

        let order = get_order(&mut tx, id).await?;
        let next = apply_transition(&mut tx, &order, OrderEvent::TransferArrived).await?;

        let expected = in_state_counts(&mut tx, id, ItemState::InTransit).await?;
        let expected_pairs: Vec<(Uuid, i64)> = expected.into_iter().collect();
        let rec = crate::services::reception::create_pending(
            &mut tx,
            order.storage_point_id,
            ReceptionType::Transfert,
            None,
            None,
            Some(order.id),
            &expected_pairs,
            identity,
        )
        .await?;

        let moved = sqlx::query_as::<_, (Uuid,)>(
            r#"
            UPDATE product_items
            SET state = 'pending_reception', reception_id = $2, status = $3, updated_at = NOW()
            WHERE order_id = $1 AND state = 'in_transit'
            RETURNING variant_id
            "#,
        )
        .bind(id)
        .bind(rec.id)
        .bind(next.status.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for (variant_id,) in moved {
            *counts.entry(variant_id).or_default() += 1;
        }
        for (variant_id, count) in counts {
            ledger::apply_operations(
                &mut tx,
                variant_id,
                order.storage_point_id,
                &[
                    StockOperation::remove(StockBucket::InTransit, count),
                    StockOperation::add(StockBucket::PendingReception, count),
                ],
            )
            .await?;
        }

        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    /// Hand the order to the delivery pipeline (home) or the customer at the
    /// counter (agency)
    pub async fn output(&self, id: Uuid, _identity: &IdentityContext) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;

        let order = get_order(&mut tx, id).await?;
        let next = apply_transition(&mut tx, &order, OrderEvent::Output).await?;

        match order.delivery_mode {
            DeliveryMode::AtHome => {
                let staging =
                    default_location(&mut tx, order.storage_point_id, DefaultLocation::Output)
                        .await?;
                ledger::transition_order_items(
                    &mut tx,
                    id,
                    ItemState::Reserved,
                    ItemState::DeliveryProcessing,
                    Some(next.status),
                    Some(staging.id),
                    false,
                )
                .await?;
            }
            DeliveryMode::InAgency => {
                // The customer walks out with the units
                ledger::transition_order_items(
                    &mut tx,
                    id,
                    ItemState::Reserved,
                    ItemState::Delivered,
                    Some(next.status),
                    None,
                    false,
                )
                .await?;
            }
        }

        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    /// Fleet assignment
    pub async fn assign(&self, id: Uuid, _identity: &IdentityContext) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;
        let order = get_order(&mut tx, id).await?;
        apply_transition(&mut tx, &order, OrderEvent::Assign).await?;
        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    /// Confirm delivery at the customer
    pub async fn validate_delivery(
        &self,
        id: Uuid,
        cash_collected: bool,
        _identity: &IdentityContext,
    ) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;

        let order = get_order(&mut tx, id).await?;
        let next =
            apply_transition(&mut tx, &order, OrderEvent::ValidateDelivery { cash_collected })
                .await?;

        ledger::transition_order_items(
            &mut tx,
            id,
            ItemState::DeliveryProcessing,
            ItemState::Delivered,
            Some(next.status),
            None,
            false,
        )
        .await?;

        if cash_collected {
            sqlx::query("UPDATE orders SET cashed_at = NOW(), updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    /// Record cash collection, closing the order
    pub async fn register_cashing(
        &self,
        id: Uuid,
        _identity: &IdentityContext,
    ) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;

        let order = get_order(&mut tx, id).await?;
        apply_transition(&mut tx, &order, OrderEvent::RegisterCashing).await?;
        sqlx::query(
            "UPDATE orders SET cashed_at = COALESCE(cashed_at, NOW()), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    /// Report a failed delivery attempt for rescheduling
    pub async fn report(&self, id: Uuid, _identity: &IdentityContext) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;
        let order = get_order(&mut tx, id).await?;
        apply_transition(&mut tx, &order, OrderEvent::Report).await?;
        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    /// Refund a paid order
    pub async fn refund(&self, id: Uuid, _identity: &IdentityContext) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;
        let order = get_order(&mut tx, id).await?;
        apply_transition(&mut tx, &order, OrderEvent::Refund).await?;
        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    /// Record sensitive edits for separate approval; nothing is applied yet
    pub async fn register_changes(
        &self,
        id: Uuid,
        changes: &[OrderChange],
        _identity: &IdentityContext,
    ) -> AppResult<OrderDetail> {
        if changes.is_empty() {
            return Err(AppError::ValidationError(
                "No changes to register".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;
        let order = get_order(&mut tx, id).await?;
        if order.state().is_terminal() {
            return Err(AppError::Conflict {
                resource: "order".to_string(),
                message: "A terminal order cannot be edited".to_string(),
            });
        }

        let mut pending = order.changes_to_apply.clone();
        pending.extend_from_slice(changes);
        let blob = OrderChange::list_to_storage(&pending)
            .map_err(|e| AppError::Internal(format!("changes serialization: {e}")))?;
        sqlx::query(
            "UPDATE orders SET changes_to_apply = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(&blob)
        .execute(&mut *tx)
        .await?;

        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    /// Apply the order's pending registered changes. Only allowed before
    /// pick-pack validation; line edits release or re-source stock as needed
    /// and the sourcing outcome is re-derived from scratch.
    pub async fn apply_changes(
        &self,
        id: Uuid,
        identity: &IdentityContext,
    ) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;

        let order = get_order(&mut tx, id).await?;
        check_editable(&order)?;
        if order.changes_to_apply.is_empty() {
            return Err(AppError::ValidationError(
                "No pending changes on this order".to_string(),
            ));
        }

        let changes = order.changes_to_apply.clone();
        self.apply_change_list(&mut tx, &order, &changes, identity)
            .await?;
        sqlx::query(
            "UPDATE orders SET changes_to_apply = '[]'::jsonb, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(order = %order.reference, state = %order.state(), "order changes applied");
        Ok(OrderDetail { order, lines })
    }

    /// Edit order lines directly, bypassing the registered-change queue.
    /// Same preconditions and re-sourcing as `apply_changes`.
    pub async fn edit_lines(
        &self,
        id: Uuid,
        changes: &[OrderChange],
        identity: &IdentityContext,
    ) -> AppResult<OrderDetail> {
        if changes.is_empty() {
            return Err(AppError::ValidationError(
                "No line changes submitted".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;
        let order = get_order(&mut tx, id).await?;
        check_editable(&order)?;
        self.apply_change_list(&mut tx, &order, changes, identity)
            .await?;

        let order = get_order(&mut tx, id).await?;
        let lines = get_order_lines(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(order = %order.reference, state = %order.state(), "order lines edited");
        Ok(OrderDetail { order, lines })
    }

    /// Apply `changes` to the order's lines and re-derive sourcing.
    async fn apply_change_list(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
        changes: &[OrderChange],
        identity: &IdentityContext,
    ) -> AppResult<()> {
        let id = order.id;
        let mut delivery_mode = order.delivery_mode;
        for change in changes {
            match change {
               OrderChange::AddLine {
                    variant_id,
                    quantity,
                    price,
                } => {
                    validate_pricing(*price, Decimal::ZERO)
                        .map_err(|msg| AppError::ValidationError(msg.to_string()))?;
                    if *quantity <= 0 {
                        return Err(AppError::ValidationError(
                            "Added line quantity must be positive".to_string(),
                        ));
                    }
                    let position = sqlx::query_scalar::<_, i32>(
                        "SELECT COALESCE(MAX(position) + 1, 0) FROM article_ordered \
                         WHERE order_id = $1",
                    )
                    .bind(id)
                    .fetch_one(&mut **tx)
                    .await?;
                    insert_line(tx, id, *variant_id, *quantity, *price, Decimal::ZERO, position)
                        .await?;
                }
                OrderChange::RemoveLine { line_id } => {
                    let removed = sqlx::query("DELETE FROM article_ordered WHERE id = $1 AND order_id = $2")
                        .bind(line_id)
                        .bind(id)
                        .execute(&mut **tx)
                        .await?;
                    if removed.rows_affected() == 0 {
                        return Err(AppError::ValidationError(
                            "Change references an unknown order line".to_string(),
                        ));
                    }
                }
                OrderChange::ChangeQuantity { line_id, quantity } => {
                    if *quantity <= 0 {
                        return Err(AppError::ValidationError(
                            "Changed quantity must be positive".to_string(),
                        ));
                    }
                    let updated = sqlx::query(
                        "UPDATE article_ordered SET quantity = $3 WHERE id = $1 AND order_id = $2",
                    )
                    .bind(line_id)
                    .bind(id)
                    .bind(quantity)
                    .execute(&mut **tx)
                    .await?;
                    if updated.rows_affected() == 0 {
                        return Err(AppError::ValidationError(
                            "Change references an unknown order line".to_string(),
                        ));
                    }
                }
                OrderChange::ChangeDeliveryMode { delivery_mode: mode } => {
                    delivery_mode = *mode;
                }
            }
        }

        let lines = get_order_lines(tx, id).await?;
        if lines.is_empty() {
            return Err(AppError::ValidationError(
                "Changes would leave the order without lines".to_string(),
            ));
        }
        let sub_total: Decimal = lines.iter().map(|l| l.line_total()).sum();
        sqlx::query(
            "UPDATE orders \
             SET delivery_mode = $2, sub_total = $3, total = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(delivery_mode.as_str())
        .bind(sub_total)
        .execute(&mut **tx)
        .await?;

        self.resource_after_edit(tx, id, identity).await
    }

    /// Re-derive sourcing after an edit: release over-reserved units, drop
    /// the sub-workflows the edit made unnecessary, and re-plan the rest as
    /// at placement.
    async fn resource_after_edit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        identity: &IdentityContext,
    ) -> AppResult<()> {
        let order = get_order(tx, order_id).await?;
        let lines = get_order_lines(tx, order_id).await?;

        // Pending sub-workflows no longer match the edited lines; they are
        // cancelled and re-created from the new plan. Confirmed or validated
        // ones keep moving stock and are detached instead.
        for t in transfert::transferts_of_order(tx, order_id).await? {
            match t.status {
                shared::TransfertStatus::Pending => transfert::cancel_pending(tx, t.id).await?,
                _ => transfert::detach_from_order(tx, t.id).await?,
            }
        }
        for p in purchase::purchases_of_order(tx, order_id).await? {
            if p.status.is_cancellable() {
                purchase::cancel_if_cancellable(tx, p.id).await?;
            } else {
                purchase::detach_from_order(tx, p.id).await?;
            }
        }
        sqlx::query("UPDATE orders SET purchase_order_id = NULL WHERE id = $1")
            .bind(order_id)
            .execute(&mut **tx)
            .await?;

        // Release reserved units beyond the edited quantities
        let reserved = reserved_counts(tx, order_id).await?;
        for (variant_id, count) in &reserved {
            let wanted = lines
                .iter()
                .filter(|l| l.variant_id == *variant_id)
                .map(|l| l.quantity)
                .sum::<i64>();
            let excess = count - wanted;
            if excess > 0 {
                release_reserved(tx, order_id, *variant_id, excess).await?;
            }
        }

        // Re-plan what is still missing
        let reserved = reserved_counts(tx, order_id).await?;
        let missing: Vec<LineRequest> = lines
            .iter()
            .filter_map(|line| {
                let have = reserved.get(&line.variant_id).copied().unwrap_or(0);
                let need = line.quantity - have;
                (need > 0).then_some(LineRequest {
                    variant_id: line.variant_id,
                    quantity: need,
                })
            })
            .collect();

        let state = if missing.is_empty() {
            OrderState::new(StepStatus::ToPickPack, OrderStep::PreparationInProgress)
        } else {
            let pairs: Vec<(Uuid, Uuid)> = missing
                .iter()
                .map(|l| (l.variant_id, order.storage_point_id))
                .collect();
            allocation::lock_pairs(tx, &pairs).await?;

            let report =
                availability::resolve_in_tx(tx, order.storage_point_id, &missing).await?;
            for line in &missing {
                let missing_qty = report
                    .shortfalls
                    .iter()
                    .find(|s| s.variant_id == line.variant_id)
                    .map(|s| s.missing)
                    .unwrap_or(0);
                let local = line.quantity - missing_qty;
                if local > 0 {
                    ledger::reserve_items(
                        tx,
                        line.variant_id,
                        order.storage_point_id,
                        local,
                        order_id,
                        StepStatus::ToPickPack,
                    )
                    .await?;
                }
            }

            let variant_ids: Vec<Uuid> =
                report.shortfalls.iter().map(|s| s.variant_id).collect();
            let sources = if variant_ids.is_empty() {
                HashMap::new()
            } else {
                ledger::sibling_sources(tx, &variant_ids, order.storage_point_id).await?
            };
            let plan = plan_allocation(&report.shortfalls, &sources, order.delivery_mode);
            let committed =
                allocation::commit_plan(tx, order_id, order.storage_point_id, &plan, identity)
                    .await?;
            if let Some(p) = &committed.purchase {
                sqlx::query("UPDATE orders SET purchase_order_id = $2 WHERE id = $1")
                    .bind(order_id)
                    .bind(p.id)
                    .execute(&mut **tx)
                    .await?;
            }

            placement_state(PlacementOutcome::classify(report.status, &plan))
        };

        if state != order.state() {
            sqlx::query(
                "UPDATE orders SET status = $2, step = $3, updated_at = NOW() WHERE id = $1",
            )
            .bind(order_id)
            .bind(state.status.as_str())
            .bind(state.step.as_str())
            .execute(&mut **tx)
            .await?;
            processing::record_transition(tx, order_id, state).await?;
        }
        Ok(())
    }
}

/// Unit counts per variant for an order's items in one state
pub async fn in_state_counts(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    state: ItemState,
) -> AppResult<HashMap<Uuid, i64>> {
    let rows = sqlx::query_as::<_, (Uuid, i64)>(
        r#"
        SELECT variant_id, COUNT(*)
        FROM product_items
        WHERE order_id = $1 AND state = $2
        GROUP BY variant_id
        "#,
    )
    .bind(order_id)
    .bind(state.as_str())
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Release `count` reserved units of a variant back to available stock
pub async fn release_reserved(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    variant_id: Uuid,
    count: i64,
) -> AppResult<()> {
    let released = sqlx::query_as::<_, (Uuid,)>(
        r#"
        UPDATE product_items pi
        SET state = 'available', status = NULL, order_id = NULL, updated_at = NOW()
        FROM locations l
        WHERE pi.id IN (
            SELECT id FROM product_items
            WHERE order_id = $1 AND variant_id = $2 AND state = 'reserved'
            ORDER BY barcode DESC
            LIMIT $3
        )
          AND l.id = pi.location_id
        RETURNING l.storage_point_id
        "#,
    )
    .bind(order_id)
    .bind(variant_id)
    .bind(count)
    .fetch_all(&mut **tx)
    .await?;

    let mut per_sp: HashMap<Uuid, i64> = HashMap::new();
    for (sp,) in released {
        *per_sp.entry(sp).or_default() += 1;
    }
    for (storage_point_id, released_count) in per_sp {
        ledger::apply_operations(
            tx,
            variant_id,
            storage_point_id,
            &[
                StockOperation::remove(StockBucket::Reserved, released_count),
                StockOperation::add(StockBucket::Available, released_count),
            ],
        )
        .await?;
    }
    Ok(())
}
