//! Cancellation compensator.
//!
//! The reversal path is selected by the order's current (status, step), not
//! by replaying an undo log: each reachable state knows which ledger effects
//! exist and reverses exactly those. Everything runs in one transaction;
//! a failure rolls the whole cancellation back.

use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::order::{get_order, get_order_lines, OrderDetail};
use crate::services::storage_point::default_location;
use crate::services::{ledger, processing, purchase, reception, transfert};
use shared::{
    can_cancel, CancelReason, DefaultLocation, IdentityContext, ItemState, Order, ReceptionStatus,
    ReceptionType, StepStatus, StockOperation, TransfertStatus,
};

/// Order cancellation service
#[derive(Clone)]
pub struct CancellationService {
    db: PgPool,
}

impl CancellationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Cancel an order, reversing its ledger effects according to its
    /// current workflow state. Rejects terminal orders, so retrying a
    /// cancellation fails instead of reversing twice.
    pub async fn cancel(
        &self,
        order_id: Uuid,
        reason: CancelReason,
        identity: &IdentityContext,
    ) -> AppResult<OrderDetail> {
        let mut tx = self.db.begin().await?;

        let order = get_order(&mut tx, order_id).await?;
        if order.status == StepStatus::Canceled {
            return Err(AppError::Conflict {
                resource: "order".to_string(),
                message: format!("Order {} is already cancelled", order.reference),
            });
        }
        if !can_cancel(order.state()) {
            return Err(AppError::Conflict {
                resource: "order".to_string(),
                message: format!(
                    "Order {} is {} and cannot be cancelled",
                    order.reference,
                    order.state()
                ),
            });
        }

        match (order.status, order.step) {
            (StepStatus::ToPickPack, _) => {
                absorb_units(&mut tx, &order, reason, &[ItemState::Reserved], identity).await?;
            }
            (StepStatus::ToTransfer, _) => {
                reverse_transferts(&mut tx, &order, reason, identity).await?;
                absorb_units(&mut tx, &order, reason, &[ItemState::Reserved], identity).await?;
            }
            (StepStatus::ToBuy, _) => {
                reverse_purchases(&mut tx, &order).await?;
            }
            (StepStatus::ToTreat, _) => {
                reverse_transferts(&mut tx, &order, reason, identity).await?;
                reverse_purchases(&mut tx, &order).await?;
                detach_pending_receptions(&mut tx, &order).await?;
                absorb_units(&mut tx, &order, reason, &[ItemState::Reserved], identity).await?;
            }
            (StepStatus::ToReceived, shared::OrderStep::InTransit) => {
                reverse_transferts(&mut tx, &order, reason, identity).await?;
                // The travelling units are absorbed where they were heading
                absorb_units(&mut tx, &order, reason, &[ItemState::InTransit], identity).await?;
            }
            (StepStatus::ToReceived, _) => {
                reverse_transferts(&mut tx, &order, reason, identity).await?;
                reverse_purchases(&mut tx, &order).await?;
                detach_pending_receptions(&mut tx, &order).await?;
            }
            (
                StepStatus::Ready
                | StepStatus::ToDeliver
                | StepStatus::Assigned
                | StepStatus::Reported,
                _,
            ) => {
                absorb_units(
                    &mut tx,
                    &order,
                    reason,
                    &[ItemState::Reserved, ItemState::DeliveryProcessing],
                    identity,
                )
                .await?;
            }
            (StepStatus::PickedUp, _) => {
                // The customer already holds the units; they come back as a
                // customer return
                absorb_units(&mut tx, &order, reason, &[ItemState::Delivered], identity).await?;
            }
            (status, step) => {
                return Err(AppError::Conflict {
                    resource: "order".to_string(),
                    message: format!(
                        "No cancellation path from {}/{}",
                        status.as_str(),
                        step.as_str()
                    ),
                });
            }
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET status = 'canceled', cancel_reason = $2, canceled_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(reason.as_str())
        .execute(&mut *tx)
        .await?;

        // The audit trail ends here; CANCELED opens no further interval
        processing::close_open_interval(&mut tx, order_id).await?;

        let order = get_order(&mut tx, order_id).await?;
        let lines = get_order_lines(&mut tx, order_id).await?;
        tx.commit().await?;

        tracing::info!(
            order = %order.reference,
            reason = reason.as_str(),
            "order cancelled"
        );
        Ok(OrderDetail { order, lines })
    }
}

/// Route the order's physical units in the given states into absorbing
/// receptions, one per storage point currently holding any. Units lose their
/// order binding and wait in pending reception until a clerk restocks them.
async fn absorb_units(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    reason: CancelReason,
    states: &[ItemState],
    identity: &IdentityContext,
) -> AppResult<()> {
    let state_names: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
    let units = sqlx::query_as::<_, (Uuid, Uuid, String, Uuid)>(
        r#"
        SELECT pi.id, pi.variant_id, pi.state, l.storage_point_id
        FROM product_items pi
        JOIN locations l ON l.id = pi.location_id
        WHERE pi.order_id = $1 AND pi.state = ANY($2)
        FOR UPDATE OF pi
        "#,
    )
    .bind(order.id)
    .bind(&state_names)
    .fetch_all(&mut **tx)
    .await?;

    if units.is_empty() {
        return Ok(());
    }

    let mut per_storage_point: HashMap<Uuid, Vec<(Uuid, Uuid, ItemState)>> = HashMap::new();
    for (id, variant_id, state, storage_point_id) in units {
        let state = ItemState::from_str(&state)
            .ok_or_else(|| AppError::ConsistencyViolation(format!("unknown item state {state}")))?;
        per_storage_point
            .entry(storage_point_id)
            .or_default()
            .push((id, variant_id, state));
    }

    let reception_type = ReceptionType::from_cancel_reason(reason);
    for (storage_point_id, units) in per_storage_point {
        let mut expected: HashMap<Uuid, i64> = HashMap::new();
        for (_, variant_id, _) in &units {
            *expected.entry(*variant_id).or_default() += 1;
        }
        let expected_pairs: Vec<(Uuid, i64)> = expected.into_iter().collect();

        let rec = reception::create_pending(
            tx,
            storage_point_id,
            reception_type,
            None,
            None,
            Some(order.id),
            &expected_pairs,
            identity,
        )
        .await?;
        let dock = default_location(tx, storage_point_id, DefaultLocation::Reception).await?;

        let ids: Vec<Uuid> = units.iter().map(|(id, _, _)| *id).collect();
        sqlx::query(
            r#"
            UPDATE product_items
            SET state = 'pending_reception', status = NULL, order_id = NULL,
                reception_id = $2, location_id = $3, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .bind(rec.id)
        .bind(dock.id)
        .execute(&mut **tx)
        .await?;

        let mut moves: HashMap<(Uuid, ItemState), i64> = HashMap::new();
        for (_, variant_id, state) in &units {
            *moves.entry((*variant_id, *state)).or_default() += 1;
        }
        for ((variant_id, state), count) in moves {
            ledger::apply_operations(
                tx,
                variant_id,
                storage_point_id,
                &[
                    StockOperation::remove(state.bucket(), count),
                    StockOperation::add(shared::StockBucket::PendingReception, count),
                ],
            )
            .await?;
        }

        tracing::info!(
            order = %order.reference,
            reception = %rec.reference,
            storage_point = %storage_point_id,
            "cancellation reception opened"
        );
    }

    Ok(())
}

/// Reverse the order's transferts according to how far each progressed:
/// PENDING cancels outright, CONFIRMED gets its in-transit units absorbed at
/// the target before cancelling, VALIDATED already moved its stock and is
/// only detached.
async fn reverse_transferts(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    reason: CancelReason,
    identity: &IdentityContext,
) -> AppResult<()> {
    for t in transfert::transferts_of_order(tx, order.id).await? {
        match t.status {
            TransfertStatus::Pending => {
                transfert::cancel_pending(tx, t.id).await?;
            }
            TransfertStatus::Confirmed => {
                absorb_transfert_units(tx, order, &t, reason, identity).await?;
                sqlx::query(
                    "UPDATE transferts SET status = 'canceled', updated_at = NOW() WHERE id = $1",
                )
                .bind(t.id)
                .execute(&mut **tx)
                .await?;
            }
            TransfertStatus::Validated => {
                transfert::detach_from_order(tx, t.id).await?;
            }
            TransfertStatus::Canceled => {}
        }
    }
    Ok(())
}

/// Absorb a confirmed transfert's in-transit units into a new reception at
/// the transfert's target
async fn absorb_transfert_units(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    t: &shared::Transfert,
    reason: CancelReason,
    identity: &IdentityContext,
) -> AppResult<()> {
    let counts = sqlx::query_as::<_, (Uuid, i64)>(
        r#"
        SELECT variant_id, COUNT(*)
        FROM product_items
        WHERE transfert_id = $1 AND state = 'in_transit'
        GROUP BY variant_id
        "#,
    )
    .bind(t.id)
    .fetch_all(&mut **tx)
    .await?;
    if counts.is_empty() {
        return Ok(());
    }

    let rec = reception::create_pending(
        tx,
        t.target_storage_point_id,
        ReceptionType::from_cancel_reason(reason),
        Some(t.id),
        None,
        Some(order.id),
        &counts,
        identity,
    )
    .await?;

    sqlx::query(
        r#"
        UPDATE product_items
        SET state = 'pending_reception', order_id = NULL, reception_id = $2, updated_at = NOW()
        WHERE transfert_id = $1 AND state = 'in_transit'
        "#,
    )
    .bind(t.id)
    .bind(rec.id)
    .execute(&mut **tx)
    .await?;

    for (variant_id, count) in counts {
        ledger::apply_operations(
            tx,
            variant_id,
            t.target_storage_point_id,
            &[
                StockOperation::remove(shared::StockBucket::InTransit, count),
                StockOperation::add(shared::StockBucket::PendingReception, count),
            ],
        )
        .await?;
    }
    Ok(())
}

/// Reverse the order's purchase orders: cancellable ones cancel, validated
/// ones keep their stock inbound but lose the order binding so the intake
/// lands as free stock.
async fn reverse_purchases(tx: &mut Transaction<'_, Postgres>, order: &Order) -> AppResult<()> {
    for p in purchase::purchases_of_order(tx, order.id).await? {
        if p.status.is_cancellable() {
            purchase::cancel_if_cancellable(tx, p.id).await?;
            continue;
        }
        if p.status != shared::PurchaseStatus::Validated {
            continue;
        }

        let receptions = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, status FROM receptions WHERE purchase_order_id = $1 FOR UPDATE",
        )
        .bind(p.id)
        .fetch_all(&mut **tx)
        .await?;

        for (rec_id, status) in receptions {
            match ReceptionStatus::from_str(&status) {
                Some(ReceptionStatus::Pending) => {
                    // Convert to an orderless intake; its units will enter as
                    // available stock on validation
                    sqlx::query(
                        "UPDATE receptions SET order_id = NULL, updated_at = NOW() WHERE id = $1",
                    )
                    .bind(rec_id)
                    .execute(&mut **tx)
                    .await?;
                }
                Some(ReceptionStatus::Validated) => {
                    revert_received_units(tx, order, rec_id).await?;
                }
                Some(ReceptionStatus::Canceled) => {}
                None => {
                    return Err(AppError::ConsistencyViolation(format!(
                        "unknown reception status {status}"
                    )))
                }
            }
        }

        purchase::detach_from_order(tx, p.id).await?;
    }
    Ok(())
}

/// Revert units a validated purchase reception reserved for the order
async fn revert_received_units(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    reception_id: Uuid,
) -> AppResult<()> {
    let reverted = sqlx::query_as::<_, (Uuid, Uuid)>(
        r#"
        UPDATE product_items pi
        SET state = 'available', status = NULL, order_id = NULL, updated_at = NOW()
        FROM locations l
        WHERE pi.order_id = $1
          AND pi.reception_id = $2
          AND pi.state = 'reserved'
          AND l.id = pi.location_id
        RETURNING pi.variant_id, l.storage_point_id
        "#,
    )
    .bind(order.id)
    .bind(reception_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut counts: HashMap<(Uuid, Uuid), i64> = HashMap::new();
    for (variant_id, storage_point_id) in reverted {
        *counts.entry((variant_id, storage_point_id)).or_default() += 1;
    }
    for ((variant_id, storage_point_id), count) in counts {
        ledger::apply_operations(
            tx,
            variant_id,
            storage_point_id,
            &[
                StockOperation::remove(shared::StockBucket::Reserved, count),
                StockOperation::add(shared::StockBucket::Available, count),
            ],
        )
        .await?;
    }
    Ok(())
}

/// Detach the order from its still-pending receptions; their units become
/// free stock when the clerk validates them.
async fn detach_pending_receptions(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE receptions SET order_id = NULL, updated_at = NOW() \
         WHERE order_id = $1 AND status = 'pending'",
    )
    .bind(order.id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "UPDATE product_items SET order_id = NULL, status = NULL, updated_at = NOW() \
         WHERE order_id = $1 AND state = 'pending_reception'",
    )
    .bind(order.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
