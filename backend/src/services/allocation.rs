//! Allocation commit: turning a computed plan into pending sub-workflows.
//!
//! Planning is pure; this module owns the check-then-act discipline around
//! it. Concurrent placements contending for the same stock serialize on
//! per-(variant, storage point) advisory locks for the rest of the
//! transaction, and the plan is only committed if the availability it was
//! computed from still holds under those locks.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::{ledger, purchase, transfert};
use shared::{AllocationPlan, IdentityContext, PurchaseOrder, Transfert};

/// Sub-workflows created for one committed plan
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    pub transferts: Vec<Transfert>,
    pub purchase: Option<PurchaseOrder>,
}

impl AllocationOutcome {
    pub fn empty() -> Self {
        Self {
            transferts: Vec::new(),
            purchase: None,
        }
    }

    pub fn has_transfers(&self) -> bool {
        !self.transferts.is_empty()
    }

    pub fn has_purchases(&self) -> bool {
        self.purchase.is_some()
    }
}

/// Serialize on a set of (variant, storage point) pairs until the end of the
/// caller's transaction. Pairs are locked in sorted order so two placements
/// contending for the same stock cannot deadlock.
pub async fn lock_pairs(
    tx: &mut Transaction<'_, Postgres>,
    pairs: &[(Uuid, Uuid)],
) -> AppResult<()> {
    let mut sorted: Vec<(Uuid, Uuid)> = pairs.to_vec();
    sorted.sort();
    sorted.dedup();

    for (variant_id, storage_point_id) in sorted {
        sqlx::query(
            "SELECT pg_advisory_xact_lock(hashtextextended($1::text || ':' || $2::text, 0))",
        )
        .bind(variant_id)
        .bind(storage_point_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Commit a plan inside the caller's placement transaction: one PENDING
/// transfert per source storage point and at most one PENDING purchase
/// order for the remainder.
///
/// Each source is re-checked under its advisory locks before its transfert
/// is created; a source that no longer covers its planned quantity fails the
/// whole placement with `StaleAvailability`.
pub async fn commit_plan(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    order_storage_point_id: Uuid,
    plan: &AllocationPlan,
    identity: &IdentityContext,
) -> AppResult<AllocationOutcome> {
    if plan.is_empty() {
        return Ok(AllocationOutcome::empty());
    }

    let pairs: Vec<(Uuid, Uuid)> = plan
        .transfers
        .iter()
        .flat_map(|(source, lines)| lines.iter().map(|l| (l.variant_id, *source)))
        .collect();
    lock_pairs(tx, &pairs).await?;

    let mut outcome = AllocationOutcome::empty();

    for (source, lines) in &plan.transfers {
        let variant_ids: Vec<Uuid> = lines.iter().map(|l| l.variant_id).collect();
        let snapshot = ledger::availability_snapshot(tx, *source, &variant_ids).await?;
        for line in lines {
            let available = snapshot.get(&line.variant_id).copied().unwrap_or(0);
            if available < line.quantity {
                return Err(AppError::StaleAvailability(format!(
                    "source {} variant {}: planned {} units, {} still available",
                    source, line.variant_id, line.quantity, available
                )));
            }
        }

        let line_pairs: Vec<(Uuid, i64)> =
            lines.iter().map(|l| (l.variant_id, l.quantity)).collect();
        let created = transfert::create_pending(
            tx,
            *source,
            order_storage_point_id,
            Some(order_id),
            &line_pairs,
            identity,
        )
        .await?;
        outcome.transferts.push(created);
    }

    if !plan.purchases.is_empty() {
        let line_pairs: Vec<(Uuid, i64)> = plan
            .purchases
            .iter()
            .map(|l| (l.variant_id, l.quantity))
            .collect();
        let created = purchase::create_pending(
            tx,
            order_storage_point_id,
            Some(order_id),
            &line_pairs,
            identity,
        )
        .await?;
        outcome.purchase = Some(created);
    }

    Ok(outcome)
}
