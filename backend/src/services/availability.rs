//! Availability resolution against the live ledger

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::ledger;
use shared::{resolve_availability, validate_line_requests, AvailabilityReport, LineRequest};

/// Availability service for peripheral read-only callers.
///
/// Results outside an allocation transaction are advisory: the planner
/// re-resolves under lock before committing.
#[derive(Clone)]
pub struct AvailabilityService {
    db: PgPool,
}

impl AvailabilityService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Classify availability of the requested lines at a storage point
    pub async fn resolve(
        &self,
        storage_point_id: Uuid,
        lines: &[LineRequest],
    ) -> AppResult<AvailabilityReport> {
        validate_line_requests(lines).map_err(|msg| AppError::ValidationError(msg.to_string()))?;

        let mut tx = self.db.begin().await?;
        let report = resolve_in_tx(&mut tx, storage_point_id, lines).await?;
        tx.commit().await?;
        Ok(report)
    }
}

/// Resolve availability inside an existing transaction; the snapshot and any
/// later commit share the same isolation scope.
pub async fn resolve_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    storage_point_id: Uuid,
    lines: &[LineRequest],
) -> AppResult<AvailabilityReport> {
    let variant_ids: Vec<Uuid> = lines.iter().map(|l| l.variant_id).collect();

    let known = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM variants WHERE id = ANY($1)")
        .bind(&variant_ids)
        .fetch_one(&mut **tx)
        .await?;
    if known != variant_ids.len() as i64 {
        return Err(AppError::ValidationError(
            "Unknown variant in order lines".to_string(),
        ));
    }

    let snapshot = ledger::availability_snapshot(tx, storage_point_id, &variant_ids).await?;
    Ok(resolve_availability(lines, &snapshot))
}
