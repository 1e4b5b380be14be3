//! Reference generation for orders, transferts, purchases and receptions

use sqlx::{PgPool, Postgres, Transaction};

use crate::error::AppResult;
use shared::ReferenceKind;

/// Reference service producing unique human-readable references and barcodes
#[derive(Clone)]
pub struct ReferenceService {
    db: PgPool,
}

impl ReferenceService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Generate the next reference for `kind`, e.g. `ORD-2025-000042`
    pub async fn next(&self, kind: ReferenceKind) -> AppResult<String> {
        let mut tx = self.db.begin().await?;
        let reference = next_reference(&mut tx, kind).await?;
        tx.commit().await?;
        Ok(reference)
    }
}

/// Generate the next reference for `kind` inside an existing transaction.
///
/// Uses an upserted per-(kind, year) counter row; the row lock is held only
/// for the remainder of the caller's transaction.
pub async fn next_reference(
    tx: &mut Transaction<'_, Postgres>,
    kind: ReferenceKind,
) -> AppResult<String> {
    let year = chrono::Utc::now().format("%Y").to_string();

    let counter = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO reference_sequences (kind, year, counter)
        VALUES ($1, $2, 1)
        ON CONFLICT (kind, year)
        DO UPDATE SET counter = reference_sequences.counter + 1
        RETURNING counter
        "#,
    )
    .bind(kind.as_str())
    .bind(&year)
    .fetch_one(&mut **tx)
    .await?;

    Ok(format!("{}-{}-{:06}", kind.prefix(), year, counter))
}

/// Generate a scannable barcode for `kind`.
///
/// Same counter space as references, different rendering (digits only).
pub async fn next_barcode(
    tx: &mut Transaction<'_, Postgres>,
    kind: ReferenceKind,
) -> AppResult<String> {
    let reference = next_reference(tx, kind).await?;
    let digits: String = reference.chars().filter(|c| c.is_ascii_digit()).collect();
    Ok(format!("9{:0>12}", digits))
}
