//! Storage point and location lookup

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::{DefaultLocation, Location, StoragePoint};

/// Lookup service for storage points and their location hierarchies
#[derive(Clone)]
pub struct StoragePointService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct StoragePointRow {
    id: Uuid,
    reference: String,
    name: String,
    priority: i32,
    root_location_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StoragePointRow> for StoragePoint {
    fn from(row: StoragePointRow) -> Self {
        StoragePoint {
            id: row.id,
            reference: row.reference,
            name: row.name,
            priority: row.priority,
            root_location_id: row.root_location_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LocationRow {
    id: Uuid,
    storage_point_id: Uuid,
    parent_id: Option<Uuid>,
    name: String,
    path: String,
    created_at: DateTime<Utc>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Location {
            id: row.id,
            storage_point_id: row.storage_point_id,
            parent_id: row.parent_id,
            name: row.name,
            path: row.path,
            created_at: row.created_at,
        }
    }
}

const STORAGE_POINT_COLUMNS: &str =
    "id, reference, name, priority, root_location_id, created_at, updated_at";

impl StoragePointService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Resolve a storage point by id
    pub async fn get(&self, id: Uuid) -> AppResult<StoragePoint> {
        let row = sqlx::query_as::<_, StoragePointRow>(&format!(
            "SELECT {} FROM storage_points WHERE id = $1",
            STORAGE_POINT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Storage point".to_string()))?;

        Ok(row.into())
    }

    /// Resolve a storage point by its human reference
    pub async fn get_by_reference(&self, reference: &str) -> AppResult<StoragePoint> {
        let row = sqlx::query_as::<_, StoragePointRow>(&format!(
            "SELECT {} FROM storage_points WHERE reference = $1",
            STORAGE_POINT_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Storage point".to_string()))?;

        Ok(row.into())
    }

    /// List every storage point, in allocation priority order
    pub async fn list(&self) -> AppResult<Vec<StoragePoint>> {
        let rows = sqlx::query_as::<_, StoragePointRow>(&format!(
            "SELECT {} FROM storage_points ORDER BY priority, id",
            STORAGE_POINT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Resolve which storage point a location belongs to
    pub async fn storage_point_of_location(&self, location_id: Uuid) -> AppResult<StoragePoint> {
        let row = sqlx::query_as::<_, StoragePointRow>(&format!(
            r#"
            SELECT {} FROM storage_points
            WHERE id = (SELECT storage_point_id FROM locations WHERE id = $1)
            "#,
            STORAGE_POINT_COLUMNS
        ))
        .bind(location_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Location".to_string()))?;

        Ok(row.into())
    }

    /// Locations of a storage point's subtree
    pub async fn locations(&self, storage_point_id: Uuid) -> AppResult<Vec<Location>> {
        let rows = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT id, storage_point_id, parent_id, name, path, created_at
            FROM locations
            WHERE storage_point_id = $1
            ORDER BY path
            "#,
        )
        .bind(storage_point_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Load a storage point inside an existing transaction
pub async fn get_storage_point(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> AppResult<StoragePoint> {
    let row = sqlx::query_as::<_, StoragePointRow>(&format!(
        "SELECT {} FROM storage_points WHERE id = $1",
        STORAGE_POINT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Storage point".to_string()))?;

    Ok(row.into())
}

/// Get or create one of a storage point's well-known default locations
/// (preparation, output, reception), directly under the root location.
pub async fn default_location(
    tx: &mut Transaction<'_, Postgres>,
    storage_point_id: Uuid,
    which: DefaultLocation,
) -> AppResult<Location> {
    let existing = sqlx::query_as::<_, LocationRow>(
        r#"
        SELECT id, storage_point_id, parent_id, name, path, created_at
        FROM locations
        WHERE storage_point_id = $1 AND name = $2
        "#,
    )
    .bind(storage_point_id)
    .bind(which.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(row) = existing {
        return Ok(row.into());
    }

    let sp = get_storage_point(tx, storage_point_id).await?;
    let root_path = sqlx::query_scalar::<_, String>("SELECT path FROM locations WHERE id = $1")
        .bind(sp.root_location_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| {
            AppError::ConsistencyViolation(format!(
                "storage point {} has no root location",
                storage_point_id
            ))
        })?;

    let row = sqlx::query_as::<_, LocationRow>(
        r#"
        INSERT INTO locations (id, storage_point_id, parent_id, name, path)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, storage_point_id, parent_id, name, path, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(storage_point_id)
    .bind(sp.root_location_id)
    .bind(which.as_str())
    .bind(format!("{}.{}", root_path, which.as_str()))
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.into())
}
