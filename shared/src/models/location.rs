//! Storage points and their hierarchical locations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A warehouse/site with its own location hierarchy and allocation priority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoragePoint {
    pub id: Uuid,
    pub reference: String,
    pub name: String,
    /// Allocation tie-break: lower priority wins when sourcing transfers
    pub priority: i32,
    pub root_location_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A hierarchical place within a storage point where physical units sit.
/// `path` is the materialized path from the root location, used for subtree
/// queries (`path LIKE 'root.%'`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub storage_point_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// Well-known default locations a storage point always provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultLocation {
    Preparation,
    Output,
    Reception,
}

impl DefaultLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultLocation::Preparation => "preparation",
            DefaultLocation::Output => "output",
            DefaultLocation::Reception => "reception",
        }
    }
}
