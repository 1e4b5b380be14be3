//! Common types used across the platform

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The acting user, passed in by the caller and never fetched by the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityContext {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl IdentityContext {
    pub fn new(user_id: Uuid, roles: Vec<String>) -> Self {
        Self { user_id, roles }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Entity kinds that carry generated human-readable references and barcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Order,
    Transfert,
    PurchaseOrder,
    Reception,
    OrderProcessing,
    ProductItem,
}

impl ReferenceKind {
    /// Prefix of generated references, e.g. `ORD-2025-000042`
    pub fn prefix(&self) -> &'static str {
        match self {
            ReferenceKind::Order => "ORD",
            ReferenceKind::Transfert => "TRF",
            ReferenceKind::PurchaseOrder => "PUR",
            ReferenceKind::Reception => "REC",
            ReferenceKind::OrderProcessing => "PRC",
            ReferenceKind::ProductItem => "ITM",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Order => "order",
            ReferenceKind::Transfert => "transfert",
            ReferenceKind::PurchaseOrder => "purchase_order",
            ReferenceKind::Reception => "reception",
            ReferenceKind::OrderProcessing => "order_processing",
            ReferenceKind::ProductItem => "product_item",
        }
    }
}
