//! Quantity ledger buckets and the operations that move counts between them

use serde::{Deserialize, Serialize};

/// Named counter bucket of the quantity ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockBucket {
    Available,
    Reserved,
    PendingReception,
    InTransit,
    DeliveryProcessing,
    Delivered,
    IsDead,
    Discovered,
}

impl StockBucket {
    pub const ALL: [StockBucket; 8] = [
        StockBucket::Available,
        StockBucket::Reserved,
        StockBucket::PendingReception,
        StockBucket::InTransit,
        StockBucket::DeliveryProcessing,
        StockBucket::Delivered,
        StockBucket::IsDead,
        StockBucket::Discovered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StockBucket::Available => "available",
            StockBucket::Reserved => "reserved",
            StockBucket::PendingReception => "pending_reception",
            StockBucket::InTransit => "in_transit",
            StockBucket::DeliveryProcessing => "delivery_processing",
            StockBucket::Delivered => "delivered",
            StockBucket::IsDead => "is_dead",
            StockBucket::Discovered => "discovered",
        }
    }

    /// Column name of the bucket in the stock tables
    pub fn column(&self) -> &'static str {
        self.as_str()
    }
}

/// Bucket counts for one (variant or product, storage point) pair.
///
/// Accounting rows never vanish: units only move bucket, so the sum of all
/// buckets always equals the number of physical units recorded for the pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub available: i64,
    pub reserved: i64,
    pub pending_reception: i64,
    pub in_transit: i64,
    pub delivery_processing: i64,
    pub delivered: i64,
    pub is_dead: i64,
    pub discovered: i64,
}

impl StockLevels {
    pub fn get(&self, bucket: StockBucket) -> i64 {
        match bucket {
            StockBucket::Available => self.available,
            StockBucket::Reserved => self.reserved,
            StockBucket::PendingReception => self.pending_reception,
            StockBucket::InTransit => self.in_transit,
            StockBucket::DeliveryProcessing => self.delivery_processing,
            StockBucket::Delivered => self.delivered,
            StockBucket::IsDead => self.is_dead,
            StockBucket::Discovered => self.discovered,
        }
    }

    fn get_mut(&mut self, bucket: StockBucket) -> &mut i64 {
        match bucket {
            StockBucket::Available => &mut self.available,
            StockBucket::Reserved => &mut self.reserved,
            StockBucket::PendingReception => &mut self.pending_reception,
            StockBucket::InTransit => &mut self.in_transit,
            StockBucket::DeliveryProcessing => &mut self.delivery_processing,
            StockBucket::Delivered => &mut self.delivered,
            StockBucket::IsDead => &mut self.is_dead,
            StockBucket::Discovered => &mut self.discovered,
        }
    }

    /// Sum over every bucket
    pub fn total(&self) -> i64 {
        StockBucket::ALL.iter().map(|b| self.get(*b)).sum()
    }

    /// Apply one signed bucket delta, rejecting any move that would drive a
    /// bucket negative.
    pub fn apply(&mut self, op: StockOperation) -> Result<(), NegativeBucket> {
        let slot = self.get_mut(op.bucket);
        let next = *slot + op.delta;
        if next < 0 {
            return Err(NegativeBucket {
                bucket: op.bucket,
                current: *slot,
                delta: op.delta,
            });
        }
        *slot = next;
        Ok(())
    }

    /// Apply a batch of deltas atomically: either all succeed or none apply.
    pub fn apply_all(&mut self, ops: &[StockOperation]) -> Result<(), NegativeBucket> {
        let mut staged = *self;
        for op in ops {
            staged.apply(*op)?;
        }
        *self = staged;
        Ok(())
    }
}

/// One signed bucket delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOperation {
    pub bucket: StockBucket,
    pub delta: i64,
}

impl StockOperation {
    pub fn add(bucket: StockBucket, quantity: i64) -> Self {
        Self {
            bucket,
            delta: quantity,
        }
    }

    pub fn remove(bucket: StockBucket, quantity: i64) -> Self {
        Self {
            bucket,
            delta: -quantity,
        }
    }
}

/// A bucket delta that would have produced a negative count
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("bucket {bucket:?} would go negative: current {current}, delta {delta}")]
pub struct NegativeBucket {
    pub bucket: StockBucket,
    pub current: i64,
    pub delta: i64,
}
