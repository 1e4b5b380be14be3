//! Ledger movement arithmetic: every physical-unit transition becomes a
//! paired REMOVE/ADD across buckets

use crate::models::{ItemState, NegativeBucket, StockLevels, StockOperation};

/// Bucket operations for one unit moving `from` -> `to`.
///
/// `None` on either side models a unit entering the ledger (discovery,
/// purchase intake) or leaving it (write-off); both sides `None` is a no-op,
/// as is a transition that stays within the same bucket. The REMOVE always
/// precedes the ADD so a batch can be audited as pairs.
pub fn movement(from: Option<ItemState>, to: Option<ItemState>) -> Vec<StockOperation> {
    let from_bucket = from.map(|s| s.bucket());
    let to_bucket = to.map(|s| s.bucket());
    if from_bucket == to_bucket {
        return Vec::new();
    }

    let mut ops = Vec::with_capacity(2);
    if let Some(bucket) = from_bucket {
        ops.push(StockOperation::remove(bucket, 1));
    }
    if let Some(bucket) = to_bucket {
        ops.push(StockOperation::add(bucket, 1));
    }
    ops
}

/// Bucket operations for `quantity` units making the same transition
pub fn movement_of(
    from: Option<ItemState>,
    to: Option<ItemState>,
    quantity: i64,
) -> Vec<StockOperation> {
    movement(from, to)
        .into_iter()
        .map(|op| StockOperation {
            bucket: op.bucket,
            delta: op.delta * quantity,
        })
        .collect()
}

/// Check the accounting invariant for one (variant, storage point) pair:
/// the bucket sum must equal the number of physical units recorded there.
pub fn check_invariant(levels: &StockLevels, item_count: i64) -> Result<(), LedgerImbalance> {
    let total = levels.total();
    if total != item_count {
        return Err(LedgerImbalance {
            bucket_total: total,
            item_count,
        });
    }
    Ok(())
}

/// Bucket sums drifted from physical unit counts; a consistency violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ledger imbalance: bucket total {bucket_total} != item count {item_count}")]
pub struct LedgerImbalance {
    pub bucket_total: i64,
    pub item_count: i64,
}

/// Apply a unit transition to in-memory levels, rejecting negative buckets
pub fn apply_movement(
    levels: &mut StockLevels,
    from: Option<ItemState>,
    to: Option<ItemState>,
) -> Result<(), NegativeBucket> {
    levels.apply_all(&movement(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StockBucket;

    #[test]
    fn movement_is_a_remove_add_pair() {
        let ops = movement(Some(ItemState::Available), Some(ItemState::Reserved));
        assert_eq!(
            ops,
            vec![
                StockOperation::remove(StockBucket::Available, 1),
                StockOperation::add(StockBucket::Reserved, 1),
            ]
        );
    }

    #[test]
    fn same_bucket_transition_is_a_noop() {
        assert!(movement(Some(ItemState::Available), Some(ItemState::Available)).is_empty());
        assert!(movement(None, None).is_empty());
    }

    #[test]
    fn entering_the_ledger_only_adds() {
        let ops = movement(None, Some(ItemState::PendingReception));
        assert_eq!(
            ops,
            vec![StockOperation::add(StockBucket::PendingReception, 1)]
        );
    }

    #[test]
    fn movement_preserves_bucket_total() {
        let mut levels = StockLevels {
            available: 5,
            ..Default::default()
        };
        let before = levels.total();
        apply_movement(&mut levels, Some(ItemState::Available), Some(ItemState::Reserved)).unwrap();
        assert_eq!(levels.total(), before);
        assert_eq!(levels.available, 4);
        assert_eq!(levels.reserved, 1);
    }

    #[test]
    fn negative_bucket_is_rejected_without_partial_apply() {
        let mut levels = StockLevels::default();
        let err = apply_movement(&mut levels, Some(ItemState::Available), Some(ItemState::Reserved));
        assert!(err.is_err());
        // Nothing applied: the ADD side must not leak
        assert_eq!(levels, StockLevels::default());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn state_strategy() -> impl Strategy<Value = ItemState> {
            prop_oneof![
                Just(ItemState::Available),
                Just(ItemState::Reserved),
                Just(ItemState::InTransit),
                Just(ItemState::PendingReception),
                Just(ItemState::DeliveryProcessing),
                Just(ItemState::Delivered),
                Just(ItemState::IsDead),
                Just(ItemState::Discovered),
            ]
        }

        proptest! {
            /// A state-to-state movement never changes the bucket sum
            #[test]
            fn movements_preserve_totals(from in state_strategy(), to in state_strategy()) {
                let mut levels = StockLevels {
                    available: 10, reserved: 10, in_transit: 10, pending_reception: 10,
                    delivery_processing: 10, delivered: 10, is_dead: 10, discovered: 10,
                };
                let before = levels.total();
                apply_movement(&mut levels, Some(from), Some(to)).unwrap();
                prop_assert_eq!(levels.total(), before);
            }

            /// Movements always come in REMOVE/ADD pairs of equal magnitude
            #[test]
            fn movements_are_balanced(from in state_strategy(), to in state_strategy()) {
                let ops = movement(Some(from), Some(to));
                let net: i64 = ops.iter().map(|op| op.delta).sum();
                prop_assert_eq!(net, 0);
            }
        }
    }

    #[test]
    fn invariant_detects_drift() {
        let levels = StockLevels {
            available: 3,
            reserved: 1,
            ..Default::default()
        };
        assert!(check_invariant(&levels, 4).is_ok());
        assert!(check_invariant(&levels, 5).is_err());
    }
}
