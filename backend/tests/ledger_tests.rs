//! Quantity ledger tests
//!
//! Covers the eight-bucket accounting model:
//! - Item states map onto their ledger buckets
//! - Movements are balanced REMOVE/ADD pairs
//! - Bucket counts never go negative and batches apply atomically
//! - The bucket-sum-equals-item-count invariant check

use proptest::prelude::*;

use shared::{
    check_invariant, movement, movement_of, ItemState, StockBucket, StockLevels, StockOperation,
};

fn state_strategy() -> impl Strategy<Value = ItemState> {
    prop_oneof![
        Just(ItemState::Available),
        Just(ItemState::Reserved),
        Just(ItemState::PendingReception),
        Just(ItemState::InTransit),
        Just(ItemState::DeliveryProcessing),
        Just(ItemState::Delivered),
        Just(ItemState::IsDead),
        Just(ItemState::Discovered),
    ]
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn every_item_state_has_its_own_bucket() {
        let buckets: Vec<StockBucket> = [
            ItemState::Available,
            ItemState::Reserved,
            ItemState::PendingReception,
            ItemState::InTransit,
            ItemState::DeliveryProcessing,
            ItemState::Delivered,
            ItemState::IsDead,
            ItemState::Discovered,
        ]
        .iter()
        .map(|s| s.bucket())
        .collect();

        assert_eq!(buckets.len(), StockBucket::ALL.len());
        for bucket in StockBucket::ALL {
            assert!(buckets.contains(&bucket), "no state maps to {bucket:?}");
        }
    }

    #[test]
    fn bucket_columns_are_snake_case() {
        for bucket in StockBucket::ALL {
            assert!(bucket
                .column()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn reservation_is_remove_then_add() {
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
    fn purchase_intake_only_adds() {
        // Units minted at reception validation enter the ledger with no
        // matching remove
        let ops = movement(None, Some(ItemState::Available));
        assert_eq!(ops, vec![StockOperation::add(StockBucket::Available, 1)]);
    }

    #[test]
    fn write_off_only_removes() {
        let ops = movement(Some(ItemState::IsDead), None);
        assert_eq!(ops, vec![StockOperation::remove(StockBucket::IsDead, 1)]);
    }

    #[test]
    fn movement_of_scales_both_sides() {
        let ops = movement_of(Some(ItemState::InTransit), Some(ItemState::PendingReception), 7);
        assert_eq!(
            ops,
            vec![
                StockOperation::remove(StockBucket::InTransit, 7),
                StockOperation::add(StockBucket::PendingReception, 7),
            ]
        );
    }

    #[test]
    fn batch_apply_is_atomic() {
        let mut levels = StockLevels {
            available: 2,
            ..Default::default()
        };
        // Second op would drive reserved negative; the first must not stick
        let ops = [
            StockOperation::remove(StockBucket::Available, 1),
            StockOperation::remove(StockBucket::Reserved, 1),
        ];
        assert!(levels.apply_all(&ops).is_err());
        assert_eq!(levels.available, 2);
    }

    #[test]
    fn invariant_accepts_matching_counts() {
        let levels = StockLevels {
            available: 2,
            reserved: 3,
            in_transit: 1,
            ..Default::default()
        };
        assert!(check_invariant(&levels, 6).is_ok());
    }

    #[test]
    fn invariant_reports_both_sides_of_the_drift() {
        let levels = StockLevels {
            available: 2,
            ..Default::default()
        };
        let err = check_invariant(&levels, 5).unwrap_err();
        assert_eq!(err.bucket_total, 2);
        assert_eq!(err.item_count, 5);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A chain of unit movements never changes the bucket sum
    #[test]
    fn movement_chains_preserve_totals(
        transitions in prop::collection::vec((state_strategy(), state_strategy()), 1..20)
    ) {
        let mut levels = StockLevels {
            available: 100,
            reserved: 100,
            pending_reception: 100,
            in_transit: 100,
            delivery_processing: 100,
            delivered: 100,
            is_dead: 100,
            discovered: 100,
        };
        let before = levels.total();
        for (from, to) in transitions {
            let ops = movement(Some(from), Some(to));
            levels.apply_all(&ops).unwrap();
        }
        prop_assert_eq!(levels.total(), before);
    }

    /// Scaled movements stay balanced for any quantity
    #[test]
    fn scaled_movements_are_balanced(
        from in state_strategy(),
        to in state_strategy(),
        quantity in 0i64..10_000,
    ) {
        let ops = movement_of(Some(from), Some(to), quantity);
        let net: i64 = ops.iter().map(|op| op.delta).sum();
        prop_assert_eq!(net, 0);
    }

    /// Applying any single-unit movement to empty levels fails unless the
    /// movement is intake-only, and failure leaves the levels untouched
    #[test]
    fn empty_levels_reject_outbound_movements(from in state_strategy(), to in state_strategy()) {
        let mut levels = StockLevels::default();
        let ops = movement(Some(from), Some(to));
        let result = levels.apply_all(&ops);
        if ops.is_empty() {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(levels, StockLevels::default());
        }
    }
}
