//! Partial-fulfillment split tests
//!
//! Covers apportioning order lines between the validated parent and the
//! spawned child:
//! - Quantity and money conservation across the split
//! - Child line derivation
//! - Rejection of over-picks, unknown lines and empty picks

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{split_order, ArticleOrdered, ArticleStatus, SplitError};

fn article(quantity: i64, price_cents: i64, discount_cents: i64) -> ArticleOrdered {
    ArticleOrdered {
        id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        variant_id: Uuid::new_v4(),
        quantity,
        picked_quantity: 0,
        price: Decimal::new(price_cents, 2),
        discount: Decimal::new(discount_cents, 2),
        status: ArticleStatus::ToPickPack,
        position: 0,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn quantities_split_exactly() {
        let lines = vec![article(10, 2500, 0)];
        let split = split_order(&lines, &[(lines[0].id, 4)]).unwrap();
        assert_eq!(split.lines[0].parent_quantity, 4);
        assert_eq!(split.lines[0].child_quantity, 6);
    }

    #[test]
    fn totals_reprice_at_net_unit_price() {
        // 10 units at 25.00 with 5.00 discount: net 20.00 a unit
        let lines = vec![article(10, 2500, 500)];
        let split = split_order(&lines, &[(lines[0].id, 4)]).unwrap();
        assert_eq!(split.parent_total, Decimal::new(8000, 2));
        assert_eq!(split.child_total, Decimal::new(12000, 2));
    }

    #[test]
    fn complete_pick_has_no_child_lines() {
        let lines = vec![article(3, 1000, 0), article(2, 2000, 0)];
        let split = split_order(&lines, &[(lines[0].id, 3), (lines[1].id, 2)]).unwrap();
        assert!(split.is_complete());
        assert_eq!(split.child_lines().count(), 0);
        assert_eq!(split.child_total, Decimal::ZERO);
    }

    #[test]
    fn omitted_line_moves_wholly_to_child() {
        let lines = vec![article(3, 1000, 0), article(2, 2000, 0)];
        let split = split_order(&lines, &[(lines[0].id, 3)]).unwrap();
        assert!(!split.is_complete());
        let child: Vec<_> = split.child_lines().collect();
        assert_eq!(child.len(), 1);
        assert_eq!(child[0].line_id, lines[1].id);
        assert_eq!(child[0].child_quantity, 2);
    }

    #[test]
    fn overpick_is_rejected_with_the_offending_line() {
        let lines = vec![article(2, 1000, 0)];
        match split_order(&lines, &[(lines[0].id, 5)]).unwrap_err() {
            SplitError::OverPicked {
                line_id,
                picked,
                ordered,
            } => {
                assert_eq!(line_id, lines[0].id);
                assert_eq!(picked, 5);
                assert_eq!(ordered, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn negative_pick_is_rejected() {
        let lines = vec![article(2, 1000, 0)];
        assert!(matches!(
            split_order(&lines, &[(lines[0].id, -1)]).unwrap_err(),
            SplitError::OverPicked { .. }
        ));
    }

    #[test]
    fn unknown_line_is_rejected() {
        let lines = vec![article(2, 1000, 0)];
        let ghost = Uuid::new_v4();
        assert_eq!(
            split_order(&lines, &[(ghost, 1)]).unwrap_err(),
            SplitError::UnknownLine(ghost)
        );
    }

    #[test]
    fn empty_pick_is_rejected() {
        let lines = vec![article(2, 1000, 0)];
        assert_eq!(
            split_order(&lines, &[]).unwrap_err(),
            SplitError::NothingPicked
        );
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[derive(Debug, Clone)]
struct SplitCase {
    lines: Vec<ArticleOrdered>,
    picked: Vec<(Uuid, i64)>,
}

fn split_case_strategy() -> impl Strategy<Value = SplitCase> {
    // (quantity, price cents, discount fraction of price, picked fraction)
    prop::collection::vec((1i64..50, 100i64..100_000, 0u8..=100, 0u8..=100), 1..8).prop_map(
        |raw| {
            let mut lines = Vec::new();
            let mut picked = Vec::new();
            let mut any = false;
            for (quantity, price_cents, discount_pct, picked_pct) in raw {
                let discount_cents = price_cents * i64::from(discount_pct) / 100;
                let line = article(quantity, price_cents, discount_cents);
                let picked_qty = quantity * i64::from(picked_pct) / 100;
                if picked_qty > 0 {
                    any = true;
                }
                picked.push((line.id, picked_qty));
                lines.push(line);
            }
            if !any {
                // Guarantee the NothingPicked guard never trips
                picked[0].1 = lines[0].quantity;
            }
            SplitCase { lines, picked }
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Parent and child totals always sum to the original order total
    #[test]
    fn split_conserves_money(case in split_case_strategy()) {
        let original: Decimal = case.lines.iter().map(|l| l.line_total()).sum();
        let split = split_order(&case.lines, &case.picked).unwrap();
        prop_assert_eq!(split.parent_total + split.child_total, original);
    }

    /// Parent and child quantities always sum to the ordered quantity,
    /// per line
    #[test]
    fn split_conserves_quantities(case in split_case_strategy()) {
        let split = split_order(&case.lines, &case.picked).unwrap();
        for (line, line_split) in case.lines.iter().zip(&split.lines) {
            prop_assert_eq!(line_split.line_id, line.id);
            prop_assert_eq!(
                line_split.parent_quantity + line_split.child_quantity,
                line.quantity
            );
            prop_assert!(line_split.parent_quantity >= 0);
            prop_assert!(line_split.child_quantity >= 0);
        }
    }

    /// The split is complete exactly when every line was fully picked
    #[test]
    fn completeness_matches_picks(case in split_case_strategy()) {
        let split = split_order(&case.lines, &case.picked).unwrap();
        let fully_picked = case
            .lines
            .iter()
            .all(|l| case.picked.iter().any(|(id, qty)| id == &l.id && *qty == l.quantity));
        prop_assert_eq!(split.is_complete(), fully_picked);
    }
}
