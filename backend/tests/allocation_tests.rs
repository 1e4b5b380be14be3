//! Allocation planning tests
//!
//! Covers sourcing of availability shortfalls:
//! - Transfer-first planning with the (priority, storage point id) tie-break
//! - Purchase routing for the uncoverable remainder
//! - The in-agency rule: withdrawal orders never source via transfert

use proptest::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use shared::{plan_allocation, DeliveryMode, LineShortfall, SourceStock};

fn shortfall(variant_id: Uuid, missing: i64) -> LineShortfall {
    LineShortfall {
        variant_id,
        requested: missing,
        available: 0,
        missing,
    }
}

fn source(storage_point_id: Uuid, priority: i32, available: i64) -> SourceStock {
    SourceStock {
        storage_point_id,
        priority,
        available,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn empty_shortfalls_yield_empty_plan() {
        let plan = plan_allocation(&[], &HashMap::new(), DeliveryMode::AtHome);
        assert!(plan.is_empty());
    }

    #[test]
    fn single_source_covers_in_one_transfert() {
        let v = Uuid::new_v4();
        let sp = Uuid::new_v4();
        let sources = HashMap::from([(v, vec![source(sp, 1, 10)])]);
        let plan = plan_allocation(&[shortfall(v, 6)], &sources, DeliveryMode::AtHome);
        assert_eq!(plan.transfers.len(), 1);
        assert_eq!(plan.transfers[&sp], vec![shared::TransferAllocation {
            variant_id: v,
            quantity: 6,
        }]);
        assert!(plan.purchases.is_empty());
    }

    #[test]
    fn lower_priority_number_wins() {
        let v = Uuid::new_v4();
        let primary = Uuid::new_v4();
        let overflow = Uuid::new_v4();
        let sources = HashMap::from([(v, vec![source(overflow, 20, 50), source(primary, 1, 50)])]);
        let plan = plan_allocation(&[shortfall(v, 10)], &sources, DeliveryMode::AtHome);
        assert_eq!(plan.transfers.len(), 1);
        assert_eq!(plan.transfers[&primary][0].quantity, 10);
    }

    #[test]
    fn drains_sources_in_order_before_purchasing() {
        let v = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let sources = HashMap::from([(v, vec![source(first, 1, 4), source(second, 2, 3)])]);
        let plan = plan_allocation(&[shortfall(v, 10)], &sources, DeliveryMode::AtHome);
        assert_eq!(plan.transfers[&first][0].quantity, 4);
        assert_eq!(plan.transfers[&second][0].quantity, 3);
        assert_eq!(plan.purchase_total(), 3);
    }

    #[test]
    fn one_transfert_per_source_across_lines() {
        // Two variants drawing from the same source collapse into one
        // planned transfert with two lines
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let sp = Uuid::new_v4();
        let sources = HashMap::from([
            (a, vec![source(sp, 1, 5)]),
            (b, vec![source(sp, 1, 5)]),
        ]);
        let plan = plan_allocation(
            &[shortfall(a, 2), shortfall(b, 3)],
            &sources,
            DeliveryMode::AtHome,
        );
        assert_eq!(plan.transfers.len(), 1);
        assert_eq!(plan.transfers[&sp].len(), 2);
        assert_eq!(plan.transfer_total(), 5);
    }

    #[test]
    fn in_agency_routes_everything_to_purchase() {
        let v = Uuid::new_v4();
        let sp = Uuid::new_v4();
        let sources = HashMap::from([(v, vec![source(sp, 1, 100)])]);
        let plan = plan_allocation(&[shortfall(v, 8)], &sources, DeliveryMode::InAgency);
        assert!(plan.transfers.is_empty());
        assert_eq!(plan.purchase_total(), 8);
    }

    #[test]
    fn exhausted_source_is_skipped() {
        let v = Uuid::new_v4();
        let empty = Uuid::new_v4();
        let stocked = Uuid::new_v4();
        let sources = HashMap::from([(v, vec![source(empty, 1, 0), source(stocked, 2, 9)])]);
        let plan = plan_allocation(&[shortfall(v, 5)], &sources, DeliveryMode::AtHome);
        assert!(!plan.transfers.contains_key(&empty));
        assert_eq!(plan.transfers[&stocked][0].quantity, 5);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[derive(Debug, Clone)]
struct PlanningCase {
    shortfalls: Vec<LineShortfall>,
    sources: HashMap<Uuid, Vec<SourceStock>>,
}

fn planning_case_strategy() -> impl Strategy<Value = PlanningCase> {
    let candidate = (0i32..10, 0i64..20);
    prop::collection::vec((1i64..30, prop::collection::vec(candidate, 0..4)), 1..6).prop_map(
        |lines| {
            let mut shortfalls = Vec::new();
            let mut sources = HashMap::new();
            for (missing, candidates) in lines {
                let variant_id = Uuid::new_v4();
                shortfalls.push(shortfall(variant_id, missing));
                sources.insert(
                    variant_id,
                    candidates
                        .into_iter()
                        .map(|(priority, available)| source(Uuid::new_v4(), priority, available))
                        .collect(),
                );
            }
            PlanningCase { shortfalls, sources }
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every missing unit ends up either on a transfert or on the purchase,
    /// never both, never dropped
    #[test]
    fn plan_conserves_missing_quantity(case in planning_case_strategy()) {
        let plan = plan_allocation(&case.shortfalls, &case.sources, DeliveryMode::AtHome);
        let missing_total: i64 = case.shortfalls.iter().map(|s| s.missing).sum();
        prop_assert_eq!(plan.transfer_total() + plan.purchase_total(), missing_total);
    }

    /// A planned transfert never takes more from a source than it holds
    #[test]
    fn plan_respects_source_stock(case in planning_case_strategy()) {
        let plan = plan_allocation(&case.shortfalls, &case.sources, DeliveryMode::AtHome);
        for (sp, lines) in &plan.transfers {
            for planned in lines {
                let available = case.sources[&planned.variant_id]
                    .iter()
                    .find(|c| c.storage_point_id == *sp)
                    .map(|c| c.available)
                    .unwrap_or(0);
                prop_assert!(planned.quantity > 0);
                prop_assert!(planned.quantity <= available);
            }
        }
    }

    /// In-agency planning is purchase-only whatever the sibling stock
    #[test]
    fn in_agency_never_plans_transfers(case in planning_case_strategy()) {
        let plan = plan_allocation(&case.shortfalls, &case.sources, DeliveryMode::InAgency);
        let missing_total: i64 = case.shortfalls.iter().map(|s| s.missing).sum();
        prop_assert!(plan.transfers.is_empty());
        prop_assert_eq!(plan.purchase_total(), missing_total);
    }
}
