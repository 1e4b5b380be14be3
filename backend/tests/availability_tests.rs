//! Availability resolution tests
//!
//! Covers classification of requested lines against a ledger snapshot:
//! - ALL / SOME / NONE status assignment
//! - Shortfall reporting per line
//! - Purity of resolution over a fixed snapshot

use proptest::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use shared::{resolve_availability, AvailabilityStatus, LineRequest};

fn line(variant_id: Uuid, quantity: i64) -> LineRequest {
    LineRequest {
        variant_id,
        quantity,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn exact_stock_is_all() {
        let v = Uuid::new_v4();
        let snapshot = HashMap::from([(v, 4)]);
        let report = resolve_availability(&[line(v, 4)], &snapshot);
        assert_eq!(report.status, AvailabilityStatus::All);
        assert!(report.shortfalls.is_empty());
        assert_eq!(report.missing_total(), 0);
    }

    #[test]
    fn surplus_stock_is_all() {
        let v = Uuid::new_v4();
        let snapshot = HashMap::from([(v, 100)]);
        let report = resolve_availability(&[line(v, 4)], &snapshot);
        assert_eq!(report.status, AvailabilityStatus::All);
    }

    #[test]
    fn empty_snapshot_is_none() {
        let v = Uuid::new_v4();
        let report = resolve_availability(&[line(v, 4)], &HashMap::new());
        assert_eq!(report.status, AvailabilityStatus::None);
        assert_eq!(report.missing_total(), 4);
    }

    #[test]
    fn one_served_line_is_enough_for_some() {
        // Two lines, one fully out of stock: any served unit lifts the
        // classification from NONE to SOME
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let snapshot = HashMap::from([(a, 1), (b, 0)]);
        let report = resolve_availability(&[line(a, 3), line(b, 2)], &snapshot);
        assert_eq!(report.status, AvailabilityStatus::Partial);
        assert_eq!(report.shortfalls.len(), 2);
        assert_eq!(report.missing_total(), 2 + 2);
    }

    #[test]
    fn all_lines_empty_is_none() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let snapshot = HashMap::from([(a, 0), (b, 0)]);
        let report = resolve_availability(&[line(a, 3), line(b, 2)], &snapshot);
        assert_eq!(report.status, AvailabilityStatus::None);
        assert_eq!(report.missing_total(), 5);
    }

    #[test]
    fn shortfalls_keep_request_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let snapshot = HashMap::from([(a, 0), (b, 10), (c, 1)]);
        let report = resolve_availability(&[line(a, 2), line(b, 2), line(c, 3)], &snapshot);
        let variants: Vec<Uuid> = report.shortfalls.iter().map(|s| s.variant_id).collect();
        assert_eq!(variants, vec![a, c]);
    }

    #[test]
    fn negative_snapshot_counts_as_empty() {
        // A corrupted snapshot must not produce negative shortfall math
        let v = Uuid::new_v4();
        let snapshot = HashMap::from([(v, -3)]);
        let report = resolve_availability(&[line(v, 2)], &snapshot);
        assert_eq!(report.status, AvailabilityStatus::None);
        assert_eq!(report.shortfalls[0].available, 0);
        assert_eq!(report.shortfalls[0].missing, 2);
    }

    #[test]
    fn status_serializes_as_documented_words() {
        assert_eq!(AvailabilityStatus::All.as_str(), "all");
        assert_eq!(AvailabilityStatus::Partial.as_str(), "some");
        assert_eq!(AvailabilityStatus::None.as_str(), "none");
        assert_eq!(
            serde_json::to_string(&AvailabilityStatus::Partial).unwrap(),
            "\"some\""
        );
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn request_strategy() -> impl Strategy<Value = (Vec<i64>, Vec<i64>)> {
    // Parallel requested / available vectors of the same length
    prop::collection::vec((1i64..50, 0i64..60), 1..8)
        .prop_map(|pairs| pairs.into_iter().unzip())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Missing totals never exceed requested totals and never go negative
    #[test]
    fn missing_is_bounded_by_request((requested, available) in request_strategy()) {
        let variants: Vec<Uuid> = requested.iter().map(|_| Uuid::new_v4()).collect();
        let lines: Vec<LineRequest> = variants
            .iter()
            .zip(&requested)
            .map(|(v, q)| line(*v, *q))
            .collect();
        let snapshot: HashMap<Uuid, i64> =
            variants.iter().copied().zip(available.iter().copied()).collect();

        let report = resolve_availability(&lines, &snapshot);
        let total_requested: i64 = requested.iter().sum();

        prop_assert!(report.missing_total() >= 0);
        prop_assert!(report.missing_total() <= total_requested);
        for shortfall in &report.shortfalls {
            prop_assert!(shortfall.missing > 0);
            prop_assert_eq!(
                shortfall.missing,
                shortfall.requested - shortfall.available.min(shortfall.requested)
            );
        }
    }

    /// Status is ALL exactly when nothing is missing, NONE exactly when
    /// nothing is served
    #[test]
    fn status_matches_shortfalls((requested, available) in request_strategy()) {
        let variants: Vec<Uuid> = requested.iter().map(|_| Uuid::new_v4()).collect();
        let lines: Vec<LineRequest> = variants
            .iter()
            .zip(&requested)
            .map(|(v, q)| line(*v, *q))
            .collect();
        let snapshot: HashMap<Uuid, i64> =
            variants.iter().copied().zip(available.iter().copied()).collect();

        let report = resolve_availability(&lines, &snapshot);
        let served: i64 = lines
            .iter()
            .map(|l| snapshot[&l.variant_id].max(0).min(l.quantity))
            .sum();

        match report.status {
            AvailabilityStatus::All => prop_assert_eq!(report.missing_total(), 0),
            AvailabilityStatus::Partial => {
                prop_assert!(report.missing_total() > 0);
                prop_assert!(served > 0);
            }
            AvailabilityStatus::None => prop_assert_eq!(served, 0),
        }
    }
}
