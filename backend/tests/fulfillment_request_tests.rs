//! Request validation and domain glue tests
//!
//! Covers the boundary checks that run before any aggregate is loaded:
//! - Line, pricing and picked-quantity validation
//! - Instalment schedule validation
//! - Payment terms storage round-trips
//! - Reference kinds and cancellation-to-intake mapping

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{
    validate_instalments, validate_line_requests, validate_picked_quantity, validate_pricing,
    CancelReason, Instalment, LineRequest, OrderChange, PaymentTerms, ReceptionType, ReferenceKind,
};

fn line(quantity: i64) -> LineRequest {
    LineRequest {
        variant_id: Uuid::new_v4(),
        quantity,
    }
}

fn instalment(due: &str, amount_cents: i64) -> Instalment {
    Instalment {
        due_date: NaiveDate::parse_from_str(due, "%Y-%m-%d").unwrap(),
        amount: Decimal::new(amount_cents, 2),
        paid_at: None,
    }
}

// ============================================================================
// Line Validation
// ============================================================================

#[cfg(test)]
mod line_validation_tests {
    use super::*;

    #[test]
    fn accepts_distinct_positive_lines() {
        assert!(validate_line_requests(&[line(1), line(30)]).is_ok());
    }

    #[test]
    fn rejects_empty_orders() {
        assert!(validate_line_requests(&[]).is_err());
    }

    #[test]
    fn rejects_non_positive_quantities() {
        assert!(validate_line_requests(&[line(0)]).is_err());
        assert!(validate_line_requests(&[line(-2)]).is_err());
    }

    #[test]
    fn rejects_duplicate_variants() {
        let first = line(2);
        let duplicate = LineRequest {
            variant_id: first.variant_id,
            quantity: 5,
        };
        assert!(validate_line_requests(&[first, line(1), duplicate]).is_err());
    }

    #[test]
    fn pricing_bounds_the_discount() {
        let price = Decimal::new(1999, 2);
        assert!(validate_pricing(price, Decimal::ZERO).is_ok());
        assert!(validate_pricing(price, price).is_ok());
        assert!(validate_pricing(price, Decimal::new(2000, 2)).is_err());
        assert!(validate_pricing(Decimal::new(-1, 2), Decimal::ZERO).is_err());
    }

    #[test]
    fn picked_quantity_is_bounded_by_ordered() {
        assert!(validate_picked_quantity(0, 3).is_ok());
        assert!(validate_picked_quantity(3, 3).is_ok());
        assert!(validate_picked_quantity(4, 3).is_err());
        assert!(validate_picked_quantity(-1, 3).is_err());
    }
}

// ============================================================================
// Payment Terms
// ============================================================================

#[cfg(test)]
mod payment_tests {
    use super::*;

    #[test]
    fn default_terms_are_immediate() {
        assert_eq!(PaymentTerms::default(), PaymentTerms::Immediate);
    }

    #[test]
    fn instalment_schedule_must_be_ascending() {
        let ascending = [
            instalment("2026-09-01", 5000),
            instalment("2026-10-01", 5000),
        ];
        assert!(validate_instalments(&ascending).is_ok());

        let descending = [
            instalment("2026-10-01", 5000),
            instalment("2026-09-01", 5000),
        ];
        assert!(validate_instalments(&descending).is_err());
    }

    #[test]
    fn instalment_amounts_must_be_positive() {
        assert!(validate_instalments(&[instalment("2026-09-01", 0)]).is_err());
        assert!(validate_instalments(&[]).is_err());
    }

    #[test]
    fn terms_survive_the_storage_boundary() {
        let terms = PaymentTerms::Instalments {
            schedule: vec![
                instalment("2026-09-01", 5000),
                instalment("2026-10-01", 2500),
            ],
        };
        let stored = terms.to_storage().unwrap();
        assert_eq!(stored["mode"], "instalments");
        assert_eq!(PaymentTerms::from_storage(stored).unwrap(), terms);
    }

    #[test]
    fn advance_terms_carry_the_amount() {
        let terms = PaymentTerms::Advance {
            amount: Decimal::new(10_000, 2),
            paid_at: None,
        };
        let stored = terms.to_storage().unwrap();
        assert_eq!(stored["mode"], "advance");
        assert_eq!(PaymentTerms::from_storage(stored).unwrap(), terms);
    }
}

// ============================================================================
// Recorded Changes
// ============================================================================

#[cfg(test)]
mod change_tests {
    use super::*;

    #[test]
    fn change_lists_survive_the_storage_boundary() {
        let changes = vec![
            OrderChange::ChangeQuantity {
                line_id: Uuid::new_v4(),
                quantity: 3,
            },
            OrderChange::AddLine {
                variant_id: Uuid::new_v4(),
                quantity: 1,
                price: Decimal::new(4500, 2),
            },
            OrderChange::ChangeDeliveryMode {
                delivery_mode: shared::DeliveryMode::InAgency,
            },
        ];
        let stored = OrderChange::list_to_storage(&changes).unwrap();
        assert_eq!(OrderChange::list_from_storage(stored).unwrap(), changes);
    }

    #[test]
    fn empty_change_list_is_an_empty_array() {
        let stored = OrderChange::list_to_storage(&[]).unwrap();
        assert_eq!(stored, serde_json::json!([]));
    }
}

// ============================================================================
// References and Intake Mapping
// ============================================================================

#[cfg(test)]
mod reference_tests {
    use super::*;

    #[test]
    fn reference_prefixes_are_distinct() {
        let kinds = [
            ReferenceKind::Order,
            ReferenceKind::Transfert,
            ReferenceKind::PurchaseOrder,
            ReferenceKind::Reception,
            ReferenceKind::OrderProcessing,
            ReferenceKind::ProductItem,
        ];
        let mut prefixes: Vec<&str> = kinds.iter().map(|k| k.prefix()).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), kinds.len());
    }

    #[test]
    fn failed_delivery_cancellation_is_a_customer_return() {
        assert_eq!(
            ReceptionType::from_cancel_reason(CancelReason::DeliveryFailed),
            ReceptionType::CustomerReturn
        );
        for reason in [
            CancelReason::CustomerRequest,
            CancelReason::OutOfStock,
            CancelReason::Duplicate,
            CancelReason::Other,
        ] {
            assert_eq!(
                ReceptionType::from_cancel_reason(reason),
                ReceptionType::OrderCancellation
            );
        }
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Validation accepts exactly the lines with positive quantities and
    /// distinct variants
    #[test]
    fn line_validation_is_consistent(quantities in prop::collection::vec(-5i64..50, 1..8)) {
        let lines: Vec<LineRequest> = quantities.iter().map(|q| line(*q)).collect();
        let all_positive = quantities.iter().all(|q| *q > 0);
        // Variants are freshly generated, so duplicates cannot occur here
        prop_assert_eq!(validate_line_requests(&lines).is_ok(), all_positive);
    }

    /// Picked-quantity validation accepts exactly the closed range
    /// [0, ordered]
    #[test]
    fn picked_validation_is_a_range_check(picked in -10i64..100, ordered in 0i64..50) {
        let ok = validate_picked_quantity(picked, ordered).is_ok();
        prop_assert_eq!(ok, (0..=ordered).contains(&picked));
    }
}
