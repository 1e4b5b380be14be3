//! Order workflow state machine tests
//!
//! Covers the compound (status, step) transition table:
//! - Placement outcome classification and initial states
//! - The documented event table, including delivery-mode branches
//! - Rejection of transitions outside the table
//! - Cancellation eligibility

use proptest::prelude::*;

use shared::{
    can_cancel, next_state, placement_state, plan_allocation, AllocationPlan, AvailabilityStatus,
    DeliveryMode, LineShortfall, OrderEvent, OrderState, OrderStep, PlacementOutcome,
    PurchaseAllocation, SourceStock, StepStatus, TransferAllocation,
};

fn state(status: StepStatus, step: OrderStep) -> OrderState {
    OrderState::new(status, step)
}

fn plan_with(transfers: bool, purchases: bool) -> AllocationPlan {
    let mut plan = AllocationPlan::default();
    if transfers {
        plan.transfers.insert(
            uuid::Uuid::new_v4(),
            vec![TransferAllocation {
                variant_id: uuid::Uuid::new_v4(),
                quantity: 1,
            }],
        );
    }
    if purchases {
        plan.purchases.push(PurchaseAllocation {
            variant_id: uuid::Uuid::new_v4(),
            quantity: 1,
        });
    }
    plan
}

// ============================================================================
// Placement Classification
// ============================================================================

#[cfg(test)]
mod placement_tests {
    use super::*;

    #[test]
    fn full_availability_is_all_available() {
        let outcome = PlacementOutcome::classify(AvailabilityStatus::All, &plan_with(false, false));
        assert_eq!(outcome, PlacementOutcome::AllAvailable);
        assert_eq!(
            placement_state(outcome),
            state(StepStatus::ToPickPack, OrderStep::PreparationInProgress)
        );
    }

    #[test]
    fn transfer_covered_shortfall_is_transfer_only() {
        let outcome =
            PlacementOutcome::classify(AvailabilityStatus::Partial, &plan_with(true, false));
        assert_eq!(outcome, PlacementOutcome::TransferOnly);
        assert_eq!(
            placement_state(outcome),
            state(StepStatus::ToTransfer, OrderStep::TransferInProgress)
        );
    }

    #[test]
    fn transfers_plus_purchase_is_mixed() {
        let outcome =
            PlacementOutcome::classify(AvailabilityStatus::Partial, &plan_with(true, true));
        assert_eq!(outcome, PlacementOutcome::Mixed);
        assert_eq!(
            placement_state(outcome),
            state(StepStatus::ToTreat, OrderStep::TreatmentInProgress)
        );
    }

    #[test]
    fn partial_local_stock_with_purchase_is_mixed_not_purchase_only() {
        // Some units came from the order's own storage point; the plan itself
        // only holds purchases, but the order is not purchase-only
        let outcome =
            PlacementOutcome::classify(AvailabilityStatus::Partial, &plan_with(false, true));
        assert_eq!(outcome, PlacementOutcome::Mixed);
    }

    #[test]
    fn nothing_available_with_purchase_plan_is_purchase_only() {
        let outcome = PlacementOutcome::classify(AvailabilityStatus::None, &plan_with(false, true));
        assert_eq!(outcome, PlacementOutcome::PurchaseOnly);
        assert_eq!(
            placement_state(outcome),
            state(StepStatus::ToBuy, OrderStep::PurchaseInProgress)
        );
    }

    #[test]
    fn classification_matches_planner_output() {
        // End-to-end: a shortfall with no sibling stock and in-agency delivery
        // must classify purchase-only
        let v = uuid::Uuid::new_v4();
        let shortfalls = [LineShortfall {
            variant_id: v,
            requested: 5,
            available: 0,
            missing: 5,
        }];
        let sources = std::collections::HashMap::from([(
            v,
            vec![SourceStock {
                storage_point_id: uuid::Uuid::new_v4(),
                priority: 1,
                available: 50,
            }],
        )]);
        let plan = plan_allocation(&shortfalls, &sources, DeliveryMode::InAgency);
        assert_eq!(
            PlacementOutcome::classify(AvailabilityStatus::None, &plan),
            PlacementOutcome::PurchaseOnly
        );
    }
}

// ============================================================================
// Transition Table
// ============================================================================

#[cfg(test)]
mod transition_tests {
    use super::*;

    #[test]
    fn sourcing_fulfilled_from_every_sourcing_state() {
        let sourcing_states = [
            state(StepStatus::ToTransfer, OrderStep::TransferInProgress),
            state(StepStatus::ToTreat, OrderStep::TreatmentInProgress),
            state(StepStatus::ToBuy, OrderStep::PurchaseInProgress),
            state(StepStatus::ToReceived, OrderStep::AwaitingReception),
        ];
        for from in sourcing_states {
            assert_eq!(
                next_state(from, OrderEvent::SourcingFulfilled).unwrap(),
                state(StepStatus::ToPickPack, OrderStep::PreparationInProgress),
                "from {from}"
            );
        }
    }

    #[test]
    fn validate_branches_on_fulfillment_location() {
        let from = state(StepStatus::ToPickPack, OrderStep::PreparationInProgress);
        let local = next_state(
            from,
            OrderEvent::Validate {
                fulfilled_in_own_storage_point: true,
                delivery_mode: DeliveryMode::InAgency,
            },
        )
        .unwrap();
        assert_eq!(local, state(StepStatus::Ready, OrderStep::PendingWithdrawal));

        let remote = next_state(
            from,
            OrderEvent::Validate {
                fulfilled_in_own_storage_point: false,
                delivery_mode: DeliveryMode::InAgency,
            },
        )
        .unwrap();
        assert_eq!(remote, state(StepStatus::ToReceived, OrderStep::InTransit));
    }

    #[test]
    fn transit_arrival_then_reception_reaches_ready() {
        let in_transit = state(StepStatus::ToReceived, OrderStep::InTransit);
        let awaiting = next_state(in_transit, OrderEvent::TransferArrived).unwrap();
        assert_eq!(
            awaiting,
            state(StepStatus::ToReceived, OrderStep::AwaitingReception)
        );
        let ready = next_state(
            awaiting,
            OrderEvent::ReceptionValidated {
                delivery_mode: DeliveryMode::AtHome,
            },
        )
        .unwrap();
        assert_eq!(ready, state(StepStatus::Ready, OrderStep::DeliveryTreatment));
    }

    #[test]
    fn home_delivery_pipeline_runs_to_closed() {
        let mut s = state(StepStatus::Ready, OrderStep::DeliveryTreatment);
        s = next_state(s, OrderEvent::Output).unwrap();
        assert_eq!(s, state(StepStatus::ToDeliver, OrderStep::DeliveryTreatment));
        s = next_state(s, OrderEvent::Assign).unwrap();
        assert_eq!(s, state(StepStatus::Assigned, OrderStep::DeliveryInProgress));
        s = next_state(s, OrderEvent::ValidateDelivery { cash_collected: false }).unwrap();
        assert_eq!(s, state(StepStatus::Delivered, OrderStep::PaymentInProgress));
        s = next_state(s, OrderEvent::RegisterCashing).unwrap();
        assert_eq!(s, state(StepStatus::Complete, OrderStep::Closed));
    }

    #[test]
    fn agency_withdrawal_skips_the_fleet() {
        let mut s = state(StepStatus::Ready, OrderStep::PendingWithdrawal);
        s = next_state(s, OrderEvent::Output).unwrap();
        assert_eq!(s, state(StepStatus::PickedUp, OrderStep::PendingWithdrawal));
        s = next_state(s, OrderEvent::ValidateDelivery { cash_collected: true }).unwrap();
        assert_eq!(s, state(StepStatus::Complete, OrderStep::PaymentInProgress));
    }

    #[test]
    fn reported_delivery_can_be_reassigned() {
        let assigned = state(StepStatus::Assigned, OrderStep::DeliveryInProgress);
        let reported = next_state(assigned, OrderEvent::Report).unwrap();
        assert_eq!(
            reported,
            state(StepStatus::Reported, OrderStep::DeliveryTreatment)
        );
        let reassigned = next_state(reported, OrderEvent::Assign).unwrap();
        assert_eq!(
            reassigned,
            state(StepStatus::Assigned, OrderStep::DeliveryInProgress)
        );
    }

    #[test]
    fn refund_requires_a_paid_order() {
        let delivered = state(StepStatus::Delivered, OrderStep::PaymentInProgress);
        assert_eq!(
            next_state(delivered, OrderEvent::Refund).unwrap(),
            state(StepStatus::Refunded, OrderStep::Closed)
        );
        let ready = state(StepStatus::Ready, OrderStep::DeliveryTreatment);
        assert!(next_state(ready, OrderEvent::Refund).is_err());
    }

    #[test]
    fn terminal_states_reject_every_event() {
        let terminals = [
            state(StepStatus::Complete, OrderStep::Closed),
            state(StepStatus::Refunded, OrderStep::Closed),
            state(StepStatus::Canceled, OrderStep::Closed),
        ];
        let events = [
            OrderEvent::SourcingFulfilled,
            OrderEvent::TransferArrived,
            OrderEvent::Output,
            OrderEvent::Assign,
            OrderEvent::RegisterCashing,
            OrderEvent::Report,
        ];
        for from in terminals {
            for event in events {
                assert!(next_state(from, event).is_err(), "{event:?} from {from}");
            }
        }
    }

    #[test]
    fn illegal_transition_reports_origin_and_event() {
        let from = state(StepStatus::Ready, OrderStep::DeliveryTreatment);
        let err = next_state(from, OrderEvent::SourcingFulfilled).unwrap_err();
        assert_eq!(err.from, from);
        assert_eq!(err.event, "sourcing_fulfilled");
    }
}

// ============================================================================
// Cancellation Eligibility
// ============================================================================

#[cfg(test)]
mod cancellation_tests {
    use super::*;

    #[test]
    fn active_states_are_cancellable() {
        for s in [
            state(StepStatus::ToPickPack, OrderStep::PreparationInProgress),
            state(StepStatus::ToTransfer, OrderStep::TransferInProgress),
            state(StepStatus::ToReceived, OrderStep::InTransit),
            state(StepStatus::Ready, OrderStep::DeliveryTreatment),
            state(StepStatus::Assigned, OrderStep::DeliveryInProgress),
            state(StepStatus::PickedUp, OrderStep::PendingWithdrawal),
        ] {
            assert!(can_cancel(s), "{s}");
        }
    }

    #[test]
    fn delivered_and_terminal_states_are_not() {
        for s in [
            state(StepStatus::Delivered, OrderStep::PaymentInProgress),
            state(StepStatus::Complete, OrderStep::Closed),
            state(StepStatus::Refunded, OrderStep::Closed),
            state(StepStatus::Canceled, OrderStep::Closed),
        ] {
            assert!(!can_cancel(s), "{s}");
        }
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn status_strategy() -> impl Strategy<Value = StepStatus> {
    prop_oneof![
        Just(StepStatus::ToPickPack),
        Just(StepStatus::ToTransfer),
        Just(StepStatus::ToTreat),
        Just(StepStatus::ToBuy),
        Just(StepStatus::ToReceived),
        Just(StepStatus::Ready),
        Just(StepStatus::ToDeliver),
        Just(StepStatus::PickedUp),
        Just(StepStatus::Assigned),
        Just(StepStatus::Delivered),
        Just(StepStatus::Complete),
        Just(StepStatus::Reported),
        Just(StepStatus::Refunded),
        Just(StepStatus::Canceled),
    ]
}

fn step_strategy() -> impl Strategy<Value = OrderStep> {
    prop_oneof![
        Just(OrderStep::PreparationInProgress),
        Just(OrderStep::TransferInProgress),
        Just(OrderStep::TreatmentInProgress),
        Just(OrderStep::PurchaseInProgress),
        Just(OrderStep::InTransit),
        Just(OrderStep::AwaitingReception),
        Just(OrderStep::DeliveryTreatment),
        Just(OrderStep::PendingWithdrawal),
        Just(OrderStep::DeliveryInProgress),
        Just(OrderStep::PaymentInProgress),
        Just(OrderStep::Closed),
    ]
}

fn event_strategy() -> impl Strategy<Value = OrderEvent> {
    prop_oneof![
        Just(OrderEvent::SourcingFulfilled),
        (any::<bool>(), any::<bool>()).prop_map(|(local, home)| OrderEvent::Validate {
            fulfilled_in_own_storage_point: local,
            delivery_mode: if home {
                DeliveryMode::AtHome
            } else {
                DeliveryMode::InAgency
            },
        }),
        Just(OrderEvent::TransferArrived),
        any::<bool>().prop_map(|home| OrderEvent::ReceptionValidated {
            delivery_mode: if home {
                DeliveryMode::AtHome
            } else {
                DeliveryMode::InAgency
            },
        }),
        Just(OrderEvent::Output),
        Just(OrderEvent::Assign),
        any::<bool>().prop_map(|cash| OrderEvent::ValidateDelivery {
            cash_collected: cash,
        }),
        Just(OrderEvent::RegisterCashing),
        Just(OrderEvent::Report),
        Just(OrderEvent::Refund),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Nothing leaves the closed step, and canceled/refunded orders accept
    /// no event at all. Complete is terminal too but still accepts cashing
    /// and refund while payment is in progress.
    #[test]
    fn closed_and_compensated_states_are_absorbing(
        status in status_strategy(),
        step in step_strategy(),
        event in event_strategy(),
    ) {
        let from = state(status, step);
        let compensated = matches!(status, StepStatus::Canceled | StepStatus::Refunded);
        if step == OrderStep::Closed || compensated {
            prop_assert!(next_state(from, event).is_err());
        }
    }

    /// A successful transition never lands on the state it left
    #[test]
    fn transitions_always_move(
        status in status_strategy(),
        step in step_strategy(),
        event in event_strategy(),
    ) {
        let from = state(status, step);
        if let Ok(next) = next_state(from, event) {
            prop_assert_ne!(next, from);
        }
    }
}
