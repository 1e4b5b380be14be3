//! The order workflow state machine.
//!
//! An order's workflow state is the (status, step) pair. Only the documented
//! subset of the cross-product is reachable, and every move between states
//! goes through [`next_state`]: transitions outside the table are rejected,
//! never coerced, so callers cannot drift the two fields apart.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::allocation::AllocationPlan;
use super::availability::AvailabilityStatus;
use crate::models::{DeliveryMode, OrderStep, StepStatus};

/// Compound workflow state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderState {
    pub status: StepStatus,
    pub step: OrderStep,
}

impl OrderState {
    pub const fn new(status: StepStatus, step: OrderStep) -> Self {
        Self { status, step }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.status.as_str(), self.step.as_str())
    }
}

/// How placement sourcing resolved, derived from the availability report and
/// the allocation plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementOutcome {
    /// Every unit available at the target storage point
    AllAvailable,
    /// Shortfall fully covered by transferts
    TransferOnly,
    /// Covered by a mix of local stock/transferts and purchase
    Mixed,
    /// Nothing available locally, everything routed to purchase
    PurchaseOnly,
}

impl PlacementOutcome {
    /// Classify a resolved placement.
    ///
    /// A purchase-only plan still counts as Mixed when the target storage
    /// point covers part of the request itself; PurchaseOnly is reserved for
    /// the case where the entire requested quantity failed availability.
    pub fn classify(availability: AvailabilityStatus, plan: &AllocationPlan) -> Self {
        match availability {
            AvailabilityStatus::All => PlacementOutcome::AllAvailable,
            AvailabilityStatus::Partial | AvailabilityStatus::None => {
                let has_transfers = !plan.transfers.is_empty();
                let has_purchases = !plan.purchases.is_empty();
                match (has_transfers, has_purchases) {
                    (true, false) => PlacementOutcome::TransferOnly,
                    (true, true) => PlacementOutcome::Mixed,
                    (false, true) => {
                        if availability == AvailabilityStatus::None {
                            PlacementOutcome::PurchaseOnly
                        } else {
                            PlacementOutcome::Mixed
                        }
                    }
                    // No shortfall lines left to source; treat as locally covered
                    (false, false) => PlacementOutcome::AllAvailable,
                }
            }
        }
    }
}

/// Initial workflow state at placement
pub fn placement_state(outcome: PlacementOutcome) -> OrderState {
    match outcome {
        PlacementOutcome::AllAvailable => {
            OrderState::new(StepStatus::ToPickPack, OrderStep::PreparationInProgress)
        }
        PlacementOutcome::TransferOnly => {
            OrderState::new(StepStatus::ToTransfer, OrderStep::TransferInProgress)
        }
        PlacementOutcome::Mixed => {
            OrderState::new(StepStatus::ToTreat, OrderStep::TreatmentInProgress)
        }
        PlacementOutcome::PurchaseOnly => {
            OrderState::new(StepStatus::ToBuy, OrderStep::PurchaseInProgress)
        }
    }
}

/// Events that drive workflow transitions after placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    /// All spawned transferts/purchases have delivered their stock; the
    /// order becomes pickable
    SourcingFulfilled,
    /// Pick-pack validation completed
    Validate {
        /// Whether every line was fulfilled in the order's own storage point
        fulfilled_in_own_storage_point: bool,
        delivery_mode: DeliveryMode,
    },
    /// In-transit units arrived at the order's storage point
    TransferArrived,
    /// The absorbing reception was validated; units are pickable again
    ReceptionValidated { delivery_mode: DeliveryMode },
    /// Units handed to the delivery pipeline or the agency counter
    Output,
    /// Fleet assignment
    Assign,
    /// Delivery confirmed at the customer
    ValidateDelivery { cash_collected: bool },
    /// Cash collection recorded
    RegisterCashing,
    /// Delivery attempt failed and was reported for rescheduling
    Report,
    /// Paid order refunded
    Refund,
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::SourcingFulfilled => "sourcing_fulfilled",
            OrderEvent::Validate { .. } => "validate",
            OrderEvent::TransferArrived => "transfer_arrived",
            OrderEvent::ReceptionValidated { .. } => "reception_validated",
            OrderEvent::Output => "output",
            OrderEvent::Assign => "assign",
            OrderEvent::ValidateDelivery { .. } => "validate_delivery",
            OrderEvent::RegisterCashing => "register_cashing",
            OrderEvent::Report => "report",
            OrderEvent::Refund => "refund",
        }
    }
}

/// A transition outside the documented table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal order transition: {event} from {from}")]
pub struct IllegalTransition {
    pub from: OrderState,
    pub event: &'static str,
}

fn ready_step(delivery_mode: DeliveryMode) -> OrderStep {
    match delivery_mode {
        DeliveryMode::AtHome => OrderStep::DeliveryTreatment,
        DeliveryMode::InAgency => OrderStep::PendingWithdrawal,
    }
}

/// Resolve the next workflow state for `event` from `from`.
///
/// Returns [`IllegalTransition`] when the order's current state is not in
/// the event's precondition set. Cancellation is not an event here: it is
/// handled by the compensator, which only requires a non-terminal status.
pub fn next_state(from: OrderState, event: OrderEvent) -> Result<OrderState, IllegalTransition> {
    use OrderStep as Step;
    use StepStatus as Status;

    let illegal = || IllegalTransition {
        from,
        event: event.name(),
    };

    let next = match (from.status, from.step, event) {
        // Sourcing completed: the order becomes pickable
        (
            Status::ToTransfer | Status::ToTreat | Status::ToBuy | Status::ToReceived,
            Step::TransferInProgress
            | Step::TreatmentInProgress
            | Step::PurchaseInProgress
            | Step::AwaitingReception,
            OrderEvent::SourcingFulfilled,
        ) => OrderState::new(Status::ToPickPack, Step::PreparationInProgress),

        // Pick-pack validation
        (
            Status::ToPickPack,
            Step::PreparationInProgress,
            OrderEvent::Validate {
                fulfilled_in_own_storage_point,
                delivery_mode,
            },
        ) => {
            if fulfilled_in_own_storage_point {
                OrderState::new(Status::Ready, ready_step(delivery_mode))
            } else {
                OrderState::new(Status::ToReceived, Step::InTransit)
            }
        }

        // Stock fulfilled elsewhere travels to the order's storage point
        (Status::ToReceived, Step::InTransit, OrderEvent::TransferArrived) => {
            OrderState::new(Status::ToReceived, Step::AwaitingReception)
        }
        (
            Status::ToReceived,
            Step::AwaitingReception,
            OrderEvent::ReceptionValidated { delivery_mode },
        ) => OrderState::new(Status::Ready, ready_step(delivery_mode)),

        // Output to the delivery pipeline or the agency counter
        (Status::Ready, Step::DeliveryTreatment, OrderEvent::Output) => {
            OrderState::new(Status::ToDeliver, Step::DeliveryTreatment)
        }
        (Status::Ready, Step::PendingWithdrawal, OrderEvent::Output) => {
            OrderState::new(Status::PickedUp, Step::PendingWithdrawal)
        }

        // Fleet assignment, including re-assignment after a reported attempt
        (
            Status::ToDeliver | Status::Reported,
            Step::DeliveryTreatment,
            OrderEvent::Assign,
        ) => OrderState::new(Status::Assigned, Step::DeliveryInProgress),

        // Delivery confirmation
        (
            Status::Assigned | Status::ToDeliver | Status::PickedUp,
            Step::DeliveryInProgress | Step::DeliveryTreatment | Step::PendingWithdrawal,
            OrderEvent::ValidateDelivery { cash_collected },
        ) => {
            if cash_collected {
                OrderState::new(Status::Complete, Step::PaymentInProgress)
            } else {
                OrderState::new(Status::Delivered, Step::PaymentInProgress)
            }
        }

        // Cash collection closes the order
        (
            Status::Delivered | Status::Complete,
            Step::PaymentInProgress,
            OrderEvent::RegisterCashing,
        ) => OrderState::new(Status::Complete, Step::Closed),

        // Failed delivery attempt goes back to delivery treatment
        (
            Status::Assigned | Status::ToDeliver,
            Step::DeliveryInProgress | Step::DeliveryTreatment,
            OrderEvent::Report,
        ) => OrderState::new(Status::Reported, Step::DeliveryTreatment),

        // Refund of a paid order
        (
            Status::Delivered | Status::Complete,
            Step::PaymentInProgress,
            OrderEvent::Refund,
        ) => OrderState::new(Status::Refunded, Step::Closed),

        _ => return Err(illegal()),
    };

    Ok(next)
}

/// Whether the compensator may cancel an order in this state
pub fn can_cancel(state: OrderState) -> bool {
    !state.is_terminal() && state.status != StepStatus::Delivered
}
