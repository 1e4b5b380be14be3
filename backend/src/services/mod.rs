//! Business logic services for the warehouse fulfillment platform

pub mod allocation;
pub mod availability;
pub mod cancellation;
pub mod ledger;
pub mod order;
pub mod processing;
pub mod purchase;
pub mod reception;
pub mod reference;
pub mod storage_point;
pub mod transfert;

pub use availability::AvailabilityService;
pub use cancellation::CancellationService;
pub use ledger::LedgerService;
pub use order::OrderService;
pub use processing::ProcessingService;
pub use purchase::PurchaseService;
pub use reception::ReceptionService;
pub use reference::ReferenceService;
pub use storage_point::StoragePointService;
pub use transfert::TransfertService;
