//! Shared types and models for the Warehouse Fulfillment Platform
//!
//! This crate contains the domain model and the pure fulfillment core
//! (availability resolution, allocation planning, the order state machine
//! and the quantity ledger arithmetic) shared by the backend and tooling.

pub mod fulfillment;
pub mod models;
pub mod types;
pub mod validation;

pub use fulfillment::*;
pub use models::*;
pub use types::*;
pub use validation::*;
