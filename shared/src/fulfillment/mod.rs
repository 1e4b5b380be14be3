//! Pure fulfillment core: availability resolution, allocation planning,
//! the order state machine, ledger movements and partial-fulfillment splits.
//!
//! Nothing in this module touches storage. Every function is deterministic
//! over its inputs so the backend can wrap each decision in a single
//! transaction and property-test the logic without a database.

pub mod allocation;
pub mod availability;
pub mod ledger;
pub mod split;
pub mod state_machine;

pub use allocation::*;
pub use availability::*;
pub use ledger::*;
pub use split::*;
pub use state_machine::*;
