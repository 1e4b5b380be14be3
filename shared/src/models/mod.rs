//! Domain models for the Warehouse Fulfillment Platform

pub mod item;
pub mod location;
pub mod order;
pub mod processing;
pub mod purchase;
pub mod reception;
pub mod stock;
pub mod transfert;

pub use item::*;
pub use location::*;
pub use order::*;
pub use processing::*;
pub use purchase::*;
pub use reception::*;
pub use stock::*;
pub use transfert::*;
