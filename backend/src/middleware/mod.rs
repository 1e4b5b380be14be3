//! HTTP middleware for the warehouse fulfillment platform

pub mod identity;

pub use identity::{identity_middleware, CurrentIdentity};
