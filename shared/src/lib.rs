//! Shared types and domain logic for the Field Service Management platform
//!
//! This crate contains the inventory domain models and the pure pieces of the
//! kardex core (stock classification, weighted-average costing, movement
//! validation) shared between the backend and future components.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
