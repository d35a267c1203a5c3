//! Order message types and validation
//!
//! Shared wire structures for the intake endpoint and the result relay.

pub mod messages;
pub mod validation;

pub use messages::*;
pub use validation::{validate_drug, validate_order, ValidationError};
