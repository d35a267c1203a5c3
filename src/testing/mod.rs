//! Testing utilities and mock implementations
//!
//! Mocks for exercising the dispatcher and intake routes without a live
//! collaborator endpoint.

pub mod mocks;

pub use mocks::*;
