//! Delivery of computed results to the order-management collaborator
//!
//! A relay makes exactly one outbound call per invocation. Retrying is the
//! dispatcher's decision, never the relay's.

pub mod http;

pub use http::{HttpRelayConfig, HttpResultRelay, UPDATE_RESULTS_PATH};

use crate::protocol::messages::{DrugResult, OrderId};
use async_trait::async_trait;
use thiserror::Error;

/// Reasons a relay call did not deliver its results
#[derive(Debug, Error)]
pub enum RelayError {
    /// Network failure, timeout, or any error before a response arrived
    #[error("Relay transport failure: {0}")]
    Transport(String),

    /// The collaborator answered with something other than 200 OK
    #[error("Collaborator rejected results with status {status}")]
    Rejected { status: u16, body: String },

    #[error("Failed to serialize relay payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Relay not configured: {0}")]
    NotConfigured(String),
}

impl RelayError {
    /// Short machine-friendly label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Transport(_) => "transport",
            RelayError::Rejected { .. } => "rejected",
            RelayError::Serialization(_) => "serialization",
            RelayError::NotConfigured(_) => "not_configured",
        }
    }
}

/// Outbound channel for one order's results
#[async_trait]
pub trait ResultRelay: Send + Sync {
    /// Deliver results for one order; one call, no internal retry
    async fn relay(&self, order_id: OrderId, results: &[DrugResult]) -> Result<(), RelayError>;

    /// Relay name for reporting
    fn name(&self) -> &str;
}
