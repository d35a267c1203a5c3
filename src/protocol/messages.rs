//! Wire message types for the intake endpoint and the result relay
//!
//! Field names follow the JSON contract shared with the order-management
//! collaborator, so they are kept in snake_case exactly as they appear on the wire.

use serde::{Deserialize, Serialize};

/// Order identifier as supplied by the collaborator
pub type OrderId = i64;

/// Drug identifier within one order
pub type DrugInOrderId = i64;

/// A calculation request for one medical order
///
/// # Examples
/// ```
/// use infusion_relay::protocol::{DrugEntry, Order};
///
/// let order = Order {
///     order_id: 42,
///     drugs: vec![DrugEntry {
///         druginorder_id: 1,
///         drug_concentration: 10.0,
///         ampoule_volume: 5.0,
///         ampoules_count: 2,
///         solvent_volume: 100.0,
///         patient_weight: 70.0,
///     }],
/// };
/// assert_eq!(order.drugs_count(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub order_id: OrderId,
    pub drugs: Vec<DrugEntry>,
}

impl Order {
    pub fn drugs_count(&self) -> usize {
        self.drugs.len()
    }
}

/// Physical parameters of one drug in an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrugEntry {
    pub druginorder_id: DrugInOrderId,
    /// Drug concentration per millilitre of ampoule content
    pub drug_concentration: f64,
    /// Volume of a single ampoule in millilitres
    pub ampoule_volume: f64,
    pub ampoules_count: i64,
    /// Solvent volume in millilitres
    pub solvent_volume: f64,
    /// Patient weight in kilograms
    pub patient_weight: f64,
}

/// Computed infusion speed for one drug entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DrugResult {
    pub druginorder_id: DrugInOrderId,
    pub infusion_speed: f64,
}

/// Body of the outbound callback to the collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayPayload {
    pub secret_key: String,
    pub order_id: OrderId,
    pub results: Vec<DrugResult>,
}

/// Immediate response to an accepted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Acknowledgement {
    pub status: String,
    pub message: String,
    pub order_id: OrderId,
    pub drugs_count: usize,
}

impl Acknowledgement {
    pub fn accepted(order: &Order) -> Self {
        Self {
            status: "accepted".to_string(),
            message: "Order queued for processing".to_string(),
            order_id: order.order_id,
            drugs_count: order.drugs_count(),
        }
    }
}

/// Error body returned by the intake endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub details: String,
}

impl ErrorResponse {
    pub fn new<E: Into<String>, D: Into<String>>(error: E, details: D) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}
