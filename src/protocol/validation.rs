//! Domain validation for inbound orders
//!
//! Structural checks (missing fields, wrong types) happen during JSON
//! deserialization. The checks here reject values that deserialize fine but
//! would make the rate formula meaningless, so invalid orders never reach
//! the dispatcher.

use crate::protocol::messages::{DrugEntry, Order};
use thiserror::Error;

/// Validation errors for inbound orders
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Drug {druginorder_id}: {field} must be a finite number greater than zero, got {value}")]
    NonPositive {
        druginorder_id: i64,
        field: &'static str,
        value: f64,
    },
    #[error("Drug {druginorder_id}: ampoules_count must be greater than zero, got {value}")]
    InvalidAmpoulesCount { druginorder_id: i64, value: i64 },
}

pub fn validate_order(order: &Order) -> Result<(), ValidationError> {
    order.drugs.iter().try_for_each(validate_drug)
}

pub fn validate_drug(drug: &DrugEntry) -> Result<(), ValidationError> {
    let fields = [
        ("drug_concentration", drug.drug_concentration),
        ("ampoule_volume", drug.ampoule_volume),
        ("solvent_volume", drug.solvent_volume),
        ("patient_weight", drug.patient_weight),
    ];

    for (field, value) in fields {
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::NonPositive {
                druginorder_id: drug.druginorder_id,
                field,
                value,
            });
        }
    }

    if drug.ampoules_count <= 0 {
        return Err(ValidationError::InvalidAmpoulesCount {
            druginorder_id: drug.druginorder_id,
            value: drug.ampoules_count,
        });
    }

    Ok(())
}
