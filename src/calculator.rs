//! Infusion rate calculation
//!
//! The rate for one drug entry is
//!
//! ```text
//! total_mass     = drug_concentration * ampoules_count * ampoule_volume
//! mass_per_hour  = (infusion_volume_per_hour / solvent_volume) * total_mass
//! infusion_speed = mass_per_hour / patient_weight
//! ```
//!
//! truncated toward zero to two decimal places. The default entry point uses
//! the solvent volume as the infusion volume per hour, so the middle step
//! cancels out and the rate reduces to `total_mass / patient_weight`. That
//! step is kept as written so results stay identical to what the collaborator
//! has always received; [`infusion_speed_at`] takes the volume explicitly.

use crate::protocol::messages::{DrugEntry, DrugResult};
use thiserror::Error;

/// Errors produced by the rate formula
#[derive(Debug, Error, PartialEq)]
pub enum CalculationError {
    #[error("Drug {druginorder_id}: infusion speed is not a finite number ({value})")]
    NonFinite { druginorder_id: i64, value: f64 },
}

/// Infusion speed for one drug, assuming the whole solvent volume runs per hour
pub fn infusion_speed(drug: &DrugEntry) -> Result<f64, CalculationError> {
    infusion_speed_at(drug, drug.solvent_volume)
}

/// Infusion speed for one drug at an explicit infusion volume per hour
pub fn infusion_speed_at(
    drug: &DrugEntry,
    infusion_volume_per_hour: f64,
) -> Result<f64, CalculationError> {
    let total_mass = drug.drug_concentration * drug.ampoules_count as f64 * drug.ampoule_volume;
    let mass_per_hour = (infusion_volume_per_hour / drug.solvent_volume) * total_mass;
    let speed = truncate_to_hundredths(mass_per_hour / drug.patient_weight);

    // Checked after truncation: scaling by 100 can overflow a finite rate
    if !speed.is_finite() {
        return Err(CalculationError::NonFinite {
            druginorder_id: drug.druginorder_id,
            value: speed,
        });
    }

    Ok(speed)
}

/// Compute one result per drug, preserving input order
pub fn calculate_results(drugs: &[DrugEntry]) -> Result<Vec<DrugResult>, CalculationError> {
    drugs
        .iter()
        .map(|drug| {
            infusion_speed(drug).map(|speed| DrugResult {
                druginorder_id: drug.druginorder_id,
                infusion_speed: speed,
            })
        })
        .collect()
}

fn truncate_to_hundredths(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}
