// Absorbed dose from accumulated energy deposits
//
// Dose is the total deposited energy over (mass x qualifying events). With
// energy in joules and mass in kilograms the result is in gray.

use crate::error::DoseError;

/// Joules per MeV
pub const MEV_TO_JOULE: f64 = 1.602_176_634e-13;

/// Compute the dose per event from run totals.
///
/// # Arguments
/// * `total_energy` - Energy deposited over the whole run (J for a result in Gy)
/// * `event_count` - Number of events that deposited energy
/// * `mass` - Detector mass in kg
///
/// # Errors
/// `NoEvents` when `event_count` is zero, `InvalidMass` when the mass is not a
/// positive finite number. A zero-event run never yields a silent 0, NaN or inf.
pub fn compute_dose(total_energy: f64, event_count: u64, mass: f64) -> Result<f64, DoseError> {
    if event_count == 0 {
        return Err(DoseError::NoEvents);
    }
    if !mass.is_finite() || mass <= 0.0 {
        return Err(DoseError::InvalidMass { mass });
    }
    Ok(total_energy / (mass * event_count as f64))
}

/// Dose in Gy from a total deposit in MeV
pub fn dose_gray_from_mev(
    total_energy_mev: f64,
    event_count: u64,
    mass_kg: Option<f64>,
) -> Result<f64, DoseError> {
    // an unset mass is reported the same way as a zero mass
    let mass = mass_kg.unwrap_or(0.0);
    compute_dose(total_energy_mev * MEV_TO_JOULE, event_count, mass)
}
