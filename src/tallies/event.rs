/// Scratch counter for the energy deposited in the detector during one event.
///
/// Exactly one is live per worker; events never overlap within a worker, so
/// it needs no synchronisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventAccumulator {
    energy_deposit: f64,
}

impl EventAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.energy_deposit = 0.0;
    }

    /// Accumulate a deposit in MeV. Negative or non-finite values are refused.
    pub fn add(&mut self, energy: f64) -> bool {
        if !energy.is_finite() || energy < 0.0 {
            return false;
        }
        self.energy_deposit += energy;
        true
    }

    /// Current total without consuming it
    pub fn total(&self) -> f64 {
        self.energy_deposit
    }

    /// Take the event total and reset to zero
    pub fn drain(&mut self) -> f64 {
        std::mem::take(&mut self.energy_deposit)
    }
}
