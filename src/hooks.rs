use crate::error::Result;
use crate::step::StepSample;

/// Lifecycle callbacks the transport engine drives.
///
/// Implemented by worker contexts (which see every step) and by the master
/// context (which only sees run boundaries, so the step and event callbacks
/// default to no-ops). Step-level problems are never returned as errors.
pub trait TransportHooks {
    /// Reset all accumulators for a new run
    fn on_run_start(&mut self, run_id: u32, worker_count: usize) -> Result<()>;

    /// Called zero or more times per event
    fn on_step(&mut self, _sample: &StepSample) -> Result<()> {
        Ok(())
    }

    /// Called exactly once per event
    fn on_event_end(&mut self, _event_id: u64) -> Result<()> {
        Ok(())
    }

    fn on_run_end(&mut self, run_id: u32) -> Result<()>;
}
