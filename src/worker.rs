// Per-worker scoring context
//
// Each transport worker thread owns one WorkerScorer. Its accumulators are
// touched only by that thread; the only data that leaves it is the
// WorkerReport moved into the RunCollector at run end.

use crate::classifier::{Route, StepClassifier};
use crate::config::ScoringConfig;
use crate::error::{Result, ScoringError};
use crate::hooks::TransportHooks;
use crate::run::RunCollector;
use crate::step::StepSample;
use crate::tallies::{DepthHistogram, EventAccumulator, RunAccumulator, RunTotals};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Samples a worker refused during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedSamples {
    /// Negative or non-finite deposits
    pub invalid_energy: u64,
    /// Samples tagged with a run other than the active one
    pub wrong_run: u64,
    /// Histogram deposits outside [0, max_depth)
    pub out_of_window: u64,
}

impl DroppedSamples {
    pub fn total(&self) -> u64 {
        self.invalid_energy + self.wrong_run + self.out_of_window
    }

    pub fn merge(&mut self, other: &DroppedSamples) {
        self.invalid_energy += other.invalid_energy;
        self.wrong_run += other.wrong_run;
        self.out_of_window += other.out_of_window;
    }
}

/// Everything a worker hands to the master at run end
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub run_id: u32,
    pub worker: usize,
    pub totals: RunTotals,
    pub histogram: DepthHistogram,
    pub dropped: DroppedSamples,
}

/// Scoring state of one transport worker
pub struct WorkerScorer {
    worker: usize,
    config: Arc<ScoringConfig>,
    classifier: StepClassifier,
    collector: Arc<RunCollector>,
    event: EventAccumulator,
    run: RunAccumulator,
    histogram: Option<DepthHistogram>,
    active_run: Option<u32>,
    active_event: Option<u64>,
    /// Events closed by a step of the next event instead of `on_event_end`
    unterminated_events: u64,
    dropped: DroppedSamples,
}

impl WorkerScorer {
    /// Create the scorer for worker `worker`
    ///
    /// # Arguments
    /// * `worker` - Index of the worker, unique within a run
    /// * `config` - Configuration shared with the master
    /// * `collector` - Where the run-end report is delivered
    pub fn new(worker: usize, config: Arc<ScoringConfig>, collector: Arc<RunCollector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            worker,
            classifier: StepClassifier::new(config.routing.clone()),
            config,
            collector,
            event: EventAccumulator::new(),
            run: RunAccumulator::new(),
            histogram: None,
            active_run: None,
            active_event: None,
            unterminated_events: 0,
            dropped: DroppedSamples::default(),
        })
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn active_run(&self) -> Option<u32> {
        self.active_run
    }

    /// Current run totals of this worker
    pub fn snapshot(&self) -> RunTotals {
        self.run.snapshot()
    }

    pub fn dropped(&self) -> DroppedSamples {
        self.dropped
    }

    /// Events of the current run that never saw `on_event_end`
    pub fn unterminated_events(&self) -> u64 {
        self.unterminated_events
    }

    /// Replace the configuration; only allowed between runs
    pub fn reconfigure(&mut self, config: Arc<ScoringConfig>) -> Result<()> {
        if let Some(run_id) = self.active_run {
            return Err(ScoringError::config(format!(
                "worker {} cannot be reconfigured while run {} is active",
                self.worker, run_id
            )));
        }
        config.validate()?;
        self.classifier = StepClassifier::new(config.routing.clone());
        self.config = config;
        Ok(())
    }

    /// Throw away the active run without reporting it
    pub fn abort_run(&mut self, run_id: u32) {
        if self.active_run == Some(run_id) {
            debug!("Worker {} discarding run {}", self.worker, run_id);
            self.clear_run_state();
        }
    }

    fn clear_run_state(&mut self) {
        self.active_run = None;
        self.active_event = None;
        self.histogram = None;
        self.event.reset();
        self.run.begin_run();
    }

    fn score(&mut self, sample: &StepSample) {
        let routes = self.classifier.classify(sample);
        for route in routes.iter() {
            match route {
                Route::DepthBin => {
                    let depth = sample.axial_position - self.config.histogram.depth_origin_mm;
                    let binned = self
                        .histogram
                        .as_mut()
                        .map(|h| h.add_sample(depth, sample.deposited_energy))
                        .unwrap_or(false);
                    if !binned {
                        self.dropped.out_of_window += 1;
                    }
                }
                Route::EventEnergy => {
                    self.event.add(sample.deposited_energy);
                }
                Route::PassThrough => self.run.record_pass_through(),
            }
        }
    }
}

impl TransportHooks for WorkerScorer {
    fn on_run_start(&mut self, run_id: u32, worker_count: usize) -> Result<()> {
        if self.worker >= worker_count {
            warn!(
                "Worker index {} outside declared worker count {} for run {}",
                self.worker, worker_count, run_id
            );
        }
        self.histogram = Some(self.config.new_histogram()?);
        self.run.begin_run();
        self.event.reset();
        self.dropped = DroppedSamples::default();
        self.unterminated_events = 0;
        self.active_event = None;
        self.active_run = Some(run_id);
        debug!("Worker {} started run {}", self.worker, run_id);
        Ok(())
    }

    fn on_step(&mut self, sample: &StepSample) -> Result<()> {
        if self.active_run != Some(sample.run_id) {
            self.dropped.wrong_run += 1;
            warn!(
                "Worker {}: dropping step for run {} (active run {:?})",
                self.worker, sample.run_id, self.active_run
            );
            return Ok(());
        }
        if !sample.has_valid_energy() {
            self.dropped.invalid_energy += 1;
            warn!(
                "Worker {}: dropping step with invalid energy {} in event {}",
                self.worker, sample.deposited_energy, sample.event_id
            );
            return Ok(());
        }
        if let Some(active) = self.active_event {
            if active != sample.event_id {
                // close the open event so its energy is not credited to the new one
                let deposit = self.event.drain();
                self.run.record_event(deposit);
                self.unterminated_events += 1;
                warn!(
                    "Worker {}: step for event {} while event {} has not ended, closing it with {:.6} MeV",
                    self.worker, sample.event_id, active, deposit
                );
            }
        }
        self.active_event = Some(sample.event_id);
        self.score(sample);
        Ok(())
    }

    fn on_event_end(&mut self, event_id: u64) -> Result<()> {
        if self.active_run.is_none() {
            warn!(
                "Worker {}: event {} ended outside a run, ignoring",
                self.worker, event_id
            );
            self.event.reset();
            return Ok(());
        }
        let deposit = self.event.drain();
        self.run.record_event(deposit);
        self.active_event = None;
        Ok(())
    }

    fn on_run_end(&mut self, run_id: u32) -> Result<()> {
        if self.active_run != Some(run_id) {
            return Err(ScoringError::RunNotActive { run_id });
        }
        if self.event.total() > 0.0 {
            warn!(
                "Worker {}: run {} ended with an unfinished event, its {:.6} MeV are discarded",
                self.worker,
                run_id,
                self.event.total()
            );
        }
        if self.dropped.total() > 0 {
            warn!(
                "Worker {}: run {} dropped {} samples ({} invalid energy, {} wrong run, {} outside depth window)",
                self.worker,
                run_id,
                self.dropped.total(),
                self.dropped.invalid_energy,
                self.dropped.wrong_run,
                self.dropped.out_of_window
            );
        }

        let histogram = match self.histogram.take() {
            Some(h) => h,
            None => self.config.new_histogram()?,
        };
        let report = WorkerReport {
            run_id,
            worker: self.worker,
            totals: self.run.snapshot(),
            histogram,
            dropped: self.dropped,
        };
        self.clear_run_state();
        debug!(
            "Worker {} reporting run {}: {} events, {:.6} MeV",
            self.worker, run_id, report.totals.event_count, report.totals.total_energy
        );
        self.collector.submit(report)
    }
}
