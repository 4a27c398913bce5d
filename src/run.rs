// Run-end barrier, merge and persistence on the master context
//
// Workers move their WorkerReport into the shared RunCollector. The master
// waits until every worker of the run has reported, merges the reports in
// worker order, computes the dose and hands the result to the ResultWriter.

use crate::config::ScoringConfig;
use crate::dose::dose_gray_from_mev;
use crate::error::{Result, ScoringError};
use crate::hooks::TransportHooks;
use crate::tallies::{DepthHistogram, RunStatistics, RunTotals};
use crate::worker::{DroppedSamples, WorkerReport};
use crate::writer::ResultWriter;
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Open,
    Aborted,
    Collected,
}

#[derive(Debug)]
struct PendingRun {
    /// Unknown until the master opens the run
    expected: Option<usize>,
    reports: BTreeMap<usize, WorkerReport>,
    state: RunState,
}

impl PendingRun {
    fn new(expected: Option<usize>) -> Self {
        Self {
            expected,
            reports: BTreeMap::new(),
            state: RunState::Open,
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.expected, Some(n) if self.reports.len() >= n)
    }
}

#[derive(Debug, Default)]
struct Runs {
    pending: HashMap<u32, PendingRun>,
    /// Newest run id opened so far; reports for older runs are refused
    newest: Option<u32>,
}

/// Collects worker reports per run and releases them to the master once all
/// workers have reported.
#[derive(Debug, Default)]
pub struct RunCollector {
    runs: Mutex<Runs>,
    changed: Condvar,
}

impl RunCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Runs> {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Declare how many workers take part in a run.
    ///
    /// Reports that arrived before the run was opened are kept. A run id that
    /// was already collected or aborted starts over. Entries of earlier runs
    /// are dropped, including early reports for runs that were never opened.
    pub fn open_run(&self, run_id: u32, worker_count: usize) {
        let mut runs = self.lock();
        runs.newest = Some(runs.newest.map_or(run_id, |n| n.max(run_id)));
        runs.pending.retain(|&id, run| {
            if id >= run_id {
                return true;
            }
            if !run.reports.is_empty() {
                warn!(
                    "Discarding {} reports for run {} which was never collected",
                    run.reports.len(),
                    id
                );
            }
            false
        });
        let entry = runs
            .pending
            .entry(run_id)
            .or_insert_with(|| PendingRun::new(Some(worker_count)));
        if entry.state != RunState::Open {
            *entry = PendingRun::new(Some(worker_count));
        }
        entry.expected = Some(worker_count);
        self.changed.notify_all();
    }

    /// Hand over a worker's report; the report is moved and cannot be touched again.
    pub fn submit(&self, report: WorkerReport) -> Result<()> {
        let run_id = report.run_id;
        let worker = report.worker;
        let mut runs = self.lock();
        if matches!(runs.newest, Some(newest) if run_id < newest) {
            warn!("Discarding late report of worker {} for past run {}", worker, run_id);
            return Err(ScoringError::RunNotActive { run_id });
        }
        let entry = runs
            .pending
            .entry(run_id)
            .or_insert_with(|| PendingRun::new(None));
        match entry.state {
            RunState::Aborted => {
                warn!("Discarding report of worker {} for aborted run {}", worker, run_id);
                return Err(ScoringError::RunAborted { run_id });
            }
            RunState::Collected => {
                warn!("Discarding late report of worker {} for finished run {}", worker, run_id);
                return Err(ScoringError::RunNotActive { run_id });
            }
            RunState::Open => {}
        }
        if entry.reports.contains_key(&worker) {
            return Err(ScoringError::DuplicateReport { run_id, worker });
        }
        entry.reports.insert(worker, report);
        self.changed.notify_all();
        Ok(())
    }

    /// Discard every report of a run; later reports for it are refused.
    ///
    /// # Returns
    /// The number of reports thrown away
    pub fn abort(&self, run_id: u32) -> usize {
        let mut runs = self.lock();
        let entry = runs
            .pending
            .entry(run_id)
            .or_insert_with(|| PendingRun::new(None));
        let discarded = entry.reports.len();
        entry.reports.clear();
        entry.state = RunState::Aborted;
        self.changed.notify_all();
        discarded
    }

    /// Number of reports received so far for a run
    pub fn received(&self, run_id: u32) -> usize {
        self.lock()
            .pending
            .get(&run_id)
            .map(|r| r.reports.len())
            .unwrap_or(0)
    }

    /// Block until every worker of the run has reported, then take the reports.
    ///
    /// # Returns
    /// Reports in ascending worker order, `RunAborted` if the run was aborted
    /// while waiting, or `CollectTimeout` after `timeout`
    pub fn wait(&self, run_id: u32, timeout: Duration) -> Result<Vec<WorkerReport>> {
        let deadline = Instant::now() + timeout;
        let mut runs = self.lock();
        loop {
            let entry = runs
                .pending
                .get_mut(&run_id)
                .ok_or(ScoringError::RunNotActive { run_id })?;
            match entry.state {
                RunState::Aborted => return Err(ScoringError::RunAborted { run_id }),
                RunState::Collected => return Err(ScoringError::RunNotActive { run_id }),
                RunState::Open if entry.is_complete() => {
                    entry.state = RunState::Collected;
                    let reports = std::mem::take(&mut entry.reports);
                    return Ok(reports.into_values().collect());
                }
                RunState::Open => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ScoringError::CollectTimeout {
                    run_id,
                    received: entry.reports.len(),
                    expected: entry.expected.unwrap_or(0),
                });
            }
            runs = self
                .changed
                .wait_timeout(runs, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }
}

/// Result of one run after all workers were merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRunResult {
    pub run_id: u32,
    pub totals: RunTotals,
    pub dose_gray: f64,
    pub statistics: RunStatistics,
    pub histogram: DepthHistogram,
    pub workers: usize,
    pub dropped: DroppedSamples,
}

impl MergedRunResult {
    pub fn total_energy(&self) -> f64 {
        self.totals.total_energy
    }

    pub fn event_count(&self) -> u64 {
        self.totals.event_count
    }

    pub fn pass_count(&self) -> u64 {
        self.totals.pass_count
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for MergedRunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} ended.", self.run_id)?;
        writeln!(f, "  Total events: {}", self.totals.event_count)?;
        writeln!(f, "  Total energy: {:.6} MeV", self.totals.total_energy)?;
        writeln!(f, "  Pass-through steps: {}", self.totals.pass_count)?;
        writeln!(f, "  Dose: {:.6} Gy", self.dose_gray)?;
        writeln!(f, "{}", self.statistics)?;
        write!(f, "  Workers merged: {}", self.workers)
    }
}

/// Merge worker reports into a run result.
///
/// Reports are combined in the order given; [`RunCollector::wait`] returns
/// them sorted by worker so the floating-point sums are reproducible.
pub fn merge_reports(
    config: &ScoringConfig,
    run_id: u32,
    reports: &[WorkerReport],
) -> Result<MergedRunResult> {
    let mut histogram = config.new_histogram()?;
    let mut dropped = DroppedSamples::default();
    for report in reports {
        histogram.merge_from(&report.histogram)?;
        dropped.merge(&report.dropped);
    }
    let totals: RunTotals = reports.iter().map(|r| r.totals).sum();

    let dose_gray = dose_gray_from_mev(
        totals.total_energy,
        totals.event_count,
        config.detector_mass_kg,
    )
    .map_err(|e| ScoringError::from_dose(run_id, e))?;

    Ok(MergedRunResult {
        run_id,
        totals,
        dose_gray,
        statistics: totals.statistics(),
        histogram,
        workers: reports.len(),
        dropped,
    })
}

/// Output files of one merged run that are still to be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingWrite {
    /// Index into `MasterScorer::results`
    index: usize,
    profile: bool,
    summary: bool,
}

/// Master context: owns the merge, dose computation and output files.
pub struct MasterScorer {
    config: Arc<ScoringConfig>,
    collector: Arc<RunCollector>,
    writer: ResultWriter,
    active_run: Option<u32>,
    results: Vec<MergedRunResult>,
    /// Oldest first; a run is written only after every earlier run
    pending: VecDeque<PendingWrite>,
}

impl MasterScorer {
    pub fn new(config: Arc<ScoringConfig>, collector: Arc<RunCollector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            writer: ResultWriter::new(config.output.clone()),
            config,
            collector,
            active_run: None,
            results: Vec::new(),
            pending: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &Arc<ScoringConfig> {
        &self.config
    }

    pub fn collector(&self) -> &Arc<RunCollector> {
        &self.collector
    }

    pub fn active_run(&self) -> Option<u32> {
        self.active_run
    }

    /// Every run merged so far, including those whose files failed to write
    pub fn results(&self) -> &[MergedRunResult] {
        &self.results
    }

    pub fn last_result(&self) -> Option<&MergedRunResult> {
        self.results.last()
    }

    /// Runs merged in memory but not yet fully written to disk, oldest first
    pub fn unpersisted(&self) -> Vec<u32> {
        self.pending
            .iter()
            .map(|p| self.results[p.index].run_id)
            .collect()
    }

    /// Replace the configuration; only allowed between runs
    pub fn reconfigure(&mut self, config: Arc<ScoringConfig>) -> Result<()> {
        if let Some(run_id) = self.active_run {
            return Err(ScoringError::config(format!(
                "master cannot be reconfigured while run {} is active",
                run_id
            )));
        }
        config.validate()?;
        self.writer = ResultWriter::new(config.output.clone());
        self.config = config;
        Ok(())
    }

    /// Cancel a run: all worker reports are dropped and nothing is written.
    pub fn abort_run(&mut self, run_id: u32) {
        let discarded = self.collector.abort(run_id);
        if self.active_run == Some(run_id) {
            self.active_run = None;
        }
        warn!(
            "Run {} aborted, {} worker reports discarded",
            run_id, discarded
        );
    }

    /// Wait for all workers, merge, compute the dose and persist.
    ///
    /// Run-level failures leave the master ready for the next run. When only
    /// the file writes fail, the merged result is still kept in memory and
    /// can be written later with [`MasterScorer::persist_pending`].
    pub fn finish_run(&mut self, run_id: u32) -> Result<&MergedRunResult> {
        if self.active_run != Some(run_id) {
            return Err(ScoringError::RunNotActive { run_id });
        }
        self.active_run = None;

        let reports = match self.collector.wait(run_id, self.config.collect_timeout()) {
            Ok(reports) => reports,
            Err(e) => {
                if matches!(e, ScoringError::CollectTimeout { .. }) {
                    // late reports must not leak into a later run with the same id
                    self.collector.abort(run_id);
                }
                warn!("Run {} produced no result: {}", run_id, e);
                return Err(e);
            }
        };

        let merged = match merge_reports(&self.config, run_id, &reports) {
            Ok(merged) => merged,
            Err(e) => {
                warn!("Run {} produced no result: {}", run_id, e);
                return Err(e);
            }
        };
        info!("{}", merged);
        if merged.dropped.total() > 0 {
            warn!(
                "Run {}: {} samples dropped across workers",
                run_id,
                merged.dropped.total()
            );
        }

        self.results.push(merged);
        let index = self.results.len() - 1;
        self.pending.push_back(PendingWrite {
            index,
            profile: true,
            summary: true,
        });
        // earlier runs whose writes failed go out first
        if let Err(e) = self.persist_pending() {
            warn!("Run {} result kept in memory, writing failed: {}", run_id, e);
            return Err(e);
        }
        Ok(&self.results[index])
    }

    /// Write every output file still pending, oldest run first.
    ///
    /// Only the parts that failed before are written again, so a retried run
    /// never appends its summary twice. Because runs go out in order, an older
    /// profile cannot replace a newer one.
    ///
    /// # Returns
    /// The number of runs completed; stops at the first failure
    pub fn persist_pending(&mut self) -> Result<usize> {
        let mut written = 0;
        while let Some(write) = self.pending.front_mut() {
            let result = &self.results[write.index];
            if write.profile {
                self.writer
                    .write_depth_profile(result.run_id, &result.histogram.to_table())?;
                write.profile = false;
            }
            if write.summary {
                self.writer.append_run_summary(
                    result.run_id,
                    result.dose_gray,
                    result.totals.event_count,
                )?;
                write.summary = false;
            }
            info!(
                "Run {} results written to {}",
                result.run_id,
                self.writer.summary_path().display()
            );
            self.pending.pop_front();
            written += 1;
        }
        Ok(written)
    }
}

impl TransportHooks for MasterScorer {
    fn on_run_start(&mut self, run_id: u32, worker_count: usize) -> Result<()> {
        if let Some(previous) = self.active_run {
            warn!(
                "Run {} started while run {} was still active, aborting it",
                run_id, previous
            );
            self.abort_run(previous);
        }
        self.collector.open_run(run_id, worker_count);
        self.active_run = Some(run_id);
        info!(" Run {} started with {} workers.", run_id, worker_count);
        Ok(())
    }

    fn on_run_end(&mut self, run_id: u32) -> Result<()> {
        self.finish_run(run_id).map(|_| ())
    }
}
