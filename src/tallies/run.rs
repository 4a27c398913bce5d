use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// Run-scoped totals, the immutable value that leaves a worker at run end.
///
/// Merging is field-wise addition, so it is associative and commutative
/// (up to floating-point rounding of the energy sums).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    /// Sum of per-event detector deposits in MeV
    pub total_energy: f64,
    /// Sum of squared per-event deposits in MeV^2
    pub energy_sq_sum: f64,
    /// Events that deposited energy in the detector
    pub event_count: u64,
    /// Steps that crossed from the shield into the detector
    pub pass_count: u64,
}

impl RunTotals {
    /// Combine two sets of totals
    pub fn merge(a: RunTotals, b: RunTotals) -> RunTotals {
        RunTotals {
            total_energy: a.total_energy + b.total_energy,
            energy_sq_sum: a.energy_sq_sum + b.energy_sq_sum,
            event_count: a.event_count + b.event_count,
            pass_count: a.pass_count + b.pass_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event_count == 0 && self.pass_count == 0
    }

    /// Per-event statistics of the detector deposit
    pub fn statistics(&self) -> RunStatistics {
        RunStatistics::from_totals(self)
    }
}

impl Add for RunTotals {
    type Output = RunTotals;

    fn add(self, rhs: RunTotals) -> RunTotals {
        RunTotals::merge(self, rhs)
    }
}

impl Sum for RunTotals {
    fn sum<I: Iterator<Item = RunTotals>>(iter: I) -> RunTotals {
        iter.fold(RunTotals::default(), RunTotals::merge)
    }
}

impl<'a> Sum<&'a RunTotals> for RunTotals {
    fn sum<I: Iterator<Item = &'a RunTotals>>(iter: I) -> RunTotals {
        iter.copied().sum()
    }
}

/// Per-worker run accumulator, mutated only by the worker that owns it.
#[derive(Debug, Clone, Default)]
pub struct RunAccumulator {
    totals: RunTotals,
}

impl RunAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero all counters at the start of a run
    pub fn begin_run(&mut self) {
        self.totals = RunTotals::default();
    }

    /// Fold one finished event into the run.
    ///
    /// Events that left nothing in the detector are not counted.
    pub fn record_event(&mut self, energy_deposit: f64) {
        if energy_deposit > 0.0 && energy_deposit.is_finite() {
            self.totals.total_energy += energy_deposit;
            self.totals.energy_sq_sum += energy_deposit * energy_deposit;
            self.totals.event_count += 1;
        }
    }

    pub fn record_pass_through(&mut self) {
        self.totals.pass_count += 1;
    }

    /// Copy of the current totals
    pub fn snapshot(&self) -> RunTotals {
        self.totals
    }
}

/// Statistics of the per-event detector deposit over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Mean deposit per qualifying event in MeV
    pub mean: f64,
    /// Sample standard deviation of the per-event deposit
    pub std_dev: f64,
    /// Standard error of the mean divided by the mean
    pub rel_error: f64,
    pub n_events: u64,
}

impl RunStatistics {
    pub fn from_totals(totals: &RunTotals) -> Self {
        let n_events = totals.event_count;
        if n_events == 0 {
            return Self::default();
        }

        let n = n_events as f64;
        let mean = totals.total_energy / n;
        let std_dev = if n_events > 1 {
            // clamp tiny negative values from cancellation
            let variance = ((totals.energy_sq_sum - n * mean * mean) / (n - 1.0)).max(0.0);
            variance.sqrt()
        } else {
            0.0
        };
        let rel_error = if mean > 0.0 {
            std_dev / n.sqrt() / mean
        } else {
            0.0
        };

        Self {
            mean,
            std_dev,
            rel_error,
            n_events,
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Mean deposit: {:.6} MeV per event", self.mean)?;
        writeln!(f, "    Std Dev: {:.6} MeV", self.std_dev)?;
        writeln!(f, "    Rel Error: {:.4} ({:.2}%)", self.rel_error, self.rel_error * 100.0)?;
        write!(f, "    Events: {}", self.n_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(energy: f64, events: u64, passes: u64) -> RunTotals {
        RunTotals {
            total_energy: energy,
            energy_sq_sum: energy * energy,
            event_count: events,
            pass_count: passes,
        }
    }

    #[test]
    fn test_begin_run_zeroes() {
        let mut acc = RunAccumulator::new();
        acc.record_event(2.0);
        acc.record_pass_through();
        acc.begin_run();
        assert_eq!(acc.snapshot(), RunTotals::default());
    }

    #[test]
    fn test_record_event_skips_empty_events() {
        let mut acc = RunAccumulator::new();
        acc.record_event(0.0);
        acc.record_event(1.5);
        acc.record_event(-3.0);
        acc.record_event(2.5);

        let snap = acc.snapshot();
        assert_eq!(snap.event_count, 2);
        assert_eq!(snap.total_energy, 4.0);
        assert_eq!(snap.energy_sq_sum, 1.5 * 1.5 + 2.5 * 2.5);
        assert_eq!(snap.pass_count, 0);
    }

    #[test]
    fn test_pass_through_is_separate() {
        let mut acc = RunAccumulator::new();
        acc.record_pass_through();
        acc.record_pass_through();
        let snap = acc.snapshot();
        assert_eq!(snap.pass_count, 2);
        assert_eq!(snap.event_count, 0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut acc = RunAccumulator::new();
        acc.record_event(1.0);
        let snap = acc.snapshot();
        acc.record_event(1.0);
        assert_eq!(snap.event_count, 1);
        assert_eq!(acc.snapshot().event_count, 2);
    }

    #[test]
    fn test_merge_associative_and_commutative() {
        let a = totals(10.0, 5, 1);
        let b = totals(10.0, 5, 2);
        let c = totals(10.0, 5, 3);

        let left = RunTotals::merge(RunTotals::merge(a, b), c);
        let right = RunTotals::merge(a, RunTotals::merge(b, c));
        let swapped = RunTotals::merge(c, RunTotals::merge(a, b));

        assert_eq!(left, right);
        assert_eq!(left, swapped);
        assert_eq!(left.total_energy, 30.0);
        assert_eq!(left.event_count, 15);
        assert_eq!(left.pass_count, 6);
    }

    #[test]
    fn test_sum_of_totals() {
        let parts = vec![totals(1.0, 1, 0), totals(2.0, 1, 0), totals(3.0, 2, 1)];
        let sum: RunTotals = parts.iter().sum();
        assert_eq!(sum.total_energy, 6.0);
        assert_eq!(sum.event_count, 4);
        assert_eq!(sum.pass_count, 1);
        assert_eq!(sum, parts[0] + parts[1] + parts[2]);
    }

    #[test]
    fn test_statistics_constant_deposits() {
        let mut acc = RunAccumulator::new();
        for _ in 0..10 {
            acc.record_event(2.0);
        }
        let stats = acc.snapshot().statistics();
        assert_eq!(stats.n_events, 10);
        assert!((stats.mean - 2.0).abs() < 1e-12);
        assert!(stats.std_dev < 1e-6);
        assert!(stats.rel_error < 1e-6);
    }

    #[test]
    fn test_statistics_spread() {
        let mut acc = RunAccumulator::new();
        acc.record_event(1.0);
        acc.record_event(3.0);
        let stats = acc.snapshot().statistics();
        assert!((stats.mean - 2.0).abs() < 1e-12);
        // sample variance of {1, 3} is 2
        assert!((stats.std_dev - 2.0f64.sqrt()).abs() < 1e-12);
        assert!((stats.rel_error - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_statistics_empty_run() {
        let stats = RunTotals::default().statistics();
        assert_eq!(stats, RunStatistics::default());
    }
}
