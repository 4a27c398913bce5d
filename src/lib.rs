//! Energy deposition scoring for particle transport runs.
//!
//! A transport engine reports every step through [`TransportHooks`]. Each
//! worker thread owns a [`WorkerScorer`] that routes steps into a per-event
//! detector total and a depth histogram. At run end the workers hand their
//! reports to a shared [`RunCollector`]; the [`MasterScorer`] merges them once
//! all have arrived, computes the dose and writes the run summary and depth
//! profile.

pub mod classifier;
pub mod config;
pub mod dose;
pub mod error;
pub mod hooks;
pub mod run;
pub mod step;
pub mod tallies;
pub mod worker;
pub mod writer;

pub use classifier::{Route, Routes, RoutingRules, StepClassifier};
pub use config::{ProfilePolicy, ScoringConfig};
pub use dose::{compute_dose, dose_gray_from_mev, MEV_TO_JOULE};
pub use error::{DoseError, ScoringError, ShapeMismatch};
pub use hooks::TransportHooks;
pub use run::{merge_reports, MasterScorer, MergedRunResult, RunCollector};
pub use step::{StepSample, VolumeId, VolumeNames};
pub use tallies::{DepthHistogram, EventAccumulator, RunAccumulator, RunStatistics, RunTotals};
pub use worker::{DroppedSamples, WorkerReport, WorkerScorer};
pub use writer::ResultWriter;
