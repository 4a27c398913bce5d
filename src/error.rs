//! Error types for energy deposition scoring.
//!
//! Sample-level problems (negative energy, depth outside the scoring window)
//! never surface here: they are dropped and logged by the worker. Everything in
//! this module affects a reported physical quantity or an output file.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of the dose computation itself.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum DoseError {
    /// No qualifying events were recorded, so the dose is undefined
    #[error("no qualifying events in run, dose is undefined")]
    NoEvents,

    /// Detector mass unset, zero, negative or not finite
    #[error("invalid detector mass: {mass} kg")]
    InvalidMass { mass: f64 },
}

/// Two depth histograms with different binning cannot be combined.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error(
    "histogram shape mismatch: expected {expected_bins} bins over {expected_max_depth} mm, \
     found {found_bins} bins over {found_max_depth} mm"
)]
pub struct ShapeMismatch {
    pub expected_bins: u32,
    pub expected_max_depth: f64,
    pub found_bins: u32,
    pub found_max_depth: f64,
}

/// Unified error type for run-level scoring operations.
#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("run {run_id}: no qualifying events, dose is undefined")]
    NoEvents { run_id: u32 },

    #[error("run {run_id}: invalid detector mass {mass} kg")]
    InvalidMass { run_id: u32, mass: f64 },

    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatch),

    /// Output file could not be opened, written or replaced
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("run {run_id} was aborted")]
    RunAborted { run_id: u32 },

    #[error("run {run_id} is not active")]
    RunNotActive { run_id: u32 },

    #[error("run {run_id}: worker {worker} already reported")]
    DuplicateReport { run_id: u32, worker: usize },

    #[error("run {run_id}: timed out waiting for workers ({received}/{expected} reported)")]
    CollectTimeout {
        run_id: u32,
        received: usize,
        expected: usize,
    },
}

impl ScoringError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScoringError::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        ScoringError::Config(message.into())
    }

    /// Attaches a run id to a dose failure.
    pub fn from_dose(run_id: u32, err: DoseError) -> Self {
        match err {
            DoseError::NoEvents => ScoringError::NoEvents { run_id },
            DoseError::InvalidMass { mass } => ScoringError::InvalidMass { run_id, mass },
        }
    }

    /// True for failures that only cancel the current run's output.
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            ScoringError::NoEvents { .. }
                | ScoringError::InvalidMass { .. }
                | ScoringError::ShapeMismatch(_)
                | ScoringError::RunAborted { .. }
                | ScoringError::CollectTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScoringError>;
