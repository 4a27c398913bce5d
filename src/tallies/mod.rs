// Tallies module - per-event, per-run and depth-resolved energy accumulators
pub mod depth;
pub mod event;
pub mod run;

// Re-export main types for convenience
pub use depth::DepthHistogram;
pub use event::EventAccumulator;
pub use run::{RunAccumulator, RunStatistics, RunTotals};
