use crate::error::{Result, ScoringError, ShapeMismatch};
use serde::{Deserialize, Serialize};

/// Depth histogram - energy deposited per fixed-width bin along the transport axis
/// Bins cover the half-open window [0, max_depth), bin i spans [i*w, (i+1)*w)
/// with w = max_depth / bin_count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HistogramData")]
pub struct DepthHistogram {
    /// Energy per bin in MeV, always `bin_count` long
    bins: Vec<f64>,
    bin_count: u32,
    /// Upper edge of the scoring window in mm (exclusive)
    max_depth: f64,
}

/// Unchecked wire form, validated into a [`DepthHistogram`] on load
#[derive(Deserialize)]
struct HistogramData {
    bins: Vec<f64>,
    bin_count: u32,
    max_depth: f64,
}

impl TryFrom<HistogramData> for DepthHistogram {
    type Error = ScoringError;

    fn try_from(data: HistogramData) -> Result<Self> {
        let mut hist = DepthHistogram::new(data.bin_count, data.max_depth)?;
        if data.bins.len() != hist.bins.len() {
            return Err(ScoringError::config(format!(
                "depth histogram declares {} bins but holds {}",
                data.bin_count,
                data.bins.len()
            )));
        }
        hist.bins = data.bins;
        Ok(hist)
    }
}

impl DepthHistogram {
    /// Create an empty histogram
    ///
    /// # Arguments
    /// * `bin_count` - Number of bins, must be at least 1
    /// * `max_depth` - Upper edge of the depth window in mm, must be positive and finite
    ///
    /// # Returns
    /// A histogram with every bin at zero, or a configuration error
    pub fn new(bin_count: u32, max_depth: f64) -> Result<Self> {
        if bin_count == 0 {
            return Err(ScoringError::config(
                "depth histogram requires at least 1 bin",
            ));
        }
        if !max_depth.is_finite() || max_depth <= 0.0 {
            return Err(ScoringError::config(format!(
                "depth histogram max depth must be positive and finite, got {}",
                max_depth
            )));
        }
        Ok(Self {
            bins: vec![0.0; bin_count as usize],
            bin_count,
            max_depth,
        })
    }

    pub fn bin_count(&self) -> u32 {
        self.bin_count
    }

    pub fn max_depth(&self) -> f64 {
        self.max_depth
    }

    /// Width of a single bin in mm
    pub fn bin_width(&self) -> f64 {
        self.max_depth / self.bin_count as f64
    }

    pub fn bins(&self) -> &[f64] {
        &self.bins
    }

    /// Get the bin index for a depth
    ///
    /// # Returns
    /// `Some(index)` if the depth lies in [0, max_depth), `None` otherwise
    pub fn bin_index(&self, depth: f64) -> Option<usize> {
        if !depth.is_finite() || depth < 0.0 || depth >= self.max_depth {
            return None;
        }
        let index = (depth / self.bin_width()).floor() as usize;
        // depth just below max_depth can round up to bin_count
        Some(index.min(self.bins.len() - 1))
    }

    /// Score an energy deposit at a depth
    ///
    /// Depths outside the window are ignored.
    ///
    /// # Returns
    /// `true` if the deposit landed in a bin
    pub fn add_sample(&mut self, depth: f64, energy: f64) -> bool {
        match self.bin_index(depth) {
            Some(i) => {
                self.bins[i] += energy;
                true
            }
            None => false,
        }
    }

    /// Check that two histograms share bin count and depth window
    pub fn same_shape(&self, other: &DepthHistogram) -> bool {
        self.bin_count == other.bin_count
            && self.max_depth == other.max_depth
            && self.bins.len() == other.bins.len()
    }

    fn check_shape(&self, other: &DepthHistogram) -> std::result::Result<(), ShapeMismatch> {
        if self.same_shape(other) {
            Ok(())
        } else {
            Err(ShapeMismatch {
                expected_bins: self.bin_count,
                expected_max_depth: self.max_depth,
                found_bins: other.bins.len() as u32,
                found_max_depth: other.max_depth,
            })
        }
    }

    /// Elementwise sum of two histograms with the same shape
    pub fn merge(&self, other: &DepthHistogram) -> std::result::Result<DepthHistogram, ShapeMismatch> {
        let mut merged = self.clone();
        merged.merge_from(other)?;
        Ok(merged)
    }

    /// Add another histogram into this one in place
    pub fn merge_from(&mut self, other: &DepthHistogram) -> std::result::Result<(), ShapeMismatch> {
        self.check_shape(other)?;
        for (acc, value) in self.bins.iter_mut().zip(&other.bins) {
            *acc += value;
        }
        Ok(())
    }

    /// Rows of (bin center depth in mm, energy in MeV), one per bin
    pub fn to_table(&self) -> Vec<(f64, f64)> {
        let width = self.bin_width();
        self.bins
            .iter()
            .enumerate()
            .map(|(i, &energy)| ((i as f64 + 0.5) * width, energy))
            .collect()
    }

    /// Total energy over all bins
    pub fn total(&self) -> f64 {
        self.bins.iter().sum()
    }

    /// Zero every bin, keeping the shape
    pub fn reset(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0.0);
    }
}
