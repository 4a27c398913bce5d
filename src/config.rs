// Run configuration for the scoring engine
use crate::classifier::RoutingRules;
use crate::error::{Result, ScoringError};
use crate::step::VolumeNames;
use crate::tallies::DepthHistogram;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the detector mass in kg
pub const DETECTOR_MASS_ENV: &str = "EDEP_DETECTOR_MASS_KG";

/// Depth binning along the transport axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    pub bin_count: u32,
    /// Upper edge of the scoring window in mm
    pub max_depth_mm: f64,
    /// Axial position (mm) that maps to depth zero
    pub depth_origin_mm: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bin_count: 100,
            max_depth_mm: 160.0,
            depth_origin_mm: 0.0,
        }
    }
}

/// What happens to the depth profile file at the end of each run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProfilePolicy {
    /// Replace the profile file, which always holds the latest run
    #[default]
    Overwrite,
    /// Keep one profile file per run, named after the run id
    PerRun,
    /// Do not write depth profiles
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Append-only run summary log
    pub summary_path: PathBuf,
    pub profile_path: PathBuf,
    pub profile_policy: ProfilePolicy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_path: PathBuf::from("dose_output.txt"),
            profile_path: PathBuf::from("depth_profile.txt"),
            profile_policy: ProfilePolicy::Overwrite,
        }
    }
}

/// Configuration for one run of the scoring engine.
///
/// Supplied once at run start and treated as immutable until the run ends.
/// The detector mass has no default: a dose is only reported once a mass has
/// been configured, either in the JSON file, with
/// [`ScoringConfig::set_detector_mass`], or through [`DETECTOR_MASS_ENV`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Detector mass in kg
    pub detector_mass_kg: Option<f64>,
    pub histogram: HistogramConfig,
    pub volumes: VolumeNames,
    pub routing: RoutingRules,
    pub output: OutputConfig,
    /// How long the master waits for all workers to report at run end
    pub collect_timeout_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            detector_mass_kg: None,
            histogram: HistogramConfig::default(),
            volumes: VolumeNames::default(),
            routing: RoutingRules::default(),
            output: OutputConfig::default(),
            collect_timeout_secs: 600,
        }
    }
}

impl ScoringConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ScoringConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScoringError::io(path, e))?;
        Self::from_json_str(&text)
    }

    pub fn set_detector_mass(&mut self, mass_kg: f64) {
        self.detector_mass_kg = Some(mass_kg);
    }

    /// Set the depth binning
    pub fn set_histogram(&mut self, bin_count: u32, max_depth_mm: f64) {
        self.histogram.bin_count = bin_count;
        self.histogram.max_depth_mm = max_depth_mm;
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup, e.g. a map in tests
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(DETECTOR_MASS_ENV) {
            let mass: f64 = raw.trim().parse().map_err(|_| {
                ScoringError::config(format!(
                    "{} must be a number in kg, got '{}'",
                    DETECTOR_MASS_ENV, raw
                ))
            })?;
            self.detector_mass_kg = Some(mass);
        }
        Ok(())
    }

    /// Check the parts of the configuration that must hold before a run starts.
    ///
    /// The detector mass is deliberately not checked here; a missing or bad
    /// mass fails the dose computation of the run instead.
    pub fn validate(&self) -> Result<()> {
        self.new_histogram()?;
        if !self.histogram.depth_origin_mm.is_finite() {
            return Err(ScoringError::config("depth origin must be finite"));
        }
        Ok(())
    }

    /// Empty histogram with the configured shape
    pub fn new_histogram(&self) -> Result<DepthHistogram> {
        DepthHistogram::new(self.histogram.bin_count, self.histogram.max_depth_mm)
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.collect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::VolumeId;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ScoringConfig::new();
        assert_eq!(config.detector_mass_kg, None);
        assert_eq!(config.histogram.bin_count, 100);
        assert_eq!(config.histogram.max_depth_mm, 160.0);
        assert_eq!(config.output.summary_path, PathBuf::from("dose_output.txt"));
        assert_eq!(config.output.profile_policy, ProfilePolicy::Overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{
            "detector_mass_kg": 0.04,
            "histogram": { "bin_count": 320 },
            "output": { "profile_policy": "per_run" }
        }"#;
        let config = ScoringConfig::from_json_str(json).unwrap();
        assert_eq!(config.detector_mass_kg, Some(0.04));
        assert_eq!(config.histogram.bin_count, 320);
        assert_eq!(config.histogram.max_depth_mm, 160.0);
        assert_eq!(config.output.profile_policy, ProfilePolicy::PerRun);
        assert_eq!(config.volumes.detector, "Detector");
    }

    #[test]
    fn test_from_json_routing() {
        let json = r#"{
            "routing": {
                "histogram_volumes": ["detector"],
                "detector_volumes": ["detector"],
                "pass_through": null
            }
        }"#;
        let config = ScoringConfig::from_json_str(json).unwrap();
        assert_eq!(config.routing.histogram_volumes, vec![VolumeId::Detector]);
        assert_eq!(config.routing.pass_through, None);
    }

    #[test]
    fn test_invalid_histogram_rejected() {
        let json = r#"{ "histogram": { "bin_count": 0 } }"#;
        assert!(matches!(
            ScoringConfig::from_json_str(json),
            Err(ScoringError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ScoringConfig::from_json_str("{ not json"),
            Err(ScoringError::Json(_))
        ));
    }

    #[test]
    fn test_mass_override() {
        let mut config = ScoringConfig::new();
        let env = HashMap::from([(DETECTOR_MASS_ENV.to_string(), "0.03".to_string())]);
        config
            .apply_overrides_from(|key| env.get(key).cloned())
            .unwrap();
        assert_eq!(config.detector_mass_kg, Some(0.03));
    }

    #[test]
    fn test_bad_mass_override() {
        let mut config = ScoringConfig::new();
        let result = config.apply_overrides_from(|_| Some("forty grams".to_string()));
        assert!(result.is_err());
        assert_eq!(config.detector_mass_kg, None);
    }

    #[test]
    fn test_no_override_keeps_mass() {
        let mut config = ScoringConfig::new();
        config.set_detector_mass(0.5);
        config.apply_overrides_from(|_| None).unwrap();
        assert_eq!(config.detector_mass_kg, Some(0.5));
    }

    #[test]
    fn test_new_histogram_shape() {
        let mut config = ScoringConfig::new();
        config.set_histogram(20, 40.0);
        let hist = config.new_histogram().unwrap();
        assert_eq!(hist.bin_count(), 20);
        assert_eq!(hist.max_depth(), 40.0);
    }
}
