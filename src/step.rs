use serde::{Deserialize, Serialize};

/// Geometry region a step point lies in, as far as scoring is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeId {
    World,
    Shield,
    Detector,
    Other,
}

/// Mapping from the transport engine's volume names to scoring regions.
///
/// The engine reports physical volumes by name (e.g. "Shield"); this table is
/// the only place those names are interpreted. Names that match none of the
/// entries resolve to [`VolumeId::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeNames {
    pub world: String,
    pub shield: String,
    pub detector: String,
}

impl Default for VolumeNames {
    fn default() -> Self {
        Self {
            world: "World".to_string(),
            shield: "Shield".to_string(),
            detector: "Detector".to_string(),
        }
    }
}

impl VolumeNames {
    /// Resolve a volume name reported by the transport engine
    pub fn resolve(&self, name: &str) -> VolumeId {
        if name == self.detector {
            VolumeId::Detector
        } else if name == self.shield {
            VolumeId::Shield
        } else if name == self.world {
            VolumeId::World
        } else {
            VolumeId::Other
        }
    }
}

/// One energy deposit reported by the transport engine for a single step.
///
/// Energies are in MeV and positions in mm. `next_volume` is the region of the
/// post-step point; it equals `volume` unless the step crossed a boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSample {
    pub volume: VolumeId,
    pub next_volume: VolumeId,
    pub deposited_energy: f64,
    pub axial_position: f64,
    pub event_id: u64,
    pub run_id: u32,
}

impl StepSample {
    /// Create a sample for a step contained in a single volume
    pub fn new(
        volume: VolumeId,
        deposited_energy: f64,
        axial_position: f64,
        event_id: u64,
        run_id: u32,
    ) -> Self {
        Self {
            volume,
            next_volume: volume,
            deposited_energy,
            axial_position,
            event_id,
            run_id,
        }
    }

    /// Mark the step as ending in another volume
    pub fn crossing_into(mut self, next_volume: VolumeId) -> Self {
        self.next_volume = next_volume;
        self
    }

    /// Check whether the step crossed from one volume into another
    pub fn crosses_boundary(&self) -> bool {
        self.volume != self.next_volume
    }

    /// A deposit must be finite and non-negative to be scored.
    pub fn has_valid_energy(&self) -> bool {
        self.deposited_energy.is_finite() && self.deposited_energy >= 0.0
    }
}
