use crate::step::{StepSample, VolumeId};
use serde::{Deserialize, Serialize};

/// Accumulator update a step can feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Deposit goes into the depth histogram
    DepthBin,
    /// Deposit goes into the active event's detector total
    EventEnergy,
    /// Step crossed from the shield into the detector
    PassThrough,
}

impl Route {
    const ALL: [Route; 3] = [Route::DepthBin, Route::EventEnergy, Route::PassThrough];

    fn bit(self) -> u8 {
        match self {
            Route::DepthBin => 0b001,
            Route::EventEnergy => 0b010,
            Route::PassThrough => 0b100,
        }
    }

    /// Get the name of this route for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Route::DepthBin => "DepthBin",
            Route::EventEnergy => "EventEnergy",
            Route::PassThrough => "PassThrough",
        }
    }
}

/// Set of routes for one step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Routes(u8);

impl Routes {
    pub fn empty() -> Self {
        Routes(0)
    }

    pub fn insert(&mut self, route: Route) {
        self.0 |= route.bit();
    }

    pub fn contains(&self, route: Route) -> bool {
        self.0 & route.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Route> + '_ {
        Route::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Route> for Routes {
    fn from_iter<I: IntoIterator<Item = Route>>(iter: I) -> Self {
        let mut routes = Routes::empty();
        for route in iter {
            routes.insert(route);
        }
        routes
    }
}

/// Boundary crossing counted as a pass-through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crossing {
    pub from: VolumeId,
    pub to: VolumeId,
}

/// Geometry-to-accumulator mapping
///
/// Kept as plain data so the scoring regions can be changed from configuration
/// without touching the accumulators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingRules {
    /// Volumes whose deposits are binned by depth
    pub histogram_volumes: Vec<VolumeId>,
    /// Volumes whose deposits count towards the event's detector energy
    pub detector_volumes: Vec<VolumeId>,
    /// Crossing that increments the pass-through counter, if any
    pub pass_through: Option<Crossing>,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            histogram_volumes: vec![VolumeId::Shield],
            detector_volumes: vec![VolumeId::Detector],
            pass_through: Some(Crossing {
                from: VolumeId::Shield,
                to: VolumeId::Detector,
            }),
        }
    }
}

/// Decides which accumulators a step sample feeds
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepClassifier {
    rules: RoutingRules,
}

impl StepClassifier {
    pub fn new(rules: RoutingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RoutingRules {
        &self.rules
    }

    /// Routes for one sample, a pure function of its volumes
    ///
    /// # Arguments
    /// * `sample` - The step to classify
    ///
    /// # Returns
    /// The set of updates to apply; empty for World/Other with default rules
    pub fn classify(&self, sample: &StepSample) -> Routes {
        let mut routes = Routes::empty();
        if self.rules.histogram_volumes.contains(&sample.volume) {
            routes.insert(Route::DepthBin);
        }
        if self.rules.detector_volumes.contains(&sample.volume) {
            routes.insert(Route::EventEnergy);
        }
        if let Some(crossing) = self.rules.pass_through {
            if sample.volume == crossing.from && sample.next_volume == crossing.to {
                routes.insert(Route::PassThrough);
            }
        }
        routes
    }
}
