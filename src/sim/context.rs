use rand::RngCore;

use super::event::TickEvent;
use crate::config::SimConfig;
use crate::model::SimulationState;
use crate::spatial::SpatialIndex;

/// Context passed to each system on every step.
///
/// Bundled so we can add fields later without changing the `SimSystem`
/// trait signature. Borrows end with the step; nothing here may be retained.
pub struct TickContext<'a> {
    pub state: &'a mut SimulationState,
    pub config: &'a SimConfig,
    /// Index over every entity alive at the start of the interaction phase.
    pub index: &'a SpatialIndex,
    /// Stream private to the running system for this step.
    pub rng: &'a mut dyn RngCore,
    /// Simulated minutes covered by this step.
    pub dt: f64,
    /// Systems push what happened here; diagnostics folds them into stats.
    pub events: &'a mut Vec<TickEvent>,
}
