use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::SimConfig;
use crate::model::{Bacterium, SimulationState, Species, StrainId, Vec3};
use crate::sim::{SimSystem, TickContext, TickEvent};
use crate::spatial::SpatialIndex;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Default configuration; tests override the fields they care about.
pub fn test_config() -> SimConfig {
    SimConfig::default()
}

/// Register a fresh strain of `species` and return it.
pub fn new_strain(state: &mut SimulationState, species: Species) -> StrainId {
    let strain = StrainId(state.id_gen.next_id());
    state.strains.register(strain, species);
    strain
}

/// Add `n` founders of one new strain at random positions inside the world.
/// Returns the strain.
pub fn add_bacteria(
    state: &mut SimulationState,
    species: Species,
    n: usize,
    config: &SimConfig,
    seed: u64,
) -> StrainId {
    let mut rng = SmallRng::seed_from_u64(seed);
    let strain = new_strain(state, species);
    let (min, max) = (config.world.min, config.world.max);
    for _ in 0..n {
        let position = Vec3::new(
            rng.random_range(min.x..max.x),
            rng.random_range(min.y..max.y),
            rng.random_range(min.z..max.z),
        );
        let id = state.id_gen.next_id();
        state
            .bacteria
            .push(Bacterium::founder(id, species, strain, position));
    }
    strain
}

/// Add a single founder of a new strain at `position`. Returns its slot.
pub fn place_bacterium(state: &mut SimulationState, species: Species, position: Vec3) -> usize {
    let strain = new_strain(state, species);
    let id = state.id_gen.next_id();
    state
        .bacteria
        .push(Bacterium::founder(id, species, strain, position));
    state.bacteria.len() - 1
}

// ---------------------------------------------------------------------------
// Tick execution helpers
// ---------------------------------------------------------------------------

/// Run a single system for one step against a freshly built index.
/// Returns the events it emitted. Dead entities are not compacted, so slots
/// captured before the call stay valid.
pub fn run_system(
    system: &mut dyn SimSystem,
    state: &mut SimulationState,
    config: &SimConfig,
    dt: f64,
    seed: u64,
) -> Vec<TickEvent> {
    let mut index = SpatialIndex::new(config.octree_leaf_capacity, config.octree_max_depth);
    index.rebuild(state.index_entries());
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut events = Vec::new();
    let mut ctx = TickContext {
        state: &mut *state,
        config,
        index: &index,
        rng: &mut rng,
        dt,
        events: &mut events,
    };
    system
        .tick(&mut ctx)
        .unwrap_or_else(|e| panic!("{} failed: {e}", system.name()));
    state.step += 1;
    events
}
