use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::context::TickContext;
use super::diagnostics::DiagnosticsSystem;
use super::event::TickEvent;
use super::evolution::EvolutionSystem;
use super::immune::ImmuneSystem;
use super::phage::PhageSystem;
use super::pharmacology::{PharmacologySystem, reconcile_prescriptions};
use super::physiology::PhysiologySystem;
use super::seeding;
use super::system::{SimPhase, SimSystem};
use crate::config::{ConfigureRequest, SimConfig};
use crate::error::{ConfigError, SimError};
use crate::model::{Antibiotic, SimulationState};
use crate::snapshot::SimulationSnapshot;
use crate::spatial::SpatialIndex;

/// Controller state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Idle,
    Running,
    Paused,
    /// Entered after an internal tick failure; only `reset` leaves it.
    Terminated,
}

/// The command surface offered to front ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum Command {
    Configure(ConfigureRequest),
    Start,
    Pause,
    Reset,
    SetSpeed(f64),
    SelectAntibiotic(String),
}

/// What a call to `tick` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The state advanced by this many sub-steps.
    Advanced { steps: u32 },
    /// The controller was not running; nothing changed.
    Ignored { lifecycle: Lifecycle },
}

/// Derive a deterministic per-system seed from the run seed, system name and step.
pub fn derive_seed(seed: u64, domain: &str, step: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    domain.hash(&mut hasher);
    step.hash(&mut hasher);
    hasher.finish()
}

/// The engines of one step, grouped by phase in execution order.
pub fn default_systems() -> Vec<Box<dyn SimSystem>> {
    let mut systems: Vec<Box<dyn SimSystem>> = vec![
        Box::new(PhysiologySystem),
        Box::new(ImmuneSystem),
        Box::new(PharmacologySystem),
        Box::new(PhageSystem),
        Box::new(EvolutionSystem),
        Box::new(DiagnosticsSystem),
    ];
    // Stable: registration order is kept within a phase.
    systems.sort_by_key(|s| s.phase());
    systems
}

/// Owns the simulation state and drives it one tick at a time.
///
/// Single-threaded and cooperatively stepped: nothing happens between calls
/// to `tick`, and commands take effect at tick boundaries.
pub struct Simulation {
    config: SimConfig,
    state: SimulationState,
    lifecycle: Lifecycle,
    speed: f64,
    index: SpatialIndex,
    systems: Vec<Box<dyn SimSystem>>,
    last_error: Option<SimError>,
    /// Prescriptions changed since the last tick; reconciled when the next one starts.
    prescriptions_pending: bool,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = SimulationState::new(&config);
        let index = SpatialIndex::new(config.octree_leaf_capacity, config.octree_max_depth);
        Ok(Self {
            config,
            state,
            lifecycle: Lifecycle::Idle,
            speed: 1.0,
            index,
            systems: default_systems(),
            last_error: None,
            prescriptions_pending: false,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The failure that terminated the run, if any.
    pub fn last_error(&self) -> Option<&SimError> {
        self.last_error.as_ref()
    }

    /// Detached copy of everything a front end may render.
    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot::capture(&self.state, self.lifecycle)
    }

    pub fn apply(&mut self, command: Command) -> Result<(), SimError> {
        match command {
            Command::Configure(request) => self.configure(&request)?,
            Command::Start => self.start(),
            Command::Pause => self.pause(),
            Command::Reset => self.reset(),
            Command::SetSpeed(multiplier) => self.set_speed(multiplier)?,
            Command::SelectAntibiotic(id) => self.select_antibiotic(&id)?,
        }
        Ok(())
    }

    pub fn start(&mut self) {
        match self.lifecycle {
            Lifecycle::Idle | Lifecycle::Paused => {
                self.lifecycle = Lifecycle::Running;
                info!(tick = self.state.tick, "simulation started");
            }
            Lifecycle::Running => {}
            Lifecycle::Terminated => warn!("start ignored: simulation terminated, reset first"),
        }
    }

    pub fn pause(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            self.lifecycle = Lifecycle::Paused;
            info!(tick = self.state.tick, "simulation paused");
        } else {
            warn!(lifecycle = ?self.lifecycle, "pause ignored: simulation not running");
        }
    }

    /// Back to an empty, unseeded body at baseline physiology. Keeps the
    /// configuration and speed.
    pub fn reset(&mut self) {
        self.state = SimulationState::new(&self.config);
        self.index = SpatialIndex::new(self.config.octree_leaf_capacity, self.config.octree_max_depth);
        self.lifecycle = Lifecycle::Idle;
        self.last_error = None;
        self.prescriptions_pending = false;
        info!("simulation reset");
    }

    /// Validate and apply a front-end configuration as a whole. Population
    /// and species changes take effect from the next seeding; prescriptions
    /// take effect from the next tick.
    pub fn configure(&mut self, request: &ConfigureRequest) -> Result<(), ConfigError> {
        let next = self.config.with_request(request)?;
        self.config = next;
        self.prescriptions_pending = true;
        info!(
            population = self.config.initial_population,
            species = self.config.species.name(),
            therapy = ?self.config.therapy_mode,
            antibiotics = ?self.config.antibiotics,
            "configuration applied"
        );
        Ok(())
    }

    pub fn set_speed(&mut self, multiplier: f64) -> Result<(), ConfigError> {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(ConfigError::InvalidSpeed(multiplier));
        }
        self.speed = multiplier;
        info!(speed = multiplier, "speed changed");
        Ok(())
    }

    /// Prescribe one more antibiotic on its standard regimen, starting with
    /// the next tick.
    pub fn select_antibiotic(&mut self, id: &str) -> Result<(), ConfigError> {
        let antibiotic =
            Antibiotic::from_id(id).ok_or_else(|| ConfigError::UnknownAntibiotic(id.to_string()))?;
        if !self.config.antibiotics.contains(&antibiotic) {
            self.config.antibiotics.push(antibiotic);
        }
        self.config.therapy_mode = self.config.therapy_mode.with_antibiotics();
        self.prescriptions_pending = true;
        info!(antibiotic = antibiotic.id(), "antibiotic selected");
        Ok(())
    }

    /// Advance by `dt` simulated minutes, scaled by the speed multiplier and
    /// split into equal sub-steps no longer than `max_substep`. A tick that
    /// would need more than `max_substeps_per_tick` sub-steps is rejected
    /// without touching the state.
    ///
    /// The tick is atomic: sub-steps run on a scratch copy which replaces the
    /// state only if every one of them succeeds.
    pub fn tick(&mut self, dt: f64) -> Result<TickOutcome, SimError> {
        match self.lifecycle {
            Lifecycle::Running => {}
            Lifecycle::Terminated => return Err(SimError::Terminated),
            lifecycle @ (Lifecycle::Idle | Lifecycle::Paused) => {
                warn!(?lifecycle, "tick ignored: simulation not running");
                return Ok(TickOutcome::Ignored { lifecycle });
            }
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConfigError::InvalidParameter { name: "dt", value: dt }.into());
        }

        let total = dt * self.speed;
        let limit = self.config.max_substeps_per_tick;
        let needed = (total / self.config.max_substep).ceil().max(1.0);
        if needed > f64::from(limit) {
            warn!(minutes = total, limit, "tick rejected: too many sub-steps");
            return Err(SimError::TickTooLong { minutes: total, limit });
        }
        let steps = needed as u32;
        let sub_dt = total / f64::from(steps);

        let mut scratch = self.state.clone();
        if self.prescriptions_pending && scratch.seeded {
            reconcile_prescriptions(&mut scratch, &self.config);
        }
        for _ in 0..steps {
            if let Err(e) = self.step(&mut scratch, sub_dt) {
                error!(tick = self.state.tick, error = %e, "tick failed; terminating");
                self.lifecycle = Lifecycle::Terminated;
                self.last_error = Some(e.clone());
                return Err(e);
            }
        }
        scratch.tick += 1;
        self.state = scratch;
        self.prescriptions_pending = false;

        debug!(
            tick = self.state.tick,
            steps,
            bacteria = self.state.live_bacteria(),
            immune = self.state.immune_cells.len(),
            phages = self.state.phages.len(),
            score = self.state.vitals.sepsis_score,
            stage = ?self.state.vitals.stage,
            "tick complete"
        );
        Ok(TickOutcome::Advanced { steps })
    }

    /// One pipeline pass: circulation, index rebuild, interaction, assessment.
    fn step(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), SimError> {
        let config = &self.config;
        if !state.seeded {
            let mut rng = SmallRng::seed_from_u64(derive_seed(config.seed, "seeding", 0));
            seeding::populate(state, config, &mut rng);
        }

        let mut events: Vec<TickEvent> = Vec::new();
        // Circulation moves entities, so the index is built only after it.
        let empty = SpatialIndex::new(config.octree_leaf_capacity, config.octree_max_depth);
        let mut indexed = false;
        for system in self.systems.iter_mut() {
            if system.phase() > SimPhase::Circulation && !indexed {
                rebuild_index(&mut self.index, state, config)?;
                indexed = true;
            }
            let index = if indexed { &self.index } else { &empty };
            let mut rng = SmallRng::seed_from_u64(derive_seed(config.seed, system.name(), state.step));
            let mut ctx = TickContext {
                state: &mut *state,
                config,
                index,
                rng: &mut rng,
                dt,
                events: &mut events,
            };
            system.tick(&mut ctx)?;
        }

        state.compact();
        state.step += 1;
        state.elapsed += dt;
        Ok(())
    }
}

/// Rebuild the spatial index from every living entity and verify it.
fn rebuild_index(
    index: &mut SpatialIndex,
    state: &SimulationState,
    config: &SimConfig,
) -> Result<(), SimError> {
    let entries = state.index_entries();
    if entries.iter().any(|(_, p)| !p.is_finite()) {
        return Err(SimError::NonFinite {
            system: "spatial",
            quantity: "position",
        });
    }
    index.rebuild(entries.iter().copied());
    if !index.matches(&entries) {
        debug_assert!(false, "spatial index out of sync after rebuild");
        warn!(entries = entries.len(), "spatial index out of sync; rebuilding from scratch");
        *index = SpatialIndex::new(config.octree_leaf_capacity, config.octree_max_depth);
        index.rebuild(entries.iter().copied());
    }
    Ok(())
}
