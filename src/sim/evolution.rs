use rand::Rng;

use super::context::TickContext;
use super::event::{DeathCause, TickEvent};
use super::helpers::{clamp01, ensure_finite, rate_to_probability};
use super::pharmacology::effect_on;
use super::system::{SimPhase, SimSystem};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::model::{
    Bacterium, EntityKind, SimulationState, StrainId, SurfaceStructure, ToxinKind, Vec3,
};

// --- Constants ---

/// Fitness lost per unit of total toxin production.
const TOXIN_FITNESS_COST: f64 = 0.1;
/// Share of the basal uptake rate a cell can draw from a nearby patch.
const PATCH_UPTAKE_SHARE: f64 = 0.5;
/// Fitness bonus from a nutrient patch in range.
const PATCH_FITNESS_BONUS: f64 = 0.2;
/// Scatter of a daughter cell around its parent.
const DAUGHTER_SPREAD: f64 = 1.0;

/// Bacterial metabolism, division with mutation, antigenic drift, plasmid
/// transfer, motility and starvation.
pub struct EvolutionSystem;

impl SimSystem for EvolutionSystem {
    fn name(&self) -> &'static str {
        "evolution"
    }

    fn phase(&self) -> SimPhase {
        SimPhase::Interaction
    }

    fn tick(&mut self, ctx: &mut TickContext) -> Result<(), SimError> {
        regenerate_nutrients(ctx.state, ctx.config, ctx.dt);

        let capacity = ctx.config.carrying_capacity as usize;
        let mut live = ctx.state.live_bacteria();
        // Daughters are appended past this point and act from the next step.
        let founders = ctx.state.bacteria.len();
        for i in 0..founders {
            if !ctx.state.bacteria[i].alive {
                continue;
            }
            if !metabolize(ctx, i) {
                live -= 1;
                continue;
            }
            if live < capacity && try_divide(ctx, i) {
                live += 1;
            }
            try_conjugate(ctx, i);
            swim(ctx, i);
            let b = &ctx.state.bacteria[i];
            ensure_finite(self.name(), "bacterial_energy", b.energy)?;
        }
        Ok(())
    }
}

fn regenerate_nutrients(state: &mut SimulationState, config: &SimConfig, dt: f64) {
    for patch in &mut state.nutrients {
        let regrowth = config.nutrient_regeneration * patch.capacity * dt;
        patch.amount = (patch.amount + regrowth).min(patch.capacity);
    }
}

/// Feed, pay upkeep, repair the envelope. Returns `false` if the cell died.
fn metabolize(ctx: &mut TickContext, i: usize) -> bool {
    let config = ctx.config;
    let ev = &config.evolution;
    let dt = ctx.dt;
    let position = ctx.state.bacteria[i].position;

    let mut gained = ev.nutrient_uptake * config.nutrient_supply * dt;
    let nutrient_slots = ctx.index.query_kind(position, ev.nutrient_radius, EntityKind::Nutrient);
    if let Some(&slot) = nutrient_slots.first()
        && let Some(patch) = ctx.state.nutrients.get_mut(slot)
    {
        let take = patch.amount.min(ev.nutrient_uptake * PATCH_UPTAKE_SHARE * dt);
        patch.amount -= take;
        gained += take;
    }

    let b = &mut ctx.state.bacteria[i];
    let toxin_burden: f64 = ToxinKind::ALL.iter().map(|&k| b.genome.toxin_level(k)).sum();
    let upkeep = (ev.metabolic_cost + ev.toxin_cost * toxin_burden) * dt;
    b.energy = clamp01(b.energy + gained - upkeep);
    b.age += dt;

    if b.envelope_integrity <= 0.0 {
        b.alive = false;
        // No recorded attacker: the envelope wore out with the cell's reserves.
        let cause = b
            .envelope_damage
            .map_or(DeathCause::Starvation, DeathCause::EnvelopeFailure);
        ctx.events.push(TickEvent::BacteriumKilled {
            bacterium_id: b.id,
            cause,
        });
        return false;
    }
    if b.energy <= 0.0 {
        b.alive = false;
        ctx.events.push(TickEvent::BacteriumKilled {
            bacterium_id: b.id,
            cause: DeathCause::Starvation,
        });
        return false;
    }
    b.envelope_integrity = (b.envelope_integrity + ev.envelope_repair * dt).min(1.0);
    true
}

/// Fitness (0-1): nutrient availability minus toxin upkeep, antibiotic
/// stress and immune pressure.
pub fn fitness(ctx: &TickContext, b: &Bacterium) -> f64 {
    let config = ctx.config;
    let ev = &config.evolution;

    let mut availability = config.nutrient_supply;
    if !ctx
        .index
        .query_kind(b.position, ev.nutrient_radius, EntityKind::Nutrient)
        .is_empty()
    {
        availability += PATCH_FITNESS_BONUS;
    }

    let toxins: f64 = ToxinKind::ALL.iter().map(|&k| b.genome.toxin_level(k)).sum();
    let antibiotic: f64 = ctx
        .state
        .drugs
        .iter()
        .map(|d| effect_on(d.antibiotic, d.concentration, b, config))
        .sum();

    let mut phagocytes = 0usize;
    let cells = &ctx.state.immune_cells;
    ctx.index
        .for_each_within(b.position, ev.immune_pressure_radius, |key, _| {
            if key.kind == EntityKind::ImmuneCell
                && cells
                    .get(key.slot)
                    .is_some_and(|c| c.alive && c.kind.is_phagocyte())
            {
                phagocytes += 1;
            }
        });
    let immune = ev.immune_pressure_per_cell * phagocytes as f64;

    clamp01(availability.min(1.0) - TOXIN_FITNESS_COST * toxins - antibiotic - immune)
}

/// Divide with a probability set by fitness and growth rate. The daughter
/// inherits a mutated copy of the genome and half of the parent's energy.
fn try_divide(ctx: &mut TickContext, i: usize) -> bool {
    let config = ctx.config;
    let ev = &config.evolution;
    {
        let b = &ctx.state.bacteria[i];
        if b.energy < ev.division_energy_threshold
            || b.envelope_integrity < ev.integrity_floor
            || b.infection.is_some()
        {
            return false;
        }
        let rate = ev.base_division_rate
            * b.species.profile().growth_rate
            * b.genome.growth_multiplier()
            * fitness(ctx, b);
        if !ctx.rng.random_bool(rate_to_probability(rate, ctx.dt)) {
            return false;
        }
    }

    let child_id = ctx.state.id_gen.next_id();
    let parent = &mut ctx.state.bacteria[i];
    parent.energy *= 0.5;
    parent.age = 0.0;
    let mut child = Bacterium {
        id: child_id,
        position: config
            .world
            .confine(parent.position + Vec3::jitter(ctx.rng, DAUGHTER_SPREAD)),
        velocity: Vec3::ZERO,
        species: parent.species,
        strain: parent.strain,
        genome: parent.genome.clone(),
        envelope_integrity: parent.envelope_integrity,
        envelope_damage: parent.envelope_damage,
        energy: parent.energy,
        age: 0.0,
        opsonized: false,
        infection: None,
        alive: true,
    };
    let parent_id = parent.id;
    let parent_strain = parent.strain;

    let summary = child.genome.mutate(ctx.rng, ev.mutation_rate, ev.mutation_step);
    if summary.surface_drift > ev.strain_drift_threshold {
        let strain = StrainId(ctx.state.id_gen.next_id());
        ctx.state.strains.register(strain, child.species);
        child.strain = strain;
        ctx.events.push(TickEvent::StrainEmerged {
            strain,
            parent: parent_strain,
        });
    }
    ctx.state.bacteria.push(child);
    ctx.events.push(TickEvent::BacteriumBorn { parent_id, child_id });
    true
}

/// Horizontal resistance transfer from a contacting cell of another strain.
fn try_conjugate(ctx: &mut TickContext, i: usize) {
    let config = ctx.config;
    let ev = &config.evolution;
    if !ctx.rng.random_bool(rate_to_probability(ev.transfer_probability, ctx.dt)) {
        return;
    }
    let (position, strain, recipient_id) = {
        let b = &ctx.state.bacteria[i];
        (b.position, b.strain, b.id)
    };
    let donor = ctx
        .index
        .query_kind(position, ev.contact_radius, EntityKind::Bacterium)
        .into_iter()
        .filter(|&slot| slot != i)
        .filter_map(|slot| ctx.state.bacteria.get(slot))
        .find(|d| d.alive && d.strain != strain)
        .map(|d| (d.id, d.genome.clone()));
    let Some((donor_id, donor_genome)) = donor else {
        return;
    };
    if ctx.state.bacteria[i]
        .genome
        .acquire_resistance(&donor_genome, ev.transfer_fraction)
    {
        ctx.events.push(TickEvent::ResistanceTransferred {
            donor_id,
            recipient_id,
        });
    }
}

/// Flagellar swimming in a random direction, scaled by flagella expression.
fn swim(ctx: &mut TickContext, i: usize) {
    let config = ctx.config;
    let b = &ctx.state.bacteria[i];
    let flagella = b.genome.surface(SurfaceStructure::Flagella);
    if flagella <= 0.0 {
        return;
    }
    let velocity = Vec3::random_direction(ctx.rng, config.evolution.motility_speed * flagella);
    let b = &mut ctx.state.bacteria[i];
    b.velocity = velocity;
    b.position = config.world.confine(b.position + velocity * ctx.dt);
}
