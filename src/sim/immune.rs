use rand::Rng;

use super::context::TickContext;
use super::event::{DeathCause, TickEvent};
use super::helpers::{clamp01, ensure_finite, safe_div, stochastic_count};
use super::system::{SimPhase, SimSystem};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::model::{
    Antibody, CytokineKind, EntityKind, EnvelopeDamage, FieldCell, ImmuneCell, ImmuneCellKind, SimulationState,
    StrainExposure, StrainId, ToxinKind, Vec3,
};
use crate::spatial::SpatialIndex;

// --- Constants ---

/// Share of the induced pro-inflammatory signal released as each cytokine.
const TNF_SHARE: f64 = 0.4;
const IL1_SHARE: f64 = 0.25;
const IL6_SHARE: f64 = 0.35;
/// Fraction of a cell's speed used when it has no target.
const WANDER_FRACTION: f64 = 0.25;
/// Capture probability multiplier at zero activation (one at full activation).
const RESTING_CAPTURE: f64 = 0.5;
/// Spread of newly released antibodies around their B-cell.
const ANTIBODY_RELEASE_SPREAD: f64 = 2.0;
/// Random-walk step of free antibodies (µm per sqrt-minute).
const ANTIBODY_DIFFUSION: f64 = 1.5;

/// Innate and adaptive host response: cytokine signalling, recruitment,
/// chemotaxis, phagocytosis, T-cell help and antibody neutralisation.
pub struct ImmuneSystem;

impl SimSystem for ImmuneSystem {
    fn name(&self) -> &'static str {
        "immune"
    }

    fn phase(&self) -> SimPhase {
        SimPhase::Interaction
    }

    fn tick(&mut self, ctx: &mut TickContext) -> Result<(), SimError> {
        // Cytokine signalling runs even without immune cells: it is the
        // endothelial and plasma response to the pathogen itself.
        emit_cytokines(ctx.state, ctx.config, ctx.dt);
        let im = &ctx.config.immune;
        ctx.state
            .cytokines
            .step(ctx.dt, im.cytokine_diffusion, im.cytokine_decay);
        let (_, hottest) = ctx.state.cytokines.hottest_cell();
        ensure_finite(self.name(), "cytokine_level", hottest)?;

        if !ctx.config.immune.enabled {
            return Ok(());
        }

        record_exposures(ctx.state);
        mount_adaptive_responses(ctx);
        recruit(ctx);
        act_cells(ctx);
        bind_antibodies(ctx);
        Ok(())
    }
}

/// Bacteria release PAMP-driven cytokines into their grid cell; IL-10 follows
/// the local pro-inflammatory load.
fn emit_cytokines(state: &mut SimulationState, config: &SimConfig, dt: f64) {
    let im = &config.immune;
    for b in state.bacteria.iter().filter(|b| b.alive) {
        let endotoxin = b.genome.toxin_level(ToxinKind::Endotoxin);
        let amount =
            im.cytokine_emission * b.species.profile().pamp_potency * (1.0 + im.endotoxin_bonus * endotoxin) * dt;
        let cell = state.cytokines.cell_of(b.position);
        state.cytokines.emit(cell, CytokineKind::TnfAlpha, amount * TNF_SHARE);
        state.cytokines.emit(cell, CytokineKind::Il1, amount * IL1_SHARE);
        state.cytokines.emit(cell, CytokineKind::Il6, amount * IL6_SHARE);
    }
    for i in 0..state.cytokines.cell_count() {
        let cell = FieldCell(i);
        let pro = state.cytokines.pro_inflammatory(cell);
        state
            .cytokines
            .emit(cell, CytokineKind::Il10, im.il10_ratio * pro * dt);
    }
}

/// Note the first step each strain was seen in circulation.
fn record_exposures(state: &mut SimulationState) {
    let step = state.step;
    for b in state.bacteria.iter().filter(|b| b.alive) {
        state.exposures.entry(b.strain).or_insert(StrainExposure {
            first_seen_step: step,
            responded: false,
        });
    }
}

/// After the activation delay, commit one B-cell and one helper T-cell to
/// each strain that is still circulating.
fn mount_adaptive_responses(ctx: &mut TickContext) {
    let delay = ctx.config.immune.adaptive_delay_steps;
    let step = ctx.state.step;
    let due: Vec<StrainId> = ctx
        .state
        .exposures
        .iter()
        .filter(|(_, e)| !e.responded && step.saturating_sub(e.first_seen_step) >= delay)
        .map(|(strain, _)| *strain)
        .collect();

    for strain in due {
        let Some(site) = ctx
            .state
            .bacteria
            .iter()
            .find(|b| b.alive && b.strain == strain)
            .map(|b| b.position)
        else {
            continue;
        };
        if let Some(exposure) = ctx.state.exposures.get_mut(&strain) {
            exposure.responded = true;
        }
        let species = ctx.state.strains.species_of(strain);
        tracing::debug!(strain = strain.0, species = species.name(), step, "adaptive response mounted");

        for kind in [ImmuneCellKind::BCell, ImmuneCellKind::TCell] {
            let id = ctx.state.id_gen.next_id();
            let position = ctx.config.world.confine(site + Vec3::jitter(ctx.rng, 5.0));
            let mut cell = ImmuneCell::new(id, kind, position);
            cell.specificity = Some(strain);
            ctx.state.immune_cells.push(cell);
        }
        ctx.events.push(TickEvent::AdaptiveResponse { strain });
    }
}

/// Spawn phagocytes near the most inflamed grid cell, proportionally to the
/// pro-inflammatory excess over threshold and damped by IL-10.
fn recruit(ctx: &mut TickContext) {
    let config = ctx.config;
    let im = &config.immune;
    let (hot, _) = ctx.state.cytokines.hottest_cell();
    let pro = ctx.state.cytokines.pro_inflammatory(hot);
    let excess = pro - im.recruitment_threshold;
    if excess <= 0.0 {
        return;
    }
    let il10 = ctx.state.cytokines.level(hot, CytokineKind::Il10);
    let suppression = 1.0 - im.il10_suppression * clamp01(safe_div(il10, pro, 0.0));
    let expected = im.recruitment_rate * excess * suppression * ctx.dt;

    let live = ctx.state.immune_cells.iter().filter(|c| c.alive).count();
    let room = im.max_immune_cells.saturating_sub(live);
    let count = stochastic_count(expected, ctx.rng).min(room);

    let center = ctx.state.cytokines.center_of(hot);
    let half = ctx.state.cytokines.cell_half_extent();
    for _ in 0..count {
        let kind = if ctx.rng.random_bool(clamp01(im.neutrophil_fraction)) {
            ImmuneCellKind::Neutrophil
        } else {
            ImmuneCellKind::Macrophage
        };
        let offset = Vec3::new(
            ctx.rng.random_range(-half.x..=half.x),
            ctx.rng.random_range(-half.y..=half.y),
            ctx.rng.random_range(-half.z..=half.z),
        );
        let id = ctx.state.id_gen.next_id();
        let mut cell = ImmuneCell::new(id, kind, config.world.confine(center + offset));
        cell.recruited_by = Some(hot);
        ctx.state.immune_cells.push(cell);
        ctx.events.push(TickEvent::ImmuneCellRecruited { kind });
    }
}

/// Nearest living bacterium within `radius`, optionally restricted to a strain.
fn nearest_bacterium(
    index: &SpatialIndex,
    state: &SimulationState,
    from: Vec3,
    radius: f64,
    strain: Option<StrainId>,
) -> Option<(usize, f64)> {
    index
        .nearest(from, radius, |key| {
            key.kind == EntityKind::Bacterium
                && state
                    .bacteria
                    .get(key.slot)
                    .is_some_and(|b| b.alive && strain.is_none_or(|s| b.strain == s))
        })
        .map(|(key, d)| (key.slot, d))
}

/// Age, move and engage every immune cell.
fn act_cells(ctx: &mut TickContext) {
    let config = ctx.config;
    let im = &config.immune;
    let dt = ctx.dt;
    for i in 0..ctx.state.immune_cells.len() {
        let (kind, position, specificity) = {
            let cell = &mut ctx.state.immune_cells[i];
            if !cell.alive {
                continue;
            }
            cell.age += dt;
            cell.activation = clamp01(cell.activation - im.activation_decay * dt);
            if cell.age >= cell.kind.lifespan() || cell.energy <= 0.0 {
                cell.alive = false;
                continue;
            }
            (cell.kind, cell.position, cell.specificity)
        };

        let radius = im.sensing_radius;
        let target = if kind.is_phagocyte() {
            nearest_bacterium(ctx.index, ctx.state, position, radius, None)
        } else {
            nearest_bacterium(ctx.index, ctx.state, position, radius, specificity)
        };

        match kind {
            ImmuneCellKind::Neutrophil | ImmuneCellKind::Macrophage => {
                if let Some((slot, distance)) = target
                    && distance <= im.engagement_radius
                {
                    engulf(ctx, i, slot);
                    continue;
                }
            }
            ImmuneCellKind::TCell => help_phagocytes(ctx, position),
            ImmuneCellKind::BCell => {
                if let Some(strain) = specificity {
                    release_antibodies(ctx, position, strain);
                }
            }
        }

        let speed = kind.speed() * dt;
        let step = match target {
            Some((slot, distance)) => {
                let toward = ctx.state.bacteria[slot].position - position;
                toward.normalized() * speed.min(distance)
            }
            None => Vec3::random_direction(ctx.rng, speed * WANDER_FRACTION),
        };
        let cell = &mut ctx.state.immune_cells[i];
        cell.velocity = step * (1.0 / dt.max(f64::EPSILON));
        cell.position = config.world.confine(position + step);
    }
}

/// One phagocytosis attempt by cell `i` on bacterium `slot`.
fn engulf(ctx: &mut TickContext, i: usize, slot: usize) {
    let config = ctx.config;
    let im = &config.immune;
    let (bacterium_id, evasion, opsonized) = {
        let b = &ctx.state.bacteria[slot];
        (b.id, b.genome.evasion_factor(), b.opsonized)
    };
    let cell = &ctx.state.immune_cells[i];
    let activation_factor = RESTING_CAPTURE + (1.0 - RESTING_CAPTURE) * cell.activation;
    let mut p = cell.kind.capture_efficiency() * activation_factor * (1.0 - evasion);
    if opsonized {
        p += im.opsonization_bonus;
    }

    if ctx.rng.random_bool(clamp01(p)) {
        ctx.state.bacteria[slot].alive = false;
        ctx.events.push(TickEvent::BacteriumKilled {
            bacterium_id,
            cause: DeathCause::Phagocytosis,
        });
        let cell = &mut ctx.state.immune_cells[i];
        cell.kills += 1;
        cell.activation = clamp01(cell.activation + im.activation_gain);
        if cell.kills >= cell.kind.max_kills() {
            cell.alive = false;
        }
    } else {
        let cell = &mut ctx.state.immune_cells[i];
        cell.energy -= im.failure_energy_cost;
        if cell.energy <= 0.0 {
            cell.alive = false;
        }
    }
}

/// Helper T-cells raise the activation of phagocytes around them.
fn help_phagocytes(ctx: &mut TickContext, position: Vec3) {
    let boost = ctx.config.immune.helper_boost * ctx.dt;
    for slot in ctx
        .index
        .query_kind(position, ctx.config.immune.helper_radius, EntityKind::ImmuneCell)
    {
        if let Some(cell) = ctx.state.immune_cells.get_mut(slot)
            && cell.alive
            && cell.kind.is_phagocyte()
        {
            cell.activation = clamp01(cell.activation + boost);
        }
    }
}

fn release_antibodies(ctx: &mut TickContext, position: Vec3, strain: StrainId) {
    let config = ctx.config;
    let im = &config.immune;
    let live = ctx.state.antibodies.iter().filter(|a| a.alive).count();
    let room = im.max_antibodies.saturating_sub(live);
    let count = stochastic_count(im.antibody_rate * ctx.dt, ctx.rng).min(room);
    for _ in 0..count {
        let antibody = Antibody {
            id: ctx.state.id_gen.next_id(),
            position: config
                .world
                .confine(position + Vec3::jitter(ctx.rng, ANTIBODY_RELEASE_SPREAD)),
            target: strain,
            neutralization: im.antibody_neutralization,
            age: 0.0,
            lifetime: im.antibody_lifetime,
            alive: true,
        };
        ctx.state.antibodies.push(antibody);
    }
}

/// Antibodies bind a matching bacterium in range, opsonising it and fixing
/// complement against its envelope. Binding consumes the antibody.
fn bind_antibodies(ctx: &mut TickContext) {
    let config = ctx.config;
    let im = &config.immune;
    let dt = ctx.dt;
    for i in 0..ctx.state.antibodies.len() {
        let (position, target, neutralization) = {
            let a = &mut ctx.state.antibodies[i];
            if !a.alive {
                continue;
            }
            a.age += dt;
            if a.age >= a.lifetime {
                a.alive = false;
                continue;
            }
            (a.position, a.target, a.neutralization)
        };

        if let Some((slot, _)) = nearest_bacterium(
            ctx.index,
            ctx.state,
            position,
            im.antibody_binding_radius,
            Some(target),
        ) {
            ctx.state.antibodies[i].alive = false;
            let b = &mut ctx.state.bacteria[slot];
            b.opsonized = true;
            b.envelope_integrity -= neutralization;
            b.envelope_damage = Some(EnvelopeDamage::Antibody);
            if b.envelope_integrity <= 0.0 {
                b.envelope_integrity = 0.0;
                b.alive = false;
                ctx.events.push(TickEvent::BacteriumKilled {
                    bacterium_id: b.id,
                    cause: DeathCause::Complement,
                });
            }
            continue;
        }

        let step = Vec3::jitter(ctx.rng, ANTIBODY_DIFFUSION * dt.sqrt());
        let a = &mut ctx.state.antibodies[i];
        a.position = config.world.confine(position + step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Locus, Species, SurfaceStructure};
    use crate::testutil::{add_bacteria, place_bacterium, run_system, test_config};

    #[test]
    fn bacteria_raise_cytokines_and_il10_follows() {
        let mut config = test_config();
        config.immune.enabled = false;
        let mut state = SimulationState::new(&config);
        add_bacteria(&mut state, Species::EscherichiaColi, 100, &config, 1);
        for _ in 0..30 {
            run_system(&mut ImmuneSystem, &mut state, &config, 1.0, 2);
        }
        let levels = state.cytokines.mean_levels();
        assert!(levels[CytokineKind::TnfAlpha.index()] > 0.0);
        assert!(levels[CytokineKind::Il10.index()] > 0.0);
        assert!(state.immune_cells.is_empty());
    }

    #[test]
    fn endotoxin_producers_induce_more_cytokine() {
        let mut config = test_config();
        config.immune.enabled = false;
        let total = |species: Species| {
            let mut state = SimulationState::new(&config);
            add_bacteria(&mut state, species, 50, &config, 1);
            run_system(&mut ImmuneSystem, &mut state, &config, 1.0, 1);
            state.cytokines.mean_levels().iter().sum::<f64>()
        };
        assert!(total(Species::EscherichiaColi) > total(Species::StaphylococcusAureus));
    }

    #[test]
    fn strong_signal_recruits_phagocytes_at_hot_spot() {
        let mut config = test_config();
        config.immune.recruitment_rate = 1.0;
        let mut state = SimulationState::new(&config);
        let hot = state.cytokines.cell_of(Vec3::new(20.0, 20.0, 20.0));
        state.cytokines.emit(hot, CytokineKind::TnfAlpha, 50.0);
        let events = run_system(&mut ImmuneSystem, &mut state, &config, 1.0, 3);
        assert!(!state.immune_cells.is_empty());
        assert!(state.immune_cells.iter().all(|c| c.kind.is_phagocyte()));
        assert!(state.immune_cells.iter().all(|c| c.recruited_by == Some(hot)));
        assert!(events
            .iter()
            .any(|e| matches!(e, TickEvent::ImmuneCellRecruited { .. })));
    }

    #[test]
    fn recruitment_respects_cell_cap() {
        let mut config = test_config();
        config.immune.recruitment_rate = 100.0;
        config.immune.max_immune_cells = 5;
        let mut state = SimulationState::new(&config);
        let hot = FieldCell(0);
        state.cytokines.emit(hot, CytokineKind::Il6, 500.0);
        run_system(&mut ImmuneSystem, &mut state, &config, 1.0, 3);
        assert_eq!(state.immune_cells.len(), 5);
    }

    #[test]
    fn neutrophil_in_contact_engulfs_unencapsulated_bacterium() {
        let config = test_config();
        let mut engulfed = 0;
        for seed in 0..40 {
            let mut state = SimulationState::new(&config);
            let slot = place_bacterium(&mut state, Species::EscherichiaColi, Vec3::new(50.0, 50.0, 50.0));
            for s in SurfaceStructure::ALL {
                state.bacteria[slot].genome.set(Locus::Surface(s), 0.0);
            }
            let mut cell = ImmuneCell::new(999, ImmuneCellKind::Neutrophil, Vec3::new(51.0, 50.0, 50.0));
            cell.activation = 1.0;
            state.immune_cells.push(cell);
            run_system(&mut ImmuneSystem, &mut state, &config, 1.0, seed);
            if !state.bacteria[slot].alive {
                engulfed += 1;
                assert_eq!(state.immune_cells[0].kills, 1);
            }
        }
        // Capture probability is 0.55 at full activation.
        assert!((12..=32).contains(&engulfed), "engulfed {engulfed}");
    }

    #[test]
    fn capsule_lowers_capture() {
        let config = test_config();
        let capture_rate = |capsule: f64| {
            let mut engulfed = 0;
            for seed in 0..200 {
                let mut state = SimulationState::new(&config);
                let slot = place_bacterium(&mut state, Species::KlebsiellaPneumoniae, Vec3::new(50.0, 50.0, 50.0));
                state.bacteria[slot].genome.set(Locus::Surface(SurfaceStructure::Capsule), capsule);
                state.bacteria[slot].genome.set(Locus::Surface(SurfaceStructure::Biofilm), 0.0);
                state
                    .immune_cells
                    .push(ImmuneCell::new(999, ImmuneCellKind::Macrophage, Vec3::new(50.5, 50.0, 50.0)));
                run_system(&mut ImmuneSystem, &mut state, &config, 1.0, seed);
                if !state.bacteria[slot].alive {
                    engulfed += 1;
                }
            }
            engulfed
        };
        assert!(capture_rate(1.0) < capture_rate(0.0));
    }

    #[test]
    fn failed_engagements_exhaust_the_cell() {
        let mut config = test_config();
        config.immune.failure_energy_cost = 0.5;
        let mut state = SimulationState::new(&config);
        let slot = place_bacterium(&mut state, Species::KlebsiellaPneumoniae, Vec3::new(50.0, 50.0, 50.0));
        // Near-maximal evasion against a resting cell: failures dominate.
        state.bacteria[slot].genome.set(Locus::Surface(SurfaceStructure::Capsule), 1.0);
        state.bacteria[slot].genome.set(Locus::Surface(SurfaceStructure::Biofilm), 1.0);
        let mut cell = ImmuneCell::new(999, ImmuneCellKind::Macrophage, Vec3::new(50.5, 50.0, 50.0));
        cell.activation = 0.0;
        state.immune_cells.push(cell);
        for seed in 0..20 {
            run_system(&mut ImmuneSystem, &mut state, &config, 1.0, seed);
            if !state.immune_cells[0].alive || !state.bacteria[slot].alive {
                break;
            }
        }
        let cell = &state.immune_cells[0];
        assert!(!cell.alive || cell.kills == 1);
    }

    #[test]
    fn phagocyte_steps_toward_sensed_bacterium() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        place_bacterium(&mut state, Species::default(), Vec3::new(80.0, 50.0, 50.0));
        state
            .immune_cells
            .push(ImmuneCell::new(999, ImmuneCellKind::Neutrophil, Vec3::new(60.0, 50.0, 50.0)));
        run_system(&mut ImmuneSystem, &mut state, &config, 1.0, 1);
        let x = state.immune_cells[0].position.x;
        assert!((x - 72.0).abs() < 1e-9, "x {x}");
    }

    #[test]
    fn adaptive_response_waits_for_delay() {
        let mut config = test_config();
        config.immune.adaptive_delay_steps = 10;
        config.immune.recruitment_threshold = 1e9;
        let mut state = SimulationState::new(&config);
        let slot = place_bacterium(&mut state, Species::default(), Vec3::new(50.0, 50.0, 50.0));
        let strain = state.bacteria[slot].strain;

        for step in 0..10 {
            state.step = step;
            run_system(&mut ImmuneSystem, &mut state, &config, 1.0, step);
            assert!(state.immune_cells.is_empty(), "responded early at step {step}");
        }
        state.step = 10;
        let events = run_system(&mut ImmuneSystem, &mut state, &config, 1.0, 10);
        assert!(events.contains(&TickEvent::AdaptiveResponse { strain }));
        let kinds: Vec<_> = state.immune_cells.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ImmuneCellKind::BCell, ImmuneCellKind::TCell]);
        assert!(state.immune_cells.iter().all(|c| c.specificity == Some(strain)));
        assert!(state.exposures[&strain].responded);
    }

    #[test]
    fn antibody_binds_only_its_strain() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        let target = place_bacterium(&mut state, Species::default(), Vec3::new(50.0, 50.0, 50.0));
        let other = place_bacterium(&mut state, Species::default(), Vec3::new(51.0, 50.0, 50.0));
        state.bacteria[other].strain = StrainId(77);
        let strain = state.bacteria[target].strain;
        state.antibodies.push(Antibody {
            id: 500,
            position: Vec3::new(50.5, 50.0, 50.0),
            target: strain,
            neutralization: 0.25,
            age: 0.0,
            lifetime: 100.0,
            alive: true,
        });
        run_system(&mut ImmuneSystem, &mut state, &config, 1.0, 1);
        assert!(!state.antibodies[0].alive);
        assert!(state.bacteria[target].opsonized);
        assert!((state.bacteria[target].envelope_integrity - 0.75).abs() < 1e-9);
        assert!(!state.bacteria[other].opsonized);
    }

    #[test]
    fn antibodies_expire() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        state.antibodies.push(Antibody {
            id: 500,
            position: Vec3::new(50.0, 50.0, 50.0),
            target: StrainId(1),
            neutralization: 0.25,
            age: 9.5,
            lifetime: 10.0,
            alive: true,
        });
        run_system(&mut ImmuneSystem, &mut state, &config, 1.0, 1);
        assert!(!state.antibodies[0].alive);
    }

    #[test]
    fn disabled_immunity_leaves_cells_untouched() {
        let mut config = test_config();
        config.immune.enabled = false;
        let mut state = SimulationState::new(&config);
        add_bacteria(&mut state, Species::default(), 10, &config, 1);
        state
            .immune_cells
            .push(ImmuneCell::new(999, ImmuneCellKind::Neutrophil, Vec3::new(1.0, 1.0, 1.0)));
        let before = state.immune_cells.clone();
        run_system(&mut ImmuneSystem, &mut state, &config, 1.0, 1);
        assert_eq!(state.immune_cells, before);
        assert!(state.bacteria.iter().all(|b| b.alive));
    }
}
