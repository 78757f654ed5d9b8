use rand::Rng;

use super::context::TickContext;
use super::event::{DeathCause, TickEvent};
use super::helpers::clamp01;
use super::system::{SimPhase, SimSystem};
use crate::config::SimConfig;
use crate::error::SimError;
use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{
    EntityKind, Phage, PhageInfection, SimulationState, Species, StrainId, SurfaceStructure, Vec3,
};

// --- Constants ---

/// Fraction of adsorption a full capsule blocks.
const CAPSULE_BLOCKING: f64 = 0.5;
/// Scatter of progeny around a lysed host.
const BURST_SPREAD: f64 = 1.5;

/// Lytic bacteriophage therapy: dosing, biased diffusion, adsorption,
/// latency and burst release.
pub struct PhageSystem;

impl SimSystem for PhageSystem {
    fn name(&self) -> &'static str {
        "phage"
    }

    fn phase(&self) -> SimPhase {
        SimPhase::Interaction
    }

    fn tick(&mut self, ctx: &mut TickContext) -> Result<(), SimError> {
        if ctx.config.therapy_mode.uses_phage() {
            dose_if_due(ctx);
        }
        lyse_infected(ctx);
        move_and_attach(ctx);
        Ok(())
    }
}

/// Species targeted by injected phage: configured, or the seeded species.
pub fn therapeutic_host(config: &SimConfig) -> Species {
    config.phage.host.unwrap_or(config.species)
}

/// Most abundant living strain of `species`, lowest id on ties. A dose is
/// matched to it, so strains that drift away later escape that dose.
pub fn dominant_strain(state: &SimulationState, species: Species) -> Option<StrainId> {
    let mut counts: BTreeMap<StrainId, usize> = BTreeMap::new();
    for b in state.bacteria.iter().filter(|b| b.alive && b.species == species) {
        *counts.entry(b.strain).or_default() += 1;
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(StrainId, usize)>, (strain, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((strain, n)),
        })
        .map(|(strain, _)| strain)
}

fn spawn_phage(state: &mut SimulationState, config: &SimConfig, position: Vec3, host: StrainId) -> bool {
    let live = state.phages.iter().filter(|p| p.alive).count();
    if live >= config.phage.max_phages {
        return false;
    }
    let phage = Phage {
        id: state.id_gen.next_id(),
        position,
        host,
        burst_size: config.phage.burst_size,
        latency: config.phage.latency,
        age: 0.0,
        lifetime: config.phage.lifetime,
        alive: true,
    };
    state.phages.push(phage);
    true
}

fn dose_if_due(ctx: &mut TickContext) {
    let config = ctx.config;
    let due = match ctx.state.since_phage_dose {
        None => true,
        Some(elapsed) => config.phage.redose_interval.is_some_and(|i| elapsed >= i),
    };
    if due {
        let species = therapeutic_host(config);
        let mut count = 0;
        match dominant_strain(ctx.state, species) {
            Some(host) => {
                for _ in 0..config.phage.dose {
                    let position = config.world.random_point(ctx.rng);
                    if !spawn_phage(ctx.state, config, position, host) {
                        break;
                    }
                    count += 1;
                }
            }
            None => debug!(species = species.name(), "phage dose skipped: no host strain circulating"),
        }
        ctx.state.since_phage_dose = Some(match (ctx.state.since_phage_dose, config.phage.redose_interval) {
            (Some(elapsed), Some(interval)) => (elapsed - interval).max(0.0),
            _ => 0.0,
        });
        ctx.events.push(TickEvent::PhageDosed { count });
    }
    if let Some(elapsed) = ctx.state.since_phage_dose.as_mut() {
        *elapsed += ctx.dt;
    }
}

/// Count down infected hosts; at zero the host lyses and releases its burst.
fn lyse_infected(ctx: &mut TickContext) {
    let config = ctx.config;
    let dt = ctx.dt;
    for i in 0..ctx.state.bacteria.len() {
        let b = &mut ctx.state.bacteria[i];
        if !b.alive {
            continue;
        }
        let Some(infection) = b.infection.as_mut() else {
            continue;
        };
        infection.latency_remaining -= dt;
        if infection.latency_remaining > 0.0 {
            continue;
        }
        let PhageInfection { burst_size, host, .. } = *infection;
        let (host_id, site) = (b.id, b.position);
        b.alive = false;
        b.infection = None;
        ctx.events.push(TickEvent::BacteriumKilled {
            bacterium_id: host_id,
            cause: DeathCause::PhageLysis,
        });

        let mut released = 0;
        for _ in 0..burst_size {
            let position = config.world.confine(site + Vec3::jitter(ctx.rng, BURST_SPREAD));
            if !spawn_phage(ctx.state, config, position, host) {
                break;
            }
            released += 1;
        }
        ctx.events.push(TickEvent::PhagesReleased {
            host_id,
            count: released,
        });
    }
}

/// Free phages age, try to adsorb onto a susceptible host in range, and
/// otherwise random-walk with a pull toward nearby hosts.
fn move_and_attach(ctx: &mut TickContext) {
    let config = ctx.config;
    let pg = &config.phage;
    let dt = ctx.dt;
    for i in 0..ctx.state.phages.len() {
        let (position, host, burst_size, latency) = {
            let p = &mut ctx.state.phages[i];
            if !p.alive {
                continue;
            }
            p.age += dt;
            if p.age >= p.lifetime {
                p.alive = false;
                continue;
            }
            (p.position, p.host, p.burst_size, p.latency)
        };

        let state = &*ctx.state;
        let candidate = ctx.index.nearest(position, pg.attach_radius, |key| {
            key.kind == EntityKind::Bacterium
                && state
                    .bacteria
                    .get(key.slot)
                    .is_some_and(|b| b.alive && b.strain == host && b.infection.is_none())
        });
        if let Some((key, _)) = candidate {
            let capsule = ctx.state.bacteria[key.slot].genome.surface(SurfaceStructure::Capsule);
            let adsorption = clamp01(pg.adsorption * (1.0 - CAPSULE_BLOCKING * capsule));
            if ctx.rng.random_bool(adsorption) {
                ctx.state.bacteria[key.slot].infection = Some(PhageInfection {
                    latency_remaining: latency,
                    burst_size,
                    host,
                });
                ctx.state.phages[i].alive = false;
                continue;
            }
        }

        let mut sum = Vec3::ZERO;
        let mut hosts = 0usize;
        let state = &*ctx.state;
        ctx.index.for_each_within(position, pg.sensing_radius, |key, at| {
            if key.kind == EntityKind::Bacterium
                && state
                    .bacteria
                    .get(key.slot)
                    .is_some_and(|b| b.alive && b.strain == host)
            {
                sum += at;
                hosts += 1;
            }
        });
        let random = Vec3::random_direction(ctx.rng, 1.0);
        let pull = if hosts > 0 {
            (sum * (1.0 / hosts as f64) - position).normalized()
        } else {
            Vec3::ZERO
        };
        let bias = clamp01(pg.density_bias);
        let heading = (random * (1.0 - bias) + pull * bias).normalized();
        let step = heading * (pg.diffusion_step * dt);
        ctx.state.phages[i].position = config.world.confine(position + step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TherapyMode;
    use crate::testutil::{add_bacteria, new_strain, place_bacterium, run_system, test_config};

    fn phage_config() -> SimConfig {
        let mut config = test_config();
        config.therapy_mode = TherapyMode::Phage;
        config.species = Species::EscherichiaColi;
        config
    }

    #[test]
    fn first_step_injects_one_dose() {
        let config = phage_config();
        let mut state = SimulationState::new(&config);
        let strain = add_bacteria(&mut state, Species::EscherichiaColi, 5, &config, 3);
        let events = run_system(&mut PhageSystem, &mut state, &config, 1.0, 1);
        assert_eq!(state.phages.len(), config.phage.dose as usize);
        assert!(events.contains(&TickEvent::PhageDosed {
            count: config.phage.dose
        }));
        assert!(state.phages.iter().all(|p| p.host == strain));

        run_system(&mut PhageSystem, &mut state, &config, 1.0, 2);
        assert_eq!(state.phages.len(), config.phage.dose as usize);
    }

    #[test]
    fn redose_interval_repeats_injection() {
        let mut config = phage_config();
        config.phage.redose_interval = Some(5.0);
        config.phage.dose = 3;
        let mut state = SimulationState::new(&config);
        place_bacterium(&mut state, Species::EscherichiaColi, Vec3::new(1.0, 1.0, 1.0));
        let mut doses = 0;
        for seed in 0..12 {
            let events = run_system(&mut PhageSystem, &mut state, &config, 1.0, seed);
            doses += events
                .iter()
                .filter(|e| matches!(e, TickEvent::PhageDosed { .. }))
                .count();
        }
        // t = 0, 5, 10
        assert_eq!(doses, 3);
    }

    #[test]
    fn dose_targets_the_most_abundant_strain() {
        let config = phage_config();
        let mut state = SimulationState::new(&config);
        add_bacteria(&mut state, Species::EscherichiaColi, 2, &config, 1);
        let major = add_bacteria(&mut state, Species::EscherichiaColi, 6, &config, 2);
        add_bacteria(&mut state, Species::StaphylococcusAureus, 20, &config, 3);
        assert_eq!(dominant_strain(&state, Species::EscherichiaColi), Some(major));

        run_system(&mut PhageSystem, &mut state, &config, 1.0, 1);
        assert!(state.phages.iter().all(|p| p.host == major));
    }

    #[test]
    fn no_circulating_host_means_no_phage() {
        let config = phage_config();
        let mut state = SimulationState::new(&config);
        let events = run_system(&mut PhageSystem, &mut state, &config, 1.0, 1);
        assert!(state.phages.is_empty());
        assert!(events.contains(&TickEvent::PhageDosed { count: 0 }));
    }

    #[test]
    fn supportive_mode_injects_nothing() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        run_system(&mut PhageSystem, &mut state, &config, 1.0, 1);
        assert!(state.phages.is_empty());
    }

    #[test]
    fn infected_host_lyses_after_latency_and_bursts() {
        let mut config = test_config();
        config.phage.latency = 3.0;
        config.phage.burst_size = 10;
        let mut state = SimulationState::new(&config);
        let slot = place_bacterium(&mut state, Species::EscherichiaColi, Vec3::new(50.0, 50.0, 50.0));
        let strain = state.bacteria[slot].strain;
        state.bacteria[slot].infection = Some(PhageInfection {
            latency_remaining: 3.0,
            burst_size: 10,
            host: strain,
        });
        for seed in 0..2 {
            run_system(&mut PhageSystem, &mut state, &config, 1.0, seed);
            assert!(state.bacteria[slot].alive);
        }
        let events = run_system(&mut PhageSystem, &mut state, &config, 1.0, 9);
        assert!(!state.bacteria[slot].alive);
        assert!(events.contains(&TickEvent::PhagesReleased {
            host_id: state.bacteria[slot].id,
            count: 10
        }));
        assert_eq!(state.phages.len(), 10);
        assert!(state.phages.iter().all(|p| p.host == strain));
    }

    #[test]
    fn phage_ignores_other_strains() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        let target = new_strain(&mut state, Species::EscherichiaColi);
        let other_species =
            place_bacterium(&mut state, Species::StaphylococcusAureus, Vec3::new(50.0, 50.0, 50.0));
        // Same species, drifted to a strain of its own.
        let drifted = place_bacterium(&mut state, Species::EscherichiaColi, Vec3::new(50.0, 50.5, 50.0));
        assert_ne!(state.bacteria[drifted].strain, target);
        state.phages.push(Phage {
            id: 900,
            position: Vec3::new(50.5, 50.0, 50.0),
            host: target,
            burst_size: 10,
            latency: 5.0,
            age: 0.0,
            lifetime: 100.0,
            alive: true,
        });
        for seed in 0..10 {
            run_system(&mut PhageSystem, &mut state, &config, 1.0, seed);
        }
        assert!(state.bacteria[other_species].infection.is_none());
        assert!(state.bacteria[drifted].infection.is_none());
        assert!(state.phages[0].alive);
    }

    #[test]
    fn phage_adsorbs_onto_matching_host() {
        let config = test_config();
        let mut infected = 0;
        for seed in 0..50 {
            let mut state = SimulationState::new(&config);
            let slot = place_bacterium(&mut state, Species::EscherichiaColi, Vec3::new(50.0, 50.0, 50.0));
            state.phages.push(Phage {
                id: 900,
                position: Vec3::new(51.0, 50.0, 50.0),
                host: state.bacteria[slot].strain,
                burst_size: 10,
                latency: 5.0,
                age: 0.0,
                lifetime: 100.0,
                alive: true,
            });
            run_system(&mut PhageSystem, &mut state, &config, 1.0, seed);
            if state.bacteria[slot].infection.is_some() {
                infected += 1;
                assert!(!state.phages[0].alive);
            }
        }
        assert!(infected > 15, "infected {infected}");
    }

    #[test]
    fn free_phage_decays_after_lifetime() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        state.phages.push(Phage {
            id: 900,
            position: Vec3::new(10.0, 10.0, 10.0),
            host: StrainId(1),
            burst_size: 10,
            latency: 5.0,
            age: 9.5,
            lifetime: 10.0,
            alive: true,
        });
        run_system(&mut PhageSystem, &mut state, &config, 1.0, 1);
        assert!(!state.phages[0].alive);
    }
}
