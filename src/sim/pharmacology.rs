use rand::Rng;

use super::context::TickContext;
use super::event::{DeathCause, TickEvent};
use super::helpers::{clamp01, ensure_finite, half_life_factor, hill, rate_to_probability, relax};
use super::system::{SimPhase, SimSystem};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::model::{
    ActiveDrug, Antibiotic, Bacterium, DosingRegimen, EnvelopeDamage, SimulationState,
    SurfaceStructure,
};

/// Antibiotic PK (dosing, half-life elimination), PD (Hill-curve killing)
/// and organ toxicity.
pub struct PharmacologySystem;

impl SimSystem for PharmacologySystem {
    fn name(&self) -> &'static str {
        "pharmacology"
    }

    fn phase(&self) -> SimPhase {
        SimPhase::Interaction
    }

    fn tick(&mut self, ctx: &mut TickContext) -> Result<(), SimError> {
        let dt = ctx.dt;
        for drug in &mut ctx.state.drugs {
            if let Some(concentration) = administer_if_due(drug) {
                ctx.events.push(TickEvent::DoseAdministered {
                    antibiotic: drug.antibiotic,
                    concentration,
                });
            }
        }

        let drugs = ctx.state.drugs.clone();
        kill_bacteria(&mut ctx.state.bacteria, &drugs, ctx.config, ctx.rng, ctx.events, dt);
        accumulate_toxicity(ctx.state, ctx.config, dt);

        for drug in &mut ctx.state.drugs {
            eliminate(drug, dt);
            ensure_finite(self.name(), "plasma_concentration", drug.concentration)?;
        }
        ensure_finite(self.name(), "nephrotoxicity", ctx.state.toxicity.nephro)?;
        ensure_finite(self.name(), "hepatotoxicity", ctx.state.toxicity.hepato)?;
        Ok(())
    }
}

/// Give the next dose if the regimen calls for one at the start of this step.
/// Returns the concentration reached.
pub fn administer_if_due(drug: &mut ActiveDrug) -> Option<f64> {
    let due = match (drug.doses_given, drug.regimen.interval) {
        (0, _) => true,
        (_, Some(interval)) => drug.since_last_dose >= interval,
        (_, None) => false,
    };
    if !due {
        return None;
    }
    if drug.doses_given > 0 {
        if let Some(interval) = drug.regimen.interval {
            // Keep the schedule phase-locked when a step overshoots the interval.
            drug.since_last_dose = (drug.since_last_dose - interval).max(0.0);
        }
    } else {
        drug.since_last_dose = 0.0;
    }
    drug.concentration += drug.regimen.dose.max(0.0);
    drug.doses_given += 1;
    Some(drug.concentration)
}

/// First-order elimination over `dt`: `c *= 2^(-dt / half_life)`.
pub fn eliminate(drug: &mut ActiveDrug, dt: f64) {
    let half_life = drug.antibiotic.profile().half_life;
    drug.concentration *= half_life_factor(half_life, dt);
    drug.since_last_dose += dt;
}

/// Fractional effect (0-1) of `drug` on bacterium `b` at plasma concentration
/// `concentration`: tissue penetration and biofilm shielding set the local
/// concentration, the Hill curve maps it to effect, and class resistance
/// scales it down. Zero outside the drug's gram spectrum.
pub fn effect_on(drug: Antibiotic, concentration: f64, b: &Bacterium, config: &SimConfig) -> f64 {
    let profile = drug.profile();
    if !profile.class.covers(b.species.profile().gram) {
        return 0.0;
    }
    let shielding = config.pharmacology.biofilm_shielding * b.genome.surface(SurfaceStructure::Biofilm);
    let local = concentration * profile.tissue_penetration * (1.0 - shielding);
    let susceptibility = 1.0 - b.genome.resistance(profile.class);
    clamp01(hill(local, profile.ec50, profile.hill_n) * susceptibility)
}

fn kill_bacteria(
    bacteria: &mut [Bacterium],
    drugs: &[ActiveDrug],
    config: &SimConfig,
    rng: &mut dyn rand::RngCore,
    events: &mut Vec<TickEvent>,
    dt: f64,
) {
    if drugs.iter().all(|d| d.concentration <= 0.0) {
        return;
    }
    for b in bacteria.iter_mut().filter(|b| b.alive) {
        for drug in drugs {
            let effect = effect_on(drug.antibiotic, drug.concentration, b, config);
            if effect <= 0.0 {
                continue;
            }
            let profile = drug.antibiotic.profile();
            if rng.random_bool(rate_to_probability(profile.max_kill_rate * effect, dt)) {
                b.alive = false;
                events.push(TickEvent::BacteriumKilled {
                    bacterium_id: b.id,
                    cause: DeathCause::Antibiotic(drug.antibiotic),
                });
                break;
            }
            if profile.class.targets_envelope() {
                b.envelope_integrity -= config.pharmacology.envelope_damage * effect * dt;
                b.envelope_damage = Some(EnvelopeDamage::Antibiotic(drug.antibiotic));
                if b.envelope_integrity <= 0.0 {
                    b.envelope_integrity = 0.0;
                    b.alive = false;
                    events.push(TickEvent::BacteriumKilled {
                        bacterium_id: b.id,
                        cause: DeathCause::EnvelopeFailure(EnvelopeDamage::Antibiotic(drug.antibiotic)),
                    });
                    break;
                }
            }
        }
    }
}

/// Saturating exposure-driven toxicity: each organ relaxes toward full
/// injury at a rate proportional to `c / (c + saturation * ec50)`.
fn accumulate_toxicity(state: &mut SimulationState, config: &SimConfig, dt: f64) {
    let saturation = config.pharmacology.toxicity_saturation;
    for drug in &state.drugs {
        let profile = drug.antibiotic.profile();
        let c = drug.concentration.max(0.0);
        let exposure = c / (c + saturation * profile.ec50);
        let tox = &mut state.toxicity;
        tox.nephro = clamp01(relax(tox.nephro, 1.0, profile.nephrotoxicity * exposure, dt));
        tox.hepato = clamp01(relax(tox.hepato, 1.0, profile.hepatotoxicity * exposure, dt));
    }
}

/// Bring the active drug list in line with the configuration. Newly
/// prescribed drugs start on their standard regimen; drugs no longer
/// prescribed stop being redosed and wash out.
pub fn reconcile_prescriptions(state: &mut SimulationState, config: &SimConfig) {
    let prescribed: &[Antibiotic] = if config.therapy_mode.uses_antibiotics() {
        &config.antibiotics
    } else {
        &[]
    };
    for drug in &mut state.drugs {
        if !prescribed.contains(&drug.antibiotic) {
            drug.regimen.interval = None;
        } else if drug.regimen.interval.is_none() {
            drug.regimen.interval = DosingRegimen::standard(drug.antibiotic).interval;
        }
    }
    for &antibiotic in prescribed {
        if !state.drugs.iter().any(|d| d.antibiotic == antibiotic) {
            state
                .drugs
                .push(ActiveDrug::prescribed(antibiotic, DosingRegimen::standard(antibiotic)));
        }
    }
}
