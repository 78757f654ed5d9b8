use super::context::TickContext;
use super::event::{DeathCause, TickEvent};
use super::helpers::{clamp01, ensure_finite, saturate};
use super::system::{SimPhase, SimSystem};
use crate::config::{DiagnosticsParams, SepsisWeights, SimConfig};
use crate::error::SimError;
use crate::model::{
    CytokineLevels, EnvelopeDamage, ImmuneCellKind, OrganDamage, PatientVitals, SepsisStage, SimulationState,
    SimulationStats, ToxinKind,
};

// --- Constants ---

/// Fever ceiling above 37 °C at saturating cytokine load.
const MAX_FEVER: f64 = 3.0;
const RESTING_RESPIRATORY_RATE: f64 = 14.0;
const RESTING_TEMPERATURE: f64 = 37.0;
const RESTING_WHITE_CELLS: f64 = 7.0;
/// White cell count added per recruited leukocyte (10^9/L).
const WHITE_CELLS_PER_RECRUIT: f64 = 0.1;
const RESTING_LACTATE: f64 = 1.0;
/// Lactate rise at full tissue hypoxia (mmol/L).
const HYPOXIC_LACTATE: f64 = 8.0;

// SIRS and shock thresholds.
const SIRS_FEVER: f64 = 38.0;
const SIRS_HYPOTHERMIA: f64 = 36.0;
const SIRS_HEART_RATE: f64 = 90.0;
const SIRS_RESPIRATORY_RATE: f64 = 20.0;
const SIRS_LEUKOCYTOSIS: f64 = 12.0;
const SIRS_LEUKOPENIA: f64 = 4.0;
const SHOCK_MAP: f64 = 65.0;
const ELEVATED_LACTATE: f64 = 2.0;
/// Worst-organ damage regarded as organ dysfunction.
const ORGAN_DYSFUNCTION: f64 = 0.2;

/// Derives vitals, organ damage, the sepsis score and stage, and folds the
/// step's events into cumulative statistics.
pub struct DiagnosticsSystem;

impl SimSystem for DiagnosticsSystem {
    fn name(&self) -> &'static str {
        "diagnostics"
    }

    fn phase(&self) -> SimPhase {
        SimPhase::Assessment
    }

    fn tick(&mut self, ctx: &mut TickContext) -> Result<(), SimError> {
        fold_events(&mut ctx.state.stats, ctx.events.as_slice());
        accumulate_organ_damage(ctx.state, ctx.config, ctx.dt);
        update_vitals(ctx.state, ctx.config);
        ensure_finite(self.name(), "sepsis_score", ctx.state.vitals.sepsis_score)?;

        let live = ctx.state.live_bacteria();
        let stats = &mut ctx.state.stats;
        stats.peak_bacteria = stats.peak_bacteria.max(live);
        Ok(())
    }
}

/// Add the step's events to the running counters.
pub fn fold_events(stats: &mut SimulationStats, events: &[TickEvent]) {
    for event in events {
        match event {
            TickEvent::BacteriumKilled { cause, .. } => match cause {
                DeathCause::Phagocytosis => stats.killed_by_immune += 1,
                DeathCause::Antibiotic(_) => stats.killed_by_antibiotic += 1,
                DeathCause::PhageLysis => stats.killed_by_phage += 1,
                DeathCause::Complement => stats.killed_by_antibody += 1,
                DeathCause::Starvation => stats.starved += 1,
                DeathCause::EnvelopeFailure(EnvelopeDamage::Antibiotic(_)) => {
                    stats.killed_by_antibiotic += 1
                }
                DeathCause::EnvelopeFailure(EnvelopeDamage::Antibody) => stats.killed_by_antibody += 1,
            },
            TickEvent::BacteriumBorn { .. } => stats.births += 1,
            TickEvent::StrainEmerged { .. } => stats.strains_emerged += 1,
            TickEvent::ResistanceTransferred { .. } => stats.resistance_transfers += 1,
            TickEvent::DoseAdministered { .. } => stats.doses_given += 1,
            TickEvent::PhagesReleased { count, .. } => stats.phages_released += u64::from(*count),
            TickEvent::PhageDosed { .. }
            | TickEvent::ImmuneCellRecruited { .. }
            | TickEvent::AdaptiveResponse { .. } => {}
        }
    }
}

/// Weighted sepsis score. Each component is normalised by `x / (x + scale)`,
/// so the score is non-decreasing in every input.
pub fn sepsis_score(
    weights: &SepsisWeights,
    params: &DiagnosticsParams,
    tissue_hypoxia: f64,
    cytokine_total: f64,
    organ_damage: f64,
    bacterial_load: usize,
) -> f64 {
    weights.hypoxia * saturate(tissue_hypoxia, params.hypoxia_scale)
        + weights.cytokines * saturate(cytokine_total, params.cytokine_scale)
        + weights.organ_damage * clamp01(organ_damage)
        + weights.bacterial_load * saturate(bacterial_load as f64, params.load_scale)
}

/// Organ injury from hypoxia, drug toxicity and circulating exotoxins.
/// Damage only ever accumulates.
fn accumulate_organ_damage(state: &mut SimulationState, config: &SimConfig, dt: f64) {
    let d = &config.diagnostics;
    let hypoxia = state.cardiovascular.tissue_hypoxia * d.hypoxia_damage_rate * dt;
    let exotoxin: f64 = state
        .bacteria
        .iter()
        .filter(|b| b.alive)
        .map(|b| b.genome.toxin_level(ToxinKind::Exotoxin))
        .sum::<f64>()
        * d.exotoxin_damage_rate
        * dt;
    let renal = hypoxia + state.toxicity.nephro * d.toxicity_damage_rate * dt;
    let hepatic = hypoxia + state.toxicity.hepato * d.toxicity_damage_rate * dt;
    state
        .vitals
        .organ_damage
        .accumulate(renal, hepatic, hypoxia + exotoxin, hypoxia + exotoxin);
}

fn update_vitals(state: &mut SimulationState, config: &SimConfig) {
    let d = &config.diagnostics;
    let cytokines = CytokineLevels::from_array(state.cytokines.mean_levels());
    let cv = &state.cardiovascular;
    let pro = saturate(cytokines.pro_inflammatory(), d.cytokine_scale);
    let recruited = state
        .immune_cells
        .iter()
        .filter(|c| c.alive && c.recruited_by.is_some())
        .count();
    let live = state.live_bacteria();

    let v = &mut state.vitals;
    v.heart_rate = cv.heart_rate;
    v.mean_arterial_pressure = cv.mean_arterial_pressure;
    v.temperature = RESTING_TEMPERATURE + MAX_FEVER * pro;
    v.respiratory_rate = RESTING_RESPIRATORY_RATE + 10.0 * pro + 12.0 * cv.tissue_hypoxia;
    v.lactate = RESTING_LACTATE + HYPOXIC_LACTATE * cv.tissue_hypoxia;
    v.white_cell_count = RESTING_WHITE_CELLS + WHITE_CELLS_PER_RECRUIT * recruited as f64;
    v.cytokines = cytokines;
    v.sepsis_score = sepsis_score(
        &config.sepsis_weights,
        d,
        cv.tissue_hypoxia,
        cytokines.total(),
        v.organ_damage.mean(),
        live,
    );
    v.stage = classify(v, live, d);
}

/// Count of SIRS criteria met (temperature, heart rate, respiration, white cells).
pub fn sirs_criteria(v: &PatientVitals) -> u32 {
    let fever = v.temperature > SIRS_FEVER || v.temperature < SIRS_HYPOTHERMIA;
    let tachycardia = v.heart_rate > SIRS_HEART_RATE;
    let tachypnoea = v.respiratory_rate > SIRS_RESPIRATORY_RATE;
    let leukocytes = v.white_cell_count > SIRS_LEUKOCYTOSIS || v.white_cell_count < SIRS_LEUKOPENIA;
    [fever, tachycardia, tachypnoea, leukocytes]
        .into_iter()
        .map(u32::from)
        .sum()
}

pub fn classify(v: &PatientVitals, bacterial_load: usize, params: &DiagnosticsParams) -> SepsisStage {
    let sirs = sirs_criteria(v) >= 2;
    let infected = bacterial_load >= params.bacteremia_threshold;
    match (sirs, infected) {
        (true, true) => {
            if v.mean_arterial_pressure < SHOCK_MAP && v.lactate > ELEVATED_LACTATE {
                SepsisStage::SepticShock
            } else if v.organ_damage.worst() > ORGAN_DYSFUNCTION || v.lactate > ELEVATED_LACTATE {
                SepsisStage::SevereSepsis
            } else {
                SepsisStage::Sepsis
            }
        }
        (true, false) => SepsisStage::Sirs,
        _ => SepsisStage::None,
    }
}

/// Live immune cells by lineage, in `ImmuneCellKind` declaration order.
pub fn immune_census(state: &SimulationState) -> [(ImmuneCellKind, usize); 4] {
    [
        ImmuneCellKind::Neutrophil,
        ImmuneCellKind::Macrophage,
        ImmuneCellKind::TCell,
        ImmuneCellKind::BCell,
    ]
    .map(|kind| {
        let n = state
            .immune_cells
            .iter()
            .filter(|c| c.alive && c.kind == kind)
            .count();
        (kind, n)
    })
}

/// Whether `after` is no better than `before` for every organ.
pub fn damage_ratchets(before: &OrganDamage, after: &OrganDamage) -> bool {
    after.renal >= before.renal
        && after.hepatic >= before.hepatic
        && after.cardiac >= before.cardiac
        && after.pulmonary >= before.pulmonary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Antibiotic, Species};
    use crate::testutil::{add_bacteria, run_system, test_config};

    #[test]
    fn score_is_zero_for_healthy_patient() {
        let config = test_config();
        let s = sepsis_score(&config.sepsis_weights, &config.diagnostics, 0.0, 0.0, 0.0, 0);
        assert_eq!(s, 0.0);
    }

    #[test]
    fn score_is_monotone_in_each_input() {
        let config = test_config();
        let (w, d) = (&config.sepsis_weights, &config.diagnostics);
        let mut prev_hypoxia = 0.0;
        let mut prev_cytokine = 0.0;
        for i in 0..100 {
            let x = i as f64 * 0.01;
            let by_hypoxia = sepsis_score(w, d, x, 5.0, 0.1, 20);
            let by_cytokine = sepsis_score(w, d, 0.1, x * 100.0, 0.1, 20);
            assert!(by_hypoxia >= prev_hypoxia);
            assert!(by_cytokine >= prev_cytokine);
            prev_hypoxia = by_hypoxia;
            prev_cytokine = by_cytokine;
        }
        let total = w.hypoxia + w.cytokines + w.organ_damage + w.bacterial_load;
        assert!(sepsis_score(w, d, 1.0, 1e6, 1.0, 1_000_000) < total);
    }

    #[test]
    fn events_fold_into_counters() {
        let mut stats = SimulationStats::default();
        let events = vec![
            TickEvent::BacteriumKilled {
                bacterium_id: 1,
                cause: DeathCause::Phagocytosis,
            },
            TickEvent::BacteriumKilled {
                bacterium_id: 2,
                cause: DeathCause::Antibiotic(Antibiotic::Meropenem),
            },
            TickEvent::BacteriumBorn {
                parent_id: 3,
                child_id: 4,
            },
            TickEvent::PhagesReleased { host_id: 5, count: 30 },
            TickEvent::BacteriumKilled {
                bacterium_id: 6,
                cause: DeathCause::EnvelopeFailure(EnvelopeDamage::Antibody),
            },
            TickEvent::BacteriumKilled {
                bacterium_id: 7,
                cause: DeathCause::EnvelopeFailure(EnvelopeDamage::Antibiotic(Antibiotic::Ceftriaxone)),
            },
            TickEvent::DoseAdministered {
                antibiotic: Antibiotic::Meropenem,
                concentration: 40.0,
            },
        ];
        fold_events(&mut stats, &events);
        fold_events(&mut stats, &events[..1]);
        assert_eq!(stats.killed_by_immune, 2);
        assert_eq!(stats.killed_by_antibiotic, 2);
        assert_eq!(stats.killed_by_antibody, 1);
        assert_eq!(stats.births, 1);
        assert_eq!(stats.phages_released, 30);
        assert_eq!(stats.doses_given, 1);
    }

    #[test]
    fn organ_damage_only_accumulates() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        add_bacteria(&mut state, Species::StaphylococcusAureus, 300, &config, 1);
        state.cardiovascular.tissue_hypoxia = 0.5;
        state.toxicity.nephro = 0.4;
        let mut before = state.vitals.organ_damage;
        for step in 0..50 {
            if step == 25 {
                // Recovery must not undo damage already done.
                state.cardiovascular.tissue_hypoxia = 0.0;
                state.toxicity.nephro = 0.0;
                state.bacteria.clear();
            }
            run_system(&mut DiagnosticsSystem, &mut state, &config, 1.0, step);
            let after = state.vitals.organ_damage;
            assert!(damage_ratchets(&before, &after));
            before = after;
        }
        assert!(before.renal > before.hepatic);
        assert!(before.cardiac > 0.0);
    }

    #[test]
    fn sterile_patient_is_not_septic() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        run_system(&mut DiagnosticsSystem, &mut state, &config, 1.0, 1);
        assert_eq!(state.vitals.stage, SepsisStage::None);
        assert_eq!(state.vitals.sepsis_score, 0.0);
        assert_eq!(state.vitals.temperature, 37.0);
    }

    #[test]
    fn staging_escalates_with_shock_physiology() {
        let params = DiagnosticsParams::default();
        let mut v = PatientVitals {
            temperature: 39.0,
            heart_rate: 120.0,
            ..PatientVitals::default()
        };
        assert_eq!(classify(&v, 0, &params), SepsisStage::Sirs);
        assert_eq!(classify(&v, 100, &params), SepsisStage::Sepsis);
        v.lactate = 3.0;
        assert_eq!(classify(&v, 100, &params), SepsisStage::SevereSepsis);
        v.mean_arterial_pressure = 55.0;
        assert_eq!(classify(&v, 100, &params), SepsisStage::SepticShock);
    }

    #[test]
    fn census_counts_living_cells_by_kind() {
        use crate::model::{ImmuneCell, Vec3};
        let config = test_config();
        let mut state = SimulationState::new(&config);
        state.immune_cells.push(ImmuneCell::new(1, ImmuneCellKind::Neutrophil, Vec3::ZERO));
        state.immune_cells.push(ImmuneCell::new(2, ImmuneCellKind::Neutrophil, Vec3::ZERO));
        let mut dead = ImmuneCell::new(3, ImmuneCellKind::BCell, Vec3::ZERO);
        dead.alive = false;
        state.immune_cells.push(dead);
        let census = immune_census(&state);
        assert_eq!(census[0], (ImmuneCellKind::Neutrophil, 2));
        assert_eq!(census[3], (ImmuneCellKind::BCell, 0));
    }
}
