use rand::Rng;

use super::context::TickContext;
use super::helpers::{clamp01, ensure_finite, rate_to_probability, relax, safe_div, saturate, sigmoid};
use super::system::{SimPhase, SimSystem};
use crate::config::{PhysiologyParams, SimConfig};
use crate::error::SimError;
use crate::model::{
    BloodRheology, CardiovascularState, Clot, CytokineKind, SimulationState, ToxinKind, Vec3,
};

// --- Constants ---

/// Share of preload lost to venous pooling at full vasodilation.
const VENOUS_POOLING: f64 = 0.4;
/// Contractility lost at maximal severity (septic cardiomyopathy).
const MYOCARDIAL_DEPRESSION: f64 = 0.35;
/// Share of diastolic filling lost at maximal heart rate.
const TACHYCARDIA_FILLING_LOSS: f64 = 0.3;
/// Weight of afterload in the stroke volume denominator.
const AFTERLOAD_SENSITIVITY: f64 = 0.5;
/// MAP below which the baroreflex drives heart rate.
const BAROREFLEX_SETPOINT: f64 = 70.0;
/// Pressure deficit (mmHg) that saturates the baroreflex.
const BAROREFLEX_SPAN: f64 = 30.0;
/// Extra oxygen demand at maximal severity (hypermetabolism).
const HYPERMETABOLISM: f64 = 0.5;
/// Flow lost per unit clot load.
const CLOT_FLOW_LOSS: f64 = 0.5;
const MIN_RELATIVE_FLOW: f64 = 0.05;
const MAX_RELATIVE_FLOW: f64 = 3.0;
const MIN_STROKE_VOLUME: f64 = 10.0;
/// Oxygen carried per gram of haemoglobin (mL).
const HUFNER: f64 = 1.34;
/// Dissolved oxygen per mmHg (mL/dL).
const DISSOLVED_O2: f64 = 0.003;
/// Summed clot size at which clot load is one half.
const CLOT_LOAD_HALF: f64 = 20.0;

/// Integrates haemodynamics, blood rheology, passive transport and coagulation.
pub struct PhysiologySystem;

impl SimSystem for PhysiologySystem {
    fn name(&self) -> &'static str {
        "physiology"
    }

    fn phase(&self) -> SimPhase {
        SimPhase::Circulation
    }

    fn tick(&mut self, ctx: &mut TickContext) -> Result<(), SimError> {
        let params = &ctx.config.physiology;
        let severity = infection_severity(ctx.state, params);

        update_rheology(ctx.state, ctx.config, ctx.dt);
        let rheology = ctx.state.rheology.clone();
        update_cardiovascular(&mut ctx.state.cardiovascular, &rheology, severity, params, ctx.dt);
        ctx.state.rheology.flow_rate = relative_flow(&ctx.state.cardiovascular, &rheology, params);

        let cv = &ctx.state.cardiovascular;
        ensure_finite(self.name(), "cardiac_output", cv.cardiac_output)?;
        ensure_finite(self.name(), "mean_arterial_pressure", cv.mean_arterial_pressure)?;
        ensure_finite(self.name(), "oxygen_delivery", cv.oxygen_delivery)?;
        ensure_finite(self.name(), "tissue_hypoxia", cv.tissue_hypoxia)?;
        ensure_finite(self.name(), "viscosity", ctx.state.rheology.viscosity)?;

        transport(ctx.state, ctx.config, ctx.rng, ctx.dt);
        coagulation(ctx.state, ctx.config, ctx.rng, severity, ctx.dt);
        Ok(())
    }
}

/// Infection severity (0-1) from bacterial load and circulating
/// pro-inflammatory cytokines. Non-decreasing in both.
pub fn infection_severity(state: &SimulationState, params: &PhysiologyParams) -> f64 {
    let load = saturate(state.live_bacteria() as f64, params.severity_load_scale);
    let levels = state.cytokines.mean_levels();
    let pro: f64 = CytokineKind::PRO_INFLAMMATORY
        .iter()
        .map(|k| levels[k.index()])
        .sum();
    let inflammation = saturate(pro, params.severity_cytokine_scale);
    clamp01(1.0 - (1.0 - load) * (1.0 - inflammation))
}

/// Mean arterial pressure of the configured resting circulation.
pub fn baseline_map(params: &PhysiologyParams) -> f64 {
    let co = params.baseline_heart_rate * params.baseline_stroke_volume / 1000.0;
    co * params.baseline_svr / 80.0 + 5.0
}

/// Arterial oxygen content (mL O2/dL) at the given hematocrit.
pub fn arterial_oxygen_content(hematocrit: f64, params: &PhysiologyParams) -> f64 {
    let hemoglobin = hematocrit * 100.0 / 3.0;
    HUFNER * hemoglobin * params.arterial_saturation + DISSOLVED_O2 * params.arterial_po2
}

/// Hematocrit, clot and deposit loads, then viscosity from the flow rate of
/// the previous step. Flow itself is recomputed after the cardiovascular
/// update, so viscosity and flow always lag each other by one step.
fn update_rheology(state: &mut SimulationState, config: &SimConfig, dt: f64) {
    let p = &config.physiology;
    let hemolysins = state
        .bacteria
        .iter()
        .filter(|b| b.alive && b.genome.produces(ToxinKind::Hemolysin))
        .count() as f64;

    let r = &mut state.rheology;
    let lysed = p.hemolysis_rate * hemolysins * dt;
    r.hematocrit = relax(r.hematocrit - lysed, p.baseline_hematocrit, p.hematocrit_recovery, dt);
    r.hematocrit = r.hematocrit.clamp(0.05, 0.8);

    let clot_mass: f64 = state.clots.iter().filter(|c| c.alive).map(|c| c.size).sum();
    r.clot_load = saturate(clot_mass, CLOT_LOAD_HALF);
    r.deposit_load = clamp01(state.fat_deposits.iter().map(|d| d.volume).sum());

    let hematocrit_term = 1.0 + p.hematocrit_viscosity_coeff * (r.hematocrit - p.baseline_hematocrit);
    let clot_term = 1.0 + p.clot_viscosity_coeff * r.clot_load;
    let low_flow_term = 1.0 + p.low_flow_viscosity_coeff * (1.0 - r.flow_rate).max(0.0);
    let viscosity = p.baseline_viscosity * hematocrit_term * clot_term * low_flow_term;
    r.viscosity = viscosity.max(0.5 * p.baseline_viscosity);
}

fn update_cardiovascular(
    cv: &mut CardiovascularState,
    rheology: &BloodRheology,
    severity: f64,
    p: &PhysiologyParams,
    dt: f64,
) {
    // Tone target is normalised so a sterile body sits exactly at baseline.
    let floor = sigmoid(-p.severity_midpoint * p.severity_steepness);
    let drive = sigmoid((severity - p.severity_midpoint) * p.severity_steepness);
    let vasodilation = clamp01(safe_div(drive - floor, 1.0 - floor, 0.0));
    let tone_target = 1.0 - p.max_vasodilation * vasodilation;
    cv.arterial_tone = relax(cv.arterial_tone, tone_target, p.tone_relaxation, dt).clamp(0.05, 1.5);

    let viscosity_ratio = safe_div(rheology.viscosity, p.baseline_viscosity, 1.0);
    let svr = p.baseline_svr
        * cv.arterial_tone
        * viscosity_ratio
        * (1.0 + p.deposit_resistance_coeff * rheology.deposit_load);
    cv.systemic_vascular_resistance = svr.max(p.min_svr);

    let pressure_deficit = clamp01((BAROREFLEX_SETPOINT - cv.mean_arterial_pressure) / BAROREFLEX_SPAN);
    let chronotropy = clamp01(0.6 * severity + 0.4 * pressure_deficit + 0.3 * cv.tissue_hypoxia);
    let hr_target = p.baseline_heart_rate + (p.max_heart_rate - p.baseline_heart_rate) * chronotropy;
    cv.heart_rate = relax(cv.heart_rate, hr_target, p.heart_rate_relaxation, dt);

    let rate_span = (p.max_heart_rate - p.baseline_heart_rate).max(f64::EPSILON);
    let filling = 1.0 - TACHYCARDIA_FILLING_LOSS * clamp01((cv.heart_rate - p.baseline_heart_rate) / rate_span);
    let preload = (1.0 - VENOUS_POOLING * (1.0 - cv.arterial_tone).max(0.0)) * filling;
    let afterload = safe_div(cv.systemic_vascular_resistance, p.baseline_svr, 1.0);
    let contractility = 1.0 - MYOCARDIAL_DEPRESSION * severity;
    let sv = p.baseline_stroke_volume * preload * contractility
        / (1.0 - AFTERLOAD_SENSITIVITY + AFTERLOAD_SENSITIVITY * afterload);
    cv.stroke_volume = sv.clamp(MIN_STROKE_VOLUME, 2.0 * p.baseline_stroke_volume);

    cv.cardiac_output = cv.heart_rate * cv.stroke_volume / 1000.0;
    cv.mean_arterial_pressure = cv.cardiac_output * cv.systemic_vascular_resistance / 80.0 + 5.0;

    let content = arterial_oxygen_content(rheology.hematocrit, p);
    cv.oxygen_delivery = cv.cardiac_output * content * 10.0;

    // Shunting and sluggish microflow keep part of DO2 from the tissues.
    let shunted = 1.0 - p.microcirculatory_shunt * severity;
    let microflow = rheology.flow_rate.min(1.0);
    let usable = cv.oxygen_delivery * shunted * microflow;

    let demand = p.baseline_vo2 * (1.0 + HYPERMETABOLISM * severity);
    let threshold = demand / p.max_extraction;
    if usable < threshold {
        let deficit = clamp01(1.0 - usable / threshold);
        cv.tissue_hypoxia = relax(cv.tissue_hypoxia, 1.0, p.hypoxia_onset_rate * deficit, dt);
    } else {
        cv.tissue_hypoxia = relax(cv.tissue_hypoxia, 0.0, p.hypoxia_recovery_rate, dt);
    }
    cv.tissue_hypoxia = clamp01(cv.tissue_hypoxia);
}

/// Bulk flow relative to the resting circulation: pressure-driven, slowed by
/// viscosity and clot obstruction.
fn relative_flow(cv: &CardiovascularState, rheology: &BloodRheology, p: &PhysiologyParams) -> f64 {
    let pressure = safe_div(cv.mean_arterial_pressure, baseline_map(p), 1.0);
    let fluidity = safe_div(p.baseline_viscosity, rheology.viscosity, 1.0);
    let patency = 1.0 - CLOT_FLOW_LOSS * rheology.clot_load;
    (pressure * fluidity * patency).clamp(MIN_RELATIVE_FLOW, MAX_RELATIVE_FLOW)
}

/// Carry free-floating entities downstream and add Brownian jitter. Immune
/// cells crawl under their own steering and stationary fixtures stay put.
fn transport(state: &mut SimulationState, config: &SimConfig, rng: &mut dyn rand::RngCore, dt: f64) {
    let p = &config.physiology;
    let drift = Vec3::new(p.advection_speed * state.rheology.flow_rate * dt, 0.0, 0.0);
    let spread = p.brownian_step * dt.sqrt();
    let world = &config.world;

    for b in state.bacteria.iter_mut().filter(|b| b.alive) {
        b.position = world.confine(b.position + drift + Vec3::jitter(rng, spread));
    }
    for a in state.antibodies.iter_mut().filter(|a| a.alive) {
        a.position = world.confine(a.position + drift + Vec3::jitter(rng, spread));
    }
    for ph in state.phages.iter_mut().filter(|ph| ph.alive) {
        ph.position = world.confine(ph.position + drift);
    }
}

/// Lyse expired clots and form new ones at a rate set by severity
/// (disseminated intravascular coagulation).
fn coagulation(
    state: &mut SimulationState,
    config: &SimConfig,
    rng: &mut dyn rand::RngCore,
    severity: f64,
    dt: f64,
) {
    let p = &config.physiology;
    for clot in state.clots.iter_mut().filter(|c| c.alive) {
        clot.age += dt;
        if clot.age >= clot.lifetime {
            clot.alive = false;
        }
    }

    let active = state.clots.iter().filter(|c| c.alive).count();
    if active >= p.max_clots {
        return;
    }
    if !rng.random_bool(rate_to_probability(p.clot_formation_rate * severity, dt)) {
        return;
    }
    let live: Vec<Vec3> = state
        .bacteria
        .iter()
        .filter(|b| b.alive)
        .map(|b| b.position)
        .collect();
    let site = if live.is_empty() {
        config.world.center()
    } else {
        live[rng.random_range(0..live.len())]
    };
    let clot = Clot {
        id: state.id_gen.next_id(),
        position: config.world.confine(site + Vec3::jitter(rng, 2.0)),
        size: rng.random_range(0.2..1.0),
        age: 0.0,
        lifetime: p.clot_lifetime,
        alive: true,
    };
    state.clots.push(clot);
}
