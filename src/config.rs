use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Antibiotic, Species, Vec3};

/// Which therapies are active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TherapyMode {
    /// Host defences only.
    #[default]
    Supportive,
    Antibiotic,
    Phage,
    Combined,
}

impl TherapyMode {
    pub fn uses_antibiotics(self) -> bool {
        matches!(self, TherapyMode::Antibiotic | TherapyMode::Combined)
    }

    pub fn uses_phage(self) -> bool {
        matches!(self, TherapyMode::Phage | TherapyMode::Combined)
    }

    /// The mode after an antibiotic is prescribed on top of this one.
    pub fn with_antibiotics(self) -> TherapyMode {
        match self {
            TherapyMode::Supportive | TherapyMode::Antibiotic => TherapyMode::Antibiotic,
            TherapyMode::Phage | TherapyMode::Combined => TherapyMode::Combined,
        }
    }
}

/// Simulated vessel segment (micrometres).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::new(200.0, 200.0, 200.0),
        }
    }
}

impl WorldBounds {
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Uniformly random point inside the bounds.
    pub fn random_point(&self, rng: &mut dyn rand::RngCore) -> Vec3 {
        use rand::Rng;
        Vec3::new(
            rng.random_range(self.min.x..=self.max.x),
            rng.random_range(self.min.y..=self.max.y),
            rng.random_range(self.min.z..=self.max.z),
        )
    }

    /// Wrap along the flow axis (x), reflect off the vessel walls (y, z).
    pub fn confine(&self, p: Vec3) -> Vec3 {
        fn reflect(v: f64, lo: f64, hi: f64) -> f64 {
            if v < lo {
                (2.0 * lo - v).min(hi)
            } else if v > hi {
                (2.0 * hi - v).max(lo)
            } else {
                v
            }
        }
        let len = self.max.x - self.min.x;
        let x = if len > 0.0 {
            self.min.x + (p.x - self.min.x).rem_euclid(len)
        } else {
            self.min.x
        };
        Vec3::new(
            x,
            reflect(p.y, self.min.y, self.max.y),
            reflect(p.z, self.min.z, self.max.z),
        )
    }
}

/// Cardiovascular and rheology constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysiologyParams {
    pub baseline_heart_rate: f64,
    pub max_heart_rate: f64,
    pub baseline_stroke_volume: f64,
    /// dyn·s/cm^5.
    pub baseline_svr: f64,
    /// Floor for vascular resistance; keeps pressure and flow equations defined.
    pub min_svr: f64,
    /// Largest fractional loss of arterial tone at maximal severity.
    pub max_vasodilation: f64,
    /// Severity at which vasodilation is half-maximal.
    pub severity_midpoint: f64,
    pub severity_steepness: f64,
    /// First-order rate at which tone tracks its target (per minute).
    pub tone_relaxation: f64,
    /// Rate at which heart rate tracks its target (per minute).
    pub heart_rate_relaxation: f64,
    /// Bacteria count at which the load contribution to severity is half-maximal.
    pub severity_load_scale: f64,
    /// Pro-inflammatory concentration at which the cytokine contribution is half-maximal.
    pub severity_cytokine_scale: f64,
    pub arterial_saturation: f64,
    /// mmHg.
    pub arterial_po2: f64,
    /// Resting oxygen consumption (mL/min).
    pub baseline_vo2: f64,
    /// Fraction of delivered oxygen tissues can extract at most.
    pub max_extraction: f64,
    /// Fraction of delivery lost to microcirculatory shunting at maximal severity.
    pub microcirculatory_shunt: f64,
    pub hypoxia_onset_rate: f64,
    pub hypoxia_recovery_rate: f64,
    /// Plasma-corrected viscosity at normal hematocrit (cP).
    pub baseline_viscosity: f64,
    pub hematocrit_viscosity_coeff: f64,
    pub clot_viscosity_coeff: f64,
    /// Shear-thinning proxy: viscosity rise as flow drops below baseline.
    pub low_flow_viscosity_coeff: f64,
    /// Extra vascular resistance per unit deposit load.
    pub deposit_resistance_coeff: f64,
    pub baseline_hematocrit: f64,
    /// Hematocrit loss per hemolysin-producing bacterium per minute.
    pub hemolysis_rate: f64,
    /// Rate hematocrit recovers toward baseline (per minute).
    pub hematocrit_recovery: f64,
    /// Downstream drift of free entities at baseline flow (µm/min).
    pub advection_speed: f64,
    /// Random displacement scale for passive particles (µm per sqrt-minute).
    pub brownian_step: f64,
    /// Probability per minute per unit severity that a clot forms.
    pub clot_formation_rate: f64,
    pub clot_lifetime: f64,
    pub max_clots: usize,
}

impl Default for PhysiologyParams {
    fn default() -> Self {
        Self {
            baseline_heart_rate: 75.0,
            max_heart_rate: 170.0,
            baseline_stroke_volume: 70.0,
            baseline_svr: 1100.0,
            min_svr: 250.0,
            max_vasodilation: 0.6,
            severity_midpoint: 0.45,
            severity_steepness: 10.0,
            tone_relaxation: 0.05,
            heart_rate_relaxation: 0.1,
            severity_load_scale: 400.0,
            severity_cytokine_scale: 40.0,
            arterial_saturation: 0.97,
            arterial_po2: 95.0,
            baseline_vo2: 250.0,
            max_extraction: 0.6,
            microcirculatory_shunt: 0.45,
            hypoxia_onset_rate: 0.05,
            hypoxia_recovery_rate: 0.02,
            baseline_viscosity: 3.5,
            hematocrit_viscosity_coeff: 2.5,
            clot_viscosity_coeff: 1.5,
            low_flow_viscosity_coeff: 0.6,
            deposit_resistance_coeff: 0.5,
            baseline_hematocrit: 0.45,
            hemolysis_rate: 0.000_002,
            hematocrit_recovery: 0.001,
            advection_speed: 4.0,
            brownian_step: 0.8,
            clot_formation_rate: 0.05,
            clot_lifetime: 600.0,
            max_clots: 200,
        }
    }
}

/// Antibiotic effect and toxicity constants shared by all drugs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PharmacologyParams {
    /// Toxicity exposure is half-saturated at this multiple of a drug's EC50.
    pub toxicity_saturation: f64,
    /// Envelope damage per minute at full effect for envelope-targeting drugs.
    pub envelope_damage: f64,
    /// Fraction of drug exposure a full biofilm matrix blocks.
    pub biofilm_shielding: f64,
}

impl Default for PharmacologyParams {
    fn default() -> Self {
        Self {
            toxicity_saturation: 4.0,
            envelope_damage: 0.05,
            biofilm_shielding: 0.5,
        }
    }
}

/// Innate and adaptive immune constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImmuneParams {
    /// Master switch for recruitment and all immune cell activity.
    pub enabled: bool,
    /// Macrophages present before infection.
    pub resident_macrophages: u32,
    /// Pro-inflammatory concentration below which no cells are recruited.
    pub recruitment_threshold: f64,
    /// Cells recruited per minute per unit concentration above threshold.
    pub recruitment_rate: f64,
    pub max_immune_cells: usize,
    /// Fraction of recruits that are neutrophils; the rest are macrophages.
    pub neutrophil_fraction: f64,
    pub sensing_radius: f64,
    pub engagement_radius: f64,
    /// Energy lost per failed engulfment.
    pub failure_energy_cost: f64,
    pub activation_gain: f64,
    /// Passive activation decay per minute.
    pub activation_decay: f64,
    /// Fraction of recruitment suppressed at IL-10 parity with pro-inflammatory load.
    pub il10_suppression: f64,
    /// Capture probability bonus against opsonised bacteria.
    pub opsonization_bonus: f64,
    /// Cytokine emitted per bacterium per minute, scaled by PAMP potency.
    pub cytokine_emission: f64,
    /// Extra emission multiplier for endotoxin producers.
    pub endotoxin_bonus: f64,
    /// IL-10 produced per unit pro-inflammatory cytokine per minute.
    pub il10_ratio: f64,
    pub cytokine_decay: f64,
    pub cytokine_diffusion: f64,
    pub field_resolution: usize,
    /// Steps between first exposure to a strain and its adaptive response.
    pub adaptive_delay_steps: u64,
    /// Antibodies released per B-cell per minute.
    pub antibody_rate: f64,
    pub antibody_lifetime: f64,
    pub antibody_binding_radius: f64,
    /// Envelope damage an antibody deals on binding.
    pub antibody_neutralization: f64,
    pub max_antibodies: usize,
    pub helper_radius: f64,
    /// Activation added per minute to phagocytes near a helper T-cell.
    pub helper_boost: f64,
}

impl Default for ImmuneParams {
    fn default() -> Self {
        Self {
            enabled: true,
            resident_macrophages: 4,
            recruitment_threshold: 1.0,
            recruitment_rate: 0.02,
            max_immune_cells: 400,
            neutrophil_fraction: 0.7,
            sensing_radius: 40.0,
            engagement_radius: 3.0,
            failure_energy_cost: 0.1,
            activation_gain: 0.1,
            activation_decay: 0.002,
            il10_suppression: 0.5,
            opsonization_bonus: 0.3,
            cytokine_emission: 0.02,
            endotoxin_bonus: 1.0,
            il10_ratio: 0.01,
            cytokine_decay: 0.02,
            cytokine_diffusion: 0.1,
            field_resolution: 4,
            adaptive_delay_steps: 240,
            antibody_rate: 0.2,
            antibody_lifetime: 240.0,
            antibody_binding_radius: 4.0,
            antibody_neutralization: 0.25,
            max_antibodies: 1500,
            helper_radius: 30.0,
            helper_boost: 0.01,
        }
    }
}

/// Bacterial growth, mutation and gene-transfer constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionParams {
    pub division_energy_threshold: f64,
    /// Envelope integrity required to divide.
    pub integrity_floor: f64,
    /// Division probability per minute at fitness 1.
    pub base_division_rate: f64,
    /// Energy spent per minute staying alive.
    pub metabolic_cost: f64,
    /// Energy gained per minute at nutrient availability 1.
    pub nutrient_uptake: f64,
    /// Extra energy cost per minute per unit total toxin production.
    pub toxin_cost: f64,
    pub envelope_repair: f64,
    pub mutation_rate: f64,
    pub mutation_step: f64,
    /// Surface drift beyond which an offspring is a new strain.
    pub strain_drift_threshold: f64,
    /// Conjugation probability per minute while a partner is in contact.
    pub transfer_probability: f64,
    pub contact_radius: f64,
    pub transfer_fraction: f64,
    pub motility_speed: f64,
    pub immune_pressure_radius: f64,
    /// Fitness stress per nearby phagocyte.
    pub immune_pressure_per_cell: f64,
    pub nutrient_radius: f64,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self {
            division_energy_threshold: 0.6,
            integrity_floor: 0.5,
            base_division_rate: 0.04,
            metabolic_cost: 0.004,
            nutrient_uptake: 0.012,
            toxin_cost: 0.001,
            envelope_repair: 0.005,
            mutation_rate: 0.01,
            mutation_step: 0.1,
            strain_drift_threshold: 0.25,
            transfer_probability: 0.002,
            contact_radius: 4.0,
            transfer_fraction: 0.5,
            motility_speed: 2.0,
            immune_pressure_radius: 20.0,
            immune_pressure_per_cell: 0.1,
            nutrient_radius: 15.0,
        }
    }
}

/// Bacteriophage therapy constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhageParams {
    /// Phages injected per dose.
    pub dose: u32,
    /// Minutes between doses; `None` injects once.
    pub redose_interval: Option<f64>,
    /// Species whose most abundant strain each dose targets. `None` targets
    /// the seeded species.
    pub host: Option<Species>,
    pub burst_size: u32,
    /// Minutes from attachment to lysis.
    pub latency: f64,
    /// Minutes a free phage survives without infecting.
    pub lifetime: f64,
    pub attach_radius: f64,
    /// Attachment probability per contact against an unencapsulated host.
    pub adsorption: f64,
    pub sensing_radius: f64,
    /// Random-walk step (µm per minute).
    pub diffusion_step: f64,
    /// Weight of the pull toward local bacterial density (0-1).
    pub density_bias: f64,
    pub max_phages: usize,
}

impl Default for PhageParams {
    fn default() -> Self {
        Self {
            dose: 80,
            redose_interval: None,
            host: None,
            burst_size: 30,
            latency: 25.0,
            lifetime: 240.0,
            attach_radius: 3.0,
            adsorption: 0.6,
            sensing_radius: 25.0,
            diffusion_step: 4.0,
            density_bias: 0.5,
            max_phages: 3000,
        }
    }
}

/// Weights of the sepsis score components. Each component is normalised to
/// `[0, 1)` before weighting, so the score ranges over `[0, sum of weights)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SepsisWeights {
    pub hypoxia: f64,
    pub cytokines: f64,
    pub organ_damage: f64,
    pub bacterial_load: f64,
}

impl Default for SepsisWeights {
    fn default() -> Self {
        Self {
            hypoxia: 30.0,
            cytokines: 25.0,
            organ_damage: 25.0,
            bacterial_load: 20.0,
        }
    }
}

/// Normalisation scales, organ injury rates and staging thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsParams {
    /// Total cytokine concentration at which its score component is one half.
    pub cytokine_scale: f64,
    /// Bacteria count at which the load component is one half.
    pub load_scale: f64,
    /// Tissue hypoxia fraction at which the hypoxia component is one half.
    pub hypoxia_scale: f64,
    /// Organ injury per minute at full hypoxia.
    pub hypoxia_damage_rate: f64,
    /// Organ injury per minute at full drug toxicity.
    pub toxicity_damage_rate: f64,
    /// Injury per minute per unit of exotoxin production across the population.
    pub exotoxin_damage_rate: f64,
    /// Bacteria count regarded as detectable bacteremia.
    pub bacteremia_threshold: usize,
}

impl Default for DiagnosticsParams {
    fn default() -> Self {
        Self {
            cytokine_scale: 30.0,
            load_scale: 300.0,
            hypoxia_scale: 0.25,
            hypoxia_damage_rate: 0.002,
            toxicity_damage_rate: 0.01,
            exotoxin_damage_rate: 0.000_002,
            bacteremia_threshold: 10,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Deterministic seed for reproducible runs.
    pub seed: u64,
    pub world: WorldBounds,
    pub species: Species,
    pub initial_population: u32,
    /// Hard ceiling on the bacterial population.
    pub carrying_capacity: u32,
    pub therapy_mode: TherapyMode,
    /// Drugs given on their standard regimen while antibiotic therapy is active.
    pub antibiotics: Vec<Antibiotic>,
    /// Largest simulated step (minutes); longer ticks are split evenly.
    pub max_substep: f64,
    /// Most sub-steps one tick may run; larger `dt × speed` products are rejected.
    pub max_substeps_per_tick: u32,
    /// Basal plasma nutrient availability (1.0 = normal glucose).
    pub nutrient_supply: f64,
    pub nutrient_patches: u32,
    /// Regeneration per minute of each patch, as a fraction of its capacity.
    pub nutrient_regeneration: f64,
    pub fat_deposits: u32,
    pub octree_leaf_capacity: usize,
    pub octree_max_depth: u32,
    pub physiology: PhysiologyParams,
    pub pharmacology: PharmacologyParams,
    pub immune: ImmuneParams,
    pub evolution: EvolutionParams,
    pub phage: PhageParams,
    pub sepsis_weights: SepsisWeights,
    pub diagnostics: DiagnosticsParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            world: WorldBounds::default(),
            species: Species::default(),
            initial_population: 50,
            carrying_capacity: 2000,
            therapy_mode: TherapyMode::default(),
            antibiotics: Vec::new(),
            max_substep: 1.0,
            max_substeps_per_tick: 1000,
            nutrient_supply: 1.0,
            nutrient_patches: 12,
            nutrient_regeneration: 0.01,
            fat_deposits: 4,
            octree_leaf_capacity: 8,
            octree_max_depth: 10,
            physiology: PhysiologyParams::default(),
            pharmacology: PharmacologyParams::default(),
            immune: ImmuneParams::default(),
            evolution: EvolutionParams::default(),
            phage: PhageParams::default(),
            sepsis_weights: SepsisWeights::default(),
            diagnostics: DiagnosticsParams::default(),
        }
    }
}

/// Payload of the `configure` command as issued by a front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureRequest {
    pub initial_population: i64,
    pub antibiotics: Vec<String>,
    pub therapy_mode: TherapyMode,
    pub species: Option<String>,
}

fn require(name: &'static str, value: f64, ok: bool) -> Result<(), ConfigError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    require(name, value, value > 0.0)
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    require(name, value, value >= 0.0)
}

fn unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    require(name, value, (0.0..=1.0).contains(&value))
}

impl SimConfig {
    /// Parse a full configuration from JSON; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter, returning the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = self.world.extent();
        positive("world.extent.x", e.x)?;
        positive("world.extent.y", e.y)?;
        positive("world.extent.z", e.z)?;
        if self.initial_population > self.carrying_capacity {
            return Err(ConfigError::PopulationExceedsCapacity {
                requested: u64::from(self.initial_population),
                capacity: self.carrying_capacity,
            });
        }
        positive("max_substep", self.max_substep)?;
        positive("max_substeps_per_tick", f64::from(self.max_substeps_per_tick))?;
        non_negative("nutrient_supply", self.nutrient_supply)?;
        unit("nutrient_regeneration", self.nutrient_regeneration)?;
        positive("octree_leaf_capacity", self.octree_leaf_capacity as f64)?;

        let p = &self.physiology;
        positive("physiology.baseline_heart_rate", p.baseline_heart_rate)?;
        require(
            "physiology.max_heart_rate",
            p.max_heart_rate,
            p.max_heart_rate >= p.baseline_heart_rate,
        )?;
        positive("physiology.baseline_stroke_volume", p.baseline_stroke_volume)?;
        positive("physiology.min_svr", p.min_svr)?;
        require("physiology.baseline_svr", p.baseline_svr, p.baseline_svr >= p.min_svr)?;
        unit("physiology.max_vasodilation", p.max_vasodilation)?;
        non_negative("physiology.tone_relaxation", p.tone_relaxation)?;
        non_negative("physiology.heart_rate_relaxation", p.heart_rate_relaxation)?;
        positive("physiology.severity_load_scale", p.severity_load_scale)?;
        positive("physiology.severity_cytokine_scale", p.severity_cytokine_scale)?;
        unit("physiology.arterial_saturation", p.arterial_saturation)?;
        positive("physiology.baseline_vo2", p.baseline_vo2)?;
        require(
            "physiology.max_extraction",
            p.max_extraction,
            p.max_extraction > 0.0 && p.max_extraction <= 1.0,
        )?;
        unit("physiology.microcirculatory_shunt", p.microcirculatory_shunt)?;
        non_negative("physiology.hypoxia_onset_rate", p.hypoxia_onset_rate)?;
        non_negative("physiology.hypoxia_recovery_rate", p.hypoxia_recovery_rate)?;
        positive("physiology.baseline_viscosity", p.baseline_viscosity)?;
        unit("physiology.baseline_hematocrit", p.baseline_hematocrit)?;
        non_negative("physiology.advection_speed", p.advection_speed)?;
        non_negative("physiology.clot_formation_rate", p.clot_formation_rate)?;
        positive("physiology.clot_lifetime", p.clot_lifetime)?;

        let ph = &self.pharmacology;
        positive("pharmacology.toxicity_saturation", ph.toxicity_saturation)?;
        non_negative("pharmacology.envelope_damage", ph.envelope_damage)?;
        unit("pharmacology.biofilm_shielding", ph.biofilm_shielding)?;

        let im = &self.immune;
        non_negative("immune.recruitment_threshold", im.recruitment_threshold)?;
        non_negative("immune.recruitment_rate", im.recruitment_rate)?;
        unit("immune.neutrophil_fraction", im.neutrophil_fraction)?;
        positive("immune.sensing_radius", im.sensing_radius)?;
        positive("immune.engagement_radius", im.engagement_radius)?;
        unit("immune.failure_energy_cost", im.failure_energy_cost)?;
        unit("immune.il10_suppression", im.il10_suppression)?;
        non_negative("immune.cytokine_emission", im.cytokine_emission)?;
        non_negative("immune.cytokine_decay", im.cytokine_decay)?;
        non_negative("immune.cytokine_diffusion", im.cytokine_diffusion)?;
        positive("immune.field_resolution", im.field_resolution as f64)?;
        positive("immune.antibody_lifetime", im.antibody_lifetime)?;

        let ev = &self.evolution;
        unit("evolution.division_energy_threshold", ev.division_energy_threshold)?;
        unit("evolution.integrity_floor", ev.integrity_floor)?;
        unit("evolution.base_division_rate", ev.base_division_rate)?;
        non_negative("evolution.metabolic_cost", ev.metabolic_cost)?;
        non_negative("evolution.nutrient_uptake", ev.nutrient_uptake)?;
        unit("evolution.mutation_rate", ev.mutation_rate)?;
        unit("evolution.mutation_step", ev.mutation_step)?;
        unit("evolution.transfer_probability", ev.transfer_probability)?;
        unit("evolution.transfer_fraction", ev.transfer_fraction)?;

        let pg = &self.phage;
        positive("phage.latency", pg.latency)?;
        positive("phage.lifetime", pg.lifetime)?;
        unit("phage.adsorption", pg.adsorption)?;
        unit("phage.density_bias", pg.density_bias)?;
        if let Some(interval) = pg.redose_interval {
            positive("phage.redose_interval", interval)?;
        }

        let w = &self.sepsis_weights;
        non_negative("sepsis_weights.hypoxia", w.hypoxia)?;
        non_negative("sepsis_weights.cytokines", w.cytokines)?;
        non_negative("sepsis_weights.organ_damage", w.organ_damage)?;
        non_negative("sepsis_weights.bacterial_load", w.bacterial_load)?;

        let d = &self.diagnostics;
        positive("diagnostics.cytokine_scale", d.cytokine_scale)?;
        positive("diagnostics.load_scale", d.load_scale)?;
        positive("diagnostics.hypoxia_scale", d.hypoxia_scale)?;
        Ok(())
    }

    /// Produce the configuration a `configure` request asks for, leaving
    /// `self` untouched. Fails without side effects on any invalid field.
    pub fn with_request(&self, request: &ConfigureRequest) -> Result<SimConfig, ConfigError> {
        if request.initial_population < 0 {
            return Err(ConfigError::NegativePopulation(request.initial_population));
        }
        let population = request.initial_population as u64;
        if population > u64::from(self.carrying_capacity) {
            return Err(ConfigError::PopulationExceedsCapacity {
                requested: population,
                capacity: self.carrying_capacity,
            });
        }
        let antibiotics = request
            .antibiotics
            .iter()
            .map(|id| Antibiotic::from_id(id).ok_or_else(|| ConfigError::UnknownAntibiotic(id.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let mut next = self.clone();
        next.initial_population = population as u32;
        next.antibiotics = antibiotics;
        next.therapy_mode = request.therapy_mode;
        if let Some(name) = &request.species {
            next.species = Species::from_name(name);
        }
        next.validate()?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn from_json_fills_defaults() {
        let config = SimConfig::from_json(r#"{"seed": 7, "immune": {"enabled": false}}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert!(!config.immune.enabled);
        assert_eq!(config.immune.sensing_radius, ImmuneParams::default().sensing_radius);
        assert_eq!(config.carrying_capacity, 2000);
    }

    #[test]
    fn from_json_reports_parse_errors() {
        assert!(matches!(SimConfig::from_json("{not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn from_json_rejects_invalid_values() {
        let err = SimConfig::from_json(r#"{"max_substep": 0.0}"#).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidParameter {
                name: "max_substep",
                value: 0.0
            }
        );
    }

    #[test]
    fn request_with_negative_population_is_rejected() {
        let base = SimConfig::default();
        let request = ConfigureRequest {
            initial_population: -5,
            ..ConfigureRequest::default()
        };
        assert_eq!(base.with_request(&request), Err(ConfigError::NegativePopulation(-5)));
    }

    #[test]
    fn request_with_unknown_antibiotic_is_rejected_whole() {
        let base = SimConfig::default();
        let request = ConfigureRequest {
            initial_population: 10,
            antibiotics: vec!["meropenem".into(), "unobtainium".into()],
            therapy_mode: TherapyMode::Antibiotic,
            species: None,
        };
        assert_eq!(
            base.with_request(&request),
            Err(ConfigError::UnknownAntibiotic("unobtainium".into()))
        );
    }

    #[test]
    fn request_over_capacity_is_rejected() {
        let base = SimConfig {
            carrying_capacity: 100,
            ..SimConfig::default()
        };
        let request = ConfigureRequest {
            initial_population: 101,
            ..ConfigureRequest::default()
        };
        assert!(matches!(
            base.with_request(&request),
            Err(ConfigError::PopulationExceedsCapacity { .. })
        ));
    }

    #[test]
    fn valid_request_produces_new_config() {
        let base = SimConfig::default();
        let request = ConfigureRequest {
            initial_population: 80,
            antibiotics: vec!["Vancomycin".into()],
            therapy_mode: TherapyMode::Combined,
            species: Some("e_coli".into()),
        };
        let next = base.with_request(&request).unwrap();
        assert_eq!(next.initial_population, 80);
        assert_eq!(next.antibiotics, vec![Antibiotic::Vancomycin]);
        assert_eq!(next.species, Species::EscherichiaColi);
        assert_eq!(next.therapy_mode, TherapyMode::Combined);
        assert_eq!(base.initial_population, 50);
    }

    #[test]
    fn confine_wraps_flow_axis_and_reflects_walls() {
        let world = WorldBounds::default();
        let p = world.confine(Vec3::new(210.0, -5.0, 205.0));
        assert!((p.x - 10.0).abs() < 1e-9);
        assert!((p.y - 5.0).abs() < 1e-9);
        assert!((p.z - 195.0).abs() < 1e-9);
    }

    #[test]
    fn therapy_mode_composition() {
        assert_eq!(TherapyMode::Supportive.with_antibiotics(), TherapyMode::Antibiotic);
        assert_eq!(TherapyMode::Phage.with_antibiotics(), TherapyMode::Combined);
        assert!(TherapyMode::Combined.uses_phage());
        assert!(!TherapyMode::Antibiotic.uses_phage());
    }
}
