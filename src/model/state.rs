use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::entities::{Antibody, Bacterium, Clot, EntityKind, FatDeposit, ImmuneCell, Nutrient, Phage};
use super::inflammation::{CytokineField, PatientVitals};
use super::pharmacology::{ActiveDrug, Toxicity};
use super::physiology::{BloodRheology, CardiovascularState};
use super::species::{StrainId, StrainRegistry};
use super::vec3::Vec3;
use crate::config::SimConfig;
use crate::id::IdGenerator;
use crate::spatial::EntityRef;

/// First contact of the immune system with a strain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrainExposure {
    pub first_seen_step: u64,
    /// Whether the adaptive response for this strain has been mounted.
    pub responded: bool,
}

/// Cumulative counters, folded from tick events by the diagnostics engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub births: u64,
    pub killed_by_immune: u64,
    pub killed_by_antibiotic: u64,
    pub killed_by_phage: u64,
    pub killed_by_antibody: u64,
    pub starved: u64,
    pub strains_emerged: u64,
    pub resistance_transfers: u64,
    pub doses_given: u64,
    pub phages_released: u64,
    /// Largest bacterial population observed so far.
    pub peak_bacteria: usize,
}

/// Everything the engine owns. Passed by exclusive reference through each
/// step; no engine keeps a handle to it between steps.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    /// Completed caller ticks.
    pub tick: u64,
    /// Completed engine steps (sub-steps included).
    pub step: u64,
    /// Simulated minutes elapsed.
    pub elapsed: f64,
    pub id_gen: IdGenerator,
    /// Whether the configured population and fixtures have been placed.
    pub seeded: bool,

    pub bacteria: Vec<Bacterium>,
    pub immune_cells: Vec<ImmuneCell>,
    pub antibodies: Vec<Antibody>,
    pub phages: Vec<Phage>,
    pub clots: Vec<Clot>,
    pub fat_deposits: Vec<FatDeposit>,
    pub nutrients: Vec<Nutrient>,

    pub strains: StrainRegistry,
    pub exposures: BTreeMap<StrainId, StrainExposure>,

    pub cardiovascular: CardiovascularState,
    pub rheology: BloodRheology,
    pub drugs: Vec<ActiveDrug>,
    pub toxicity: Toxicity,
    /// Minutes since the last phage dose, `None` before the first.
    pub since_phage_dose: Option<f64>,
    pub cytokines: CytokineField,
    pub vitals: PatientVitals,
    pub stats: SimulationStats,
}

impl SimulationState {
    /// Empty body at baseline physiology.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            tick: 0,
            step: 0,
            elapsed: 0.0,
            id_gen: IdGenerator::new(),
            seeded: false,
            bacteria: Vec::new(),
            immune_cells: Vec::new(),
            antibodies: Vec::new(),
            phages: Vec::new(),
            clots: Vec::new(),
            fat_deposits: Vec::new(),
            nutrients: Vec::new(),
            strains: StrainRegistry::new(),
            exposures: BTreeMap::new(),
            cardiovascular: CardiovascularState::default(),
            rheology: BloodRheology {
                hematocrit: config.physiology.baseline_hematocrit,
                viscosity: config.physiology.baseline_viscosity,
                flow_rate: 1.0,
                clot_load: 0.0,
                deposit_load: 0.0,
            },
            drugs: Vec::new(),
            toxicity: Toxicity::default(),
            since_phage_dose: None,
            cytokines: CytokineField::new(
                config.world.min,
                config.world.max,
                config.immune.field_resolution,
            ),
            vitals: PatientVitals::default(),
            stats: SimulationStats::default(),
        }
    }

    pub fn live_bacteria(&self) -> usize {
        self.bacteria.iter().filter(|b| b.alive).count()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Bacterium => self.bacteria.iter().filter(|e| e.alive).count(),
            EntityKind::ImmuneCell => self.immune_cells.iter().filter(|e| e.alive).count(),
            EntityKind::Antibody => self.antibodies.iter().filter(|e| e.alive).count(),
            EntityKind::Phage => self.phages.iter().filter(|e| e.alive).count(),
            EntityKind::Clot => self.clots.iter().filter(|e| e.alive).count(),
            EntityKind::FatDeposit => self.fat_deposits.len(),
            EntityKind::Nutrient => self.nutrients.len(),
        }
    }

    /// Drop every entity flagged dead during the step, then forget strains
    /// left without a living member. Strain ids are never reused, so an
    /// extinct strain cannot come back.
    pub fn compact(&mut self) {
        self.bacteria.retain(|e| e.alive);
        self.immune_cells.retain(|e| e.alive);
        self.antibodies.retain(|e| e.alive);
        self.phages.retain(|e| e.alive);
        self.clots.retain(|e| e.alive);

        let circulating: BTreeSet<StrainId> = self.bacteria.iter().map(|b| b.strain).collect();
        self.exposures.retain(|strain, _| circulating.contains(strain));
        self.strains.retain(|strain| circulating.contains(&strain));
    }

    /// Index entries for every living entity, in collection order.
    pub fn index_entries(&self) -> Vec<(EntityRef, Vec3)> {
        fn push(
            out: &mut Vec<(EntityRef, Vec3)>,
            kind: EntityKind,
            items: impl Iterator<Item = (bool, Vec3)>,
        ) {
            for (slot, (alive, position)) in items.enumerate() {
                if alive {
                    out.push((EntityRef::new(kind, slot), position));
                }
            }
        }
        let mut out = Vec::with_capacity(
            self.bacteria.len()
                + self.immune_cells.len()
                + self.antibodies.len()
                + self.phages.len()
                + self.clots.len()
                + self.fat_deposits.len()
                + self.nutrients.len(),
        );
        push(&mut out, EntityKind::Bacterium, self.bacteria.iter().map(|e| (e.alive, e.position)));
        push(&mut out, EntityKind::ImmuneCell, self.immune_cells.iter().map(|e| (e.alive, e.position)));
        push(&mut out, EntityKind::Antibody, self.antibodies.iter().map(|e| (e.alive, e.position)));
        push(&mut out, EntityKind::Phage, self.phages.iter().map(|e| (e.alive, e.position)));
        push(&mut out, EntityKind::Clot, self.clots.iter().map(|e| (e.alive, e.position)));
        push(&mut out, EntityKind::FatDeposit, self.fat_deposits.iter().map(|e| (true, e.position)));
        push(&mut out, EntityKind::Nutrient, self.nutrients.iter().map(|e| (true, e.position)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::species::Species;

    #[test]
    fn new_state_is_empty_at_baseline() {
        let config = SimConfig::default();
        let state = SimulationState::new(&config);
        assert!(state.bacteria.is_empty());
        assert!(state.index_entries().is_empty());
        assert_eq!(state.cardiovascular, CardiovascularState::default());
        assert_eq!(state.rheology.flow_rate, 1.0);
    }

    #[test]
    fn compaction_removes_dead_entities_only() {
        let config = SimConfig::default();
        let mut state = SimulationState::new(&config);
        for i in 0..4 {
            state.bacteria.push(Bacterium::founder(
                i,
                Species::default(),
                StrainId(100),
                Vec3::new(i as f64, 0.0, 0.0),
            ));
        }
        state.bacteria[1].alive = false;
        assert_eq!(state.count(EntityKind::Bacterium), 3);
        assert_eq!(state.index_entries().len(), 3);
        state.compact();
        assert_eq!(state.bacteria.len(), 3);
        assert!(state.bacteria.iter().all(|b| b.id != 1));
    }

    #[test]
    fn compaction_forgets_extinct_strains() {
        let config = SimConfig::default();
        let mut state = SimulationState::new(&config);
        let (kept, extinct) = (StrainId(100), StrainId(200));
        for (id, strain) in [(1, kept), (2, extinct), (3, extinct)] {
            state.strains.register(strain, Species::default());
            state.exposures.insert(
                strain,
                StrainExposure {
                    first_seen_step: 0,
                    responded: false,
                },
            );
            state
                .bacteria
                .push(Bacterium::founder(id, Species::default(), strain, Vec3::ZERO));
        }
        state.bacteria[1].alive = false;
        state.compact();
        assert_eq!(state.strains.len(), 2);

        state.bacteria.retain(|b| b.strain == kept);
        state.compact();
        assert_eq!(state.strains.len(), 1);
        assert!(state.exposures.contains_key(&kept));
        assert!(!state.exposures.contains_key(&extinct));
    }
}
