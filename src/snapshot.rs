//! Detached, read-only view of the simulation handed to front ends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    Antibiotic, BloodRheology, CardiovascularState, EntityKind, ImmuneCellKind, PatientVitals,
    SimulationState, SimulationStats, Species, StrainId, Toxicity, Vec3,
};
use crate::sim::{Lifecycle, immune_census};

/// Kind-specific detail needed to draw an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityDetail {
    Bacterium {
        species: Species,
        strain: StrainId,
        infected: bool,
        opsonized: bool,
    },
    ImmuneCell {
        cell: ImmuneCellKind,
        activation: f64,
    },
    Antibody {
        target: StrainId,
    },
    Phage {
        host: StrainId,
    },
    Clot {
        size: f64,
    },
    FatDeposit {
        volume: f64,
    },
    Nutrient {
        amount: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    pub id: u64,
    pub position: Vec3,
    pub detail: EntityDetail,
}

impl EntityView {
    pub fn kind(&self) -> EntityKind {
        match self.detail {
            EntityDetail::Bacterium { .. } => EntityKind::Bacterium,
            EntityDetail::ImmuneCell { .. } => EntityKind::ImmuneCell,
            EntityDetail::Antibody { .. } => EntityKind::Antibody,
            EntityDetail::Phage { .. } => EntityKind::Phage,
            EntityDetail::Clot { .. } => EntityKind::Clot,
            EntityDetail::FatDeposit { .. } => EntityKind::FatDeposit,
            EntityDetail::Nutrient { .. } => EntityKind::Nutrient,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugLevel {
    pub antibiotic: Antibiotic,
    /// Plasma concentration (mg/L).
    pub concentration: f64,
    pub doses_given: u32,
    /// Whether the drug is still being redosed.
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub tick: u64,
    pub step: u64,
    /// Simulated minutes since the last reset.
    pub elapsed: f64,
    pub lifecycle: Lifecycle,
    pub entities: Vec<EntityView>,
    pub counts: BTreeMap<EntityKind, usize>,
    /// Living immune cells by lineage.
    pub immune_cells: BTreeMap<ImmuneCellKind, usize>,
    /// Strains with at least one living member.
    pub strains: usize,
    pub cardiovascular: CardiovascularState,
    pub rheology: BloodRheology,
    pub vitals: PatientVitals,
    pub drugs: Vec<DrugLevel>,
    pub toxicity: Toxicity,
    pub stats: SimulationStats,
}

impl SimulationSnapshot {
    /// Copy everything renderable out of `state`. Only living entities appear.
    pub fn capture(state: &SimulationState, lifecycle: Lifecycle) -> Self {
        let mut entities = Vec::with_capacity(
            state.bacteria.len() + state.immune_cells.len() + state.phages.len(),
        );
        entities.extend(state.bacteria.iter().filter(|b| b.alive).map(|b| EntityView {
            id: b.id,
            position: b.position,
            detail: EntityDetail::Bacterium {
                species: b.species,
                strain: b.strain,
                infected: b.infection.is_some(),
                opsonized: b.opsonized,
            },
        }));
        entities.extend(state.immune_cells.iter().filter(|c| c.alive).map(|c| EntityView {
            id: c.id,
            position: c.position,
            detail: EntityDetail::ImmuneCell {
                cell: c.kind,
                activation: c.activation,
            },
        }));
        entities.extend(state.antibodies.iter().filter(|a| a.alive).map(|a| EntityView {
            id: a.id,
            position: a.position,
            detail: EntityDetail::Antibody { target: a.target },
        }));
        entities.extend(state.phages.iter().filter(|p| p.alive).map(|p| EntityView {
            id: p.id,
            position: p.position,
            detail: EntityDetail::Phage { host: p.host },
        }));
        entities.extend(state.clots.iter().filter(|c| c.alive).map(|c| EntityView {
            id: c.id,
            position: c.position,
            detail: EntityDetail::Clot { size: c.size },
        }));
        entities.extend(state.fat_deposits.iter().map(|d| EntityView {
            id: d.id,
            position: d.position,
            detail: EntityDetail::FatDeposit { volume: d.volume },
        }));
        entities.extend(state.nutrients.iter().map(|n| EntityView {
            id: n.id,
            position: n.position,
            detail: EntityDetail::Nutrient { amount: n.amount },
        }));

        let counts = EntityKind::ALL
            .iter()
            .map(|&kind| (kind, state.count(kind)))
            .collect();

        let drugs = state
            .drugs
            .iter()
            .map(|d| DrugLevel {
                antibiotic: d.antibiotic,
                concentration: d.concentration,
                doses_given: d.doses_given,
                active: d.regimen.interval.is_some() || d.doses_given == 0,
            })
            .collect();

        Self {
            tick: state.tick,
            step: state.step,
            elapsed: state.elapsed,
            lifecycle,
            entities,
            counts,
            immune_cells: immune_census(state).into_iter().collect(),
            strains: state.strains.len(),
            cardiovascular: state.cardiovascular.clone(),
            rheology: state.rheology.clone(),
            vitals: state.vitals.clone(),
            drugs,
            toxicity: state.toxicity,
            stats: state.stats.clone(),
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn sepsis_score(&self) -> f64 {
        self.vitals.sepsis_score
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImmuneCell;
    use crate::testutil::{add_bacteria, test_config};

    #[test]
    fn capture_skips_dead_entities() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        add_bacteria(&mut state, Species::EscherichiaColi, 5, &config, 1);
        state.bacteria[2].alive = false;
        let snap = SimulationSnapshot::capture(&state, Lifecycle::Running);
        assert_eq!(snap.count(EntityKind::Bacterium), 4);
        assert_eq!(snap.entities.len(), 4);
        assert!(snap.entities.iter().all(|e| e.kind() == EntityKind::Bacterium));
        assert_eq!(snap.count(EntityKind::Phage), 0);
    }

    #[test]
    fn snapshot_is_detached_from_state() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        add_bacteria(&mut state, Species::EscherichiaColi, 3, &config, 1);
        let snap = SimulationSnapshot::capture(&state, Lifecycle::Idle);
        state.bacteria[0].position = Vec3::new(1.0, 2.0, 3.0);
        state.vitals.sepsis_score = 99.0;
        assert_ne!(snap.entities[0].position, state.bacteria[0].position);
        assert_eq!(snap.sepsis_score(), 0.0);
    }

    #[test]
    fn immune_cells_are_counted_by_lineage() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        for (i, kind) in [
            ImmuneCellKind::Neutrophil,
            ImmuneCellKind::Neutrophil,
            ImmuneCellKind::Macrophage,
            ImmuneCellKind::BCell,
        ]
        .into_iter()
        .enumerate()
        {
            state
                .immune_cells
                .push(ImmuneCell::new(i as u64, kind, Vec3::new(10.0, 10.0, 10.0)));
        }
        state.immune_cells[1].alive = false;
        let snap = SimulationSnapshot::capture(&state, Lifecycle::Running);
        assert_eq!(snap.immune_cells[&ImmuneCellKind::Neutrophil], 1);
        assert_eq!(snap.immune_cells[&ImmuneCellKind::Macrophage], 1);
        assert_eq!(snap.immune_cells[&ImmuneCellKind::TCell], 0);
        assert_eq!(snap.immune_cells[&ImmuneCellKind::BCell], 1);
        assert_eq!(snap.immune_cells.values().sum::<usize>(), snap.count(EntityKind::ImmuneCell));
        assert!(snap.to_json().unwrap().contains(r#""neutrophil":1"#));
    }

    #[test]
    fn json_uses_snake_case_tags() {
        let config = test_config();
        let mut state = SimulationState::new(&config);
        add_bacteria(&mut state, Species::KlebsiellaPneumoniae, 1, &config, 1);
        let json = SimulationSnapshot::capture(&state, Lifecycle::Paused).to_json().unwrap();
        assert!(json.contains(r#""lifecycle":"paused""#));
        assert!(json.contains(r#""type":"bacterium""#));
        assert!(json.contains(r#""species":"klebsiella_pneumoniae""#));
        let back: SimulationSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.count(EntityKind::Bacterium), 1);
    }
}
