use rand::Rng;
use tracing::info;

use super::pharmacology::reconcile_prescriptions;
use crate::config::SimConfig;
use crate::model::{
    Bacterium, FatDeposit, ImmuneCell, ImmuneCellKind, Nutrient, SimulationState, StrainId,
};

// --- Constants ---

/// Plaque volume range for seeded fat deposits.
const DEPOSIT_VOLUME_MIN: f64 = 0.01;
const DEPOSIT_VOLUME_MAX: f64 = 0.05;
/// Capacity range for seeded nutrient patches.
const PATCH_CAPACITY_MIN: f64 = 0.5;
const PATCH_CAPACITY_MAX: f64 = 1.5;

/// Place the founding infection and the static body furniture.
///
/// Runs once, on the first step after a reset. Draws everything from `rng`,
/// so the same seed always produces the same initial layout.
pub fn populate(state: &mut SimulationState, config: &SimConfig, rng: &mut dyn rand::RngCore) {
    let founder = StrainId(state.id_gen.next_id());
    state.strains.register(founder, config.species);
    for _ in 0..config.initial_population {
        let position = config.world.random_point(rng);
        let id = state.id_gen.next_id();
        state
            .bacteria
            .push(Bacterium::founder(id, config.species, founder, position));
    }

    if config.immune.enabled {
        for _ in 0..config.immune.resident_macrophages {
            let position = config.world.random_point(rng);
            let id = state.id_gen.next_id();
            state
                .immune_cells
                .push(ImmuneCell::new(id, ImmuneCellKind::Macrophage, position));
        }
    }

    for _ in 0..config.fat_deposits {
        let position = config.world.random_point(rng);
        let volume = rng.random_range(DEPOSIT_VOLUME_MIN..DEPOSIT_VOLUME_MAX);
        let id = state.id_gen.next_id();
        state.fat_deposits.push(FatDeposit { id, position, volume });
    }

    for _ in 0..config.nutrient_patches {
        let position = config.world.random_point(rng);
        let capacity = rng.random_range(PATCH_CAPACITY_MIN..PATCH_CAPACITY_MAX);
        let id = state.id_gen.next_id();
        state.nutrients.push(Nutrient {
            id,
            position,
            amount: capacity,
            capacity,
        });
    }

    reconcile_prescriptions(state, config);
    state.seeded = true;

    info!(
        species = config.species.name(),
        bacteria = state.bacteria.len(),
        macrophages = state.immune_cells.len(),
        therapy = ?config.therapy_mode,
        "seeded infection"
    );
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::config::TherapyMode;
    use crate::model::{Antibiotic, Species};
    use crate::testutil::test_config;

    fn seeded(config: &SimConfig, seed: u64) -> SimulationState {
        let mut state = SimulationState::new(config);
        populate(&mut state, config, &mut SmallRng::seed_from_u64(seed));
        state
    }

    #[test]
    fn founders_share_one_strain_of_the_configured_species() {
        let mut config = test_config();
        config.species = Species::PseudomonasAeruginosa;
        config.initial_population = 30;
        let state = seeded(&config, 1);
        assert_eq!(state.bacteria.len(), 30);
        let strain = state.bacteria[0].strain;
        assert!(state.bacteria.iter().all(|b| b.strain == strain));
        assert_eq!(state.strains.species_of(strain), Species::PseudomonasAeruginosa);
        assert!(state.seeded);
    }

    #[test]
    fn entities_start_inside_the_world() {
        let config = test_config();
        let state = seeded(&config, 2);
        let (min, max) = (config.world.min, config.world.max);
        let inside = |p: crate::model::Vec3| {
            (min.x..=max.x).contains(&p.x)
                && (min.y..=max.y).contains(&p.y)
                && (min.z..=max.z).contains(&p.z)
        };
        assert!(state.bacteria.iter().all(|b| inside(b.position)));
        assert!(state.nutrients.iter().all(|n| inside(n.position)));
        assert_eq!(state.nutrients.len(), config.nutrient_patches as usize);
        assert_eq!(state.fat_deposits.len(), config.fat_deposits as usize);
    }

    #[test]
    fn resident_macrophages_only_with_immunity() {
        let mut config = test_config();
        assert_eq!(
            seeded(&config, 3).immune_cells.len(),
            config.immune.resident_macrophages as usize
        );
        config.immune.enabled = false;
        assert!(seeded(&config, 3).immune_cells.is_empty());
    }

    #[test]
    fn prescribed_drugs_are_queued() {
        let mut config = test_config();
        config.therapy_mode = TherapyMode::Antibiotic;
        config.antibiotics = vec![Antibiotic::Meropenem, Antibiotic::Vancomycin];
        let state = seeded(&config, 4);
        assert_eq!(state.drugs.len(), 2);
        assert!(state.drugs.iter().all(|d| d.doses_given == 0));
    }

    #[test]
    fn same_seed_same_layout() {
        let config = test_config();
        assert_eq!(seeded(&config, 9).bacteria, seeded(&config, 9).bacteria);
        assert_ne!(seeded(&config, 9).bacteria, seeded(&config, 10).bacteria);
    }
}
