mod common;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sepsis_sim::model::{ActiveDrug, DosingRegimen, Vec3};
use sepsis_sim::sim::{administer_if_due, damage_ratchets, eliminate, sepsis_score};
use sepsis_sim::spatial::Octree;
use sepsis_sim::{Antibiotic, SimConfig, Species, TherapyMode};

use common::{run_ticks, running};

fn random_point(rng: &mut SmallRng, extent: f64) -> Vec3 {
    Vec3::new(
        rng.random_range(0.0..extent),
        rng.random_range(0.0..extent),
        rng.random_range(0.0..extent),
    )
}

#[test]
fn radius_queries_match_brute_force() {
    let mut rng = SmallRng::seed_from_u64(7);
    for trial in 0..200 {
        let n = rng.random_range(0..400);
        let mut points: Vec<(u32, Vec3)> = (0..n).map(|i| (i, random_point(&mut rng, 100.0))).collect();
        // Duplicates and clusters stress leaf splitting.
        if n > 10 {
            let p = points[3].1;
            points.push((n, p));
            points.push((n + 1, p));
        }
        let mut tree = Octree::new(rng.random_range(1..12), 8);
        tree.rebuild(points.iter().copied());

        for _ in 0..20 {
            let center = random_point(&mut rng, 120.0);
            let radius = rng.random_range(0.0..40.0);
            let mut found = tree.query_radius(center, radius);
            found.sort_unstable();
            let mut expected: Vec<u32> = points
                .iter()
                .filter(|(_, p)| p.distance_squared(center) <= radius * radius)
                .map(|(k, _)| *k)
                .collect();
            expected.sort_unstable();
            assert_eq!(found, expected, "trial {trial}, center {center:?}, radius {radius}");
        }
    }
}

#[test]
fn plasma_decay_is_independent_of_step_sizes() {
    let mut rng = SmallRng::seed_from_u64(11);
    for drug in Antibiotic::ALL {
        let half_life = drug.profile().half_life;
        for k in 1..=5 {
            let mut bolus = ActiveDrug::prescribed(drug, DosingRegimen::single_bolus(40.0));
            administer_if_due(&mut bolus);

            // Random partition of k half-lives into 1..30 pieces.
            let total = half_life * k as f64;
            let mut cuts: Vec<f64> = (0..rng.random_range(0..30))
                .map(|_| rng.random_range(0.0..total))
                .collect();
            cuts.push(0.0);
            cuts.push(total);
            cuts.sort_by(f64::total_cmp);
            for w in cuts.windows(2) {
                eliminate(&mut bolus, w[1] - w[0]);
            }

            let expected = 40.0 / 2f64.powi(k);
            let rel = (bolus.concentration - expected).abs() / expected;
            assert!(rel < 1e-9, "{drug:?} after {k} half-lives: {}", bolus.concentration);
        }
    }
}

#[test]
fn sepsis_score_is_monotone_in_cytokines_and_hypoxia() {
    let config = SimConfig::default();
    let (w, d) = (&config.sepsis_weights, &config.diagnostics);
    let mut rng = SmallRng::seed_from_u64(3);
    for _ in 0..1000 {
        let hypoxia = rng.random_range(0.0..1.0);
        let cytokines = rng.random_range(0.0..500.0);
        let damage = rng.random_range(0.0..1.0);
        let load = rng.random_range(0..5000);
        let base = sepsis_score(w, d, hypoxia, cytokines, damage, load);

        let more_cytokines = cytokines + rng.random_range(0.0..100.0);
        assert!(sepsis_score(w, d, hypoxia, more_cytokines, damage, load) >= base);
        let more_hypoxia = (hypoxia + rng.random_range(0.0..0.5)).min(1.0);
        assert!(sepsis_score(w, d, more_hypoxia, cytokines, damage, load) >= base);
    }
}

#[test]
fn organ_damage_never_decreases_over_a_run() {
    let mut config = SimConfig::default();
    config.species = Species::StaphylococcusAureus;
    config.initial_population = 200;
    config.therapy_mode = TherapyMode::Antibiotic;
    config.antibiotics = vec![Antibiotic::Vancomycin, Antibiotic::Gentamicin];
    let mut sim = running(config);

    let snapshots = run_ticks(&mut sim, 300, 2.0);
    for pair in snapshots.windows(2) {
        assert!(
            damage_ratchets(&pair[0].vitals.organ_damage, &pair[1].vitals.organ_damage),
            "organ damage fell at tick {}",
            pair[1].tick
        );
    }
    let last = &snapshots[snapshots.len() - 1].vitals.organ_damage;
    assert!(last.renal > 0.0);
}

#[test]
fn vitals_stay_physiological_under_heavy_infection() {
    let mut config = SimConfig::default();
    config.species = Species::EscherichiaColi;
    config.initial_population = 500;
    let mut sim = running(config);
    for snap in run_ticks(&mut sim, 300, 1.0) {
        let v = &snap.vitals;
        assert!(v.heart_rate.is_finite() && v.heart_rate > 0.0);
        assert!(v.mean_arterial_pressure > 0.0);
        assert!((0.0..=1.0).contains(&snap.cardiovascular.tissue_hypoxia));
        assert!(v.sepsis_score >= 0.0 && v.sepsis_score <= 100.0);
    }
}
