#![allow(dead_code)]

use sepsis_sim::{SimConfig, Simulation, SimulationSnapshot};

/// A running simulation built from `config`.
pub fn running(config: SimConfig) -> Simulation {
    let mut sim = Simulation::new(config).unwrap();
    sim.start();
    sim
}

/// Untreated infection with no host defences and no mutation: the only
/// thing that happens to the population is growth.
pub fn unopposed_growth_config(capacity: u32) -> SimConfig {
    let mut config = SimConfig::default();
    config.initial_population = 50;
    config.carrying_capacity = capacity;
    config.immune.enabled = false;
    config.evolution.mutation_rate = 0.0;
    config
}

/// Tick `n` times with a fixed `dt`, returning the snapshot after each tick.
pub fn run_ticks(sim: &mut Simulation, n: usize, dt: f64) -> Vec<SimulationSnapshot> {
    (0..n)
        .map(|_| {
            sim.tick(dt).unwrap();
            sim.snapshot()
        })
        .collect()
}

pub fn read_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
