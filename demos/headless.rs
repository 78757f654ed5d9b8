//! Headless run: `cargo run --example headless [config.json] [run.jsonl]`.
//!
//! Logs a summary every simulated hour and, if an output path is given,
//! writes the hourly snapshots as JSONL.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use sepsis_sim::jsonl::write_snapshots;
use sepsis_sim::{Antibiotic, EntityKind, SimConfig, Simulation, TherapyMode};
use tracing::info;

const MINUTES: usize = 24 * 60;
const REPORT_EVERY: usize = 60;

fn load_config(path: Option<&String>) -> Result<SimConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(SimConfig::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(SimConfig {
            initial_population: 80,
            therapy_mode: TherapyMode::Combined,
            antibiotics: vec![Antibiotic::Vancomycin],
            ..SimConfig::default()
        }),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first())?;
    let output = args.get(1).map(PathBuf::from);

    let mut sim = Simulation::new(config)?;
    sim.start();

    let mut snapshots = Vec::new();
    for minute in 1..=MINUTES {
        sim.tick(1.0)?;
        if minute % REPORT_EVERY == 0 {
            let snap = sim.snapshot();
            info!(
                hour = minute / REPORT_EVERY,
                bacteria = snap.count(EntityKind::Bacterium),
                immune = snap.count(EntityKind::ImmuneCell),
                phages = snap.count(EntityKind::Phage),
                strains = snap.strains,
                map = snap.vitals.mean_arterial_pressure,
                score = snap.sepsis_score(),
                stage = ?snap.vitals.stage,
                "hourly report"
            );
            snapshots.push(snap);
        }
    }

    let last = sim.snapshot();
    println!("{}", serde_json::to_string_pretty(&last.stats)?);

    if let Some(path) = output {
        let mut writer = BufWriter::new(File::create(&path)?);
        write_snapshots(&mut writer, &snapshots)?;
        info!(path = %path.display(), snapshots = snapshots.len(), "run written");
    }
    Ok(())
}
