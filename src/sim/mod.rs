mod context;
mod controller;
mod diagnostics;
mod event;
mod evolution;
mod helpers;
mod immune;
mod phage;
mod pharmacology;
mod physiology;
mod seeding;
mod system;

pub use context::TickContext;
pub use controller::{Command, Lifecycle, Simulation, TickOutcome, default_systems, derive_seed};
pub use diagnostics::{
    DiagnosticsSystem, classify, damage_ratchets, fold_events, immune_census, sepsis_score,
    sirs_criteria,
};
pub use event::{DeathCause, TickEvent};
pub use evolution::{EvolutionSystem, fitness};
pub use immune::ImmuneSystem;
pub use phage::{PhageSystem, dominant_strain, therapeutic_host};
pub use pharmacology::{
    PharmacologySystem, administer_if_due, effect_on, eliminate, reconcile_prescriptions,
};
pub use physiology::{
    PhysiologySystem, arterial_oxygen_content, baseline_map, infection_severity,
};
pub use seeding::populate;
pub use system::{SimPhase, SimSystem};
