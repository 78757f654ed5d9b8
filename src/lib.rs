pub mod config;
pub mod error;
pub mod id;
pub mod jsonl;
pub mod model;
pub mod sim;
pub mod snapshot;
pub mod spatial;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{ConfigureRequest, SimConfig, TherapyMode};
pub use error::{ConfigError, SimError};
pub use id::IdGenerator;
pub use model::{Antibiotic, EntityKind, SepsisStage, Species};
pub use sim::{Command, Lifecycle, Simulation, TickOutcome};
pub use snapshot::{DrugLevel, EntityDetail, EntityView, SimulationSnapshot};
