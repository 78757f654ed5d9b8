use thiserror::Error;

/// Rejected configuration. Nothing from a rejected request is applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("initial population must not be negative (got {0})")]
    NegativePopulation(i64),

    #[error("initial population {requested} exceeds carrying capacity {capacity}")]
    PopulationExceedsCapacity { requested: u64, capacity: u32 },

    #[error("unknown antibiotic id: {0:?}")]
    UnknownAntibiotic(String),

    #[error("speed multiplier must be positive and finite (got {0})")]
    InvalidSpeed(f64),

    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("could not parse configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Failures surfaced by the simulation controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("simulation terminated after an internal error; reset to continue")]
    Terminated,

    #[error("tick of {minutes} simulated minutes needs more than {limit} sub-steps")]
    TickTooLong { minutes: f64, limit: u32 },

    #[error("{system} produced a non-finite {quantity}")]
    NonFinite {
        system: &'static str,
        quantity: &'static str,
    },
}
