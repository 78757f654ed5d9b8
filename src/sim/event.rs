use serde::{Deserialize, Serialize};

use crate::model::{Antibiotic, EnvelopeDamage, ImmuneCellKind, StrainId};

/// Why a bacterium died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", content = "agent", rename_all = "snake_case")]
pub enum DeathCause {
    Phagocytosis,
    Antibiotic(Antibiotic),
    PhageLysis,
    /// Antibody-directed complement lysis.
    Complement,
    Starvation,
    /// Envelope integrity exhausted without a single killing blow; carries
    /// the agent that did the last damage.
    EnvelopeFailure(EnvelopeDamage),
}

/// Something that happened during a step, recorded by the system that did it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TickEvent {
    BacteriumKilled { bacterium_id: u64, cause: DeathCause },
    BacteriumBorn { parent_id: u64, child_id: u64 },
    StrainEmerged { strain: StrainId, parent: StrainId },
    ResistanceTransferred { donor_id: u64, recipient_id: u64 },
    DoseAdministered { antibiotic: Antibiotic, concentration: f64 },
    PhageDosed { count: u32 },
    PhagesReleased { host_id: u64, count: u32 },
    ImmuneCellRecruited { kind: ImmuneCellKind },
    AdaptiveResponse { strain: StrainId },
}
