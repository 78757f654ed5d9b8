use serde::{Deserialize, Serialize};

use super::antibiotic::Antibiotic;
use super::genome::Genome;
use super::inflammation::FieldCell;
use super::species::{Species, StrainId};
use super::vec3::Vec3;

/// Discriminant for every entity the spatial index can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Bacterium,
    ImmuneCell,
    Antibody,
    Phage,
    Clot,
    FatDeposit,
    Nutrient,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Bacterium,
        EntityKind::ImmuneCell,
        EntityKind::Antibody,
        EntityKind::Phage,
        EntityKind::Clot,
        EntityKind::FatDeposit,
        EntityKind::Nutrient,
    ];
}

/// A lytic phage that has injected its genome and is replicating inside the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhageInfection {
    /// Minutes until the host lyses.
    pub latency_remaining: f64,
    /// Phages released at lysis.
    pub burst_size: u32,
    /// Host strain inherited by the progeny.
    pub host: StrainId,
}

/// What last eroded a bacterium's envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeDamage {
    Antibiotic(Antibiotic),
    Antibody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bacterium {
    pub id: u64,
    pub position: Vec3,
    pub velocity: Vec3,
    pub species: Species,
    pub strain: StrainId,
    pub genome: Genome,
    /// Peptidoglycan / outer-membrane integrity (0-1). Zero kills the cell.
    pub envelope_integrity: f64,
    pub envelope_damage: Option<EnvelopeDamage>,
    /// Stored energy (0-1). Zero kills the cell.
    pub energy: f64,
    /// Minutes since division.
    pub age: f64,
    /// Coated by antibody; easier for phagocytes to capture.
    pub opsonized: bool,
    pub infection: Option<PhageInfection>,
    /// Cleared during a step; dead cells are compacted away at step end.
    pub alive: bool,
}

impl Bacterium {
    /// A founding cell with the species' baseline genome.
    pub fn founder(id: u64, species: Species, strain: StrainId, position: Vec3) -> Self {
        Self {
            id,
            position,
            velocity: Vec3::ZERO,
            species,
            strain,
            genome: Genome::from_profile(&species.profile()),
            envelope_integrity: 1.0,
            envelope_damage: None,
            energy: 0.5,
            age: 0.0,
            opsonized: false,
            infection: None,
            alive: true,
        }
    }
}

/// Leukocyte lineages modelled by the immune engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmuneCellKind {
    Neutrophil,
    Macrophage,
    TCell,
    BCell,
}

impl ImmuneCellKind {
    /// Whether the cell engulfs bacteria.
    pub fn is_phagocyte(self) -> bool {
        matches!(self, ImmuneCellKind::Neutrophil | ImmuneCellKind::Macrophage)
    }

    /// Maximum travel per minute (micrometres).
    pub fn speed(self) -> f64 {
        match self {
            ImmuneCellKind::Neutrophil => 12.0,
            ImmuneCellKind::Macrophage => 6.0,
            ImmuneCellKind::TCell => 8.0,
            ImmuneCellKind::BCell => 3.0,
        }
    }

    /// Capture probability per contact at full activation against a bare cell.
    pub fn capture_efficiency(self) -> f64 {
        match self {
            ImmuneCellKind::Neutrophil => 0.55,
            ImmuneCellKind::Macrophage => 0.4,
            ImmuneCellKind::TCell | ImmuneCellKind::BCell => 0.0,
        }
    }

    /// Lifespan in minutes.
    pub fn lifespan(self) -> f64 {
        match self {
            ImmuneCellKind::Neutrophil => 720.0,
            ImmuneCellKind::Macrophage => 4320.0,
            ImmuneCellKind::TCell => 2880.0,
            ImmuneCellKind::BCell => 2880.0,
        }
    }

    /// Successful engulfments before the cell is spent.
    pub fn max_kills(self) -> u32 {
        match self {
            ImmuneCellKind::Neutrophil => 6,
            ImmuneCellKind::Macrophage => 25,
            ImmuneCellKind::TCell | ImmuneCellKind::BCell => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmuneCell {
    pub id: u64,
    pub kind: ImmuneCellKind,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Activation level (0-1).
    pub activation: f64,
    /// Remaining energy (0-1); failed engagements drain it.
    pub energy: f64,
    pub age: f64,
    pub kills: u32,
    /// Cytokine grid cell whose signal recruited this cell.
    pub recruited_by: Option<FieldCell>,
    /// Strain an adaptive (T/B) cell is specific for.
    pub specificity: Option<StrainId>,
    pub alive: bool,
}

impl ImmuneCell {
    pub fn new(id: u64, kind: ImmuneCellKind, position: Vec3) -> Self {
        Self {
            id,
            kind,
            position,
            velocity: Vec3::ZERO,
            activation: 0.3,
            energy: 1.0,
            age: 0.0,
            kills: 0,
            recruited_by: None,
            specificity: None,
            alive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Antibody {
    pub id: u64,
    pub position: Vec3,
    pub target: StrainId,
    /// Envelope damage dealt on binding (complement fixation).
    pub neutralization: f64,
    pub age: f64,
    pub lifetime: f64,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phage {
    pub id: u64,
    pub position: Vec3,
    /// The only strain this phage adsorbs onto.
    pub host: StrainId,
    pub burst_size: u32,
    /// Minutes from attachment to lysis.
    pub latency: f64,
    pub age: f64,
    /// Free-diffusion lifetime before decay.
    pub lifetime: f64,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clot {
    pub id: u64,
    pub position: Vec3,
    /// Relative obstruction (0-1).
    pub size: f64,
    pub age: f64,
    pub lifetime: f64,
    pub alive: bool,
}

/// Static lipid plaque narrowing the vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatDeposit {
    pub id: u64,
    pub position: Vec3,
    /// Relative volume (0-1).
    pub volume: f64,
}

/// Local nutrient patch that regenerates toward `capacity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrient {
    pub id: u64,
    pub position: Vec3,
    pub amount: f64,
    pub capacity: f64,
}
