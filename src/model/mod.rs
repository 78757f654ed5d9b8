pub mod antibiotic;
pub mod entities;
pub mod genome;
pub mod inflammation;
pub mod pharmacology;
pub mod physiology;
pub mod species;
pub mod state;
pub mod vec3;

pub use antibiotic::{Antibiotic, AntibioticClass, AntibioticProfile};
pub use entities::{
    Antibody, Bacterium, Clot, EntityKind, EnvelopeDamage, FatDeposit, ImmuneCell, ImmuneCellKind, Nutrient,
    Phage, PhageInfection,
};
pub use genome::{Allele, Genome, Locus, MutationSummary, SurfaceStructure, ToxinKind};
pub use inflammation::{
    CytokineField, CytokineKind, CytokineLevels, FieldCell, OrganDamage, PatientVitals,
    SepsisStage,
};
pub use pharmacology::{ActiveDrug, DosingRegimen, Toxicity};
pub use physiology::{BloodRheology, CardiovascularState};
pub use species::{GramStain, Species, SpeciesProfile, StrainId, StrainRegistry};
pub use state::{SimulationState, SimulationStats, StrainExposure};
pub use vec3::Vec3;
