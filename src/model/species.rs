use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::antibiotic::AntibioticClass;
use super::genome::{SurfaceStructure, ToxinKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GramStain {
    Positive,
    Negative,
}

/// Bloodstream pathogens the engine can seed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    #[default]
    StaphylococcusAureus,
    EscherichiaColi,
    KlebsiellaPneumoniae,
    PseudomonasAeruginosa,
    StreptococcusPneumoniae,
}

/// Baseline phenotype of a species; the founding genome of every seeded
/// bacterium is built from this.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesProfile {
    pub gram: GramStain,
    /// Relative replication speed (1.0 = reference).
    pub growth_rate: f64,
    /// Intrinsic resistance per antibiotic class, indexed by `AntibioticClass::index`.
    pub intrinsic_resistance: [f64; AntibioticClass::COUNT],
    /// Surface structure expression levels, indexed by `SurfaceStructure::index`.
    pub surface: [f64; SurfaceStructure::COUNT],
    /// Toxin production levels, indexed by `ToxinKind::index`.
    pub toxins: [f64; ToxinKind::COUNT],
    /// Strength of pathogen-associated molecular patterns (cytokine induction).
    pub pamp_potency: f64,
}

impl Species {
    pub const ALL: [Species; 5] = [
        Species::StaphylococcusAureus,
        Species::EscherichiaColi,
        Species::KlebsiellaPneumoniae,
        Species::PseudomonasAeruginosa,
        Species::StreptococcusPneumoniae,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Species::StaphylococcusAureus => "staphylococcus_aureus",
            Species::EscherichiaColi => "escherichia_coli",
            Species::KlebsiellaPneumoniae => "klebsiella_pneumoniae",
            Species::PseudomonasAeruginosa => "pseudomonas_aeruginosa",
            Species::StreptococcusPneumoniae => "streptococcus_pneumoniae",
        }
    }

    /// Resolve a species by name, falling back to the default species.
    ///
    /// Accepts the snake_case name or the common abbreviation ("s_aureus",
    /// "e_coli", ...). Unknown names log a warning and yield `Species::default()`.
    pub fn from_name(name: &str) -> Species {
        let key = name.trim().to_ascii_lowercase().replace([' ', '-', '.'], "_");
        let found = Self::ALL.into_iter().find(|s| {
            s.name() == key
                || match s {
                    Species::StaphylococcusAureus => key == "s_aureus" || key == "mrsa",
                    Species::EscherichiaColi => key == "e_coli",
                    Species::KlebsiellaPneumoniae => key == "k_pneumoniae",
                    Species::PseudomonasAeruginosa => key == "p_aeruginosa",
                    Species::StreptococcusPneumoniae => key == "s_pneumoniae",
                }
        });
        found.unwrap_or_else(|| {
            let fallback = Species::default();
            tracing::warn!(
                requested = name,
                fallback = fallback.name(),
                "unknown species, using default profile"
            );
            fallback
        })
    }

    pub fn profile(self) -> SpeciesProfile {
        // Resistance order: beta-lactam, carbapenem, glycopeptide,
        // aminoglycoside, fluoroquinolone, polymyxin.
        // Surface order: capsule, pili, flagella, biofilm.
        // Toxin order: endotoxin, exotoxin, hemolysin.
        match self {
            Species::StaphylococcusAureus => SpeciesProfile {
                gram: GramStain::Positive,
                growth_rate: 1.0,
                intrinsic_resistance: [0.3, 0.05, 0.0, 0.1, 0.1, 1.0],
                surface: [0.4, 0.3, 0.0, 0.4],
                toxins: [0.0, 0.7, 0.6],
                pamp_potency: 0.8,
            },
            Species::EscherichiaColi => SpeciesProfile {
                gram: GramStain::Negative,
                growth_rate: 1.2,
                intrinsic_resistance: [0.1, 0.0, 1.0, 0.05, 0.1, 0.0],
                surface: [0.2, 0.6, 0.6, 0.2],
                toxins: [0.8, 0.2, 0.3],
                pamp_potency: 1.0,
            },
            Species::KlebsiellaPneumoniae => SpeciesProfile {
                gram: GramStain::Negative,
                growth_rate: 1.0,
                intrinsic_resistance: [0.5, 0.05, 1.0, 0.1, 0.15, 0.0],
                surface: [0.8, 0.5, 0.0, 0.5],
                toxins: [0.7, 0.1, 0.1],
                pamp_potency: 0.9,
            },
            Species::PseudomonasAeruginosa => SpeciesProfile {
                gram: GramStain::Negative,
                growth_rate: 0.9,
                intrinsic_resistance: [0.6, 0.1, 1.0, 0.15, 0.2, 0.0],
                surface: [0.3, 0.6, 0.7, 0.8],
                toxins: [0.6, 0.6, 0.4],
                pamp_potency: 0.9,
            },
            Species::StreptococcusPneumoniae => SpeciesProfile {
                gram: GramStain::Positive,
                growth_rate: 1.1,
                intrinsic_resistance: [0.1, 0.0, 0.0, 0.6, 0.1, 1.0],
                surface: [0.9, 0.2, 0.0, 0.1],
                toxins: [0.0, 0.5, 0.7],
                pamp_potency: 0.7,
            },
        }
    }
}

/// Identifies a lineage that is antigenically distinct to the immune system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StrainId(pub u64);

/// Known strains and the species that founded them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrainRegistry {
    strains: BTreeMap<StrainId, Species>,
}

impl StrainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strain: StrainId, species: Species) {
        self.strains.insert(strain, species);
    }

    /// Species of a strain; unknown strains resolve to the default species.
    pub fn species_of(&self, strain: StrainId) -> Species {
        match self.strains.get(&strain) {
            Some(species) => *species,
            None => {
                tracing::warn!(strain = strain.0, "unknown strain, using default species");
                Species::default()
            }
        }
    }

    /// Forget every strain for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(StrainId) -> bool) {
        self.strains.retain(|strain, _| keep(*strain));
    }

    pub fn len(&self) -> usize {
        self.strains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_accepts_aliases() {
        assert_eq!(Species::from_name("e_coli"), Species::EscherichiaColi);
        assert_eq!(Species::from_name("Escherichia coli"), Species::EscherichiaColi);
        assert_eq!(Species::from_name("MRSA"), Species::StaphylococcusAureus);
    }

    #[test]
    fn unknown_species_falls_back_to_default() {
        assert_eq!(Species::from_name("yersinia_pestis"), Species::default());
    }

    #[test]
    fn profiles_stay_in_unit_range() {
        for species in Species::ALL {
            let p = species.profile();
            let all = p
                .intrinsic_resistance
                .iter()
                .chain(p.surface.iter())
                .chain(p.toxins.iter());
            for v in all {
                assert!((0.0..=1.0).contains(v), "{species:?} has {v}");
            }
            assert!(p.growth_rate > 0.0);
        }
    }

    #[test]
    fn gram_negatives_produce_endotoxin() {
        for species in Species::ALL {
            let p = species.profile();
            if p.gram == GramStain::Negative {
                assert!(p.toxins[ToxinKind::Endotoxin.index()] > 0.5);
            } else {
                assert_eq!(p.toxins[ToxinKind::Endotoxin.index()], 0.0);
            }
        }
    }

    #[test]
    fn unknown_strain_resolves_to_default() {
        let mut registry = StrainRegistry::new();
        registry.register(StrainId(4), Species::PseudomonasAeruginosa);
        assert_eq!(registry.species_of(StrainId(4)), Species::PseudomonasAeruginosa);
        assert_eq!(registry.species_of(StrainId(99)), Species::default());
    }
}
