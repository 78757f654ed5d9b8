use serde::{Deserialize, Serialize};

use super::species::GramStain;

/// Mechanistic antibiotic class. Resistance is tracked per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntibioticClass {
    BetaLactam,
    Carbapenem,
    Glycopeptide,
    Aminoglycoside,
    Fluoroquinolone,
    Polymyxin,
}

impl AntibioticClass {
    pub const COUNT: usize = 6;

    pub const ALL: [AntibioticClass; Self::COUNT] = [
        AntibioticClass::BetaLactam,
        AntibioticClass::Carbapenem,
        AntibioticClass::Glycopeptide,
        AntibioticClass::Aminoglycoside,
        AntibioticClass::Fluoroquinolone,
        AntibioticClass::Polymyxin,
    ];

    pub fn index(self) -> usize {
        match self {
            AntibioticClass::BetaLactam => 0,
            AntibioticClass::Carbapenem => 1,
            AntibioticClass::Glycopeptide => 2,
            AntibioticClass::Aminoglycoside => 3,
            AntibioticClass::Fluoroquinolone => 4,
            AntibioticClass::Polymyxin => 5,
        }
    }

    /// Whether the class acts on bacteria of the given gram stain at all.
    ///
    /// Glycopeptides cannot cross the gram-negative outer membrane and
    /// polymyxins need the lipopolysaccharide layer only gram-negatives have.
    pub fn covers(self, gram: GramStain) -> bool {
        !matches!(
            (self, gram),
            (AntibioticClass::Glycopeptide, GramStain::Negative)
                | (AntibioticClass::Polymyxin, GramStain::Positive)
        )
    }

    /// Whether the class attacks the cell envelope (wall or membrane), so
    /// sub-lethal exposure erodes envelope integrity.
    pub fn targets_envelope(self) -> bool {
        matches!(
            self,
            AntibioticClass::BetaLactam
                | AntibioticClass::Carbapenem
                | AntibioticClass::Glycopeptide
                | AntibioticClass::Polymyxin
        )
    }
}

/// Antibiotics available to the clinician controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Antibiotic {
    Penicillin,
    Ceftriaxone,
    Meropenem,
    Vancomycin,
    Gentamicin,
    Ciprofloxacin,
    Colistin,
}

/// Fixed pharmacological parameters of one antibiotic.
///
/// Times are in simulated minutes, concentrations in mg/L.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntibioticProfile {
    pub class: AntibioticClass,
    /// Plasma elimination half-life.
    pub half_life: f64,
    /// Concentration producing half the maximal effect.
    pub ec50: f64,
    /// Hill coefficient (steepness of the dose-response curve).
    pub hill_n: f64,
    /// Kill probability per minute at full effect against a fully susceptible cell.
    pub max_kill_rate: f64,
    /// Fraction of plasma concentration that reaches bacteria in tissue (0-1).
    pub tissue_penetration: f64,
    /// Kidney toxicity potency (per minute at saturating exposure).
    pub nephrotoxicity: f64,
    /// Liver toxicity potency (per minute at saturating exposure).
    pub hepatotoxicity: f64,
    /// Plasma concentration added by one standard dose.
    pub standard_dose: f64,
    /// Standard redosing interval.
    pub dosing_interval: f64,
}

impl Antibiotic {
    pub const ALL: [Antibiotic; 7] = [
        Antibiotic::Penicillin,
        Antibiotic::Ceftriaxone,
        Antibiotic::Meropenem,
        Antibiotic::Vancomycin,
        Antibiotic::Gentamicin,
        Antibiotic::Ciprofloxacin,
        Antibiotic::Colistin,
    ];

    /// Stable identifier used by the command surface.
    pub fn id(self) -> &'static str {
        match self {
            Antibiotic::Penicillin => "penicillin",
            Antibiotic::Ceftriaxone => "ceftriaxone",
            Antibiotic::Meropenem => "meropenem",
            Antibiotic::Vancomycin => "vancomycin",
            Antibiotic::Gentamicin => "gentamicin",
            Antibiotic::Ciprofloxacin => "ciprofloxacin",
            Antibiotic::Colistin => "colistin",
        }
    }

    /// Resolve a command-surface identifier (case-insensitive).
    pub fn from_id(id: &str) -> Option<Antibiotic> {
        let needle = id.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.id().eq_ignore_ascii_case(needle))
    }

    pub fn class(self) -> AntibioticClass {
        self.profile().class
    }

    pub fn profile(self) -> AntibioticProfile {
        match self {
            Antibiotic::Penicillin => AntibioticProfile {
                class: AntibioticClass::BetaLactam,
                half_life: 30.0,
                ec50: 2.0,
                hill_n: 2.0,
                max_kill_rate: 0.25,
                tissue_penetration: 0.6,
                nephrotoxicity: 0.00002,
                hepatotoxicity: 0.00001,
                standard_dose: 20.0,
                dosing_interval: 240.0,
            },
            Antibiotic::Ceftriaxone => AntibioticProfile {
                class: AntibioticClass::BetaLactam,
                half_life: 480.0,
                ec50: 4.0,
                hill_n: 2.0,
                max_kill_rate: 0.22,
                tissue_penetration: 0.7,
                nephrotoxicity: 0.00002,
                hepatotoxicity: 0.00006,
                standard_dose: 100.0,
                dosing_interval: 1440.0,
            },
            Antibiotic::Meropenem => AntibioticProfile {
                class: AntibioticClass::Carbapenem,
                half_life: 60.0,
                ec50: 1.0,
                hill_n: 2.5,
                max_kill_rate: 0.35,
                tissue_penetration: 0.8,
                nephrotoxicity: 0.00004,
                hepatotoxicity: 0.00003,
                standard_dose: 40.0,
                dosing_interval: 480.0,
            },
            Antibiotic::Vancomycin => AntibioticProfile {
                class: AntibioticClass::Glycopeptide,
                half_life: 360.0,
                ec50: 5.0,
                hill_n: 1.5,
                max_kill_rate: 0.15,
                tissue_penetration: 0.5,
                nephrotoxicity: 0.0003,
                hepatotoxicity: 0.00002,
                standard_dose: 30.0,
                dosing_interval: 720.0,
            },
            Antibiotic::Gentamicin => AntibioticProfile {
                class: AntibioticClass::Aminoglycoside,
                half_life: 120.0,
                ec50: 2.0,
                hill_n: 2.0,
                max_kill_rate: 0.3,
                tissue_penetration: 0.4,
                nephrotoxicity: 0.0005,
                hepatotoxicity: 0.00002,
                standard_dose: 10.0,
                dosing_interval: 1440.0,
            },
            Antibiotic::Ciprofloxacin => AntibioticProfile {
                class: AntibioticClass::Fluoroquinolone,
                half_life: 240.0,
                ec50: 0.5,
                hill_n: 1.8,
                max_kill_rate: 0.2,
                tissue_penetration: 0.9,
                nephrotoxicity: 0.00003,
                hepatotoxicity: 0.0001,
                standard_dose: 4.0,
                dosing_interval: 720.0,
            },
            Antibiotic::Colistin => AntibioticProfile {
                class: AntibioticClass::Polymyxin,
                half_life: 300.0,
                ec50: 1.0,
                hill_n: 3.0,
                max_kill_rate: 0.3,
                tissue_penetration: 0.3,
                nephrotoxicity: 0.0008,
                hepatotoxicity: 0.00002,
                standard_dose: 3.0,
                dosing_interval: 720.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for drug in Antibiotic::ALL {
            assert_eq!(Antibiotic::from_id(drug.id()), Some(drug));
        }
        assert_eq!(Antibiotic::from_id(" MEROPENEM "), Some(Antibiotic::Meropenem));
        assert_eq!(Antibiotic::from_id("snake-oil"), None);
    }

    #[test]
    fn class_indices_are_dense() {
        for (i, class) in AntibioticClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
        }
    }

    #[test]
    fn profiles_are_physically_valid() {
        for drug in Antibiotic::ALL {
            let p = drug.profile();
            assert!(p.half_life > 0.0, "{drug:?}");
            assert!(p.ec50 > 0.0, "{drug:?}");
            assert!(p.hill_n > 0.0, "{drug:?}");
            assert!((0.0..=1.0).contains(&p.max_kill_rate), "{drug:?}");
            assert!((0.0..=1.0).contains(&p.tissue_penetration), "{drug:?}");
            assert!(p.standard_dose > p.ec50, "{drug:?} dose should exceed EC50");
        }
    }

    #[test]
    fn spectrum_respects_gram_stain() {
        assert!(!AntibioticClass::Glycopeptide.covers(GramStain::Negative));
        assert!(AntibioticClass::Glycopeptide.covers(GramStain::Positive));
        assert!(!AntibioticClass::Polymyxin.covers(GramStain::Positive));
        assert!(AntibioticClass::Carbapenem.covers(GramStain::Negative));
    }
}
