use serde::{Deserialize, Serialize};

use super::antibiotic::Antibiotic;

/// How a drug is given. Times are simulated minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DosingRegimen {
    /// Plasma concentration added per dose (mg/L).
    pub dose: f64,
    /// Redosing interval; `None` gives a single bolus.
    pub interval: Option<f64>,
}

impl DosingRegimen {
    pub fn standard(drug: Antibiotic) -> Self {
        let p = drug.profile();
        Self {
            dose: p.standard_dose,
            interval: Some(p.dosing_interval),
        }
    }

    pub fn single_bolus(dose: f64) -> Self {
        Self {
            dose,
            interval: None,
        }
    }
}

/// PK/PD state of one administered antibiotic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveDrug {
    pub antibiotic: Antibiotic,
    pub regimen: DosingRegimen,
    /// Current plasma concentration (mg/L).
    pub concentration: f64,
    /// Minutes since the last dose.
    pub since_last_dose: f64,
    pub doses_given: u32,
}

impl ActiveDrug {
    /// A drug that has been prescribed but not yet given.
    pub fn prescribed(antibiotic: Antibiotic, regimen: DosingRegimen) -> Self {
        Self {
            antibiotic,
            regimen,
            concentration: 0.0,
            since_last_dose: 0.0,
            doses_given: 0,
        }
    }
}

/// Cumulative drug toxicity per organ system (0-1, saturating).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Toxicity {
    pub nephro: f64,
    pub hepato: f64,
}
