use serde::{Deserialize, Serialize};

/// Macro-circulation, owned by the physiology engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardiovascularState {
    /// Beats per minute.
    pub heart_rate: f64,
    /// mL per beat.
    pub stroke_volume: f64,
    /// L/min.
    pub cardiac_output: f64,
    /// dyn·s/cm^5.
    pub systemic_vascular_resistance: f64,
    /// Smooth-muscle tone (1 = baseline, lower = vasodilated).
    pub arterial_tone: f64,
    /// mmHg.
    pub mean_arterial_pressure: f64,
    /// mL O2/min.
    pub oxygen_delivery: f64,
    /// Fraction of tissue under oxygen debt (0-1).
    pub tissue_hypoxia: f64,
}

impl Default for CardiovascularState {
    fn default() -> Self {
        let heart_rate = 75.0;
        let stroke_volume = 70.0;
        let cardiac_output = heart_rate * stroke_volume / 1000.0;
        let svr = 1100.0;
        Self {
            heart_rate,
            stroke_volume,
            cardiac_output,
            systemic_vascular_resistance: svr,
            arterial_tone: 1.0,
            mean_arterial_pressure: cardiac_output * svr / 80.0 + 5.0,
            oxygen_delivery: 1000.0,
            tissue_hypoxia: 0.0,
        }
    }
}

/// Blood flow properties. Viscosity and flow feed each other one step apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodRheology {
    /// Packed cell volume fraction.
    pub hematocrit: f64,
    /// Apparent viscosity (cP).
    pub viscosity: f64,
    /// Bulk flow velocity through the modelled segment (µm/min).
    pub flow_rate: f64,
    /// Obstruction from clots (0-1).
    pub clot_load: f64,
    /// Obstruction from lipid deposits (0-1).
    pub deposit_load: f64,
}

impl Default for BloodRheology {
    fn default() -> Self {
        Self {
            hematocrit: 0.45,
            viscosity: 3.5,
            flow_rate: 600.0,
            clot_load: 0.0,
            deposit_load: 0.0,
        }
    }
}
