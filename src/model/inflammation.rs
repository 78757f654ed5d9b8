use serde::{Deserialize, Serialize};

use super::physiology::CardiovascularState;
use super::vec3::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CytokineKind {
    TnfAlpha,
    Il1,
    Il6,
    /// Anti-inflammatory; damps recruitment.
    Il10,
}

impl CytokineKind {
    pub const COUNT: usize = 4;
    pub const ALL: [CytokineKind; Self::COUNT] = [
        CytokineKind::TnfAlpha,
        CytokineKind::Il1,
        CytokineKind::Il6,
        CytokineKind::Il10,
    ];
    pub const PRO_INFLAMMATORY: [CytokineKind; 3] =
        [CytokineKind::TnfAlpha, CytokineKind::Il1, CytokineKind::Il6];

    pub fn index(self) -> usize {
        match self {
            CytokineKind::TnfAlpha => 0,
            CytokineKind::Il1 => 1,
            CytokineKind::Il6 => 2,
            CytokineKind::Il10 => 3,
        }
    }
}

/// Index of one cell of the cytokine grid. A lookup key, never a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldCell(pub usize);

/// Coarse cubic grid of cytokine concentrations (pg/mL) spanning the world.
#[derive(Debug, Clone, PartialEq)]
pub struct CytokineField {
    resolution: usize,
    min: Vec3,
    cell_size: Vec3,
    levels: Vec<[f64; CytokineKind::COUNT]>,
}

impl CytokineField {
    pub fn new(min: Vec3, max: Vec3, resolution: usize) -> Self {
        let resolution = resolution.max(1);
        let n = resolution as f64;
        let extent = max - min;
        Self {
            resolution,
            min,
            cell_size: Vec3::new(
                (extent.x / n).max(f64::EPSILON),
                (extent.y / n).max(f64::EPSILON),
                (extent.z / n).max(f64::EPSILON),
            ),
            levels: vec![[0.0; CytokineKind::COUNT]; resolution * resolution * resolution],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn cell_count(&self) -> usize {
        self.levels.len()
    }

    fn axis(&self, value: f64, min: f64, size: f64) -> usize {
        let i = ((value - min) / size).floor();
        if i.is_finite() && i > 0.0 {
            (i as usize).min(self.resolution - 1)
        } else {
            0
        }
    }

    /// Grid cell containing `p`; points outside the grid map to the nearest edge cell.
    pub fn cell_of(&self, p: Vec3) -> FieldCell {
        let ix = self.axis(p.x, self.min.x, self.cell_size.x);
        let iy = self.axis(p.y, self.min.y, self.cell_size.y);
        let iz = self.axis(p.z, self.min.z, self.cell_size.z);
        FieldCell((iz * self.resolution + iy) * self.resolution + ix)
    }

    fn coords(&self, cell: FieldCell) -> (usize, usize, usize) {
        let r = self.resolution;
        (cell.0 % r, (cell.0 / r) % r, cell.0 / (r * r))
    }

    pub fn center_of(&self, cell: FieldCell) -> Vec3 {
        let (ix, iy, iz) = self.coords(cell);
        Vec3::new(
            self.min.x + (ix as f64 + 0.5) * self.cell_size.x,
            self.min.y + (iy as f64 + 0.5) * self.cell_size.y,
            self.min.z + (iz as f64 + 0.5) * self.cell_size.z,
        )
    }

    pub fn cell_half_extent(&self) -> Vec3 {
        self.cell_size * 0.5
    }

    pub fn level(&self, cell: FieldCell, kind: CytokineKind) -> f64 {
        self.levels
            .get(cell.0)
            .map(|l| l[kind.index()])
            .unwrap_or(0.0)
    }

    pub fn emit(&mut self, cell: FieldCell, kind: CytokineKind, amount: f64) {
        if amount <= 0.0 || !amount.is_finite() {
            return;
        }
        if let Some(l) = self.levels.get_mut(cell.0) {
            l[kind.index()] += amount;
        }
    }

    /// Sum of pro-inflammatory cytokines in a cell.
    pub fn pro_inflammatory(&self, cell: FieldCell) -> f64 {
        CytokineKind::PRO_INFLAMMATORY
            .iter()
            .map(|k| self.level(cell, *k))
            .sum()
    }

    /// Cell with the highest pro-inflammatory load. Ties resolve to the
    /// lowest index so the result is deterministic.
    pub fn hottest_cell(&self) -> (FieldCell, f64) {
        let mut best = (FieldCell(0), f64::NEG_INFINITY);
        for i in 0..self.levels.len() {
            let v = self.pro_inflammatory(FieldCell(i));
            if v > best.1 {
                best = (FieldCell(i), v);
            }
        }
        (best.0, best.1.max(0.0))
    }

    /// Whole-body concentration of each cytokine (mean over cells).
    pub fn mean_levels(&self) -> [f64; CytokineKind::COUNT] {
        let mut totals = [0.0; CytokineKind::COUNT];
        for l in &self.levels {
            for (t, v) in totals.iter_mut().zip(l) {
                *t += v;
            }
        }
        let n = self.levels.len() as f64;
        totals.map(|t| t / n)
    }

    /// Exchange with the six face neighbours, then decay exponentially.
    ///
    /// The exchange is pairwise symmetric, so diffusion alone conserves the
    /// total amount of each cytokine.
    pub fn step(&mut self, dt: f64, diffusion: f64, decay_rate: f64) {
        let mix = (diffusion * dt).clamp(0.0, 1.0) / 6.0;
        let keep = (-decay_rate.max(0.0) * dt).exp();
        if mix > 0.0 && self.resolution > 1 {
            let r = self.resolution;
            let old = self.levels.clone();
            for (i, level) in self.levels.iter_mut().enumerate() {
                let (x, y, z) = (i % r, (i / r) % r, i / (r * r));
                let mut neighbours = Vec::with_capacity(6);
                if x > 0 {
                    neighbours.push(i - 1);
                }
                if x + 1 < r {
                    neighbours.push(i + 1);
                }
                if y > 0 {
                    neighbours.push(i - r);
                }
                if y + 1 < r {
                    neighbours.push(i + r);
                }
                if z > 0 {
                    neighbours.push(i - r * r);
                }
                if z + 1 < r {
                    neighbours.push(i + r * r);
                }
                for j in neighbours {
                    for k in 0..CytokineKind::COUNT {
                        level[k] += mix * (old[j][k] - old[i][k]);
                    }
                }
            }
        }
        for level in &mut self.levels {
            for v in level.iter_mut() {
                *v = (*v * keep).max(0.0);
            }
        }
    }
}

/// Whole-body cytokine concentrations reported to collaborators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CytokineLevels {
    pub tnf_alpha: f64,
    pub il1: f64,
    pub il6: f64,
    pub il10: f64,
}

impl CytokineLevels {
    pub fn from_array(levels: [f64; CytokineKind::COUNT]) -> Self {
        Self {
            tnf_alpha: levels[CytokineKind::TnfAlpha.index()],
            il1: levels[CytokineKind::Il1.index()],
            il6: levels[CytokineKind::Il6.index()],
            il10: levels[CytokineKind::Il10.index()],
        }
    }

    pub fn total(&self) -> f64 {
        self.tnf_alpha + self.il1 + self.il6 + self.il10
    }

    pub fn pro_inflammatory(&self) -> f64 {
        self.tnf_alpha + self.il1 + self.il6
    }
}

/// Cumulative organ injury (0-1 per organ). Only ever increases within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganDamage {
    pub renal: f64,
    pub hepatic: f64,
    pub cardiac: f64,
    pub pulmonary: f64,
}

impl OrganDamage {
    /// Add non-negative injury to each organ; negative or non-finite inputs are ignored.
    pub fn accumulate(&mut self, renal: f64, hepatic: f64, cardiac: f64, pulmonary: f64) {
        fn bump(slot: &mut f64, amount: f64) {
            if amount.is_finite() && amount > 0.0 {
                *slot = (*slot + amount).min(1.0);
            }
        }
        bump(&mut self.renal, renal);
        bump(&mut self.hepatic, hepatic);
        bump(&mut self.cardiac, cardiac);
        bump(&mut self.pulmonary, pulmonary);
    }

    pub fn mean(&self) -> f64 {
        (self.renal + self.hepatic + self.cardiac + self.pulmonary) / 4.0
    }

    pub fn worst(&self) -> f64 {
        self.renal
            .max(self.hepatic)
            .max(self.cardiac)
            .max(self.pulmonary)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SepsisStage {
    #[default]
    None,
    Sirs,
    Sepsis,
    SevereSepsis,
    SepticShock,
}

/// Bedside picture derived from the engine state each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientVitals {
    pub heart_rate: f64,
    /// mmHg.
    pub mean_arterial_pressure: f64,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Breaths per minute.
    pub respiratory_rate: f64,
    /// mmol/L.
    pub lactate: f64,
    /// 10^9 cells/L.
    pub white_cell_count: f64,
    pub cytokines: CytokineLevels,
    pub organ_damage: OrganDamage,
    pub sepsis_score: f64,
    pub stage: SepsisStage,
}

impl Default for PatientVitals {
    fn default() -> Self {
        let cv = CardiovascularState::default();
        Self {
            heart_rate: cv.heart_rate,
            mean_arterial_pressure: cv.mean_arterial_pressure,
            temperature: 37.0,
            respiratory_rate: 14.0,
            lactate: 1.0,
            white_cell_count: 7.0,
            cytokines: CytokineLevels::default(),
            organ_damage: OrganDamage::default(),
            sepsis_score: 0.0,
            stage: SepsisStage::None,
        }
    }
}
