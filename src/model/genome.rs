use rand::Rng;
use serde::{Deserialize, Serialize};

use super::antibiotic::AntibioticClass;
use super::species::SpeciesProfile;

/// Toxins a bacterium can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToxinKind {
    /// Lipopolysaccharide; strong cytokine inducer.
    Endotoxin,
    /// Secreted protein toxins; direct tissue damage.
    Exotoxin,
    /// Lyses red cells, lowering hematocrit.
    Hemolysin,
}

impl ToxinKind {
    pub const COUNT: usize = 3;
    pub const ALL: [ToxinKind; Self::COUNT] =
        [ToxinKind::Endotoxin, ToxinKind::Exotoxin, ToxinKind::Hemolysin];

    pub fn index(self) -> usize {
        match self {
            ToxinKind::Endotoxin => 0,
            ToxinKind::Exotoxin => 1,
            ToxinKind::Hemolysin => 2,
        }
    }
}

/// Surface structures relevant to host interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceStructure {
    /// Polysaccharide capsule; hinders phagocytosis and phage adsorption.
    Capsule,
    /// Adhesion pili; contact partner for plasmid conjugation.
    Pili,
    /// Motility.
    Flagella,
    /// Extracellular matrix; shields against drugs and phagocytes.
    Biofilm,
}

impl SurfaceStructure {
    pub const COUNT: usize = 4;
    pub const ALL: [SurfaceStructure; Self::COUNT] = [
        SurfaceStructure::Capsule,
        SurfaceStructure::Pili,
        SurfaceStructure::Flagella,
        SurfaceStructure::Biofilm,
    ];

    pub fn index(self) -> usize {
        match self {
            SurfaceStructure::Capsule => 0,
            SurfaceStructure::Pili => 1,
            SurfaceStructure::Flagella => 2,
            SurfaceStructure::Biofilm => 3,
        }
    }
}

/// What a genome position encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "trait", content = "of", rename_all = "snake_case")]
pub enum Locus {
    Resistance(AntibioticClass),
    Toxin(ToxinKind),
    Surface(SurfaceStructure),
    GrowthRate,
}

impl Locus {
    /// Fixed position of this locus inside every genome.
    fn slot(self) -> usize {
        match self {
            Locus::Resistance(class) => class.index(),
            Locus::Toxin(kind) => AntibioticClass::COUNT + kind.index(),
            Locus::Surface(s) => AntibioticClass::COUNT + ToxinKind::COUNT + s.index(),
            Locus::GrowthRate => GENOME_LEN - 1,
        }
    }
}

const GENOME_LEN: usize = AntibioticClass::COUNT + ToxinKind::COUNT + SurfaceStructure::COUNT + 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allele {
    pub locus: Locus,
    /// Expression level, always within `[0, 1]`.
    pub value: f64,
}

/// Outcome of one round of replication mutations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MutationSummary {
    pub mutated_loci: u32,
    /// Sum of absolute changes on surface loci (antigenic drift).
    pub surface_drift: f64,
}

/// Ordered sequence of trait loci; the single source of truth for a
/// bacterium's resistance, toxin and surface phenotype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    alleles: Vec<Allele>,
}

impl Genome {
    pub fn from_profile(profile: &SpeciesProfile) -> Self {
        let mut alleles = Vec::with_capacity(GENOME_LEN);
        for class in AntibioticClass::ALL {
            alleles.push(Allele {
                locus: Locus::Resistance(class),
                value: profile.intrinsic_resistance[class.index()],
            });
        }
        for kind in ToxinKind::ALL {
            alleles.push(Allele {
                locus: Locus::Toxin(kind),
                value: profile.toxins[kind.index()],
            });
        }
        for s in SurfaceStructure::ALL {
            alleles.push(Allele {
                locus: Locus::Surface(s),
                value: profile.surface[s.index()],
            });
        }
        alleles.push(Allele {
            locus: Locus::GrowthRate,
            value: 0.5,
        });
        debug_assert_eq!(alleles.len(), GENOME_LEN);
        Self { alleles }
    }

    pub fn alleles(&self) -> &[Allele] {
        &self.alleles
    }

    pub fn get(&self, locus: Locus) -> f64 {
        self.alleles[locus.slot()].value
    }

    pub fn set(&mut self, locus: Locus, value: f64) {
        let v = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        self.alleles[locus.slot()].value = v;
    }

    pub fn resistance(&self, class: AntibioticClass) -> f64 {
        self.get(Locus::Resistance(class))
    }

    pub fn resistance_profile(&self) -> [f64; AntibioticClass::COUNT] {
        AntibioticClass::ALL.map(|c| self.resistance(c))
    }

    pub fn toxin_level(&self, kind: ToxinKind) -> f64 {
        self.get(Locus::Toxin(kind))
    }

    pub fn produces(&self, kind: ToxinKind) -> bool {
        self.toxin_level(kind) >= 0.5
    }

    pub fn surface(&self, structure: SurfaceStructure) -> f64 {
        self.get(Locus::Surface(structure))
    }

    /// Fraction of phagocytic capture attempts the surface defeats.
    pub fn evasion_factor(&self) -> f64 {
        let capsule = self.surface(SurfaceStructure::Capsule);
        let biofilm = self.surface(SurfaceStructure::Biofilm);
        (0.6 * capsule + 0.25 * biofilm).min(0.9)
    }

    /// Replication-speed multiplier encoded by the growth locus (0.5..1.5).
    pub fn growth_multiplier(&self) -> f64 {
        0.5 + self.get(Locus::GrowthRate)
    }

    /// Apply independent per-locus mutations of up to `step` in either direction.
    pub fn mutate(&mut self, rng: &mut dyn rand::RngCore, rate: f64, step: f64) -> MutationSummary {
        let mut summary = MutationSummary::default();
        if rate <= 0.0 || step <= 0.0 {
            return summary;
        }
        for allele in &mut self.alleles {
            if rng.random::<f64>() >= rate {
                continue;
            }
            let before = allele.value;
            allele.value = (before + rng.random_range(-step..=step)).clamp(0.0, 1.0);
            summary.mutated_loci += 1;
            if matches!(allele.locus, Locus::Surface(_)) {
                summary.surface_drift += (allele.value - before).abs();
            }
        }
        summary
    }

    /// Move each resistance locus a `fraction` of the way toward the donor's
    /// value where the donor is more resistant. Returns whether anything changed.
    pub fn acquire_resistance(&mut self, donor: &Genome, fraction: f64) -> bool {
        let fraction = fraction.clamp(0.0, 1.0);
        let mut changed = false;
        for class in AntibioticClass::ALL {
            let mine = self.resistance(class);
            let theirs = donor.resistance(class);
            if theirs > mine {
                self.set(Locus::Resistance(class), mine + fraction * (theirs - mine));
                changed = true;
            }
        }
        changed
    }
}
