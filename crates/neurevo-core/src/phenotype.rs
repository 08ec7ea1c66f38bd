use crate::config::TraitRanges;
use crate::genome::Genome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trait {
    Size,
    Speed,
    VisionRange,
    MaxAge,
    Agility,
    Armor,
    AttackPower,
    DiseaseResistance,
}

impl Trait {
    pub const ALL: [Trait; 8] = [
        Trait::Size,
        Trait::Speed,
        Trait::VisionRange,
        Trait::MaxAge,
        Trait::Agility,
        Trait::Armor,
        Trait::AttackPower,
        Trait::DiseaseResistance,
    ];

    /// Gene name on the trait chromosome, also the key in exported phenotype maps.
    pub const fn name(self) -> &'static str {
        match self {
            Trait::Size => "size",
            Trait::Speed => "speed",
            Trait::VisionRange => "vision_range",
            Trait::MaxAge => "max_age",
            Trait::Agility => "agility",
            Trait::Armor => "armor",
            Trait::AttackPower => "attack_power",
            Trait::DiseaseResistance => "disease_resistance",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Range-clamped trait values, fixed at agent creation.
///
/// Regional multipliers are never folded in here; see `Agent::effective_trait`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Phenotype {
    values: [f64; Trait::ALL.len()],
}

impl Phenotype {
    /// Express each trait gene (normalized `[0, 1]`) onto its configured range.
    /// A missing trait gene expresses as the range midpoint.
    pub fn from_genome(genome: &Genome, ranges: &TraitRanges) -> Self {
        let mut values = [0.0; Trait::ALL.len()];
        for t in Trait::ALL {
            let normalized = genome.express(t.name()).unwrap_or(0.5);
            values[t.index()] = ranges.get(t).map(normalized);
        }
        Self { values }
    }

    /// Every trait at the midpoint of its range.
    pub fn midpoint(ranges: &TraitRanges) -> Self {
        let mut values = [0.0; Trait::ALL.len()];
        for t in Trait::ALL {
            values[t.index()] = ranges.get(t).map(0.5);
        }
        Self { values }
    }

    /// Override one trait, clamped to its range.
    pub fn with(mut self, t: Trait, value: f64, ranges: &TraitRanges) -> Self {
        self.values[t.index()] = ranges.get(t).clamp(value);
        self
    }

    pub fn get(&self, t: Trait) -> f64 {
        self.values[t.index()]
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        Trait::ALL
            .iter()
            .map(|&t| (t.name().to_string(), self.get(t)))
            .collect()
    }
}
