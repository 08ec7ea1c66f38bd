//! Continuous capability modifiers derived from body, age, internal state and
//! morphology.
//!
//! Every feature group is a pure function of [`ModulationInput`] and its own
//! config section. A disabled group returns its neutral record, so combining
//! never needs to know which groups are on.

use crate::config::{
    AgeEffectsConfig, MorphologyConfig, SimConfig, SizeEffectsConfig, StateEffectsConfig,
};
use serde::{Deserialize, Serialize};

/// Multiplicative modifiers never fall below this.
const MIN_FACTOR: f64 = 0.1;
const MAX_DAMAGE_REDUCTION: f64 = 0.9;

/// Agent state the modifier functions read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModulationInput {
    pub size: f64,
    pub agility: f64,
    pub armor: f64,
    pub age: f64,
    pub max_age: f64,
    pub energy_ratio: f64,
    pub hydration_ratio: f64,
    pub stress: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizeModifiers {
    pub attack: f64,
    pub speed: f64,
    pub turn: f64,
    pub metabolism: f64,
    pub perception: f64,
}

impl Default for SizeModifiers {
    fn default() -> Self {
        Self {
            attack: 1.0,
            speed: 1.0,
            turn: 1.0,
            metabolism: 1.0,
            perception: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeStage {
    Young,
    #[default]
    Prime,
    Decline,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgeModifiers {
    pub stage: LifeStage,
    pub speed: f64,
    pub stamina: f64,
    /// Additive attack bonus, peaks at the end of prime.
    pub experience: f64,
    pub reproduction: f64,
}

impl Default for AgeModifiers {
    fn default() -> Self {
        Self {
            stage: LifeStage::Prime,
            speed: 1.0,
            stamina: 1.0,
            experience: 0.0,
            reproduction: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateModifiers {
    pub attack: f64,
    pub effort_capacity: f64,
    pub speed: f64,
    pub stress_boost: f64,
}

impl Default for StateModifiers {
    fn default() -> Self {
        Self {
            attack: 1.0,
            effort_capacity: 1.0,
            speed: 1.0,
            stress_boost: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MorphologyModifiers {
    pub turn: f64,
    pub speed: f64,
    pub metabolism: f64,
    pub damage_reduction: f64,
}

impl Default for MorphologyModifiers {
    fn default() -> Self {
        Self {
            turn: 1.0,
            speed: 1.0,
            metabolism: 1.0,
            damage_reduction: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinedModifiers {
    pub effective_speed: f64,
    pub effective_turn_rate: f64,
    pub effective_attack: f64,
    pub effective_metabolism: f64,
    pub effective_effort_capacity: f64,
    pub perception: f64,
    pub reproduction: f64,
    pub stress_boost: f64,
    pub damage_reduction: f64,
}

impl Default for CombinedModifiers {
    fn default() -> Self {
        Self {
            effective_speed: 1.0,
            effective_turn_rate: 1.0,
            effective_attack: 1.0,
            effective_metabolism: 1.0,
            effective_effort_capacity: 1.0,
            perception: 1.0,
            reproduction: 1.0,
            stress_boost: 0.0,
            damage_reduction: 0.0,
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Larger bodies hit harder and burn more, but move and turn slower.
pub fn size_modifiers(input: &ModulationInput, cfg: &SizeEffectsConfig) -> SizeModifiers {
    if !cfg.size_effects_enabled || cfg.size_reference <= 0.0 {
        return SizeModifiers::default();
    }
    let rel = (input.size / cfg.size_reference).max(0.0);
    SizeModifiers {
        attack: rel.powf(cfg.size_attack_exponent),
        speed: (1.0 - cfg.size_speed_penalty * (rel - 1.0)).max(MIN_FACTOR),
        turn: (1.0 - cfg.size_turn_penalty * (rel - 1.0)).max(MIN_FACTOR),
        metabolism: rel.powf(cfg.size_metabolic_exponent),
        perception: (1.0 + cfg.size_perception_bonus * (rel - 1.0)).max(MIN_FACTOR),
    }
}

/// Piecewise life-stage curve over `age / max_age`.
pub fn age_modifiers(input: &ModulationInput, cfg: &AgeEffectsConfig) -> AgeModifiers {
    if !cfg.age_effects_enabled {
        return AgeModifiers::default();
    }
    let ratio = if input.max_age > 0.0 {
        (input.age / input.max_age).max(0.0)
    } else {
        1.0
    };
    let experience_ramp = if cfg.prime_end > 0.0 {
        (ratio / cfg.prime_end).min(1.0)
    } else {
        1.0
    };

    if ratio < cfg.prime_start {
        let t = if cfg.prime_start > 0.0 {
            ratio / cfg.prime_start
        } else {
            1.0
        };
        AgeModifiers {
            stage: LifeStage::Young,
            speed: lerp(cfg.young_speed_factor, 1.0, t),
            stamina: lerp(cfg.young_stamina_factor, 1.0, t),
            experience: cfg.experience_bonus_max * experience_ramp,
            reproduction: t * t,
        }
    } else if ratio <= cfg.prime_end {
        AgeModifiers {
            stage: LifeStage::Prime,
            speed: 1.0,
            stamina: 1.0,
            experience: cfg.experience_bonus_max * experience_ramp,
            reproduction: 1.0,
        }
    } else {
        let span = 1.0 - cfg.prime_end;
        let d = if span > 0.0 {
            ((ratio - cfg.prime_end) / span).min(1.0)
        } else {
            1.0
        };
        AgeModifiers {
            stage: LifeStage::Decline,
            speed: (1.0 - cfg.decline_speed_loss * d).max(MIN_FACTOR),
            stamina: (1.0 - cfg.decline_stamina_loss * d).max(MIN_FACTOR),
            experience: cfg.experience_bonus_max * (1.0 - 0.5 * d),
            reproduction: (1.0 - d).max(0.0),
        }
    }
}

/// Exhaustion, dehydration and the short-term stress boost.
pub fn state_modifiers(input: &ModulationInput, cfg: &StateEffectsConfig) -> StateModifiers {
    if !cfg.state_effects_enabled {
        return StateModifiers::default();
    }
    let mut out = StateModifiers::default();

    if cfg.exhaustion_threshold > 0.0 && input.energy_ratio < cfg.exhaustion_threshold {
        let k = (input.energy_ratio / cfg.exhaustion_threshold).clamp(0.0, 1.0);
        out.attack = lerp(cfg.exhausted_attack_floor, 1.0, k);
        out.effort_capacity = lerp(cfg.exhausted_effort_floor, 1.0, k);
    }
    if cfg.dehydration_threshold > 0.0 && input.hydration_ratio < cfg.dehydration_threshold {
        let k = (input.hydration_ratio / cfg.dehydration_threshold).clamp(0.0, 1.0);
        out.speed = lerp(cfg.dehydrated_speed_floor, 1.0, k);
    }

    let s = input.stress.clamp(0.0, 1.0);
    out.stress_boost = cfg.stress_boost_max * s * (1.0 - s * 0.5);
    out
}

/// Agility buys turning at a metabolic price; armor trades speed for protection.
pub fn morphology_modifiers(input: &ModulationInput, cfg: &MorphologyConfig) -> MorphologyModifiers {
    if !cfg.morphology_enabled {
        return MorphologyModifiers::default();
    }
    let agility = input.agility.clamp(0.0, 1.0);
    let armor = input.armor.clamp(0.0, 1.0);
    MorphologyModifiers {
        turn: 1.0 + agility * cfg.agility_turn_bonus,
        speed: (1.0 - armor * cfg.armor_speed_penalty).max(MIN_FACTOR),
        metabolism: 1.0 + agility * cfg.agility_metabolic_cost + armor * cfg.armor_metabolic_cost,
        damage_reduction: (armor * cfg.armor_damage_reduction).clamp(0.0, MAX_DAMAGE_REDUCTION),
    }
}

pub fn compute_combined_modifiers(input: &ModulationInput, config: &SimConfig) -> CombinedModifiers {
    let size = size_modifiers(input, &config.size_effects);
    let age = age_modifiers(input, &config.age_effects);
    let state = state_modifiers(input, &config.state_effects);
    let morph = morphology_modifiers(input, &config.morphology);

    CombinedModifiers {
        effective_speed: size.speed * age.speed * state.speed * morph.speed,
        effective_turn_rate: size.turn * morph.turn,
        effective_attack: size.attack * (1.0 + age.experience) * state.attack,
        effective_metabolism: size.metabolism * morph.metabolism,
        effective_effort_capacity: age.stamina * state.effort_capacity,
        perception: size.perception,
        reproduction: age.reproduction,
        stress_boost: state.stress_boost,
        damage_reduction: morph.damage_reduction,
    }
}
