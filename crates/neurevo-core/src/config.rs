use crate::phenotype::Trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrainKind {
    /// 24 → 8 (tanh) → 6 (tanh).
    #[default]
    #[serde(alias = "FNN", alias = "feedforward")]
    Fnn,
    /// Feed-forward plus an 8×8 hidden-to-hidden matrix and persistent state.
    #[serde(alias = "RNN", alias = "recurrent")]
    Rnn,
}

/// Inclusive `[min, max]` clamp range for one phenotype trait.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraitRange {
    pub min: f64,
    pub max: f64,
}

impl TraitRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Map a normalized expression value onto the range, clamped.
    pub fn map(&self, normalized: f64) -> f64 {
        self.clamp(self.min + normalized * (self.max - self.min))
    }

    /// Clamp into the range. An inverted range (`min > max`) collapses to `max`
    /// rather than panicking; `SimConfig::validate` rejects such ranges up front.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraitRanges {
    pub size: TraitRange,
    pub speed: TraitRange,
    pub vision_range: TraitRange,
    pub max_age: TraitRange,
    pub agility: TraitRange,
    pub armor: TraitRange,
    pub attack_power: TraitRange,
    pub disease_resistance: TraitRange,
}

impl Default for TraitRanges {
    fn default() -> Self {
        Self {
            size: TraitRange::new(0.5, 2.0),
            speed: TraitRange::new(1.0, 5.0),
            vision_range: TraitRange::new(40.0, 160.0),
            max_age: TraitRange::new(120.0, 600.0),
            agility: TraitRange::new(0.0, 1.0),
            armor: TraitRange::new(0.0, 1.0),
            attack_power: TraitRange::new(0.5, 3.0),
            disease_resistance: TraitRange::new(0.0, 1.0),
        }
    }
}

impl TraitRanges {
    pub fn get(&self, t: Trait) -> TraitRange {
        match t {
            Trait::Size => self.size,
            Trait::Speed => self.speed,
            Trait::VisionRange => self.vision_range,
            Trait::MaxAge => self.max_age,
            Trait::Agility => self.agility,
            Trait::Armor => self.armor,
            Trait::AttackPower => self.attack_power,
            Trait::DiseaseResistance => self.disease_resistance,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MutationConfig {
    /// Per-allele probability of a value mutation.
    pub mutation_rate: f64,
    pub point_mutation_stddev: f64,
    /// Chance that a value mutation is a large jump instead of a point step.
    pub large_mutation_chance: f64,
    pub large_mutation_stddev: f64,
    /// Per-allele probability of flipping dominance `d -> 1 - d`.
    pub dominance_mutation_rate: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            mutation_rate: 0.05,
            point_mutation_stddev: 0.1,
            large_mutation_chance: 0.05,
            large_mutation_stddev: 0.5,
            dominance_mutation_rate: 0.01,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SizeEffectsConfig {
    pub size_effects_enabled: bool,
    /// Body size treated as neutral (all size modifiers equal 1).
    pub size_reference: f64,
    pub size_attack_exponent: f64,
    pub size_speed_penalty: f64,
    pub size_turn_penalty: f64,
    pub size_metabolic_exponent: f64,
    pub size_perception_bonus: f64,
}

impl Default for SizeEffectsConfig {
    fn default() -> Self {
        Self {
            size_effects_enabled: true,
            size_reference: 1.0,
            size_attack_exponent: 1.5,
            size_speed_penalty: 0.3,
            size_turn_penalty: 0.3,
            size_metabolic_exponent: 1.3,
            size_perception_bonus: 0.15,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgeEffectsConfig {
    pub age_effects_enabled: bool,
    /// Fraction of `max_age` where prime begins.
    pub prime_start: f64,
    /// Fraction of `max_age` where decline begins.
    pub prime_end: f64,
    pub young_speed_factor: f64,
    pub young_stamina_factor: f64,
    pub decline_speed_loss: f64,
    pub decline_stamina_loss: f64,
    pub experience_bonus_max: f64,
}

impl Default for AgeEffectsConfig {
    fn default() -> Self {
        Self {
            age_effects_enabled: true,
            prime_start: 0.2,
            prime_end: 0.7,
            young_speed_factor: 0.8,
            young_stamina_factor: 0.8,
            decline_speed_loss: 0.4,
            decline_stamina_loss: 0.5,
            experience_bonus_max: 0.25,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateEffectsConfig {
    pub state_effects_enabled: bool,
    /// Energy ratio below which attack and effort capacity degrade.
    pub exhaustion_threshold: f64,
    pub exhausted_attack_floor: f64,
    pub exhausted_effort_floor: f64,
    /// Hydration ratio below which speed degrades.
    pub dehydration_threshold: f64,
    pub dehydrated_speed_floor: f64,
    pub stress_boost_max: f64,
}

impl Default for StateEffectsConfig {
    fn default() -> Self {
        Self {
            state_effects_enabled: true,
            exhaustion_threshold: 0.3,
            exhausted_attack_floor: 0.5,
            exhausted_effort_floor: 0.4,
            dehydration_threshold: 0.3,
            dehydrated_speed_floor: 0.6,
            stress_boost_max: 0.3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MorphologyConfig {
    pub morphology_enabled: bool,
    pub agility_turn_bonus: f64,
    pub agility_metabolic_cost: f64,
    pub armor_damage_reduction: f64,
    pub armor_speed_penalty: f64,
    pub armor_metabolic_cost: f64,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            morphology_enabled: true,
            agility_turn_bonus: 0.5,
            agility_metabolic_cost: 0.2,
            armor_damage_reduction: 0.6,
            armor_speed_penalty: 0.3,
            armor_metabolic_cost: 0.25,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensoryNoiseConfig {
    pub sensory_noise_enabled: bool,
    pub sensory_noise_stddev: f64,
    pub sector_dropout_chance: f64,
}

impl Default for SensoryNoiseConfig {
    fn default() -> Self {
        Self {
            sensory_noise_enabled: false,
            sensory_noise_stddev: 0.05,
            sector_dropout_chance: 0.05,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextSignalsConfig {
    /// Appends hunger/safety/mating-receptivity inputs.
    pub context_signals_enabled: bool,
    /// Seconds after which a time-since-event signal saturates at 1.
    pub context_decay_time: f64,
}

impl Default for ContextSignalsConfig {
    fn default() -> Self {
        Self {
            context_signals_enabled: false,
            context_decay_time: 30.0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of past hidden states appended to the brain input (0 disables).
    pub memory_steps: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EpidemicConfig {
    pub epidemic_enabled: bool,
    /// Per-second chance a healthy agent falls ill on its own.
    pub spontaneous_infection_chance: f64,
    pub transmission_radius: f64,
    /// Per-second chance of catching the disease from one infected neighbor.
    pub transmission_chance: f64,
    pub infection_duration: f64,
    pub immunity_duration: f64,
    pub disease_energy_drain: f64,
    /// Per-second chance an infected agent dies.
    pub disease_lethality: f64,
}

impl Default for EpidemicConfig {
    fn default() -> Self {
        Self {
            epidemic_enabled: false,
            spontaneous_infection_chance: 0.0005,
            transmission_radius: 20.0,
            transmission_chance: 0.2,
            infection_duration: 20.0,
            immunity_duration: 60.0,
            disease_energy_drain: 1.0,
            disease_lethality: 0.005,
        }
    }
}

/// Read-time multipliers for one vertical band of the world.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionModifiers {
    pub speed: f64,
    pub vision: f64,
    pub metabolism: f64,
}

impl Default for RegionModifiers {
    fn default() -> Self {
        Self {
            speed: 1.0,
            vision: 1.0,
            metabolism: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionsConfig {
    pub region_count: usize,
    /// Band `k` uses `regions[k]`; missing entries are neutral.
    pub regions: Vec<RegionModifiers>,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            region_count: 1,
            regions: Vec::new(),
        }
    }
}

impl RegionsConfig {
    pub fn modifiers(&self, region_id: usize) -> RegionModifiers {
        self.regions.get(region_id).copied().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Deterministic seed for reproducible simulation runs.
    pub seed: u64,
    pub world_width: f64,
    pub world_height: f64,
    /// Toroidal wraparound instead of hard clamping at the world edge.
    pub borderless: bool,
    /// Ticks per simulated second; positions advance by `velocity * dt * tick_rate`.
    pub tick_rate: f64,
    /// Edge length of a spatial grid cell.
    pub grid_cell_size: f64,
    /// Run the sensing + brain phase across threads.
    pub parallel_decisions: bool,

    pub brain_kind: BrainKind,
    pub brain_noise_enabled: bool,
    pub brain_noise_stddev: f64,
    /// Stddev for random brain weights and synthesized missing genes.
    pub weight_init_stddev: f64,

    pub initial_population: usize,
    /// Random agents are spawned whenever the population falls below this.
    pub min_population: usize,
    pub max_population: usize,
    pub initial_food: usize,
    pub max_food: usize,
    /// Food items spawned per simulated second.
    pub food_spawn_rate: f64,
    pub food_energy: f64,
    pub water_source_count: usize,
    pub water_radius_min: f64,
    pub water_radius_max: f64,
    pub obstacle_count: usize,
    pub obstacle_size_min: f64,
    pub obstacle_size_max: f64,

    /// Body radius = `size * agent_radius_scale`.
    pub agent_radius_scale: f64,
    pub max_energy: f64,
    pub initial_energy: f64,
    pub max_hydration: f64,
    pub initial_hydration: f64,
    pub max_health: f64,
    pub health_regen_rate: f64,
    pub base_metabolic_rate: f64,
    pub movement_cost: f64,
    pub hydration_drain_rate: f64,
    pub drink_rate: f64,
    pub eat_radius: f64,
    pub stress_decay_rate: f64,
    pub stress_from_damage: f64,
    pub recent_damage_decay: f64,

    /// Maximum velocity change per tick before turn-rate modulation.
    pub steering_force: f64,
    /// Speed fraction at zero effort.
    pub min_effort_factor: f64,
    pub avoid_threshold: f64,
    /// Floor on squared distance for inverse-square sensing weights.
    pub sensing_min_distance: f64,

    pub attack_range: f64,
    /// Damage per second at full attack modulation.
    pub attack_damage: f64,
    pub predation_energy_fraction: f64,

    pub mating_range: f64,
    pub reproduction_energy_threshold: f64,
    pub reproduction_hydration_threshold: f64,
    pub min_reproduction_age: f64,
    pub reproduction_cooldown: f64,
    pub reproduction_energy_cost: f64,
    pub offspring_spawn_radius: f64,
    pub crossover_rate: f64,
    /// Trait distance from the species founder that starts a new species.
    pub speciation_threshold: f64,

    pub trait_ranges: TraitRanges,
    #[serde(flatten)]
    pub mutation: MutationConfig,
    #[serde(flatten)]
    pub size_effects: SizeEffectsConfig,
    #[serde(flatten)]
    pub age_effects: AgeEffectsConfig,
    #[serde(flatten)]
    pub state_effects: StateEffectsConfig,
    #[serde(flatten)]
    pub morphology: MorphologyConfig,
    #[serde(flatten)]
    pub sensory_noise: SensoryNoiseConfig,
    #[serde(flatten)]
    pub context: ContextSignalsConfig,
    #[serde(flatten)]
    pub memory: MemoryConfig,
    #[serde(flatten)]
    pub epidemic: EpidemicConfig,
    #[serde(flatten)]
    pub regions: RegionsConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            world_width: 1000.0,
            world_height: 800.0,
            borderless: false,
            tick_rate: 30.0,
            grid_cell_size: 80.0,
            parallel_decisions: true,
            brain_kind: BrainKind::Fnn,
            brain_noise_enabled: false,
            brain_noise_stddev: 0.05,
            weight_init_stddev: 0.5,
            initial_population: 60,
            min_population: 10,
            max_population: 400,
            initial_food: 150,
            max_food: 300,
            food_spawn_rate: 5.0,
            food_energy: 30.0,
            water_source_count: 4,
            water_radius_min: 30.0,
            water_radius_max: 60.0,
            obstacle_count: 6,
            obstacle_size_min: 20.0,
            obstacle_size_max: 60.0,
            agent_radius_scale: 5.0,
            max_energy: 100.0,
            initial_energy: 70.0,
            max_hydration: 100.0,
            initial_hydration: 70.0,
            max_health: 100.0,
            health_regen_rate: 2.0,
            base_metabolic_rate: 1.0,
            movement_cost: 1.5,
            hydration_drain_rate: 1.2,
            drink_rate: 25.0,
            eat_radius: 4.0,
            stress_decay_rate: 0.2,
            stress_from_damage: 0.05,
            recent_damage_decay: 0.5,
            steering_force: 0.5,
            min_effort_factor: 0.3,
            avoid_threshold: 0.6,
            sensing_min_distance: 1.0,
            attack_range: 12.0,
            attack_damage: 20.0,
            predation_energy_fraction: 0.5,
            mating_range: 15.0,
            reproduction_energy_threshold: 0.6,
            reproduction_hydration_threshold: 0.5,
            min_reproduction_age: 20.0,
            reproduction_cooldown: 15.0,
            reproduction_energy_cost: 20.0,
            offspring_spawn_radius: 10.0,
            crossover_rate: 0.7,
            speciation_threshold: 0.25,
            trait_ranges: TraitRanges::default(),
            mutation: MutationConfig::default(),
            size_effects: SizeEffectsConfig::default(),
            age_effects: AgeEffectsConfig::default(),
            state_effects: StateEffectsConfig::default(),
            morphology: MorphologyConfig::default(),
            sensory_noise: SensoryNoiseConfig::default(),
            context: ContextSignalsConfig::default(),
            memory: MemoryConfig::default(),
            epidemic: EpidemicConfig::default(),
            regions: RegionsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimConfigError {
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("world dimensions must be positive and finite (got {width} x {height})")]
    InvalidWorldSize { width: f64, height: f64 },
    #[error("grid_cell_size must be positive and finite")]
    InvalidCellSize,
    #[error("tick_rate must be positive and finite")]
    InvalidTickRate,
    #[error("{name} must lie in [0, 1] (got {value})")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("trait range `{name}` is invalid: [{min}, {max}]")]
    InvalidTraitRange { name: &'static str, min: f64, max: f64 },
    #[error("life stages require 0 <= prime_start < prime_end <= 1 (got {start}, {end})")]
    InvalidLifeStages { start: f64, end: f64 },
    #[error("max_energy, max_hydration and max_health must be positive")]
    InvalidCapacity,
    #[error("region_count must be at least 1")]
    InvalidRegionCount,
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SimConfigError> {
        serde_json::from_str(json).map_err(|e| SimConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), SimConfigError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.world_width) || !positive(self.world_height) {
            return Err(SimConfigError::InvalidWorldSize {
                width: self.world_width,
                height: self.world_height,
            });
        }
        if !positive(self.grid_cell_size) {
            return Err(SimConfigError::InvalidCellSize);
        }
        if !positive(self.tick_rate) {
            return Err(SimConfigError::InvalidTickRate);
        }
        if !positive(self.max_energy) || !positive(self.max_hydration) || !positive(self.max_health)
        {
            return Err(SimConfigError::InvalidCapacity);
        }
        if self.regions.region_count == 0 {
            return Err(SimConfigError::InvalidRegionCount);
        }

        let probabilities = [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation.mutation_rate),
            ("large_mutation_chance", self.mutation.large_mutation_chance),
            ("dominance_mutation_rate", self.mutation.dominance_mutation_rate),
            ("sector_dropout_chance", self.sensory_noise.sector_dropout_chance),
            ("reproduction_energy_threshold", self.reproduction_energy_threshold),
            ("reproduction_hydration_threshold", self.reproduction_hydration_threshold),
            ("exhaustion_threshold", self.state_effects.exhaustion_threshold),
            ("dehydration_threshold", self.state_effects.dehydration_threshold),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimConfigError::InvalidProbability { name, value });
            }
        }

        for t in Trait::ALL {
            let range = self.trait_ranges.get(t);
            if !range.is_valid() {
                return Err(SimConfigError::InvalidTraitRange {
                    name: t.name(),
                    min: range.min,
                    max: range.max,
                });
            }
        }

        let ages = &self.age_effects;
        if !(0.0 <= ages.prime_start && ages.prime_start < ages.prime_end && ages.prime_end <= 1.0)
        {
            return Err(SimConfigError::InvalidLifeStages {
                start: ages.prime_start,
                end: ages.prime_end,
            });
        }
        Ok(())
    }

    /// Simulated seconds covered by a single tick.
    pub fn default_dt(&self) -> f64 {
        1.0 / self.tick_rate
    }
}
