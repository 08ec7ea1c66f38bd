use crate::config::{RegionModifiers, SimConfig};
use crate::genome::{Genome, GenomeLayout, Sex};
use crate::modulation::ModulationInput;
use crate::nn::{self, Brain, BrainError, BrainSnapshot, HIDDEN_SIZE, OUTPUT_SIZE};
use crate::phenotype::{Phenotype, Trait};
use crate::sensing::brain_input_size;
use crate::spatial::GridEntity;
use crate::vector::Vector2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Behavioral drives decoded from the brain's six outputs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Drives {
    /// Raw movement intent in `[-1, 1]`.
    pub move_x: f64,
    pub move_y: f64,
    /// `[0, 1]`-scaled drives.
    pub avoid: f64,
    pub attack: f64,
    pub mate: f64,
    pub effort: f64,
}

impl Drives {
    pub fn from_outputs(outputs: &[f64; OUTPUT_SIZE]) -> Self {
        let unit = |v: f64| ((v + 1.0) / 2.0).clamp(0.0, 1.0);
        Self {
            move_x: outputs[0],
            move_y: outputs[1],
            avoid: unit(outputs[2]),
            attack: unit(outputs[3]),
            mate: unit(outputs[4]),
            effort: unit(outputs[5]),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalState {
    /// `[0, 1]`.
    pub stress: f64,
    /// Effort actually applied on the last tick, `[0, 1]`.
    pub effort: f64,
    /// Exponentially decaying sum of damage taken.
    pub recent_damage: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DiseaseState {
    #[default]
    Healthy,
    Infected {
        remaining: f64,
    },
    Immune {
        remaining: f64,
    },
}

impl DiseaseState {
    pub fn is_infected(&self) -> bool {
        matches!(self, DiseaseState::Infected { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Starvation,
    Dehydration,
    OldAge,
    Predation,
    Disease,
}

/// Per-tick projection of an agent into the agent grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentSighting {
    pub id: u32,
    pub position: Vector2,
    /// Combat strength used to sign agent-sector signals.
    pub strength: f64,
    pub sex: Sex,
    pub species_id: u32,
    pub alive: bool,
    pub infected: bool,
}

impl GridEntity for AgentSighting {
    fn entity_id(&self) -> u32 {
        self.id
    }

    fn position(&self) -> Vector2 {
        self.position
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

#[derive(Clone, Debug)]
pub struct Agent {
    pub id: u32,
    pub position: Vector2,
    pub velocity: Vector2,
    pub genome: Genome,
    pub phenotype: Phenotype,
    pub brain: Brain,
    pub energy: f64,
    pub hydration: f64,
    pub health: f64,
    /// Simulated seconds lived; never decreases.
    pub age: f64,
    pub generation: u32,
    pub alive: bool,
    pub death_cause: Option<DeathCause>,
    pub species_id: u32,
    pub parents: Option<(u32, u32)>,
    pub state: InternalState,
    pub drives: Drives,
    pub region_id: usize,
    pub regional: RegionModifiers,
    pub reproduction_cooldown: f64,
    pub disease: DiseaseState,
    pub time_since_food: f64,
    pub time_since_damage: f64,
    pub time_since_mating: f64,
    /// Most recent hidden activations first.
    pub memory: VecDeque<[f64; HIDDEN_SIZE]>,
}

impl Agent {
    pub fn new(
        id: u32,
        position: Vector2,
        genome: Genome,
        brain: Brain,
        config: &SimConfig,
    ) -> Self {
        let phenotype = Phenotype::from_genome(&genome, &config.trait_ranges);
        Self {
            id,
            position,
            velocity: Vector2::ZERO,
            genome,
            phenotype,
            brain,
            energy: config.initial_energy.max(0.0).min(config.max_energy),
            hydration: config.initial_hydration.max(0.0).min(config.max_hydration),
            health: config.max_health,
            age: 0.0,
            generation: 0,
            alive: true,
            death_cause: None,
            species_id: 0,
            parents: None,
            state: InternalState::default(),
            drives: Drives::default(),
            region_id: 0,
            regional: RegionModifiers::default(),
            reproduction_cooldown: 0.0,
            disease: DiseaseState::Healthy,
            time_since_food: 0.0,
            time_since_damage: config.context.context_decay_time,
            time_since_mating: config.context.context_decay_time,
            memory: VecDeque::with_capacity(config.memory.memory_steps),
        }
    }

    /// Random genome, brain decoded from it.
    pub fn random<R: Rng + ?Sized>(
        id: u32,
        position: Vector2,
        config: &SimConfig,
        rng: &mut R,
    ) -> Result<Self, BrainError> {
        let input_size = brain_input_size(config);
        let layout = GenomeLayout::new(
            nn::weight_count(config.brain_kind, input_size),
            config.weight_init_stddev,
        );
        let genome = Genome::random(&layout, rng);
        let brain = Brain::from_genome(
            config.brain_kind,
            input_size,
            &genome,
            config.weight_init_stddev,
            rng,
        )?;
        Ok(Self::new(id, position, genome, brain, config))
    }

    pub fn sex(&self) -> Sex {
        self.genome.sex()
    }

    /// Trait value with the current region's multiplier applied.
    pub fn effective_trait(&self, t: Trait) -> f64 {
        let base = self.phenotype.get(t);
        match t {
            Trait::Speed => base * self.regional.speed,
            Trait::VisionRange => base * self.regional.vision,
            _ => base,
        }
    }

    pub fn radius(&self, config: &SimConfig) -> f64 {
        self.phenotype.get(Trait::Size) * config.agent_radius_scale
    }

    pub fn energy_ratio(&self, config: &SimConfig) -> f64 {
        (self.energy / config.max_energy).clamp(0.0, 1.0)
    }

    pub fn hydration_ratio(&self, config: &SimConfig) -> f64 {
        (self.hydration / config.max_hydration).clamp(0.0, 1.0)
    }

    pub fn health_ratio(&self, config: &SimConfig) -> f64 {
        (self.health / config.max_health).clamp(0.0, 1.0)
    }

    pub fn age_ratio(&self) -> f64 {
        let max_age = self.phenotype.get(Trait::MaxAge);
        if max_age > 0.0 {
            self.age / max_age
        } else {
            1.0
        }
    }

    /// Heading from the current velocity; 0 when stationary.
    pub fn facing(&self) -> f64 {
        if self.velocity.length_squared() > f64::EPSILON {
            self.velocity.angle()
        } else {
            0.0
        }
    }

    pub fn strength(&self) -> f64 {
        self.phenotype.get(Trait::Size) * self.phenotype.get(Trait::AttackPower)
    }

    pub fn add_energy(&mut self, amount: f64, config: &SimConfig) {
        self.energy = (self.energy + amount).max(0.0).min(config.max_energy);
    }

    pub fn add_hydration(&mut self, amount: f64, config: &SimConfig) {
        self.hydration = (self.hydration + amount).max(0.0).min(config.max_hydration);
    }

    pub fn is_ready_to_reproduce(&self, config: &SimConfig) -> bool {
        self.alive
            && self.reproduction_cooldown <= 0.0
            && self.age >= config.min_reproduction_age
            && self.energy_ratio(config) >= config.reproduction_energy_threshold
            && self.hydration_ratio(config) >= config.reproduction_hydration_threshold
    }

    /// Marks the agent dead; the first recorded cause wins.
    pub fn kill(&mut self, cause: DeathCause) {
        if self.alive {
            self.alive = false;
            self.death_cause = Some(cause);
        }
    }

    pub fn set_region(&mut self, region_id: usize, modifiers: RegionModifiers) {
        self.region_id = region_id;
        self.regional = modifiers;
    }

    /// Push the latest hidden activations, keeping at most `steps` entries.
    pub fn remember(&mut self, hidden: [f64; HIDDEN_SIZE], steps: usize) {
        if steps == 0 {
            return;
        }
        self.memory.push_front(hidden);
        self.memory.truncate(steps);
    }

    pub fn modulation_input(&self, config: &SimConfig) -> ModulationInput {
        ModulationInput {
            size: self.phenotype.get(Trait::Size),
            agility: self.phenotype.get(Trait::Agility),
            armor: self.phenotype.get(Trait::Armor),
            age: self.age,
            max_age: self.phenotype.get(Trait::MaxAge),
            energy_ratio: self.energy_ratio(config),
            hydration_ratio: self.hydration_ratio(config),
            stress: self.state.stress,
        }
    }

    pub fn sighting(&self) -> AgentSighting {
        AgentSighting {
            id: self.id,
            position: self.position,
            strength: self.strength(),
            sex: self.sex(),
            species_id: self.species_id,
            alive: self.alive,
            infected: self.disease.is_infected(),
        }
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            position: self.position,
            velocity: self.velocity,
            phenotype: self.phenotype.to_map(),
            brain: self.brain.snapshot(),
            energy: self.energy,
            hydration: self.hydration,
            health: self.health,
            age: self.age,
            generation: self.generation,
            species_id: self.species_id,
            sex: self.sex(),
            drives: self.drives,
            stress: self.state.stress,
            region_id: self.region_id,
            disease: self.disease,
            alive: self.alive,
        }
    }
}

/// Read-only per-agent view handed to rendering and persistence collaborators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: u32,
    pub position: Vector2,
    pub velocity: Vector2,
    pub phenotype: BTreeMap<String, f64>,
    pub brain: BrainSnapshot,
    pub energy: f64,
    pub hydration: f64,
    pub health: f64,
    pub age: f64,
    pub generation: u32,
    pub species_id: u32,
    pub sex: Sex,
    pub drives: Drives,
    pub stress: f64,
    pub region_id: usize,
    pub disease: DiseaseState,
    pub alive: bool,
}
