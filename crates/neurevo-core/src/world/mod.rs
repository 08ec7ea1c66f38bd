pub mod lifecycle;
pub mod metrics;
#[cfg(test)]
mod tests;

pub use metrics::*;

use crate::agent::{Agent, AgentSighting};
use crate::config::{SimConfig, SimConfigError};
use crate::genome::{Genome, MutationRates};
use crate::nn::BrainError;
use crate::obstacle::Obstacle;
use crate::resource::{Food, WaterSource};
use crate::rng::create_rng;
use crate::sensing::brain_input_size;
use crate::spatial::{ObstacleIndex, SpatialGrid};
use crate::vector::Vector2;
use rand::Rng;
use rand_chacha::ChaCha12Rng;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Attempts at finding an obstacle-free spawn point before accepting a blocked one.
const PLACEMENT_ATTEMPTS: usize = 32;

/// Monotonic id source owned by the world.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    /// Allocator whose first id is one past the largest of `used`.
    pub fn after(used: impl IntoIterator<Item = u32>) -> Self {
        let next = used
            .into_iter()
            .max()
            .map_or(0, |max| max.saturating_add(1));
        Self { next }
    }

    /// `None` once the id space is exhausted.
    pub fn next_id(&mut self) -> Option<u32> {
        if self.next == u32::MAX {
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(id)
    }

    pub fn peek(&self) -> u32 {
        self.next
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorldInitError {
    #[error(transparent)]
    Config(#[from] SimConfigError),
    #[error(transparent)]
    Brain(#[from] BrainError),
    #[error("agent {id} has a brain with {actual} inputs, config implies {expected}")]
    InputSizeMismatch {
        id: u32,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate agent id {0}")]
    DuplicateAgentId(u32),
    #[error("id space exhausted")]
    IdsExhausted,
}

pub struct World {
    pub(crate) config: SimConfig,
    pub(crate) agents: Vec<Agent>,
    pub(crate) food: Vec<Food>,
    pub(crate) water: Vec<WaterSource>,
    pub(crate) obstacles: Vec<Obstacle>,
    pub(crate) obstacle_index: ObstacleIndex,
    pub(crate) agent_grid: SpatialGrid<AgentSighting>,
    pub(crate) food_grid: SpatialGrid<Food>,
    pub(crate) rng: ChaCha12Rng,
    pub(crate) agent_ids: IdAllocator,
    pub(crate) food_ids: IdAllocator,
    pub(crate) species_ids: IdAllocator,
    /// Founder genome per species id, the reference for speciation distance.
    pub(crate) species_founders: BTreeMap<u32, Genome>,
    /// Species that random (population-floor) agents join. Its founder is never pruned.
    pub(crate) root_species: Option<u32>,
    pub(crate) mutation_rates: MutationRates,
    pub(crate) tick: u64,
    pub(crate) elapsed: f64,
    pub(crate) food_spawn_accumulator: f64,
    pub(crate) total_births: u64,
    pub(crate) total_deaths: u64,
    pub(crate) deaths_by_cause: DeathCounts,
}

/// Uniform draw in `[lo, hi]`; tolerates `lo > hi`.
fn sample_between<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    lo + (hi - lo) * rng.random::<f64>()
}

/// Vertical band index for `position`.
pub(crate) fn region_at(position: Vector2, config: &SimConfig) -> usize {
    let count = config.regions.region_count.max(1);
    let band = (position.x / config.world_width * count as f64).floor();
    if band.is_finite() {
        (band.max(0.0) as usize).min(count - 1)
    } else {
        0
    }
}

impl World {
    /// Random world generated from `config`.
    pub fn new(config: SimConfig) -> Result<Self, WorldInitError> {
        config.validate()?;
        let mut rng = create_rng(config.seed);

        let water: Vec<WaterSource> = (0..config.water_source_count)
            .map(|i| {
                let position = Vector2::new(
                    sample_between(&mut rng, 0.0, config.world_width),
                    sample_between(&mut rng, 0.0, config.world_height),
                );
                let radius = sample_between(&mut rng, config.water_radius_min, config.water_radius_max);
                WaterSource::new(i as u32, position, radius)
            })
            .collect();

        let obstacles: Vec<Obstacle> = (0..config.obstacle_count)
            .map(|i| {
                let position = Vector2::new(
                    sample_between(&mut rng, 0.0, config.world_width),
                    sample_between(&mut rng, 0.0, config.world_height),
                );
                let size = sample_between(&mut rng, config.obstacle_size_min, config.obstacle_size_max);
                if i % 2 == 0 {
                    Obstacle::circle(i as u32, position, size / 2.0)
                } else {
                    let height =
                        sample_between(&mut rng, config.obstacle_size_min, config.obstacle_size_max);
                    Obstacle::rect(i as u32, position, size, height)
                }
            })
            .collect();

        let mut world = Self::assemble(config, Vec::new(), Vec::new(), water, obstacles, rng)?;

        for _ in 0..world.config.initial_population {
            world.spawn_random_agent()?;
        }
        for _ in 0..world.config.initial_food {
            if world.spawn_food().is_none() {
                break;
            }
        }

        info!(
            agents = world.agents.len(),
            food = world.food.len(),
            water = world.water.len(),
            obstacles = world.obstacles.len(),
            brain = ?world.config.brain_kind,
            inputs = brain_input_size(&world.config),
            "world initialized"
        );
        Ok(world)
    }

    /// World built from caller-supplied parts, e.g. a restored save.
    pub fn with_parts(
        config: SimConfig,
        agents: Vec<Agent>,
        food: Vec<Food>,
        water: Vec<WaterSource>,
        obstacles: Vec<Obstacle>,
    ) -> Result<Self, WorldInitError> {
        config.validate()?;
        let expected = brain_input_size(&config);
        let mut seen = std::collections::HashSet::with_capacity(agents.len());
        for agent in &agents {
            if agent.brain.input_size() != expected {
                return Err(WorldInitError::InputSizeMismatch {
                    id: agent.id,
                    expected,
                    actual: agent.brain.input_size(),
                });
            }
            if !seen.insert(agent.id) {
                return Err(WorldInitError::DuplicateAgentId(agent.id));
            }
        }
        let rng = create_rng(config.seed);
        let world = Self::assemble(config, agents, food, water, obstacles, rng)?;
        info!(
            agents = world.agents.len(),
            food = world.food.len(),
            "world restored from parts"
        );
        Ok(world)
    }

    fn assemble(
        config: SimConfig,
        mut agents: Vec<Agent>,
        food: Vec<Food>,
        water: Vec<WaterSource>,
        obstacles: Vec<Obstacle>,
        rng: ChaCha12Rng,
    ) -> Result<Self, WorldInitError> {
        for agent in &mut agents {
            let region = region_at(agent.position, &config);
            agent.set_region(region, config.regions.modifiers(region));
        }

        let mut species_founders = BTreeMap::new();
        for agent in &agents {
            species_founders
                .entry(agent.species_id)
                .or_insert_with(|| agent.genome.clone());
        }

        let agent_ids = IdAllocator::after(agents.iter().map(|a| a.id));
        let food_ids = IdAllocator::after(food.iter().map(|f| f.id));
        let species_ids = IdAllocator::after(species_founders.keys().copied());
        let root_species = species_founders.keys().next().copied();

        Ok(Self {
            obstacle_index: ObstacleIndex::build(&obstacles),
            agent_grid: SpatialGrid::new(config.grid_cell_size),
            food_grid: SpatialGrid::new(config.grid_cell_size),
            mutation_rates: MutationRates::from(&config.mutation),
            config,
            agents,
            food,
            water,
            obstacles,
            rng,
            agent_ids,
            food_ids,
            species_ids,
            species_founders,
            root_species,
            tick: 0,
            elapsed: 0.0,
            food_spawn_accumulator: 0.0,
            total_births: 0,
            total_deaths: 0,
            deaths_by_cause: DeathCounts::default(),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, id: u32) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn food(&self) -> &[Food] {
        &self.food
    }

    pub fn water(&self) -> &[WaterSource] {
        &self.water
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn alive_agent_count(&self) -> usize {
        self.agents.iter().filter(|a| a.alive).count()
    }

    pub fn alive_food_count(&self) -> usize {
        self.food.iter().filter(|f| f.alive).count()
    }

    /// Random point whose circle of `radius` clears every obstacle, if one is found.
    pub(crate) fn sample_open_position(&mut self, radius: f64) -> Vector2 {
        let mut candidate = Vector2::ZERO;
        for _ in 0..PLACEMENT_ATTEMPTS {
            candidate = Vector2::new(
                sample_between(&mut self.rng, 0.0, self.config.world_width),
                sample_between(&mut self.rng, 0.0, self.config.world_height),
            );
            let blocked = self
                .obstacle_index
                .candidates(candidate, radius)
                .into_iter()
                .any(|i| self.obstacles[i].collides_with_circle(candidate, radius));
            if !blocked {
                break;
            }
        }
        candidate
    }

    /// Adds a generation-0 agent with a random genome to the founding species.
    pub(crate) fn spawn_random_agent(&mut self) -> Result<u32, WorldInitError> {
        let id = self.agent_ids.next_id().ok_or(WorldInitError::IdsExhausted)?;
        let radius = self.config.trait_ranges.size.max * self.config.agent_radius_scale;
        let position = self.sample_open_position(radius);
        let mut agent = Agent::random(id, position, &self.config, &mut self.rng)?;

        let species = match self.root_species {
            Some(root) => root,
            None => {
                let fresh = self.species_ids.next_id().ok_or(WorldInitError::IdsExhausted)?;
                self.species_founders.insert(fresh, agent.genome.clone());
                self.root_species = Some(fresh);
                fresh
            }
        };
        agent.species_id = species;
        let region = region_at(position, &self.config);
        agent.set_region(region, self.config.regions.modifiers(region));
        self.agents.push(agent);
        Ok(id)
    }

    /// Places one food item; `None` when food ids are exhausted.
    pub(crate) fn spawn_food(&mut self) -> Option<u32> {
        let id = self.food_ids.next_id()?;
        let position = self.sample_open_position(0.0);
        self.food.push(Food::new(id, position, self.config.food_energy));
        Some(id)
    }
}
