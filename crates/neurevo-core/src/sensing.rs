//! Brain input assembly.
//!
//! Layout of the base vector (24 values):
//!
//! | range   | contents                                          |
//! |---------|---------------------------------------------------|
//! | 0..5    | food sectors                                      |
//! | 5..10   | water sectors                                     |
//! | 10..15  | agent sectors, `+` weaker / `-` stronger           |
//! | 15..20  | energy, hydration, age, stress, health ratios      |
//! | 20..22  | forward / lateral velocity                        |
//! | 22..24  | normalized size / speed                           |
//!
//! followed by the optional context signals and the flattened memory.
//!
//! Facing is taken from velocity, so the lateral component (input 21) stays
//! near zero; it is kept to preserve the fixed 24-input layout.

use crate::agent::{Agent, AgentSighting};
use crate::config::{SimConfig, TraitRange};
use crate::modulation::CombinedModifiers;
use crate::nn::{BASE_INPUT_SIZE, HIDDEN_SIZE};
use crate::phenotype::Trait;
use crate::resource::{Food, WaterSource};
use crate::spatial::SpatialGrid;
use crate::vector::Vector2;
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::TAU;

pub const SECTOR_COUNT: usize = 5;
pub const SECTOR_ANGLE: f64 = TAU / SECTOR_COUNT as f64;
pub const CONTEXT_SIGNAL_COUNT: usize = 3;

const FOOD_OFFSET: usize = 0;
const WATER_OFFSET: usize = FOOD_OFFSET + SECTOR_COUNT;
const AGENT_OFFSET: usize = WATER_OFFSET + SECTOR_COUNT;
const SECTOR_SIGNALS: usize = AGENT_OFFSET + SECTOR_COUNT;

/// Input count implied by the enabled context and memory features.
pub fn brain_input_size(config: &SimConfig) -> usize {
    let context = if config.context.context_signals_enabled {
        CONTEXT_SIGNAL_COUNT
    } else {
        0
    };
    BASE_INPUT_SIZE + context + config.memory.memory_steps * HIDDEN_SIZE
}

/// Sector index of `angle` relative to `facing`. Sector 0 is centered on the
/// facing direction; indices increase counter-clockwise in world coordinates.
pub fn angle_to_sector(angle: f64, facing: f64) -> usize {
    let relative = (angle - facing + SECTOR_ANGLE / 2.0).rem_euclid(TAU);
    ((relative / SECTOR_ANGLE) as usize).min(SECTOR_COUNT - 1)
}

/// Frozen world state an agent can perceive during the decision phase.
#[derive(Clone, Copy)]
pub struct SensingView<'a> {
    pub agents: &'a SpatialGrid<AgentSighting>,
    pub food: &'a SpatialGrid<Food>,
    pub water: &'a [WaterSource],
    pub config: &'a SimConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Perception {
    pub inputs: Vec<f64>,
    /// Nearest other living agent within vision.
    pub nearest_agent: Option<AgentSighting>,
    /// Nearest living agent of the opposite sex within vision.
    pub nearest_mate: Option<AgentSighting>,
    pub vision_range: f64,
}

struct SectorAccumulator {
    signals: [f64; SECTOR_COUNT],
    min_distance_sq: f64,
    origin: Vector2,
    facing: f64,
}

impl SectorAccumulator {
    fn new(origin: Vector2, facing: f64, min_distance: f64) -> Self {
        Self {
            signals: [0.0; SECTOR_COUNT],
            min_distance_sq: (min_distance * min_distance).max(f64::EPSILON),
            origin,
            facing,
        }
    }

    /// Inverse-square weighted contribution toward `target`.
    fn add(&mut self, target: Vector2, distance_sq: f64, strength: f64) {
        let sector = angle_to_sector((target - self.origin).angle(), self.facing);
        self.signals[sector] += strength / distance_sq.max(self.min_distance_sq);
    }

    /// Scale so the strongest sector has magnitude 1.
    fn normalized(mut self) -> [f64; SECTOR_COUNT] {
        let peak = self.signals.iter().fold(0.0f64, |m, s| m.max(s.abs()));
        if peak > 0.0 {
            for s in &mut self.signals {
                *s /= peak;
            }
        }
        self.signals
    }
}

fn normalize_in_range(value: f64, range: TraitRange) -> f64 {
    let span = range.max - range.min;
    if span > 0.0 {
        ((value - range.min) / span).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

fn context_ratio(elapsed: f64, decay_time: f64) -> f64 {
    if decay_time > 0.0 {
        (elapsed / decay_time).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Ties resolve to the lower id.
fn keep_closer(best: &mut Option<(AgentSighting, f64)>, candidate: &AgentSighting, d_sq: f64) {
    let closer = match best {
        None => true,
        Some((current, best_sq)) => {
            d_sq < *best_sq || (d_sq == *best_sq && candidate.id < current.id)
        }
    };
    if closer {
        *best = Some((*candidate, d_sq));
    }
}

/// Build the brain input vector for `agent` from the frozen `view`.
pub fn sense<R: Rng + ?Sized>(
    agent: &Agent,
    modifiers: &CombinedModifiers,
    view: &SensingView<'_>,
    rng: &mut R,
) -> Perception {
    let config = view.config;
    let origin = agent.position;
    let facing = agent.facing();
    let vision = agent.effective_trait(Trait::VisionRange) * modifiers.perception;
    let min_distance = config.sensing_min_distance;

    let mut food = SectorAccumulator::new(origin, facing, min_distance);
    view.food
        .for_each_in_radius(origin, vision, None, |item, d_sq| food.add(item.position, d_sq, 1.0));

    let mut water = SectorAccumulator::new(origin, facing, min_distance);
    for source in view.water {
        let edge = source.edge_distance(origin);
        if edge <= vision {
            water.add(source.position, edge * edge, 1.0);
        }
    }

    let own_strength = agent.strength();
    let own_sex = agent.sex();
    let mut others = SectorAccumulator::new(origin, facing, min_distance);
    let mut nearest: Option<(AgentSighting, f64)> = None;
    let mut nearest_mate: Option<(AgentSighting, f64)> = None;
    view.agents
        .for_each_in_radius(origin, vision, Some(agent.id), |other, d_sq| {
            let sign = if other.strength < own_strength { 1.0 } else { -1.0 };
            others.add(other.position, d_sq, sign);
            keep_closer(&mut nearest, other, d_sq);
            if other.sex != own_sex {
                keep_closer(&mut nearest_mate, other, d_sq);
            }
        });

    let mut inputs = Vec::with_capacity(brain_input_size(config));
    inputs.extend(food.normalized());
    inputs.extend(water.normalized());
    inputs.extend(others.normalized());

    if config.sensory_noise.sensory_noise_enabled {
        let noise = &config.sensory_noise;
        for signal in &mut inputs[..SECTOR_SIGNALS] {
            if rng.random::<f64>() < noise.sector_dropout_chance {
                *signal = 0.0;
            } else {
                let z: f64 = rng.sample(StandardNormal);
                *signal = (*signal + z * noise.sensory_noise_stddev).clamp(-1.0, 1.0);
            }
        }
    }

    let heading = Vector2::from_angle(facing);
    let lateral_axis = Vector2::new(-heading.y, heading.x);
    let speed_scale = config.trait_ranges.speed.max.max(f64::EPSILON);
    inputs.extend([
        agent.energy_ratio(config),
        agent.hydration_ratio(config),
        agent.age_ratio().clamp(0.0, 1.0),
        agent.state.stress.clamp(0.0, 1.0),
        agent.health_ratio(config),
        (agent.velocity.dot(heading) / speed_scale).clamp(-1.0, 1.0),
        (agent.velocity.dot(lateral_axis) / speed_scale).clamp(-1.0, 1.0),
        normalize_in_range(agent.phenotype.get(Trait::Size), config.trait_ranges.size),
        normalize_in_range(agent.phenotype.get(Trait::Speed), config.trait_ranges.speed),
    ]);

    if config.context.context_signals_enabled {
        let decay = config.context.context_decay_time;
        inputs.extend([
            context_ratio(agent.time_since_food, decay),
            context_ratio(agent.time_since_damage, decay),
            context_ratio(agent.time_since_mating, decay),
        ]);
    }

    for step in 0..config.memory.memory_steps {
        match agent.memory.get(step) {
            Some(hidden) => inputs.extend_from_slice(hidden),
            None => inputs.extend([0.0; HIDDEN_SIZE]),
        }
    }

    Perception {
        inputs,
        nearest_agent: nearest.map(|(sighting, _)| sighting),
        nearest_mate: nearest_mate.map(|(sighting, _)| sighting),
        vision_range: vision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{Genome, GenomeLayout, Sex};
    use crate::nn::{self, Brain};
    use crate::phenotype::Phenotype;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use std::f64::consts::PI;

    fn test_agent(id: u32, position: Vector2, config: &SimConfig) -> Agent {
        let mut rng = ChaCha12Rng::seed_from_u64(id as u64);
        let input_size = brain_input_size(config);
        let count = nn::weight_count(config.brain_kind, input_size);
        let genome = Genome::random(&GenomeLayout::new(count, 0.5), &mut rng);
        let brain = Brain::new(config.brain_kind, input_size, &vec![0.0; count], &mut rng)
            .expect("weight count matches");
        let mut agent = Agent::new(id, position, genome, brain, config);
        agent.phenotype = Phenotype::midpoint(&config.trait_ranges)
            .with(Trait::Speed, 3.0, &config.trait_ranges)
            .with(Trait::VisionRange, 100.0, &config.trait_ranges);
        agent
    }

    fn small_world() -> SimConfig {
        SimConfig {
            world_width: 10.0,
            world_height: 10.0,
            grid_cell_size: 5.0,
            ..SimConfig::default()
        }
    }

    fn view<'a>(
        agents: &'a SpatialGrid<AgentSighting>,
        food: &'a SpatialGrid<Food>,
        water: &'a [WaterSource],
        config: &'a SimConfig,
    ) -> SensingView<'a> {
        SensingView {
            agents,
            food,
            water,
            config,
        }
    }

    #[test]
    fn front_sector_is_centered_on_facing() {
        assert_eq!(angle_to_sector(0.0, 0.0), 0);
        assert_eq!(angle_to_sector(SECTOR_ANGLE / 2.0 - 1e-9, 0.0), 0);
        assert_eq!(angle_to_sector(-SECTOR_ANGLE / 2.0 + 1e-9, 0.0), 0);
        assert_eq!(angle_to_sector(SECTOR_ANGLE / 2.0 + 1e-9, 0.0), 1);
        assert_eq!(angle_to_sector(-SECTOR_ANGLE / 2.0 - 1e-9, 0.0), 4);
        assert_eq!(angle_to_sector(PI / 2.0, PI / 2.0), 0);
        assert_eq!(angle_to_sector(5.0 * PI / 6.0, 0.0), 2);
    }

    #[test]
    fn input_size_grows_with_features() {
        let mut cfg = SimConfig::default();
        assert_eq!(brain_input_size(&cfg), 24);
        cfg.context.context_signals_enabled = true;
        cfg.memory.memory_steps = 2;
        assert_eq!(brain_input_size(&cfg), 24 + 3 + 16);
    }

    #[test]
    fn food_ahead_lights_front_sector_only() {
        let cfg = small_world();
        let agent = test_agent(1, Vector2::new(5.0, 5.0), &cfg);
        let agents = SpatialGrid::new(cfg.grid_cell_size);
        let mut food = SpatialGrid::new(cfg.grid_cell_size);
        food.insert(Food::new(0, Vector2::new(6.0, 5.0), 30.0));

        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let p = sense(
            &agent,
            &CombinedModifiers::default(),
            &view(&agents, &food, &[], &cfg),
            &mut rng,
        );
        assert_eq!(p.inputs.len(), 24);
        assert_eq!(p.inputs[0], 1.0);
        assert_eq!(p.inputs[2], 0.0);
        assert_eq!(p.inputs[3], 0.0);
        assert!(p.nearest_agent.is_none());
    }

    #[test]
    fn agent_signals_are_signed_by_strength() {
        let cfg = SimConfig::default();
        let me = test_agent(1, Vector2::new(100.0, 100.0), &cfg);

        let mut weak = test_agent(2, Vector2::new(110.0, 100.0), &cfg);
        weak.phenotype = weak.phenotype.clone().with(Trait::Size, 0.5, &cfg.trait_ranges);
        let mut strong = test_agent(3, Vector2::new(90.0, 100.0), &cfg);
        strong.phenotype = strong.phenotype.clone().with(Trait::Size, 2.0, &cfg.trait_ranges);

        let mut agents = SpatialGrid::new(cfg.grid_cell_size);
        agents.rebuild([me.sighting(), weak.sighting(), strong.sighting()]);
        let food = SpatialGrid::new(cfg.grid_cell_size);

        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let p = sense(
            &me,
            &CombinedModifiers::default(),
            &view(&agents, &food, &[], &cfg),
            &mut rng,
        );
        assert_eq!(p.inputs[AGENT_OFFSET], 1.0);
        let behind = angle_to_sector((strong.position - me.position).angle(), 0.0);
        assert_eq!(p.inputs[AGENT_OFFSET + behind], -1.0);
        assert_eq!(p.nearest_agent.map(|s| s.id), Some(2));
    }

    #[test]
    fn nearest_mate_skips_same_sex_neighbours() {
        let cfg = SimConfig::default();
        let with_sex = |agent: Agent, sex: Sex| Agent {
            genome: Genome::new(agent.genome.chromosomes().to_vec(), sex),
            ..agent
        };
        let me = with_sex(test_agent(1, Vector2::new(100.0, 100.0), &cfg), Sex::Female);
        let rival = with_sex(test_agent(2, Vector2::new(104.0, 100.0), &cfg), Sex::Female);
        let suitor = with_sex(test_agent(3, Vector2::new(110.0, 100.0), &cfg), Sex::Male);

        let mut agents = SpatialGrid::new(cfg.grid_cell_size);
        agents.rebuild([me.sighting(), rival.sighting(), suitor.sighting()]);
        let food = SpatialGrid::new(cfg.grid_cell_size);
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let p = sense(
            &me,
            &CombinedModifiers::default(),
            &view(&agents, &food, &[], &cfg),
            &mut rng,
        );
        assert_eq!(p.nearest_agent.map(|s| s.id), Some(2));
        assert_eq!(p.nearest_mate.map(|s| s.id), Some(3));
    }

    #[test]
    fn water_uses_edge_distance_and_closer_sources_dominate() {
        let cfg = SimConfig::default();
        let agent = test_agent(1, Vector2::new(100.0, 100.0), &cfg);
        let water = [
            WaterSource::new(0, Vector2::new(100.0, 150.0), 30.0),
            WaterSource::new(1, Vector2::new(100.0, 20.0), 30.0),
        ];
        let agents = SpatialGrid::new(cfg.grid_cell_size);
        let food = SpatialGrid::new(cfg.grid_cell_size);
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let p = sense(
            &agent,
            &CombinedModifiers::default(),
            &view(&agents, &food, &water, &cfg),
            &mut rng,
        );
        let below = WATER_OFFSET + angle_to_sector(PI / 2.0, 0.0);
        let above = WATER_OFFSET + angle_to_sector(-PI / 2.0, 0.0);
        assert_eq!(p.inputs[below], 1.0);
        assert!(p.inputs[above] > 0.0 && p.inputs[above] < 1.0);
    }

    #[test]
    fn context_and_memory_extend_inputs() {
        let mut cfg = SimConfig::default();
        cfg.context.context_signals_enabled = true;
        cfg.context.context_decay_time = 10.0;
        cfg.memory.memory_steps = 2;
        let mut agent = test_agent(1, Vector2::new(50.0, 50.0), &cfg);
        agent.time_since_food = 5.0;
        agent.time_since_damage = 50.0;
        agent.time_since_mating = 0.0;
        agent.remember([0.25; HIDDEN_SIZE], 2);

        let agents = SpatialGrid::new(cfg.grid_cell_size);
        let food = SpatialGrid::new(cfg.grid_cell_size);
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let p = sense(
            &agent,
            &CombinedModifiers::default(),
            &view(&agents, &food, &[], &cfg),
            &mut rng,
        );
        assert_eq!(p.inputs.len(), brain_input_size(&cfg));
        assert_eq!(&p.inputs[24..27], &[0.5, 1.0, 0.0]);
        assert!(p.inputs[27..35].iter().all(|&v| v == 0.25));
        assert!(p.inputs[35..43].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn noisy_sectors_stay_bounded() {
        let mut cfg = SimConfig::default();
        cfg.sensory_noise.sensory_noise_enabled = true;
        cfg.sensory_noise.sensory_noise_stddev = 2.0;
        let agent = test_agent(1, Vector2::new(50.0, 50.0), &cfg);
        let agents = SpatialGrid::new(cfg.grid_cell_size);
        let mut food = SpatialGrid::new(cfg.grid_cell_size);
        food.insert(Food::new(0, Vector2::new(60.0, 50.0), 30.0));
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        for _ in 0..20 {
            let p = sense(
                &agent,
                &CombinedModifiers::default(),
                &view(&agents, &food, &[], &cfg),
                &mut rng,
            );
            assert!(p.inputs[..SECTOR_SIGNALS].iter().all(|v| (-1.0..=1.0).contains(v)));
        }
    }
}
