use super::*;
use crate::agent::{DeathCause, DiseaseState};
use crate::config::{BrainKind, RegionModifiers, SimConfigError};
use crate::genome::{GenomeLayout, Sex};
use crate::nn::{self, Brain, BASE_INPUT_SIZE, OUTPUT_SIZE};
use crate::phenotype::{Phenotype, Trait};
use rand::SeedableRng;

fn quiet_config() -> SimConfig {
    let mut cfg = SimConfig {
        world_width: 200.0,
        world_height: 200.0,
        initial_population: 0,
        min_population: 0,
        initial_food: 0,
        food_spawn_rate: 0.0,
        water_source_count: 0,
        obstacle_count: 0,
        ..SimConfig::default()
    };
    cfg.age_effects.age_effects_enabled = false;
    cfg
}

/// Agent whose brain ignores its inputs and emits `tanh(bias)`.
fn scripted_agent(
    id: u32,
    position: Vector2,
    cfg: &SimConfig,
    bias: [f64; OUTPUT_SIZE],
    sex: Sex,
) -> Agent {
    let mut rng = ChaCha12Rng::seed_from_u64(id as u64 + 100);
    let count = nn::weight_count(BrainKind::Fnn, BASE_INPUT_SIZE);
    let mut weights = vec![0.0; count];
    weights[count - OUTPUT_SIZE..].copy_from_slice(&bias);
    let brain = Brain::new(BrainKind::Fnn, BASE_INPUT_SIZE, &weights, &mut rng).expect("254 weights");
    let random = Genome::random(&GenomeLayout::new(count, 0.5), &mut rng);
    let genome = Genome::new(random.chromosomes().to_vec(), sex);
    let mut agent = Agent::new(id, position, genome, brain, cfg);
    agent.phenotype = Phenotype::midpoint(&cfg.trait_ranges);
    agent
}

const IDLE: [f64; OUTPUT_SIZE] = [0.0; OUTPUT_SIZE];
const MATE: [f64; OUTPUT_SIZE] = [0.0, 0.0, -5.0, -5.0, 5.0, 0.0];
const ATTACK: [f64; OUTPUT_SIZE] = [0.0, 0.0, -5.0, 5.0, -5.0, 0.0];

fn world_with(cfg: SimConfig, agents: Vec<Agent>, food: Vec<Food>, water: Vec<WaterSource>) -> World {
    World::with_parts(cfg, agents, food, water, Vec::new()).expect("valid parts")
}

#[test]
fn new_world_populates_from_config() {
    let cfg = SimConfig {
        initial_population: 12,
        initial_food: 20,
        ..SimConfig::default()
    };
    let world = World::new(cfg.clone()).expect("default config is valid");
    assert_eq!(world.agents().len(), 12);
    assert_eq!(world.food().len(), 20);
    assert_eq!(world.water().len(), cfg.water_source_count);
    assert_eq!(world.obstacles().len(), cfg.obstacle_count);
    assert!(world.agents().iter().all(|a| a.species_id == 0 && a.generation == 0));
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let cfg = SimConfig {
        world_width: 0.0,
        ..SimConfig::default()
    };
    match World::new(cfg) {
        Err(WorldInitError::Config(SimConfigError::InvalidWorldSize { .. })) => {}
        other => panic!("expected world size error, got {:?}", other.map(|w| w.tick())),
    }
}

#[test]
fn with_parts_rejects_mismatched_brains() {
    let mut cfg = quiet_config();
    let agent = scripted_agent(0, Vector2::new(10.0, 10.0), &cfg, IDLE, Sex::Female);
    cfg.memory.memory_steps = 1;
    let err = World::with_parts(cfg, vec![agent], Vec::new(), Vec::new(), Vec::new())
        .err()
        .expect("input size differs");
    assert_eq!(
        err,
        WorldInitError::InputSizeMismatch {
            id: 0,
            expected: 32,
            actual: 24
        }
    );
}

#[test]
fn same_seed_gives_identical_runs() {
    let cfg = SimConfig {
        initial_population: 30,
        ..SimConfig::default()
    };
    let mut a = World::new(cfg.clone()).expect("valid");
    let mut b = World::new(cfg.clone()).expect("valid");
    let mut sequential = World::new(SimConfig {
        parallel_decisions: false,
        ..cfg.clone()
    })
    .expect("valid");
    for _ in 0..25 {
        a.step(cfg.default_dt());
        b.step(cfg.default_dt());
        sequential.step(cfg.default_dt());
    }
    assert_eq!(a.agent_snapshots(), b.agent_snapshots());
    assert_eq!(a.agent_snapshots(), sequential.agent_snapshots());
    assert_eq!(a.stats(), sequential.stats());
}

#[test]
fn agents_stay_inside_bordered_world() {
    let cfg = SimConfig {
        initial_population: 40,
        ..SimConfig::default()
    };
    let mut world = World::new(cfg.clone()).expect("valid");
    for _ in 0..60 {
        world.step(cfg.default_dt());
        for a in world.agents() {
            assert!((0.0..=cfg.world_width).contains(&a.position.x));
            assert!((0.0..=cfg.world_height).contains(&a.position.y));
            assert!(a.energy >= 0.0 && a.energy <= cfg.max_energy);
            assert!(a.hydration >= 0.0 && a.hydration <= cfg.max_hydration);
        }
    }
}

#[test]
fn borderless_world_wraps_positions() {
    let cfg = SimConfig {
        borderless: true,
        ..quiet_config()
    };
    let mut runner = scripted_agent(0, Vector2::new(199.9, 100.0), &cfg, [5.0, 0.0, -5.0, -5.0, -5.0, 5.0], Sex::Male);
    runner.velocity = Vector2::new(3.0, 0.0);
    let mut world = world_with(cfg.clone(), vec![runner], Vec::new(), Vec::new());
    world.step(cfg.default_dt());
    let x = world.agents()[0].position.x;
    assert!((0.0..cfg.world_width).contains(&x));
    assert!(x < 10.0);
}

#[test]
fn starving_agent_dies_and_is_removed() {
    let cfg = quiet_config();
    let mut agent = scripted_agent(0, Vector2::new(50.0, 50.0), &cfg, IDLE, Sex::Female);
    agent.energy = 1e-9;
    let mut world = world_with(cfg.clone(), vec![agent], Vec::new(), Vec::new());
    let report = world.step(cfg.default_dt());
    assert_eq!(report.deaths.starvation, 1);
    assert_eq!(report.alive_agents, 0);
    assert!(world.agents().is_empty());
    assert_eq!(world.stats().deaths_by_cause.starvation, 1);
}

#[test]
fn old_age_is_a_death_cause() {
    let cfg = quiet_config();
    let mut agent = scripted_agent(0, Vector2::new(50.0, 50.0), &cfg, IDLE, Sex::Female);
    agent.age = agent.phenotype.get(Trait::MaxAge);
    let mut world = world_with(cfg.clone(), vec![agent], Vec::new(), Vec::new());
    let report = world.step(cfg.default_dt());
    assert_eq!(report.deaths.old_age, 1);
}

#[test]
fn adjacent_food_is_eaten() {
    let cfg = quiet_config();
    let agent = scripted_agent(0, Vector2::new(100.0, 100.0), &cfg, IDLE, Sex::Female);
    let food = vec![Food::new(0, Vector2::new(103.0, 100.0), 30.0)];
    let mut world = world_with(cfg.clone(), vec![agent], food, Vec::new());
    world.step(cfg.default_dt());
    assert_eq!(world.alive_food_count(), 0);
    let agent = &world.agents()[0];
    assert!(agent.energy > 99.0);
    assert!(agent.time_since_food < 0.1);
}

#[test]
fn agents_drink_inside_water() {
    let cfg = quiet_config();
    let agent = scripted_agent(0, Vector2::new(100.0, 100.0), &cfg, IDLE, Sex::Female);
    let water = vec![WaterSource::new(0, Vector2::new(100.0, 100.0), 30.0)];
    let mut world = world_with(cfg.clone(), vec![agent], Vec::new(), water);
    world.step(cfg.default_dt());
    assert!(world.agents()[0].hydration > cfg.initial_hydration);
}

#[test]
fn willing_pair_produces_offspring() {
    let cfg = quiet_config();
    let mut mother = scripted_agent(0, Vector2::new(100.0, 100.0), &cfg, MATE, Sex::Female);
    let mut father = scripted_agent(1, Vector2::new(105.0, 100.0), &cfg, MATE, Sex::Male);
    mother.age = 30.0;
    father.age = 30.0;
    father.generation = 3;
    let mut world = world_with(cfg.clone(), vec![mother, father], Vec::new(), Vec::new());

    let report = world.step(cfg.default_dt());
    assert_eq!(report.births, 1);
    assert_eq!(world.agents().len(), 3);

    let child = &world.agents()[2];
    assert_eq!(child.generation, 4);
    assert_eq!(child.parents, Some((0, 1)));
    assert_eq!(child.id, 2);
    for parent in &world.agents()[..2] {
        assert_eq!(parent.reproduction_cooldown, cfg.reproduction_cooldown - cfg.default_dt());
        assert!(parent.energy < cfg.initial_energy - cfg.reproduction_energy_cost + 1e-9);
    }
}

#[test]
fn same_sex_pairs_do_not_reproduce() {
    let cfg = quiet_config();
    let mut a = scripted_agent(0, Vector2::new(100.0, 100.0), &cfg, MATE, Sex::Female);
    let mut b = scripted_agent(1, Vector2::new(105.0, 100.0), &cfg, MATE, Sex::Female);
    a.age = 30.0;
    b.age = 30.0;
    let mut world = world_with(cfg.clone(), vec![a, b], Vec::new(), Vec::new());
    assert_eq!(world.step(cfg.default_dt()).births, 0);
}

#[test]
fn attacks_can_kill() {
    let cfg = quiet_config();
    let hunter = scripted_agent(0, Vector2::new(100.0, 100.0), &cfg, ATTACK, Sex::Female);
    let mut prey = scripted_agent(1, Vector2::new(105.0, 100.0), &cfg, IDLE, Sex::Male);
    prey.health = 0.01;
    let hunter_energy = hunter.energy;
    let mut world = world_with(cfg.clone(), vec![hunter, prey], Vec::new(), Vec::new());

    let report = world.step(cfg.default_dt());
    assert_eq!(report.deaths.predation, 1);
    assert_eq!(world.agents().len(), 1);
    assert_eq!(world.agents()[0].id, 0);
    assert!(world.agents()[0].energy > hunter_energy - 1.0);
}

#[test]
fn population_floor_and_food_cap() {
    let cfg = SimConfig {
        min_population: 5,
        max_food: 3,
        food_spawn_rate: 1000.0,
        ..quiet_config()
    };
    let mut world = world_with(cfg.clone(), Vec::new(), Vec::new(), Vec::new());
    let report = world.step(cfg.default_dt());
    assert_eq!(report.spawned_agents, 5);
    assert_eq!(world.agents().len(), 5);
    assert_eq!(report.spawned_food, 3);
    assert_eq!(world.food().len(), 3);

    let ids: Vec<u32> = world.agents().iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn spontaneous_infection_spreads_through_population() {
    let mut cfg = quiet_config();
    cfg.epidemic.epidemic_enabled = true;
    cfg.epidemic.spontaneous_infection_chance = 1e6;
    let agents = (0..4)
        .map(|i| scripted_agent(i, Vector2::new(20.0 + 30.0 * i as f64, 50.0), &cfg, IDLE, Sex::Female))
        .collect();
    let mut world = world_with(cfg.clone(), agents, Vec::new(), Vec::new());
    world.step(cfg.default_dt());
    assert_eq!(world.stats().infected, 4);
    assert!(world
        .agents()
        .iter()
        .all(|a| matches!(a.disease, DiseaseState::Infected { .. })));
}

#[test]
fn empty_world_reports_zeros() {
    let cfg = quiet_config();
    let mut world = world_with(cfg.clone(), Vec::new(), Vec::new(), Vec::new());
    let report = world.step(cfg.default_dt());
    assert_eq!(report.alive_agents, 0);
    let stats = world.stats();
    assert_eq!(stats.alive_agents, 0);
    assert_eq!(stats.mean_energy, 0.0);
    assert_eq!(stats.max_generation, 0);
    assert!(stats.species_counts.is_empty());
    assert!(world.agent_snapshots().is_empty());
}

#[test]
fn regions_apply_multipliers_at_read_time() {
    let mut cfg = quiet_config();
    cfg.regions.region_count = 2;
    cfg.regions.regions = vec![
        RegionModifiers::default(),
        RegionModifiers {
            speed: 0.5,
            vision: 2.0,
            metabolism: 1.5,
        },
    ];
    let west = scripted_agent(0, Vector2::new(50.0, 50.0), &cfg, IDLE, Sex::Female);
    let east = scripted_agent(1, Vector2::new(150.0, 50.0), &cfg, IDLE, Sex::Male);
    let world = world_with(cfg, vec![west, east], Vec::new(), Vec::new());
    let (w, e) = (&world.agents()[0], &world.agents()[1]);
    assert_eq!(w.region_id, 0);
    assert_eq!(e.region_id, 1);
    assert_eq!(e.effective_trait(Trait::Speed), e.phenotype.get(Trait::Speed) * 0.5);
    assert_eq!(e.effective_trait(Trait::VisionRange), e.phenotype.get(Trait::VisionRange) * 2.0);
    assert_eq!(w.effective_trait(Trait::Speed), w.phenotype.get(Trait::Speed));
}

#[test]
fn snapshots_serialize_to_json() {
    let cfg = SimConfig {
        initial_population: 3,
        ..SimConfig::default()
    };
    let mut world = World::new(cfg.clone()).expect("valid");
    world.step(cfg.default_dt());
    let json = serde_json::to_string(&world.agent_snapshots()).expect("snapshots serialize");
    assert!(json.contains("\"phenotype\""));
    assert!(json.contains("\"vision_range\""));
    let stats = serde_json::to_value(world.stats()).expect("stats serialize");
    assert_eq!(stats["alive_agents"], world.alive_agent_count());
}

#[test]
fn death_causes_count_once() {
    let mut counts = DeathCounts::default();
    counts.record(DeathCause::Predation);
    counts.record(DeathCause::Disease);
    assert_eq!(counts.total(), 2);
}

#[test]
fn id_allocator_continues_after_existing_ids() {
    let mut ids = IdAllocator::after([3, 9, 1]);
    assert_eq!(ids.next_id(), Some(10));
    assert_eq!(ids.peek(), 11);
    let mut exhausted = IdAllocator::after([u32::MAX - 1]);
    assert_eq!(exhausted.next_id(), None);
}

#[test]
fn mating_skips_same_sex_neighbour_for_partner_in_range() {
    let cfg = quiet_config();
    let mut initiator = scripted_agent(0, Vector2::new(100.0, 100.0), &cfg, MATE, Sex::Female);
    let mut rival = scripted_agent(1, Vector2::new(104.0, 100.0), &cfg, MATE, Sex::Female);
    let mut partner = scripted_agent(2, Vector2::new(110.0, 100.0), &cfg, IDLE, Sex::Male);
    for a in [&mut initiator, &mut rival, &mut partner] {
        a.age = 30.0;
    }
    let mut world = world_with(cfg.clone(), vec![initiator, rival, partner], Vec::new(), Vec::new());

    let report = world.step(cfg.default_dt());
    assert_eq!(report.births, 1);
    assert_eq!(world.agents()[3].parents, Some((0, 2)));
}

/// Mother and father ready to breed on the first tick.
fn breeding_pair(cfg: &SimConfig) -> Vec<Agent> {
    let mut mother = scripted_agent(0, Vector2::new(100.0, 100.0), cfg, MATE, Sex::Female);
    let mut father = scripted_agent(1, Vector2::new(105.0, 100.0), cfg, MATE, Sex::Male);
    mother.age = 30.0;
    father.age = 30.0;
    vec![mother, father]
}

#[test]
fn divergent_offspring_found_a_new_species() {
    let cfg = SimConfig {
        speciation_threshold: 0.0,
        ..quiet_config()
    };
    let mut world = world_with(cfg.clone(), breeding_pair(&cfg), Vec::new(), Vec::new());
    assert_eq!(world.step(cfg.default_dt()).births, 1);

    let child = &world.agents()[2];
    assert_eq!(child.species_id, 1);
    assert!(world.species_founders.contains_key(&1));
    assert_eq!(world.stats().species_counts.get(&0), Some(&2));
    assert_eq!(world.stats().species_counts.get(&1), Some(&1));
}

#[test]
fn close_offspring_inherit_initiator_species() {
    let cfg = SimConfig {
        speciation_threshold: 1.0,
        ..quiet_config()
    };
    let mut world = world_with(cfg.clone(), breeding_pair(&cfg), Vec::new(), Vec::new());
    assert_eq!(world.step(cfg.default_dt()).births, 1);
    assert_eq!(world.agents()[2].species_id, 0);
    assert_eq!(world.species_founders.len(), 1);
}

#[test]
fn armor_reduces_combat_damage() {
    let cfg = quiet_config();
    let mut agents = Vec::new();
    for (pair, armor) in [(0u32, 1.0), (1, 0.0)] {
        let x = 20.0 + 130.0 * pair as f64;
        let hunter = scripted_agent(pair * 2, Vector2::new(x, 100.0), &cfg, ATTACK, Sex::Female);
        let mut target = scripted_agent(pair * 2 + 1, Vector2::new(x + 5.0, 100.0), &cfg, IDLE, Sex::Male);
        target.phenotype = target.phenotype.clone().with(Trait::Armor, armor, &cfg.trait_ranges);
        target.health = 50.0;
        agents.push(hunter);
        agents.push(target);
    }
    let mut world = world_with(cfg.clone(), agents, Vec::new(), Vec::new());
    world.step(cfg.default_dt());

    let armored = world.agent(1).expect("armored target survives");
    let bare = world.agent(3).expect("bare target survives");
    assert!(bare.health < 50.0);
    assert!(armored.health > bare.health);
    assert!(armored.state.recent_damage < bare.state.recent_damage);
}

#[test]
fn recurrent_brains_run_in_a_full_world() {
    let cfg = SimConfig {
        brain_kind: BrainKind::Rnn,
        initial_population: 20,
        ..SimConfig::default()
    };
    let mut world = World::new(cfg.clone()).expect("valid");
    for _ in 0..10 {
        world.step(cfg.default_dt());
    }
    assert!(world
        .agents()
        .iter()
        .all(|a| a.brain.kind() == BrainKind::Rnn && a.brain.input_size() == BASE_INPUT_SIZE));
    assert!(world.agents().iter().all(|a| a.position.is_finite()));
    assert!(world.stats().mean_energy.is_finite());
}

#[test]
fn extinct_species_founders_are_pruned() {
    let cfg = quiet_config();
    let root = scripted_agent(0, Vector2::new(50.0, 50.0), &cfg, IDLE, Sex::Female);
    let mut doomed = scripted_agent(1, Vector2::new(150.0, 150.0), &cfg, IDLE, Sex::Male);
    doomed.species_id = 5;
    doomed.energy = 1e-9;
    let mut world = world_with(cfg.clone(), vec![root, doomed], Vec::new(), Vec::new());
    assert_eq!(world.species_founders.len(), 2);

    world.step(cfg.default_dt());
    assert!(!world.species_founders.contains_key(&5));
    assert!(world.species_founders.contains_key(&0));

    world.agents[0].energy = 1e-9;
    world.step(cfg.default_dt());
    assert!(world.agents().is_empty());
    assert!(world.species_founders.contains_key(&0));
}
