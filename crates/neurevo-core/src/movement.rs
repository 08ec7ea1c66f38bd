use crate::agent::{Agent, AgentSighting, Drives};
use crate::config::SimConfig;
use crate::modulation::{compute_combined_modifiers, CombinedModifiers};
use crate::obstacle::Obstacle;
use crate::phenotype::Trait;
use crate::sensing::{self, SensingView};
use crate::spatial::ObstacleIndex;
use crate::vector::Vector2;
use rand::Rng;
use std::f64::consts::TAU;

pub const MAX_PUSH_PASSES: usize = 3;
/// Attack and mate drives act above this level.
pub const DRIVE_THRESHOLD: f64 = 0.5;

/// Output of the read-only decision phase for one agent.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub drives: Drives,
    pub modifiers: CombinedModifiers,
    pub nearest_agent: Option<AgentSighting>,
    /// Closest visible agent of the opposite sex; the target of mating.
    pub nearest_mate: Option<AgentSighting>,
    /// Push direction used when collision geometry gives none.
    pub fallback_direction: Vector2,
}

/// Static geometry the commit phase collides against.
#[derive(Clone, Copy)]
pub struct Terrain<'a> {
    pub obstacles: &'a [Obstacle],
    pub index: &'a ObstacleIndex,
}

/// Sense, run the brain, and decode drives.
///
/// Touches only the agent's own brain, drives and memory, so agents can
/// decide concurrently against the same frozen `view`.
pub fn decide<R: Rng + ?Sized>(agent: &mut Agent, view: &SensingView<'_>, rng: &mut R) -> Decision {
    let config = view.config;
    let modifiers = compute_combined_modifiers(&agent.modulation_input(config), config);
    let perception = sensing::sense(agent, &modifiers, view, rng);

    let outputs = if config.brain_noise_enabled {
        agent
            .brain
            .forward_with_noise(&perception.inputs, rng, config.brain_noise_stddev)
    } else {
        agent.brain.forward(&perception.inputs)
    };
    let drives = Drives::from_outputs(&outputs);
    agent.drives = drives;
    agent.remember(agent.brain.hidden_activations(), config.memory.memory_steps);

    Decision {
        drives,
        modifiers,
        nearest_agent: perception.nearest_agent,
        nearest_mate: perception.nearest_mate,
        fallback_direction: Vector2::from_angle(rng.random_range(0.0..TAU)),
    }
}

/// Raw move intent biased away from the nearest agent, or toward the prey or
/// mate the stronger drive points at. The result has length at most 1.
pub fn desired_direction(agent: &Agent, decision: &Decision, config: &SimConfig) -> Vector2 {
    let drives = &decision.drives;
    let mut direction = Vector2::new(drives.move_x, drives.move_y);
    let toward = |other: &AgentSighting| (other.position - agent.position).normalized();

    if drives.avoid > config.avoid_threshold {
        if let Some(threat) = &decision.nearest_agent {
            direction -= toward(threat) * drives.avoid;
        }
        return direction.clamp_length(1.0);
    }

    let prey = decision
        .nearest_agent
        .as_ref()
        .filter(|_| drives.attack > DRIVE_THRESHOLD)
        .map(|other| (other, drives.attack));
    let mate = decision
        .nearest_mate
        .as_ref()
        .filter(|_| drives.mate > DRIVE_THRESHOLD)
        .map(|other| (other, drives.mate));
    let target = match (prey, mate) {
        (Some(p), Some(m)) => Some(if m.1 > p.1 { m } else { p }),
        (p, m) => p.or(m),
    };
    if let Some((other, pull)) = target {
        direction += toward(other) * pull;
    }
    direction.clamp_length(1.0)
}

/// Fraction of top speed the agent is willing to spend this tick.
pub fn effort_factor(effort: f64, modifiers: &CombinedModifiers, config: &SimConfig) -> f64 {
    let effort = effort.clamp(0.0, 1.0);
    let scaled = config.min_effort_factor + (1.0 - config.min_effort_factor) * effort;
    scaled.min(modifiers.effective_effort_capacity) * (1.0 + modifiers.stress_boost)
}

/// Apply a decision: steer, integrate, collide, and keep the agent in bounds.
pub fn commit(agent: &mut Agent, decision: &Decision, terrain: &Terrain<'_>, config: &SimConfig, dt: f64) {
    let modifiers = &decision.modifiers;
    let effort = effort_factor(decision.drives.effort, modifiers, config);
    agent.state.effort = decision.drives.effort.clamp(0.0, 1.0);

    let max_speed = agent.effective_trait(Trait::Speed) * effort * modifiers.effective_speed;
    let desired = desired_direction(agent, decision, config) * max_speed;
    let steering_limit = config.steering_force * modifiers.effective_turn_rate * dt * config.tick_rate;
    let steering = (desired - agent.velocity).clamp_length(steering_limit);
    agent.velocity = (agent.velocity + steering).clamp_length(max_speed);

    let mut position = agent.position + agent.velocity * (dt * config.tick_rate);
    let mut velocity = agent.velocity;
    resolve_obstacle_collisions(
        &mut position,
        &mut velocity,
        agent.radius(config),
        terrain,
        decision.fallback_direction,
    );
    apply_boundary(&mut position, &mut velocity, config);

    if position.is_finite() && velocity.is_finite() {
        agent.position = position;
        agent.velocity = velocity;
    } else {
        agent.velocity = Vector2::ZERO;
    }
}

/// Iterative push-out against nearby obstacles. Returns whether any push was applied;
/// velocity is halved once when it was.
pub fn resolve_obstacle_collisions(
    position: &mut Vector2,
    velocity: &mut Vector2,
    radius: f64,
    terrain: &Terrain<'_>,
    fallback: Vector2,
) -> bool {
    let mut corrected = false;
    for _ in 0..MAX_PUSH_PASSES {
        let mut pushed = false;
        for i in terrain.index.candidates(*position, radius) {
            let obstacle = &terrain.obstacles[i];
            if !obstacle.collides_with_circle(*position, radius) {
                continue;
            }
            let mut push = obstacle.get_push_vector(*position, radius);
            if push.length_squared() <= f64::EPSILON {
                let dir = [(-*velocity).normalized(), fallback.normalized()]
                    .into_iter()
                    .find(|d| d.length_squared() > 0.0)
                    .unwrap_or(Vector2::DOWN);
                push = dir * radius.max(1.0);
            }
            *position += push;
            pushed = true;
        }
        if !pushed {
            break;
        }
        corrected = true;
    }
    if corrected {
        *velocity *= 0.5;
    }
    corrected
}

/// Toroidal wrap into `[0, size)`. Idempotent.
pub fn wrap_coordinate(value: f64, size: f64) -> f64 {
    let wrapped = value.rem_euclid(size);
    if wrapped >= size {
        0.0
    } else {
        wrapped
    }
}

/// Clamp (bordered) or wrap (borderless) into the world rectangle.
pub fn apply_boundary(position: &mut Vector2, velocity: &mut Vector2, config: &SimConfig) {
    let (w, h) = (config.world_width, config.world_height);
    if config.borderless {
        position.x = wrap_coordinate(position.x, w);
        position.y = wrap_coordinate(position.y, h);
        return;
    }
    if position.x < 0.0 || position.x > w {
        position.x = position.x.clamp(0.0, w);
        velocity.x = 0.0;
    }
    if position.y < 0.0 || position.y > h {
        position.y = position.y.clamp(0.0, h);
        velocity.y = 0.0;
    }
}
