use super::metrics::{DeathCounts, StepReport, StepTimings};
use super::{region_at, World};
use crate::agent::{Agent, AgentSighting, DeathCause, DiseaseState};
use crate::genome::Genome;
use crate::movement::{self, Decision, Terrain, DRIVE_THRESHOLD};
use crate::nn::Brain;
use crate::phenotype::Trait;
use crate::rng::derive_agent_rng;
use crate::sensing::{brain_input_size, SensingView};
use crate::spatial::SpatialGrid;
use crate::vector::Vector2;
use rand::Rng;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;
use std::time::Instant;
use tracing::{debug, trace, warn};

impl World {
    /// Project the surviving population and food into fresh grids.
    fn rebuild_grids(&mut self) {
        self.agent_grid
            .rebuild(self.agents.iter().filter(|a| a.alive).map(Agent::sighting));
        self.food_grid
            .rebuild(self.food.iter().filter(|f| f.alive).cloned());
    }

    /// Read-only sensing and brain pass against the frozen grids.
    fn step_decision_phase(&mut self) -> Vec<Decision> {
        let view = SensingView {
            agents: &self.agent_grid,
            food: &self.food_grid,
            water: &self.water,
            config: &self.config,
        };
        let (seed, tick) = (self.config.seed, self.tick);
        let decide = |agent: &mut Agent| {
            let mut rng = derive_agent_rng(seed, tick, agent.id);
            movement::decide(agent, &view, &mut rng)
        };
        if self.config.parallel_decisions {
            self.agents.par_iter_mut().map(decide).collect()
        } else {
            self.agents.iter_mut().map(decide).collect()
        }
    }

    fn step_commit_phase(&mut self, decisions: &[Decision], dt: f64) {
        let terrain = Terrain {
            obstacles: &self.obstacles,
            index: &self.obstacle_index,
        };
        for (agent, decision) in self.agents.iter_mut().zip(decisions) {
            movement::commit(agent, decision, &terrain, &self.config, dt);
            let region = region_at(agent.position, &self.config);
            if region != agent.region_id {
                agent.set_region(region, self.config.regions.modifiers(region));
            }
        }
    }

    fn step_feeding_phase(&mut self, dt: f64) {
        let food_index: HashMap<u32, usize> =
            self.food.iter().enumerate().map(|(i, f)| (f.id, i)).collect();

        for agent in self.agents.iter_mut().filter(|a| a.alive) {
            let reach = self.config.eat_radius + agent.radius(&self.config);
            let mut best: Option<(f64, u32)> = None;
            self.food_grid
                .for_each_in_radius(agent.position, reach, None, |item, d_sq| {
                    let available = food_index
                        .get(&item.id)
                        .is_some_and(|&i| self.food[i].alive);
                    let closer = best.is_none_or(|(best_sq, best_id)| {
                        d_sq < best_sq || (d_sq == best_sq && item.id < best_id)
                    });
                    if available && closer {
                        best = Some((d_sq, item.id));
                    }
                });
            if let Some(&i) = best.and_then(|(_, id)| food_index.get(&id)) {
                self.food[i].alive = false;
                agent.add_energy(self.food[i].energy, &self.config);
                agent.time_since_food = 0.0;
            }

            if self.water.iter().any(|w| w.contains(agent.position)) {
                agent.add_hydration(self.config.drink_rate * dt, &self.config);
            }
        }
    }

    fn step_combat_phase(&mut self, decisions: &[Decision], index: &HashMap<u32, usize>, dt: f64) {
        let cfg = &self.config;
        for (i, decision) in decisions.iter().enumerate() {
            if !self.agents[i].alive || decision.drives.attack <= DRIVE_THRESHOLD {
                continue;
            }
            let Some(j) = decision
                .nearest_agent
                .and_then(|target| index.get(&target.id).copied())
            else {
                continue;
            };
            let (attacker, target) = (&self.agents[i], &self.agents[j]);
            if i == j
                || !target.alive
                || attacker.position.distance(target.position) > cfg.attack_range
            {
                continue;
            }
            let damage = cfg.attack_damage
                * decision.modifiers.effective_attack
                * (1.0 - decisions[j].modifiers.damage_reduction)
                * dt;
            if damage <= 0.0 {
                continue;
            }

            let target = &mut self.agents[j];
            target.health -= damage;
            target.state.recent_damage += damage;
            target.state.stress = (target.state.stress + cfg.stress_from_damage * damage).min(1.0);
            target.time_since_damage = 0.0;
            if target.health <= 0.0 {
                target.kill(DeathCause::Predation);
                trace!(attacker = self.agents[i].id, target = self.agents[j].id, "predation");
            }
            self.agents[i].add_energy(damage * cfg.predation_energy_fraction, cfg);
        }
    }

    /// Pairs each initiator with the nearest visible agent of the opposite sex when
    /// both are ready; offspring are deferred.
    fn step_mating_phase(
        &mut self,
        decisions: &[Decision],
        index: &HashMap<u32, usize>,
    ) -> Vec<Agent> {
        let mut births = Vec::new();
        for (i, decision) in decisions.iter().enumerate() {
            if decision.drives.mate <= DRIVE_THRESHOLD
                || !self.agents[i].is_ready_to_reproduce(&self.config)
            {
                continue;
            }
            let Some(j) = decision
                .nearest_mate
                .and_then(|mate| index.get(&mate.id).copied())
            else {
                continue;
            };
            if i == j {
                continue;
            }
            let (a, b) = (&self.agents[i], &self.agents[j]);
            if a.sex() == b.sex()
                || !b.is_ready_to_reproduce(&self.config)
                || a.position.distance(b.position) > self.config.mating_range
            {
                continue;
            }
            if self.agents.len() + births.len() >= self.config.max_population {
                break;
            }
            if self.rng.random::<f64>() >= decision.modifiers.reproduction {
                continue;
            }

            let Some(child) = self.conceive(i, j) else {
                continue;
            };
            for parent in [i, j] {
                let p = &mut self.agents[parent];
                p.energy = (p.energy - self.config.reproduction_energy_cost).max(0.0);
                p.reproduction_cooldown = self.config.reproduction_cooldown;
                p.time_since_mating = 0.0;
            }
            trace!(
                child = child.id,
                parents = ?(self.agents[i].id, self.agents[j].id),
                generation = child.generation,
                species = child.species_id,
                "birth"
            );
            births.push(child);
        }
        births
    }

    /// Crossover, mutation and a fresh brain; species assigned by founder distance.
    fn conceive(&mut self, i: usize, j: usize) -> Option<Agent> {
        let config = &self.config;
        let (a, b) = (&self.agents[i], &self.agents[j]);
        let mut genome = Genome::from_parents(&a.genome, &b.genome, config.crossover_rate, &mut self.rng);
        genome.mutate(&mut self.rng, &self.mutation_rates);

        let brain = match Brain::from_genome(
            config.brain_kind,
            brain_input_size(config),
            &genome,
            config.weight_init_stddev,
            &mut self.rng,
        ) {
            Ok(brain) => brain,
            Err(err) => {
                warn!(error = %err, "offspring brain construction failed");
                return None;
            }
        };
        let Some(id) = self.agent_ids.next_id() else {
            warn!("agent id space exhausted, birth skipped");
            return None;
        };

        let angle = self.rng.random_range(0.0..TAU);
        let distance = self.rng.random::<f64>() * config.offspring_spawn_radius;
        let mut position = a.position + Vector2::from_angle(angle) * distance;
        let mut velocity = Vector2::ZERO;
        movement::apply_boundary(&mut position, &mut velocity, config);

        let mut child = Agent::new(id, position, genome, brain, config);
        child.generation = a.generation.max(b.generation) + 1;
        child.parents = Some((a.id, b.id));
        child.species_id = a.species_id;
        let region = region_at(position, config);
        child.set_region(region, config.regions.modifiers(region));

        let drifted = self
            .species_founders
            .get(&a.species_id)
            .is_none_or(|founder| child.genome.trait_distance(founder) > config.speciation_threshold);
        if drifted {
            if let Some(species) = self.species_ids.next_id() {
                child.species_id = species;
                self.species_founders.insert(species, child.genome.clone());
                debug!(species, parent_species = a.species_id, "new species");
            }
        }
        Some(child)
    }

    /// Metabolism, aging, stress and vital checks. `decisions` align with `agents`.
    fn step_physiology_phase(&mut self, decisions: &[Decision], dt: f64) {
        let cfg = &self.config;
        let damage_decay = (-cfg.recent_damage_decay * dt).exp();
        for (agent, decision) in self.agents.iter_mut().zip(decisions) {
            if !agent.alive {
                continue;
            }
            let top_speed = agent.effective_trait(Trait::Speed).max(f64::EPSILON);
            let speed_fraction = (agent.velocity.length() / top_speed).min(1.0);
            let burn = (cfg.base_metabolic_rate + cfg.movement_cost * speed_fraction * speed_fraction)
                * decision.modifiers.effective_metabolism
                * agent.regional.metabolism
                * dt;
            agent.add_energy(-burn, cfg);
            agent.add_hydration(-cfg.hydration_drain_rate * dt, cfg);

            agent.age += dt;
            agent.reproduction_cooldown = (agent.reproduction_cooldown - dt).max(0.0);
            agent.time_since_food += dt;
            agent.time_since_damage += dt;
            agent.time_since_mating += dt;

            agent.state.recent_damage *= damage_decay;
            let hunger = (cfg.state_effects.exhaustion_threshold - agent.energy_ratio(cfg)).max(0.0);
            agent.state.stress =
                (agent.state.stress + (hunger - cfg.stress_decay_rate) * dt).clamp(0.0, 1.0);

            if agent.energy_ratio(cfg) > 0.5 {
                agent.health = (agent.health + cfg.health_regen_rate * dt).min(cfg.max_health);
            }

            if agent.energy <= 0.0 {
                agent.kill(DeathCause::Starvation);
            } else if agent.hydration <= 0.0 {
                agent.kill(DeathCause::Dehydration);
            } else if agent.age >= agent.phenotype.get(Trait::MaxAge) {
                agent.kill(DeathCause::OldAge);
            } else if agent.health <= 0.0 {
                agent.kill(DeathCause::Predation);
            }
        }
    }

    fn step_epidemic_phase(&mut self, dt: f64) {
        let cfg = &self.config.epidemic;
        if !cfg.epidemic_enabled {
            return;
        }
        let mut carriers = SpatialGrid::new(cfg.transmission_radius.max(self.config.grid_cell_size));
        carriers.rebuild(
            self.agents
                .iter()
                .filter(|a| a.alive && a.disease.is_infected())
                .map(Agent::sighting),
        );

        for agent in self.agents.iter_mut().filter(|a| a.alive) {
            let current = agent.disease;
            agent.disease = match current {
                DiseaseState::Infected { remaining } => {
                    agent.energy = (agent.energy - cfg.disease_energy_drain * dt).max(0.0);
                    if self.rng.random::<f64>() < cfg.disease_lethality * dt {
                        agent.kill(DeathCause::Disease);
                    }
                    let remaining = remaining - dt;
                    if remaining <= 0.0 {
                        DiseaseState::Immune {
                            remaining: cfg.immunity_duration,
                        }
                    } else {
                        DiseaseState::Infected { remaining }
                    }
                }
                DiseaseState::Immune { remaining } => {
                    let remaining = remaining - dt;
                    if remaining <= 0.0 {
                        DiseaseState::Healthy
                    } else {
                        DiseaseState::Immune { remaining }
                    }
                }
                DiseaseState::Healthy => {
                    let resistance = agent.phenotype.get(Trait::DiseaseResistance).clamp(0.0, 1.0);
                    let per_contact = cfg.transmission_chance * dt * (1.0 - resistance);
                    let mut contacts = 0usize;
                    carriers.for_each_in_radius(
                        agent.position,
                        cfg.transmission_radius,
                        Some(agent.id),
                        |_: &AgentSighting, _| contacts += 1,
                    );
                    let mut infected = self.rng.random::<f64>() < cfg.spontaneous_infection_chance * dt;
                    for _ in 0..contacts {
                        infected |= self.rng.random::<f64>() < per_contact;
                    }
                    if infected {
                        DiseaseState::Infected {
                            remaining: cfg.infection_duration,
                        }
                    } else {
                        DiseaseState::Healthy
                    }
                }
            };
        }
    }

    /// Drop dead agents and eaten food, admit this tick's births, then forget
    /// the founders of extinct species.
    fn step_cleanup_phase(&mut self, births: Vec<Agent>, deaths: &mut DeathCounts) {
        for agent in self.agents.iter().filter(|a| !a.alive) {
            if let Some(cause) = agent.death_cause {
                deaths.record(cause);
            }
            trace!(id = agent.id, cause = ?agent.death_cause, age = agent.age, "death");
        }
        self.agents.retain(|a| a.alive);
        self.food.retain(|f| f.alive);
        self.agents.extend(births);

        let living: HashSet<u32> = self.agents.iter().map(|a| a.species_id).collect();
        let root = self.root_species;
        self.species_founders.retain(|id, _| {
            let keep = Some(*id) == root || living.contains(id);
            if !keep {
                debug!(species = *id, "species extinct");
            }
            keep
        });
    }

    /// Food regrowth and the population floor.
    fn step_spawn_phase(&mut self, dt: f64, report: &mut StepReport) {
        self.food_spawn_accumulator += self.config.food_spawn_rate * dt;
        while self.food_spawn_accumulator >= 1.0 && self.food.len() < self.config.max_food {
            if self.spawn_food().is_none() {
                break;
            }
            self.food_spawn_accumulator -= 1.0;
            report.spawned_food += 1;
        }
        if self.food.len() >= self.config.max_food {
            self.food_spawn_accumulator = 0.0;
        }

        while self.agents.len() < self.config.min_population {
            match self.spawn_random_agent() {
                Ok(_) => report.spawned_agents += 1,
                Err(err) => {
                    warn!(error = %err, "population floor spawn failed");
                    break;
                }
            }
        }
    }

    /// Advance the world by `dt` simulated seconds.
    pub fn step(&mut self, dt: f64) -> StepReport {
        let total_start = Instant::now();
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.tick = self.tick.saturating_add(1);
        self.elapsed += dt;
        let mut report = StepReport {
            tick: self.tick,
            ..StepReport::default()
        };

        let t0 = Instant::now();
        self.rebuild_grids();
        let spatial_build_us = t0.elapsed().as_micros() as u64;

        let t1 = Instant::now();
        let decisions = self.step_decision_phase();
        let decision_us = t1.elapsed().as_micros() as u64;

        let t2 = Instant::now();
        self.step_commit_phase(&decisions, dt);
        let index: HashMap<u32, usize> =
            self.agents.iter().enumerate().map(|(i, a)| (a.id, i)).collect();
        self.step_feeding_phase(dt);
        self.step_combat_phase(&decisions, &index, dt);
        let births = self.step_mating_phase(&decisions, &index);
        self.step_physiology_phase(&decisions, dt);
        self.step_epidemic_phase(dt);

        report.births = births.len();
        self.step_cleanup_phase(births, &mut report.deaths);
        self.step_spawn_phase(dt, &mut report);
        let commit_us = t2.elapsed().as_micros() as u64;

        self.total_births += report.births as u64;
        self.total_deaths += report.deaths.total() as u64;
        self.deaths_by_cause.add(&report.deaths);
        report.alive_agents = self.agents.len();
        report.alive_food = self.food.len();
        report.timings = StepTimings {
            spatial_build_us,
            decision_us,
            commit_us,
            total_us: total_start.elapsed().as_micros() as u64,
        };
        debug!(
            tick = self.tick,
            agents = report.alive_agents,
            food = report.alive_food,
            births = report.births,
            deaths = report.deaths.total(),
            "tick complete"
        );
        report
    }
}
