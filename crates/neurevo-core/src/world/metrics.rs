use super::World;
use crate::agent::{Agent, AgentSnapshot, DeathCause};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepTimings {
    pub spatial_build_us: u64,
    pub decision_us: u64,
    pub commit_us: u64,
    pub total_us: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeathCounts {
    pub starvation: usize,
    pub dehydration: usize,
    pub old_age: usize,
    pub predation: usize,
    pub disease: usize,
}

impl DeathCounts {
    pub fn record(&mut self, cause: DeathCause) {
        match cause {
            DeathCause::Starvation => self.starvation += 1,
            DeathCause::Dehydration => self.dehydration += 1,
            DeathCause::OldAge => self.old_age += 1,
            DeathCause::Predation => self.predation += 1,
            DeathCause::Disease => self.disease += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.starvation + self.dehydration + self.old_age + self.predation + self.disease
    }

    pub fn add(&mut self, other: &DeathCounts) {
        self.starvation += other.starvation;
        self.dehydration += other.dehydration;
        self.old_age += other.old_age;
        self.predation += other.predation;
        self.disease += other.disease;
    }
}

/// What happened during one `World::step`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StepReport {
    pub tick: u64,
    pub births: usize,
    pub deaths: DeathCounts,
    /// Agents added by the population floor.
    pub spawned_agents: usize,
    pub spawned_food: usize,
    pub alive_agents: usize,
    pub alive_food: usize,
    #[serde(skip)]
    pub timings: StepTimings,
}

/// Aggregate statistics for dashboards. Empty populations read as zeros.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldStats {
    pub tick: u64,
    pub elapsed: f64,
    pub alive_agents: usize,
    pub alive_food: usize,
    pub species_counts: BTreeMap<u32, usize>,
    pub mean_energy: f64,
    pub mean_hydration: f64,
    pub mean_age: f64,
    pub mean_generation: f64,
    pub max_generation: u32,
    pub infected: usize,
    pub total_births: u64,
    pub total_deaths: u64,
    pub deaths_by_cause: DeathCounts,
}

fn mean_of(agents: &[&Agent], f: impl Fn(&Agent) -> f64) -> f64 {
    if agents.is_empty() {
        return 0.0;
    }
    agents.iter().map(|a| f(a)).sum::<f64>() / agents.len() as f64
}

impl World {
    pub fn stats(&self) -> WorldStats {
        let alive: Vec<&Agent> = self.agents.iter().filter(|a| a.alive).collect();

        let mut species_counts = BTreeMap::new();
        for agent in &alive {
            *species_counts.entry(agent.species_id).or_insert(0) += 1;
        }

        WorldStats {
            tick: self.tick,
            elapsed: self.elapsed,
            alive_agents: alive.len(),
            alive_food: self.food.iter().filter(|f| f.alive).count(),
            species_counts,
            mean_energy: mean_of(&alive, |a| a.energy),
            mean_hydration: mean_of(&alive, |a| a.hydration),
            mean_age: mean_of(&alive, |a| a.age),
            mean_generation: mean_of(&alive, |a| a.generation as f64),
            max_generation: alive.iter().map(|a| a.generation).max().unwrap_or(0),
            infected: alive.iter().filter(|a| a.disease.is_infected()).count(),
            total_births: self.total_births,
            total_deaths: self.total_deaths,
            deaths_by_cause: self.deaths_by_cause.clone(),
        }
    }

    pub fn agent_snapshots(&self) -> Vec<AgentSnapshot> {
        self.agents
            .iter()
            .filter(|a| a.alive)
            .map(|a| a.snapshot())
            .collect()
    }
}
