//! Evolving neural agents in a bounded 2D world.
//!
//! Each tick the [`world::World`] rebuilds its spatial grids, lets every agent
//! sense and decide against that frozen snapshot, then commits movement,
//! interactions, physiology, deaths and births in a fixed sequential order.

pub mod agent;
pub mod config;
pub mod genome;
pub mod modulation;
pub mod movement;
pub mod nn;
pub mod obstacle;
pub mod phenotype;
pub mod resource;
pub mod rng;
pub mod sensing;
pub mod spatial;
pub mod vector;
pub mod world;

pub use agent::{Agent, AgentSnapshot};
pub use config::{BrainKind, SimConfig, SimConfigError};
pub use vector::Vector2;
pub use world::{StepReport, World, WorldInitError, WorldStats};
