use crate::spatial::GridEntity;
use crate::vector::Vector2;
use serde::{Deserialize, Serialize};

/// Edible item. Only `alive` changes once placed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub id: u32,
    pub position: Vector2,
    pub energy: f64,
    pub alive: bool,
}

impl Food {
    pub fn new(id: u32, position: Vector2, energy: f64) -> Self {
        Self {
            id,
            position,
            energy,
            alive: true,
        }
    }
}

impl GridEntity for Food {
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

/// Circular pool; agents inside it drink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaterSource {
    pub id: u32,
    pub position: Vector2,
    pub radius: f64,
}

impl WaterSource {
    pub fn new(id: u32, position: Vector2, radius: f64) -> Self {
        Self {
            id,
            position,
            radius,
        }
    }

    /// Distance from `pos` to the pool's edge; zero inside.
    pub fn edge_distance(&self, pos: Vector2) -> f64 {
        (pos.distance(self.position) - self.radius).max(0.0)
    }

    pub fn contains(&self, pos: Vector2) -> bool {
        pos.distance_squared(self.position) <= self.radius * self.radius
    }
}
