use crate::vector::Vector2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObstacleShape {
    Circle { radius: f64 },
    Rect { width: f64, height: f64 },
}

/// Static world geometry. `position` is the shape's center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: u32,
    pub position: Vector2,
    pub shape: ObstacleShape,
}

impl Obstacle {
    pub fn circle(id: u32, position: Vector2, radius: f64) -> Self {
        Self {
            id,
            position,
            shape: ObstacleShape::Circle { radius },
        }
    }

    pub fn rect(id: u32, position: Vector2, width: f64, height: f64) -> Self {
        Self {
            id,
            position,
            shape: ObstacleShape::Rect { width, height },
        }
    }

    /// Axis-aligned bounding box as `(min, max)`.
    pub fn bounds(&self) -> (Vector2, Vector2) {
        let half = match self.shape {
            ObstacleShape::Circle { radius } => Vector2::new(radius, radius),
            ObstacleShape::Rect { width, height } => Vector2::new(width / 2.0, height / 2.0),
        };
        (self.position - half, self.position + half)
    }

    pub fn contains_point(&self, pos: Vector2) -> bool {
        match self.shape {
            ObstacleShape::Circle { radius } => pos.distance_squared(self.position) < radius * radius,
            ObstacleShape::Rect { .. } => {
                let (min, max) = self.bounds();
                pos.x > min.x && pos.x < max.x && pos.y > min.y && pos.y < max.y
            }
        }
    }

    /// Closest point on (or in) the obstacle to `pos`.
    pub fn closest_point(&self, pos: Vector2) -> Vector2 {
        match self.shape {
            ObstacleShape::Circle { radius } => {
                let offset = pos - self.position;
                if offset.length_squared() <= radius * radius {
                    pos
                } else {
                    self.position + offset.normalized() * radius
                }
            }
            ObstacleShape::Rect { .. } => {
                let (min, max) = self.bounds();
                Vector2::new(pos.x.clamp(min.x, max.x), pos.y.clamp(min.y, max.y))
            }
        }
    }

    pub fn collides_with_circle(&self, pos: Vector2, radius: f64) -> bool {
        match self.shape {
            ObstacleShape::Circle { radius: own } => {
                let reach = own + radius;
                pos.distance_squared(self.position) < reach * reach
            }
            ObstacleShape::Rect { .. } => {
                self.contains_point(pos)
                    || self.closest_point(pos).distance_squared(pos) < radius * radius
            }
        }
    }

    /// Displacement that moves a circle at `pos` out of the obstacle; zero when clear.
    ///
    /// Coincident geometry (circle centered exactly on a circular obstacle's center)
    /// falls back to pushing along [`Vector2::DOWN`].
    pub fn get_push_vector(&self, pos: Vector2, radius: f64) -> Vector2 {
        match self.shape {
            ObstacleShape::Circle { radius: own } => {
                let offset = pos - self.position;
                let dist = offset.length();
                let overlap = own + radius - dist;
                if overlap <= 0.0 {
                    return Vector2::ZERO;
                }
                let dir = if dist > f64::EPSILON {
                    offset / dist
                } else {
                    Vector2::DOWN
                };
                dir * overlap
            }
            ObstacleShape::Rect { .. } => {
                if self.contains_point(pos) {
                    return self.push_out_of_rect(pos, radius);
                }
                let offset = pos - self.closest_point(pos);
                let dist = offset.length();
                let overlap = radius - dist;
                if overlap <= 0.0 || dist <= f64::EPSILON {
                    // On the edge itself: same as being inside.
                    return if overlap > 0.0 {
                        self.push_out_of_rect(pos, radius)
                    } else {
                        Vector2::ZERO
                    };
                }
                offset / dist * overlap
            }
        }
    }

    fn push_out_of_rect(&self, pos: Vector2, radius: f64) -> Vector2 {
        let (min, max) = self.bounds();
        // Bottom first so a dead-center hit resolves downward.
        let exits = [
            (max.y - pos.y, Vector2::DOWN),
            (pos.y - min.y, Vector2::new(0.0, -1.0)),
            (max.x - pos.x, Vector2::new(1.0, 0.0)),
            (pos.x - min.x, Vector2::new(-1.0, 0.0)),
        ];
        let (depth, normal) = exits
            .iter()
            .copied()
            .fold(exits[0], |best, e| if e.0 < best.0 { e } else { best });
        normal * (depth + radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_push_resolves_overlap() {
        let obstacle = Obstacle::circle(0, Vector2::new(0.0, 0.0), 10.0);
        let pos = Vector2::new(8.0, 0.0);
        assert!(obstacle.collides_with_circle(pos, 4.0));
        let resolved = pos + obstacle.get_push_vector(pos, 4.0);
        assert!((resolved.x - 14.0).abs() < 1e-9);
        assert!(!obstacle.collides_with_circle(resolved + Vector2::new(1e-9, 0.0), 4.0));
    }

    #[test]
    fn coincident_circle_pushes_down() {
        let obstacle = Obstacle::circle(0, Vector2::new(5.0, 5.0), 2.0);
        let push = obstacle.get_push_vector(Vector2::new(5.0, 5.0), 1.0);
        assert!(push.x.abs() < 1e-12);
        assert!((push.y - 3.0).abs() < 1e-12);
    }

    #[test]
    fn rect_push_from_outside_edge() {
        let obstacle = Obstacle::rect(0, Vector2::new(0.0, 0.0), 10.0, 10.0);
        let pos = Vector2::new(6.0, 0.0);
        assert!(obstacle.collides_with_circle(pos, 2.0));
        let push = obstacle.get_push_vector(pos, 2.0);
        assert!((push.x - 1.0).abs() < 1e-12 && push.y.abs() < 1e-12);
    }

    #[test]
    fn rect_push_from_inside_uses_shallowest_side() {
        let obstacle = Obstacle::rect(0, Vector2::new(0.0, 0.0), 10.0, 10.0);
        let push = obstacle.get_push_vector(Vector2::new(-4.0, 1.0), 1.0);
        assert!((push.x + 2.0).abs() < 1e-12 && push.y.abs() < 1e-12);
    }

    #[test]
    fn clear_circle_has_zero_push() {
        let obstacle = Obstacle::rect(0, Vector2::new(0.0, 0.0), 4.0, 4.0);
        let pos = Vector2::new(10.0, 10.0);
        assert!(!obstacle.collides_with_circle(pos, 1.0));
        assert_eq!(obstacle.get_push_vector(pos, 1.0), Vector2::ZERO);
    }
}
