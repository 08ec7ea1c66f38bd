use crate::obstacle::Obstacle;
use crate::vector::Vector2;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;

/// Anything that can be projected into a [`SpatialGrid`] for one tick.
pub trait GridEntity {
    fn entity_id(&self) -> u32;
    fn position(&self) -> Vector2;
    fn is_alive(&self) -> bool;
}

/// Uniform-cell spatial index, rebuilt from scratch every tick.
///
/// Entries are snapshots owned by the grid; nothing is updated in place, so a
/// query always reflects the population as it was at rebuild time.
#[derive(Clone, Debug)]
pub struct SpatialGrid<T> {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<T>>,
    len: usize,
}

impl<T: GridEntity> SpatialGrid<T> {
    pub fn new(cell_size: f64) -> Self {
        debug_assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "cell_size must be positive and finite"
        );
        Self {
            cell_size,
            cells: HashMap::new(),
            len: 0,
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn cell_key(&self, pos: Vector2) -> (i64, i64) {
        (
            (pos.x / self.cell_size).floor() as i64,
            (pos.y / self.cell_size).floor() as i64,
        )
    }

    pub fn insert(&mut self, entity: T) {
        let key = self.cell_key(entity.position());
        self.cells.entry(key).or_default().push(entity);
        self.len += 1;
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.len = 0;
    }

    /// Clear, then insert every entity from `entities`. O(n).
    pub fn rebuild(&mut self, entities: impl IntoIterator<Item = T>) {
        self.clear();
        for entity in entities {
            self.insert(entity);
        }
    }

    /// Visit alive entities within `radius` of `pos` (inclusive), skipping `exclude`.
    /// The visitor receives the squared distance alongside each entity.
    pub fn for_each_in_radius<'a>(
        &'a self,
        pos: Vector2,
        radius: f64,
        exclude: Option<u32>,
        mut visitor: impl FnMut(&'a T, f64),
    ) {
        if self.len == 0 || !(radius >= 0.0) || !pos.is_finite() {
            return;
        }
        let r_sq = radius * radius;
        let mut visit_cell = |bucket: &'a Vec<T>| {
            for entity in bucket {
                if !entity.is_alive() || Some(entity.entity_id()) == exclude {
                    continue;
                }
                let d_sq = entity.position().distance_squared(pos);
                if d_sq <= r_sq {
                    visitor(entity, d_sq);
                }
            }
        };

        let (c0, r0) = self.cell_key(pos - Vector2::new(radius, radius));
        let (c1, r1) = self.cell_key(pos + Vector2::new(radius, radius));
        let span = (c1.saturating_sub(c0) as u128 + 1) * (r1.saturating_sub(r0) as u128 + 1);

        if span <= self.cells.len() as u128 {
            for col in c0..=c1 {
                for row in r0..=r1 {
                    if let Some(bucket) = self.cells.get(&(col, row)) {
                        visit_cell(bucket);
                    }
                }
            }
        } else {
            // Radius covers more cells than are occupied: walk occupied cells in key order.
            let mut keys: Vec<&(i64, i64)> = self
                .cells
                .keys()
                .filter(|(col, row)| (c0..=c1).contains(col) && (r0..=r1).contains(row))
                .collect();
            keys.sort_unstable();
            for key in keys {
                visit_cell(&self.cells[key]);
            }
        }
    }

    pub fn query_radius(&self, pos: Vector2, radius: f64, exclude: Option<u32>) -> Vec<&T> {
        let mut found = Vec::new();
        self.for_each_in_radius(pos, radius, exclude, |entity, _| found.push(entity));
        found
    }

    /// Closest alive entity within `radius`; ties resolve to the lower id.
    pub fn query_nearest(&self, pos: Vector2, radius: f64, exclude: Option<u32>) -> Option<&T> {
        let mut best: Option<(&T, f64)> = None;
        self.for_each_in_radius(pos, radius, exclude, |entity, d_sq| {
            let closer = match best {
                None => true,
                Some((current, best_sq)) => {
                    d_sq < best_sq
                        || (d_sq == best_sq && entity.entity_id() < current.entity_id())
                }
            };
            if closer {
                best = Some((entity, d_sq));
            }
        });
        best.map(|(entity, _)| entity)
    }
}

/// Bounding box of one obstacle, keyed by its index in the world's obstacle list.
#[derive(Clone, Debug)]
struct ObstacleEnvelope {
    index: usize,
    min: [f64; 2],
    max: [f64; 2],
}

impl RTreeObject for ObstacleEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

/// R*-tree over static obstacle bounds, built once per world (O(n log n)).
#[derive(Clone, Debug)]
pub struct ObstacleIndex {
    tree: RTree<ObstacleEnvelope>,
}

impl ObstacleIndex {
    pub fn build(obstacles: &[Obstacle]) -> Self {
        let envelopes = obstacles
            .iter()
            .enumerate()
            .map(|(index, obstacle)| {
                let (min, max) = obstacle.bounds();
                ObstacleEnvelope {
                    index,
                    min: min.into(),
                    max: max.into(),
                }
            })
            .collect();
        Self {
            tree: RTree::bulk_load(envelopes),
        }
    }

    /// Indices of obstacles whose bounds intersect the circle's bounding box, ascending.
    pub fn candidates(&self, pos: Vector2, radius: f64) -> Vec<usize> {
        let envelope = AABB::from_corners(
            [pos.x - radius, pos.y - radius],
            [pos.x + radius, pos.y + radius],
        );
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|e| e.index)
            .collect();
        hits.sort_unstable();
        hits
    }
}
