//! World/terrain query surface and the swept-collision contract.
//!
//! Block storage itself lives outside this crate; the simulation only needs
//! the read-only [`Terrain`] queries and a [`Tracer`]. [`BlockTerrain`] and
//! [`VoxelTracer`] are small in-memory implementations used by the demo
//! server and by tests.

use std::collections::{HashMap, HashSet};

use crate::math::Vec3;

/// Read-only block queries.
pub trait Terrain: Send + Sync {
    /// Y of the topmost solid block in a column, if the column is known.
    fn height(&self, x: i32, z: i32) -> Option<i32>;

    /// Whether the block at the coordinates is solid.
    fn is_solid(&self, x: i32, y: i32, z: i32) -> bool;
}

/// Result of a swept ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceHit {
    /// Where the ray entered the first solid block.
    pub point: Vec3,
    /// Outward normal of the face that was hit (axis aligned).
    pub normal: Vec3,
}

/// Swept ray-vs-geometry primitive.
pub trait Tracer: Send + Sync {
    /// Casts from `origin` along `direction` (any length) for at most
    /// `max_distance` units. `None` means nothing was hit.
    fn trace(
        &self,
        terrain: &dyn Terrain,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<TraceHit>;
}

/// Grid walk over unit blocks (Amanatides & Woo). The starting block is not
/// tested, so a ray cast from inside geometry only reports the next face.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoxelTracer;

impl Tracer for VoxelTracer {
    fn trace(
        &self,
        terrain: &dyn Terrain,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<TraceHit> {
        let dir = direction.normalized();
        if dir.is_zero() || max_distance <= 0.0 {
            return None;
        }

        let o = [origin.x, origin.y, origin.z];
        let d = [dir.x, dir.y, dir.z];
        let mut cell = o.map(|c| c.floor() as i32);
        let mut step = [0i32; 3];
        let mut t_max = [f32::INFINITY; 3];
        let mut t_delta = [f32::INFINITY; 3];

        for axis in 0..3 {
            if d[axis] > 0.0 {
                step[axis] = 1;
                t_delta[axis] = 1.0 / d[axis];
                t_max[axis] = (cell[axis] as f32 + 1.0 - o[axis]) / d[axis];
            } else if d[axis] < 0.0 {
                step[axis] = -1;
                t_delta[axis] = -1.0 / d[axis];
                t_max[axis] = (o[axis] - cell[axis] as f32) / -d[axis];
            }
        }

        loop {
            let axis = if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
                0
            } else if t_max[1] <= t_max[2] {
                1
            } else {
                2
            };

            let t = t_max[axis];
            if t > max_distance {
                return None;
            }

            cell[axis] += step[axis];
            t_max[axis] += t_delta[axis];

            if terrain.is_solid(cell[0], cell[1], cell[2]) {
                let mut normal = [0.0f32; 3];
                normal[axis] = -(step[axis] as f32);
                return Some(TraceHit {
                    point: origin + dir * t,
                    normal: Vec3::new(normal[0], normal[1], normal[2]),
                });
            }
        }
    }
}

/// In-memory terrain: an optional flat ground level plus per-block edits.
///
/// Every block at or below `ground` is solid unless cleared; columns outside
/// the ground layer report no height until a block is placed in them.
#[derive(Debug, Clone, Default)]
pub struct BlockTerrain {
    ground: Option<i32>,
    placed: HashSet<(i32, i32, i32)>,
    cleared: HashSet<(i32, i32, i32)>,
    column_top: HashMap<(i32, i32), i32>,
}

impl BlockTerrain {
    /// Flat world whose topmost solid layer is `ground`.
    pub fn flat(ground: i32) -> Self {
        Self {
            ground: Some(ground),
            ..Default::default()
        }
    }

    /// Empty world; heights are unknown.
    pub fn void() -> Self {
        Self::default()
    }

    pub fn set_solid(&mut self, x: i32, y: i32, z: i32, solid: bool) {
        if solid {
            self.cleared.remove(&(x, y, z));
            self.placed.insert((x, y, z));
            let top = self.column_top.entry((x, z)).or_insert(y);
            *top = (*top).max(y);
        } else {
            self.placed.remove(&(x, y, z));
            self.cleared.insert((x, y, z));
        }
    }

    /// Fills a column from the ground up to and including `top`.
    pub fn raise_column(&mut self, x: i32, z: i32, top: i32) {
        let from = self.ground.map_or(top, |g| g + 1);
        for y in from..=top {
            self.set_solid(x, y, z, true);
        }
    }
}

impl Terrain for BlockTerrain {
    fn height(&self, x: i32, z: i32) -> Option<i32> {
        let placed = self.column_top.get(&(x, z)).copied();
        match (self.ground, placed) {
            (Some(g), Some(p)) => Some(g.max(p)),
            (g, p) => g.or(p),
        }
    }

    fn is_solid(&self, x: i32, y: i32, z: i32) -> bool {
        if self.cleared.contains(&(x, y, z)) {
            return false;
        }
        self.placed.contains(&(x, y, z)) || self.ground.is_some_and(|g| y <= g)
    }
}
