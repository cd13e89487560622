//! Physics integration.
//!
//! A [`Body`] holds the kinematic state of an entity. Each tick the world asks
//! its [`PhysicsBackend`] to advance every simulated body; the default backend
//! is [`SweptPhysics`], a ground-contact + gravity + swept-trace integrator.

use bitflags::bitflags;

use crate::{
    math::{DVec3, Vec3},
    terrain::{Terrain, Tracer},
};

bitflags! {
    /// Fields changed since the last replication.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Dirty: u8 {
        const POSITION = 1 << 0;
        const ORIENTATION = 1 << 1;
    }
}

/// Physics parameters.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    /// Vertical acceleration while airborne, units/s².
    pub gravity: f32,
    /// Horizontal velocity factor per tick while grounded, before `1/(1+dt)`.
    pub ground_drag: f32,
    /// Horizontal speeds below this snap to zero while grounded.
    pub rest_speed: f32,
    /// Lookahead of the swept collision query.
    pub trace_distance: f32,
    /// Lift applied when a grounded body is found inside a solid block.
    pub unstick_lift: f64,
    /// Distance a body is kept off a surface it collided with.
    pub surface_offset: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: -9.81,
            ground_drag: 0.7,
            rest_speed: 0.05,
            trace_distance: 2.0,
            unstick_lift: 0.2,
            surface_offset: 0.2,
        }
    }
}

/// Kinematic state shared by every entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Body {
    pub position: DVec3,
    /// Yaw, pitch, roll in degrees. Roll is unused by most kinds.
    pub rotation: DVec3,
    pub velocity: Vec3,
    pub on_ground: bool,
    pub dirty: Dirty,
}

impl Body {
    pub fn at(position: DVec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn set_position(&mut self, position: DVec3) {
        if self.position != position {
            self.position = position;
            self.dirty |= Dirty::POSITION;
        }
    }

    pub fn set_yaw(&mut self, yaw: f64) {
        if self.rotation.x != yaw {
            self.rotation.x = yaw;
            self.dirty |= Dirty::ORIENTATION;
        }
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        if self.rotation.y != pitch {
            self.rotation.y = pitch;
            self.dirty |= Dirty::ORIENTATION;
        }
    }

    pub fn set_roll(&mut self, roll: f64) {
        if self.rotation.z != roll {
            self.rotation.z = roll;
            self.dirty |= Dirty::ORIENTATION;
        }
    }

    pub fn set_rotation(&mut self, rotation: DVec3) {
        self.set_yaw(rotation.x);
        self.set_pitch(rotation.y);
        self.set_roll(rotation.z);
    }
}

/// Per-tick integrator.
pub trait PhysicsBackend: Send + Sync {
    /// Advances `body` by `dt_sec`. Returns whether the position changed.
    fn step(
        &self,
        body: &mut Body,
        dt_sec: f32,
        terrain: &dyn Terrain,
        tracer: &dyn Tracer,
    ) -> bool;
}

/// No-op physics.
#[derive(Default)]
pub struct NullPhysics;

impl PhysicsBackend for NullPhysics {
    fn step(&self, _body: &mut Body, _dt: f32, _terrain: &dyn Terrain, _tracer: &dyn Tracer) -> bool {
        false
    }
}

/// Ground contact, gravity, then a swept trace along the velocity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweptPhysics {
    pub cfg: PhysicsConfig,
}

impl SweptPhysics {
    pub fn new(cfg: PhysicsConfig) -> Self {
        Self { cfg }
    }

    fn ground_contact(&self, body: &mut Body, dt: f32, terrain: &dyn Terrain) {
        let (x, y, z) = body.position.block();
        if !terrain.is_solid(x, y - 1, z) {
            body.on_ground = false;
        }
        if terrain.is_solid(x, y, z) {
            body.on_ground = true;
            body.position.y += self.cfg.unstick_lift;
        }

        let drag = self.cfg.ground_drag / (1.0 + dt);
        body.velocity.x = self.settle(body.velocity.x * drag);
        body.velocity.z = self.settle(body.velocity.z * drag);
    }

    fn settle(&self, speed: f32) -> f32 {
        if speed.abs() < self.cfg.rest_speed {
            0.0
        } else {
            speed
        }
    }
}

impl PhysicsBackend for SweptPhysics {
    fn step(&self, body: &mut Body, dt: f32, terrain: &dyn Terrain, tracer: &dyn Tracer) -> bool {
        let start = body.position;

        if body.on_ground {
            self.ground_contact(body, dt, terrain);
        }

        if !body.on_ground {
            body.velocity.y += self.cfg.gravity * dt;
        }

        if !body.velocity.is_zero() {
            let origin = body.position.as_vec();
            let travel = body.velocity * dt;
            match tracer.trace(terrain, origin, body.velocity, self.cfg.trace_distance) {
                Some(hit) if (hit.point - origin).len_sq() <= travel.len_sq() => {
                    if hit.normal.x != 0.0 {
                        body.velocity.x = 0.0;
                    }
                    if hit.normal.y != 0.0 {
                        body.velocity.y = 0.0;
                    }
                    if hit.normal.z != 0.0 {
                        body.velocity.z = 0.0;
                    }
                    if hit.normal.y > 0.0 {
                        body.on_ground = true;
                    }
                    body.position = (hit.point + hit.normal * self.cfg.surface_offset).as_dvec();
                }
                _ => body.position += travel.as_dvec(),
            }
        }

        let moved = body.position != start;
        if moved {
            body.dirty |= Dirty::POSITION;
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::terrain::{BlockTerrain, TraceHit, VoxelTracer};

    /// Tracer that replays a fixed answer and remembers its queries.
    struct ScriptedTracer {
        answer: Option<TraceHit>,
        calls: Mutex<Vec<(Vec3, Vec3, f32)>>,
    }

    impl ScriptedTracer {
        fn new(answer: Option<TraceHit>) -> Self {
            Self {
                answer,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Tracer for ScriptedTracer {
        fn trace(&self, _t: &dyn Terrain, origin: Vec3, dir: Vec3, max: f32) -> Option<TraceHit> {
            self.calls.lock().unwrap().push((origin, dir, max));
            self.answer
        }
    }

    fn grounded_at(y: f64) -> Body {
        Body {
            position: DVec3::new(0.5, y, 0.5),
            on_ground: true,
            ..Default::default()
        }
    }

    #[test]
    fn grounded_body_at_rest_does_not_move() {
        let terrain = BlockTerrain::flat(4);
        let tracer = ScriptedTracer::new(None);
        let mut body = grounded_at(5.0);

        let moved = SweptPhysics::default().step(&mut body, 0.05, &terrain, &tracer);

        assert!(!moved);
        assert_eq!(body.position, DVec3::new(0.5, 5.0, 0.5));
        assert!(body.dirty.is_empty());
        assert_eq!(tracer.calls(), 0, "zero velocity skips the trace");
    }

    #[test]
    fn free_fall_accumulates_gravity() {
        let terrain = BlockTerrain::void();
        let tracer = ScriptedTracer::new(None);
        let mut body = Body::at(DVec3::new(0.0, 50.0, 0.0));

        SweptPhysics::default().step(&mut body, 0.1, &terrain, &tracer);

        assert!((body.velocity.y - (-0.981)).abs() < 1e-6);
        assert!((body.position.y - (50.0 - 0.0981)).abs() < 1e-5);
        assert!(body.dirty.contains(Dirty::POSITION));
    }

    #[test]
    fn ground_drag_damps_and_snaps() {
        let terrain = BlockTerrain::flat(4);
        let tracer = ScriptedTracer::new(None);
        let mut body = grounded_at(5.0);
        body.velocity = Vec3::new(1.0, 0.0, 0.06);

        SweptPhysics::default().step(&mut body, 0.0, &terrain, &tracer);

        assert!((body.velocity.x - 0.7).abs() < 1e-6);
        assert_eq!(body.velocity.z, 0.0);
    }

    #[test]
    fn embedded_body_is_lifted() {
        let terrain = BlockTerrain::flat(4);
        let tracer = ScriptedTracer::new(None);
        let mut body = grounded_at(4.5);

        SweptPhysics::default().step(&mut body, 0.05, &terrain, &tracer);

        assert!(body.on_ground);
        assert!((body.position.y - 4.7).abs() < 1e-9);
        assert!(body.dirty.contains(Dirty::POSITION));
    }

    #[test]
    fn walking_off_a_ledge_starts_falling() {
        let terrain = BlockTerrain::void();
        let tracer = ScriptedTracer::new(None);
        let mut body = grounded_at(5.0);

        SweptPhysics::default().step(&mut body, 0.1, &terrain, &tracer);

        assert!(!body.on_ground);
        assert!(body.velocity.y < 0.0);
    }

    #[test]
    fn hit_beyond_travel_keeps_velocity() {
        let terrain = BlockTerrain::void();
        let tracer = ScriptedTracer::new(Some(TraceHit {
            point: Vec3::new(0.0, 8.5, 0.0),
            normal: Vec3::UP,
        }));
        let mut body = Body::at(DVec3::new(0.0, 10.0, 0.0));
        body.velocity = Vec3::new(0.0, -1.0, 0.0);

        SweptPhysics::default().step(&mut body, 0.1, &terrain, &tracer);

        let expected_vy = -1.0 + -9.81 * 0.1;
        assert!((body.velocity.y - expected_vy).abs() < 1e-6);
        assert!(!body.on_ground);
        assert!((body.position.y - (10.0 + expected_vy as f64 * 0.1)).abs() < 1e-5);
    }

    #[test]
    fn hit_within_travel_zeroes_normal_axes_and_grounds() {
        let terrain = BlockTerrain::void();
        let tracer = ScriptedTracer::new(Some(TraceHit {
            point: Vec3::new(0.0, 9.9, 0.0),
            normal: Vec3::UP,
        }));
        let mut body = Body::at(DVec3::new(0.0, 10.0, 0.0));
        body.velocity = Vec3::new(2.0, -5.0, 1.0);

        SweptPhysics::default().step(&mut body, 0.1, &terrain, &tracer);

        assert_eq!(body.velocity.y, 0.0);
        assert_eq!(body.velocity.x, 2.0);
        assert_eq!(body.velocity.z, 1.0);
        assert!(body.on_ground);
        assert!((body.position.y - 10.1).abs() < 1e-5);
    }

    #[test]
    fn wall_hit_zeroes_horizontal_axis_only() {
        let terrain = BlockTerrain::void();
        let tracer = ScriptedTracer::new(Some(TraceHit {
            point: Vec3::new(1.0, 10.0, 0.0),
            normal: Vec3::new(-1.0, 0.0, 0.0),
        }));
        let mut body = Body::at(DVec3::new(0.9, 10.0, 0.0));
        body.velocity = Vec3::new(4.0, 0.0, 0.0);

        SweptPhysics::default().step(&mut body, 0.1, &terrain, &tracer);

        assert_eq!(body.velocity.x, 0.0);
        assert!(!body.on_ground);
        assert!((body.position.x - 0.8).abs() < 1e-5);
    }

    #[test]
    fn falling_body_lands_on_voxel_floor() {
        let terrain = BlockTerrain::flat(4);
        let mut body = Body::at(DVec3::new(0.5, 7.0, 0.5));

        let physics = SweptPhysics::default();
        for _ in 0..200 {
            physics.step(&mut body, 0.05, &terrain, &VoxelTracer);
        }

        assert!(body.on_ground);
        assert!(body.position.y >= 5.0 && body.position.y < 5.5, "{:?}", body.position);
        assert!(!terrain.is_solid(0, body.position.y.floor() as i32, 0));
    }

    #[test]
    fn body_setters_mark_dirty_only_on_change() {
        let mut body = Body::default();
        body.set_yaw(0.0);
        assert!(body.dirty.is_empty());
        body.set_yaw(90.0);
        assert_eq!(body.dirty, Dirty::ORIENTATION);
        body.set_position(DVec3::new(1.0, 0.0, 0.0));
        assert!(body.dirty.contains(Dirty::POSITION | Dirty::ORIENTATION));
    }
}
