//! Movement replication gate.
//!
//! Turns the dirty flags left by physics and AI into at most one movement
//! message per tick. Small moves go out as relative deltas; large jumps, or a
//! long stretch without an absolute fix, go out as a teleport so client-side
//! rounding error cannot accumulate forever.

use crate::{
    ecs::EntityId,
    math::DVec3,
    net::NetMsg,
    physics::{Body, Dirty},
};

/// Squared distance above which a relative move cannot be used (4 blocks).
pub const MAX_RELATIVE_MOVE_SQ: f32 = 16.0;
/// World ticks after which an absolute update is forced.
pub const TELEPORT_INTERVAL_TICKS: u64 = 40;
/// Relative moves are sent in 1/32 block steps.
pub const RELATIVE_MOVE_SCALE: f32 = 32.0;

/// What the clients were last told about an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicationState {
    last_position: DVec3,
    last_teleport_age: u64,
}

impl ReplicationState {
    pub fn new(position: DVec3, world_age: u64) -> Self {
        Self {
            last_position: position,
            last_teleport_age: world_age,
        }
    }

    pub fn last_position(&self) -> DVec3 {
        self.last_position
    }

    pub fn last_teleport_age(&self) -> u64 {
        self.last_teleport_age
    }

    /// Decides the update for this tick and clears the body's dirty flags.
    pub fn replicate(&mut self, id: EntityId, body: &mut Body, world_age: u64) -> Option<NetMsg> {
        let yaw = body.rotation.x as f32;
        let pitch = body.rotation.y as f32;

        if !body.dirty.contains(Dirty::POSITION) {
            if body.dirty.contains(Dirty::ORIENTATION) {
                body.dirty = Dirty::empty();
                return Some(NetMsg::Look { id, yaw, pitch });
            }
            return None;
        }

        let diff = (body.position - self.last_position).as_vec();
        let stale = world_age.saturating_sub(self.last_teleport_age) > TELEPORT_INTERVAL_TICKS;

        let msg = if diff.len_sq() > MAX_RELATIVE_MOVE_SQ || stale {
            self.last_teleport_age = world_age;
            NetMsg::Teleport {
                id,
                position: body.position,
                yaw,
                pitch,
            }
        } else {
            let (dx, dy, dz) = (encode_delta(diff.x), encode_delta(diff.y), encode_delta(diff.z));
            if body.dirty.contains(Dirty::ORIENTATION) {
                NetMsg::RelMoveLook {
                    id,
                    dx,
                    dy,
                    dz,
                    yaw,
                    pitch,
                }
            } else {
                NetMsg::RelMove { id, dx, dy, dz }
            }
        };

        self.last_position = body.position;
        body.dirty = Dirty::empty();
        Some(msg)
    }
}

/// `round(delta * 32)` saturated into a signed byte.
pub fn encode_delta(delta: f32) -> i8 {
    (delta * RELATIVE_MOVE_SCALE)
        .round()
        .clamp(i8::MIN as f32, i8::MAX as f32) as i8
}
