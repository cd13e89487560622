//! Outgoing replication messages.
//!
//! The simulation produces [`NetMsg`] values for the networking collaborator
//! to broadcast. Transport and byte layout belong to the protocol layer; the
//! helpers here only give it a versionable serde encoding to start from.

use anyhow::Context;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    ecs::{EntityId, EntityKind},
    math::DVec3,
};

/// Entity status codes carried by [`NetMsg::EntityStatus`].
pub const ENTITY_STATUS_HURT: u8 = 2;
pub const ENTITY_STATUS_DEAD: u8 = 3;

/// Message envelope handed to the broadcast layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Lifecycle ───
    /// A non-mob entity entered the world.
    SpawnEntity {
        id: EntityId,
        kind: EntityKind,
        position: DVec3,
    },
    /// A monster entered the world.
    SpawnMob {
        id: EntityId,
        mob_type: String,
        position: DVec3,
        yaw: f32,
        pitch: f32,
    },
    /// The entity is gone.
    DestroyEntity { id: EntityId },
    /// `rider` now rides `vehicle`, or nothing when `None`.
    AttachEntity {
        rider: EntityId,
        vehicle: Option<EntityId>,
    },

    // ─── Movement ───
    /// Absolute position and orientation.
    Teleport {
        id: EntityId,
        position: DVec3,
        yaw: f32,
        pitch: f32,
    },
    /// Position delta in 1/32 block steps.
    RelMove { id: EntityId, dx: i8, dy: i8, dz: i8 },
    /// Position delta plus orientation.
    RelMoveLook {
        id: EntityId,
        dx: i8,
        dy: i8,
        dz: i8,
        yaw: f32,
        pitch: f32,
    },
    /// Orientation only.
    Look { id: EntityId, yaw: f32, pitch: f32 },

    // ─── Feedback ───
    EntityStatus { id: EntityId, status: u8 },
    /// Positional sound; coordinates are in 1/8 block units.
    SoundEffect {
        name: String,
        x: i32,
        y: i32,
        z: i32,
        volume: f32,
        pitch: f32,
    },
}

impl NetMsg {
    /// Entity the message is about, if any.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            NetMsg::SpawnEntity { id, .. }
            | NetMsg::SpawnMob { id, .. }
            | NetMsg::DestroyEntity { id }
            | NetMsg::Teleport { id, .. }
            | NetMsg::RelMove { id, .. }
            | NetMsg::RelMoveLook { id, .. }
            | NetMsg::Look { id, .. }
            | NetMsg::EntityStatus { id, .. } => Some(*id),
            NetMsg::AttachEntity { rider, .. } => Some(*rider),
            NetMsg::SoundEffect { .. } => None,
        }
    }

    /// Builds a sound message at a world position.
    pub fn sound(name: &str, at: DVec3) -> Self {
        NetMsg::SoundEffect {
            name: name.to_string(),
            x: (at.x * 8.0) as i32,
            y: (at.y * 8.0) as i32,
            z: (at.z * 8.0) as i32,
            volume: 1.0,
            pitch: 0.8,
        }
    }
}

pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netmsg_roundtrip_bytes() {
        let msg = NetMsg::RelMoveLook {
            id: EntityId(7),
            dx: -3,
            dy: 0,
            dz: 127,
            yaw: 90.0,
            pitch: -10.0,
        };
        let bytes = encode_to_bytes(&msg).unwrap();
        let back = decode_from_bytes(&bytes).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn sound_position_is_scaled_by_eight() {
        let msg = NetMsg::sound("mob.zombie.hurt", DVec3::new(1.5, 64.0, -2.25));
        match msg {
            NetMsg::SoundEffect { x, y, z, .. } => assert_eq!((x, y, z), (12, 512, -18)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(decode_from_bytes(b"not json").is_err());
    }
}
