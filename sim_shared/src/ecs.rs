//! Entity identity.
//!
//! Ids come from an [`IdAllocator`] owned by the world (or whoever constructs
//! entities). The allocator is a shared atomic counter so entity construction
//! may happen from several triggering paths without extra locking, while
//! tests can still build isolated counters.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

use crate::math::DVec3;

/// Process-unique entity id. Never reused within an allocator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source. Cloning shares the underlying counter.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: Arc<AtomicU32>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdAllocator {
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: Arc::new(AtomicU32::new(first)),
        }
    }

    /// Hands out the next id.
    pub fn allocate(&self) -> EntityId {
        EntityId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Peeks at the id the next call to [`allocate`](Self::allocate) returns.
    pub fn peek(&self) -> EntityId {
        EntityId(self.next.load(Ordering::Relaxed))
    }
}

/// Closed set of entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Generic,
    Player,
    Pickup,
    Monster,
    FallingBlock,
    Minecart,
}

impl EntityKind {
    pub fn class_name(self) -> &'static str {
        match self {
            EntityKind::Generic => "Entity",
            EntityKind::Player => "Player",
            EntityKind::Pickup => "Pickup",
            EntityKind::Monster => "Monster",
            EntityKind::FallingBlock => "FallingBlock",
            EntityKind::Minecart => "Minecart",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Horizontal chunk extent in blocks.
pub const CHUNK_WIDTH: i32 = 16;
/// Vertical chunk extent in blocks.
pub const CHUNK_HEIGHT: i32 = 256;

/// Coordinate of the chunk containing a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub fn containing(pos: DVec3) -> Self {
        let (bx, by, bz) = pos.block();
        Self {
            x: bx.div_euclid(CHUNK_WIDTH),
            y: by.div_euclid(CHUNK_HEIGHT),
            z: bz.div_euclid(CHUNK_WIDTH),
        }
    }
}
