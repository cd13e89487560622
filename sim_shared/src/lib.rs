//! `sim_shared`
//!
//! Live-entity simulation core: identity and lifecycle, the reference ledger,
//! attachment, physics, movement replication and monster AI.
//!
//! Design goals:
//! - Deterministic per seed: one tick thread, one seeded AI random stream.
//! - Cross-entity pointers are weak handles tracked by the ledger.
//! - Traits at the collaborator seams (terrain, tracer, physics, species).
//! - No `unsafe`.

pub mod behavior;
pub mod config;
pub mod ecs;
pub mod entity;
pub mod error;
pub mod event;
pub mod ledger;
pub mod math;
pub mod monster;
pub mod net;
pub mod pawn;
pub mod physics;
pub mod replication;
pub mod terrain;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::behavior::*;
    pub use crate::config::*;
    pub use crate::ecs::*;
    pub use crate::entity::*;
    pub use crate::error::*;
    pub use crate::ledger::*;
    pub use crate::math::*;
    pub use crate::monster::*;
    pub use crate::net::*;
    pub use crate::pawn::*;
    pub use crate::physics::*;
    pub use crate::terrain::*;
    pub use crate::world::*;
}
