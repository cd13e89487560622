//! Domain errors.
//!
//! These are caller errors and invariant violations surfaced by world and
//! monster operations. None of them abort a world tick; the world logs them
//! per entity and carries on.

use thiserror::Error;

use crate::ecs::{EntityId, EntityKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("entity {0} is destroyed")]
    Destroyed(EntityId),
    #[error("entity {0} is already in the world")]
    AlreadyInitialized(EntityId),
    #[error("entity {0} cannot be attached to itself")]
    SelfAttach(EntityId),
    #[error("attaching {child} to {parent} would create an attachment chain")]
    AttachChain { child: EntityId, parent: EntityId },
    #[error("entity {id} is a {kind}, not a {expected}")]
    WrongKind {
        id: EntityId,
        kind: EntityKind,
        expected: EntityKind,
    },
    #[error("unknown AI state '{0}'")]
    UnknownState(String),
    #[error("unknown species '{0}'")]
    UnknownSpecies(String),
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),
    #[error("invalid value '{value}' for attribute '{name}'")]
    InvalidAttribute { name: String, value: String },
}

pub type SimResult<T> = Result<T, SimError>;
