//! Reference ledger.
//!
//! Cross-entity pointers are stored as [`WeakRef`] handles in well-known
//! fields ([`RefField`]) of their owner. Every such field is registered here
//! as a [`Slot`] so that destroying the referent can find and clear it.
//!
//! Two layers keep pointers valid:
//! - Handles carry the referent's generation. Destroying an entity bumps its
//!   generation, so [`Ledger::resolve`] returns `None` for it immediately.
//! - At end of tick [`Ledger::tombstone`] hands back every inbound slot so the
//!   world can null it out before the entity is released.
//!
//! The ledger never controls lifetime, only pointer validity.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ecs::EntityId;

/// Field of an entity that may hold a cross-entity pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RefField {
    /// Vehicle this entity rides.
    AttachedTo,
    /// Rider of this entity.
    Attachee,
    /// Monster AI target.
    Target,
}

/// Location of a pointer: `(owner, field)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub owner: EntityId,
    pub field: RefField,
}

impl Slot {
    pub fn new(owner: EntityId, field: RefField) -> Self {
        Self { owner, field }
    }
}

/// Weak handle to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeakRef {
    id: EntityId,
    generation: u32,
}

impl WeakRef {
    /// Raw id. Use [`Ledger::resolve`] to learn whether it is still alive.
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Entry {
    generation: u32,
    live: bool,
    /// Slots elsewhere that hold this entity.
    referencers: HashSet<Slot>,
    /// Pointers this entity holds, by field.
    references: HashMap<RefField, EntityId>,
}

/// Per-world reference bookkeeping.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: HashMap<EntityId, Entry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an entity. Registering twice is a no-op.
    pub fn register(&mut self, id: EntityId) {
        self.entries.entry(id).or_insert_with(|| Entry {
            live: true,
            ..Default::default()
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.live)
    }

    /// Current handle for a live entity.
    pub fn weak(&self, id: EntityId) -> Option<WeakRef> {
        self.entries
            .get(&id)
            .filter(|e| e.live)
            .map(|e| WeakRef {
                id,
                generation: e.generation,
            })
    }

    /// Resolves a handle; `None` once the referent is destroyed.
    pub fn resolve(&self, weak: WeakRef) -> Option<EntityId> {
        self.entries
            .get(&weak.id)
            .filter(|e| e.live && e.generation == weak.generation)
            .map(|_| weak.id)
    }

    /// Registers `slot` as an inbound pointer on `referent`'s entry.
    pub fn referenced_by(&mut self, referent: EntityId, slot: Slot) -> bool {
        match self.entries.get_mut(&referent) {
            Some(entry) if entry.live => {
                entry.referencers.insert(slot);
                true
            }
            _ => false,
        }
    }

    /// Points `slot` at `referent`, registering both directions.
    ///
    /// Whatever the slot pointed at before is dereferenced first. Returns the
    /// handle to store in the slot, or `None` if the referent is not alive (in
    /// which case the slot ends up empty).
    pub fn add_reference(&mut self, slot: Slot, referent: EntityId) -> Option<WeakRef> {
        self.dereference(slot);
        let weak = self.weak(referent)?;
        let owner = self.entries.get_mut(&slot.owner)?;
        owner.references.insert(slot.field, referent);
        self.referenced_by(referent, slot);
        Some(weak)
    }

    /// Removes the reference held in `slot`, if any. Returns the old referent.
    pub fn dereference(&mut self, slot: Slot) -> Option<EntityId> {
        let referent = self
            .entries
            .get_mut(&slot.owner)?
            .references
            .remove(&slot.field)?;
        if let Some(entry) = self.entries.get_mut(&referent) {
            entry.referencers.remove(&slot);
        }
        Some(referent)
    }

    /// Marks an entity destroyed. Handles to it stop resolving immediately.
    ///
    /// Returns `false` if it was already destroyed or unknown.
    pub fn mark_destroyed(&mut self, id: EntityId) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.live => {
                entry.live = false;
                entry.generation = entry.generation.wrapping_add(1);
                true
            }
            _ => false,
        }
    }

    /// Forgets an entity and returns every slot that still pointed at it.
    ///
    /// The entity's own outgoing references are dropped from their referents,
    /// and the returned slots are dropped from their owners, so the caller only
    /// has to null the fields.
    pub fn tombstone(&mut self, id: EntityId) -> Vec<Slot> {
        let Some(entry) = self.entries.remove(&id) else {
            return Vec::new();
        };

        for (field, referent) in entry.references {
            if let Some(target) = self.entries.get_mut(&referent) {
                target.referencers.remove(&Slot::new(id, field));
            }
        }

        let mut inbound: Vec<Slot> = entry
            .referencers
            .into_iter()
            .filter(|slot| slot.owner != id)
            .collect();
        inbound.sort();

        for slot in &inbound {
            if let Some(owner) = self.entries.get_mut(&slot.owner) {
                if owner.references.get(&slot.field) == Some(&id) {
                    owner.references.remove(&slot.field);
                }
            }
        }

        debug!(id = %id, cleared = inbound.len(), "Ledger entry tombstoned");
        inbound
    }

    /// Outgoing references of an entity, sorted by field.
    pub fn references(&self, id: EntityId) -> Vec<(RefField, EntityId)> {
        let mut out: Vec<_> = self
            .entries
            .get(&id)
            .map(|e| e.references.iter().map(|(f, r)| (*f, *r)).collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Slots pointing at an entity, sorted.
    pub fn referencers(&self, id: EntityId) -> Vec<Slot> {
        let mut out: Vec<_> = self
            .entries
            .get(&id)
            .map(|e| e.referencers.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }
}
