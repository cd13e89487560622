//! Health and damage for living entities.

use serde::{Deserialize, Serialize};

use crate::ecs::EntityId;

/// Why damage was dealt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageKind {
    Attack,
    Fire,
    Other,
}

/// A single damage event, queued by the dealer and applied by the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageInfo {
    pub target: EntityId,
    pub attacker: Option<EntityId>,
    pub amount: i32,
    pub kind: DamageKind,
}

impl DamageInfo {
    pub fn attack(attacker: EntityId, target: EntityId, amount: i32) -> Self {
        Self {
            target,
            attacker: Some(attacker),
            amount,
            kind: DamageKind::Attack,
        }
    }

    pub fn fire(target: EntityId) -> Self {
        Self {
            target,
            attacker: None,
            amount: 1,
            kind: DamageKind::Fire,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Target was already dead or the amount was not positive.
    Ignored,
    Hurt,
    /// This hit brought health to zero.
    Killed,
}

/// Anything that has health.
pub trait Attackable {
    fn pawn(&self) -> &Pawn;
    fn pawn_mut(&mut self) -> &mut Pawn;

    fn health(&self) -> i32 {
        self.pawn().health
    }

    fn is_dead(&self) -> bool {
        self.pawn().health <= 0
    }

    fn take_damage(&mut self, info: &DamageInfo) -> DamageOutcome {
        self.pawn_mut().take_damage(info.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pawn {
    pub health: i32,
    pub max_health: i32,
}

impl Pawn {
    pub fn new(max_health: i32) -> Self {
        Self {
            health: max_health,
            max_health,
        }
    }

    pub fn take_damage(&mut self, amount: i32) -> DamageOutcome {
        if self.health <= 0 || amount <= 0 {
            return DamageOutcome::Ignored;
        }
        self.health = (self.health - amount).max(0);
        if self.health == 0 {
            DamageOutcome::Killed
        } else {
            DamageOutcome::Hurt
        }
    }

    /// Current health never exceeds the new maximum.
    pub fn set_max_health(&mut self, max_health: i32) {
        self.max_health = max_health;
        self.health = self.health.min(max_health);
    }
}

impl Attackable for Pawn {
    fn pawn(&self) -> &Pawn {
        self
    }

    fn pawn_mut(&mut self) -> &mut Pawn {
        self
    }
}
