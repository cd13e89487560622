//! Per-tick context and cross-entity effects.
//!
//! An entity only mutates its own fields while it ticks. Anything that touches
//! another entity (damage, destruction) is pushed as an [`Effect`] and applied
//! by the world between entity ticks, in push order.

use std::collections::{BTreeMap, VecDeque};

use rand::RngCore;

use crate::{
    ecs::EntityId,
    entity::Entity,
    ledger::Ledger,
    math::DVec3,
    pawn::DamageInfo,
    terrain::{Terrain, Tracer},
};

/// Deferred cross-entity mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Damage(DamageInfo),
    Destroy(EntityId),
}

/// FIFO of pending effects.
#[derive(Debug, Default)]
pub struct EffectQueue {
    queue: VecDeque<Effect>,
}

impl EffectQueue {
    pub fn push(&mut self, effect: Effect) {
        self.queue.push_back(effect);
    }

    pub fn pop(&mut self) -> Option<Effect> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drains all queued effects in push order.
    pub fn drain(&mut self) -> Vec<Effect> {
        self.queue.drain(..).collect()
    }
}

/// Everything an entity may read or queue during its tick.
///
/// `others` holds every entity except the one being ticked.
pub struct TickContext<'w> {
    pub dt: f32,
    pub world_age: u64,
    pub terrain: &'w dyn Terrain,
    pub tracer: &'w dyn Tracer,
    pub others: &'w BTreeMap<EntityId, Entity>,
    pub ledger: &'w mut Ledger,
    pub rng: &'w mut dyn RngCore,
    pub effects: &'w mut EffectQueue,
}

impl TickContext<'_> {
    /// Position of another entity that is neither destroyed nor dead.
    pub fn position_of(&self, id: EntityId) -> Option<DVec3> {
        self.others
            .get(&id)
            .filter(|e| !e.is_destroyed() && e.health().map_or(true, |h| h > 0))
            .map(|e| e.body.position)
    }

    /// Nothing solid between `from` and `to`.
    pub fn line_of_sight(&self, from: DVec3, to: DVec3) -> bool {
        let delta = (to - from).as_vec();
        let dist = delta.len();
        dist == 0.0
            || self
                .tracer
                .trace(self.terrain, from.as_vec(), delta, dist)
                .is_none()
    }

    /// Closest living player within `max_distance` of `position` that is in
    /// line of sight.
    pub fn find_closest_player(&self, position: DVec3, max_distance: f64) -> Option<EntityId> {
        find_closest_player(self.others, position, max_distance, |at| {
            self.line_of_sight(position, at)
        })
    }
}

/// Scans `entities` for the closest living, non-destroyed player whose
/// position passes `visible`.
pub fn find_closest_player(
    entities: &BTreeMap<EntityId, Entity>,
    position: DVec3,
    max_distance: f64,
    mut visible: impl FnMut(DVec3) -> bool,
) -> Option<EntityId> {
    let mut best: Option<(EntityId, f64)> = None;
    for (id, e) in entities {
        if e.is_destroyed() || !e.is_player() {
            continue;
        }
        if e.health().is_some_and(|h| h <= 0) {
            continue;
        }
        let dist = (e.body.position - position).len();
        if dist > max_distance {
            continue;
        }
        if best.map_or(true, |(_, d)| dist < d) && visible(e.body.position) {
            best = Some((*id, dist));
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pawn::DamageInfo;

    #[test]
    fn effects_drain_in_push_order() {
        let mut q = EffectQueue::default();
        q.push(Effect::Destroy(EntityId(2)));
        q.push(Effect::Damage(DamageInfo::fire(EntityId(1))));
        assert_eq!(q.len(), 2);

        let drained = q.drain();
        assert_eq!(drained[0], Effect::Destroy(EntityId(2)));
        assert!(matches!(drained[1], Effect::Damage(_)));
        assert!(q.is_empty());
    }

    #[test]
    fn closest_player_ignores_non_players_and_range() {
        let mut entities = BTreeMap::new();
        entities.insert(
            EntityId(1),
            Entity::player(EntityId(1), DVec3::new(10.0, 0.0, 0.0), 20),
        );
        entities.insert(
            EntityId(2),
            Entity::player(EntityId(2), DVec3::new(3.0, 0.0, 0.0), 20),
        );
        entities.insert(
            EntityId(3),
            Entity::generic(EntityId(3), DVec3::new(1.0, 0.0, 0.0)),
        );
        entities.insert(
            EntityId(4),
            Entity::player(EntityId(4), DVec3::new(40.0, 0.0, 0.0), 20),
        );

        assert_eq!(
            find_closest_player(&entities, DVec3::ZERO, 25.0, |_| true),
            Some(EntityId(2))
        );
        assert_eq!(find_closest_player(&entities, DVec3::ZERO, 2.0, |_| true), None);
    }

    #[test]
    fn closest_player_must_be_visible() {
        let mut entities = BTreeMap::new();
        entities.insert(
            EntityId(1),
            Entity::player(EntityId(1), DVec3::new(3.0, 0.0, 0.0), 20),
        );
        entities.insert(
            EntityId(2),
            Entity::player(EntityId(2), DVec3::new(-8.0, 0.0, 0.0), 20),
        );

        let behind_wall = |at: DVec3| at.x < 2.0;
        assert_eq!(
            find_closest_player(&entities, DVec3::ZERO, 25.0, behind_wall),
            Some(EntityId(2))
        );
        assert_eq!(
            find_closest_player(&entities, DVec3::ZERO, 25.0, |_| false),
            None
        );
    }

    #[test]
    fn closest_player_skips_dead_and_destroyed() {
        let mut entities = BTreeMap::new();
        let mut dead = Entity::player(EntityId(1), DVec3::new(1.0, 0.0, 0.0), 20);
        if let Some(pawn) = dead.as_attackable_mut() {
            pawn.pawn_mut().health = 0;
        }
        let mut gone = Entity::player(EntityId(2), DVec3::new(2.0, 0.0, 0.0), 20);
        gone.destroy();
        entities.insert(EntityId(1), dead);
        entities.insert(EntityId(2), gone);
        entities.insert(
            EntityId(3),
            Entity::player(EntityId(3), DVec3::new(5.0, 0.0, 0.0), 20),
        );

        assert_eq!(
            find_closest_player(&entities, DVec3::ZERO, 25.0, |_| true),
            Some(EntityId(3))
        );
    }
}
