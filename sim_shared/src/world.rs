//! The live entity set and its per-tick update.
//!
//! Tick order for every entity (in id order):
//! 1. physics (simulated kinds only),
//! 2. movement replication,
//! 3. entity logic (burning, monster AI),
//! 4. chunk re-homing,
//! 5. queued cross-entity effects.
//!
//! At the end of the tick the world age advances and destroyed entities are
//! flushed: terminal broadcasts, ledger slots nulled, chunk index updated,
//! entity released.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, warn};

use crate::{
    behavior::{build_species, AiControlled},
    config::{AttributeValue, MonsterAttributes, SimConfig, SpeciesConfig},
    ecs::{ChunkCoord, EntityId, IdAllocator},
    entity::{Entity, EntityData, ItemStack, Movable, PLAYER_MAX_HEALTH},
    error::{SimError, SimResult},
    event::{Effect, EffectQueue, TickContext},
    ledger::{Ledger, RefField, Slot},
    math::{DVec3, Vec3},
    monster::Monster,
    net::{NetMsg, ENTITY_STATUS_DEAD, ENTITY_STATUS_HURT},
    pawn::{DamageInfo, DamageOutcome, Pawn},
    physics::{PhysicsBackend, SweptPhysics},
    terrain::{Terrain, Tracer, VoxelTracer},
};

pub struct World {
    ids: IdAllocator,
    entities: BTreeMap<EntityId, Entity>,
    chunks: HashMap<ChunkCoord, BTreeSet<EntityId>>,
    ledger: Ledger,
    terrain: Box<dyn Terrain>,
    tracer: Box<dyn Tracer>,
    physics: Box<dyn PhysicsBackend>,
    /// Tick-scoped AI random stream.
    rng: StdRng,
    world_age: u64,
    pending_destroy: Vec<EntityId>,
    outbox: Vec<NetMsg>,
    effects: EffectQueue,
    species: BTreeMap<String, SpeciesConfig>,
}

impl World {
    /// New empty world with swept physics and the voxel tracer.
    pub fn new(terrain: impl Terrain + 'static, seed: u64) -> Self {
        Self {
            ids: IdAllocator::default(),
            entities: BTreeMap::new(),
            chunks: HashMap::new(),
            ledger: Ledger::new(),
            terrain: Box::new(terrain),
            tracer: Box::new(VoxelTracer),
            physics: Box::new(SweptPhysics::default()),
            rng: StdRng::seed_from_u64(seed),
            world_age: 0,
            pending_destroy: Vec::new(),
            outbox: Vec::new(),
            effects: EffectQueue::default(),
            species: BTreeMap::new(),
        }
    }

    /// World seeded and stocked with the species table of `cfg`.
    pub fn from_config(cfg: &SimConfig, terrain: impl Terrain + 'static) -> Self {
        Self::new(terrain, cfg.seed).with_species(cfg.species.clone())
    }

    /// Shares an id counter with other constructors of entities.
    pub fn with_ids(mut self, ids: IdAllocator) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    pub fn with_physics(mut self, physics: impl PhysicsBackend + 'static) -> Self {
        self.physics = Box::new(physics);
        self
    }

    pub fn with_species(mut self, species: BTreeMap<String, SpeciesConfig>) -> Self {
        self.species = species;
        self
    }

    // ─── Queries ───

    pub fn world_age(&self) -> u64 {
        self.world_age
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn terrain(&self) -> &dyn Terrain {
        self.terrain.as_ref()
    }

    pub fn species_names(&self) -> impl Iterator<Item = &str> {
        self.species.keys().map(String::as_str)
    }

    pub fn entities_in_chunk(&self, chunk: ChunkCoord) -> Vec<EntityId> {
        self.chunks
            .get(&chunk)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Messages produced since the last drain, in order.
    pub fn drain_broadcasts(&mut self) -> Vec<NetMsg> {
        std::mem::take(&mut self.outbox)
    }

    fn entity(&self, id: EntityId) -> SimResult<&Entity> {
        self.entities.get(&id).ok_or(SimError::UnknownEntity(id))
    }

    fn entity_mut(&mut self, id: EntityId) -> SimResult<&mut Entity> {
        self.entities.get_mut(&id).ok_or(SimError::UnknownEntity(id))
    }

    fn live_entity(&self, id: EntityId) -> SimResult<&Entity> {
        let e = self.entity(id)?;
        if e.is_destroyed() {
            return Err(SimError::Destroyed(id));
        }
        Ok(e)
    }

    // ─── Lifecycle ───

    /// Builds an entity with the next id. It is not part of the world until
    /// [`initialize`](Self::initialize).
    pub fn create(&self, data: EntityData, position: DVec3) -> Entity {
        Entity::new(self.ids.allocate(), data, position)
    }

    /// Enters an entity into the entity set, chunk index and ledger, and
    /// announces it to clients.
    pub fn initialize(&mut self, entity: Entity) -> SimResult<EntityId> {
        let id = entity.id();
        if self.entities.contains_key(&id) {
            return Err(SimError::AlreadyInitialized(id));
        }
        Ok(self.insert(entity))
    }

    fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = entity.id();
        entity.reset_replication(self.world_age);
        self.ledger.register(id);
        self.chunks.entry(entity.chunk()).or_default().insert(id);
        self.outbox.push(entity.spawn_message());
        debug!(id = %id, kind = %entity.kind(), "Entity initialized");
        self.entities.insert(id, entity);
        id
    }

    /// Create + initialize.
    pub fn spawn(&mut self, data: EntityData, position: DVec3) -> EntityId {
        let entity = self.create(data, position);
        self.insert(entity)
    }

    pub fn spawn_player(&mut self, position: DVec3) -> EntityId {
        self.spawn(EntityData::Player(Pawn::new(PLAYER_MAX_HEALTH)), position)
    }

    pub fn spawn_pickup(&mut self, position: DVec3, stack: ItemStack) -> EntityId {
        self.spawn(EntityData::Pickup(stack), position)
    }

    /// Spawns a monster of a configured species.
    pub fn spawn_monster(&mut self, species: &str, position: DVec3) -> SimResult<EntityId> {
        let cfg = self
            .species
            .get(species)
            .ok_or_else(|| SimError::UnknownSpecies(species.to_string()))?;
        let (ai, attrs) = (build_species(cfg), cfg.attributes.clone());
        Ok(self.spawn_monster_with(ai, attrs, position))
    }

    pub fn spawn_monster_with(
        &mut self,
        species: Arc<dyn AiControlled>,
        attrs: MonsterAttributes,
        position: DVec3,
    ) -> EntityId {
        let monster = Monster::new(species, attrs);
        self.spawn(EntityData::Monster(Box::new(monster)), position)
    }

    /// Marks an entity destroyed and schedules its removal at end of tick.
    ///
    /// Handles to it stop resolving immediately. Returns `false` if it was
    /// already destroyed.
    pub fn destroy(&mut self, id: EntityId) -> SimResult<bool> {
        let entity = self.entity_mut(id)?;
        if !entity.destroy() {
            return Ok(false);
        }
        self.ledger.mark_destroyed(id);
        self.pending_destroy.push(id);
        debug!(id = %id, "Entity destroyed");
        Ok(true)
    }

    fn flush_destroyed(&mut self) {
        for id in std::mem::take(&mut self.pending_destroy) {
            let Some(entity) = self.entities.remove(&id) else {
                continue;
            };

            // A rider left on a dead vehicle is dismounted.
            if let Some(rider) = entity.attachee() {
                if self.entities.contains_key(&rider.id()) {
                    self.outbox.push(NetMsg::AttachEntity {
                        rider: rider.id(),
                        vehicle: None,
                    });
                }
            }

            for slot in self.ledger.tombstone(id) {
                if let Some(owner) = self.entities.get_mut(&slot.owner) {
                    owner.set_ref(slot.field, None);
                }
            }

            if let Some(ids) = self.chunks.get_mut(&entity.chunk()) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.chunks.remove(&entity.chunk());
                }
            }

            self.outbox.push(NetMsg::DestroyEntity { id });
            debug!(id = %id, kind = %entity.kind(), "Entity removed");
        }
    }

    // ─── Attachment ───

    /// Attaches `child` to `parent`, detaching whatever either was linked to.
    pub fn attach(&mut self, child: EntityId, parent: EntityId) -> SimResult<()> {
        if child == parent {
            return Err(SimError::SelfAttach(child));
        }
        let child_e = self.live_entity(child)?;
        let parent_e = self.live_entity(parent)?;

        let chain = parent_e
            .attached_to()
            .and_then(|w| self.ledger.resolve(w))
            .is_some()
            || child_e
                .attachee()
                .and_then(|w| self.ledger.resolve(w))
                .is_some();
        if chain {
            return Err(SimError::AttachChain { child, parent });
        }
        if child_e.attached_to().map(|w| w.id()) == Some(parent) {
            return Ok(());
        }
        let old_rider = parent_e.attachee().map(|w| w.id());

        self.detach(child)?;
        if let Some(rider) = old_rider {
            if self.entities.contains_key(&rider) {
                self.detach(rider)?;
            }
        }

        let up = self
            .ledger
            .add_reference(Slot::new(child, RefField::AttachedTo), parent);
        let down = self
            .ledger
            .add_reference(Slot::new(parent, RefField::Attachee), child);
        self.entity_mut(child)?.set_ref(RefField::AttachedTo, up);
        self.entity_mut(parent)?.set_ref(RefField::Attachee, down);

        self.outbox.push(NetMsg::AttachEntity {
            rider: child,
            vehicle: Some(parent),
        });
        debug!(child = %child, parent = %parent, "Attached");
        Ok(())
    }

    /// Clears both sides of `child`'s attachment. Returns whether it was attached.
    pub fn detach(&mut self, child: EntityId) -> SimResult<bool> {
        let Some(link) = self.entity(child)?.attached_to() else {
            return Ok(false);
        };
        let parent = link.id();

        self.ledger
            .dereference(Slot::new(child, RefField::AttachedTo));
        self.entity_mut(child)?.set_ref(RefField::AttachedTo, None);

        if let Some(p) = self.entities.get_mut(&parent) {
            if p.attachee().map(|w| w.id()) == Some(child) {
                self.ledger
                    .dereference(Slot::new(parent, RefField::Attachee));
                p.set_ref(RefField::Attachee, None);
            }
        }

        self.outbox.push(NetMsg::AttachEntity {
            rider: child,
            vehicle: None,
        });
        debug!(child = %child, parent = %parent, "Detached");
        Ok(true)
    }

    // ─── Entity mutation ───

    /// Moves an entity, keeping the chunk index current.
    pub fn set_entity_position(&mut self, id: EntityId, position: DVec3) -> SimResult<()> {
        let entity = self.entities.get_mut(&id).ok_or(SimError::UnknownEntity(id))?;
        entity.body.set_position(position);
        if let Some(old) = entity.rehome() {
            let new = entity.chunk();
            Self::reindex(&mut self.chunks, id, old, new);
        }
        Ok(())
    }

    pub fn set_entity_velocity(&mut self, id: EntityId, velocity: Vec3) -> SimResult<()> {
        self.entity_mut(id)?.set_velocity(velocity);
        Ok(())
    }

    pub fn set_on_fire(&mut self, id: EntityId, seconds: f32) -> SimResult<()> {
        self.entity_mut(id)?.set_on_fire(seconds);
        Ok(())
    }

    /// Sets a monster's AI state by label.
    pub fn set_monster_state(&mut self, id: EntityId, label: &str) -> SimResult<()> {
        self.entity_mut(id)?.expect_monster_mut()?.set_state(label)
    }

    /// Assigns one monster tunable by name.
    pub fn set_monster_attribute(
        &mut self,
        id: EntityId,
        name: &str,
        value: &AttributeValue,
    ) -> SimResult<()> {
        self.entity_mut(id)?
            .expect_monster_mut()?
            .set_attribute(name, value)
    }

    /// Points a monster at `target` (or clears it) through the ledger.
    pub fn set_monster_target(&mut self, id: EntityId, target: Option<EntityId>) -> SimResult<()> {
        if let Some(t) = target {
            self.live_entity(t)?;
        }
        let entity = self.entities.get_mut(&id).ok_or(SimError::UnknownEntity(id))?;
        entity
            .expect_monster_mut()?
            .assign_target(id, &mut self.ledger, target);
        Ok(())
    }

    /// Applies one damage event to its target.
    ///
    /// Damaged monsters retarget their attacker and react per species; hurt
    /// and death sounds are broadcast and killed monsters roll their drops.
    pub fn apply_damage(&mut self, info: DamageInfo) -> SimResult<DamageOutcome> {
        let id = info.target;
        let entity = self.entities.get_mut(&id).ok_or(SimError::UnknownEntity(id))?;
        if entity.is_destroyed() {
            return Ok(DamageOutcome::Ignored);
        }
        let (kind, position) = (entity.kind(), entity.body.position);
        let Some(attackable) = entity.as_attackable_mut() else {
            debug!(id = %id, kind = %kind, "Damage to non-attackable entity ignored");
            return Ok(DamageOutcome::Ignored);
        };

        let outcome = attackable.take_damage(&info);
        if outcome == DamageOutcome::Ignored {
            return Ok(outcome);
        }

        let status = if outcome == DamageOutcome::Killed {
            ENTITY_STATUS_DEAD
        } else {
            ENTITY_STATUS_HURT
        };
        self.outbox.push(NetMsg::EntityStatus { id, status });

        let mut drops = Vec::new();
        if let Some(monster) = entity.monster_mut() {
            if let Some(attacker) = info.attacker.filter(|a| *a != id) {
                monster.assign_target(id, &mut self.ledger, Some(attacker));
            }
            let species = Arc::clone(monster.species());
            species.on_damaged(monster, info.attacker);

            let attrs = monster.attributes();
            let sound = match outcome {
                DamageOutcome::Killed => &attrs.sound_death,
                _ => &attrs.sound_hurt,
            };
            if !sound.is_empty() {
                self.outbox.push(NetMsg::sound(sound, position));
            }

            if outcome == DamageOutcome::Killed {
                monster.on_killed();
                drops = monster.drops();
            }
        }

        if outcome == DamageOutcome::Killed {
            debug!(id = %id, kind = %kind, "Killed");
        }
        for stack in drops {
            self.spawn_pickup(position, stack);
        }
        Ok(outcome)
    }

    // ─── Tick ───

    /// Advances every entity by `dt` seconds, then flushes destroyed ones.
    pub fn tick(&mut self, dt: f32) {
        for id in self.entity_ids() {
            let Some(mut entity) = self.entities.remove(&id) else {
                continue;
            };
            if !entity.is_destroyed() {
                self.tick_entity(&mut entity, dt);
            }
            self.entities.insert(id, entity);
            self.apply_effects();
        }

        self.world_age += 1;
        self.flush_destroyed();
    }

    fn tick_entity(&mut self, entity: &mut Entity, dt: f32) {
        if entity.simulates_physics() {
            self.physics
                .step(&mut entity.body, dt, self.terrain.as_ref(), self.tracer.as_ref());
        }

        if let Some(msg) = entity.replicate(self.world_age) {
            self.outbox.push(msg);
        }

        let mut ctx = TickContext {
            dt,
            world_age: self.world_age,
            terrain: self.terrain.as_ref(),
            tracer: self.tracer.as_ref(),
            others: &self.entities,
            ledger: &mut self.ledger,
            rng: &mut self.rng,
            effects: &mut self.effects,
        };
        entity.tick(&mut ctx);

        if let Some(old) = entity.rehome() {
            Self::reindex(&mut self.chunks, entity.id(), old, entity.chunk());
        }
    }

    fn apply_effects(&mut self) {
        while let Some(effect) = self.effects.pop() {
            let result = match effect {
                Effect::Damage(info) => self.apply_damage(info).map(|_| ()),
                Effect::Destroy(id) => self.destroy(id).map(|_| ()),
            };
            if let Err(err) = result {
                warn!(%err, "Dropped effect");
            }
        }
    }

    fn reindex(
        chunks: &mut HashMap<ChunkCoord, BTreeSet<EntityId>>,
        id: EntityId,
        old: ChunkCoord,
        new: ChunkCoord,
    ) {
        if let Some(ids) = chunks.get_mut(&old) {
            ids.remove(&id);
            if ids.is_empty() {
                chunks.remove(&old);
            }
        }
        chunks.entry(new).or_default().insert(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        behavior::Aggressive,
        physics::NullPhysics,
        terrain::BlockTerrain,
    };

    fn world() -> World {
        World::new(BlockTerrain::flat(4), 1)
    }

    #[test]
    fn create_then_initialize() {
        let mut w = world();
        let e = w.create(EntityData::Generic, DVec3::new(1.0, 5.0, 1.0));
        let id = e.id();
        assert!(w.get(id).is_none());

        assert_eq!(w.initialize(e).unwrap(), id);
        assert!(w.ledger().is_live(id));
        assert_eq!(w.entities_in_chunk(ChunkCoord { x: 0, y: 0, z: 0 }), vec![id]);
        assert!(matches!(
            w.drain_broadcasts().as_slice(),
            [NetMsg::SpawnEntity { .. }]
        ));
    }

    #[test]
    fn initializing_twice_is_rejected() {
        let mut w = world();
        let id = w.spawn(EntityData::Generic, DVec3::ZERO);
        let dup = Entity::generic(id, DVec3::ZERO);
        assert_eq!(w.initialize(dup), Err(SimError::AlreadyInitialized(id)));
    }

    #[test]
    fn destroy_is_deferred_to_end_of_tick() {
        let mut w = world();
        let id = w.spawn(EntityData::Generic, DVec3::ZERO);
        assert_eq!(w.destroy(id), Ok(true));
        assert_eq!(w.destroy(id), Ok(false));
        assert!(w.get(id).is_some());

        w.tick(0.05);
        assert!(w.get(id).is_none());
        assert!(!w.ledger().is_live(id));
        assert!(w
            .drain_broadcasts()
            .contains(&NetMsg::DestroyEntity { id }));
        assert!(w.entities_in_chunk(ChunkCoord { x: 0, y: 0, z: 0 }).is_empty());
    }

    #[test]
    fn unknown_entities_are_reported() {
        let mut w = world();
        assert_eq!(
            w.destroy(EntityId(99)),
            Err(SimError::UnknownEntity(EntityId(99)))
        );
        assert!(w.set_monster_state(EntityId(99), "Idle").is_err());
    }

    #[test]
    fn set_state_on_non_monster_is_wrong_kind() {
        let mut w = world();
        let id = w.spawn_player(DVec3::ZERO);
        assert!(matches!(
            w.set_monster_state(id, "Idle"),
            Err(SimError::WrongKind { .. })
        ));
    }

    #[test]
    fn unknown_species_is_an_error() {
        let mut w = world();
        assert_eq!(
            w.spawn_monster("dragon", DVec3::ZERO),
            Err(SimError::UnknownSpecies("dragon".into()))
        );
    }

    #[test]
    fn moving_across_a_chunk_border_reindexes() {
        let mut w = world().with_physics(NullPhysics);
        let id = w.spawn(EntityData::Minecart, DVec3::new(15.5, 5.0, 0.5));
        w.set_entity_position(id, DVec3::new(17.0, 5.0, 0.5)).unwrap();
        assert!(w.entities_in_chunk(ChunkCoord { x: 0, y: 0, z: 0 }).is_empty());
        assert_eq!(w.entities_in_chunk(ChunkCoord { x: 1, y: 0, z: 0 }), vec![id]);
    }

    #[test]
    fn killing_a_monster_broadcasts_death_and_drops_loot() {
        let mut w = world();
        let attrs = MonsterAttributes {
            max_health: 2,
            sound_death: "mob.zombie.death".into(),
            sound_hurt: "mob.zombie.hurt".into(),
            ..Default::default()
        };
        let ai = Arc::new(Aggressive::new(vec![crate::config::DropRule {
            item: 367,
            min: 1,
            max: 1,
            damage: 0,
        }]));
        let player = w.spawn_player(DVec3::new(2.0, 5.2, 0.0));
        let mob = w.spawn_monster_with(ai, attrs, DVec3::new(0.5, 5.2, 0.5));
        w.drain_broadcasts();

        let hurt = w.apply_damage(DamageInfo::attack(player, mob, 1)).unwrap();
        assert_eq!(hurt, DamageOutcome::Hurt);
        let m = w.get(mob).and_then(Entity::monster).unwrap();
        assert_eq!(m.target_id(w.ledger()), Some(player));

        let killed = w.apply_damage(DamageInfo::attack(player, mob, 5)).unwrap();
        assert_eq!(killed, DamageOutcome::Killed);

        let out = w.drain_broadcasts();
        assert!(out.contains(&NetMsg::EntityStatus {
            id: mob,
            status: ENTITY_STATUS_DEAD
        }));
        assert!(out
            .iter()
            .any(|m| matches!(m, NetMsg::SoundEffect { name, .. } if name == "mob.zombie.death")));
        assert_eq!(w.entities().filter(|e| e.is_pickup()).count(), 1);
    }

    #[test]
    fn damage_never_makes_a_monster_target_itself() {
        let mut w = world();
        let mob = w.spawn_monster_with(
            Arc::new(Aggressive::default()),
            MonsterAttributes::default(),
            DVec3::new(0.5, 5.2, 0.5),
        );
        w.apply_damage(DamageInfo::attack(mob, mob, 1)).unwrap();
        let m = w.get(mob).and_then(Entity::monster).unwrap();
        assert_eq!(m.target(), None);
    }

    #[test]
    fn shared_id_allocator_spans_worlds() {
        let ids = IdAllocator::starting_at(100);
        let mut a = world().with_ids(ids.clone());
        let mut b = world().with_ids(ids);
        let x = a.spawn(EntityData::Generic, DVec3::ZERO);
        let y = b.spawn(EntityData::Generic, DVec3::ZERO);
        assert_eq!((x, y), (EntityId(100), EntityId(101)));
    }
}
