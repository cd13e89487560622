//! Entities.
//!
//! An [`Entity`] is the common record (id, body, chunk, attachment links,
//! burning, replication state) plus a closed [`EntityData`] variant for the
//! kind-specific part. Capabilities are exposed through traits:
//! - [`Movable`]: has a body; some kinds are advanced by physics.
//! - [`Attackable`]: has health (players and monsters).
//! - [`crate::behavior::AiControlled`]: monster species logic.

use serde::{Deserialize, Serialize};

use crate::{
    ecs::{ChunkCoord, EntityId, EntityKind},
    error::{SimError, SimResult},
    event::{Effect, TickContext},
    ledger::{RefField, WeakRef},
    math::{self, DVec3, Vec3},
    monster::Monster,
    net::NetMsg,
    pawn::{Attackable, DamageInfo, Pawn},
    physics::Body,
    replication::ReplicationState,
};

/// Default player health.
pub const PLAYER_MAX_HEALTH: i32 = 20;

/// Item stack carried by pickups and produced by drop tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: i16,
    pub count: u8,
    pub damage: i16,
}

impl ItemStack {
    pub fn new(item: i16, count: u8, damage: i16) -> Self {
        Self {
            item,
            count,
            damage,
        }
    }
}

/// Kind-specific entity state.
#[derive(Debug)]
pub enum EntityData {
    Generic,
    Player(Pawn),
    Pickup(ItemStack),
    Monster(Box<Monster>),
    FallingBlock { block: u8 },
    Minecart,
}

impl EntityData {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityData::Generic => EntityKind::Generic,
            EntityData::Player(_) => EntityKind::Player,
            EntityData::Pickup(_) => EntityKind::Pickup,
            EntityData::Monster(_) => EntityKind::Monster,
            EntityData::FallingBlock { .. } => EntityKind::FallingBlock,
            EntityData::Minecart => EntityKind::Minecart,
        }
    }
}

/// Something with a body.
pub trait Movable {
    fn body(&self) -> &Body;
    fn body_mut(&mut self) -> &mut Body;

    /// Whether the world's physics backend advances this body.
    fn simulates_physics(&self) -> bool;

    fn position(&self) -> DVec3 {
        self.body().position
    }

    fn velocity(&self) -> Vec3 {
        self.body().velocity
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        self.body_mut().velocity = velocity;
    }
}

#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    pub body: Body,
    chunk: ChunkCoord,
    destroyed: bool,
    attached_to: Option<WeakRef>,
    attachee: Option<WeakRef>,
    /// Seconds of burning left.
    burn_period: f32,
    fire_damage_interval: f32,
    replication: ReplicationState,
    pub data: EntityData,
}

impl Entity {
    pub fn new(id: EntityId, data: EntityData, position: DVec3) -> Self {
        Self {
            id,
            body: Body::at(position),
            chunk: ChunkCoord::containing(position),
            destroyed: false,
            attached_to: None,
            attachee: None,
            burn_period: 0.0,
            fire_damage_interval: 0.0,
            replication: ReplicationState::new(position, 0),
            data,
        }
    }

    pub fn generic(id: EntityId, position: DVec3) -> Self {
        Self::new(id, EntityData::Generic, position)
    }

    pub fn player(id: EntityId, position: DVec3, max_health: i32) -> Self {
        Self::new(id, EntityData::Player(Pawn::new(max_health)), position)
    }

    pub fn pickup(id: EntityId, position: DVec3, stack: ItemStack) -> Self {
        Self::new(id, EntityData::Pickup(stack), position)
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.data.kind()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind().class_name()
    }

    pub fn is_player(&self) -> bool {
        self.kind() == EntityKind::Player
    }

    pub fn is_pickup(&self) -> bool {
        self.kind() == EntityKind::Pickup
    }

    pub fn is_mob(&self) -> bool {
        self.kind() == EntityKind::Monster
    }

    pub fn is_minecart(&self) -> bool {
        self.kind() == EntityKind::Minecart
    }

    pub fn chunk(&self) -> ChunkCoord {
        self.chunk
    }

    /// Updates the cached chunk. Returns the old chunk when it changed.
    pub fn rehome(&mut self) -> Option<ChunkCoord> {
        let now = ChunkCoord::containing(self.body.position);
        if now == self.chunk {
            return None;
        }
        Some(std::mem::replace(&mut self.chunk, now))
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Marks the entity destroyed. Returns `false` if it already was.
    pub fn destroy(&mut self) -> bool {
        !std::mem::replace(&mut self.destroyed, true)
    }

    // ─── Attachment links ───

    /// Vehicle this entity rides.
    pub fn attached_to(&self) -> Option<WeakRef> {
        self.attached_to
    }

    /// Rider of this entity.
    pub fn attachee(&self) -> Option<WeakRef> {
        self.attachee
    }

    pub fn is_riding(&self) -> bool {
        self.attached_to.is_some()
    }

    /// Writes a pointer field. Only the world calls this, after updating the ledger.
    pub(crate) fn set_ref(&mut self, field: RefField, value: Option<WeakRef>) {
        match field {
            RefField::AttachedTo => self.attached_to = value,
            RefField::Attachee => self.attachee = value,
            RefField::Target => {
                if let Some(m) = self.monster_mut() {
                    m.set_target_handle(value);
                }
            }
        }
    }

    // ─── Kind access ───

    pub fn monster(&self) -> Option<&Monster> {
        match &self.data {
            EntityData::Monster(m) => Some(m),
            _ => None,
        }
    }

    pub fn monster_mut(&mut self) -> Option<&mut Monster> {
        match &mut self.data {
            EntityData::Monster(m) => Some(m),
            _ => None,
        }
    }

    /// Monster access that reports the kind mismatch.
    pub fn expect_monster_mut(&mut self) -> SimResult<&mut Monster> {
        let (id, kind) = (self.id, self.kind());
        self.monster_mut().ok_or(SimError::WrongKind {
            id,
            kind,
            expected: EntityKind::Monster,
        })
    }

    pub fn as_attackable(&self) -> Option<&dyn Attackable> {
        match &self.data {
            EntityData::Player(p) => Some(p),
            EntityData::Monster(m) => Some(&**m),
            _ => None,
        }
    }

    pub fn as_attackable_mut(&mut self) -> Option<&mut dyn Attackable> {
        match &mut self.data {
            EntityData::Player(p) => Some(p),
            EntityData::Monster(m) => Some(&mut **m),
            _ => None,
        }
    }

    pub fn health(&self) -> Option<i32> {
        self.as_attackable().map(|a| a.health())
    }

    // ─── Rotation ───

    /// Keeps yaw and pitch inside `[-180, 180)`.
    pub fn wrap_rotation(&mut self) {
        let rot = self.body.rotation;
        self.body.set_yaw(math::wrap_degrees(rot.x));
        self.body.set_pitch(math::wrap_degrees(rot.y));
    }

    pub fn look_vector(&self) -> DVec3 {
        math::look_vector(self.body.rotation.x, self.body.rotation.y)
    }

    // ─── Fire ───

    pub fn is_on_fire(&self) -> bool {
        self.burn_period > 0.0
    }

    /// Burns for at least `seconds`; never shortens a longer burn.
    pub fn set_on_fire(&mut self, seconds: f32) {
        self.burn_period = self.burn_period.max(seconds);
    }

    fn tick_burning(&mut self, ctx: &mut TickContext<'_>) {
        if self.burn_period <= 0.0 {
            return;
        }
        self.burn_period = (self.burn_period - ctx.dt).max(0.0);
        self.fire_damage_interval += ctx.dt;
        if self.fire_damage_interval > 1.0 {
            self.fire_damage_interval -= 1.0;
            if self.as_attackable().is_some() {
                ctx.effects.push(Effect::Damage(DamageInfo::fire(self.id)));
            }
        }
        if self.burn_period <= 0.0 {
            self.fire_damage_interval = 0.0;
        }
    }

    // ─── Replication ───

    /// Resets what clients know about this entity, e.g. right after spawning.
    pub fn reset_replication(&mut self, world_age: u64) {
        self.replication = ReplicationState::new(self.body.position, world_age);
    }

    pub fn replication(&self) -> &ReplicationState {
        &self.replication
    }

    /// Movement message for this tick, if anything changed.
    pub fn replicate(&mut self, world_age: u64) -> Option<NetMsg> {
        self.replication.replicate(self.id, &mut self.body, world_age)
    }

    /// Spawn message clients need to display this entity.
    pub fn spawn_message(&self) -> NetMsg {
        match &self.data {
            EntityData::Monster(m) => NetMsg::SpawnMob {
                id: self.id,
                mob_type: m.attributes().mob_type.clone(),
                position: self.body.position,
                yaw: self.body.rotation.x as f32,
                pitch: self.body.rotation.y as f32,
            },
            _ => NetMsg::SpawnEntity {
                id: self.id,
                kind: self.kind(),
                position: self.body.position,
            },
        }
    }

    // ─── Tick ───

    /// Runs this entity's own logic. Physics and replication are driven by the world.
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) {
        if self.destroyed {
            return;
        }
        self.tick_burning(ctx);
        if let EntityData::Monster(m) = &mut self.data {
            m.tick(self.id, &mut self.body, ctx);
        }
    }
}

impl Movable for Entity {
    fn body(&self) -> &Body {
        &self.body
    }

    fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    fn simulates_physics(&self) -> bool {
        matches!(
            self.data,
            EntityData::Monster(_)
                | EntityData::Pickup(_)
                | EntityData::FallingBlock { .. }
                | EntityData::Minecart
        )
    }
}
