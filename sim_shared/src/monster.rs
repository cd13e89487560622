//! Monster AI controller.
//!
//! A [`Monster`] owns its health, AI state, target pointer and movement
//! intent. Each tick it:
//! 1. counts down the destroy timer if dead (nothing else runs),
//! 2. turns the destination into a walking velocity (with jump-on-step),
//! 3. faces the destination,
//! 4. checks its senses (see / lose player),
//! 5. runs the state handler of its species.
//!
//! Species-specific reactions live behind [`AiControlled`]; everything
//! here is the shared base behavior they call into.

use std::{fmt, str::FromStr, sync::Arc};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    behavior::AiControlled,
    config::{AttributeValue, MonsterAttributes},
    ecs::EntityId,
    entity::ItemStack,
    error::{SimError, SimResult},
    event::{Effect, TickContext},
    ledger::{Ledger, RefField, Slot, WeakRef},
    math::{self, DVec3, Vec3},
    pawn::{Attackable, DamageInfo, Pawn},
    physics::Body,
    terrain::Terrain,
};

/// Walking speed toward the destination, units/s.
pub const WALK_SPEED: f32 = 3.0;
pub const ESCAPE_SPEED_FACTOR: f32 = 2.0;
pub const JUMP_SPEED: f32 = 7.0;
/// Horizontal squared distance at which a destination counts as reached.
pub const REACHED_DISTANCE_SQ: f32 = 2.0;
/// The monster only turns toward destinations farther than this (squared).
pub const FACING_DISTANCE_SQ: f64 = 0.1;
/// Attack interval that must be exceeded before an attack lands.
pub const ATTACK_THRESHOLD: f32 = 3.0;
/// Seconds a dead monster lingers before it is destroyed.
pub const DESTROY_DELAY: f32 = 1.0;
/// Wander destinations sit this far above the terrain height.
pub const DESTINATION_LIFT: f32 = 1.2;
/// Step window for jumping: next column height relative to the current y.
pub const STEP_DOWN_LIMIT: f64 = 1.2;
pub const STEP_UP_LIMIT: f64 = 2.5;
/// Float noise from the surface offset must not read as a step up.
const STEP_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AiState {
    #[default]
    Idle,
    Chasing,
    Escaping,
    Attacking,
}

impl AiState {
    pub fn label(self) -> &'static str {
        match self {
            AiState::Idle => "Idle",
            AiState::Chasing => "Chasing",
            AiState::Escaping => "Escaping",
            AiState::Attacking => "Attacking",
        }
    }
}

impl fmt::Display for AiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AiState {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(AiState::Idle),
            "Chasing" => Ok(AiState::Chasing),
            "Escaping" => Ok(AiState::Escaping),
            "Attacking" => Ok(AiState::Attacking),
            other => Err(SimError::UnknownState(other.to_string())),
        }
    }
}

/// One idle-wander decision: a die roll and a horizontal offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleRoll {
    /// 1..=6; the wander only happens on 3 or more.
    pub die: u8,
    pub dx: i32,
    pub dz: i32,
}

impl IdleRoll {
    pub fn sample(rng: &mut dyn RngCore) -> Self {
        Self {
            die: rng.gen_range(1..=6),
            dx: rng.gen_range(-5..=5),
            dz: rng.gen_range(-5..=5),
        }
    }

    pub fn commits(&self) -> bool {
        self.dx * self.dx + self.dz * self.dz > 2 && self.die >= 3
    }
}

#[derive(Debug)]
pub struct Monster {
    species: Arc<dyn AiControlled>,
    attrs: MonsterAttributes,
    pawn: Pawn,
    state: AiState,
    target: Option<WeakRef>,
    destination: Vec3,
    moving_to_destination: bool,
    idle_interval: f32,
    attack_interval: f32,
    destroy_timer: f32,
}

impl Monster {
    pub fn new(species: Arc<dyn AiControlled>, attrs: MonsterAttributes) -> Self {
        Self {
            species,
            pawn: Pawn::new(attrs.max_health),
            attrs,
            state: AiState::Idle,
            target: None,
            destination: Vec3::ZERO,
            moving_to_destination: false,
            idle_interval: 0.0,
            attack_interval: 0.0,
            destroy_timer: 0.0,
        }
    }

    pub fn species(&self) -> &Arc<dyn AiControlled> {
        &self.species
    }

    pub fn attributes(&self) -> &MonsterAttributes {
        &self.attrs
    }

    /// Assigns one tunable by name. A new `max_health` also caps current health.
    pub fn set_attribute(&mut self, name: &str, value: &AttributeValue) -> SimResult<()> {
        self.attrs.set_attribute(name, value)?;
        if name == "max_health" {
            self.pawn.set_max_health(self.attrs.max_health);
        }
        Ok(())
    }

    // ─── State ───

    pub fn state(&self) -> AiState {
        self.state
    }

    pub fn state_label(&self) -> &'static str {
        self.state.label()
    }

    pub fn set_ai_state(&mut self, state: AiState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "AI state change");
            self.state = state;
        }
    }

    /// Sets the state from its label. Unknown labels leave the state unchanged.
    pub fn set_state(&mut self, label: &str) -> Result<(), SimError> {
        let state = label.parse()?;
        self.set_ai_state(state);
        Ok(())
    }

    // ─── Target ───

    /// Raw target handle; may be stale.
    pub fn target(&self) -> Option<WeakRef> {
        self.target
    }

    /// Target id if it is still alive.
    pub fn target_id(&self, ledger: &Ledger) -> Option<EntityId> {
        self.target.and_then(|weak| ledger.resolve(weak))
    }

    /// The one place the target pointer changes.
    ///
    /// Registers the new reference (dropping the old one) with the ledger, or
    /// clears it for `None`. A monster never targets itself; that request is
    /// ignored and `false` is returned.
    pub fn assign_target(
        &mut self,
        owner: EntityId,
        ledger: &mut Ledger,
        target: Option<EntityId>,
    ) -> bool {
        let slot = Slot::new(owner, RefField::Target);
        match target {
            Some(t) if t == owner => {
                debug!(id = %owner, "Ignoring self as target");
                false
            }
            Some(t) => {
                self.target = ledger.add_reference(slot, t);
                self.target.is_some()
            }
            None => {
                ledger.dereference(slot);
                self.target = None;
                true
            }
        }
    }

    /// Overwrites the handle without touching the ledger. Used when the
    /// ledger has already dropped the slot.
    pub(crate) fn set_target_handle(&mut self, handle: Option<WeakRef>) {
        self.target = handle;
    }

    /// Position of the live target.
    pub fn target_position(&self, ctx: &TickContext<'_>) -> Option<DVec3> {
        self.target_id(ctx.ledger).and_then(|t| ctx.position_of(t))
    }

    // ─── Movement intent ───

    pub fn destination(&self) -> Vec3 {
        self.destination
    }

    pub fn is_moving_to_destination(&self) -> bool {
        self.moving_to_destination
    }

    pub fn move_to_position(&mut self, destination: Vec3) {
        self.destination = destination;
        self.moving_to_destination = true;
    }

    pub fn stop_moving(&mut self) {
        self.moving_to_destination = false;
    }

    pub fn reached_destination(&self, position: Vec3) -> bool {
        let dx = self.destination.x - position.x;
        let dz = self.destination.z - position.z;
        dx * dx + dz * dz < REACHED_DISTANCE_SQ
    }

    // ─── Timers ───

    pub fn idle_interval(&self) -> f32 {
        self.idle_interval
    }

    pub fn attack_interval(&self) -> f32 {
        self.attack_interval
    }

    pub fn destroy_timer(&self) -> f32 {
        self.destroy_timer
    }

    /// Restarts the death animation timer.
    pub fn on_killed(&mut self) {
        self.destroy_timer = 0.0;
        self.moving_to_destination = false;
    }

    /// Items this monster leaves behind, rolled now.
    pub fn drops(&self) -> Vec<ItemStack> {
        let mut drops = Vec::new();
        self.species.drops(&mut drops);
        drops
    }

    // ─── Tick ───

    pub fn tick(&mut self, id: EntityId, body: &mut Body, ctx: &mut TickContext<'_>) {
        if self.pawn.is_dead() {
            self.destroy_timer += ctx.dt;
            if self.destroy_timer > DESTROY_DELAY {
                ctx.effects.push(Effect::Destroy(id));
            }
            return;
        }

        self.update_movement(body, ctx.terrain);
        self.face_destination(body);
        self.check_senses(id, body, ctx);

        let species = Arc::clone(&self.species);
        match self.state {
            AiState::Idle => species.in_state_idle(self, id, body, ctx),
            AiState::Chasing => species.in_state_chasing(self, id, body, ctx),
            AiState::Escaping => species.in_state_escaping(self, id, body, ctx),
            AiState::Attacking => species.in_state_attacking(self, id, body, ctx),
        }
    }

    /// Turns the destination into horizontal velocity and jumps onto steps.
    pub fn update_movement(&mut self, body: &mut Body, terrain: &dyn Terrain) {
        if !self.moving_to_destination {
            return;
        }

        let pos = body.position.as_vec();
        if self.reached_destination(pos) {
            self.moving_to_destination = false;
        } else {
            let mut dir = self.destination - pos;
            dir.y = 0.0;
            let mut speed = dir.normalized() * WALK_SPEED;
            if self.state == AiState::Escaping {
                speed = speed * ESCAPE_SPEED_FACTOR;
            }
            body.velocity.x = speed.x;
            body.velocity.z = speed.z;
        }

        let heading = Vec3::new(body.velocity.x, 0.0, body.velocity.z);
        if !body.on_ground || heading.is_zero() {
            return;
        }
        let next = body.position + heading.normalized().as_dvec();
        let (bx, _, bz) = next.block();
        if let Some(height) = terrain.height(bx, bz) {
            let (h, y) = (height as f64, body.position.y);
            if h > y - STEP_DOWN_LIMIT + STEP_EPSILON && h - y < STEP_UP_LIMIT {
                body.on_ground = false;
                body.velocity.y = JUMP_SPEED;
            }
        }
    }

    fn face_destination(&self, body: &mut Body) {
        if !self.moving_to_destination {
            return;
        }
        let delta = self.destination.as_dvec() - body.position;
        if delta.len_sq() > FACING_DISTANCE_SQ {
            let (yaw, pitch) = math::vector_to_euler(delta);
            body.set_yaw(yaw);
            body.set_pitch(pitch);
        }
    }

    fn check_senses(&mut self, id: EntityId, body: &Body, ctx: &mut TickContext<'_>) {
        let pos = body.position;
        match self.target_id(ctx.ledger) {
            Some(target) => {
                let visible = ctx
                    .position_of(target)
                    .is_some_and(|at| self.can_see(pos, at, ctx));
                if !visible {
                    self.lose_player(id, ctx.ledger);
                }
            }
            None => {
                if self.target.is_some() {
                    self.lose_player(id, ctx.ledger);
                }
                let sight = self.attrs.sight_distance as f64;
                if let Some(player) = ctx.find_closest_player(pos, sight) {
                    let species = Arc::clone(&self.species);
                    species.on_see_player(self, id, player, ctx);
                }
            }
        }
    }

    /// Within sight distance and nothing solid in between.
    pub fn can_see(&self, from: DVec3, to: DVec3, ctx: &TickContext<'_>) -> bool {
        (to - from).len() <= self.attrs.sight_distance as f64 && ctx.line_of_sight(from, to)
    }

    /// Drops the target and falls back to idling.
    pub fn lose_player(&mut self, id: EntityId, ledger: &mut Ledger) {
        debug!(id = %id, "Lost target");
        self.assign_target(id, ledger, None);
        self.set_ai_state(AiState::Idle);
    }

    // ─── Base state behavior ───

    /// Idle wandering using the tick random stream.
    pub fn idle(&mut self, body: &Body, ctx: &mut TickContext<'_>) {
        let rng = &mut *ctx.rng;
        self.wander(ctx.dt, body.position, ctx.terrain, || IdleRoll::sample(rng));
    }

    /// Once per accumulated second, rolls whether to wander somewhere nearby.
    /// Returns whether a new destination was committed.
    pub fn wander(
        &mut self,
        dt: f32,
        position: DVec3,
        terrain: &dyn Terrain,
        mut roll: impl FnMut() -> IdleRoll,
    ) -> bool {
        self.idle_interval += dt;
        if self.idle_interval <= 1.0 {
            return false;
        }
        self.idle_interval -= 1.0;

        let roll = roll();
        if !roll.commits() {
            return false;
        }
        let x = position.x + roll.dx as f64;
        let z = position.z + roll.dz as f64;
        let Some(height) = terrain.height(x.floor() as i32, z.floor() as i32) else {
            return false;
        };
        self.move_to_position(Vec3::new(
            x as f32,
            height as f32 + DESTINATION_LIFT,
            z as f32,
        ));
        true
    }

    /// Runs sight distance away from the target on both horizontal axes.
    pub fn escape(&mut self, body: &Body, ctx: &mut TickContext<'_>) {
        let Some(threat) = self.target_position(ctx) else {
            self.set_ai_state(AiState::Idle);
            return;
        };
        let pos = body.position;
        let sight = self.attrs.sight_distance as f64;
        let x = if threat.x < pos.x { pos.x + sight } else { pos.x - sight };
        let z = if threat.z < pos.z { pos.z + sight } else { pos.z - sight };
        self.move_to_position(Vec3::new(x as f32, pos.y as f32, z as f32));
    }

    /// Charges the attack interval and hits the target once it is full.
    /// Returns whether a hit was queued.
    pub fn attack(&mut self, id: EntityId, ctx: &mut TickContext<'_>) -> bool {
        self.attack_interval += ctx.dt * self.attrs.attack_rate;
        let Some(target) = self.target_id(ctx.ledger) else {
            return false;
        };
        if self.attack_interval <= ATTACK_THRESHOLD {
            return false;
        }
        self.attack_interval = 0.0;
        let amount = self.attrs.attack_damage.ceil() as i32;
        ctx.effects
            .push(Effect::Damage(DamageInfo::attack(id, target, amount)));
        true
    }
}

impl Attackable for Monster {
    fn pawn(&self) -> &Pawn {
        &self.pawn
    }

    fn pawn_mut(&mut self) -> &mut Pawn {
        &mut self.pawn
    }
}

/// Adds `rand(min..=max)` of `item` to `drops` when the roll is positive.
pub fn add_random_drop_item(drops: &mut Vec<ItemStack>, min: u32, max: u32, item: i16, damage: i16) {
    let (lo, hi) = (min.min(max), min.max(max));
    let count = rand::thread_rng().gen_range(lo..=hi);
    if count > 0 {
        let count = count.min(u8::MAX as u32) as u8;
        drops.push(ItemStack::new(item, count, damage));
    }
}
