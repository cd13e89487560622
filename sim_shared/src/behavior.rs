//! Monster species.
//!
//! [`AiControlled`] is the species hook set called by [`Monster::tick`]. Every
//! method has a default that runs the shared base behavior, so a species only
//! overrides the reactions that make it different.

use std::{fmt, sync::Arc};

use crate::{
    config::{DropRule, Personality, SpeciesConfig},
    ecs::EntityId,
    entity::ItemStack,
    event::TickContext,
    monster::{add_random_drop_item, AiState, Monster},
    physics::Body,
};

pub trait AiControlled: Send + Sync + fmt::Debug {
    fn personality(&self) -> Personality;

    /// A player came within sight while the monster had no target.
    fn on_see_player(
        &self,
        monster: &mut Monster,
        id: EntityId,
        player: EntityId,
        ctx: &mut TickContext<'_>,
    ) {
        monster.assign_target(id, ctx.ledger, Some(player));
    }

    /// Called after damage was applied and the attacker (if any) became the target.
    fn on_damaged(&self, _monster: &mut Monster, _attacker: Option<EntityId>) {}

    fn in_state_idle(
        &self,
        monster: &mut Monster,
        _id: EntityId,
        body: &mut Body,
        ctx: &mut TickContext<'_>,
    ) {
        monster.idle(body, ctx);
    }

    fn in_state_chasing(
        &self,
        _monster: &mut Monster,
        _id: EntityId,
        _body: &mut Body,
        _ctx: &mut TickContext<'_>,
    ) {
    }

    fn in_state_escaping(
        &self,
        monster: &mut Monster,
        _id: EntityId,
        body: &mut Body,
        ctx: &mut TickContext<'_>,
    ) {
        monster.escape(body, ctx);
    }

    fn in_state_attacking(
        &self,
        _monster: &mut Monster,
        _id: EntityId,
        _body: &mut Body,
        _ctx: &mut TickContext<'_>,
    ) {
    }

    /// Rolls this species' drops into `out`.
    fn drops(&self, _out: &mut Vec<ItemStack>) {}
}

fn roll_drops(table: &[DropRule], out: &mut Vec<ItemStack>) {
    for rule in table {
        add_random_drop_item(out, rule.min, rule.max, rule.item, rule.damage);
    }
}

/// Hunts players it sees and hits them when in range.
#[derive(Debug, Clone, Default)]
pub struct Aggressive {
    pub drop_table: Vec<DropRule>,
}

impl Aggressive {
    pub fn new(drop_table: Vec<DropRule>) -> Self {
        Self { drop_table }
    }

    /// Follows the target; switches between chasing and attacking by range.
    fn pursue(&self, monster: &mut Monster, id: EntityId, body: &Body, ctx: &mut TickContext<'_>) {
        let Some(at) = monster.target_position(ctx) else {
            monster.set_ai_state(AiState::Idle);
            return;
        };
        monster.move_to_position(at.as_vec());

        let range = monster.attributes().attack_range as f64;
        if (at - body.position).len() <= range {
            monster.set_ai_state(AiState::Attacking);
            monster.attack(id, ctx);
        } else {
            monster.set_ai_state(AiState::Chasing);
        }
    }
}

impl AiControlled for Aggressive {
    fn personality(&self) -> Personality {
        Personality::Aggressive
    }

    fn on_see_player(
        &self,
        monster: &mut Monster,
        id: EntityId,
        player: EntityId,
        ctx: &mut TickContext<'_>,
    ) {
        if monster.assign_target(id, ctx.ledger, Some(player)) {
            monster.set_ai_state(AiState::Chasing);
        }
    }

    fn on_damaged(&self, monster: &mut Monster, attacker: Option<EntityId>) {
        if attacker.is_some() && monster.state() == AiState::Idle {
            monster.set_ai_state(AiState::Chasing);
        }
    }

    fn in_state_chasing(
        &self,
        monster: &mut Monster,
        id: EntityId,
        body: &mut Body,
        ctx: &mut TickContext<'_>,
    ) {
        self.pursue(monster, id, body, ctx);
    }

    fn in_state_attacking(
        &self,
        monster: &mut Monster,
        id: EntityId,
        body: &mut Body,
        ctx: &mut TickContext<'_>,
    ) {
        self.pursue(monster, id, body, ctx);
    }

    fn drops(&self, out: &mut Vec<ItemStack>) {
        roll_drops(&self.drop_table, out);
    }
}

/// Ignores players; runs from whoever hurts it.
#[derive(Debug, Clone, Default)]
pub struct Passive {
    pub drop_table: Vec<DropRule>,
}

impl Passive {
    pub fn new(drop_table: Vec<DropRule>) -> Self {
        Self { drop_table }
    }
}

impl AiControlled for Passive {
    fn personality(&self) -> Personality {
        Personality::Passive
    }

    fn on_see_player(
        &self,
        _monster: &mut Monster,
        _id: EntityId,
        _player: EntityId,
        _ctx: &mut TickContext<'_>,
    ) {
    }

    fn on_damaged(&self, monster: &mut Monster, attacker: Option<EntityId>) {
        if attacker.is_some() {
            monster.set_ai_state(AiState::Escaping);
        }
    }

    fn drops(&self, out: &mut Vec<ItemStack>) {
        roll_drops(&self.drop_table, out);
    }
}

/// Builds the species object a config entry describes.
pub fn build_species(cfg: &SpeciesConfig) -> Arc<dyn AiControlled> {
    match cfg.personality {
        Personality::Aggressive => Arc::new(Aggressive::new(cfg.drops.clone())),
        Personality::Passive => Arc::new(Passive::new(cfg.drops.clone())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        config::MonsterAttributes,
        entity::Entity,
        event::{Effect, EffectQueue},
        ledger::Ledger,
        math::DVec3,
        terrain::{BlockTerrain, VoxelTracer},
    };

    struct Scene {
        terrain: BlockTerrain,
        others: BTreeMap<EntityId, Entity>,
        ledger: Ledger,
        rng: StdRng,
        effects: EffectQueue,
    }

    impl Scene {
        fn with_player_at(at: DVec3) -> Self {
            let mut ledger = Ledger::new();
            ledger.register(EntityId(1));
            ledger.register(EntityId(2));
            let mut others = BTreeMap::new();
            others.insert(EntityId(2), Entity::player(EntityId(2), at, 20));
            Self {
                terrain: BlockTerrain::flat(4),
                others,
                ledger,
                rng: StdRng::seed_from_u64(5),
                effects: EffectQueue::default(),
            }
        }

        fn tick(&mut self, monster: &mut Monster, body: &mut Body, dt: f32) {
            let mut ctx = TickContext {
                dt,
                world_age: 0,
                terrain: &self.terrain,
                tracer: &VoxelTracer,
                others: &self.others,
                ledger: &mut self.ledger,
                rng: &mut self.rng,
                effects: &mut self.effects,
            };
            monster.tick(EntityId(1), body, &mut ctx);
        }
    }

    fn monster_of(cfg: &SpeciesConfig) -> Monster {
        Monster::new(build_species(cfg), cfg.attributes.clone())
    }

    #[test]
    fn aggressive_chases_then_attacks_in_range() {
        let mut scene = Scene::with_player_at(DVec3::new(3.5, 5.2, 0.5));
        let mut m = monster_of(&SpeciesConfig::default());
        let mut body = Body::at(DVec3::new(0.5, 5.2, 0.5));

        scene.tick(&mut m, &mut body, 0.05);
        assert_eq!(m.state(), AiState::Attacking);
        assert!(m.is_moving_to_destination());

        // rate 3 at 0.5 s per tick charges 1.5 per attack call
        for _ in 0..3 {
            scene.tick(&mut m, &mut body, 0.5);
        }
        let hits: Vec<_> = scene
            .effects
            .drain()
            .into_iter()
            .filter(|fx| matches!(fx, Effect::Damage(d) if d.target == EntityId(2)))
            .collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn aggressive_falls_back_to_chasing_out_of_range() {
        let mut scene = Scene::with_player_at(DVec3::new(3.5, 5.2, 0.5));
        let mut m = monster_of(&SpeciesConfig::default());
        let mut body = Body::at(DVec3::new(0.5, 5.2, 0.5));
        scene.tick(&mut m, &mut body, 0.05);
        assert_eq!(m.state(), AiState::Attacking);

        if let Some(p) = scene.others.get_mut(&EntityId(2)) {
            p.body.position = DVec3::new(12.5, 5.2, 0.5);
        }
        scene.tick(&mut m, &mut body, 0.05);
        assert_eq!(m.state(), AiState::Chasing);
        assert!((m.destination().x - 12.5).abs() < 1e-5);
    }

    #[test]
    fn passive_ignores_players_and_flees_when_hurt() {
        let cfg = SpeciesConfig {
            personality: Personality::Passive,
            ..Default::default()
        };
        let mut scene = Scene::with_player_at(DVec3::new(3.5, 5.2, 0.5));
        let mut m = monster_of(&cfg);
        let mut body = Body::at(DVec3::new(0.5, 5.2, 0.5));

        scene.tick(&mut m, &mut body, 0.05);
        assert_eq!(m.state(), AiState::Idle);
        assert_eq!(m.target(), None);

        m.assign_target(EntityId(1), &mut scene.ledger, Some(EntityId(2)));
        m.species().clone().on_damaged(&mut m, Some(EntityId(2)));
        assert_eq!(m.state(), AiState::Escaping);

        scene.tick(&mut m, &mut body, 0.05);
        assert!(m.destination().x < 0.0);
    }

    #[test]
    fn species_roll_their_drop_tables() {
        let cfg = SpeciesConfig {
            drops: vec![DropRule {
                item: 367,
                min: 2,
                max: 2,
                damage: 0,
            }],
            attributes: MonsterAttributes::default(),
            ..Default::default()
        };
        let m = monster_of(&cfg);
        assert_eq!(m.drops(), vec![ItemStack::new(367, 2, 0)]);
        assert_eq!(m.species().personality(), Personality::Aggressive);
    }
}
