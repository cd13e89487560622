//! Shared fixtures for the integration tests.

use std::sync::Arc;

use sim_shared::{
    behavior::{Aggressive, Passive},
    config::MonsterAttributes,
    ecs::EntityId,
    math::DVec3,
    net::NetMsg,
    terrain::BlockTerrain,
    world::World,
};

/// Top solid layer of test worlds.
pub const GROUND: i32 = 4;
/// Resting height of a body on [`GROUND`].
pub const STANDING_Y: f64 = GROUND as f64 + 1.2;
pub const DT: f32 = 0.05;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn flat_world(seed: u64) -> World {
    World::new(BlockTerrain::flat(GROUND), seed)
}

pub fn standing(x: f64, z: f64) -> DVec3 {
    DVec3::new(x, STANDING_Y, z)
}

pub fn spawn_zombie(world: &mut World, at: DVec3) -> EntityId {
    world.spawn_monster_with(
        Arc::new(Aggressive::default()),
        MonsterAttributes::default(),
        at,
    )
}

pub fn spawn_pig(world: &mut World, at: DVec3) -> EntityId {
    world.spawn_monster_with(
        Arc::new(Passive::default()),
        MonsterAttributes {
            mob_type: "pig".into(),
            ..Default::default()
        },
        at,
    )
}

/// Ticks `n` times at [`DT`], collecting every broadcast.
pub fn run_ticks(world: &mut World, n: usize) -> Vec<NetMsg> {
    let mut out = Vec::new();
    for _ in 0..n {
        world.tick(DT);
        out.extend(world.drain_broadcasts());
    }
    out
}

/// Movement messages about `id`.
pub fn movement_of(msgs: &[NetMsg], id: EntityId) -> Vec<&NetMsg> {
    msgs.iter()
        .filter(|m| {
            m.entity() == Some(id)
                && matches!(
                    m,
                    NetMsg::Teleport { .. }
                        | NetMsg::RelMove { .. }
                        | NetMsg::RelMoveLook { .. }
                        | NetMsg::Look { .. }
                )
        })
        .collect()
}
