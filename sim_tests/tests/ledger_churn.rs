//! Random spawn/attach/destroy churn; the ledger must stay consistent.

use rand::{rngs::StdRng, Rng, SeedableRng};
use sim_shared::{ecs::EntityId, entity::EntityData, world::World};
use sim_tests::{flat_world, init_tracing, spawn_zombie, standing, DT};

fn assert_consistent(world: &World) {
    let ledger = world.ledger();
    for e in world.entities() {
        let id = e.id();
        for (_, referent) in ledger.references(id) {
            assert!(
                world.get(referent).is_some(),
                "{id} references released {referent}"
            );
        }
        for slot in ledger.referencers(id) {
            assert!(world.get(slot.owner).is_some(), "{id} held by released {}", slot.owner);
        }
        if e.is_destroyed() {
            continue;
        }
        if let Some(parent) = e.attached_to().and_then(|w| ledger.resolve(w)) {
            let back = world
                .get(parent)
                .and_then(|p| p.attachee())
                .and_then(|w| ledger.resolve(w));
            assert_eq!(back, Some(id), "{id} rides {parent} one-sided");
        }
    }
}

#[test]
fn random_churn_keeps_links_consistent() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut world = flat_world(3);
    let mut ids: Vec<EntityId> = Vec::new();

    for _ in 0..400 {
        match rng.gen_range(0..10) {
            0..=2 => {
                let at = standing(rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0));
                let id = match rng.gen_range(0..3) {
                    0 => world.spawn_player(at),
                    1 => world.spawn(EntityData::Minecart, at),
                    _ => spawn_zombie(&mut world, at),
                };
                ids.push(id);
            }
            3..=4 if ids.len() >= 2 => {
                let a = ids[rng.gen_range(0..ids.len())];
                let b = ids[rng.gen_range(0..ids.len())];
                let _ = world.attach(a, b);
            }
            5 if !ids.is_empty() => {
                let a = ids[rng.gen_range(0..ids.len())];
                let _ = world.detach(a);
            }
            6 if !ids.is_empty() => {
                let a = ids[rng.gen_range(0..ids.len())];
                let _ = world.destroy(a);
            }
            _ => world.tick(DT),
        }
        world.drain_broadcasts();
        ids.retain(|id| world.get(*id).is_some());
        assert_consistent(&world);
    }
}
