use sim_shared::{
    ecs::EntityId,
    entity::EntityData,
    error::SimError,
    ledger::{RefField, Slot},
    net::NetMsg,
    world::World,
};
use sim_tests::{flat_world, init_tracing, run_ticks, standing};

fn rider_and_carts(world: &mut World) -> (EntityId, EntityId, EntityId) {
    let player = world.spawn_player(standing(0.5, 0.5));
    let a = world.spawn(EntityData::Minecart, standing(2.5, 0.5));
    let b = world.spawn(EntityData::Minecart, standing(4.5, 0.5));
    world.drain_broadcasts();
    (player, a, b)
}

fn vehicle_of(world: &World, id: EntityId) -> Option<EntityId> {
    world
        .get(id)
        .and_then(|e| e.attached_to())
        .and_then(|w| world.ledger().resolve(w))
}

fn rider_of(world: &World, id: EntityId) -> Option<EntityId> {
    world
        .get(id)
        .and_then(|e| e.attachee())
        .and_then(|w| world.ledger().resolve(w))
}

#[test]
fn attach_links_both_sides() -> anyhow::Result<()> {
    init_tracing();
    let mut world = flat_world(1);
    let (player, cart, _) = rider_and_carts(&mut world);

    world.attach(player, cart)?;

    assert_eq!(vehicle_of(&world, player), Some(cart));
    assert_eq!(rider_of(&world, cart), Some(player));
    assert!(world.get(player).is_some_and(|e| e.is_riding()));
    assert_eq!(
        world.ledger().referencers(cart),
        vec![Slot::new(player, RefField::AttachedTo)]
    );
    assert_eq!(
        world.drain_broadcasts(),
        vec![NetMsg::AttachEntity {
            rider: player,
            vehicle: Some(cart)
        }]
    );
    Ok(())
}

#[test]
fn attaching_to_the_current_vehicle_is_a_no_op() -> anyhow::Result<()> {
    let mut world = flat_world(1);
    let (player, cart, _) = rider_and_carts(&mut world);
    world.attach(player, cart)?;
    world.drain_broadcasts();

    world.attach(player, cart)?;
    assert!(world.drain_broadcasts().is_empty());
    assert_eq!(vehicle_of(&world, player), Some(cart));
    Ok(())
}

#[test]
fn reattaching_moves_the_rider() -> anyhow::Result<()> {
    let mut world = flat_world(1);
    let (player, a, b) = rider_and_carts(&mut world);
    world.attach(player, a)?;
    world.attach(player, b)?;

    assert_eq!(vehicle_of(&world, player), Some(b));
    assert_eq!(rider_of(&world, a), None);
    assert_eq!(rider_of(&world, b), Some(player));
    assert!(world.ledger().referencers(a).is_empty());
    Ok(())
}

#[test]
fn a_new_rider_evicts_the_old_one() -> anyhow::Result<()> {
    let mut world = flat_world(1);
    let (player, cart, _) = rider_and_carts(&mut world);
    let other = world.spawn_player(standing(6.5, 0.5));
    world.attach(player, cart)?;
    world.drain_broadcasts();

    world.attach(other, cart)?;

    assert_eq!(vehicle_of(&world, player), None);
    assert_eq!(vehicle_of(&world, other), Some(cart));
    let out = world.drain_broadcasts();
    assert!(out.contains(&NetMsg::AttachEntity {
        rider: player,
        vehicle: None
    }));
    assert_eq!(
        out.last(),
        Some(&NetMsg::AttachEntity {
            rider: other,
            vehicle: Some(cart)
        })
    );
    Ok(())
}

#[test]
fn detach_clears_both_sides() -> anyhow::Result<()> {
    let mut world = flat_world(1);
    let (player, cart, _) = rider_and_carts(&mut world);
    world.attach(player, cart)?;

    assert!(world.detach(player)?);
    assert!(!world.detach(player)?);
    assert_eq!(vehicle_of(&world, player), None);
    assert_eq!(rider_of(&world, cart), None);
    assert!(world.ledger().references(player).is_empty());
    assert!(world.ledger().references(cart).is_empty());
    Ok(())
}

#[test]
fn invalid_attachments_are_rejected() -> anyhow::Result<()> {
    let mut world = flat_world(1);
    let (player, a, b) = rider_and_carts(&mut world);

    assert_eq!(world.attach(a, a), Err(SimError::SelfAttach(a)));

    world.attach(player, a)?;
    // `a` already carries a rider, so it cannot ride `b`.
    assert_eq!(
        world.attach(a, b),
        Err(SimError::AttachChain { child: a, parent: b })
    );
    // `player` is riding, so nothing can ride the player.
    assert_eq!(
        world.attach(b, player),
        Err(SimError::AttachChain {
            child: b,
            parent: player
        })
    );

    world.destroy(b)?;
    assert_eq!(world.attach(player, b), Err(SimError::Destroyed(b)));
    assert_eq!(vehicle_of(&world, player), Some(a));
    Ok(())
}

#[test]
fn destroying_the_vehicle_dismounts_the_rider() -> anyhow::Result<()> {
    init_tracing();
    let mut world = flat_world(1);
    let (player, cart, _) = rider_and_carts(&mut world);
    world.attach(player, cart)?;
    world.drain_broadcasts();

    world.destroy(cart)?;
    assert_eq!(vehicle_of(&world, player), None, "handle dead at once");

    let out = run_ticks(&mut world, 1);
    assert!(out.contains(&NetMsg::AttachEntity {
        rider: player,
        vehicle: None
    }));
    assert!(out.contains(&NetMsg::DestroyEntity { id: cart }));
    let rider = world.get(player).expect("player survives");
    assert_eq!(rider.attached_to(), None);
    assert!(world.ledger().references(player).is_empty());
    Ok(())
}

#[test]
fn destroying_the_rider_frees_the_vehicle() -> anyhow::Result<()> {
    let mut world = flat_world(1);
    let (player, cart, _) = rider_and_carts(&mut world);
    world.attach(player, cart)?;

    world.destroy(player)?;
    run_ticks(&mut world, 1);

    assert_eq!(world.get(cart).and_then(|e| e.attachee()), None);
    assert!(world.ledger().references(cart).is_empty());

    let other = world.spawn_player(standing(8.5, 0.5));
    world.attach(other, cart)?;
    assert_eq!(rider_of(&world, cart), Some(other));
    Ok(())
}
