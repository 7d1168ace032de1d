//! Entity registration helpers.
//!
//! Everything that enters or leaves the world goes through here so that the
//! grid occupant sets, the stable `SimId` handles, and the renderer queue
//! stay consistent with the ECS state. Moving an entity through `relocate`
//! is atomic: old node out, new node in, one notification.

use bevy_ecs::prelude::*;

use crate::components::{GridPosition, IsExit, IsPlayer, SimId, Visual};
use crate::events::{EventQueue, RenderEvent};
use crate::grid::{Coord, GridGraph};

/// Source of the next `SimId`; never reset within a session so ids stay
/// unique across level changes.
#[derive(Resource, Debug, Default)]
pub struct NextSimId(pub u32);

/// Enroll a freshly spawned entity: assign its `SimId`, add it to its node's
/// occupant set, and announce it to the renderer. The entity must already
/// carry a `GridPosition`.
pub fn register(world: &mut World, entity: Entity) -> SimId {
    let position = world
        .get::<GridPosition>(entity)
        .copied()
        .expect("registered entity carries a GridPosition");
    let visual = world.get::<Visual>(entity).copied();

    let id = {
        let mut next = world.resource_mut::<NextSimId>();
        let id = SimId(next.0);
        next.0 += 1;
        id
    };
    world.entity_mut(entity).insert(id);
    world.resource_mut::<GridGraph>().place(entity, position.node);

    if let Some(visual) = visual {
        world.resource_mut::<EventQueue>().push(RenderEvent::EntitySpawned {
            id,
            tag: visual.tag,
            node: position.node,
            z: visual.z,
        });
    }
    id
}

/// Remove an entity from play: occupant set, renderer, then the world.
/// Safe to call twice; the second call is a no-op.
pub fn deregister(world: &mut World, entity: Entity, fade: bool) {
    if !world.entities().contains(entity) {
        return;
    }
    let position = world.get::<GridPosition>(entity).copied();
    let id = world.get::<SimId>(entity).copied();

    if let Some(position) = position {
        world.resource_mut::<GridGraph>().remove(entity, position.node);
    }
    if let Some(id) = id {
        world.resource_mut::<EventQueue>().push(RenderEvent::EntityRemoved {
            id,
            should_fade_out: fade,
        });
    }
    world.despawn(entity);
}

/// Move a registered entity to `to`, keeping position and occupancy in step.
pub fn relocate(world: &mut World, entity: Entity, to: Coord) {
    let id = world
        .get::<SimId>(entity)
        .copied()
        .expect("relocated entity is registered");
    let from = {
        let mut position = world
            .get_mut::<GridPosition>(entity)
            .expect("relocated entity carries a GridPosition");
        let from = position.node;
        position.node = to;
        from
    };
    world.resource_mut::<GridGraph>().relocate(entity, from, to);
    world
        .resource_mut::<EventQueue>()
        .push(RenderEvent::EntityMoved { id, from, to });
}

/// Announce a denied move or a melee lunge toward `toward`.
pub fn bump(world: &mut World, entity: Entity, toward: Coord) {
    if let Some(id) = world.get::<SimId>(entity).copied() {
        world
            .resource_mut::<EventQueue>()
            .push(RenderEvent::EntityBumped { id, toward });
    }
}

/// Announce damage landing on a node.
pub fn flash(world: &mut World, node: Coord, amount: f32) {
    world
        .resource_mut::<EventQueue>()
        .push(RenderEvent::DamageFlash { node, amount });
}

/// The player entity. Exactly one exists whenever a level is live.
pub fn player(world: &mut World) -> Entity {
    let mut query = world.query_filtered::<Entity, With<IsPlayer>>();
    query
        .iter(world)
        .next()
        .expect("a live level has a player entity")
}

/// The player's current node.
pub fn player_node(world: &mut World) -> Coord {
    let entity = player(world);
    world
        .get::<GridPosition>(entity)
        .expect("player carries a GridPosition")
        .node
}

/// The exit's node, if the level has one.
pub fn exit_node(world: &mut World) -> Option<Coord> {
    let mut query = world.query_filtered::<&GridPosition, With<IsExit>>();
    query.iter(world).next().map(|position| position.node)
}

/// Tear down every entity and all occupancy, leaving resources in place.
/// Renderer events are dropped too: a level change starts a fresh scene.
pub fn clear_level(world: &mut World) {
    let all: Vec<Entity> = {
        let mut query = world.query::<Entity>();
        query.iter(world).collect()
    };
    for entity in all {
        world.despawn(entity);
    }
    world.resource_mut::<GridGraph>().clear_occupants();
    world.resource_mut::<EventQueue>().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AssetTag, PlayerBundle, PlayerTemplate, WallBundle, Z_PLAYER};

    fn test_world(width: i32, height: i32) -> World {
        let mut world = World::new();
        world.insert_resource(GridGraph::new(width, height));
        world.insert_resource(EventQueue::default());
        world.insert_resource(NextSimId::default());
        world
    }

    #[test]
    fn test_register_places_and_announces() {
        let mut world = test_world(4, 4);
        let at = Coord::new(1, 2);
        let entity = world
            .spawn(PlayerBundle::new(at, &PlayerTemplate::default()))
            .id();
        let id = register(&mut world, entity);

        assert_eq!(world.get::<SimId>(entity).copied(), Some(id));
        assert_eq!(world.resource::<GridGraph>().occupants(at), &[entity]);

        let events = world.resource_mut::<EventQueue>().drain();
        assert_eq!(
            events,
            vec![RenderEvent::EntitySpawned {
                id,
                tag: AssetTag::Player,
                node: at,
                z: Z_PLAYER,
            }]
        );
    }

    #[test]
    fn test_sim_ids_are_sequential() {
        let mut world = test_world(4, 4);
        let a = world.spawn(WallBundle::new(Coord::new(0, 0))).id();
        let b = world.spawn(WallBundle::new(Coord::new(1, 0))).id();
        assert_eq!(register(&mut world, a), SimId(0));
        assert_eq!(register(&mut world, b), SimId(1));
    }

    #[test]
    fn test_relocate_is_atomic() {
        let mut world = test_world(4, 4);
        let from = Coord::new(0, 0);
        let to = Coord::new(0, 1);
        let entity = world
            .spawn(PlayerBundle::new(from, &PlayerTemplate::default()))
            .id();
        let id = register(&mut world, entity);
        world.resource_mut::<EventQueue>().clear();

        relocate(&mut world, entity, to);

        assert_eq!(world.get::<GridPosition>(entity).unwrap().node, to);
        let grid = world.resource::<GridGraph>();
        assert!(grid.occupants(from).is_empty());
        assert_eq!(grid.occupants(to), &[entity]);
        assert_eq!(
            world.resource_mut::<EventQueue>().drain(),
            vec![RenderEvent::EntityMoved { id, from, to }]
        );
    }

    #[test]
    fn test_deregister_is_idempotent() {
        let mut world = test_world(4, 4);
        let at = Coord::new(2, 2);
        let entity = world.spawn(WallBundle::new(at)).id();
        register(&mut world, entity);

        deregister(&mut world, entity, true);
        deregister(&mut world, entity, true);

        assert!(!world.entities().contains(entity));
        assert!(world.resource::<GridGraph>().occupants(at).is_empty());
        let removed = world
            .resource_mut::<EventQueue>()
            .drain()
            .into_iter()
            .filter(|e| matches!(e, RenderEvent::EntityRemoved { .. }))
            .count();
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_player_lookup() {
        let mut world = test_world(4, 4);
        let at = Coord::new(3, 1);
        let entity = world
            .spawn(PlayerBundle::new(at, &PlayerTemplate::default()))
            .id();
        register(&mut world, entity);

        assert_eq!(player(&mut world), entity);
        assert_eq!(player_node(&mut world), at);
        assert_eq!(exit_node(&mut world), None);
    }

    #[test]
    fn test_clear_level_removes_everything() {
        let mut world = test_world(4, 4);
        let a = world.spawn(WallBundle::new(Coord::new(0, 0))).id();
        let b = world
            .spawn(PlayerBundle::new(Coord::new(1, 1), &PlayerTemplate::default()))
            .id();
        register(&mut world, a);
        register(&mut world, b);

        clear_level(&mut world);

        assert!(!world.entities().contains(a));
        assert!(!world.entities().contains(b));
        assert!(world.resource::<GridGraph>().occupants(Coord::new(0, 0)).is_empty());
        assert!(world.resource::<EventQueue>().is_empty());
    }
}
