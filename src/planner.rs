//! Hostile movement planner.
//!
//! Once per turn, after the player's action and the rule pass, every entity
//! with a `MoveIntent` takes one step. Resolution order is ascending `SimId`,
//! i.e. spawn order, and each move lands before the next hostile plans, so
//! two hostiles never claim the same node in one turn.
//!
//! Pathfinding hostiles route around walls toward the player and fall back
//! to proximity scoring when no route exists. The rest score each candidate
//! offset by squared distance to the player and keep the earliest best one.

use bevy_ecs::prelude::*;
use tracing::debug;

use crate::components::{
    BumpDamage, GridPosition, Health, MoveIntent, OccupiesSpace, RateLimiter, SimId,
};
use crate::grid::{Coord, GridGraph};
use crate::store;

/// Advance every hostile by one planned step. Slow hostiles pay their rate
/// limiter first and sit the turn out when it denies them.
pub fn resolve_hostiles(world: &mut World) {
    let player = store::player(world);
    let player_node = store::player_node(world);

    let mut movers: Vec<(SimId, Entity)> = {
        let mut query = world.query_filtered::<(Entity, &SimId), With<MoveIntent>>();
        query.iter(world).map(|(entity, id)| (*id, entity)).collect()
    };
    movers.sort_by_key(|&(id, _)| id);

    for (_, hostile) in movers {
        if let Some(mut limiter) = world.get_mut::<RateLimiter>(hostile) {
            if !limiter.try_step() {
                continue;
            }
        }
        let at = world
            .get::<GridPosition>(hostile)
            .expect("registered hostile carries a GridPosition")
            .node;
        let intent = world
            .get::<MoveIntent>(hostile)
            .cloned()
            .expect("planner only visits entities with a MoveIntent");

        let destination = if intent.uses_pathfinding {
            pathfinding_step(world, at, player_node, player)
        } else {
            None
        }
        .or_else(|| proximity_step(world, at, player_node, player, &intent.candidate_offsets));

        let Some(destination) = destination else {
            continue;
        };
        if destination == player_node {
            let damage = world
                .get::<BumpDamage>(hostile)
                .map_or(0.0, |bump| bump.value);
            if let Some(mut health) = world.get_mut::<Health>(player) {
                health.hit(damage);
            }
            store::bump(world, hostile, player_node);
            store::flash(world, player_node, damage);
            debug!(node = ?player_node, damage, "hostile attacks player");
        } else {
            store::relocate(world, hostile, destination);
        }
    }
}

/// First step of the shortest route to `to`, or `None` when no route exists
/// or something solid already stands on that step.
fn pathfinding_step(world: &World, from: Coord, to: Coord, player: Entity) -> Option<Coord> {
    let grid = world.resource::<GridGraph>();
    let path = grid.shortest_path(from, to)?;
    let step = path.get(1).copied()?;
    if blocked_for(world, grid, step, player) {
        return None;
    }
    Some(step)
}

/// The passable candidate offset closest to `target`, scored by squared
/// distance. Equal scores keep the earliest offset.
fn proximity_step(
    world: &World,
    from: Coord,
    target: Coord,
    player: Entity,
    offsets: &[(i32, i32)],
) -> Option<Coord> {
    let grid = world.resource::<GridGraph>();
    let mut best: Option<(Coord, i64)> = None;
    for &(dx, dy) in offsets {
        let candidate = from.offset(dx, dy);
        if grid.is_detached(candidate) {
            continue;
        }
        if blocked_for(world, grid, candidate, player) {
            continue;
        }
        let distance = candidate.dist_sq(target);
        if best.map_or(true, |(_, shortest)| distance < shortest) {
            best = Some((candidate, distance));
        }
    }
    best.map(|(coord, _)| coord)
}

/// Whether `node` holds something solid other than the player. Pickups do
/// not occupy space, so hostiles walk straight over them.
fn blocked_for(world: &World, grid: &GridGraph, node: Coord, player: Entity) -> bool {
    grid.occupants(node)
        .iter()
        .any(|&occupant| occupant != player && world.get::<OccupiesSpace>(occupant).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AssetTag, PlayerBundle, PlayerTemplate};
    use crate::events::{EventQueue, RenderEvent};
    use crate::grid::ORTHO_STEPS;
    use crate::store::NextSimId;

    fn test_world(width: i32, height: i32) -> World {
        let mut world = World::new();
        world.insert_resource(GridGraph::new(width, height));
        world.insert_resource(EventQueue::default());
        world.insert_resource(NextSimId::default());
        world
    }

    fn spawn_player(world: &mut World, at: Coord) -> Entity {
        let player = world
            .spawn(PlayerBundle::new(at, &PlayerTemplate::default()))
            .id();
        store::register(world, player);
        player
    }

    fn spawn_hostile(world: &mut World, at: Coord, pathfinds: bool) -> Entity {
        let hostile = world
            .spawn(crate::components::HostileBundle::new(
                at,
                AssetTag::Turtle,
                30.0,
                20.0,
                10,
                MoveIntent::new(&ORTHO_STEPS, pathfinds),
            ))
            .id();
        store::register(world, hostile);
        hostile
    }

    fn node_of(world: &World, entity: Entity) -> Coord {
        world.get::<GridPosition>(entity).unwrap().node
    }

    #[test]
    fn test_hostile_steps_toward_player() {
        let mut world = test_world(6, 6);
        spawn_player(&mut world, Coord::new(0, 3));
        let hostile = spawn_hostile(&mut world, Coord::new(3, 3), false);

        resolve_hostiles(&mut world);

        assert_eq!(node_of(&world, hostile), Coord::new(2, 3));
    }

    #[test]
    fn test_equal_distance_keeps_first_offset() {
        let mut world = test_world(4, 4);
        spawn_player(&mut world, Coord::new(0, 0));
        let hostile = spawn_hostile(&mut world, Coord::new(1, 1), false);

        resolve_hostiles(&mut world);

        // (0, 1) and (1, 0) tie; (-1, 0) is listed before (0, -1).
        assert_eq!(node_of(&world, hostile), Coord::new(0, 1));
    }

    #[test]
    fn test_adjacent_hostile_attacks_in_place() {
        let mut world = test_world(4, 4);
        let player = spawn_player(&mut world, Coord::new(0, 0));
        let hostile = spawn_hostile(&mut world, Coord::new(1, 0), false);
        world.resource_mut::<EventQueue>().clear();

        resolve_hostiles(&mut world);

        assert_eq!(node_of(&world, hostile), Coord::new(1, 0));
        assert_eq!(world.get::<Health>(player).unwrap().value, 80.0);
        let events = world.resource_mut::<EventQueue>().drain();
        let hostile_id = world.get::<SimId>(hostile).copied().unwrap();
        assert!(events.contains(&RenderEvent::EntityBumped {
            id: hostile_id,
            toward: Coord::new(0, 0),
        }));
        assert!(events.contains(&RenderEvent::DamageFlash {
            node: Coord::new(0, 0),
            amount: 20.0,
        }));
    }

    #[test]
    fn test_walled_in_hostile_waits() {
        let mut world = test_world(3, 3);
        world.resource_mut::<GridGraph>().detach(&[
            Coord::new(0, 1),
            Coord::new(2, 1),
            Coord::new(1, 0),
            Coord::new(1, 2),
        ]);
        let player = spawn_player(&mut world, Coord::new(0, 0));
        let hostile = spawn_hostile(&mut world, Coord::new(1, 1), false);

        resolve_hostiles(&mut world);

        assert_eq!(node_of(&world, hostile), Coord::new(1, 1));
        assert_eq!(world.get::<Health>(player).unwrap().value, 100.0);
    }

    #[test]
    fn test_rate_limited_hostile_moves_every_other_turn() {
        let mut world = test_world(6, 1);
        spawn_player(&mut world, Coord::new(0, 0));
        let hostile = spawn_hostile(&mut world, Coord::new(5, 0), false);
        world.entity_mut(hostile).insert(RateLimiter::default());

        resolve_hostiles(&mut world);
        assert_eq!(node_of(&world, hostile), Coord::new(4, 0));

        resolve_hostiles(&mut world);
        assert_eq!(node_of(&world, hostile), Coord::new(4, 0));

        resolve_hostiles(&mut world);
        assert_eq!(node_of(&world, hostile), Coord::new(3, 0));
    }

    #[test]
    fn test_hostiles_resolve_in_spawn_order_with_immediate_moves() {
        let mut world = test_world(1, 5);
        spawn_player(&mut world, Coord::new(0, 0));
        let first = spawn_hostile(&mut world, Coord::new(0, 2), false);
        let second = spawn_hostile(&mut world, Coord::new(0, 3), false);

        resolve_hostiles(&mut world);

        // The earlier spawn steps first and vacates the node the later
        // spawn then claims.
        assert_eq!(node_of(&world, first), Coord::new(0, 1));
        assert_eq!(node_of(&world, second), Coord::new(0, 2));
    }

    #[test]
    fn test_pathfinder_routes_around_dead_end() {
        let mut world = test_world(3, 4);
        world
            .resource_mut::<GridGraph>()
            .detach(&[Coord::new(0, 2), Coord::new(1, 1)]);
        spawn_player(&mut world, Coord::new(0, 3));
        let hostile = spawn_hostile(&mut world, Coord::new(0, 0), true);

        resolve_hostiles(&mut world);

        // Greedy scoring would pick (0, 1), a dead end; the route goes right.
        assert_eq!(node_of(&world, hostile), Coord::new(1, 0));
    }

    #[test]
    fn test_pathfinder_falls_back_when_no_route_exists() {
        let mut world = test_world(3, 4);
        world
            .resource_mut::<GridGraph>()
            .detach(&[Coord::new(0, 2), Coord::new(1, 3)]);
        spawn_player(&mut world, Coord::new(0, 3));
        let hostile = spawn_hostile(&mut world, Coord::new(0, 0), true);

        resolve_hostiles(&mut world);

        assert_eq!(node_of(&world, hostile), Coord::new(0, 1));
    }
}
