//! Turn engine.
//!
//! A turn is a strict pipeline: validate and apply the player's action, run
//! the pickup rules, let every hostile take its step, then check whether the
//! run is over. A rejected action aborts the pipeline before the rule pass,
//! so an illegal move never costs the player anything and never lets the
//! hostiles advance.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::components::{
    Ammo, BumpDamage, GridPosition, Health, Mass, OccupiesSpace, Power, ScoreValue,
};
use crate::grid::{Coord, GridGraph};
use crate::los;
use crate::planner;
use crate::rules::RuleSet;
use crate::store;

// ============================================================================
// SESSION RESOURCES
// ============================================================================

/// Session tunables, fixed when the game is created.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Grid width in nodes.
    pub width: i32,
    /// Grid height in nodes.
    pub height: i32,
    /// Generation attempts per level before giving up.
    pub retry_limit: u32,
    /// Fraction of nodes turned into walls.
    pub wall_fraction: f32,
    /// Clearing this difficulty wins the campaign.
    pub win_difficulty: u32,
    /// Charging batteries placed per level.
    pub batteries: usize,
    /// Ammo pickups placed per level.
    pub ammo_packs: usize,
    /// Health pickups placed per level.
    pub health_packs: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 8,
            height: 6,
            retry_limit: 20,
            wall_fraction: 0.25,
            win_difficulty: 7,
            batteries: 2,
            ammo_packs: 2,
            health_packs: 1,
        }
    }
}

/// Points accumulated across the whole campaign.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Score(pub u32);

// ============================================================================
// ACTIONS AND VERDICTS
// ============================================================================

/// A player step direction. The grid origin is bottom-left, so north is +y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
        }
    }
}

/// Everything the player can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Step one node in a direction. Stepping into a hostile is a melee
    /// attack instead of a move.
    Move(Direction),
    /// Fire along the line toward a node. The shot lands on the first
    /// occupied node in the way, or on the target itself.
    Shoot(Coord),
    /// Advance to the next level once the current one is cleared.
    Accept,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEnd {
    OutOfPower,
    OutOfHealth,
    Victory,
}

/// Where the engine currently is in the turn pipeline. Between calls this is
/// `AwaitingInput` or `Terminated`; the transient stages are observable by
/// whoever drives [`execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    AwaitingInput,
    ValidatingAction,
    ResolvingRules,
    ResolvingHostiles,
    CheckingTermination,
    Terminated(GameEnd),
}

/// The result of one call to [`execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnVerdict {
    /// The action was illegal; nothing in the world changed.
    Rejected,
    /// The turn ran to completion and the game continues.
    Continued,
    /// The player stands on the exit; the level is cleared.
    LevelCleared,
    /// The run is over.
    Lost(GameEnd),
}

enum ActionOutcome {
    Rejected,
    TurnTaken,
    Died(GameEnd),
}

// ============================================================================
// TURN PIPELINE
// ============================================================================

/// Run one full turn. `phase` is walked through the pipeline stages and left
/// at `AwaitingInput` or `Terminated`.
pub fn execute(
    world: &mut World,
    rules: &RuleSet,
    action: Action,
    phase: &mut TurnPhase,
) -> TurnVerdict {
    debug!(?action, "turn started");
    *phase = TurnPhase::ValidatingAction;
    match validate_action(world, action) {
        ActionOutcome::Rejected => {
            *phase = TurnPhase::AwaitingInput;
            return TurnVerdict::Rejected;
        }
        ActionOutcome::Died(end) => {
            info!(?end, "run ended");
            *phase = TurnPhase::Terminated(end);
            return TurnVerdict::Lost(end);
        }
        ActionOutcome::TurnTaken => {}
    }

    *phase = TurnPhase::ResolvingRules;
    rules.run(world);

    *phase = TurnPhase::ResolvingHostiles;
    planner::resolve_hostiles(world);

    *phase = TurnPhase::CheckingTermination;
    let verdict = check_termination(world);
    *phase = match verdict {
        TurnVerdict::Lost(end) => {
            info!(?end, "run ended");
            TurnPhase::Terminated(end)
        }
        _ => TurnPhase::AwaitingInput,
    };
    verdict
}

/// Apply the player's action. Moves pay power by mass; melee and shooting
/// are free of power but shots pay one round.
fn validate_action(world: &mut World, action: Action) -> ActionOutcome {
    let player = store::player(world);
    let from = store::player_node(world);

    match action {
        // Level advancement is a session concern, not a turn.
        Action::Accept => ActionOutcome::Rejected,

        Action::Move(direction) => {
            let (dx, dy) = direction.offset();
            let to = from.offset(dx, dy);
            if !world.resource::<GridGraph>().is_connected(from, to) {
                store::bump(world, player, to);
                return ActionOutcome::Rejected;
            }

            let blocker = {
                let grid = world.resource::<GridGraph>();
                grid.occupants(to)
                    .iter()
                    .copied()
                    .find(|&e| e != player && world.get::<OccupiesSpace>(e).is_some())
            };
            if let Some(blocker) = blocker {
                if world.get::<Health>(blocker).is_none() {
                    store::bump(world, player, to);
                    return ActionOutcome::Rejected;
                }
                // Melee: lunge without leaving the node.
                let damage = world
                    .get::<BumpDamage>(player)
                    .map_or(0.0, |bump| bump.value);
                store::bump(world, player, to);
                damage_entity(world, blocker, damage);
                return ActionOutcome::TurnTaken;
            }

            let cost = world.get::<Mass>(player).map_or(0.0, |mass| mass.move_cost());
            let paid = world
                .get_mut::<Power>(player)
                .map_or(false, |mut power| power.spend(cost));
            if !paid {
                return ActionOutcome::Died(GameEnd::OutOfPower);
            }
            store::relocate(world, player, to);
            ActionOutcome::TurnTaken
        }

        Action::Shoot(target) => {
            let armed = world
                .get::<Ammo>(player)
                .is_some_and(|ammo| ammo.has_rounds());
            if !armed {
                store::bump(world, player, target);
                return ActionOutcome::Rejected;
            }

            let landing = {
                let grid = world.resource::<GridGraph>();
                los::shot_path(world, grid, from, target).last().copied()
            };
            let Some(landing) = landing else {
                store::bump(world, player, target);
                return ActionOutcome::Rejected;
            };
            let victims: Vec<Entity> = {
                let grid = world.resource::<GridGraph>();
                grid.occupants(landing)
                    .iter()
                    .copied()
                    .filter(|&e| e != player && world.get::<Health>(e).is_some())
                    .collect()
            };
            if victims.is_empty() {
                store::bump(world, player, target);
                return ActionOutcome::Rejected;
            }

            let damage = {
                let mut ammo = world
                    .get_mut::<Ammo>(player)
                    .expect("armed player carries Ammo");
                ammo.value -= 1;
                ammo.damage
            };
            debug!(?landing, victims = victims.len(), "shot fired");
            for victim in victims {
                damage_entity(world, victim, damage);
            }
            ActionOutcome::TurnTaken
        }
    }
}

/// Deal damage, flash the node, and on a kill bank the score and remove the
/// body.
fn damage_entity(world: &mut World, target: Entity, amount: f32) {
    let dead = {
        let Some(mut health) = world.get_mut::<Health>(target) else {
            return;
        };
        health.hit(amount);
        health.is_dead()
    };
    if let Some(node) = world.get::<GridPosition>(target).map(|p| p.node) {
        store::flash(world, node, amount);
    }
    if dead {
        if let Some(points) = world.get::<ScoreValue>(target).map(|s| s.points) {
            world.resource_mut::<Score>().0 += points;
        }
        store::deregister(world, target, true);
    }
}

/// End-of-turn survival check. Power runs out before health is considered,
/// and reaching the exit only counts for a player who is still alive.
fn check_termination(world: &mut World) -> TurnVerdict {
    let player = store::player(world);
    let power = world
        .get::<Power>(player)
        .expect("player carries Power");
    if power.is_empty() {
        return TurnVerdict::Lost(GameEnd::OutOfPower);
    }
    let health = world
        .get::<Health>(player)
        .expect("player carries Health");
    if health.is_dead() {
        return TurnVerdict::Lost(GameEnd::OutOfHealth);
    }
    let at = store::player_node(world);
    if store::exit_node(world) == Some(at) {
        return TurnVerdict::LevelCleared;
    }
    TurnVerdict::Continued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        AssetTag, BatteryBundle, ExitBundle, HostileBundle, MoveIntent, PlayerBundle,
        PlayerTemplate, WallBundle,
    };
    use crate::events::{EventQueue, RenderEvent};
    use crate::grid::ORTHO_STEPS;
    use crate::store::NextSimId;

    fn test_world(width: i32, height: i32) -> World {
        let mut world = World::new();
        world.insert_resource(GridGraph::new(width, height));
        world.insert_resource(EventQueue::default());
        world.insert_resource(NextSimId::default());
        world.insert_resource(Score::default());
        world
    }

    fn spawn_player(world: &mut World, at: Coord, template: &PlayerTemplate) -> Entity {
        let player = world.spawn(PlayerBundle::new(at, template)).id();
        store::register(world, player);
        player
    }

    fn spawn_turtle(world: &mut World, at: Coord) -> Entity {
        let hostile = world
            .spawn(HostileBundle::new(
                at,
                AssetTag::Turtle,
                30.0,
                20.0,
                10,
                MoveIntent::new(&ORTHO_STEPS, false),
            ))
            .id();
        store::register(world, hostile);
        hostile
    }

    fn run(world: &mut World, action: Action) -> (TurnVerdict, TurnPhase) {
        let rules = RuleSet::standard();
        let mut phase = TurnPhase::AwaitingInput;
        let verdict = execute(world, &rules, action, &mut phase);
        (verdict, phase)
    }

    #[test]
    fn test_open_move_costs_power_by_mass() {
        let mut world = test_world(4, 4);
        let player = spawn_player(&mut world, Coord::new(1, 1), &PlayerTemplate::default());

        let (verdict, phase) = run(&mut world, Action::Move(Direction::East));

        assert_eq!(verdict, TurnVerdict::Continued);
        assert_eq!(phase, TurnPhase::AwaitingInput);
        assert_eq!(
            world.get::<GridPosition>(player).unwrap().node,
            Coord::new(2, 1)
        );
        assert_eq!(world.get::<Power>(player).unwrap().value, 99.0);
    }

    #[test]
    fn test_move_into_wall_is_rejected_and_world_freezes() {
        let mut world = test_world(5, 5);
        let wall_at = Coord::new(2, 1);
        world.resource_mut::<GridGraph>().detach(&[wall_at]);
        let wall = world.spawn(WallBundle::new(wall_at)).id();
        store::register(&mut world, wall);
        let player = spawn_player(&mut world, Coord::new(1, 1), &PlayerTemplate::default());
        let hostile = spawn_turtle(&mut world, Coord::new(4, 4));
        world.resource_mut::<EventQueue>().clear();

        let (verdict, phase) = run(&mut world, Action::Move(Direction::East));

        assert_eq!(verdict, TurnVerdict::Rejected);
        assert_eq!(phase, TurnPhase::AwaitingInput);
        assert_eq!(
            world.get::<GridPosition>(player).unwrap().node,
            Coord::new(1, 1)
        );
        assert_eq!(world.get::<Power>(player).unwrap().value, 100.0);
        // A rejected turn never lets hostiles advance.
        assert_eq!(
            world.get::<GridPosition>(hostile).unwrap().node,
            Coord::new(4, 4)
        );
        let player_id = world.get::<crate::components::SimId>(player).copied().unwrap();
        assert_eq!(
            world.resource_mut::<EventQueue>().drain(),
            vec![RenderEvent::EntityBumped {
                id: player_id,
                toward: wall_at,
            }]
        );
    }

    #[test]
    fn test_move_off_grid_is_rejected() {
        let mut world = test_world(3, 3);
        let player = spawn_player(&mut world, Coord::new(0, 0), &PlayerTemplate::default());

        let (verdict, _) = run(&mut world, Action::Move(Direction::West));

        assert_eq!(verdict, TurnVerdict::Rejected);
        assert_eq!(
            world.get::<GridPosition>(player).unwrap().node,
            Coord::new(0, 0)
        );
    }

    #[test]
    fn test_melee_bump_kills_weak_hostile_and_scores() {
        let mut world = test_world(4, 4);
        let player = spawn_player(&mut world, Coord::new(1, 1), &PlayerTemplate::default());
        let hostile = world
            .spawn(HostileBundle::new(
                Coord::new(2, 1),
                AssetTag::Butterfly,
                10.0,
                10.0,
                15,
                MoveIntent::new(&ORTHO_STEPS, false),
            ))
            .id();
        store::register(&mut world, hostile);

        let (verdict, _) = run(&mut world, Action::Move(Direction::East));

        assert_eq!(verdict, TurnVerdict::Continued);
        assert!(!world.entities().contains(hostile));
        assert_eq!(world.resource::<Score>().0, 15);
        // Melee is a lunge: no movement, no power cost.
        assert_eq!(
            world.get::<GridPosition>(player).unwrap().node,
            Coord::new(1, 1)
        );
        assert_eq!(world.get::<Power>(player).unwrap().value, 100.0);
    }

    #[test]
    fn test_melee_survivor_strikes_back() {
        let mut world = test_world(4, 4);
        let player = spawn_player(&mut world, Coord::new(1, 1), &PlayerTemplate::default());
        let hostile = spawn_turtle(&mut world, Coord::new(2, 1));

        let (verdict, _) = run(&mut world, Action::Move(Direction::East));

        assert_eq!(verdict, TurnVerdict::Continued);
        assert_eq!(world.get::<Health>(hostile).unwrap().value, 10.0);
        assert_eq!(world.get::<Health>(player).unwrap().value, 80.0);
    }

    #[test]
    fn test_shot_stops_at_first_blocker() {
        let mut world = test_world(6, 3);
        let mut template = PlayerTemplate::default();
        template.ammo = Ammo::new(2, 35.0);
        spawn_player(&mut world, Coord::new(0, 0), &template);
        let near = spawn_turtle(&mut world, Coord::new(2, 0));
        let far = spawn_turtle(&mut world, Coord::new(4, 0));

        let (verdict, _) = run(&mut world, Action::Shoot(Coord::new(4, 0)));

        assert_eq!(verdict, TurnVerdict::Continued);
        assert!(!world.entities().contains(near), "35 damage kills a turtle");
        assert!(world.entities().contains(far));
        assert_eq!(world.resource::<Score>().0, 10);
    }

    #[test]
    fn test_shot_spends_one_round() {
        let mut world = test_world(6, 3);
        let mut template = PlayerTemplate::default();
        template.ammo = Ammo::new(2, 35.0);
        let player = spawn_player(&mut world, Coord::new(0, 0), &template);
        spawn_turtle(&mut world, Coord::new(3, 0));

        run(&mut world, Action::Shoot(Coord::new(3, 0)));

        assert_eq!(world.get::<Ammo>(player).unwrap().value, 1);
    }

    #[test]
    fn test_shot_without_ammo_is_rejected() {
        let mut world = test_world(6, 3);
        let player = spawn_player(&mut world, Coord::new(0, 0), &PlayerTemplate::default());
        let hostile = spawn_turtle(&mut world, Coord::new(3, 0));

        let (verdict, _) = run(&mut world, Action::Shoot(Coord::new(3, 0)));

        assert_eq!(verdict, TurnVerdict::Rejected);
        assert_eq!(world.get::<Health>(hostile).unwrap().value, 30.0);
        assert_eq!(world.get::<Ammo>(player).unwrap().value, 0);
    }

    #[test]
    fn test_shot_at_empty_node_is_rejected() {
        let mut world = test_world(6, 3);
        let mut template = PlayerTemplate::default();
        template.ammo = Ammo::new(2, 35.0);
        let player = spawn_player(&mut world, Coord::new(0, 0), &template);

        let (verdict, _) = run(&mut world, Action::Shoot(Coord::new(4, 2)));

        assert_eq!(verdict, TurnVerdict::Rejected);
        assert_eq!(world.get::<Ammo>(player).unwrap().value, 2);
    }

    #[test]
    fn test_pickup_collected_on_arrival() {
        let mut world = test_world(4, 4);
        let mut template = PlayerTemplate::default();
        template.power.value = 40.0;
        let player = spawn_player(&mut world, Coord::new(1, 1), &template);
        let battery = world.spawn(BatteryBundle::new(Coord::new(2, 1), 25.0)).id();
        store::register(&mut world, battery);

        let (verdict, _) = run(&mut world, Action::Move(Direction::East));

        assert_eq!(verdict, TurnVerdict::Continued);
        // 40 - 1 move cost + 25 charge.
        assert_eq!(world.get::<Power>(player).unwrap().value, 64.0);
        assert!(!world.entities().contains(battery));
    }

    #[test]
    fn test_reaching_exit_clears_level() {
        let mut world = test_world(4, 4);
        spawn_player(&mut world, Coord::new(1, 1), &PlayerTemplate::default());
        let exit = world.spawn(ExitBundle::new(Coord::new(1, 2))).id();
        store::register(&mut world, exit);

        let (verdict, phase) = run(&mut world, Action::Move(Direction::North));

        assert_eq!(verdict, TurnVerdict::LevelCleared);
        assert_eq!(phase, TurnPhase::AwaitingInput);
    }

    #[test]
    fn test_exact_power_spend_ends_run_same_turn() {
        let mut world = test_world(4, 4);
        let mut template = PlayerTemplate::default();
        template.power.value = 5.0;
        template.mass = Mass::new(500.0);
        let player = spawn_player(&mut world, Coord::new(1, 1), &template);

        let (verdict, phase) = run(&mut world, Action::Move(Direction::East));

        assert_eq!(verdict, TurnVerdict::Lost(GameEnd::OutOfPower));
        assert_eq!(phase, TurnPhase::Terminated(GameEnd::OutOfPower));
        // The move itself happened before the run ended.
        assert_eq!(
            world.get::<GridPosition>(player).unwrap().node,
            Coord::new(2, 1)
        );
        assert_eq!(world.get::<Power>(player).unwrap().value, 0.0);
    }

    #[test]
    fn test_unpayable_move_ends_run_in_place() {
        let mut world = test_world(4, 4);
        let mut template = PlayerTemplate::default();
        template.power.value = 0.5;
        let player = spawn_player(&mut world, Coord::new(1, 1), &template);

        let (verdict, phase) = run(&mut world, Action::Move(Direction::East));

        assert_eq!(verdict, TurnVerdict::Lost(GameEnd::OutOfPower));
        assert_eq!(phase, TurnPhase::Terminated(GameEnd::OutOfPower));
        assert_eq!(
            world.get::<GridPosition>(player).unwrap().node,
            Coord::new(1, 1)
        );
    }

    #[test]
    fn test_hostile_attack_can_end_run() {
        let mut world = test_world(5, 1);
        let mut template = PlayerTemplate::default();
        template.health.value = 10.0;
        spawn_player(&mut world, Coord::new(0, 0), &template);
        spawn_turtle(&mut world, Coord::new(2, 0));

        let (verdict, phase) = run(&mut world, Action::Move(Direction::East));

        assert_eq!(verdict, TurnVerdict::Lost(GameEnd::OutOfHealth));
        assert_eq!(phase, TurnPhase::Terminated(GameEnd::OutOfHealth));
    }

    #[test]
    fn test_accept_is_not_a_turn() {
        let mut world = test_world(4, 4);
        spawn_player(&mut world, Coord::new(1, 1), &PlayerTemplate::default());
        let hostile = spawn_turtle(&mut world, Coord::new(3, 3));

        let (verdict, _) = run(&mut world, Action::Accept);

        assert_eq!(verdict, TurnVerdict::Rejected);
        assert_eq!(
            world.get::<GridPosition>(hostile).unwrap().node,
            Coord::new(3, 3)
        );
    }
}
