//! Level generation.
//!
//! A level is planned as pure data first: shuffle every coordinate, carve
//! walls, seat the player, and put the exit as far from them as the shuffle
//! allows. A candidate layout is only committed after a flood-fill proves the
//! whole floor is reachable with the exit treated as solid, and a route check
//! proves the exit itself is enterable once its edges come back. Planning
//! retries with fresh shuffles up to the configured bound; running out of
//! attempts is a configuration error, not a loop.
//!
//! Committing tears down the previous level and spawns the new one through
//! the store helpers, so the renderer sees an ordinary burst of spawns.

use bevy_ecs::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::components::{
    AmmoPackBundle, AssetTag, BatteryBundle, ExitBundle, HealthPackBundle, HostileBundle,
    MoveIntent, PlayerBundle, PlayerTemplate, RateLimiter, WallBundle,
};
use crate::error::{Result, SimError};
use crate::grid::{Coord, GridGraph, ORTHO_STEPS};
use crate::store;
use crate::turn::GameConfig;

/// Power restored by a battery pickup.
pub const BATTERY_CHARGE: f32 = 25.0;
/// Power taken by stepping on a drain.
pub const DRAIN_LOSS: f32 = 15.0;
/// Health restored by a health pickup.
pub const HEALTH_PACK_AMOUNT: f32 = 25.0;

/// Drain count is this fraction of the level area at difficulty zero...
const DRAIN_BASE_FRACTION: f32 = 0.10;
/// ...plus this much more per difficulty step.
const DRAIN_PER_DIFFICULTY: f32 = 0.015;

/// The four diagonal step offsets, in fixed scan order.
pub const DIAGONAL_STEPS: [(i32, i32); 4] = [(1, 1), (-1, 1), (1, -1), (-1, -1)];

// ============================================================================
// HOSTILE ARCHETYPES
// ============================================================================

/// A data-only hostile archetype. Behavior lives entirely in the components
/// these fields become.
#[derive(Debug, Clone, Copy)]
pub struct MobSpec {
    pub tag: AssetTag,
    pub health: f32,
    pub bump_damage: f32,
    pub points: u32,
    pub is_slow: bool,
    pub pathfinds: bool,
    pub min_difficulty: u32,
    /// Relative selection weight once unlocked.
    pub weight: u32,
    pub moves: &'static [(i32, i32)],
}

/// Every hostile the generator can place, cheapest first.
pub const ROSTER: [MobSpec; 3] = [
    MobSpec {
        tag: AssetTag::Turtle,
        health: 30.0,
        bump_damage: 20.0,
        points: 10,
        is_slow: true,
        pathfinds: false,
        min_difficulty: 0,
        weight: 5,
        moves: &ORTHO_STEPS,
    },
    MobSpec {
        tag: AssetTag::Butterfly,
        health: 10.0,
        bump_damage: 10.0,
        points: 15,
        is_slow: false,
        pathfinds: false,
        min_difficulty: 2,
        weight: 3,
        moves: &DIAGONAL_STEPS,
    },
    MobSpec {
        tag: AssetTag::Rabbit,
        health: 20.0,
        bump_damage: 15.0,
        points: 25,
        is_slow: false,
        pathfinds: true,
        min_difficulty: 4,
        weight: 2,
        moves: &ORTHO_STEPS,
    },
];

// ============================================================================
// GENERATION
// ============================================================================

/// A validated level plan, ready to commit.
struct Layout {
    walls: Vec<Coord>,
    player: Coord,
    exit: Coord,
    /// Open floor left for pickups and hostiles, still in shuffle order.
    free: Vec<Coord>,
}

/// Replace the current level with a freshly generated one at `difficulty`.
/// The player is rebuilt from `template`; score and entity id numbering are
/// untouched.
pub fn generate(
    world: &mut World,
    difficulty: u32,
    template: &PlayerTemplate,
    rng: &mut ChaCha8Rng,
) -> Result<()> {
    let config = world.resource::<GameConfig>().clone();
    let layout = plan_layout(&config, difficulty, rng)?;
    commit_layout(world, &config, difficulty, template, layout, rng);
    Ok(())
}

/// Shuffle-and-validate until a fully reachable layout comes up.
fn plan_layout(config: &GameConfig, difficulty: u32, rng: &mut ChaCha8Rng) -> Result<Layout> {
    let mut coords: Vec<Coord> = (0..config.height)
        .flat_map(|y| (0..config.width).map(move |x| Coord::new(x, y)))
        .collect();
    if coords.is_empty() {
        return Err(SimError::MapGeneration {
            width: config.width,
            height: config.height,
            difficulty,
            attempts: 0,
        });
    }
    let area = coords.len();
    // The player always needs a node, whatever the wall fraction says.
    let wall_count = ((area as f32 * config.wall_fraction) as usize).min(area - 1);

    for attempt in 1..=config.retry_limit {
        coords.shuffle(rng);
        let walls = coords[..wall_count].to_vec();
        let player = coords[wall_count];
        let remainder = &coords[wall_count + 1..];
        let exit = match remainder.iter().copied().max_by_key(|c| c.manhattan(player)) {
            Some(exit) => exit,
            None => {
                warn!(attempt, "no node left for the exit, retrying");
                continue;
            }
        };

        // Validate with the exit solid too: the floor must hang together
        // even before the exit opens.
        let mut probe = GridGraph::new(config.width, config.height);
        probe.detach(&walls);
        probe.detach(&[exit]);
        if !probe.is_fully_reachable(player, |_| false) {
            warn!(attempt, "layout not fully reachable, retrying");
            continue;
        }
        // The fill treats the exit as solid and so never visits it; a
        // second check catches walls taking every one of its neighbours.
        probe.reattach(exit);
        if probe.shortest_path(player, exit).is_none() {
            warn!(attempt, "exit sealed behind walls, retrying");
            continue;
        }

        debug!(attempt, walls = walls.len(), "layout accepted");
        let free = remainder.iter().copied().filter(|&c| c != exit).collect();
        return Ok(Layout {
            walls,
            player,
            exit,
            free,
        });
    }

    Err(SimError::MapGeneration {
        width: config.width,
        height: config.height,
        difficulty,
        attempts: config.retry_limit,
    })
}

/// Spawn a planned layout into the world, replacing whatever level was live.
fn commit_layout(
    world: &mut World,
    config: &GameConfig,
    difficulty: u32,
    template: &PlayerTemplate,
    layout: Layout,
    rng: &mut ChaCha8Rng,
) {
    store::clear_level(world);
    let mut grid = GridGraph::new(config.width, config.height);
    grid.detach(&layout.walls);
    world.insert_resource(grid);

    for &at in &layout.walls {
        let wall = world.spawn(WallBundle::new(at)).id();
        store::register(world, wall);
    }
    let player = world.spawn(PlayerBundle::new(layout.player, template)).id();
    store::register(world, player);
    let exit = world.spawn(ExitBundle::new(layout.exit)).id();
    store::register(world, exit);

    let mut free = layout.free;
    for _ in 0..config.batteries {
        let Some(at) = take_open_node(&mut free) else { break };
        let battery = world.spawn(BatteryBundle::new(at, BATTERY_CHARGE)).id();
        store::register(world, battery);
    }
    for _ in 0..config.ammo_packs {
        let Some(at) = take_open_node(&mut free) else { break };
        let pack = world.spawn(AmmoPackBundle::new(at, rng.gen_range(1..=2))).id();
        store::register(world, pack);
    }
    for _ in 0..config.health_packs {
        let Some(at) = take_open_node(&mut free) else { break };
        let pack = world.spawn(HealthPackBundle::new(at, HEALTH_PACK_AMOUNT)).id();
        store::register(world, pack);
    }

    let area = (config.width * config.height) as f32;
    let drain_count =
        (area * (DRAIN_BASE_FRACTION + difficulty as f32 * DRAIN_PER_DIFFICULTY)) as usize;
    for _ in 0..drain_count {
        let Some(at) = take_open_node(&mut free) else { break };
        let drain = world.spawn(BatteryBundle::drain(at, DRAIN_LOSS)).id();
        store::register(world, drain);
    }

    let mut hostiles = 0;
    while hostiles < difficulty {
        let Some(spec) = pick_archetype(difficulty, rng) else { break };
        let Some(slot) = free
            .iter()
            .position(|&at| !threatens_on_spawn(&spec, at, layout.player))
        else {
            warn!("no safe node left for hostiles");
            break;
        };
        let at = free.remove(slot);
        let hostile = world
            .spawn(HostileBundle::new(
                at,
                spec.tag,
                spec.health,
                spec.bump_damage,
                spec.points,
                MoveIntent::new(spec.moves, spec.pathfinds),
            ))
            .id();
        if spec.is_slow {
            world.entity_mut(hostile).insert(RateLimiter::default());
        }
        store::register(world, hostile);
        hostiles += 1;
    }

    info!(
        difficulty,
        walls = layout.walls.len(),
        drains = drain_count,
        hostiles,
        "level generated"
    );
}

fn take_open_node(free: &mut Vec<Coord>) -> Option<Coord> {
    if free.is_empty() {
        warn!("open nodes exhausted while placing level content");
        return None;
    }
    Some(free.remove(0))
}

/// Weighted draw among the archetypes unlocked at `difficulty`.
fn pick_archetype(difficulty: u32, rng: &mut ChaCha8Rng) -> Option<MobSpec> {
    let unlocked: Vec<&MobSpec> = ROSTER
        .iter()
        .filter(|spec| spec.min_difficulty <= difficulty)
        .collect();
    let total: u32 = unlocked.iter().map(|spec| spec.weight).sum();
    if total == 0 {
        return None;
    }
    let mut roll = rng.gen_range(0..total);
    for spec in unlocked {
        if roll < spec.weight {
            return Some(*spec);
        }
        roll -= spec.weight;
    }
    None
}

/// True when a hostile standing at `at` could reach the player's node with
/// one of its own moves on its very first turn.
fn threatens_on_spawn(spec: &MobSpec, at: Coord, player: Coord) -> bool {
    spec.moves
        .iter()
        .any(|&(dx, dy)| player.offset(dx, dy) == at)
}
