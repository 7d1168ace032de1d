//! Session persistence.
//!
//! A save is a self-describing JSON document: grid dimensions, campaign
//! difficulty and score, and a flat entity list where each entity is a list
//! of tagged component records. Nothing else survives: occupancy and wall
//! edges are rebuilt from entity positions on load, entity ids are handed
//! out fresh, and the entity list keeps registration order so planning
//! order survives too.
//!
//! Restore validates the whole record before touching the world: a corrupt
//! save is reported as an error and the running level is left alone.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::components::{
    Ammo, AssetTag, BumpDamage, GridPosition, Health, IsExit, IsPlayer, IsWall, Mass, MoveIntent,
    OccupiesSpace, PickupFlag, Power, RateLimiter, ScoreValue, SimId, Visual,
};
use crate::error::{Result, SimError};
use crate::grid::{Coord, GridGraph};
use crate::store;
use crate::turn::Score;

/// One persisted component, externally tagged so the record reads as
/// `(kind, data)` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SavedComponent {
    Position { x: i32, y: i32 },
    Health { value: f32, max: f32 },
    Power { value: f32, max: f32, is_battery: bool, never_changes: bool },
    Mass { weight: f32 },
    Ammo { value: i32, damage: f32 },
    BumpDamage { value: f32 },
    ScoreValue { points: u32 },
    MoveIntent { offsets: Vec<(i32, i32)>, pathfinds: bool },
    RateLimiter { bucket_size: i32, step_cost: i32, bucket_left: i32 },
    PickupFlag { consumed: bool },
    Visual { tag: AssetTag, z: i32 },
    OccupiesSpace,
    Player,
    Exit,
    Wall,
}

/// One persisted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedEntity {
    pub components: Vec<SavedComponent>,
}

/// The full persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    pub width: i32,
    pub height: i32,
    pub difficulty: u32,
    pub score: u32,
    pub entities: Vec<SavedEntity>,
}

impl SaveData {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// CAPTURE
// ============================================================================

/// Snapshot every registered entity, in registration order.
pub fn capture(world: &mut World, difficulty: u32) -> SaveData {
    let (width, height) = {
        let grid = world.resource::<GridGraph>();
        (grid.width(), grid.height())
    };
    let score = world.resource::<Score>().0;

    let mut registered: Vec<(SimId, Entity)> = {
        let mut query = world.query::<(Entity, &SimId)>();
        query.iter(world).map(|(entity, id)| (*id, entity)).collect()
    };
    registered.sort_by_key(|&(id, _)| id);

    let entities = registered
        .iter()
        .filter_map(|&(_, entity)| capture_entity(world, entity))
        .collect();

    SaveData {
        width,
        height,
        difficulty,
        score,
        entities,
    }
}

fn capture_entity(world: &World, entity: Entity) -> Option<SavedEntity> {
    let position = world.get::<GridPosition>(entity)?;
    let mut components = vec![SavedComponent::Position {
        x: position.node.x,
        y: position.node.y,
    }];
    if let Some(h) = world.get::<Health>(entity) {
        components.push(SavedComponent::Health {
            value: h.value,
            max: h.max,
        });
    }
    if let Some(p) = world.get::<Power>(entity) {
        components.push(SavedComponent::Power {
            value: p.value,
            max: p.max,
            is_battery: p.is_battery,
            never_changes: p.never_changes,
        });
    }
    if let Some(m) = world.get::<Mass>(entity) {
        components.push(SavedComponent::Mass { weight: m.weight });
    }
    if let Some(a) = world.get::<Ammo>(entity) {
        components.push(SavedComponent::Ammo {
            value: a.value,
            damage: a.damage,
        });
    }
    if let Some(b) = world.get::<BumpDamage>(entity) {
        components.push(SavedComponent::BumpDamage { value: b.value });
    }
    if let Some(s) = world.get::<ScoreValue>(entity) {
        components.push(SavedComponent::ScoreValue { points: s.points });
    }
    if let Some(intent) = world.get::<MoveIntent>(entity) {
        components.push(SavedComponent::MoveIntent {
            offsets: intent.candidate_offsets.clone(),
            pathfinds: intent.uses_pathfinding,
        });
    }
    if let Some(r) = world.get::<RateLimiter>(entity) {
        components.push(SavedComponent::RateLimiter {
            bucket_size: r.bucket_size,
            step_cost: r.step_cost,
            bucket_left: r.bucket_left,
        });
    }
    if let Some(flag) = world.get::<PickupFlag>(entity) {
        components.push(SavedComponent::PickupFlag {
            consumed: flag.consumed,
        });
    }
    if let Some(v) = world.get::<Visual>(entity) {
        components.push(SavedComponent::Visual { tag: v.tag, z: v.z });
    }
    if world.get::<OccupiesSpace>(entity).is_some() {
        components.push(SavedComponent::OccupiesSpace);
    }
    if world.get::<IsPlayer>(entity).is_some() {
        components.push(SavedComponent::Player);
    }
    if world.get::<IsExit>(entity).is_some() {
        components.push(SavedComponent::Exit);
    }
    if world.get::<IsWall>(entity).is_some() {
        components.push(SavedComponent::Wall);
    }
    Some(SavedEntity { components })
}

// ============================================================================
// RESTORE
// ============================================================================

/// Rebuild the world from a record. The record is validated in full first;
/// on error the live level is untouched.
pub fn restore(world: &mut World, data: &SaveData) -> Result<()> {
    validate(data)?;

    store::clear_level(world);
    world.insert_resource(GridGraph::new(data.width, data.height));
    world.resource_mut::<Score>().0 = data.score;

    for saved in &data.entities {
        spawn_saved(world, saved);
    }

    // Wall nodes were persisted as ordinary entities; re-cut their edges.
    let walls: Vec<Coord> = {
        let mut query = world.query_filtered::<&GridPosition, With<IsWall>>();
        query.iter(world).map(|position| position.node).collect()
    };
    world.resource_mut::<GridGraph>().detach(&walls);

    info!(
        entities = data.entities.len(),
        difficulty = data.difficulty,
        "session restored"
    );
    Ok(())
}

fn validate(data: &SaveData) -> Result<()> {
    if data.width <= 0 || data.height <= 0 {
        return Err(SimError::CorruptSave(
            "non-positive grid dimensions".into(),
        ));
    }
    let mut players = 0;
    for (index, entity) in data.entities.iter().enumerate() {
        let mut position = None;
        for component in &entity.components {
            match component {
                SavedComponent::Position { x, y } => position = Some(Coord::new(*x, *y)),
                SavedComponent::Player => players += 1,
                _ => {}
            }
        }
        let Some(at) = position else {
            return Err(SimError::CorruptSave(format!(
                "entity {index} has no position"
            )));
        };
        if at.x < 0 || at.x >= data.width || at.y < 0 || at.y >= data.height {
            return Err(SimError::CorruptSave(format!(
                "entity {index} is off the grid"
            )));
        }
    }
    if players != 1 {
        return Err(SimError::CorruptSave(format!(
            "record holds {players} player entities, expected exactly 1"
        )));
    }
    Ok(())
}

fn spawn_saved(world: &mut World, saved: &SavedEntity) {
    let entity = {
        let mut e = world.spawn_empty();
        for component in &saved.components {
            match component {
                SavedComponent::Position { x, y } => {
                    e.insert(GridPosition::new(Coord::new(*x, *y)));
                }
                SavedComponent::Health { value, max } => {
                    e.insert(Health {
                        value: *value,
                        max: *max,
                    });
                }
                SavedComponent::Power {
                    value,
                    max,
                    is_battery,
                    never_changes,
                } => {
                    e.insert(Power {
                        value: *value,
                        max: *max,
                        is_battery: *is_battery,
                        never_changes: *never_changes,
                    });
                }
                SavedComponent::Mass { weight } => {
                    e.insert(Mass::new(*weight));
                }
                SavedComponent::Ammo { value, damage } => {
                    e.insert(Ammo::new(*value, *damage));
                }
                SavedComponent::BumpDamage { value } => {
                    e.insert(BumpDamage::new(*value));
                }
                SavedComponent::ScoreValue { points } => {
                    e.insert(ScoreValue::new(*points));
                }
                SavedComponent::MoveIntent { offsets, pathfinds } => {
                    e.insert(MoveIntent::new(offsets, *pathfinds));
                }
                SavedComponent::RateLimiter {
                    bucket_size,
                    step_cost,
                    bucket_left,
                } => {
                    e.insert(RateLimiter {
                        bucket_size: *bucket_size,
                        step_cost: *step_cost,
                        bucket_left: *bucket_left,
                    });
                }
                SavedComponent::PickupFlag { consumed } => {
                    e.insert(PickupFlag {
                        consumed: *consumed,
                    });
                }
                SavedComponent::Visual { tag, z } => {
                    e.insert(Visual::new(*tag, *z));
                }
                SavedComponent::OccupiesSpace => {
                    e.insert(OccupiesSpace);
                }
                SavedComponent::Player => {
                    e.insert(IsPlayer);
                }
                SavedComponent::Exit => {
                    e.insert(IsExit);
                }
                SavedComponent::Wall => {
                    e.insert(IsWall);
                }
            }
        }
        e.id()
    };
    store::register(world, entity);
}
