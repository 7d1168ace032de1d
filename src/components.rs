//! ECS components for the POWER simulation.
//!
//! Components are pure data containers attached to entities.
//! An entity's behavior is decided entirely by which components it carries;
//! all game logic lives in the turn-resolution modules that query them.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grid::Coord;

/// Power spent per unit of mass for one grid step.
pub const MOVE_POWER_FACTOR: f32 = 0.01;

/// Damage dealt by one ranged shot from the player.
pub const PLAYER_SHOT_DAMAGE: f32 = 35.0;

// ============================================================================
// DRAW ORDER
// ============================================================================

pub const Z_FLOOR: i32 = 0;
pub const Z_WALL: i32 = 100;
pub const Z_PICKUP: i32 = 200;
pub const Z_MOB: i32 = 300;
pub const Z_PLAYER: i32 = 4000;

/// Sprite sheet tag handed to the renderer in spawn notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetTag {
    Player,
    Exit,
    Wall,
    Battery,
    Drain,
    AmmoPack,
    HealthPack,
    Butterfly,
    Rabbit,
    Turtle,
}

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// The grid node an entity stands on. An entity carrying this component is
/// always registered in that node's occupant set; moves go through the store
/// helpers so the two stay in sync.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPosition {
    pub node: Coord,
}

impl GridPosition {
    pub fn new(node: Coord) -> Self {
        Self { node }
    }
}

/// Marker: the entity fills its tile, blocking hostile movement and shots.
/// The player never blocks itself.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct OccupiesSpace;

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Stable per-session identifier, assigned in registration order. Renderer
/// notifications carry this instead of the raw ECS id, and hostile planning
/// iterates in ascending `SimId` order so turns resolve deterministically.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimId(pub u32);

/// Marker for the player entity. Exactly one exists per level.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct IsPlayer;

/// Marker for the level exit node entity.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct IsExit;

/// Marker for wall entities (their node is edge-detached in the grid graph).
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct IsWall;

/// Sprite tag and draw order reported when the entity spawns.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Visual {
    pub tag: AssetTag,
    pub z: i32,
}

impl Visual {
    pub fn new(tag: AssetTag, z: i32) -> Self {
        Self { tag, z }
    }
}

// ============================================================================
// STAT COMPONENTS
// ============================================================================

/// Hit points. Held by the player, hostiles, and health pickups (where the
/// value is the amount transferred on pickup).
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub value: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { value: max, max }
    }

    pub fn is_dead(&self) -> bool {
        self.value <= 0.0
    }

    pub fn hit(&mut self, amount: f32) {
        self.value = (self.value - amount).max(0.0);
    }

    pub fn heal(&mut self, amount: f32) {
        self.value = (self.value + amount).min(self.max);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Energy store. On the player it is the survival resource drained by
/// movement; on pickups with `is_battery` it is the amount discharged into
/// the player, which may be negative (a drain). `never_changes` marks a
/// fixed supply that is exempt from the `[0, max]` clamp and is not zeroed
/// by `discharge`.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Power {
    pub value: f32,
    pub max: f32,
    pub is_battery: bool,
    pub never_changes: bool,
}

impl Power {
    pub fn new(max: f32) -> Self {
        Self {
            value: max,
            max,
            is_battery: false,
            never_changes: false,
        }
    }

    /// A consumable battery holding `charge` power.
    pub fn battery(charge: f32) -> Self {
        Self {
            value: charge,
            max: charge.max(0.0),
            is_battery: true,
            never_changes: false,
        }
    }

    /// A drain: discharges a negative amount, over and over.
    pub fn drain(loss: f32) -> Self {
        Self {
            value: -loss,
            max: 0.0,
            is_battery: true,
            never_changes: true,
        }
    }

    pub fn is_full(&self) -> bool {
        self.value >= self.max
    }

    pub fn is_empty(&self) -> bool {
        self.value <= 0.0
    }

    /// Pay `amount` if enough is stored; returns whether the payment
    /// happened. Fixed supplies always pay without depleting.
    pub fn spend(&mut self, amount: f32) -> bool {
        if self.never_changes {
            return true;
        }
        if amount > self.value {
            return false;
        }
        self.value -= amount;
        true
    }

    /// Add `amount` (which may be negative), clamped to `[0, max]`.
    pub fn charge(&mut self, amount: f32) {
        if self.never_changes {
            return;
        }
        self.value = (self.value + amount).clamp(0.0, self.max);
    }

    /// Give up the whole stored amount. Fixed supplies report their amount
    /// without losing it.
    pub fn discharge(&mut self) -> f32 {
        let amount = self.value;
        if !self.never_changes {
            self.value = 0.0;
        }
        amount
    }
}

impl Default for Power {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Movement weight; one step costs `weight * MOVE_POWER_FACTOR` power.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Mass {
    pub weight: f32,
}

impl Mass {
    pub fn new(weight: f32) -> Self {
        Self { weight }
    }

    pub fn move_cost(&self) -> f32 {
        self.weight * MOVE_POWER_FACTOR
    }
}

impl Default for Mass {
    fn default() -> Self {
        Self { weight: 100.0 }
    }
}

/// Ranged charges. On ammo pickups only `value` matters; on the player
/// `damage` is applied to everything on the shot's final node.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ammo {
    pub value: i32,
    pub damage: f32,
}

impl Ammo {
    pub fn new(value: i32, damage: f32) -> Self {
        Self { value, damage }
    }

    /// Rounds carried by a floor pickup.
    pub fn pickup(rounds: i32) -> Self {
        Self {
            value: rounds,
            damage: 0.0,
        }
    }

    pub fn has_rounds(&self) -> bool {
        self.value > 0
    }

    /// Empty this store and return what it held.
    pub fn take_all(&mut self) -> i32 {
        std::mem::take(&mut self.value)
    }
}

impl Default for Ammo {
    fn default() -> Self {
        Self {
            value: 0,
            damage: PLAYER_SHOT_DAMAGE,
        }
    }
}

/// Melee damage dealt on contact: by the player when walking into a hostile,
/// by a hostile when stepping onto the player's node.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BumpDamage {
    pub value: f32,
}

impl BumpDamage {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl Default for BumpDamage {
    fn default() -> Self {
        Self { value: 20.0 }
    }
}

/// Points awarded when this entity is killed.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreValue {
    pub points: u32,
}

impl ScoreValue {
    pub fn new(points: u32) -> Self {
        Self { points }
    }
}

// ============================================================================
// BEHAVIOR COMPONENTS
// ============================================================================

/// Declares a hostile's legal relative steps and whether it consults the
/// pathfinder before falling back to proximity scoring.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct MoveIntent {
    /// Relative offsets tried in this exact order; equal-distance ties keep
    /// the earliest candidate.
    pub candidate_offsets: Vec<(i32, i32)>,
    pub uses_pathfinding: bool,
}

impl MoveIntent {
    pub fn new(candidate_offsets: &[(i32, i32)], uses_pathfinding: bool) -> Self {
        Self {
            candidate_offsets: candidate_offsets.to_vec(),
            uses_pathfinding,
        }
    }
}

/// Action pacing for slow entities. Every turn costs `step_cost` from the
/// bucket whether or not the action is allowed; the action is allowed only
/// when the bucket is at least full-size beforehand, and an exhausted bucket
/// refills. With the default bucket of 2 and step cost of 1 this alternates
/// allow, deny, allow, deny: a slow hostile acts every other turn.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimiter {
    pub bucket_size: i32,
    pub step_cost: i32,
    pub bucket_left: i32,
}

impl RateLimiter {
    pub fn new(bucket_size: i32, step_cost: i32) -> Self {
        Self {
            bucket_size,
            step_cost,
            bucket_left: bucket_size,
        }
    }

    pub fn try_step(&mut self) -> bool {
        let allowed = self.bucket_left >= self.bucket_size;
        self.bucket_left -= self.step_cost;
        if self.bucket_left <= 0 {
            self.bucket_left = self.bucket_size;
        }
        allowed
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(2, 1)
    }
}

/// Marks an entity as collectible. Pickup rules set `consumed`; the cleanup
/// rule removes consumed entities at the end of the same rule pass.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PickupFlag {
    pub consumed: bool,
}

// ============================================================================
// PLAYER TEMPLATE
// ============================================================================

/// The player stats carried from one level into the next. Position and the
/// surrounding level are regenerated; these components survive.
#[derive(Debug, Clone)]
pub struct PlayerTemplate {
    pub health: Health,
    pub power: Power,
    pub mass: Mass,
    pub ammo: Ammo,
    pub bump: BumpDamage,
}

impl Default for PlayerTemplate {
    fn default() -> Self {
        Self {
            health: Health::default(),
            power: Power::default(),
            mass: Mass::default(),
            ammo: Ammo::default(),
            bump: BumpDamage::default(),
        }
    }
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for spawning the player.
#[derive(Bundle)]
pub struct PlayerBundle {
    pub marker: IsPlayer,
    pub position: GridPosition,
    pub health: Health,
    pub power: Power,
    pub mass: Mass,
    pub ammo: Ammo,
    pub bump: BumpDamage,
    pub occupies: OccupiesSpace,
    pub visual: Visual,
}

impl PlayerBundle {
    pub fn new(at: Coord, template: &PlayerTemplate) -> Self {
        Self {
            marker: IsPlayer,
            position: GridPosition::new(at),
            health: template.health,
            power: template.power,
            mass: template.mass,
            ammo: template.ammo,
            bump: template.bump,
            occupies: OccupiesSpace,
            visual: Visual::new(AssetTag::Player, Z_PLAYER),
        }
    }
}

/// Bundle for spawning a wall entity.
#[derive(Bundle)]
pub struct WallBundle {
    pub marker: IsWall,
    pub position: GridPosition,
    pub occupies: OccupiesSpace,
    pub visual: Visual,
}

impl WallBundle {
    pub fn new(at: Coord) -> Self {
        Self {
            marker: IsWall,
            position: GridPosition::new(at),
            occupies: OccupiesSpace,
            visual: Visual::new(AssetTag::Wall, Z_WALL),
        }
    }
}

/// Bundle for spawning the level exit.
#[derive(Bundle)]
pub struct ExitBundle {
    pub marker: IsExit,
    pub position: GridPosition,
    pub visual: Visual,
}

impl ExitBundle {
    pub fn new(at: Coord) -> Self {
        Self {
            marker: IsExit,
            position: GridPosition::new(at),
            visual: Visual::new(AssetTag::Exit, Z_FLOOR),
        }
    }
}

/// Bundle for spawning a battery or a drain.
#[derive(Bundle)]
pub struct BatteryBundle {
    pub position: GridPosition,
    pub power: Power,
    pub pickup: PickupFlag,
    pub visual: Visual,
}

impl BatteryBundle {
    pub fn new(at: Coord, charge: f32) -> Self {
        Self {
            position: GridPosition::new(at),
            power: Power::battery(charge),
            pickup: PickupFlag::default(),
            visual: Visual::new(AssetTag::Battery, Z_PICKUP),
        }
    }

    pub fn drain(at: Coord, loss: f32) -> Self {
        Self {
            position: GridPosition::new(at),
            power: Power::drain(loss),
            pickup: PickupFlag::default(),
            visual: Visual::new(AssetTag::Drain, Z_PICKUP),
        }
    }
}

/// Bundle for spawning an ammo pickup.
#[derive(Bundle)]
pub struct AmmoPackBundle {
    pub position: GridPosition,
    pub ammo: Ammo,
    pub pickup: PickupFlag,
    pub visual: Visual,
}

impl AmmoPackBundle {
    pub fn new(at: Coord, rounds: i32) -> Self {
        Self {
            position: GridPosition::new(at),
            ammo: Ammo::pickup(rounds),
            pickup: PickupFlag::default(),
            visual: Visual::new(AssetTag::AmmoPack, Z_PICKUP),
        }
    }
}

/// Bundle for spawning a health pickup.
#[derive(Bundle)]
pub struct HealthPackBundle {
    pub position: GridPosition,
    pub health: Health,
    pub pickup: PickupFlag,
    pub visual: Visual,
}

impl HealthPackBundle {
    pub fn new(at: Coord, amount: f32) -> Self {
        Self {
            position: GridPosition::new(at),
            health: Health::new(amount),
            pickup: PickupFlag::default(),
            visual: Visual::new(AssetTag::HealthPack, Z_PICKUP),
        }
    }
}

/// Bundle for spawning a hostile. Slow hostiles get their `RateLimiter`
/// inserted separately by the generator.
#[derive(Bundle)]
pub struct HostileBundle {
    pub position: GridPosition,
    pub health: Health,
    pub bump: BumpDamage,
    pub score: ScoreValue,
    pub intent: MoveIntent,
    pub occupies: OccupiesSpace,
    pub visual: Visual,
}

impl HostileBundle {
    pub fn new(
        at: Coord,
        tag: AssetTag,
        health: f32,
        bump: f32,
        points: u32,
        intent: MoveIntent,
    ) -> Self {
        Self {
            position: GridPosition::new(at),
            health: Health::new(health),
            bump: BumpDamage::new(bump),
            score: ScoreValue::new(points),
            intent,
            occupies: OccupiesSpace,
            visual: Visual::new(tag, Z_MOB),
        }
    }
}
