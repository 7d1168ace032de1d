//! Priority rule engine.
//!
//! After the player acts, each rule in descending salience sweeps the player's
//! node for co-located entities it cares about and applies its effect. Ties
//! between pickups on one node resolve purely by salience, so a turn that
//! ends on a crowded node always plays out in the same order: health, then
//! ammo, then power, then cleanup.

use bevy_ecs::prelude::*;
use tracing::debug;

use crate::components::{Ammo, GridPosition, Health, PickupFlag, Power};
use crate::grid::GridGraph;
use crate::store;

// ============================================================================
// RULE TRAIT
// ============================================================================

/// One co-location rule. `matches` screens a single candidate entity on the
/// player's node; `apply` then receives every candidate that passed.
pub trait Rule: Send + Sync {
    /// Stable name, used for tracing.
    fn name(&self) -> &'static str;
    /// Higher salience fires first.
    fn salience(&self) -> i32;
    fn matches(&self, world: &World, candidate: Entity) -> bool;
    fn apply(&self, world: &mut World, player: Entity, matched: &[Entity]);
}

/// An ordered collection of rules. Order is fixed at construction: descending
/// salience, and declaration order within equal salience.
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new(mut rules: Vec<Box<dyn Rule>>) -> Self {
        rules.sort_by_key(|rule| std::cmp::Reverse(rule.salience()));
        Self { rules }
    }

    /// The standard pickup pipeline.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(HealthTransfer),
            Box::new(AmmoTransfer),
            Box::new(BatteryCharge),
            Box::new(ConsumableCleanup),
        ])
    }

    /// Run every rule once against the player's current node.
    pub fn run(&self, world: &mut World) {
        let player = store::player(world);
        for rule in &self.rules {
            let node = match world.get::<GridPosition>(player) {
                Some(position) => position.node,
                None => return,
            };
            let matched: Vec<Entity> = world
                .resource::<GridGraph>()
                .occupants(node)
                .iter()
                .copied()
                .filter(|&candidate| candidate != player)
                .filter(|&candidate| rule.matches(world, candidate))
                .collect();
            if matched.is_empty() {
                continue;
            }
            debug!(rule = rule.name(), matched = matched.len(), "rule fired");
            rule.apply(world, player, &matched);
        }
    }
}

// ============================================================================
// STANDARD RULES
// ============================================================================

/// Health packs heal the player up to their cap, then are marked consumed.
struct HealthTransfer;

impl Rule for HealthTransfer {
    fn name(&self) -> &'static str {
        "health_transfer"
    }

    fn salience(&self) -> i32 {
        1200
    }

    fn matches(&self, world: &World, candidate: Entity) -> bool {
        world.get::<PickupFlag>(candidate).is_some()
            && world.get::<Health>(candidate).is_some_and(|h| h.value > 0.0)
    }

    fn apply(&self, world: &mut World, player: Entity, matched: &[Entity]) {
        for &pack in matched {
            let amount = match world.get::<Health>(pack) {
                Some(health) => health.value,
                None => continue,
            };
            if let Some(mut health) = world.get_mut::<Health>(player) {
                health.heal(amount);
            }
            if let Some(mut flag) = world.get_mut::<PickupFlag>(pack) {
                flag.consumed = true;
            }
        }
    }
}

/// Ammo packs empty their rounds into the player's magazine.
struct AmmoTransfer;

impl Rule for AmmoTransfer {
    fn name(&self) -> &'static str {
        "ammo_transfer"
    }

    fn salience(&self) -> i32 {
        1100
    }

    fn matches(&self, world: &World, candidate: Entity) -> bool {
        world.get::<PickupFlag>(candidate).is_some()
            && world.get::<Ammo>(candidate).is_some_and(|a| a.has_rounds())
    }

    fn apply(&self, world: &mut World, player: Entity, matched: &[Entity]) {
        for &pack in matched {
            let rounds = match world.get_mut::<Ammo>(pack) {
                Some(mut ammo) => ammo.take_all(),
                None => continue,
            };
            if let Some(mut ammo) = world.get_mut::<Ammo>(player) {
                ammo.value += rounds;
            }
            if let Some(mut flag) = world.get_mut::<PickupFlag>(pack) {
                flag.consumed = true;
            }
        }
    }
}

/// Batteries and drains. A drain always discharges into the player. A
/// charging battery is left on the floor untouched while the player is
/// already full, so it can be banked for a later pass.
struct BatteryCharge;

impl Rule for BatteryCharge {
    fn name(&self) -> &'static str {
        "battery_charge"
    }

    fn salience(&self) -> i32 {
        1000
    }

    fn matches(&self, world: &World, candidate: Entity) -> bool {
        world.get::<PickupFlag>(candidate).is_some()
            && world.get::<Power>(candidate).is_some_and(|p| p.is_battery)
    }

    fn apply(&self, world: &mut World, player: Entity, matched: &[Entity]) {
        for &battery in matched {
            let charge = match world.get::<Power>(battery) {
                Some(power) => power.value,
                None => continue,
            };
            if charge > 0.0 {
                let full = world
                    .get::<Power>(player)
                    .is_some_and(|power| power.is_full());
                if full {
                    continue;
                }
            }
            let transferred = match world.get_mut::<Power>(battery) {
                Some(mut power) => power.discharge(),
                None => continue,
            };
            if let Some(mut power) = world.get_mut::<Power>(player) {
                power.charge(transferred);
            }
            if let Some(mut flag) = world.get_mut::<PickupFlag>(battery) {
                flag.consumed = true;
            }
        }
    }
}

/// Sweeps consumed pickups out of the world after the transfer rules ran.
struct ConsumableCleanup;

impl Rule for ConsumableCleanup {
    fn name(&self) -> &'static str {
        "consumable_cleanup"
    }

    fn salience(&self) -> i32 {
        999
    }

    fn matches(&self, world: &World, candidate: Entity) -> bool {
        world
            .get::<PickupFlag>(candidate)
            .is_some_and(|flag| flag.consumed)
    }

    fn apply(&self, world: &mut World, _player: Entity, matched: &[Entity]) {
        for &spent in matched {
            store::deregister(world, spent, true);
        }
    }
}
