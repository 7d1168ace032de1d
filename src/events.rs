//! Renderer notification stream.
//!
//! Turn resolution is atomic; the presentation layer finds out what happened
//! from this queue and animates at its own pace. Nothing in the queue feeds
//! back into resolution, so a consumer may drop, delay, or replay it freely.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::{AssetTag, SimId};
use crate::grid::Coord;

/// One thing that happened during a turn, in occurrence order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RenderEvent {
    EntitySpawned {
        id: SimId,
        tag: AssetTag,
        node: Coord,
        z: i32,
    },
    EntityMoved {
        id: SimId,
        from: Coord,
        to: Coord,
    },
    EntityRemoved {
        id: SimId,
        should_fade_out: bool,
    },
    /// A move that was attempted and denied, or a melee lunge: animate a
    /// nudge toward `toward` and return.
    EntityBumped {
        id: SimId,
        toward: Coord,
    },
    DamageFlash {
        node: Coord,
        amount: f32,
    },
}

/// Accumulates render events for the current consumer to drain.
#[derive(Resource, Debug, Default)]
pub struct EventQueue {
    events: Vec<RenderEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: RenderEvent) {
        self.events.push(event);
    }

    /// Hand over everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<RenderEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
