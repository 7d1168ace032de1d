//! POWER - Simulation Core
//!
//! A deterministic, turn-stepped ECS simulation for a grid survival game.
//! Uses `bevy_ecs` for the entity-component-system architecture; rendering,
//! input, and animation live in the host, driven by the notification stream.

pub mod api;
pub mod components;
pub mod error;
pub mod events;
pub mod grid;
pub mod los;
pub mod mapgen;
pub mod planner;
pub mod rules;
pub mod save;
pub mod store;
pub mod turn;

pub use api::{Game, GameStatus, TurnOutcome};
pub use components::*;
pub use error::{Result, SimError};
pub use events::RenderEvent;
pub use grid::{Coord, GridGraph};
pub use turn::{Action, Direction, GameConfig, GameEnd, TurnPhase};
