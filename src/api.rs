//! Session facade.
//!
//! `Game` owns the world, the rule set, the random stream, and the campaign
//! state, and exposes the few calls a host needs: feed inputs, drain render
//! notifications, read status, save and load. Hosts never touch the ECS
//! directly.

use bevy_ecs::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::components::{Ammo, BumpDamage, Health, Mass, PlayerTemplate, Power};
use crate::error::{Result, SimError};
use crate::events::{EventQueue, RenderEvent};
use crate::grid::{Coord, GridGraph};
use crate::los;
use crate::mapgen;
use crate::rules::RuleSet;
use crate::save::{self, SaveData};
use crate::store::{self, NextSimId};
use crate::turn::{self, Action, GameConfig, GameEnd, Score, TurnPhase, TurnVerdict};

/// What one call to [`Game::handle`] amounted to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnOutcome {
    /// A turn resolved and play continues.
    Continue,
    /// The action was illegal; feedback was queued but nothing changed.
    Bumped,
    /// The input does not apply right now and no turn ran.
    Ignored,
    /// The player stands on the exit. `Accept` starts the next level.
    LevelComplete,
    /// The campaign is won.
    Won { score: u32 },
    /// The run is lost.
    GameOver { end: GameEnd, score: u32 },
}

/// Player-facing numbers for a status display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameStatus {
    pub difficulty: u32,
    pub score: u32,
    pub health: f32,
    pub max_health: f32,
    pub power: f32,
    pub max_power: f32,
    pub ammo: i32,
}

/// One running campaign.
pub struct Game {
    world: World,
    rules: RuleSet,
    rng: ChaCha8Rng,
    difficulty: u32,
    phase: TurnPhase,
    awaiting_advance: bool,
    resolving: bool,
}

impl Game {
    /// Start a fresh campaign at difficulty 1.
    pub fn new(config: GameConfig, seed: u64) -> Result<Self> {
        if config.width <= 0 || config.height <= 0 {
            return Err(SimError::MapGeneration {
                width: config.width,
                height: config.height,
                difficulty: 1,
                attempts: 0,
            });
        }
        let mut world = build_world(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        mapgen::generate(&mut world, 1, &PlayerTemplate::default(), &mut rng)?;
        info!(seed, "campaign started");
        Ok(Self {
            world,
            rules: RuleSet::standard(),
            rng,
            difficulty: 1,
            phase: TurnPhase::AwaitingInput,
            awaiting_advance: false,
            resolving: false,
        })
    }

    /// Resume a saved campaign. Grid dimensions ride the record; the other
    /// tunables come from [`GameConfig::default`].
    pub fn from_save(json: &str, seed: u64) -> Result<Self> {
        let data = SaveData::from_json(json)?;
        if data.width <= 0 || data.height <= 0 {
            return Err(SimError::CorruptSave(
                "non-positive grid dimensions".into(),
            ));
        }
        let config = GameConfig {
            width: data.width,
            height: data.height,
            ..GameConfig::default()
        };
        let mut world = build_world(&config);
        save::restore(&mut world, &data)?;
        Ok(Self {
            world,
            rules: RuleSet::standard(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            difficulty: data.difficulty,
            phase: TurnPhase::AwaitingInput,
            awaiting_advance: false,
            resolving: false,
        })
    }

    /// Serialize the running campaign.
    pub fn to_save(&mut self) -> Result<String> {
        save::capture(&mut self.world, self.difficulty).to_json()
    }

    /// Feed one input. Exactly one turn resolves for a legal in-level action;
    /// everything else is feedback-only.
    pub fn handle(&mut self, action: Action) -> Result<TurnOutcome> {
        if let TurnPhase::Terminated(_) = self.phase {
            return Ok(TurnOutcome::Ignored);
        }
        if self.awaiting_advance {
            return match action {
                Action::Accept => self.advance_level(),
                _ => Ok(TurnOutcome::Ignored),
            };
        }
        if matches!(action, Action::Accept) {
            return Ok(TurnOutcome::Ignored);
        }

        self.resolving = true;
        let verdict = turn::execute(&mut self.world, &self.rules, action, &mut self.phase);
        self.resolving = false;

        Ok(match verdict {
            TurnVerdict::Rejected => TurnOutcome::Bumped,
            TurnVerdict::Continued => TurnOutcome::Continue,
            TurnVerdict::LevelCleared => {
                self.awaiting_advance = true;
                TurnOutcome::LevelComplete
            }
            TurnVerdict::Lost(end) => TurnOutcome::GameOver {
                end,
                score: self.score(),
            },
        })
    }

    /// Generate the next level, carrying the player's live stats forward.
    /// Past the win threshold the campaign ends instead.
    fn advance_level(&mut self) -> Result<TurnOutcome> {
        let next = self.difficulty + 1;
        let win_difficulty = self.world.resource::<GameConfig>().win_difficulty;
        if next > win_difficulty {
            let score = self.score();
            self.phase = TurnPhase::Terminated(GameEnd::Victory);
            self.awaiting_advance = false;
            info!(score, "campaign won");
            return Ok(TurnOutcome::Won { score });
        }
        let template = self.capture_template();
        mapgen::generate(&mut self.world, next, &template, &mut self.rng)?;
        self.difficulty = next;
        self.awaiting_advance = false;
        info!(difficulty = next, "advanced to next level");
        Ok(TurnOutcome::Continue)
    }

    fn capture_template(&mut self) -> PlayerTemplate {
        let player = store::player(&mut self.world);
        let world = &self.world;
        PlayerTemplate {
            health: world
                .get::<Health>(player)
                .copied()
                .expect("player carries Health"),
            power: world
                .get::<Power>(player)
                .copied()
                .expect("player carries Power"),
            mass: world
                .get::<Mass>(player)
                .copied()
                .expect("player carries Mass"),
            ammo: world
                .get::<Ammo>(player)
                .copied()
                .expect("player carries Ammo"),
            bump: world
                .get::<BumpDamage>(player)
                .copied()
                .expect("player carries BumpDamage"),
        }
    }

    /// Pull everything queued for the renderer since the last call.
    pub fn drain_events(&mut self) -> Vec<RenderEvent> {
        self.world.resource_mut::<EventQueue>().drain()
    }

    /// Current player-facing numbers.
    pub fn status(&mut self) -> GameStatus {
        let player = store::player(&mut self.world);
        let world = &self.world;
        let health = world
            .get::<Health>(player)
            .copied()
            .expect("player carries Health");
        let power = world
            .get::<Power>(player)
            .copied()
            .expect("player carries Power");
        let ammo = world.get::<Ammo>(player).map_or(0, |a| a.value);
        GameStatus {
            difficulty: self.difficulty,
            score: self.score(),
            health: health.value,
            max_health: health.max,
            power: power.value,
            max_power: power.max,
            ammo,
        }
    }

    /// The nodes a shot toward `target` would cross, for an aiming preview.
    /// Firing is still [`Action::Shoot`]; this has no side effects.
    pub fn shot_path(&mut self, target: Coord) -> Vec<Coord> {
        let from = store::player_node(&mut self.world);
        let world = &self.world;
        let grid = world.resource::<GridGraph>();
        los::shot_path(world, grid, from, target)
    }

    pub fn score(&self) -> u32 {
        self.world.resource::<Score>().0
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// True only while a turn is being resolved inside [`Game::handle`].
    pub fn is_resolving(&self) -> bool {
        self.resolving
    }

    /// True after the level is cleared, until `Accept` is handled.
    pub fn awaiting_advance(&self) -> bool {
        self.awaiting_advance
    }
}

fn build_world(config: &GameConfig) -> World {
    let mut world = World::new();
    world.insert_resource(GridGraph::new(config.width, config.height));
    world.insert_resource(EventQueue::default());
    world.insert_resource(NextSimId::default());
    world.insert_resource(Score::default());
    world.insert_resource(config.clone());
    world
}
