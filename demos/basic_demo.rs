//! Basic demonstration of the POWER simulation core.
//!
//! Drives a whole campaign headlessly: a tiny scene model is maintained
//! purely from the render notification stream, exactly the way a real
//! renderer would, and a greedy walker chases the exit each level.
//!
//! Run with: cargo run --example basic_demo

use std::collections::HashMap;

use pwr_sim::{
    Action, AssetTag, Coord, Direction, Game, GameConfig, RenderEvent, SimId, TurnOutcome,
};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== POWER - Simulation Demo ===\n");

    let mut game = Game::new(GameConfig::default(), 7).unwrap();
    let mut scene: HashMap<SimId, (AssetTag, Coord)> = HashMap::new();
    apply(&mut scene, game.drain_events());

    println!("Initial state:");
    print_status(&mut game);

    for input in 0..400 {
        let Some(player) = node_of(&scene, AssetTag::Player) else {
            break;
        };
        let Some(exit) = node_of(&scene, AssetTag::Exit) else {
            break;
        };

        // Walk greedily toward the exit, settling for the least-bad legal
        // direction when the best one is walled off.
        let mut outcome = TurnOutcome::Bumped;
        for direction in directions_toward(player, exit) {
            outcome = game.handle(Action::Move(direction)).unwrap();
            if outcome != TurnOutcome::Bumped {
                break;
            }
        }
        apply(&mut scene, game.drain_events());

        if (input + 1) % 10 == 0 {
            println!("--- After {} inputs ---", input + 1);
            print_status(&mut game);
        }

        match outcome {
            TurnOutcome::LevelComplete => {
                println!("\nLevel {} cleared!", game.difficulty());
                print_status(&mut game);
                let advanced = game.handle(Action::Accept).unwrap();
                if let TurnOutcome::Won { score } = advanced {
                    println!("\nCampaign won with score {score}!");
                    return;
                }
                // A level change is a fresh scene: forget the old one and
                // rebuild from the new spawn burst.
                scene.clear();
                apply(&mut scene, game.drain_events());
                println!("Entering level {}...\n", game.difficulty());
            }
            TurnOutcome::GameOver { end, score } => {
                println!("\nGame over ({end:?}) with score {score}.");
                break;
            }
            _ => {}
        }
    }

    println!("\n=== Final Save Record (JSON) ===\n");
    println!("{}", game.to_save().unwrap());
}

/// Fold a batch of notifications into the scene model.
fn apply(scene: &mut HashMap<SimId, (AssetTag, Coord)>, events: Vec<RenderEvent>) {
    for event in events {
        match event {
            RenderEvent::EntitySpawned { id, tag, node, .. } => {
                scene.insert(id, (tag, node));
            }
            RenderEvent::EntityMoved { id, to, .. } => {
                if let Some(entry) = scene.get_mut(&id) {
                    entry.1 = to;
                }
            }
            RenderEvent::EntityRemoved { id, .. } => {
                scene.remove(&id);
            }
            RenderEvent::EntityBumped { .. } | RenderEvent::DamageFlash { .. } => {}
        }
    }
}

fn node_of(scene: &HashMap<SimId, (AssetTag, Coord)>, tag: AssetTag) -> Option<Coord> {
    scene
        .values()
        .find(|(entry_tag, _)| *entry_tag == tag)
        .map(|&(_, node)| node)
}

/// All four directions, best first by how close the step lands to `to`.
fn directions_toward(from: Coord, to: Coord) -> [Direction; 4] {
    let mut directions = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];
    directions.sort_by_key(|direction| {
        let (dx, dy) = direction.offset();
        from.offset(dx, dy).manhattan(to)
    });
    directions
}

fn print_status(game: &mut Game) {
    let status = game.status();
    println!(
        "  level={} score={} hp={:.0}/{:.0} power={:.1}/{:.1} ammo={}",
        status.difficulty,
        status.score,
        status.health,
        status.max_health,
        status.power,
        status.max_power,
        status.ammo
    );
}
