//! Headless movement demo.
//!
//! Spawns a few ships, registers movement and boundary systems, and drives
//! the engine at a fixed 60 Hz step for two simulated seconds.
//!
//! Run with: `RUST_LOG=loom_ecs=debug cargo run -p loom-ecs --example movement`

use loom_ecs::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f64,
    y: f64,
}

impl TypedComponent for Position {
    const TYPE_NAME: &'static str = "Position";
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity {
    dx: f64,
    dy: f64,
}

impl TypedComponent for Velocity {
    const TYPE_NAME: &'static str = "Velocity";
}

const ARENA_WIDTH: f64 = 10.0;
const FIXED_DT: f64 = 1.0 / 60.0;

fn movement(dt: f64, engine: &mut Engine) {
    for id in engine.ids_with_all(&["Position", "Velocity"]) {
        let Some(mut ship) = engine.entity_mut(id) else {
            continue;
        };
        let Some(vel) = ship.get::<Velocity>().cloned() else {
            continue;
        };
        if let Some(pos) = ship.get_mut::<Position>() {
            pos.x += vel.dx * dt;
            pos.y += vel.dy * dt;
        }
    }
}

/// Ships leaving the arena lose their velocity and are tagged "parked".
fn boundary(_dt: f64, engine: &mut Engine) {
    for id in engine.ids_with_all(&["Position", "Velocity"]) {
        let Some(mut ship) = engine.entity_mut(id) else {
            continue;
        };
        let outside = ship.get::<Position>().is_some_and(|p| p.x.abs() > ARENA_WIDTH);
        if outside {
            ship.remove_component("Velocity");
            ship.add_tag("parked");
            info!(ship = ship.name(), "ship parked");
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut engine = Engine::with_config(EngineConfig {
        verify_indices_each_frame: true,
        ..Default::default()
    });

    for (name, dx) in [("scout", 8.0), ("freighter", 2.0), ("station", 0.0)] {
        let mut ship = engine.create_entity(name);
        ship.add_component(Position { x: 0.0, y: 0.0 });
        if dx != 0.0 {
            ship.add_component(Velocity { dx, dy: 0.0 });
        }
        engine.add_entity(ship);
    }

    engine.add_system("movement", movement);
    engine.add_system("boundary", boundary);

    for _ in 0..120 {
        engine.update(FIXED_DT);
    }

    for ship in engine.entities_for_component("Position") {
        info!(
            ship = ship.name(),
            position = ?ship.get::<Position>(),
            moving = ship.contains_component("Velocity"),
            "final state"
        );
    }
    let parked: Vec<&str> = engine
        .entities_by_tag("parked")
        .into_iter()
        .map(|e| e.name())
        .collect();
    info!(?parked, frames = engine.frame_count(), stats = ?engine.index_stats(), "done");
}
