//! Patrol demo — drives the flywheel runtime from a fixed-timestep loop.
//!
//! Two independently authored bundles are merged and installed: `world`
//! stages the score and arena-bounds resources and seeds the patrolling
//! entities; `rules` contributes movement, boundary-bounce, and a purely
//! event-driven scoring unit that counts turns. The driver owns the tick
//! loop; the engine itself has no timer.

use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flywheel_engine::Engine;
use flywheel_store::QuerySpec;
use flywheel_system::{Bundle, SystemUnit};

/// Configuration for the driver loop.
#[derive(Debug, Clone)]
struct TickConfig {
    /// Target ticks per second.
    tick_rate: f64,
    /// Number of ticks to run.
    max_ticks: u64,
}

fn world_bundle() -> Bundle {
    Bundle::new("world")
        .add_resource("score", json!(0))
        .add_resource_with("bounds", || {
            // Stands in for loading arena data from disk; install awaits it.
            Box::pin(async {
                tokio::task::yield_now().await;
                Ok(json!({"min": 0.0, "max": 24.0}))
            })
        })
        .add_unit(
            SystemUnit::builder("seed")
                .on_attach(|ctx| {
                    let mut store = ctx.store_mut();
                    for (x, vx) in [(2.0, 6.0), (8.0, -4.0), (20.0, 5.0)] {
                        let e = store.create_entity();
                        store.add_component(e, "position", json!({"x": x})).unwrap();
                        store.add_component(e, "velocity", json!({"x": vx})).unwrap();
                        store.add_component(e, "patrol", json!(null)).unwrap();
                    }
                    let rock = store.create_entity();
                    store
                        .add_component(rock, "position", json!({"x": 12.0}))
                        .unwrap();
                    store.add_component(rock, "obstacle", json!(null)).unwrap();
                })
                .build(),
        )
}

fn rules_bundle() -> Bundle {
    let movement = SystemUnit::builder("movement")
        .add_query("mobiles", QuerySpec::new().with("position").with("velocity"))
        .process(|ctx, results, dt| {
            let mut store = ctx.store_mut();
            for &e in results.get("mobiles") {
                let vx = store.get_component(e, "velocity").unwrap().unwrap()["x"]
                    .as_f64()
                    .unwrap();
                let position = store.get_component_mut(e, "position").unwrap().unwrap();
                let x = position["x"].as_f64().unwrap();
                position["x"] = json!(x + vx * dt);
            }
        })
        .build();

    let bounce = SystemUnit::builder("bounce")
        .add_query("mobiles", QuerySpec::new().with("position").with("velocity"))
        .process(|ctx, results, _dt| {
            let bounds = ctx.resources().get("bounds").unwrap().clone();
            let (min, max) = (
                bounds["min"].as_f64().unwrap(),
                bounds["max"].as_f64().unwrap(),
            );
            let mut turned = Vec::new();
            {
                let mut store = ctx.store_mut();
                for &e in results.get("mobiles") {
                    let x = store.get_component(e, "position").unwrap().unwrap()["x"]
                        .as_f64()
                        .unwrap();
                    if x < min || x > max {
                        let position = store.get_component_mut(e, "position").unwrap().unwrap();
                        position["x"] = json!(x.clamp(min, max));
                        let velocity = store.get_component_mut(e, "velocity").unwrap().unwrap();
                        let vx = velocity["x"].as_f64().unwrap();
                        velocity["x"] = json!(-vx);
                        turned.push(e);
                    }
                }
            }
            // Store borrow released; handlers may take their own.
            for e in turned {
                ctx.publish("patrol.turned", &json!({"entity": e.id()}));
            }
        })
        .build();

    let scoring = SystemUnit::builder("scoring")
        .on_event("patrol.turned", |ctx, payload| {
            let mut resources = ctx.resources_mut();
            let score = resources.get_mut("score").unwrap();
            *score = json!(score.as_i64().unwrap() + 1);
            info!(entity = payload["entity"].as_u64().unwrap(), "patrol turned");
        })
        .build();

    Bundle::new("rules")
        .add_unit(movement)
        .add_unit(bounce)
        .add_unit(scoring)
}

fn run(engine: &mut Engine, config: &TickConfig) {
    let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate);
    let dt = tick_duration.as_secs_f64();

    info!(
        tick_rate = config.tick_rate,
        max_ticks = config.max_ticks,
        "starting driver loop"
    );

    for _ in 0..config.max_ticks {
        let start = Instant::now();
        engine.update(dt);

        let elapsed = start.elapsed();
        if elapsed < tick_duration {
            std::thread::sleep(tick_duration - elapsed);
        } else {
            warn!(
                tick = engine.tick_count(),
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = tick_duration.as_millis() as u64,
                "tick exceeded time budget"
            );
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("patrol=info".parse()?))
        .init();

    let mut engine = Engine::new();

    // A stand-in for the presentation layer: it learns about patrol
    // lifecycles only through the store's change hooks.
    engine
        .context()
        .store_mut()
        .on_component_added("patrol", |id, _value| {
            info!(entity = %id, "patrol sighted");
        });

    engine.install(world_bundle().merge(rules_bundle())).await?;

    let config = TickConfig {
        tick_rate: 120.0,
        max_ticks: 240,
    };
    run(&mut engine, &config);

    // Halfway teardown example: retire the bounce rules, let the rest run.
    engine.remove_unit("bounce");
    run(&mut engine, &config);

    let score = engine.context().resources().get("score")?.clone();
    info!(%score, ticks = engine.tick_count(), "driver loop complete");
    Ok(())
}
