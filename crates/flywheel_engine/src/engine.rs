//! Bundle installation and the update loop.
//!
//! Unit execution order equals installation order, and queries are
//! resolved freshly for each unit, so a unit always observes the
//! mutations made by units processed earlier in the same tick. There is
//! no per-tick isolation; single-pass pipelines (damage application
//! followed by cleanup, say) depend on exactly this.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use flywheel_event::Subscription;
use flywheel_system::{Bundle, Context, QueryResults, SystemUnit};

#[derive(Debug, Error)]
pub enum EngineError {
    /// A staged resource's producer failed during install. The bundle is
    /// left uninstalled; resources materialized before the failure remain
    /// in the registry.
    #[error("resource producer '{key}' failed: {source}")]
    ResourceProducer {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A unit in the active list, with the bus subscriptions created for it
/// at install time.
struct ActiveUnit {
    unit: SystemUnit,
    subscriptions: Vec<Subscription>,
}

/// Orchestrator: owns the store/registry/bus triple behind a [`Context`],
/// installs bundles, and drives the per-tick loop.
pub struct Engine {
    ctx: Context,
    units: Vec<ActiveUnit>,
    installed: HashSet<String>,
    tick: u64,
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ctx: Context::new(),
            units: Vec::new(),
            installed: HashSet::new(),
            tick: 0,
        }
    }

    /// The engine's handle bundle. Clone it to reach the store, registry,
    /// and bus from driver code.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Install a bundle: materialize its staged resources, then activate
    /// its units in append order.
    ///
    /// Installing an id that is already installed warns and returns
    /// unchanged. Awaits any suspending resource producers; this is the
    /// runtime's only suspension point.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceProducer`] when a staged producer fails; the
    /// bundle's units are not activated and its id is not marked
    /// installed.
    pub async fn install(&mut self, bundle: Bundle) -> Result<(), EngineError> {
        if self.installed.contains(bundle.id()) {
            warn!(bundle = %bundle.id(), "bundle already installed, ignoring");
            return Ok(());
        }

        let (id, units, resources) = bundle.into_parts();
        let resource_count = resources.len();
        let unit_count = units.len();

        for (key, staged) in resources {
            let value = staged
                .materialize()
                .await
                .map_err(|source| EngineError::ResourceProducer {
                    key: key.clone(),
                    source,
                })?;
            self.ctx.resources_mut().add(key, value);
        }

        for unit in units {
            self.activate(unit);
        }

        self.installed.insert(id.clone());
        info!(
            bundle = %id,
            units = unit_count,
            resources = resource_count,
            "bundle installed"
        );
        Ok(())
    }

    fn activate(&mut self, unit: SystemUnit) {
        if let Some(attach) = unit.on_attach() {
            attach(&self.ctx);
        }
        let mut subscriptions = Vec::new();
        for (event, handler) in unit.event_handlers() {
            let ctx = self.ctx.clone();
            let handler = handler.clone();
            let sub = self
                .ctx
                .events()
                .subscribe(event, move |payload| handler(&ctx, payload));
            subscriptions.push(sub);
        }
        debug!(unit = unit.label(), "unit activated");
        self.units.push(ActiveUnit {
            unit,
            subscriptions,
        });
    }

    /// Deactivate the first active unit with the given label.
    ///
    /// Invokes its detach callback, tears down the event-bus subscriptions
    /// created for it at install time, and drops it from the active list.
    /// Returns `false` when no unit matches.
    pub fn remove_unit(&mut self, label: &str) -> bool {
        let Some(pos) = self.units.iter().position(|a| a.unit.label() == label) else {
            return false;
        };
        let active = self.units.remove(pos);
        if let Some(detach) = active.unit.on_detach() {
            detach(&self.ctx);
        }
        for sub in &active.subscriptions {
            self.ctx.events().unsubscribe(sub);
        }
        info!(unit = label, "unit removed");
        true
    }

    /// Run one tick: iterate active units in registration order, resolve
    /// each unit's named queries against the current store state, and
    /// invoke its per-tick callback.
    ///
    /// Nothing is cached across ticks, and a query resolved mid-tick
    /// reflects every mutation made by units processed earlier in the same
    /// tick. Units with no per-tick callback are skipped here but still
    /// receive events through the bus.
    pub fn update(&mut self, dt: f64) {
        self.tick += 1;
        debug!(tick = self.tick, dt, units = self.units.len(), "tick");

        for active in &self.units {
            let unit = &active.unit;
            let Some(process) = unit.process() else {
                continue;
            };
            let mut results = QueryResults::new();
            {
                let store = self.ctx.store();
                for (name, spec) in unit.queries() {
                    results.insert(name.clone(), store.query(spec));
                }
            }
            process(&self.ctx, &results, dt);
        }
    }

    /// Number of active units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Whether a bundle id has been installed.
    #[must_use]
    pub fn is_installed(&self, bundle_id: &str) -> bool {
        self.installed.contains(bundle_id)
    }

    /// Number of `update` calls made so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use serde_json::json;

    use flywheel_store::QuerySpec;

    use super::*;

    fn score_bundle() -> Bundle {
        Bundle::new("scoring")
            .add_resource("score", json!(0))
            .add_unit(
                SystemUnit::builder("increment")
                    .process(|ctx, _results, _dt| {
                        let mut resources = ctx.resources_mut();
                        let score = resources.get_mut("score").unwrap();
                        *score = json!(score.as_i64().unwrap() + 1);
                    })
                    .build(),
            )
    }

    #[tokio::test]
    async fn test_score_accumulates_across_ticks() {
        let mut engine = Engine::new();
        engine.install(score_bundle()).await.unwrap();

        engine.update(1.0 / 60.0);
        engine.update(1.0 / 60.0);
        engine.update(1.0 / 60.0);

        assert_eq!(engine.context().resources().get("score").unwrap(), &json!(3));
    }

    #[tokio::test]
    async fn test_duplicate_bundle_id_is_noop() {
        let mut engine = Engine::new();
        engine.install(score_bundle()).await.unwrap();
        let units_before = engine.unit_count();
        let resources_before = engine.context().resources().len();

        engine.install(score_bundle()).await.unwrap();
        assert_eq!(engine.unit_count(), units_before);
        assert_eq!(engine.context().resources().len(), resources_before);
    }

    #[tokio::test]
    async fn test_later_unit_sees_earlier_units_mutations() {
        let mut engine = Engine::new();

        let writer = SystemUnit::builder("writer")
            .add_query("all", QuerySpec::new().with("position"))
            .process(|ctx, results, _dt| {
                let mut store = ctx.store_mut();
                for &e in results.get("all") {
                    store.add_component(e, "flagged", json!(true)).unwrap();
                }
            })
            .build();

        let observed = Rc::new(Cell::new(0usize));
        let sink = observed.clone();
        let reader = SystemUnit::builder("reader")
            .add_query("flagged", QuerySpec::new().with("flagged"))
            .process(move |_ctx, results, _dt| {
                sink.set(results.get("flagged").len());
            })
            .build();

        let bundle = Bundle::new("pipeline").add_unit(writer).add_unit(reader);
        engine.install(bundle).await.unwrap();

        let e = engine.context().store_mut().create_entity();
        engine
            .context()
            .store_mut()
            .add_component(e, "position", json!({"x": 0}))
            .unwrap();

        engine.update(0.016);
        assert_eq!(observed.get(), 1, "B must observe A's same-tick mutation");
    }

    #[tokio::test]
    async fn test_attach_runs_after_resources_materialize() {
        let mut engine = Engine::new();
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();

        let bundle = Bundle::new("world")
            .add_resource_with("bounds", || {
                Box::pin(async {
                    tokio::task::yield_now().await;
                    Ok(json!({"width": 320}))
                })
            })
            .add_unit(
                SystemUnit::builder("setup")
                    .on_attach(move |ctx| {
                        *sink.borrow_mut() = Some(ctx.resources().get("bounds").unwrap().clone());
                    })
                    .build(),
            );

        engine.install(bundle).await.unwrap();
        assert_eq!(*seen.borrow(), Some(json!({"width": 320})));
    }

    #[tokio::test]
    async fn test_failing_producer_aborts_install() {
        let mut engine = Engine::new();
        let bundle = Bundle::new("broken")
            .add_resource_with("surface", || {
                Box::pin(async { Err(anyhow::anyhow!("no display")) })
            })
            .add_unit(SystemUnit::builder("never").build());

        let result = engine.install(bundle).await;
        assert!(matches!(
            result,
            Err(EngineError::ResourceProducer { .. })
        ));
        assert!(!engine.is_installed("broken"));
        assert_eq!(engine.unit_count(), 0);
    }

    #[tokio::test]
    async fn test_event_handlers_forward_through_bus() {
        let mut engine = Engine::new();
        let seen: Rc<RefCell<Vec<serde_json::Value>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();

        let bundle = Bundle::new("input").add_unit(
            SystemUnit::builder("pointer")
                .on_event("pointer.down", move |_ctx, payload| {
                    sink.borrow_mut().push(payload.clone());
                })
                .build(),
        );
        engine.install(bundle).await.unwrap();

        engine
            .context()
            .publish("pointer.down", &json!({"x": 4, "y": 2}));
        assert_eq!(seen.borrow().as_slice(), &[json!({"x": 4, "y": 2})]);
    }

    #[tokio::test]
    async fn test_remove_unit_detaches_and_unsubscribes() {
        let mut engine = Engine::new();
        let detached = Rc::new(Cell::new(false));
        let events_seen = Rc::new(Cell::new(0u32));

        let on_detach = detached.clone();
        let sink = events_seen.clone();
        let bundle = Bundle::new("combat").add_unit(
            SystemUnit::builder("damage")
                .on_detach(move |_ctx| on_detach.set(true))
                .on_event("hit", move |_ctx, _payload| sink.set(sink.get() + 1))
                .build(),
        );
        engine.install(bundle).await.unwrap();

        engine.context().publish("hit", &json!({}));
        assert_eq!(events_seen.get(), 1);

        assert!(engine.remove_unit("damage"));
        assert!(detached.get());
        assert_eq!(engine.unit_count(), 0);

        // Subscriptions created at install time are gone with the unit.
        engine.context().publish("hit", &json!({}));
        assert_eq!(events_seen.get(), 1);

        assert!(!engine.remove_unit("damage"));
    }

    #[tokio::test]
    async fn test_merged_bundle_installs_units_in_order() {
        let mut engine = Engine::new();
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let make_unit = |label: &'static str, log: Rc<RefCell<Vec<&'static str>>>| {
            SystemUnit::builder(label)
                .process(move |_ctx, _results, _dt| log.borrow_mut().push(label))
                .build()
        };

        let left = Bundle::new("a").add_unit(make_unit("first", order.clone()));
        let right = Bundle::new("b").add_unit(make_unit("second", order.clone()));
        engine.install(left.merge(right)).await.unwrap();
        assert!(engine.is_installed("a+b"));

        engine.update(0.016);
        assert_eq!(order.borrow().as_slice(), &["first", "second"]);
    }

    #[tokio::test]
    async fn test_units_without_process_are_skipped_by_loop() {
        let mut engine = Engine::new();
        let bundle = Bundle::new("passive")
            .add_unit(SystemUnit::builder("listener").on_event("ping", |_, _| {}).build());
        engine.install(bundle).await.unwrap();

        // No panic, no callback to run; the unit only listens.
        engine.update(0.016);
        assert_eq!(engine.unit_count(), 1);
        assert_eq!(engine.tick_count(), 1);
    }
}
