//! Behavior-unit descriptors.
//!
//! A [`SystemUnit`] is pure data: a label, named query specs, an optional
//! per-tick callback, optional attach/detach lifecycle callbacks, and an
//! ordered event-handler map. Units are finalized through
//! [`SystemBuilder`] and immutable afterwards. The engine resolves each
//! unit's queries freshly every tick and invokes the callbacks.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use flywheel_store::{EntityId, QuerySpec};

use crate::context::Context;

/// Per-tick callback: resolved query results, elapsed seconds, handles.
pub type ProcessFn = Rc<dyn Fn(&Context, &QueryResults, f64)>;
/// Attach/detach lifecycle callback.
pub type LifecycleFn = Rc<dyn Fn(&Context)>;
/// Event handler: payload plus handles.
pub type EventHandlerFn = Rc<dyn Fn(&Context, &Value)>;

/// Query results resolved for one unit on one tick.
///
/// Entity id lists alias the live store: mutating an entity through the
/// context is immediately visible to every later observer in the same
/// tick.
#[derive(Debug, Default)]
pub struct QueryResults {
    results: HashMap<String, Vec<EntityId>>,
}

impl QueryResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the entities matched by a named query.
    pub fn insert(&mut self, name: impl Into<String>, entities: Vec<EntityId>) {
        self.results.insert(name.into(), entities);
    }

    /// Entities matched by the named query. Empty for unknown names.
    #[must_use]
    pub fn get(&self, name: &str) -> &[EntityId] {
        self.results.get(name).map_or(&[], Vec::as_slice)
    }

    /// Number of named queries resolved.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// An immutable behavior-unit descriptor.
pub struct SystemUnit {
    label: String,
    queries: Vec<(String, QuerySpec)>,
    process: Option<ProcessFn>,
    on_attach: Option<LifecycleFn>,
    on_detach: Option<LifecycleFn>,
    event_handlers: Vec<(String, EventHandlerFn)>,
}

impl SystemUnit {
    /// Start building a unit with the given label.
    #[must_use]
    pub fn builder(label: impl Into<String>) -> SystemBuilder {
        SystemBuilder::new(label)
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The named query specs, in declaration order.
    #[must_use]
    pub fn queries(&self) -> &[(String, QuerySpec)] {
        &self.queries
    }

    #[must_use]
    pub fn process(&self) -> Option<&ProcessFn> {
        self.process.as_ref()
    }

    #[must_use]
    pub fn on_attach(&self) -> Option<&LifecycleFn> {
        self.on_attach.as_ref()
    }

    #[must_use]
    pub fn on_detach(&self) -> Option<&LifecycleFn> {
        self.on_detach.as_ref()
    }

    /// The event-handler map, in declaration order.
    #[must_use]
    pub fn event_handlers(&self) -> &[(String, EventHandlerFn)] {
        &self.event_handlers
    }
}

/// Builder for [`SystemUnit`].
pub struct SystemBuilder {
    label: String,
    queries: Vec<(String, QuerySpec)>,
    process: Option<ProcessFn>,
    on_attach: Option<LifecycleFn>,
    on_detach: Option<LifecycleFn>,
    event_handlers: Vec<(String, EventHandlerFn)>,
}

impl SystemBuilder {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            queries: Vec::new(),
            process: None,
            on_attach: None,
            on_detach: None,
            event_handlers: Vec::new(),
        }
    }

    /// Declare a named query the engine resolves for this unit every tick.
    #[must_use]
    pub fn add_query(mut self, name: impl Into<String>, spec: QuerySpec) -> Self {
        self.queries.push((name.into(), spec));
        self
    }

    /// Set the per-tick callback.
    #[must_use]
    pub fn process(mut self, f: impl Fn(&Context, &QueryResults, f64) + 'static) -> Self {
        self.process = Some(Rc::new(f));
        self
    }

    /// Set the callback invoked when the unit is installed.
    #[must_use]
    pub fn on_attach(mut self, f: impl Fn(&Context) + 'static) -> Self {
        self.on_attach = Some(Rc::new(f));
        self
    }

    /// Set the callback invoked when the unit is removed.
    #[must_use]
    pub fn on_detach(mut self, f: impl Fn(&Context) + 'static) -> Self {
        self.on_detach = Some(Rc::new(f));
        self
    }

    /// Register an event handler subscribed on the unit's behalf at
    /// install time.
    #[must_use]
    pub fn on_event(mut self, event: impl Into<String>, f: impl Fn(&Context, &Value) + 'static) -> Self {
        self.event_handlers.push((event.into(), Rc::new(f)));
        self
    }

    /// Finalize into an immutable unit record.
    #[must_use]
    pub fn build(self) -> SystemUnit {
        SystemUnit {
            label: self.label,
            queries: self.queries,
            process: self.process,
            on_attach: self.on_attach,
            on_detach: self.on_detach,
            event_handlers: self.event_handlers,
        }
    }
}
