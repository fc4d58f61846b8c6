//! The shared handle bundle passed to every unit and handler invocation.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use serde_json::Value;

use flywheel_event::EventBus;
use flywheel_resource::ResourceRegistry;
use flywheel_store::EntityStore;

/// Handles to the entity store, resource registry, and event bus.
///
/// Cheap to clone; all clones share the same underlying state. Store and
/// registry access goes through `RefCell` borrows: take a borrow, do the
/// mutation, and release it before publishing events or returning to the
/// engine. Holding a borrow across a publish panics, because a handler on
/// the other side may need its own borrow.
#[derive(Clone)]
pub struct Context {
    store: Rc<RefCell<EntityStore>>,
    resources: Rc<RefCell<ResourceRegistry>>,
    events: Rc<EventBus>,
}

impl Context {
    /// Create a context with a fresh store, registry, and bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Rc::new(RefCell::new(EntityStore::new())),
            resources: Rc::new(RefCell::new(ResourceRegistry::new())),
            events: Rc::new(EventBus::new()),
        }
    }

    /// Shared borrow of the entity store.
    #[must_use]
    pub fn store(&self) -> Ref<'_, EntityStore> {
        self.store.borrow()
    }

    /// Exclusive borrow of the entity store.
    #[must_use]
    pub fn store_mut(&self) -> RefMut<'_, EntityStore> {
        self.store.borrow_mut()
    }

    /// Shared borrow of the resource registry.
    #[must_use]
    pub fn resources(&self) -> Ref<'_, ResourceRegistry> {
        self.resources.borrow()
    }

    /// Exclusive borrow of the resource registry.
    #[must_use]
    pub fn resources_mut(&self) -> RefMut<'_, ResourceRegistry> {
        self.resources.borrow_mut()
    }

    /// The event bus. No borrow needed; the bus carries its own interior
    /// mutability.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Publish an event through the bus.
    pub fn publish(&self, event: &str, payload: &Value) {
        self.events.publish(event, payload);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
