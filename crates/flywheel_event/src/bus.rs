//! The event bus and its dispatch contract.
//!
//! `publish` invokes a snapshot of the handler list registered at call
//! time, in subscription order. Handlers subscribed mid-publish do not
//! receive the in-flight payload; handlers already snapshotted still run
//! even if unsubscribed mid-publish. This ordering contract is relied on
//! by behavior units and must not change.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

type Handler = Rc<dyn Fn(&Value)>;

/// Token identifying one registered handler.
///
/// Pass it back to [`EventBus::unsubscribe`] to detach the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    event: String,
    id: u64,
}

impl Subscription {
    /// The event name this subscription is attached to.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }
}

#[derive(Clone)]
struct HandlerEntry {
    id: u64,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
struct BusState {
    handlers: HashMap<String, Vec<HandlerEntry>>,
    next_id: u64,
}

/// Synchronous named publish/subscribe.
///
/// The bus carries its own interior mutability so `publish` can be called
/// re-entrantly from inside a running handler. The live handler list is
/// never borrowed across a handler invocation.
#[derive(Default)]
pub struct EventBus {
    inner: RefCell<BusState>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event`. Returns the subscription token.
    pub fn subscribe(&self, event: &str, handler: impl Fn(&Value) + 'static) -> Subscription {
        self.register(event, false, Rc::new(handler))
    }

    /// Register a handler that is removed after its first invocation.
    pub fn once(&self, event: &str, handler: impl Fn(&Value) + 'static) -> Subscription {
        self.register(event, true, Rc::new(handler))
    }

    fn register(&self, event: &str, once: bool, handler: Handler) -> Subscription {
        let mut state = self.inner.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state
            .handlers
            .entry(event.to_string())
            .or_default()
            .push(HandlerEntry { id, once, handler });
        Subscription {
            event: event.to_string(),
            id,
        }
    }

    /// Detach a handler. Returns `true` if it was still registered.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut state = self.inner.borrow_mut();
        if let Some(list) = state.handlers.get_mut(&subscription.event)
            && let Some(pos) = list.iter().position(|e| e.id == subscription.id)
        {
            list.remove(pos);
            return true;
        }
        false
    }

    /// Synchronously invoke every handler registered for `event` at the
    /// moment of the call, in subscription order.
    ///
    /// A one-shot handler is dropped from the live list immediately before
    /// its invocation, so it fires exactly once even when it republishes
    /// its own event.
    pub fn publish(&self, event: &str, payload: &Value) {
        let snapshot: Vec<HandlerEntry> = {
            let state = self.inner.borrow();
            match state.handlers.get(event) {
                Some(list) if !list.is_empty() => list.clone(),
                _ => return,
            }
        };
        trace!(event, handlers = snapshot.len(), "publish");
        for entry in snapshot {
            if entry.once {
                let mut state = self.inner.borrow_mut();
                if let Some(list) = state.handlers.get_mut(event) {
                    list.retain(|e| e.id != entry.id);
                }
            }
            (entry.handler)(payload);
        }
    }

    /// Number of handlers currently registered for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner
            .borrow()
            .handlers
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Drop all handlers for one event name.
    pub fn clear_event(&self, event: &str) {
        self.inner.borrow_mut().handlers.remove(event);
    }

    /// Drop all handlers for all events.
    pub fn clear(&self) {
        self.inner.borrow_mut().handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish("nothing", &json!({}));
    }

    #[test]
    fn test_subscribe_publish_unsubscribe() {
        let bus = EventBus::new();
        let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = bus.subscribe("x", move |payload| {
            sink.borrow_mut().push(payload.clone());
        });

        bus.publish("x", &json!({"a": 1}));
        assert_eq!(seen.borrow().as_slice(), &[json!({"a": 1})]);

        assert!(bus.unsubscribe(&sub));
        assert!(!bus.unsubscribe(&sub));
        bus.publish("x", &json!({"a": 2}));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_once_fires_exactly_once() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0u32));
        let sink = count.clone();
        bus.once("x", move |_| sink.set(sink.get() + 1));

        bus.publish("x", &json!(1));
        bus.publish("x", &json!(2));
        bus.publish("x", &json!(3));
        assert_eq!(count.get(), 1);
        assert_eq!(bus.subscriber_count("x"), 0);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        for tag in [1u32, 2, 3] {
            let sink = order.clone();
            bus.subscribe("x", move |_| sink.borrow_mut().push(tag));
        }
        bus.publish("x", &json!(null));
        assert_eq!(order.borrow().as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_mid_publish_subscribe_misses_inflight_payload() {
        let bus = Rc::new(EventBus::new());
        let late_count = Rc::new(Cell::new(0u32));

        let bus2 = bus.clone();
        let late2 = late_count.clone();
        bus.subscribe("x", move |_| {
            let late3 = late2.clone();
            bus2.subscribe("x", move |_| late3.set(late3.get() + 1));
        });

        bus.publish("x", &json!(null));
        assert_eq!(late_count.get(), 0, "new handler must miss in-flight publish");

        bus.publish("x", &json!(null));
        assert_eq!(late_count.get(), 1, "new handler sees the next publish");
    }

    #[test]
    fn test_mid_publish_unsubscribe_still_runs_snapshot() {
        let bus = Rc::new(EventBus::new());
        let second_ran = Rc::new(Cell::new(false));

        // First handler unsubscribes the second; the second was already
        // snapshotted and must still run for this publish.
        let second_sub: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let bus2 = bus.clone();
        let slot = second_sub.clone();
        bus.subscribe("x", move |_| {
            if let Some(sub) = slot.borrow().as_ref() {
                bus2.unsubscribe(sub);
            }
        });
        let ran = second_ran.clone();
        let sub = bus.subscribe("x", move |_| ran.set(true));
        *second_sub.borrow_mut() = Some(sub);

        bus.publish("x", &json!(null));
        assert!(second_ran.get());
        assert_eq!(bus.subscriber_count("x"), 1);

        second_ran.set(false);
        bus.publish("x", &json!(null));
        assert!(!second_ran.get(), "unsubscribed handler gets no later events");
    }

    #[test]
    fn test_once_republishing_its_own_event_does_not_refire() {
        let bus = Rc::new(EventBus::new());
        let count = Rc::new(Cell::new(0u32));

        let bus2 = bus.clone();
        let sink = count.clone();
        bus.once("x", move |_| {
            sink.set(sink.get() + 1);
            if sink.get() < 5 {
                bus2.publish("x", &json!(null));
            }
        });

        bus.publish("x", &json!(null));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_clear_and_clear_event() {
        let bus = EventBus::new();
        bus.subscribe("a", |_| {});
        bus.subscribe("a", |_| {});
        bus.subscribe("b", |_| {});

        bus.clear_event("a");
        assert_eq!(bus.subscriber_count("a"), 0);
        assert_eq!(bus.subscriber_count("b"), 1);

        bus.clear();
        assert_eq!(bus.subscriber_count("b"), 0);
    }
}
