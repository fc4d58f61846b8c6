//! # flywheel_event
//!
//! Synchronous named publish/subscribe for the flywheel runtime.
//!
//! This crate provides:
//!
//! - [`EventBus`] — handler registration and synchronous dispatch.
//! - [`Subscription`] — token returned by subscribe, used to unsubscribe.
//!
//! Dispatch runs against a snapshot of the handler list taken at publish
//! time, so handlers are free to subscribe, unsubscribe, or publish
//! further events while a publish is in flight.

pub mod bus;

pub use bus::{EventBus, Subscription};
