//! # flywheel_system
//!
//! Behavior units ("systems") and bundle composition for the flywheel
//! runtime.
//!
//! This crate provides:
//!
//! - [`Context`] — the handle bundle (store, resources, events) passed to
//!   every callback.
//! - [`SystemUnit`] / [`SystemBuilder`] — declarative unit descriptors:
//!   named queries, a per-tick callback, lifecycle hooks, event handlers.
//! - [`Bundle`] — a mergeable, installable collection of units plus staged
//!   resources.
//!
//! Units are authored independently and composed through bundles; nothing
//! in this crate executes them. The engine crate drives the per-tick loop.

pub mod bundle;
pub mod context;
pub mod unit;

pub use bundle::{Bundle, ResourceProducer, StagedResource};
pub use context::Context;
pub use unit::{EventHandlerFn, LifecycleFn, ProcessFn, QueryResults, SystemBuilder, SystemUnit};
