//! # flywheel_engine
//!
//! The orchestrator for the flywheel runtime. An [`Engine`] owns one
//! entity store, one event bus, and one resource registry, installs
//! [`Bundle`](flywheel_system::Bundle)s into them, and drives the
//! per-tick update loop over the active behavior units.
//!
//! The engine contains no timer or scheduler of its own: an external
//! driver decides when and how often to call [`Engine::update`]. The only
//! suspension point is [`Engine::install`], when a staged resource's
//! producer suspends.

pub mod engine;

pub use engine::{Engine, EngineError};
