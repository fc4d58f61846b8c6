//! # flywheel_resource
//!
//! Keyed singleton value storage for the flywheel runtime.
//!
//! A resource is a process-wide singleton keyed by name, independent of
//! any entity. The registry is an explicit object passed to every unit and
//! handler invocation rather than ambient global state, which keeps
//! dependencies visible at call sites.

pub mod registry;

pub use registry::{ResourceError, ResourceRegistry};
