//! # flywheel_store
//!
//! Entity and component storage for the flywheel runtime.
//!
//! This crate provides:
//!
//! - [`EntityId`] — lightweight `u64` entity identifiers.
//! - [`EntityAllocator`] — monotonically increasing ID allocator.
//! - [`EntityStore`] — entity records, per-type indices, and queries.
//! - [`QuerySpec`] — declarative required/excluded component filters.
//!
//! Components are open-schema: a component is any [`serde_json::Value`]
//! stored under a string type key. The store keeps one index set per
//! component type so multi-component queries scan only the smallest
//! relevant subset of the population.

pub mod entity;
pub mod query;
pub mod store;

pub use entity::{EntityAllocator, EntityId};
pub use query::QuerySpec;
pub use store::{EntityStore, HookId, StoreError};
