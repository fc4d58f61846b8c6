//! The resource registry.
//!
//! At most one live value per key. `add` is an unconditional upsert so a
//! live value can be swapped at runtime. Callers that consider absence
//! valid use [`ResourceRegistry::get_optional`]; the strict accessor fails
//! with [`ResourceError::ResourceNotFound`].

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
}

/// String-keyed singleton value storage.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    values: HashMap<String, Value>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value under `key`.
    pub fn add(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Strict read. Fails when the key is absent.
    pub fn get(&self, key: &str) -> Result<&Value, ResourceError> {
        self.values
            .get(key)
            .ok_or_else(|| ResourceError::ResourceNotFound(key.to_string()))
    }

    /// Strict mutable read, for in-place updates.
    pub fn get_mut(&mut self, key: &str) -> Result<&mut Value, ResourceError> {
        self.values
            .get_mut(key)
            .ok_or_else(|| ResourceError::ResourceNotFound(key.to_string()))
    }

    /// Optional read. Never fails; `None` is the absent marker.
    #[must_use]
    pub fn get_optional(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Existence check.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Delete the value under `key`. Returns whether a value was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterator over live resource keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
