//! The entity store: records, indices, queries, and change hooks.
//!
//! Components are open-schema (not Rust types), so values are stored as
//! `serde_json::Value` keyed by component name. For every component type
//! the store also keeps an index set of the entities currently holding it.
//! Invariant: entity `e` is in type `t`'s index iff `e`'s record holds a
//! value under `t`. Queries with at least one required type scan only the
//! smallest required index instead of the whole population.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::entity::{EntityAllocator, EntityId};
use crate::query::QuerySpec;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
}

/// Identifies a registered change hook so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

type AddedHook = Rc<dyn Fn(EntityId, &Value)>;
type RemovedHook = Rc<dyn Fn(EntityId)>;

/// A single entity's component set.
#[derive(Debug, Clone, Default)]
struct EntityRecord {
    components: HashMap<String, Value>,
}

/// Entity lifecycle, component storage, indices, and queries.
pub struct EntityStore {
    allocator: EntityAllocator,
    entities: HashMap<EntityId, EntityRecord>,
    /// Per component type, the set of entities currently holding it.
    indices: HashMap<String, HashSet<EntityId>>,
    added_hooks: HashMap<String, Vec<(HookId, AddedHook)>>,
    removed_hooks: HashMap<String, Vec<(HookId, RemovedHook)>>,
    next_hook: u64,
}

impl EntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            entities: HashMap::new(),
            indices: HashMap::new(),
            added_hooks: HashMap::new(),
            removed_hooks: HashMap::new(),
            next_hook: 0,
        }
    }

    // -- Entity lifecycle --

    /// Allocate the next id and register an empty record for it.
    pub fn create_entity(&mut self) -> EntityId {
        let id = self.allocator.allocate();
        self.entities.insert(id, EntityRecord::default());
        debug!(entity = %id, "entity created");
        id
    }

    /// Destroy an entity, purging it from every index.
    ///
    /// Returns `false` if the entity was unknown. "Removed" hooks fire for
    /// every component the record still held.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let Some(record) = self.entities.remove(&id) else {
            return false;
        };
        let types: Vec<String> = record.components.keys().cloned().collect();
        for ty in &types {
            if let Some(set) = self.indices.get_mut(ty) {
                set.remove(&id);
            }
        }
        for ty in &types {
            self.fire_removed(ty, id);
        }
        debug!(entity = %id, components = types.len(), "entity removed");
        true
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Return all live entity IDs, ascending.
    #[must_use]
    pub fn all_entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Return the count of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // -- Component operations --

    /// Set a component on an entity, overwriting any existing value.
    ///
    /// The entity joins the type's index on the absent-to-present
    /// transition; "added" hooks fire only then, never on a plain
    /// overwrite.
    pub fn add_component(
        &mut self,
        id: EntityId,
        ty: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let record = self
            .entities
            .get_mut(&id)
            .ok_or(StoreError::UnknownEntity(id))?;
        let newly_added = record.components.insert(ty.to_string(), value).is_none();
        if newly_added {
            self.indices.entry(ty.to_string()).or_default().insert(id);
            self.fire_added(ty, id);
        }
        Ok(())
    }

    /// Remove a component from an entity.
    ///
    /// A no-op (not an error) when the slot was already absent. "Removed"
    /// hooks fire on the present-to-absent transition.
    pub fn remove_component(&mut self, id: EntityId, ty: &str) -> Result<(), StoreError> {
        let record = self
            .entities
            .get_mut(&id)
            .ok_or(StoreError::UnknownEntity(id))?;
        if record.components.remove(ty).is_some() {
            if let Some(set) = self.indices.get_mut(ty) {
                set.remove(&id);
            }
            self.fire_removed(ty, id);
        }
        Ok(())
    }

    /// Get a component value from an entity. `None` is the absent marker.
    pub fn get_component(&self, id: EntityId, ty: &str) -> Result<Option<&Value>, StoreError> {
        let record = self.entities.get(&id).ok_or(StoreError::UnknownEntity(id))?;
        Ok(record.components.get(ty))
    }

    /// Get a mutable reference to a component value.
    ///
    /// This is the aliasing mutation path: changes made through the
    /// returned reference are visible to every later observer in the same
    /// tick, including behavior units processed after the caller.
    pub fn get_component_mut(
        &mut self,
        id: EntityId,
        ty: &str,
    ) -> Result<Option<&mut Value>, StoreError> {
        let record = self
            .entities
            .get_mut(&id)
            .ok_or(StoreError::UnknownEntity(id))?;
        Ok(record.components.get_mut(ty))
    }

    /// Check if an entity holds a specific component. `false` for unknown
    /// entities.
    #[must_use]
    pub fn has_component(&self, id: EntityId, ty: &str) -> bool {
        self.entities
            .get(&id)
            .is_some_and(|r| r.components.contains_key(ty))
    }

    /// All component names on an entity.
    pub fn component_names(&self, id: EntityId) -> Result<Vec<String>, StoreError> {
        let record = self.entities.get(&id).ok_or(StoreError::UnknownEntity(id))?;
        Ok(record.components.keys().cloned().collect())
    }

    /// Current size of a component type's index set.
    #[must_use]
    pub fn index_size(&self, ty: &str) -> usize {
        self.indices.get(ty).map_or(0, HashSet::len)
    }

    // -- Query --

    /// Entities matching the spec, ascending by id.
    ///
    /// With no required types, all entities are scanned and filtered by the
    /// exclusions. Otherwise only the smallest required index set is
    /// scanned; the other constraints are checked per candidate. A required
    /// type that no entity has ever held short-circuits to an empty result.
    #[must_use]
    pub fn query(&self, spec: &QuerySpec) -> Vec<EntityId> {
        let mut matches: Vec<EntityId> = if spec.required.is_empty() {
            self.entities
                .iter()
                .filter(|(_, record)| Self::record_matches(record, spec))
                .map(|(id, _)| *id)
                .collect()
        } else {
            let mut base: Option<&HashSet<EntityId>> = None;
            for ty in &spec.required {
                match self.indices.get(ty) {
                    None => return Vec::new(),
                    Some(set) => {
                        if base.is_none_or(|b| set.len() < b.len()) {
                            base = Some(set);
                        }
                    }
                }
            }
            let Some(base) = base else {
                return Vec::new();
            };
            base.iter()
                .copied()
                .filter(|id| {
                    self.entities
                        .get(id)
                        .is_some_and(|record| Self::record_matches(record, spec))
                })
                .collect()
        };
        matches.sort_unstable();
        matches
    }

    fn record_matches(record: &EntityRecord, spec: &QuerySpec) -> bool {
        spec.required
            .iter()
            .all(|ty| record.components.contains_key(ty))
            && spec
                .excluded
                .iter()
                .all(|ty| !record.components.contains_key(ty))
    }

    // -- Change hooks --

    /// Register a hook fired once per absent-to-present transition of `ty`
    /// on any entity. The hook receives the entity and the stored value.
    ///
    /// Hooks run while the store is mid-mutation and must not call back
    /// into the store.
    pub fn on_component_added(
        &mut self,
        ty: impl Into<String>,
        hook: impl Fn(EntityId, &Value) + 'static,
    ) -> HookId {
        let id = self.next_hook_id();
        self.added_hooks
            .entry(ty.into())
            .or_default()
            .push((id, Rc::new(hook)));
        id
    }

    /// Register a hook fired once per present-to-absent transition of `ty`,
    /// including the purge performed by [`EntityStore::remove_entity`].
    pub fn on_component_removed(
        &mut self,
        ty: impl Into<String>,
        hook: impl Fn(EntityId) + 'static,
    ) -> HookId {
        let id = self.next_hook_id();
        self.removed_hooks
            .entry(ty.into())
            .or_default()
            .push((id, Rc::new(hook)));
        id
    }

    /// Detach a previously registered hook. Returns `true` if it existed.
    pub fn remove_hook(&mut self, hook: HookId) -> bool {
        for list in self.added_hooks.values_mut() {
            if let Some(pos) = list.iter().position(|(id, _)| *id == hook) {
                list.remove(pos);
                return true;
            }
        }
        for list in self.removed_hooks.values_mut() {
            if let Some(pos) = list.iter().position(|(id, _)| *id == hook) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    fn next_hook_id(&mut self) -> HookId {
        let id = HookId(self.next_hook);
        self.next_hook += 1;
        id
    }

    fn fire_added(&self, ty: &str, id: EntityId) {
        let Some(hooks) = self.added_hooks.get(ty) else {
            return;
        };
        let Some(value) = self
            .entities
            .get(&id)
            .and_then(|r| r.components.get(ty))
        else {
            return;
        };
        for (_, hook) in hooks {
            hook(id, value);
        }
    }

    fn fire_removed(&self, ty: &str, id: EntityId) {
        let Some(hooks) = self.removed_hooks.get(ty) else {
            return;
        };
        for (_, hook) in hooks {
            hook(id);
        }
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
