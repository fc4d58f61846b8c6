//! Bundles: mergeable, installable collections of units and staged
//! resources.
//!
//! A resource is staged in one of two phases: declared now (immediate
//! value or deferred producer), materialized later by the engine at
//! install time. A producer is a deferred computation that may suspend
//! (e.g. it performs I/O) and may fail; install is the only point where
//! producers run.

use std::collections::HashMap;

use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::unit::SystemUnit;

/// A deferred resource computation, run once at install time.
pub type ResourceProducer = Box<dyn FnOnce() -> LocalBoxFuture<'static, anyhow::Result<Value>>>;

/// A resource declared on a bundle, awaiting materialization.
pub enum StagedResource {
    /// A value available immediately.
    Immediate(Value),
    /// A producer invoked (and awaited) at install time.
    Deferred(ResourceProducer),
}

impl StagedResource {
    /// Run the staged computation, yielding the resource value.
    ///
    /// # Errors
    ///
    /// Propagates the producer's failure. Immediate values never fail.
    pub async fn materialize(self) -> anyhow::Result<Value> {
        match self {
            StagedResource::Immediate(value) => Ok(value),
            StagedResource::Deferred(producer) => producer().await,
        }
    }
}

/// An ordered list of behavior units plus a map of staged resources,
/// identified by a caller-chosen id.
///
/// A bundle is consumed by `Engine::install`, so a given bundle value is
/// installable into exactly one engine instance.
pub struct Bundle {
    id: String,
    units: Vec<SystemUnit>,
    resources: HashMap<String, StagedResource>,
}

impl Bundle {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            units: Vec::new(),
            resources: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a unit. Units run in append order once installed.
    #[must_use]
    pub fn add_unit(mut self, unit: SystemUnit) -> Self {
        self.units.push(unit);
        self
    }

    /// Stage an immediate resource value for materialization at install
    /// time.
    #[must_use]
    pub fn add_resource(mut self, key: impl Into<String>, value: Value) -> Self {
        self.resources
            .insert(key.into(), StagedResource::Immediate(value));
        self
    }

    /// Stage a deferred resource producer, invoked and awaited at install
    /// time.
    #[must_use]
    pub fn add_resource_with(
        mut self,
        key: impl Into<String>,
        producer: impl FnOnce() -> LocalBoxFuture<'static, anyhow::Result<Value>> + 'static,
    ) -> Self {
        self.resources
            .insert(key.into(), StagedResource::Deferred(Box::new(producer)));
        self
    }

    /// Merge two bundles into a new one: unit lists concatenate (self
    /// first), resource maps union with `other` winning on key collision.
    /// The merged id is `"{self}+{other}"`.
    #[must_use]
    pub fn merge(mut self, other: Bundle) -> Bundle {
        self.id = format!("{}+{}", self.id, other.id);
        self.units.extend(other.units);
        self.resources.extend(other.resources);
        self
    }

    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Decompose for installation.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<SystemUnit>, HashMap<String, StagedResource>) {
        (self.id, self.units, self.resources)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_merge_concatenates_units_left_first() {
        let left = Bundle::new("world")
            .add_unit(SystemUnit::builder("spawn").build())
            .add_unit(SystemUnit::builder("terrain").build());
        let right = Bundle::new("rules").add_unit(SystemUnit::builder("movement").build());

        let merged = left.merge(right);
        assert_eq!(merged.id(), "world+rules");
        let (_, units, _) = merged.into_parts();
        let labels: Vec<&str> = units.iter().map(SystemUnit::label).collect();
        assert_eq!(labels, vec!["spawn", "terrain", "movement"]);
    }

    #[test]
    fn test_merge_right_wins_on_resource_collision() {
        let left = Bundle::new("a").add_resource("score", json!(1));
        let right = Bundle::new("b").add_resource("score", json!(2));

        let (_, _, resources) = left.merge(right).into_parts();
        match resources.get("score") {
            Some(StagedResource::Immediate(v)) => assert_eq!(v, &json!(2)),
            _ => panic!("expected immediate resource"),
        }
    }

    #[tokio::test]
    async fn test_materialize_immediate_and_deferred() {
        let immediate = StagedResource::Immediate(json!(7));
        assert_eq!(immediate.materialize().await.unwrap(), json!(7));

        let deferred = StagedResource::Deferred(Box::new(|| {
            Box::pin(async {
                tokio::task::yield_now().await;
                Ok(json!({"width": 640}))
            })
        }));
        assert_eq!(
            deferred.materialize().await.unwrap(),
            json!({"width": 640})
        );
    }

    #[tokio::test]
    async fn test_materialize_propagates_producer_failure() {
        let deferred = StagedResource::Deferred(Box::new(|| {
            Box::pin(async { Err(anyhow::anyhow!("surface unavailable")) })
        }));
        assert!(deferred.materialize().await.is_err());
    }
}
