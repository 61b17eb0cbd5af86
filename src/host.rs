//! Engine-side collaborators.
//!
//! The dispatcher and spawn handler never touch the game directly. They go
//! through these traits, which a host implements over its real object model.
//! [`MemoryEngine`] is an in-process implementation for the CLI and tests.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::model::{ContextHandle, InstanceId, Position};

/// The instantiable part of a template (a prefab).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub name: String,
}

/// A template resolved from a resource identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: String,
    pub payload: Option<Payload>,
}

/// Creates and destroys the per-tick execution context that owns draining.
pub trait ContextHost: Send + Sync {
    fn create_context(&self) -> Result<ContextHandle>;
    fn destroy_context(&self, handle: ContextHandle) -> Result<()>;
}

/// Resolves resource identifiers to templates.
pub trait TemplateLookup: Send + Sync {
    fn load(&self, id: &str) -> Option<Template>;
}

/// Materializes payloads into live instances.
pub trait Instantiator: Send + Sync {
    fn instantiate(&self, payload: &Payload) -> Option<InstanceId>;
    fn set_position(&self, instance: InstanceId, position: Position) -> Result<()>;
}

/// Everything the dispatcher needs from the host.
pub trait Engine: ContextHost + TemplateLookup + Instantiator {}

impl<T: ContextHost + TemplateLookup + Instantiator> Engine for T {}

// ---------------------------------------------------------------------------
// In-memory engine
// ---------------------------------------------------------------------------

/// An instance created by [`MemoryEngine`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnedInstance {
    pub id: InstanceId,
    pub payload: String,
    pub position: Option<Position>,
}

#[derive(Debug, Default)]
struct MemoryState {
    live_context: Option<ContextHandle>,
    contexts_created: usize,
    instantiate_calls: usize,
    next_instance: u64,
    instances: Vec<SpawnedInstance>,
}

/// Template map plus a list of live instances, all behind mutexes.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    headless: bool,
    templates: Mutex<HashMap<String, Template>>,
    state: Mutex<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine that refuses to create an execution context, like a host
    /// running in batch mode.
    pub fn headless() -> Self {
        Self {
            headless: true,
            ..Self::default()
        }
    }

    /// Build an engine whose templates mirror a catalog.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let engine = Self::new();
        engine.register_catalog(catalog);
        engine
    }

    pub fn set_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Register a template. `payload: None` models a template whose prefab
    /// is missing.
    pub fn with_template(self, id: &str, payload: Option<&str>) -> Self {
        self.insert_template(id, payload);
        self
    }

    pub fn insert_template(&self, id: &str, payload: Option<&str>) {
        let template = Template {
            id: id.to_string(),
            payload: payload.map(|name| Payload {
                name: name.to_string(),
            }),
        };
        lock(&self.templates).insert(id.to_string(), template);
    }

    pub fn register_catalog(&self, catalog: &Catalog) {
        for entry in catalog.entries() {
            let payload = entry.instantiable.then(|| entry.prefab_name());
            self.insert_template(&entry.path, payload.as_deref());
        }
    }

    pub fn instances(&self) -> Vec<SpawnedInstance> {
        lock(&self.state).instances.clone()
    }

    pub fn instantiate_calls(&self) -> usize {
        lock(&self.state).instantiate_calls
    }

    pub fn contexts_created(&self) -> usize {
        lock(&self.state).contexts_created
    }

    pub fn live_context(&self) -> Option<ContextHandle> {
        lock(&self.state).live_context
    }
}

impl ContextHost for MemoryEngine {
    fn create_context(&self) -> Result<ContextHandle> {
        if self.headless {
            return Err(Error::ContextUnavailable(
                "host is running headless".to_string(),
            ));
        }
        let mut state = lock(&self.state);
        let handle = ContextHandle::new();
        state.live_context = Some(handle);
        state.contexts_created += 1;
        Ok(handle)
    }

    fn destroy_context(&self, handle: ContextHandle) -> Result<()> {
        let mut state = lock(&self.state);
        match state.live_context {
            Some(live) if live == handle => {
                state.live_context = None;
                Ok(())
            }
            _ => Err(Error::Teardown(format!("unknown execution context {handle}"))),
        }
    }
}

impl TemplateLookup for MemoryEngine {
    fn load(&self, id: &str) -> Option<Template> {
        lock(&self.templates).get(id).cloned()
    }
}

impl Instantiator for MemoryEngine {
    fn instantiate(&self, payload: &Payload) -> Option<InstanceId> {
        let mut state = lock(&self.state);
        state.instantiate_calls += 1;
        state.next_instance += 1;
        let id = InstanceId(state.next_instance);
        state.instances.push(SpawnedInstance {
            id,
            payload: payload.name.clone(),
            position: None,
        });
        Some(id)
    }

    fn set_position(&self, instance: InstanceId, position: Position) -> Result<()> {
        let mut state = lock(&self.state);
        let found = state
            .instances
            .iter_mut()
            .find(|i| i.id == instance)
            .ok_or_else(|| Error::Placement(format!("no live instance {instance}")))?;
        found.position = Some(position);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_engine_refuses_context() {
        let engine = MemoryEngine::headless();
        let err = engine.create_context().unwrap_err();
        assert_eq!(err.kind(), "context_unavailable");
        assert_eq!(engine.contexts_created(), 0);
    }

    #[test]
    fn destroying_a_stale_context_fails() {
        let engine = MemoryEngine::new();
        let first = engine.create_context().unwrap();
        engine.destroy_context(first).unwrap();
        assert!(engine.destroy_context(first).is_err());
    }

    #[test]
    fn set_position_on_unknown_instance_fails() {
        let engine = MemoryEngine::new();
        let err = engine
            .set_position(InstanceId(42), Position::default())
            .unwrap_err();
        assert_eq!(err.kind(), "placement");
    }
}
