//! Spawn request handling.
//!
//! [`SpawnRequestHandler`] validates a request on the caller's thread and
//! hands a [`SpawnCommand`] to the dispatcher. [`execute`] is what the
//! dispatcher runs for that command on the main thread.

use std::sync::Arc;

use tracing::{error, info};

use crate::catalog::Catalog;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::host::Engine;
use crate::model::{CleanupReport, Dispatch, ItemOutcome, Position, SpawnCommand, SpawnRequest};

/// Stateless façade over the dispatcher for spawn requests.
pub struct SpawnRequestHandler {
    dispatcher: Arc<Dispatcher>,
    catalog: Option<Arc<Catalog>>,
}

impl SpawnRequestHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            catalog: None,
        }
    }

    /// Allow [`spawn_named`](Self::spawn_named) to resolve display names.
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_deref()
    }

    /// Queue a spawn of `resource_id` at `(x, y, z)`. Fire-and-forget:
    /// every failure ends up in the log only.
    pub fn spawn(&self, resource_id: &str, x: f32, y: f32, z: f32) {
        let _ = self.submit(SpawnRequest::new(resource_id, Position::new(x, y, z)));
    }

    /// Validate and queue a request.
    ///
    /// Returns the validation error without queuing anything if the request
    /// is rejected. Failures after that point are reported by the drain.
    pub fn submit(&self, request: SpawnRequest) -> Result<Dispatch> {
        let command = request.validate().inspect_err(|e| {
            error!(error = %e, "spawn request rejected");
        })?;

        info!(
            resource = %command.resource_id,
            position = %command.position,
            "spawn request queued"
        );
        Ok(self.dispatcher.enqueue(command))
    }

    /// Spawn a catalog entry by display name.
    pub fn spawn_named(&self, name: &str, position: Position) -> Result<Dispatch> {
        let entry = self
            .catalog
            .as_deref()
            .and_then(|catalog| catalog.find(name))
            .ok_or_else(|| Error::InvalidRequest(format!("unknown interactable: {name:?}")))
            .inspect_err(|e| error!(error = %e, "spawn request rejected"))?;

        info!(name = %entry.name, "spawning catalog entry");
        self.submit(SpawnRequest::new(entry.path.clone(), position))
    }

    /// Accept either a catalog display name or a raw resource path.
    pub fn spawn_by_name_or_path(&self, request: SpawnRequest) -> Result<Dispatch> {
        let named = self
            .catalog
            .as_deref()
            .is_some_and(|catalog| catalog.find(&request.resource_id).is_some());
        if named {
            self.spawn_named(&request.resource_id, request.position)
        } else {
            self.submit(request)
        }
    }

    /// Tear down the dispatcher. `true` when the context was released
    /// cleanly (or there was nothing to release).
    pub fn cleanup(&self) -> bool {
        self.cleanup_report().is_success()
    }

    pub fn cleanup_report(&self) -> CleanupReport {
        info!("spawn helper cleanup called");
        let report = self.dispatcher.cleanup();
        if report.is_success() {
            info!("spawn helper cleanup completed successfully");
        } else {
            error!(failure = ?report.failure, "spawn helper cleanup failed");
        }
        report
    }
}

/// Resolve, instantiate and place one spawn command.
pub fn execute(engine: &dyn Engine, command: &SpawnCommand) -> Result<ItemOutcome> {
    let resource = command.resource_id.as_str();
    info!(resource, "attempting to spawn");

    let template = engine
        .load(resource)
        .ok_or_else(|| Error::TemplateNotFound(resource.to_string()))?;

    let payload = template
        .payload
        .as_ref()
        .ok_or_else(|| Error::MissingPayload(resource.to_string()))?;

    let instance = engine
        .instantiate(payload)
        .ok_or_else(|| Error::Instantiation(resource.to_string()))?;

    engine.set_position(instance, command.position)?;

    info!(
        resource,
        instance = %instance,
        position = %command.position,
        "spawned successfully"
    );

    Ok(ItemOutcome::Spawned {
        resource_id: command.resource_id.clone(),
        instance,
        position: command.position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryEngine;

    fn command(id: &str) -> SpawnCommand {
        SpawnRequest::new(id, Position::new(1.0, 2.0, 3.0))
            .validate()
            .unwrap()
    }

    #[test]
    fn execute_reports_missing_payload() {
        let engine = MemoryEngine::new().with_template("iscBroken", None);
        let err = execute(&engine, &command("iscBroken")).unwrap_err();
        assert!(matches!(err, Error::MissingPayload(ref id) if id == "iscBroken"));
        assert_eq!(engine.instantiate_calls(), 0);
    }

    #[test]
    fn execute_places_the_instance() {
        let engine = MemoryEngine::new().with_template("iscChest1", Some("Chest1"));
        let outcome = execute(&engine, &command("iscChest1")).unwrap();
        assert!(matches!(outcome, ItemOutcome::Spawned { .. }));

        let instances = engine.instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].payload, "Chest1");
        assert_eq!(instances[0].position, Some(Position::new(1.0, 2.0, 3.0)));
    }
}
