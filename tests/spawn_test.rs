//! Integration tests for the spawn request handler.

use modhelper_rs::catalog::Catalog;
use modhelper_rs::dispatch::Dispatcher;
use modhelper_rs::error::{Error, Result};
use modhelper_rs::host::{ContextHost, Instantiator, MemoryEngine, Payload, Template, TemplateLookup};
use modhelper_rs::model::{
    ContextHandle, Dispatch, InstanceId, ItemOutcome, Position, SpawnRequest,
};
use modhelper_rs::spawn::SpawnRequestHandler;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn setup(engine: MemoryEngine) -> (Arc<MemoryEngine>, SpawnRequestHandler) {
    let engine = Arc::new(engine);
    let dispatcher = Arc::new(Dispatcher::new(engine.clone()));
    (engine, SpawnRequestHandler::new(dispatcher))
}

#[test]
fn empty_resource_id_queues_nothing() {
    let (engine, handler) = setup(MemoryEngine::new());

    handler.spawn("", 0.0, 0.0, 0.0);

    assert_eq!(handler.dispatcher().pending(), 0);
    // Rejected before enqueue, so no context was ever needed.
    assert_eq!(engine.contexts_created(), 0);

    let err = handler
        .submit(SpawnRequest::new("", Position::default()))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}

#[test]
fn whitespace_resource_id_is_queued_and_fails_at_lookup() {
    let (engine, handler) = setup(MemoryEngine::new());

    handler.spawn("   ", 0.0, 0.0, 0.0);
    assert_eq!(handler.dispatcher().pending(), 1);

    let report = handler.dispatcher().drain().unwrap();
    assert_eq!(report.executed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(engine.instantiate_calls(), 0);
    assert!(matches!(
        &report.outcomes[0],
        ItemOutcome::Failed { kind, .. } if kind == "template_not_found"
    ));
}

#[test]
fn valid_spawn_places_instance_at_requested_position() {
    let (engine, handler) = setup(MemoryEngine::new().with_template("validId", Some("Prefab")));

    handler.spawn("validId", 1.0, 2.0, 3.0);
    assert_eq!(handler.dispatcher().pending(), 1);
    assert!(engine.instances().is_empty(), "spawn waits for the main thread");

    let report = handler.dispatcher().drain().unwrap();
    assert_eq!(report.executed, 1);
    assert_eq!(report.failed, 0);

    let instances = engine.instances();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].payload, "Prefab");
    assert_eq!(instances[0].position, Some(Position::new(1.0, 2.0, 3.0)));

    match &report.outcomes[0] {
        ItemOutcome::Spawned {
            resource_id,
            instance,
            position,
        } => {
            assert_eq!(resource_id, "validId");
            assert_eq!(*instance, instances[0].id);
            assert_eq!(*position, Position::new(1.0, 2.0, 3.0));
        }
        other => panic!("expected spawn outcome, got {other:?}"),
    }
}

#[test]
fn unknown_template_fails_without_instantiating() {
    let (engine, handler) = setup(MemoryEngine::new());

    handler.spawn("doesNotExist", 4.0, 5.0, 6.0);
    assert_eq!(handler.dispatcher().pending(), 1);

    let report = handler.dispatcher().drain().unwrap();
    assert_eq!(report.executed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(engine.instantiate_calls(), 0);
    assert!(matches!(
        &report.outcomes[0],
        ItemOutcome::Failed { kind, message }
            if kind == "template_not_found" && message.contains("doesNotExist")
    ));
}

#[test]
fn template_without_payload_fails_softly() {
    let (engine, handler) = setup(MemoryEngine::new().with_template("iscBroken", None));

    handler.spawn("iscBroken", 0.0, 0.0, 0.0);
    handler.spawn("iscBroken", 0.0, 0.0, 0.0);

    let report = handler.dispatcher().drain().unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(engine.instantiate_calls(), 0);
}

/// Engine whose instantiation always comes back empty.
#[derive(Default)]
struct NoInstanceEngine {
    placements: AtomicUsize,
}

impl ContextHost for NoInstanceEngine {
    fn create_context(&self) -> Result<ContextHandle> {
        Ok(ContextHandle::new())
    }

    fn destroy_context(&self, _handle: ContextHandle) -> Result<()> {
        Ok(())
    }
}

impl TemplateLookup for NoInstanceEngine {
    fn load(&self, id: &str) -> Option<Template> {
        Some(Template {
            id: id.to_string(),
            payload: Some(Payload {
                name: "Prefab".to_string(),
            }),
        })
    }
}

impl Instantiator for NoInstanceEngine {
    fn instantiate(&self, _payload: &Payload) -> Option<InstanceId> {
        None
    }

    fn set_position(&self, _instance: InstanceId, _position: Position) -> Result<()> {
        self.placements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn failed_instantiation_skips_placement() {
    let engine = Arc::new(NoInstanceEngine::default());
    let handler = SpawnRequestHandler::new(Arc::new(Dispatcher::new(engine.clone())));

    handler.spawn("iscChest1", 1.0, 1.0, 1.0);
    let report = handler.dispatcher().drain().unwrap();

    assert!(matches!(
        &report.outcomes[0],
        ItemOutcome::Failed { kind, .. } if kind == "instantiation"
    ));
    assert_eq!(engine.placements.load(Ordering::SeqCst), 0);
}

#[test]
fn spawns_run_in_request_order_and_one_failure_does_not_block_others() {
    let (engine, handler) = setup(
        MemoryEngine::new()
            .with_template("a", Some("A"))
            .with_template("c", Some("C")),
    );

    handler.spawn("a", 1.0, 0.0, 0.0);
    handler.spawn("b", 2.0, 0.0, 0.0);
    handler.spawn("c", 3.0, 0.0, 0.0);

    let report = handler.dispatcher().drain().unwrap();
    assert_eq!(report.executed, 3);
    assert_eq!(report.failed, 1);

    let payloads: Vec<_> = engine.instances().into_iter().map(|i| i.payload).collect();
    assert_eq!(payloads, vec!["A", "C"]);
}

#[test]
fn headless_host_spawns_inline() {
    let (engine, handler) =
        setup(MemoryEngine::headless().with_template("iscChest1", Some("Chest1")));

    let dispatch = handler
        .submit(SpawnRequest::new("iscChest1", Position::new(7.0, 8.0, 9.0)))
        .unwrap();

    assert!(matches!(dispatch, Dispatch::Inline(ItemOutcome::Spawned { .. })));
    assert_eq!(handler.dispatcher().pending(), 0);
    assert_eq!(
        engine.instances()[0].position,
        Some(Position::new(7.0, 8.0, 9.0))
    );
}

#[test]
fn spawn_named_resolves_through_the_catalog() {
    let catalog = Catalog::from_toml_str(
        r#"
        [[interactable]]
        name = "Chest"
        path = "SpawnCards/InteractableSpawnCard/iscChest1"

        [[interactable]]
        name = "Barrel"
        path = "SpawnCards/InteractableSpawnCard/iscBarrel1"
        "#,
    )
    .unwrap();
    let engine = Arc::new(MemoryEngine::from_catalog(&catalog));
    let dispatcher = Arc::new(Dispatcher::new(engine.clone()));
    let handler = SpawnRequestHandler::new(dispatcher).with_catalog(Arc::new(catalog));

    handler.spawn_named("chest", Position::new(1.0, 1.0, 1.0)).unwrap();
    handler
        .spawn_by_name_or_path(SpawnRequest::new(
            "SpawnCards/InteractableSpawnCard/iscBarrel1",
            Position::new(2.0, 2.0, 2.0),
        ))
        .unwrap();
    assert!(handler.spawn_named("Teleporter", Position::default()).is_err());
    assert_eq!(handler.dispatcher().pending(), 2);

    let report = handler.dispatcher().drain().unwrap();
    assert_eq!(report.failed, 0);
    let payloads: Vec<_> = engine.instances().into_iter().map(|i| i.payload).collect();
    assert_eq!(payloads, vec!["iscChest1", "iscBarrel1"]);
}

#[test]
fn cleanup_returns_true_and_discards_pending() {
    let (engine, handler) = setup(MemoryEngine::new().with_template("a", Some("A")));

    handler.spawn("a", 0.0, 0.0, 0.0);
    assert!(handler.cleanup());
    assert!(handler.cleanup());

    assert!(handler.dispatcher().drain().unwrap().is_empty());
    assert!(engine.instances().is_empty());
}
