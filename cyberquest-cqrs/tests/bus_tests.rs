//! Integration tests for the command and query buses.

use async_trait::async_trait;
use chrono::Utc;
use cyberquest_cqrs::*;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

// =============================================================================
// Fixtures
// =============================================================================

/// Message whose payload is free-form JSON
struct JsonCommand {
    envelope: MessageEnvelope,
    payload: Value,
}

impl JsonCommand {
    fn new(type_tag: &str) -> Self {
        Self {
            envelope: MessageEnvelope::new(type_tag, "t1"),
            payload: Value::Null,
        }
    }
}

impl Message for JsonCommand {
    fn envelope(&self) -> &MessageEnvelope {
        &self.envelope
    }
}

impl Command for JsonCommand {
    type Result = Value;
}

struct JsonQuery {
    envelope: MessageEnvelope,
}

impl JsonQuery {
    fn new(type_tag: &str) -> Self {
        Self {
            envelope: MessageEnvelope::new(type_tag, "t1"),
        }
    }
}

impl Message for JsonQuery {
    fn envelope(&self) -> &MessageEnvelope {
        &self.envelope
    }
}

impl Query for JsonQuery {
    type Result = Value;
}

/// Handler that answers with a fixed value and counts its invocations
#[derive(Clone)]
struct FixedHandler {
    reply: Value,
    calls: Arc<AtomicU32>,
}

impl FixedHandler {
    fn new(reply: Value) -> Self {
        Self {
            reply,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandHandler<JsonCommand> for FixedHandler {
    async fn handle(&self, _command: JsonCommand) -> Result<Value, CommandError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

#[async_trait]
impl QueryHandler<JsonQuery> for FixedHandler {
    async fn handle(&self, _query: JsonQuery) -> Result<Value, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("submission store unavailable (code {code})")]
struct StoreUnavailable {
    code: u32,
}

fn quiet() -> BusConfig {
    BusConfig::default().with_logging(false)
}

// =============================================================================
// Registration and routing
// =============================================================================

#[tokio::test]
async fn test_registered_handler_is_invoked() {
    let bus = CommandBus::with_config(quiet());
    let handler = FixedHandler::new(json!("ok"));
    bus.register::<JsonCommand, _>("Ping", handler.clone()).unwrap();

    assert!(bus.is_registered("Ping"));
    assert_eq!(bus.execute(JsonCommand::new("Ping")).await.unwrap(), json!("ok"));
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_replacement_routes_to_latest_handler() {
    let bus = CommandBus::with_config(quiet());
    let first = FixedHandler::new(json!(1));
    let second = FixedHandler::new(json!(2));

    bus.register::<JsonCommand, _>("Score", first.clone()).unwrap();
    bus.register::<JsonCommand, _>("Score", second.clone()).unwrap();

    for _ in 0..3 {
        assert_eq!(bus.execute(JsonCommand::new("Score")).await.unwrap(), json!(2));
    }
    assert_eq!(first.calls(), 0);
    assert_eq!(second.calls(), 3);
    assert_eq!(bus.list_registered(), vec!["Score".to_string()]);
}

#[tokio::test]
async fn test_replacement_rejected_when_disabled() {
    let bus = CommandBus::with_config(quiet().with_allow_replace(false));
    let first = FixedHandler::new(json!(1));

    bus.register::<JsonCommand, _>("Score", first.clone()).unwrap();
    let err = bus
        .register::<JsonCommand, _>("Score", FixedHandler::new(json!(2)))
        .unwrap_err();

    assert_eq!(err, RegistrationError::AlreadyRegistered("Score".to_string()));
    assert_eq!(bus.execute(JsonCommand::new("Score")).await.unwrap(), json!(1));
    assert_eq!(first.calls(), 1);
}

#[tokio::test]
async fn test_unregistered_tag_invokes_nothing() {
    let bus = CommandBus::with_config(quiet());
    let handler = FixedHandler::new(json!("ok"));
    bus.register::<JsonCommand, _>("Known", handler.clone()).unwrap();

    let err = bus.execute(JsonCommand::new("UnknownThing")).await.unwrap_err();

    assert!(matches!(err, CommandError::HandlerNotFound(ref tag) if tag == "UnknownThing"));
    assert_eq!(handler.calls(), 0);
    assert!(!bus.list_registered().contains(&"UnknownThing".to_string()));
}

#[test]
fn test_empty_tag_rejected() {
    let bus = QueryBus::with_config(quiet());
    let err = bus
        .register::<JsonQuery, _>("", FixedHandler::new(json!(null)))
        .unwrap_err();

    assert_eq!(err, RegistrationError::EmptyTypeTag);
    assert_eq!(bus.handler_count(), 0);
}

#[tokio::test]
async fn test_command_and_query_buses_are_isolated() {
    let module = CqrsModule::new(quiet());
    module
        .commands()
        .register::<JsonCommand, _>("Submission", FixedHandler::new(json!("written")))
        .unwrap();

    assert!(module.commands().is_registered("Submission"));
    assert!(!module.queries().is_registered("Submission"));

    module
        .queries()
        .register::<JsonQuery, _>("Submission", FixedHandler::new(json!("read")))
        .unwrap();

    let written = module
        .commands()
        .execute(JsonCommand::new("Submission"))
        .await
        .unwrap();
    let read = module
        .queries()
        .execute(JsonQuery::new("Submission"))
        .await
        .unwrap();
    assert_eq!(written, json!("written"));
    assert_eq!(read, json!("read"));
}

#[tokio::test]
async fn test_clear_resets_state() {
    let module = CqrsModule::new(quiet());
    module
        .commands()
        .register::<JsonCommand, _>("A", FixedHandler::new(json!("a")))
        .unwrap();
    module
        .queries()
        .register::<JsonQuery, _>("B", FixedHandler::new(json!("b")))
        .unwrap();

    module.clear();

    assert!(module.commands().list_registered().is_empty());
    assert!(module.queries().list_registered().is_empty());
    assert!(matches!(
        module.commands().execute(JsonCommand::new("A")).await,
        Err(CommandError::HandlerNotFound(_))
    ));
    assert!(matches!(
        module.queries().execute(JsonQuery::new("B")).await,
        Err(QueryError::HandlerNotFound(_))
    ));

    // The bus keeps working after a reset.
    module
        .commands()
        .register::<JsonCommand, _>("A", FixedHandler::new(json!("again")))
        .unwrap();
    assert_eq!(
        module.commands().execute(JsonCommand::new("A")).await.unwrap(),
        json!("again")
    );
}

// =============================================================================
// Error transparency
// =============================================================================

#[tokio::test]
async fn test_handler_error_is_returned_unchanged() {
    let bus = CommandBus::with_config(quiet());
    bus.register::<JsonCommand, _>(
        "CreateSubmission",
        command_handler(|_cmd: JsonCommand| async {
            Err::<Value, _>(CommandError::handler(StoreUnavailable { code: 503 }))
        }),
    )
    .unwrap();

    let err = bus
        .execute(JsonCommand::new("CreateSubmission"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "submission store unavailable (code 503)");
    match err {
        CommandError::Handler(inner) => {
            let store = inner.downcast_ref::<StoreUnavailable>().unwrap();
            assert_eq!(store.code, 503);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_dispatch_leaves_registry_intact() {
    let bus = QueryBus::with_config(quiet());
    let healthy = FixedHandler::new(json!("fine"));
    bus.register::<JsonQuery, _>(
        "Broken",
        query_handler(|_q: JsonQuery| async {
            Err::<Value, _>(QueryError::ExecutionFailed("boom".to_string()))
        }),
    )
    .unwrap();
    bus.register::<JsonQuery, _>("Healthy", healthy.clone()).unwrap();

    assert!(bus.execute(JsonQuery::new("Broken")).await.is_err());
    assert_eq!(bus.execute(JsonQuery::new("Healthy")).await.unwrap(), json!("fine"));
    assert_eq!(bus.handler_count(), 2);
}

// =============================================================================
// Concrete scenarios
// =============================================================================

#[tokio::test]
async fn test_create_submission_scenario() {
    let bus = CommandBus::with_config(quiet());
    bus.register::<JsonCommand, _>(
        "CreateSubmission",
        FixedHandler::new(json!({"status": "created", "id": "abc"})),
    )
    .unwrap();

    let command = JsonCommand {
        envelope: MessageEnvelope::new("CreateSubmission", "t1")
            .with_id("m1")
            .with_timestamp(Utc::now()),
        payload: json!({"projectId": "p1"}),
    };
    assert_eq!(command.payload["projectId"], "p1");

    let result = bus.execute(command).await.unwrap();
    assert_eq!(result, json!({"status": "created", "id": "abc"}));
}

#[tokio::test]
async fn test_unknown_thing_scenario() {
    let bus = CommandBus::with_config(quiet());

    let err = bus.execute(JsonCommand::new("UnknownThing")).await.unwrap_err();

    assert!(matches!(err, CommandError::HandlerNotFound(_)));
    assert!(!bus.is_registered("UnknownThing"));
    assert!(bus.list_registered().is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_tag_dispatches_run_concurrently() {
    let bus = CommandBus::with_config(quiet());
    let barrier = Arc::new(Barrier::new(2));

    let gate = barrier.clone();
    bus.register::<JsonCommand, _>(
        "Slow",
        command_handler(move |cmd: JsonCommand| {
            let gate = gate.clone();
            async move {
                // Both invocations must be in flight for either to finish.
                gate.wait().await;
                Ok::<_, CommandError>(cmd.payload)
            }
        }),
    )
    .unwrap();

    let mut first = JsonCommand::new("Slow");
    first.payload = json!(1);
    let mut second = JsonCommand::new("Slow");
    second.payload = json!(2);

    let both = async { tokio::join!(bus.execute(first), bus.execute(second)) };
    let (a, b) = tokio::time::timeout(Duration::from_secs(5), both)
        .await
        .expect("dispatches serialized on one tag");

    assert_eq!(a.unwrap(), json!(1));
    assert_eq!(b.unwrap(), json!(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_and_dispatch() {
    let bus = CommandBus::with_config(quiet());
    bus.register::<JsonCommand, _>("Stress", FixedHandler::new(json!("v0")))
        .unwrap();

    let mut tasks = Vec::new();

    for i in 0..8 {
        let bus = bus.clone();
        tasks.push(tokio::spawn(async move {
            for j in 0..50 {
                let handler = FixedHandler::new(json!(format!("v{i}-{j}")));
                bus.register::<JsonCommand, _>("Stress", handler).unwrap();
                bus.register::<JsonCommand, _>(
                    format!("Extra-{i}-{j}"),
                    FixedHandler::new(json!(null)),
                )
                .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }

    for _ in 0..8 {
        let bus = bus.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                let result = bus.execute(JsonCommand::new("Stress")).await.unwrap();
                assert!(result.as_str().unwrap().starts_with('v'));
            }
        }));
    }

    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    assert_eq!(bus.handler_count(), 1 + 8 * 50);
    assert!(bus.is_registered("Stress"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clear_during_dispatch_does_not_block() {
    let bus = QueryBus::with_config(quiet());
    let started = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));

    let (started_in, release_in) = (started.clone(), release.clone());
    bus.register::<JsonQuery, _>(
        "Held",
        query_handler(move |_q: JsonQuery| {
            let (started, release) = (started_in.clone(), release_in.clone());
            async move {
                started.wait().await;
                release.wait().await;
                Ok::<_, QueryError>(json!("done"))
            }
        }),
    )
    .unwrap();

    let in_flight = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.execute(JsonQuery::new("Held")).await })
    };

    // Reset the registry while the handler is suspended.
    started.wait().await;
    bus.clear();
    assert_eq!(bus.handler_count(), 0);
    release.wait().await;

    let result = tokio::time::timeout(Duration::from_secs(5), in_flight)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.unwrap(), json!("done"));
}

// =============================================================================
// Observers
// =============================================================================

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl DispatchObserver for RecordingObserver {
    fn on_dispatch(&self, kind: MessageKind, envelope: &MessageEnvelope) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {kind} {}", envelope.type_tag));
    }

    fn on_complete(
        &self,
        kind: MessageKind,
        envelope: &MessageEnvelope,
        outcome: &DispatchOutcome<'_>,
        _elapsed: Duration,
    ) {
        let label = match outcome {
            DispatchOutcome::Success => "ok",
            DispatchOutcome::HandlerNotFound => "missing",
            DispatchOutcome::Failed(_) => "failed",
        };
        self.events
            .lock()
            .unwrap()
            .push(format!("{label} {kind} {}", envelope.type_tag));
    }
}

struct PanickingObserver;

impl DispatchObserver for PanickingObserver {
    fn on_complete(
        &self,
        _kind: MessageKind,
        _envelope: &MessageEnvelope,
        _outcome: &DispatchOutcome<'_>,
        _elapsed: Duration,
    ) {
        panic!("observer exploded");
    }
}

#[tokio::test]
async fn test_observers_see_every_outcome() {
    let recorder = Arc::new(RecordingObserver::default());
    let module = CqrsModule::new(quiet()).with_observer(recorder.clone());

    module
        .commands()
        .register::<JsonCommand, _>("Ok", FixedHandler::new(json!(1)))
        .unwrap();
    module
        .queries()
        .register::<JsonQuery, _>(
            "Fails",
            query_handler(|_q: JsonQuery| async {
                Err::<Value, _>(QueryError::NotFound("project".into()))
            }),
        )
        .unwrap();

    let _ = module.commands().execute(JsonCommand::new("Ok")).await;
    let _ = module.commands().execute(JsonCommand::new("Nope")).await;
    let _ = module.queries().execute(JsonQuery::new("Fails")).await;

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start command Ok",
            "ok command Ok",
            "start command Nope",
            "missing command Nope",
            "start query Fails",
            "failed query Fails",
        ]
    );
}

#[tokio::test]
async fn test_panicking_observer_does_not_change_result() {
    let bus = CommandBus::new().with_observer(Arc::new(PanickingObserver));
    bus.register::<JsonCommand, _>("Ping", FixedHandler::new(json!("pong")))
        .unwrap();

    assert_eq!(bus.execute(JsonCommand::new("Ping")).await.unwrap(), json!("pong"));
    assert!(matches!(
        bus.execute(JsonCommand::new("Missing")).await,
        Err(CommandError::HandlerNotFound(_))
    ));
}
