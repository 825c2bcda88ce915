mod common;

use common::{envelope, init_tracing, member_row, message};
use goldgym_cdc::boot::{start_consumers_with, ConsumerSpec, ExitReason, RestartPolicy};
use goldgym_cdc::consumer::ConsumerLoop;
use goldgym_cdc::kafka::BrokerMessage;
use goldgym_cdc::test_utils::{RecordingHandler, RecordingService, ServiceCall, VecSource};
use goldgym_cdc::{build_registry, BootResources, Direction, Error, Operation, Registry, Shutdown};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const TOPIC: &str = "cdc.local_to_prod";

fn recording_registry(handler: &RecordingHandler) -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .register("data_peserta", handler.clone())
            .build(),
    )
}

/// Runs a consumer loop over `script` until it drains; returns the acked offsets.
async fn run_script(registry: Arc<Registry>, script: Vec<goldgym_cdc::Result<BrokerMessage>>) -> Vec<i64> {
    let shutdown = Shutdown::new();
    let source = VecSource::new(script).shutdown_when_drained(shutdown.clone());
    let acked = source.acked();

    timeout(
        Duration::from_secs(5),
        ConsumerLoop::new("pipeline-test", source, registry, shutdown.subscribe())
            .with_retry_backoff(Duration::from_millis(5))
            .run(),
    )
    .await
    .expect("consumer loop did not stop");

    let acked = acked.lock().unwrap().clone();
    acked
}

#[tokio::test]
async fn test_create_event_reaches_handler() {
    init_tracing();
    let handler = RecordingHandler::new();

    let acked = run_script(
        recording_registry(&handler),
        vec![Ok(message(
            TOPIC,
            0,
            envelope("c", "data_peserta", Some(json!({ "gold_id": 5 })), None),
        ))],
    )
    .await;

    let calls = handler.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation, Operation::Create);
    assert_eq!(calls[0].after.as_ref().unwrap()["gold_id"], json!(5));
    assert!(calls[0].before.is_none());
    assert_eq!(acked, vec![0]);
}

#[tokio::test]
async fn test_unroutable_and_malformed_messages_are_skipped() {
    init_tracing();
    let handler = RecordingHandler::new();

    let acked = run_script(
        recording_registry(&handler),
        vec![
            Ok(message(TOPIC, 0, envelope("c", "unknown_table", Some(json!({ "id": 1 })), None))),
            Ok(message(TOPIC, 1, "not json at all")),
            Ok(message(TOPIC, 2, r#"{"payload":{"op":"c","source":{}}}"#)),
            Ok(message(
                TOPIC,
                3,
                envelope("d", "data_peserta", None, Some(json!({ "gold_id": 9 }))),
            )),
        ],
    )
    .await;

    let calls = handler.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation, Operation::Delete);
    assert_eq!(calls[0].before.as_ref().unwrap()["gold_id"], json!(9));
    assert_eq!(acked, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_handler_errors_do_not_stop_the_loop() {
    init_tracing();
    let handler = RecordingHandler::failing("database unavailable");

    let acked = run_script(
        recording_registry(&handler),
        vec![
            Ok(message(TOPIC, 10, envelope("c", "data_peserta", Some(json!({ "gold_id": 1 })), None))),
            Err(Error::Connection("transient broker error".to_string())),
            Ok(message(TOPIC, 11, envelope("u", "data_peserta", Some(json!({ "gold_id": 1 })), None))),
        ],
    )
    .await;

    assert_eq!(handler.call_count(), 2);
    assert_eq!(acked, vec![10, 11]);
}

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    init_tracing();
    let local = Arc::new(RecordingService::new());
    let production = Arc::new(RecordingService::new());
    let resources = BootResources::new(local.clone(), production.clone());
    let registry = Arc::new(build_registry(&resources, Direction::LocalToProd.destination()));

    let create = envelope("c", "data_peserta", Some(member_row(5, "a@b.com")), None);
    run_script(
        registry,
        vec![
            Ok(message(TOPIC, 0, create.clone())),
            Ok(message(TOPIC, 0, create)),
        ],
    )
    .await;

    assert_eq!(
        production.calls(),
        vec![ServiceCall::InsertMember(5), ServiceCall::InsertMember(5)]
    );
    assert_eq!(production.member_count(), 1);
    let member = production.member(5).unwrap();
    assert_eq!(member.gold_email, "a@b.com");
    assert_eq!(member.gold_expireddate, "20230928");
    assert!(local.calls().is_empty());
}

fn specs() -> Vec<ConsumerSpec> {
    vec![
        ConsumerSpec {
            direction: Direction::LocalToProd,
            topic: "cdc.l2p".to_string(),
            group_id: "goldgym-local-to-prod".to_string(),
        },
        ConsumerSpec {
            direction: Direction::ProdToLocal,
            topic: "cdc.p2l".to_string(),
            group_id: "goldgym-prod-to-local".to_string(),
        },
    ]
}

fn fast_policy() -> RestartPolicy {
    RestartPolicy {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    }
}

async fn wait_for_calls(handler: &RecordingHandler, expected: usize) {
    timeout(Duration::from_secs(5), async {
        while handler.call_count() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("handler was not called in time");
}

#[tokio::test]
async fn test_one_consumer_per_direction() {
    init_tracing();
    let handler = RecordingHandler::new();
    let shutdown = Shutdown::new();

    let mut consumers = start_consumers_with(
        specs(),
        |_| recording_registry(&handler),
        &shutdown,
        Duration::from_millis(5),
        fast_policy(),
        |spec: &ConsumerSpec| {
            Ok(VecSource::new(vec![Ok(message(
                &spec.topic,
                0,
                envelope("c", "data_peserta", Some(json!({ "gold_id": 1 })), None),
            ))]))
        },
    );
    assert_eq!(
        consumers.directions(),
        vec![Direction::LocalToProd, Direction::ProdToLocal]
    );

    wait_for_calls(&handler, 2).await;
    shutdown.trigger();

    let mut stopped = Vec::new();
    while let Some(exit) = timeout(Duration::from_secs(5), consumers.next_exit())
        .await
        .expect("consumers did not report exit")
    {
        assert!(!exit.restarting);
        match exit.reason {
            ExitReason::Shutdown(stats) => assert_eq!(stats.handled, 1),
            other => panic!("unexpected exit: {:?}", other),
        }
        stopped.push(exit.direction);
    }
    stopped.sort_by_key(|d| d.suffix());
    assert_eq!(stopped, vec![Direction::LocalToProd, Direction::ProdToLocal]);

    consumers.join().await;
}

#[tokio::test]
async fn test_failed_source_is_restarted() {
    init_tracing();
    let handler = RecordingHandler::new();
    let shutdown = Shutdown::new();
    let attempts = Arc::new(AtomicUsize::new(0));

    let factory_attempts = attempts.clone();
    let mut consumers = start_consumers_with(
        specs().into_iter().take(1).collect(),
        |_| recording_registry(&handler),
        &shutdown,
        Duration::from_millis(5),
        fast_policy(),
        move |spec: &ConsumerSpec| {
            if factory_attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::Connection("broker unreachable".to_string()));
            }
            Ok(VecSource::new(vec![Ok(message(
                &spec.topic,
                7,
                envelope("c", "data_peserta", Some(json!({ "gold_id": 2 })), None),
            ))]))
        },
    );

    let first = timeout(Duration::from_secs(5), consumers.next_exit())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.direction, Direction::LocalToProd);
    assert_eq!(first.attempt, 1);
    assert!(first.restarting);
    assert!(matches!(first.reason, ExitReason::SourceFailed(ref msg) if msg.contains("broker unreachable")));

    wait_for_calls(&handler, 1).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    shutdown.trigger();
    let last = timeout(Duration::from_secs(5), consumers.next_exit())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.attempt, 2);
    assert!(!last.restarting);
    assert!(matches!(last.reason, ExitReason::Shutdown(_)));

    consumers.join().await;
}

#[tokio::test]
async fn test_no_specs_starts_nothing() {
    let shutdown = Shutdown::new();
    let mut consumers = start_consumers_with(
        Vec::new(),
        |_| Arc::new(Registry::default()),
        &shutdown,
        Duration::from_millis(5),
        RestartPolicy::default(),
        |_: &ConsumerSpec| Ok(VecSource::new(Vec::new())),
    );

    assert!(consumers.is_empty());
    assert!(consumers.next_exit().await.is_none());
    consumers.join().await;
}

async fn wait_for_service_calls(service: &RecordingService, expected: usize) {
    timeout(Duration::from_secs(5), async {
        while service.calls().len() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("service was not called in time");
}

#[tokio::test]
async fn test_each_direction_writes_to_the_other_database() {
    init_tracing();
    let local = Arc::new(RecordingService::new());
    let production = Arc::new(RecordingService::new());
    let resources = BootResources::new(local.clone(), production.clone());
    let shutdown = Shutdown::new();

    let mut consumers = start_consumers_with(
        specs(),
        |direction| Arc::new(build_registry(&resources, direction.destination())),
        &shutdown,
        Duration::from_millis(5),
        fast_policy(),
        |spec: &ConsumerSpec| {
            let gold_id = match spec.direction {
                Direction::LocalToProd => 6,
                Direction::ProdToLocal => 5,
            };
            let row = member_row(gold_id, "a@b.com");
            Ok(VecSource::new(vec![Ok(message(
                &spec.topic,
                0,
                envelope("u", "data_peserta", Some(row.clone()), Some(row)),
            ))]))
        },
    );

    wait_for_service_calls(&local, 1).await;
    wait_for_service_calls(&production, 1).await;
    shutdown.trigger();
    while consumers.next_exit().await.is_some() {}
    consumers.join().await;

    assert_eq!(local.calls(), vec![ServiceCall::UpdateMember(5)]);
    assert_eq!(production.calls(), vec![ServiceCall::UpdateMember(6)]);
}

#[tokio::test]
async fn test_tombstone_after_delete_is_not_a_decode_failure() {
    init_tracing();
    let handler = RecordingHandler::new();
    let shutdown = Shutdown::new();
    let tombstone = BrokerMessage {
        payload: None,
        ..message(TOPIC, 1, "")
    };
    let source = VecSource::new(vec![
        Ok(message(
            TOPIC,
            0,
            envelope("d", "data_peserta", None, Some(json!({ "gold_id": 9 }))),
        )),
        Ok(tombstone),
    ])
    .shutdown_when_drained(shutdown.clone());
    let acked = source.acked();

    let stats = ConsumerLoop::new("pipeline-test", source, recording_registry(&handler), shutdown.subscribe())
        .run()
        .await;

    assert_eq!(stats.handled, 1);
    assert_eq!(stats.tombstones, 1);
    assert_eq!(stats.decode_failed, 0);
    assert_eq!(*acked.lock().unwrap(), vec![0, 1]);
}
