//! End-to-end chat synchronization over HTTP and the in-process push hub

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acolhe_common::assert_eventually_async;
use acolhe_common::testing::timeout_ok;
use acolhe_domain::{ConversationId, SyncState, UserId};
use acolhe_infra::{
    build_engine, build_engine_with_transport, BroadcastPushChannel, RetryingTransportBuilder,
};
use support::{
    fast_config, history_page, live_item, live_item_in, next_snapshot, wait_for_state,
    wire_message, wire_message_in,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const HISTORY_PATH: &str = "/conversations/C1/messages";

async fn hits(server: &MockServer, route: &str) -> usize {
    let requests = server.received_requests().await.unwrap_or_default();
    requests.iter().filter(|request| request.url.path() == route).count()
}

async fn wait_for_subscriber(hub: &BroadcastPushChannel, conversation: &ConversationId) {
    assert_eventually_async!(Duration::from_secs(2), async {
        hub.subscriber_count(conversation) > 0
    });
}

#[tokio::test]
async fn live_messages_merge_into_history_in_display_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(history_page(&[
            wire_message("1", 10),
            wire_message("2", 20),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let hub = Arc::new(BroadcastPushChannel::default());
    let conversation = ConversationId::from("C1");
    let mut engine = build_engine(&fast_config(&server.uri()), hub.clone()).unwrap();
    let mut events = engine.subscribe();

    engine.start(conversation.clone()).await.unwrap();
    assert_eq!(next_snapshot(&mut events).await, vec!["1", "2"]);
    wait_for_state(&mut events, SyncState::Listening).await;
    wait_for_subscriber(&hub, &conversation).await;

    hub.inject(&conversation, live_item("3", 15));
    assert_eq!(next_snapshot(&mut events).await, vec!["1", "3", "2"]);

    // A repeat of a known id must not publish
    hub.inject(&conversation, live_item("2", 20));
    hub.inject(&conversation, live_item("4", 30));
    assert_eq!(next_snapshot(&mut events).await, vec!["1", "3", "2", "4"]);

    assert_eq!(engine.state(), SyncState::Listening);
    assert_eq!(engine.snapshot().len(), 4);
    engine.stop().await;
}

#[tokio::test]
async fn restart_fetches_history_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(history_page(&[wire_message("1", 10)])),
        )
        .expect(2)
        .mount(&server)
        .await;

    let hub = Arc::new(BroadcastPushChannel::default());
    let mut engine = build_engine(&fast_config(&server.uri()), hub).unwrap();
    let mut events = engine.subscribe();

    engine.start(ConversationId::from("C1")).await.unwrap();
    wait_for_state(&mut events, SyncState::Listening).await;
    engine.stop().await;
    assert_eq!(engine.state(), SyncState::Idle);

    engine.start(ConversationId::from("C1")).await.unwrap();
    wait_for_state(&mut events, SyncState::Listening).await;
    assert_eq!(engine.snapshot().ids(), vec!["1"]);
    engine.stop().await;
}

#[tokio::test]
async fn sent_message_arrives_through_the_push_channel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(history_page(&[wire_message("1", 10)])),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(201).set_body_json(wire_message("9", 40)))
        .expect(1)
        .mount(&server)
        .await;

    let hub = Arc::new(BroadcastPushChannel::default());
    let conversation = ConversationId::from("C1");
    let mut engine = build_engine(&fast_config(&server.uri()), hub.clone()).unwrap();
    let mut events = engine.subscribe();

    engine.start(conversation.clone()).await.unwrap();
    wait_for_state(&mut events, SyncState::Listening).await;
    wait_for_subscriber(&hub, &conversation).await;

    let created =
        engine.send_message(&conversation, &UserId::from("u1"), "olá").await.unwrap();
    assert_eq!(created.id.as_str(), "9");
    assert_eq!(next_snapshot(&mut events).await, vec!["1", "9"]);
    engine.stop().await;
}

#[tokio::test]
async fn dropped_connection_catches_up_from_history() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(move |_: &Request| {
            let messages = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                vec![wire_message("1", 10), wire_message("2", 20)]
            } else {
                vec![wire_message("1", 10), wire_message("2", 20), wire_message("5", 25)]
            };
            ResponseTemplate::new(200).set_body_json(history_page(&messages))
        })
        .mount(&server)
        .await;

    let hub = Arc::new(BroadcastPushChannel::default());
    let conversation = ConversationId::from("C1");
    let mut engine = build_engine(&fast_config(&server.uri()), hub.clone()).unwrap();
    let mut events = engine.subscribe();

    engine.start(conversation.clone()).await.unwrap();
    assert_eq!(next_snapshot(&mut events).await, vec!["1", "2"]);
    wait_for_subscriber(&hub, &conversation).await;

    hub.disconnect(&conversation);

    assert_eq!(next_snapshot(&mut events).await, vec!["1", "2", "5"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.state(), SyncState::Listening);
    engine.stop().await;
}

#[tokio::test]
async fn history_failure_is_reported_and_recoverable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(history_page(&[wire_message("1", 10)])),
        )
        .mount(&server)
        .await;

    let hub = Arc::new(BroadcastPushChannel::default());
    let mut engine = build_engine(&fast_config(&server.uri()), hub).unwrap();
    let mut events = engine.subscribe();

    engine.start(ConversationId::from("C1")).await.unwrap();
    wait_for_state(&mut events, SyncState::Error).await;
    assert!(engine.last_error().is_some());
    assert!(engine.snapshot().is_empty());

    engine.start(ConversationId::from("C1")).await.unwrap();
    assert_eq!(next_snapshot(&mut events).await, vec!["1"]);
    assert!(engine.last_error().is_none());
    engine.stop().await;
}

#[tokio::test]
async fn stopping_one_session_spares_others_on_the_same_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations/C2/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(history_page(&[wire_message_in("C2", "1", 10)])),
        )
        .mount(&server)
        .await;

    // Retry backoff and join timeout far beyond the stop budget below
    let mut config = fast_config(&server.uri());
    config.http.initial_delay_ms = 30_000;
    config.http.max_delay_ms = 30_000;
    config.live.join_timeout_ms = 10_000;
    let transport = Arc::new(RetryingTransportBuilder::from_config(&config.http).build().unwrap());
    let hub = Arc::new(BroadcastPushChannel::default());
    let mut stalled =
        build_engine_with_transport(&config, Arc::clone(&transport), hub.clone()).unwrap();
    let mut listening = build_engine_with_transport(&config, transport, hub.clone()).unwrap();

    let other = ConversationId::from("C2");
    let mut events = listening.subscribe();
    listening.start(other.clone()).await.unwrap();
    assert_eq!(next_snapshot(&mut events).await, vec!["1"]);
    wait_for_state(&mut events, SyncState::Listening).await;
    wait_for_subscriber(&hub, &other).await;

    stalled.start(ConversationId::from("C1")).await.unwrap();
    assert_eventually_async!(Duration::from_secs(2), async {
        hits(&server, HISTORY_PATH).await == 1
    });

    // The first 503 leaves the fetch sleeping before its retry
    let stopped = timeout_ok(Duration::from_secs(1), stalled.stop()).await;
    assert!(stopped.is_ok(), "stop waited for the retry backoff");
    assert_eq!(stalled.state(), SyncState::Idle);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hits(&server, HISTORY_PATH).await, 1);

    assert_eq!(listening.state(), SyncState::Listening);
    assert_eq!(hub.subscriber_count(&other), 1);
    hub.inject(&other, live_item_in("C2", "2", 20));
    assert_eq!(next_snapshot(&mut events).await, vec!["1", "2"]);
    listening.stop().await;
}
