//! Shared helpers for chat integration tests

#![allow(dead_code)]

use std::time::Duration;

use acolhe_core::SyncEvent;
use acolhe_domain::{Config, LiveItem, SyncState};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::broadcast;

const EVENT_WAIT: Duration = Duration::from_secs(3);

/// Configuration pointing at `base_url` with millisecond backoff.
pub fn fast_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.api.base_url = base_url.to_string();
    config.http.initial_delay_ms = 1;
    config.http.max_delay_ms = 5;
    config.live.join_timeout_ms = 1_000;
    config
}

/// Wire representation of a message in C1 sent at `secs` seconds after the epoch.
pub fn wire_message(id: &str, secs: i64) -> Value {
    wire_message_in("C1", id, secs)
}

pub fn wire_message_in(conversation: &str, id: &str, secs: i64) -> Value {
    json!({
        "id": id,
        "conversation_id": conversation,
        "sender_id": "u1",
        "body": format!("message {id}"),
        "created_at": Utc.timestamp_opt(secs, 0).unwrap(),
    })
}

pub fn history_page(messages: &[Value]) -> Value {
    json!({ "messages": messages, "next_cursor": null })
}

pub fn live_item(id: &str, secs: i64) -> LiveItem {
    live_item_in("C1", id, secs)
}

pub fn live_item_in(conversation: &str, id: &str, secs: i64) -> LiveItem {
    serde_json::from_value(wire_message_in(conversation, id, secs)).expect("valid live item")
}

/// Next published snapshot, as message ids.
pub async fn next_snapshot(events: &mut broadcast::Receiver<SyncEvent>) -> Vec<String> {
    loop {
        match next_event(events).await {
            SyncEvent::Snapshot(snapshot) => {
                return snapshot.ids().into_iter().map(str::to_string).collect();
            }
            _ => continue,
        }
    }
}

/// Wait until the engine reports `state`.
pub async fn wait_for_state(events: &mut broadcast::Receiver<SyncEvent>, state: SyncState) {
    loop {
        if let SyncEvent::StateChanged(current) = next_event(events).await {
            if current == state {
                return;
            }
        }
    }
}

async fn next_event(events: &mut broadcast::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(EVENT_WAIT, events.recv())
        .await
        .expect("timed out waiting for a sync event")
        .expect("event log closed")
}
