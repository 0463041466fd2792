#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use eventscope::{
    setup_local_tracing, BrowserConfig, BrowserSession, EventData, HubDefinition, MemoryConnector,
    MemoryHub,
};
use serde_json::json;

pub const NAMESPACE: &str = "ns";
pub const HUB: &str = "orders";
pub const HUB_ID: &str = "ns/orders";

pub fn init_tracing() {
    setup_local_tracing().expect("failed to setup tracing");
}

pub fn definition() -> HubDefinition {
    serde_json::from_value(json!({
        "sasKey": "secret-key",
        "eventHubNamespace": NAMESPACE,
        "eventHubName": HUB,
        "sasKeyName": "reader",
    }))
    .unwrap()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

/// Publishes `count` events to `partition_id`, the i-th enqueued at `at(start + i)`.
pub fn publish(hub: &MemoryHub, partition_id: &str, count: i64, start: i64) {
    for i in 0..count {
        let event = EventData::new(format!("{{\"n\":{}}}", i)).with_enqueued_time(at(start + i));
        hub.publish(partition_id, event).unwrap();
    }
}

/// A session with `hub` registered under the default definition.
pub async fn session_with(hub: &MemoryHub, config: BrowserConfig) -> BrowserSession {
    let connector = Arc::new(MemoryConnector::new());
    connector.register(hub.clone());
    let session = BrowserSession::new(config, connector);
    session.create_hub(&definition()).await.unwrap();
    session
}
