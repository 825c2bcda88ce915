#![allow(dead_code)]

use goldgym_cdc::config::{KafkaConfig, TopicsConfig};
use goldgym_cdc::kafka::BrokerMessage;
use serde_json::{json, Value};
use std::env;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("goldgym_cdc=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// Debezium-style envelope for `table`.
pub fn envelope(op: &str, table: &str, after: Option<Value>, before: Option<Value>) -> String {
    let mut payload = json!({
        "op": op,
        "source": { "table": table, "db": "goldgym" },
    });
    if let Some(after) = after {
        payload["after"] = after;
    }
    if let Some(before) = before {
        payload["before"] = before;
    }
    json!({ "payload": payload }).to_string()
}

pub fn message(topic: &str, offset: i64, payload: impl Into<String>) -> BrokerMessage {
    BrokerMessage::new(topic, 0, offset, payload.into())
}

pub fn member_row(gold_id: i64, email: &str) -> Value {
    json!({
        "gold_id": gold_id,
        "gold_email": email,
        "gold_password": "hash",
        "gold_nama": "Budi",
        "gold_nomorhp": "08123",
        "gold_nomorkartu": "4111111111111111",
        "gold_cvv": "123",
        "gold_expireddate": 1695859200000i64,
        "gold_namapemegangkartu": "BUDI",
        "gold_otp": null,
    })
}

/// Kafka settings from `TEST_KAFKA_BROKERS`, with per-process topic and group names.
pub fn get_test_kafka_config() -> KafkaConfig {
    let suffix = std::process::id();
    KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        group_id: format!("test_goldgym_{}", suffix),
        topics: TopicsConfig {
            local_to_prod: Some(format!("test_local_to_prod_{}", suffix)),
            prod_to_local: None,
        },
        retry_backoff_ms: 100,
        session_timeout_ms: 10_000,
        auto_commit_interval_ms: 100,
    }
}
