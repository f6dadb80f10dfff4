use std::time::Duration;

use anyhow::Context;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

// ============================================================================
// Test Producer - publish one order payload to the orders topic
// ============================================================================
//
// Standalone helper for exercising the pipeline by hand; it shares no code
// with the service. Pass a path to a JSON file to publish its contents, or
// run without arguments to publish the embedded sample order.
//
//   KAFKA_BROKERS=127.0.0.1:9092 KAFKA_TOPIC=orders cargo run --bin send_order
//
// ============================================================================

const SAMPLE_ORDER: &str = r#"{
    "order_uid": "my-first-test-order-01",
    "track_number": "WBILMTESTTRACK",
    "entry": "WBIL",
    "delivery": { "name": "Ivan Ivanov", "phone": "+9720000000", "zip": "2639809", "city": "Moscow", "address": "Mira street 15", "region": "Moscow Region", "email": "test@gmail.com" },
    "payment": { "transaction": "my-first-test-order-01", "request_id": "", "currency": "USD", "provider": "wbpay", "amount": 1817, "payment_dt": 1637907727, "bank": "alpha", "delivery_cost": 1500, "goods_total": 317, "custom_fee": 0 },
    "items": [ { "chrt_id": 9934930, "track_number": "WBILMTESTTRACK", "price": 453, "rid": "ab4219087a764ae0btest", "name": "Mascaras", "sale": 30, "size": "0", "total_price": 317, "nm_id": 2389222, "brand": "Vivienne Sabo", "status": 202 } ],
    "locale": "en",
    "internal_signature": "",
    "customer_id": "test",
    "delivery_service": "meest",
    "shardkey": "9",
    "sm_id": 99,
    "date_created": "2021-11-26T06:22:19Z",
    "oof_shard": "1"
}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let brokers = std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "127.0.0.1:9092".to_string());
    let topic = std::env::var("KAFKA_TOPIC").unwrap_or_else(|_| "orders".to_string());

    let payload = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read payload from {path}"))?,
        None => SAMPLE_ORDER.to_string(),
    };

    // Key by order_uid when the payload has one, so redeliveries of the
    // same order land on the same partition.
    let key = serde_json::from_str::<serde_json::Value>(&payload)
        .ok()
        .and_then(|v| v["order_uid"].as_str().map(str::to_string))
        .unwrap_or_default();

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("message.timeout.ms", "5000")
        .create()
        .context("failed to create kafka producer")?;

    println!("sending order to {topic} via {brokers}...");

    producer
        .send(
            FutureRecord::to(&topic).key(&key).payload(&payload),
            rdkafka::util::Timeout::After(Duration::from_secs(5)),
        )
        .await
        .map_err(|(err, _)| anyhow::anyhow!("kafka send error: {err}"))?;

    println!("message sent successfully");
    Ok(())
}
