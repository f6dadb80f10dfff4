use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

// ============================================================================
// Order Aggregate
// ============================================================================
//
// The aggregate root plus its three satellites, mirroring the four tables in
// Postgres. Incoming Kafka payloads deserialize straight into these structs;
// unknown fields are ignored, missing required fields fail deserialization
// or validation.
//
// Validation accumulates every violated constraint, so a single bad message
// can report all of its problems at once.
//
// ============================================================================

#[derive(Serialize, Deserialize, Validate, Clone, Debug, PartialEq)]
pub struct Order {
    // Required fields default at the serde level so an absent field shows up
    // as a validation violation (with its siblings), not a decode failure.
    #[serde(default)]
    #[validate(length(min = 1))]
    pub order_uid: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub track_number: String,
    #[serde(default)]
    pub entry: String,
    #[validate(nested)]
    pub delivery: Delivery,
    #[validate(nested)]
    pub payment: Payment,
    #[serde(default)]
    #[validate(length(min = 1), nested)]
    pub items: Vec<Item>,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub locale: String,
    #[serde(default)]
    pub internal_signature: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub customer_id: String,
    #[serde(default)]
    pub delivery_service: String,
    #[serde(default)]
    pub shardkey: String,
    #[serde(default)]
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub oof_shard: String,
}

#[derive(Serialize, Deserialize, Validate, Clone, Debug, PartialEq)]
pub struct Delivery {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub phone: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub zip: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub city: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub address: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    #[validate(email)]
    pub email: String,
}

#[derive(Serialize, Deserialize, Validate, Clone, Debug, PartialEq)]
pub struct Payment {
    /// Expected to equal the owning order's `order_uid`. The read path joins
    /// on this equality, so a producer that breaks it orphans the payment
    /// row from every read query.
    #[serde(default)]
    #[validate(length(min = 1))]
    pub transaction: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub currency: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub amount: i32,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub payment_dt: i64,
    #[serde(default)]
    pub bank: String,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub delivery_cost: i32,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub goods_total: i32,
    #[serde(default)]
    pub custom_fee: i32,
}

#[derive(Serialize, Deserialize, Validate, Clone, Debug, PartialEq)]
pub struct Item {
    #[serde(default)]
    #[validate(range(min = 1))]
    pub chrt_id: i64,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub track_number: String,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub price: i32,
    #[serde(default)]
    pub rid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sale: i32,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub total_price: i32,
    #[serde(default)]
    pub nm_id: i64,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub status: i32,
}
