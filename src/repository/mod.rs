use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::PostgresConfig;

mod order;

pub use order::OrderRepository;

// ============================================================================
// Postgres bootstrap - connection pool and schema
// ============================================================================

/// Build the shared connection pool. Both the consumer loop and the read
/// path borrow connections from here; the pool does its own locking.
pub async fn connect(cfg: &PostgresConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect(&cfg.url)
        .await
}

/// Create the four aggregate tables if they are missing.
///
/// Note: payments.transaction_uid carries no foreign key on purpose. The
/// read path joins on order_uid = transaction_uid; a producer that breaks
/// that equality orphans the payment row from reads rather than failing
/// the insert, which matches the ingest contract.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    const STATEMENTS: &[&str] = &[
        "CREATE TABLE IF NOT EXISTS orders (
            order_uid          TEXT PRIMARY KEY,
            track_number       TEXT NOT NULL,
            entry              TEXT NOT NULL DEFAULT '',
            locale             TEXT NOT NULL,
            internal_signature TEXT NOT NULL DEFAULT '',
            customer_id        TEXT NOT NULL,
            delivery_service   TEXT NOT NULL DEFAULT '',
            shardkey           TEXT NOT NULL DEFAULT '',
            sm_id              INTEGER NOT NULL DEFAULT 0,
            date_created       TIMESTAMPTZ NOT NULL,
            oof_shard          TEXT NOT NULL DEFAULT ''
        )",
        "CREATE TABLE IF NOT EXISTS deliveries (
            order_uid TEXT PRIMARY KEY REFERENCES orders (order_uid),
            name      TEXT NOT NULL,
            phone     TEXT NOT NULL,
            zip       TEXT NOT NULL,
            city      TEXT NOT NULL,
            address   TEXT NOT NULL,
            region    TEXT NOT NULL DEFAULT '',
            email     TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS payments (
            transaction_uid TEXT PRIMARY KEY,
            request_id      TEXT NOT NULL DEFAULT '',
            currency        TEXT NOT NULL,
            provider        TEXT NOT NULL DEFAULT '',
            amount          INTEGER NOT NULL,
            payment_dt      BIGINT NOT NULL,
            bank            TEXT NOT NULL DEFAULT '',
            delivery_cost   INTEGER NOT NULL,
            goods_total     INTEGER NOT NULL,
            custom_fee      INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE TABLE IF NOT EXISTS items (
            id           BIGSERIAL PRIMARY KEY,
            order_uid    TEXT NOT NULL REFERENCES orders (order_uid),
            chrt_id      BIGINT NOT NULL,
            track_number TEXT NOT NULL,
            price        INTEGER NOT NULL,
            rid          TEXT NOT NULL DEFAULT '',
            name         TEXT NOT NULL DEFAULT '',
            sale         INTEGER NOT NULL DEFAULT 0,
            size         TEXT NOT NULL DEFAULT '',
            total_price  INTEGER NOT NULL DEFAULT 0,
            nm_id        BIGINT NOT NULL DEFAULT 0,
            brand        TEXT NOT NULL DEFAULT '',
            status       INTEGER NOT NULL DEFAULT 0
        )",
    ];

    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::debug!("order schema verified");
    Ok(())
}
