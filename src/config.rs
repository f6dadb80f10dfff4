use anyhow::Context;

// ============================================================================
// Configuration - environment driven, .env aware
// ============================================================================
//
// Everything except DATABASE_URL has a development default. Log verbosity
// is not configured here; it follows RUST_LOG through the tracing
// subscriber's env filter.
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub postgres: PostgresConfig,
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub addr: String,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            http: HttpConfig {
                addr: env_or("HTTP_ADDR", "0.0.0.0:8081"),
            },
            postgres: PostgresConfig {
                url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
                max_connections: env_or("PG_MAX_CONNECTIONS", "10")
                    .parse()
                    .context("PG_MAX_CONNECTIONS must be an integer")?,
            },
            kafka: KafkaConfig {
                brokers: env_or("KAFKA_BROKERS", "127.0.0.1:9092"),
                topic: env_or("KAFKA_TOPIC", "orders"),
                group_id: env_or("KAFKA_GROUP_ID", "order-service"),
            },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
