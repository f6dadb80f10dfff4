use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cache;
mod config;
mod error;
mod messaging;
mod metrics;
mod model;
mod repository;
mod service;

use api::ApiContext;
use cache::InMemoryCache;
use config::Config;
use messaging::OrderConsumer;
use metrics::Metrics;
use repository::OrderRepository;
use service::{OrderCache, OrderService, OrderStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // === 1. Configuration ===
    let cfg = Config::from_env()?;

    // === 2. Structured logging with environment-based filtering ===
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_service=debug")),
        )
        .init();

    tracing::info!("starting order-service");

    // === 3. Storage pool and schema ===
    let pool = repository::connect(&cfg.postgres).await?;
    repository::ensure_schema(&pool).await?;
    tracing::info!("connected to postgres");

    // === 4. Metrics, cache, orchestrator ===
    let metrics = Arc::new(Metrics::new()?);
    let cache: Arc<dyn OrderCache> = Arc::new(InMemoryCache::new());
    let store: Arc<dyn OrderStore> = Arc::new(OrderRepository::new(pool.clone()));
    let service = Arc::new(OrderService::new(store, cache, metrics.clone()));

    // === 5. Cache warm-up; the service runs fine with a cold cache ===
    if let Err(err) = service.restore_cache().await {
        tracing::error!(error = %err, "cache restore failed, continuing with an empty cache");
    }

    // === 6. Consumer loop ===
    let shutdown = CancellationToken::new();
    let consumer = OrderConsumer::new(&cfg.kafka, service.clone(), metrics.clone())?;
    let consumer_task = tokio::spawn({
        let token = shutdown.clone();
        async move { consumer.run(token).await }
    });

    // === 7. Read API, started last so reads never precede the warm-up ===
    let server = api::start_http_server(
        &cfg.http.addr,
        ApiContext {
            orders: service,
            registry: metrics.registry().clone(),
        },
    )?;
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);
    tracing::info!(addr = %cfg.http.addr, "http server listening");

    // === 8. Graceful shutdown ===
    wait_for_signal().await;
    tracing::info!("shutting down");

    // Stop fetching; the in-flight message finishes before the task joins.
    shutdown.cancel();
    if let Err(err) = consumer_task.await {
        tracing::error!(error = %err, "consumer task panicked");
    }

    // Bounded drain of in-flight requests.
    server_handle.stop(true).await;
    if let Err(err) = server_task.await {
        tracing::error!(error = %err, "http server task failed");
    }

    // Connections are released only after both loops have stopped.
    pool.close().await;
    tracing::info!("order-service stopped");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
