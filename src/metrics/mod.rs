use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Tracks the health of the ingestion pipeline and the read path:
// - Kafka message outcomes (processed, skipped by reason, requeued)
// - Persistence latency
// - Cache effectiveness (hits, misses, size)
//
// The registry is exposed in text format on the API server's /metrics route.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Consumer outcomes
    pub messages_processed: IntCounter,
    pub messages_skipped: IntCounterVec,
    pub messages_requeued: IntCounter,

    // Persistence
    pub orders_created: IntCounter,
    pub persist_duration: Histogram,

    // Cache
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub cache_size: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let messages_processed = IntCounter::new(
            "consumer_messages_processed_total",
            "Messages fully processed and committed",
        )?;
        registry.register(Box::new(messages_processed.clone()))?;

        let messages_skipped = IntCounterVec::new(
            Opts::new(
                "consumer_messages_skipped_total",
                "Messages acknowledged without a durable write",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(messages_skipped.clone()))?;

        let messages_requeued = IntCounter::new(
            "consumer_messages_requeued_total",
            "Messages left uncommitted for redelivery",
        )?;
        registry.register(Box::new(messages_requeued.clone()))?;

        let orders_created = IntCounter::new(
            "orders_created_total",
            "Orders durably persisted",
        )?;
        registry.register(Box::new(orders_created.clone()))?;

        let persist_duration = Histogram::with_opts(
            HistogramOpts::new(
                "order_persist_duration_seconds",
                "Duration of the multi-table order insert transaction",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(persist_duration.clone()))?;

        let cache_hits = IntCounter::new("order_cache_hits_total", "Lookups served from cache")?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_misses = IntCounter::new(
            "order_cache_misses_total",
            "Lookups that fell back to storage",
        )?;
        registry.register(Box::new(cache_misses.clone()))?;

        let cache_size = IntGauge::new("order_cache_size", "Orders currently held in cache")?;
        registry.register(Box::new(cache_size.clone()))?;

        Ok(Self {
            registry,
            messages_processed,
            messages_skipped,
            messages_requeued,
            orders_created,
            persist_duration,
            cache_hits,
            cache_misses,
            cache_size,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_skip(&self, reason: &str) {
        self.messages_skipped.with_label_values(&[reason]).inc();
    }
}
