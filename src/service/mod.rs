use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::OrderError;
use crate::metrics::Metrics;
use crate::model::Order;

// ============================================================================
// Order Service - consistency discipline between storage and cache
// ============================================================================
//
// The repository is the source of truth, the cache a best-effort mirror:
//
// - create_order is write-through, durable-first: the cache is updated only
//   after the transaction commits, so the cache can never hold an order
//   that is not durably stored. The inverse does not hold; a crash between
//   commit and the cache write heals on the next lookup or restart.
// - get_order_by_uid is cache-aside: hit returns immediately, miss falls
//   back to storage and populates the cache. NotFound is never cached.
// - restore_cache hydrates the cache at startup; its failure is tolerated,
//   the service just runs slower through cache misses.
//
// The traits below are narrow role contracts. The orchestrator consumes
// OrderStore and OrderCache; the consumer and the HTTP layer each consume
// only the single capability they need, which keeps fakes trivial in tests.
//
// ============================================================================

/// Durable, transactional order storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: &Order) -> Result<(), OrderError>;
    async fn get_order_by_uid(&self, uid: &str) -> Result<Order, OrderError>;
    async fn get_all_orders(&self) -> Result<Vec<Order>, OrderError>;
}

/// In-memory order mirror. Operations cannot fail and need no external lock.
pub trait OrderCache: Send + Sync {
    fn set(&self, order: Order);
    fn get(&self, order_uid: &str) -> Option<Order>;
    fn load_all(&self, orders: Vec<Order>);
    fn len(&self) -> usize;
}

/// Capability consumed by the Kafka side of the pipeline.
#[async_trait]
pub trait OrderCreator: Send + Sync {
    async fn create_order(&self, order: Order) -> Result<(), OrderError>;
}

/// Capability consumed by the read API.
#[async_trait]
pub trait OrderGetter: Send + Sync {
    async fn get_order_by_uid(&self, uid: &str) -> Result<Order, OrderError>;
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<dyn OrderCache>, metrics: Arc<Metrics>) -> Self {
        Self { store, cache, metrics }
    }

    /// Hydrate the cache from storage at startup. Callers treat a failure
    /// here as non-fatal; the service operates correctly with a cold cache.
    pub async fn restore_cache(&self) -> Result<(), OrderError> {
        tracing::info!("restoring order cache from storage");

        let orders = self.store.get_all_orders().await.map_err(|err| {
            tracing::error!(error = %err, "failed to load orders for cache restore");
            err
        })?;

        let count = orders.len();
        self.cache.load_all(orders);
        self.metrics.cache_size.set(self.cache.len() as i64);

        tracing::info!(orders = count, "order cache restored");
        Ok(())
    }
}

#[async_trait]
impl OrderCreator for OrderService {
    async fn create_order(&self, order: Order) -> Result<(), OrderError> {
        let started = Instant::now();

        // Storage first. On failure the cache stays untouched, so it can
        // never report an order that was not durably written.
        self.store.create_order(&order).await.map_err(|err| {
            tracing::error!(
                order_uid = %order.order_uid,
                error = %err,
                "failed to persist order"
            );
            err
        })?;

        self.metrics.persist_duration.observe(started.elapsed().as_secs_f64());
        self.metrics.orders_created.inc();

        self.cache.set(order.clone());
        self.metrics.cache_size.set(self.cache.len() as i64);

        tracing::info!(order_uid = %order.order_uid, "order created and cached");
        Ok(())
    }
}

#[async_trait]
impl OrderGetter for OrderService {
    async fn get_order_by_uid(&self, uid: &str) -> Result<Order, OrderError> {
        if let Some(order) = self.cache.get(uid) {
            self.metrics.cache_hits.inc();
            tracing::debug!(order_uid = %uid, "order served from cache");
            return Ok(order);
        }

        self.metrics.cache_misses.inc();
        tracing::debug!(order_uid = %uid, "cache miss, falling back to storage");

        let order = self.store.get_order_by_uid(uid).await.map_err(|err| {
            // An absent order is a well-defined outcome, not a fault.
            if !matches!(err, OrderError::NotFound) {
                tracing::error!(order_uid = %uid, error = %err, "failed to read order from storage");
            }
            err
        })?;

        // Populate so the next lookup for this uid is a hit.
        self.cache.set(order.clone());
        self.metrics.cache_size.set(self.cache.len() as i64);

        tracing::info!(order_uid = %uid, "order read from storage and cached");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::model::testdata::sample_order;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        orders: Mutex<HashMap<String, Order>>,
        fail_create: bool,
        fail_get_all: bool,
        get_calls: AtomicUsize,
    }

    impl FakeStore {
        fn with_orders(orders: Vec<Order>) -> Self {
            let map = orders.into_iter().map(|o| (o.order_uid.clone(), o)).collect();
            Self { orders: Mutex::new(map), ..Default::default() }
        }
    }

    #[async_trait]
    impl OrderStore for FakeStore {
        async fn create_order(&self, order: &Order) -> Result<(), OrderError> {
            if self.fail_create {
                return Err(OrderError::Storage(sqlx::Error::PoolClosed));
            }
            let mut orders = self.orders.lock().unwrap();
            if orders.contains_key(&order.order_uid) {
                return Err(OrderError::Duplicate(order.order_uid.clone()));
            }
            orders.insert(order.order_uid.clone(), order.clone());
            Ok(())
        }

        async fn get_order_by_uid(&self, uid: &str) -> Result<Order, OrderError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.orders
                .lock()
                .unwrap()
                .get(uid)
                .cloned()
                .ok_or(OrderError::NotFound)
        }

        async fn get_all_orders(&self) -> Result<Vec<Order>, OrderError> {
            if self.fail_get_all {
                return Err(OrderError::Storage(sqlx::Error::PoolClosed));
            }
            Ok(self.orders.lock().unwrap().values().cloned().collect())
        }
    }

    fn service_with(store: FakeStore) -> (Arc<FakeStore>, Arc<InMemoryCache>, OrderService) {
        let store = Arc::new(store);
        let cache = Arc::new(InMemoryCache::new());
        let service = OrderService::new(
            store.clone(),
            cache.clone(),
            Arc::new(Metrics::new().unwrap()),
        );
        (store, cache, service)
    }

    #[tokio::test]
    async fn create_then_lookup_returns_identical_order() {
        let (store, _, service) = service_with(FakeStore::default());
        let order = sample_order();

        service.create_order(order.clone()).await.unwrap();

        let found = service.get_order_by_uid(&order.order_uid).await.unwrap();
        assert_eq!(found, order);
        // Served from cache, storage read path untouched
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_create_leaves_no_cache_entry() {
        let (_, cache, service) = service_with(FakeStore { fail_create: true, ..Default::default() });
        let order = sample_order();

        let err = service.create_order(order.clone()).await.unwrap_err();
        assert!(matches!(err, OrderError::Storage(_)));
        assert_eq!(cache.len(), 0);
        assert!(cache.get(&order.order_uid).is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_surfaced_and_cache_untouched() {
        let order = sample_order();
        let (_, _, service) = service_with(FakeStore::with_orders(vec![order.clone()]));

        let err = service.create_order(order).await.unwrap_err();
        assert!(matches!(err, OrderError::Duplicate(_)));
    }

    #[tokio::test]
    async fn lookup_miss_populates_cache() {
        let order = sample_order();
        let (store, cache, service) = service_with(FakeStore::with_orders(vec![order.clone()]));

        let first = service.get_order_by_uid(&order.order_uid).await.unwrap();
        assert_eq!(first, order);
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 1);
        assert!(cache.get(&order.order_uid).is_some());

        // Second lookup is a cache hit
        let second = service.get_order_by_uid(&order.order_uid).await.unwrap();
        assert_eq!(second, order);
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_is_propagated_and_never_cached() {
        let (store, cache, service) = service_with(FakeStore::default());

        for _ in 0..3 {
            let err = service.get_order_by_uid("unknown-id").await.unwrap_err();
            assert!(matches!(err, OrderError::NotFound));
        }

        // No negative caching: every lookup re-queries storage
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn restore_cache_loads_every_stored_order() {
        let mut orders = Vec::new();
        for i in 0..4 {
            let mut order = sample_order();
            order.order_uid = format!("uid-{i}");
            orders.push(order);
        }
        let (store, cache, service) = service_with(FakeStore::with_orders(orders));

        service.restore_cache().await.unwrap();

        assert_eq!(cache.len(), 4);
        let found = service.get_order_by_uid("uid-2").await.unwrap();
        assert_eq!(found.order_uid, "uid-2");
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restore_cache_over_empty_storage_is_ok() {
        let (_, cache, service) = service_with(FakeStore::default());
        service.restore_cache().await.unwrap();
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn restore_cache_failure_is_surfaced_for_caller_to_tolerate() {
        let (_, cache, service) = service_with(FakeStore { fail_get_all: true, ..Default::default() });

        let err = service.restore_cache().await.unwrap_err();
        assert!(matches!(err, OrderError::Storage(_)));
        assert_eq!(cache.len(), 0);
    }
}
