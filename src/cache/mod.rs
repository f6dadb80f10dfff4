use dashmap::DashMap;

use crate::model::Order;
use crate::service::OrderCache;

// ============================================================================
// In-Memory Order Cache
// ============================================================================
//
// Read-through mirror of durable orders, keyed by order_uid. Backed by a
// sharded concurrent map, so readers and writers never take an external
// lock. Entries are never evicted; the cache lives as long as the process
// and grows with the order set. That ceiling is deliberate.
//
// Concurrent writes for the same uid resolve by completion order (last
// writer wins); nothing tracks versions or timestamps.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryCache {
    storage: DashMap<String, Order>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderCache for InMemoryCache {
    fn set(&self, order: Order) {
        self.storage.insert(order.order_uid.clone(), order);
    }

    fn get(&self, order_uid: &str) -> Option<Order> {
        self.storage.get(order_uid).map(|entry| entry.value().clone())
    }

    fn load_all(&self, orders: Vec<Order>) {
        for order in orders {
            self.set(order);
        }
    }

    fn len(&self) -> usize {
        self.storage.len()
    }
}
