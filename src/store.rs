use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Order;

// ============================================================================
// Order Store
// ============================================================================
//
// Concurrency-safe keyed store of orders, the single source of truth queried
// by the HTTP layer and mutated by the pipeline stages. Per-key mutation runs
// under the write lock as one critical section, so stage updates to the same
// order can never interleave.
//
// ============================================================================

#[derive(Default)]
pub struct OrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }

    pub async fn get(&self, id: Uuid) -> Option<Order> {
        self.orders.read().await.get(&id).cloned()
    }

    /// Snapshot of every stored order.
    pub async fn list(&self) -> Vec<Order> {
        self.orders.read().await.values().cloned().collect()
    }

    /// Atomic read-modify-write on a single order. Returns the updated order,
    /// or `None` when the id is absent (nothing is written).
    pub async fn update<F>(&self, id: Uuid, mutate: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id)?;
        mutate(order);
        Some(order.clone())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
