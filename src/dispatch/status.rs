//! Per-order outcome tracking
//!
//! Background failures are otherwise invisible to the submitting party, so
//! every state change of an order is recorded here and served by the intake
//! routes. Only the most recent orders are retained.

use crate::protocol::messages::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default number of orders kept in the store
pub const DEFAULT_STATUS_CAPACITY: usize = 10_000;

/// Lifecycle state of one order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrderStatus {
    Accepted,
    Processing,
    Relaying { attempt: u32 },
    Delivered,
    Failed { reason: String },
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Failed { .. })
    }
}

/// Latest known state of an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub task_id: Uuid,
    pub drugs_count: usize,
    #[serde(flatten)]
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StoreInner {
    records: HashMap<OrderId, OrderRecord>,
    // Insertion order for eviction
    order: VecDeque<OrderId>,
}

/// Bounded, shared store of order records keyed by order id
#[derive(Debug, Clone)]
pub struct OrderStatusStore {
    inner: Arc<RwLock<StoreInner>>,
    capacity: usize,
}

impl Default for OrderStatusStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_CAPACITY)
    }
}

impl OrderStatusStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            capacity: capacity.max(1),
        }
    }

    /// Start tracking a newly accepted order, replacing any earlier record for the same id
    pub async fn track(&self, order_id: OrderId, task_id: Uuid, drugs_count: usize) {
        let mut inner = self.inner.write().await;

        if inner.records.contains_key(&order_id) {
            inner.order.retain(|id| *id != order_id);
        }

        inner.records.insert(
            order_id,
            OrderRecord {
                order_id,
                task_id,
                drugs_count,
                status: OrderStatus::Accepted,
                updated_at: Utc::now(),
            },
        );
        inner.order.push_back(order_id);

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.records.remove(&evicted);
            }
        }
    }

    /// Update the state of a tracked order
    ///
    /// Updates carrying a task id other than the tracked one are ignored, so a
    /// stale task cannot overwrite the record of a later resubmission.
    pub async fn update(&self, order_id: OrderId, task_id: Uuid, status: OrderStatus) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.records.get_mut(&order_id) {
            if record.task_id == task_id {
                record.status = status;
                record.updated_at = Utc::now();
            }
        }
    }

    pub async fn get(&self, order_id: OrderId) -> Option<OrderRecord> {
        self.inner.read().await.records.get(&order_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
