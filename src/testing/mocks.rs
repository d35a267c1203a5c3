//! Mock implementations for testing
//!
//! Provides a recording `ResultRelay` and order fixtures so the dispatcher and
//! intake routes can be exercised without a live collaborator.

use crate::protocol::messages::{DrugEntry, DrugInOrderId, DrugResult, Order, OrderId};
use crate::relay::{RelayError, ResultRelay};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub type RelayedBatch = (OrderId, Vec<DrugResult>);

/// How the mock relay answers each call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockRelayBehavior {
    #[default]
    Succeed,
    /// Every call fails with a transport error
    TransportFailure,
    /// Every call fails with the given HTTP status
    Rejected(u16),
    /// The first `n` calls fail with a transport error, later calls succeed
    FailFirst(u32),
    /// The call panics inside the background task
    Panic,
}

/// Mock relay that records every batch it is asked to deliver
#[derive(Debug, Default)]
pub struct MockResultRelay {
    pub relayed: Arc<Mutex<Vec<RelayedBatch>>>,
    pub behavior: MockRelayBehavior,
    pub delay: Option<Duration>,
    calls: AtomicU32,
}

impl MockResultRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockRelayBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self::with_behavior(MockRelayBehavior::TransportFailure)
    }

    /// Hold each call open for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Batches that were delivered successfully
    pub async fn get_relayed(&self) -> Vec<RelayedBatch> {
        self.relayed.lock().await.clone()
    }

    /// Number of relay attempts, successful or not
    pub async fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultRelay for MockResultRelay {
    async fn relay(&self, order_id: OrderId, results: &[DrugResult]) -> Result<(), RelayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.behavior {
            MockRelayBehavior::Succeed => {}
            MockRelayBehavior::TransportFailure => {
                return Err(RelayError::Transport("Mock connection refused".into()));
            }
            MockRelayBehavior::Rejected(status) => {
                return Err(RelayError::Rejected {
                    status,
                    body: "Mock rejection".into(),
                });
            }
            MockRelayBehavior::FailFirst(n) if call <= n => {
                return Err(RelayError::Transport(format!("Mock failure {call} of {n}")));
            }
            MockRelayBehavior::FailFirst(_) => {}
            MockRelayBehavior::Panic => panic!("Mock relay panicked for order {order_id}"),
        }

        self.relayed
            .lock()
            .await
            .push((order_id, results.to_vec()));
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Drug entry whose infusion speed truncates to 1.42
pub fn sample_drug(druginorder_id: DrugInOrderId) -> DrugEntry {
    DrugEntry {
        druginorder_id,
        drug_concentration: 10.0,
        ampoule_volume: 5.0,
        ampoules_count: 2,
        solvent_volume: 100.0,
        patient_weight: 70.0,
    }
}

/// Order holding one `sample_drug` per id, in the given order
pub fn sample_order(order_id: OrderId, drug_ids: &[DrugInOrderId]) -> Order {
    Order {
        order_id,
        drugs: drug_ids.iter().copied().map(sample_drug).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: DrugInOrderId) -> DrugResult {
        DrugResult {
            druginorder_id: id,
            infusion_speed: 1.42,
        }
    }

    #[tokio::test]
    async fn test_mock_relay_records_batches() {
        let relay = MockResultRelay::new();

        relay.relay(42, &[result(1), result(2)]).await.unwrap();

        let relayed = relay.get_relayed().await;
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].0, 42);
        assert_eq!(relayed[0].1.len(), 2);
        assert_eq!(relay.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_mock_relay_failure() {
        let relay = MockResultRelay::with_failure();

        let error = relay.relay(1, &[]).await.unwrap_err();
        assert_eq!(error.kind(), "transport");
        assert!(relay.get_relayed().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_relay_fail_first() {
        let relay = MockResultRelay::with_behavior(MockRelayBehavior::FailFirst(2));

        assert!(relay.relay(1, &[]).await.is_err());
        assert!(relay.relay(1, &[]).await.is_err());
        assert!(relay.relay(1, &[]).await.is_ok());
        assert_eq!(relay.call_count().await, 3);
        assert_eq!(relay.get_relayed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_relay_rejected() {
        let relay = MockResultRelay::with_behavior(MockRelayBehavior::Rejected(500));

        match relay.relay(1, &[]).await {
            Err(RelayError::Rejected { status, .. }) => assert_eq!(status, 500),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_sample_order_keeps_drug_order() {
        let order = sample_order(7, &[3, 1, 2]);
        let ids: Vec<_> = order.drugs.iter().map(|d| d.druginorder_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }
}
