//! Background order processing
//!
//! `TaskDispatcher::submit` spawns one tokio task per accepted order and
//! returns without waiting for it. The task sleeps for a simulated processing
//! latency, computes one infusion speed per drug, and relays the batch to the
//! collaborator. Every failure inside the task is terminal for that order
//! only: it is logged, counted, and recorded in the status store.

use crate::calculator::{calculate_results, CalculationError};
use crate::config::ServiceConfig;
use crate::dispatch::retry::RetryPolicy;
use crate::dispatch::status::{OrderStatus, OrderStatusStore};
use crate::dispatch::DispatchError;
use crate::error::sanitize_error_message;
use crate::observability::metrics::{metrics, MetricsCollector};
use crate::protocol::messages::{DrugResult, Order, OrderId};
use crate::relay::{RelayError, ResultRelay};
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Uniformly distributed processing delay applied before calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedLatency {
    pub min: Duration,
    pub max: Duration,
}

impl SimulatedLatency {
    pub fn between(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn none() -> Self {
        Self::between(Duration::ZERO, Duration::ZERO)
    }

    /// Draw one delay from `[min, max]` inclusive, at millisecond resolution
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for SimulatedLatency {
    fn default() -> Self {
        Self::between(Duration::from_secs(5), Duration::from_secs(10))
    }
}

/// Tunables for the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub latency: SimulatedLatency,
    pub retry: RetryPolicy,
    /// Admission limit on concurrently processed orders; `None` is unbounded
    pub max_in_flight: Option<usize>,
    pub reject_duplicate_orders: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            latency: SimulatedLatency::default(),
            retry: RetryPolicy::none(),
            max_in_flight: None,
            reject_duplicate_orders: true,
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            latency: SimulatedLatency::between(
                Duration::from_secs(config.dispatch.min_delay_secs),
                Duration::from_secs(config.dispatch.max_delay_secs),
            ),
            retry: RetryPolicy::from_config(&config.retry),
            max_in_flight: config.dispatch.max_in_flight,
            reject_duplicate_orders: config.dispatch.reject_duplicate_orders,
        }
    }
}

/// Final result of one order's background task
#[derive(Debug)]
pub enum OrderOutcome {
    Delivered { attempts: u32 },
    CalculationFailed(CalculationError),
    RelayFailed { error: RelayError, attempts: u32 },
}

impl OrderOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, OrderOutcome::Delivered { .. })
    }
}

/// Handle to a launched order task
///
/// Dropping the ticket detaches the task; it keeps running to completion.
#[derive(Debug)]
pub struct DispatchTicket {
    pub order_id: OrderId,
    pub task_id: Uuid,
    handle: JoinHandle<OrderOutcome>,
}

impl DispatchTicket {
    /// Wait for the background task to finish
    pub async fn wait(self) -> Result<OrderOutcome, DispatchError> {
        self.handle
            .await
            .map_err(|e| DispatchError::TaskAborted {
                order_id: self.order_id,
                message: e.to_string(),
            })
    }
}

type InFlightSet = Arc<Mutex<HashSet<OrderId>>>;

/// Membership of one order id in the in-flight set, released on drop (including unwinding)
struct InFlightGuard {
    order_id: OrderId,
    in_flight: Option<InFlightSet>,
    dispatched: bool,
}

impl InFlightGuard {
    fn mark_dispatched(&mut self) {
        self.dispatched = true;
        metrics().order_dispatched();
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(in_flight) = &self.in_flight {
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.order_id);
        }
        if self.dispatched {
            metrics().order_left_flight();
        }
    }
}

struct DispatcherInner {
    relay: Arc<dyn ResultRelay>,
    settings: DispatchSettings,
    in_flight: InFlightSet,
    capacity: Option<Arc<Semaphore>>,
    status: OrderStatusStore,
}

/// Launches and supervises one background task per order
#[derive(Clone)]
pub struct TaskDispatcher {
    inner: Arc<DispatcherInner>,
}

impl TaskDispatcher {
    pub fn new(relay: Arc<dyn ResultRelay>, settings: DispatchSettings) -> Self {
        Self::with_status_store(relay, settings, OrderStatusStore::default())
    }

    pub fn with_status_store(
        relay: Arc<dyn ResultRelay>,
        settings: DispatchSettings,
        status: OrderStatusStore,
    ) -> Self {
        let capacity = settings
            .max_in_flight
            .map(|limit| Arc::new(Semaphore::new(limit)));

        Self {
            inner: Arc::new(DispatcherInner {
                relay,
                settings,
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                capacity,
                status,
            }),
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.inner.settings
    }

    pub fn status_store(&self) -> &OrderStatusStore {
        &self.inner.status
    }

    /// Number of orders currently tracked as in flight
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Launch background processing for an order
    ///
    /// Returns once the task is spawned. Success only means the order was
    /// launched; its outcome is visible through the status store or the ticket.
    ///
    /// # Examples
    /// ```
    /// use infusion_relay::dispatch::{DispatchSettings, SimulatedLatency, TaskDispatcher};
    /// use infusion_relay::testing::{sample_order, MockResultRelay};
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let relay = Arc::new(MockResultRelay::new());
    /// let settings = DispatchSettings {
    ///     latency: SimulatedLatency::none(),
    ///     ..Default::default()
    /// };
    /// let dispatcher = TaskDispatcher::new(relay.clone(), settings);
    ///
    /// let ticket = dispatcher.submit(sample_order(42, &[1])).await.unwrap();
    /// assert!(ticket.wait().await.unwrap().is_delivered());
    /// assert_eq!(relay.get_relayed().await.len(), 1);
    /// # });
    /// ```
    pub async fn submit(&self, order: Order) -> Result<DispatchTicket, DispatchError> {
        let order_id = order.order_id;
        let drugs_count = order.drugs_count();

        let mut guard = self.claim(order_id).map_err(reject)?;
        let permit = self.acquire_capacity().map_err(reject)?;

        let task_id = Uuid::new_v4();
        self.inner.status.track(order_id, task_id, drugs_count).await;
        guard.mark_dispatched();

        let span = crate::order_span!(
            order_id = order_id,
            task_id = %task_id,
            drugs_count = drugs_count
        );
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                let _permit = permit;
                inner.supervise(order, task_id).await
            }
            .instrument(span),
        );

        info!(
            order_id = order_id,
            task_id = %task_id,
            drugs_count = drugs_count,
            "Order dispatched for background processing"
        );

        Ok(DispatchTicket {
            order_id,
            task_id,
            handle,
        })
    }

    fn claim(&self, order_id: OrderId) -> Result<InFlightGuard, DispatchError> {
        if !self.inner.settings.reject_duplicate_orders {
            return Ok(InFlightGuard {
                order_id,
                in_flight: None,
                dispatched: false,
            });
        }

        let inserted = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order_id);
        if !inserted {
            return Err(DispatchError::DuplicateOrder(order_id));
        }

        Ok(InFlightGuard {
            order_id,
            in_flight: Some(Arc::clone(&self.inner.in_flight)),
            dispatched: false,
        })
    }

    fn acquire_capacity(&self) -> Result<Option<OwnedSemaphorePermit>, DispatchError> {
        let Some(semaphore) = &self.inner.capacity else {
            return Ok(None);
        };

        Arc::clone(semaphore)
            .try_acquire_owned()
            .map(Some)
            .map_err(|_| DispatchError::AtCapacity {
                limit: self.inner.settings.max_in_flight.unwrap_or_default(),
            })
    }
}

fn reject(error: DispatchError) -> DispatchError {
    warn!(error = %error, "Order rejected");
    metrics().order_rejected();
    error
}

/// Count a failed relay attempt under its failure kind
fn record_relay_failure(collector: &MetricsCollector, error: &RelayError) {
    match error {
        RelayError::Transport(_) => collector.relay_transport_failed(),
        RelayError::Rejected { .. } => collector.relay_rejected(),
        RelayError::Serialization(_) | RelayError::NotConfigured(_) => {
            collector.relay_internal_failed()
        }
    }
}

impl DispatcherInner {
    /// Run `process` in its own task so a panic still leaves a terminal status
    async fn supervise(self: Arc<Self>, order: Order, task_id: Uuid) -> OrderOutcome {
        let started = Instant::now();
        let order_id = order.order_id;
        let worker = Arc::clone(&self);
        let result = tokio::spawn(
            async move { worker.process(order, task_id).await }.in_current_span(),
        )
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(error = %join_error, "Order task aborted");
                metrics().order_failed(started.elapsed());
                self.status
                    .update(
                        order_id,
                        task_id,
                        OrderStatus::Failed {
                            reason: "task aborted".to_string(),
                        },
                    )
                    .await;
                match join_error.try_into_panic() {
                    Ok(payload) => std::panic::resume_unwind(payload),
                    Err(join_error) => panic!("Order task {task_id} cancelled: {join_error}"),
                }
            }
        }
    }

    async fn process(&self, order: Order, task_id: Uuid) -> OrderOutcome {
        let started = Instant::now();
        let order_id = order.order_id;

        self.status
            .update(order_id, task_id, OrderStatus::Processing)
            .await;

        let delay = self.settings.latency.sample();
        debug!(delay_ms = delay.as_millis() as u64, "Simulating processing latency");
        tokio::time::sleep(delay).await;

        let results = match calculate_results(&order.drugs) {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "Infusion calculation failed; nothing will be relayed");
                metrics().calculation_failed();
                metrics().order_failed(started.elapsed());
                self.status
                    .update(
                        order_id,
                        task_id,
                        OrderStatus::Failed {
                            reason: e.to_string(),
                        },
                    )
                    .await;
                return OrderOutcome::CalculationFailed(e);
            }
        };

        for result in &results {
            debug!(
                druginorder_id = result.druginorder_id,
                infusion_speed = result.infusion_speed,
                "Computed infusion speed"
            );
        }

        match self.relay_with_retry(order_id, task_id, &results).await {
            Ok(attempts) => {
                metrics().order_delivered(started.elapsed());
                self.status
                    .update(order_id, task_id, OrderStatus::Delivered)
                    .await;
                info!(
                    attempts = attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Order processed and results relayed"
                );
                OrderOutcome::Delivered { attempts }
            }
            Err((error, attempts)) => {
                let reason = sanitize_error_message(&error.to_string());
                error!(
                    error = %reason,
                    kind = error.kind(),
                    attempts = attempts,
                    "Relay failed; results for this order are dropped"
                );
                metrics().order_failed(started.elapsed());
                self.status
                    .update(order_id, task_id, OrderStatus::Failed { reason })
                    .await;
                OrderOutcome::RelayFailed { error, attempts }
            }
        }
    }

    /// Relay the batch, retrying per policy; returns the attempt count
    async fn relay_with_retry(
        &self,
        order_id: OrderId,
        task_id: Uuid,
        results: &[DrugResult],
    ) -> Result<u32, (RelayError, u32)> {
        let mut attempt = 1;

        loop {
            self.status
                .update(order_id, task_id, OrderStatus::Relaying { attempt })
                .await;
            metrics().relay_attempted();

            let span = crate::relay_span!(
                order_id = order_id,
                attempt = attempt,
                relay = self.relay.name()
            );
            let error = match self.relay.relay(order_id, results).instrument(span).await {
                Ok(()) => return Ok(attempt),
                Err(error) => error,
            };

            record_relay_failure(metrics(), &error);

            let Some(delay) = self.settings.retry.backoff_for(attempt) else {
                return Err((error, attempt));
            };

            warn!(
                error = %sanitize_error_message(&error.to_string()),
                attempt = attempt,
                max_attempts = self.settings.retry.max_attempts(),
                backoff_ms = delay.as_millis() as u64,
                "Relay attempt failed, retrying"
            );
            metrics().relay_retried();
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
