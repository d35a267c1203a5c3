//! Asynchronous order processing: dispatch, retry policy, and status tracking

pub mod dispatcher;
pub mod retry;
pub mod status;

pub use dispatcher::{
    DispatchSettings, DispatchTicket, OrderOutcome, SimulatedLatency, TaskDispatcher,
};
pub use retry::RetryPolicy;
pub use status::{OrderRecord, OrderStatus, OrderStatusStore, DEFAULT_STATUS_CAPACITY};

use crate::protocol::messages::OrderId;
use thiserror::Error;

/// Reasons an order cannot be launched
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Order {0} is already being processed")]
    DuplicateOrder(OrderId),

    #[error("Service is at capacity ({limit} orders in flight)")]
    AtCapacity { limit: usize },

    #[error("Task for order {order_id} terminated abnormally: {message}")]
    TaskAborted { order_id: OrderId, message: String },
}
