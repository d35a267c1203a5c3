//! Infusion relay
//!
//! An asynchronous calculation service for drug infusion rates.
//!
//! # Overview
//!
//! An order-management collaborator submits an order (an id plus a list of
//! drug entries) to `POST /drugs_process/`. The service acknowledges with 202
//! immediately and processes the order in the background:
//! - Orders are validated and handed to the task dispatcher
//! - Each order waits a simulated processing latency in its own task
//! - One infusion speed is computed per drug entry
//! - The batch is posted to the collaborator's update endpoint
//!
//! # Quick Start
//!
//! ```rust
//! use infusion_relay::calculator::calculate_results;
//! use infusion_relay::protocol::{DrugEntry, Order};
//!
//! let order = Order {
//!     order_id: 42,
//!     drugs: vec![DrugEntry {
//!         druginorder_id: 1,
//!         drug_concentration: 10.0,
//!         ampoule_volume: 5.0,
//!         ampoules_count: 2,
//!         solvent_volume: 100.0,
//!         patient_weight: 70.0,
//!     }],
//! };
//!
//! let results = calculate_results(&order.drugs).unwrap();
//! assert_eq!(results[0].infusion_speed, 1.42);
//! ```

pub mod calculator;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod intake;
pub mod observability;
pub mod protocol;
pub mod relay;
pub mod testing;

pub use calculator::{calculate_results, infusion_speed, CalculationError};
pub use config::*;
pub use dispatch::{DispatchError, DispatchSettings, TaskDispatcher};
pub use error::{ServiceError, ServiceResult};
pub use protocol::*;
pub use relay::{HttpResultRelay, RelayError, ResultRelay};
