//! Observability: structured logging, metrics collection, and the liveness endpoint

pub mod health;
pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use health::{health_route, HealthReport};
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{intake_span, order_span, relay_span};
