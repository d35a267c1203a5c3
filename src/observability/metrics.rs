//! Thread-safe metrics collection system
//!
//! Provides atomic counters and mutex-protected collections for tracking
//! order intake, background processing, and relay delivery.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum number of processing time samples retained
const MAX_PROCESSING_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Intake and dispatch (atomic for high frequency)
    orders_received: AtomicU64,
    orders_rejected: AtomicU64,
    orders_in_flight: AtomicU64,
    max_in_flight_reached: AtomicU64,
    orders_delivered: AtomicU64,
    orders_failed: AtomicU64,
    calculation_failures: AtomicU64,

    // Relay
    relay_attempts: AtomicU64,
    relay_retries: AtomicU64,
    relay_transport_failures: AtomicU64,
    relay_rejections: AtomicU64,
    // Serialization or configuration failures before any request was sent
    relay_internal_failures: AtomicU64,

    // End-to-end background processing times in milliseconds
    processing_times: Mutex<Vec<u64>>,

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            orders_received: AtomicU64::new(0),
            orders_rejected: AtomicU64::new(0),
            orders_in_flight: AtomicU64::new(0),
            max_in_flight_reached: AtomicU64::new(0),
            orders_delivered: AtomicU64::new(0),
            orders_failed: AtomicU64::new(0),
            calculation_failures: AtomicU64::new(0),
            relay_attempts: AtomicU64::new(0),
            relay_retries: AtomicU64::new(0),
            relay_transport_failures: AtomicU64::new(0),
            relay_rejections: AtomicU64::new(0),
            relay_internal_failures: AtomicU64::new(0),
            processing_times: Mutex::new(Vec::new()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Intake metrics
    pub fn order_received(&self) {
        self.orders_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn order_rejected(&self) {
        self.orders_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Dispatch metrics
    pub fn order_dispatched(&self) {
        let new_count = self.orders_in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_in_flight_reached
            .fetch_max(new_count, Ordering::Relaxed);
    }

    pub fn order_left_flight(&self) {
        // Saturating so a reset during a test cannot wrap the gauge
        let _ = self
            .orders_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn order_delivered(&self, duration: Duration) {
        self.orders_delivered.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    pub fn order_failed(&self, duration: Duration) {
        self.orders_failed.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    pub fn calculation_failed(&self) {
        self.calculation_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Relay metrics
    pub fn relay_attempted(&self) {
        self.relay_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relay_retried(&self) {
        self.relay_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relay_transport_failed(&self) {
        self.relay_transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relay_rejected(&self) {
        self.relay_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relay_internal_failed(&self) {
        self.relay_internal_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);

            if times.len() > MAX_PROCESSING_SAMPLES {
                times.remove(0);
            }
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.orders_received,
            &self.orders_rejected,
            &self.orders_in_flight,
            &self.max_in_flight_reached,
            &self.orders_delivered,
            &self.orders_failed,
            &self.calculation_failures,
            &self.relay_attempts,
            &self.relay_retries,
            &self.relay_transport_failures,
            &self.relay_rejections,
            &self.relay_internal_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
    }

    /// Calculate processing time statistics (pure function)
    fn calculate_processing_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
            percentile(&sorted_times, 99.0),
        )
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_processing_time_ms, p50, p95, p99) = self.calculate_processing_time_statistics();

        let relay_transport_failures = self.relay_transport_failures.load(Ordering::Relaxed);
        let relay_rejections = self.relay_rejections.load(Ordering::Relaxed);
        let relay_internal_failures = self.relay_internal_failures.load(Ordering::Relaxed);

        MetricsSnapshot {
            orders: OrderMetrics {
                orders_received: self.orders_received.load(Ordering::Relaxed),
                orders_rejected: self.orders_rejected.load(Ordering::Relaxed),
                orders_in_flight: self.orders_in_flight.load(Ordering::Relaxed),
                max_in_flight_reached: self.max_in_flight_reached.load(Ordering::Relaxed),
                orders_delivered: self.orders_delivered.load(Ordering::Relaxed),
                orders_failed: self.orders_failed.load(Ordering::Relaxed),
                calculation_failures: self.calculation_failures.load(Ordering::Relaxed),
                avg_processing_time_ms,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                processing_time_p99_ms: p99,
            },
            relay: RelayMetrics {
                attempts: self.relay_attempts.load(Ordering::Relaxed),
                retries: self.relay_retries.load(Ordering::Relaxed),
                transport_failures: relay_transport_failures,
                rejections: relay_rejections,
                internal_failures: relay_internal_failures,
                total_failures: relay_transport_failures
                    + relay_rejections
                    + relay_internal_failures,
            },
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub orders: OrderMetrics,
    pub relay: RelayMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct OrderMetrics {
    pub orders_received: u64,
    pub orders_rejected: u64,
    pub orders_in_flight: u64,
    pub max_in_flight_reached: u64,
    pub orders_delivered: u64,
    pub orders_failed: u64,
    pub calculation_failures: u64,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub processing_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct RelayMetrics {
    pub attempts: u64,
    pub retries: u64,
    pub transport_failures: u64,
    pub rejections: u64,
    pub internal_failures: u64,
    pub total_failures: u64,
}

// Helper functions
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_index = index.floor() as usize;
        let upper_index = index.ceil() as usize;
        let lower_value = sorted_data[lower_index] as f64;
        let upper_value = sorted_data[upper_index] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}
