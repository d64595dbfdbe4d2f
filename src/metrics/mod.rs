//! Prometheus metrics for the ad rotation service
//!
//! This module tracks aggregate operational counters:
//! - Delivery: outcomes by kind, daily resets, session store failures
//! - Server: API requests and latency by endpoint, settings reloads
//!
//! Nothing here is labelled by ad or by visitor.
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramVec,
    TextEncoder,
};
use std::sync::{Mutex, OnceLock, PoisonError};

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for delivery metrics
struct DeliveryMetrics {
    outcomes: CounterVec,
    daily_resets: Counter,
    store_errors: CounterVec,
    delivery_duration: Histogram,
    live_sessions: Gauge,
}

/// Container for server metrics
struct ServerMetrics {
    api_requests: CounterVec,
    api_duration: HistogramVec,
    settings_reloads: CounterVec,
}

/// Global storage for delivery metrics
static DELIVERY_METRICS: OnceLock<DeliveryMetrics> = OnceLock::new();

/// Global storage for server metrics
static SERVER_METRICS: OnceLock<ServerMetrics> = OnceLock::new();

/// Serializes registration so no caller returns before both stores are set
static INIT_LOCK: Mutex<()> = Mutex::new(());

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = adrotate::metrics::init_metrics() {
///     tracing::warn!(error = %e, "Metrics initialization failed");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if metrics_initialized() {
        return Ok(());
    }

    let delivery = DeliveryMetrics {
        outcomes: register_counter_vec!(
            "adrotate_deliveries_total",
            "Ad requests by outcome (served, exhausted, skipped reason, unavailable)",
            &["outcome"]
        )?,
        daily_resets: register_counter!(
            "adrotate_daily_resets_total",
            "Session records reset for a new calendar day"
        )?,
        store_errors: register_counter_vec!(
            "adrotate_session_store_errors_total",
            "Session store failures by operation",
            &["operation"]
        )?,
        delivery_duration: register_histogram!(
            "adrotate_delivery_duration_seconds",
            "Time spent on one delivery including store round trips",
            vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
        )?,
        live_sessions: register_gauge!(
            "adrotate_live_sessions",
            "Session records currently held by the store"
        )?,
    };

    let server = ServerMetrics {
        api_requests: register_counter_vec!(
            "adrotate_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "adrotate_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
        settings_reloads: register_counter_vec!(
            "adrotate_settings_reloads_total",
            "Rotation settings reload attempts by result",
            &["result"]
        )?,
    };

    DELIVERY_METRICS.set(delivery).map_err(|_| "Delivery metrics already initialized")?;
    SERVER_METRICS.set(server).map_err(|_| "Server metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    DELIVERY_METRICS.get().is_some() && SERVER_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record one delivery outcome
pub fn record_delivery(outcome: &str) {
    if let Some(m) = DELIVERY_METRICS.get() {
        m.outcomes.with_label_values(&[outcome]).inc();
    }
}

/// Record a daily reset
pub fn record_daily_reset() {
    if let Some(m) = DELIVERY_METRICS.get() {
        m.daily_resets.inc();
    }
}

/// Record a session store failure
pub fn record_store_error(operation: &str) {
    if let Some(m) = DELIVERY_METRICS.get() {
        m.store_errors.with_label_values(&[operation]).inc();
    }
}

/// Update the live session gauge
pub fn set_live_sessions(count: usize) {
    if let Some(m) = DELIVERY_METRICS.get() {
        m.live_sessions.set(count as f64);
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = SERVER_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Record a settings reload attempt
pub fn record_settings_reload(success: bool) {
    if let Some(m) = SERVER_METRICS.get() {
        let result = if success { "ok" } else { "error" };
        m.settings_reloads.with_label_values(&[result]).inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a delivery timer
pub fn start_delivery_timer() -> MetricsTimer {
    match DELIVERY_METRICS.get() {
        Some(m) => MetricsTimer::new(m.delivery_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
