//! Prometheus metrics for monitoring ledger server health and performance.
//!
//! This module provides metrics collection and export via a standalone
//! scrape listener. Metrics are exposed in Prometheus text format.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts, duration, status codes
//! - **Ledger Metrics**: Operation counts and durations per operation type
//! - **Settlement Metrics**: Sweep runs, rooms settled/failed, rake taken
//! - **Reconciliation Metrics**: Rows checked, issues found
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use bl_server::metrics;
//! use std::net::SocketAddr;
//!
//! // Initialize metrics exporter
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! // Record a ledger operation
//! metrics::ledger_operations_total("credit", "ok");
//! ```

#![allow(dead_code)] // Public API for future integration

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Sets up a Prometheus scrape endpoint on the specified address.
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
///
/// Increments the total HTTP request counter with method, path, and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Ledger Metrics
// ============================================================================

/// Record a ledger operation outcome.
///
/// `outcome` is one of `ok`, `replay`, or an error code such as
/// `INSUFFICIENT_FUNDS`.
pub fn ledger_operations_total(operation: &str, outcome: &str) {
    metrics::counter!("ledger_operations_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record ledger operation duration in milliseconds.
pub fn ledger_operation_duration_ms(operation: &str, duration_ms: f64) {
    metrics::histogram!("ledger_operation_duration_ms",
        "operation" => operation.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Settlement Metrics
// ============================================================================

/// Increment settlement sweep runs counter.
pub fn settlement_sweeps_total(success: bool) {
    metrics::counter!("settlement_sweeps_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment rooms settled counter.
pub fn rooms_settled_total(count: u64) {
    metrics::counter!("rooms_settled_total").increment(count);
}

/// Increment rooms whose settlement failed counter.
pub fn rooms_settlement_failed_total(count: u64) {
    metrics::counter!("rooms_settlement_failed_total").increment(count);
}

/// Record rake taken from one settled room, in minor units.
pub fn rake_collected(amount: i64) {
    metrics::histogram!("rake_collected").record(amount as f64);
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Set the issue count found by the latest reconciliation run.
pub fn reconciliation_issues(count: usize) {
    metrics::gauge!("reconciliation_issues").set(count as f64);
}

/// Increment reconciliation runs counter.
pub fn reconciliation_runs_total(success: bool) {
    metrics::counter!("reconciliation_runs_total",
        "success" => success.to_string()
    )
    .increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Set current database connection pool size.
pub fn db_connections_active(count: u32) {
    metrics::gauge!("db_connections_active").set(count as f64);
}
