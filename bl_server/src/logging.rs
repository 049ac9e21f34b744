//! Structured logging configuration.
//!
//! This module provides structured logging with request correlation and
//! slow-operation tracking for the ledger server.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging
///
/// Features:
/// - Request ID correlation
/// - Slow-operation tracking
/// - Configurable log levels via RUST_LOG env var
///
/// # Example
///
/// ```no_run
/// use bl_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    // Console layer for development
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a ledger operation with structured data
///
/// # Arguments
///
/// * `operation` - Operation name (credit, debit, lock, ...)
/// * `user_id` - Target user
/// * `duration_ms` - Duration in milliseconds
#[allow(dead_code)]
pub fn log_ledger_operation(operation: &str, user_id: i64, duration_ms: u64) {
    if duration_ms > 1000 {
        tracing::warn!(
            operation = operation,
            user_id = user_id,
            duration_ms = duration_ms,
            "Slow ledger operation"
        );
    } else {
        tracing::debug!(
            operation = operation,
            user_id = user_id,
            duration_ms = duration_ms,
            "Ledger operation completed"
        );
    }
}

/// Log API request/response
///
/// # Arguments
///
/// * `method` - HTTP method
/// * `path` - Request path
/// * `status_code` - Response status code
/// * `duration_ms` - Request duration in milliseconds
#[allow(dead_code)]
pub fn log_api_request(method: &str, path: &str, status_code: u16, duration_ms: u64) {
    tracing::info!(
        http_method = method,
        http_path = path,
        http_status = status_code,
        duration_ms = duration_ms,
        "API request completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_ledger_operation() {
        // Just ensure it doesn't panic
        log_ledger_operation("credit", 1, 50);
        log_ledger_operation("transfer", 2, 2000);
    }

    #[test]
    fn test_log_api_request() {
        log_api_request("GET", "/api/v1/budget", 200, 45);
        log_api_request("POST", "/internal/v1/budget/credit", 409, 120);
    }
}
