//! HTTP API for the bull pen budget ledger server.
//!
//! This module provides the REST API for the virtual-currency ledger. It
//! handles budget mutations for internal services, read access for users,
//! and settlement/cancellation triggers for the room lifecycle service.
//!
//! # Architecture
//!
//! The API is built with:
//! - **Axum**: Async web framework
//! - **Tower**: Middleware for CORS, authentication
//! - **Service token**: Static bearer token for internal-service routes
//! - **JWT**: Bearer tokens for user-facing read routes (verification only)
//!
//! # Modules
//!
//! - [`budget`]: Budget mutations and read endpoints
//! - [`settlement`]: Settlement and cancellation triggers
//! - [`middleware`]: Service-token and JWT authentication middleware
//! - [`request_id`]: Request ID generation and propagation
//!
//! # Endpoints Overview
//!
//! ## Internal (service token + Idempotency-Key header on mutations)
//! - `POST /internal/v1/budget/credit` - Credit available balance
//! - `POST /internal/v1/budget/debit` - Debit available balance
//! - `POST /internal/v1/budget/lock` - Reserve available funds
//! - `POST /internal/v1/budget/unlock` - Release reserved funds
//! - `POST /internal/v1/budget/adjust` - Admin adjustment
//! - `POST /internal/v1/budget/transfer` - Wallet-to-wallet transfer
//! - `POST /internal/v1/settlement/rooms/{id}` - Settle a completed room
//! - `POST /internal/v1/cancellation/rooms/{id}` - Cancel a room
//! - `POST /internal/v1/cancellation/rooms/{id}/members/{user_id}` - Cancel one member
//!
//! ## User-facing (JWT)
//! - `GET /api/v1/budget` - Current budget
//! - `GET /api/v1/budget/logs` - Paginated log history
//!
//! ## Health Check
//! - `GET /health` - Server health status
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use bl_server::api::{create_router, AppState};
//! use bullpen_ledger::budget::BudgetEngine;
//! use bullpen_ledger::reconcile::ReconciliationChecker;
//! use bullpen_ledger::settlement::SettlementEngine;
//! use std::sync::Arc;
//! # use sqlx::PgPool;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let engine: BudgetEngine = unimplemented!();
//! # let settlement: SettlementEngine = unimplemented!();
//! # let checker: ReconciliationChecker = unimplemented!();
//! # let pool: PgPool = unimplemented!();
//!
//! // Create application state
//! let state = AppState {
//!     engine,
//!     settlement: Arc::new(settlement),
//!     checker: Arc::new(checker),
//!     pool: Arc::new(pool),
//!     service_token: Arc::new("internal-service-token".to_string()),
//!     jwt_secret: Arc::new("jwt-verification-secret".to_string()),
//! };
//!
//! // Create router with all endpoints
//! let app = create_router(state);
//!
//! // Start server
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:7070").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod budget;
pub mod middleware;
pub mod request_id;
pub mod settlement;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use bullpen_ledger::budget::BudgetEngine;
use bullpen_ledger::reconcile::ReconciliationChecker;
use bullpen_ledger::settlement::SettlementEngine;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// This state is cloned for each request (cheap due to Arc wrappers) and
/// provides access to the core ledger components.
///
/// # Fields
///
/// - `engine`: Budget operations engine (credit, debit, lock, unlock, ...)
/// - `settlement`: Room settlement and cancellation engine
/// - `checker`: Read-only reconciliation checker
/// - `pool`: Database connection pool for direct queries
/// - `service_token`: Expected bearer token on internal routes
/// - `jwt_secret`: Verification secret for user-facing routes
#[derive(Clone)]
pub struct AppState {
    pub engine: BudgetEngine,
    pub settlement: Arc<SettlementEngine>,
    #[allow(dead_code)]
    pub checker: Arc<ReconciliationChecker>,
    pub pool: Arc<PgPool>,
    pub service_token: Arc<String>,
    pub jwt_secret: Arc<String>,
}

/// Error payload shared by all handlers
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Endpoint Summary
///
/// ```text
/// GET  /health                                              - Health check (public)
/// POST /internal/v1/budget/credit                           - Credit (service token)
/// POST /internal/v1/budget/debit                            - Debit (service token)
/// POST /internal/v1/budget/lock                             - Lock (service token)
/// POST /internal/v1/budget/unlock                           - Unlock (service token)
/// POST /internal/v1/budget/adjust                           - Adjust (service token)
/// POST /internal/v1/budget/transfer                         - Transfer (service token)
/// POST /internal/v1/settlement/rooms/{id}                   - Settle room (service token)
/// POST /internal/v1/cancellation/rooms/{id}                 - Cancel room (service token)
/// POST /internal/v1/cancellation/rooms/{id}/members/{uid}   - Cancel member (service token)
/// GET  /api/v1/budget                                       - Current budget (JWT)
/// GET  /api/v1/budget/logs                                  - Log history (JWT)
/// ```
///
/// # Example
///
/// ```rust,no_run
/// # use bl_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:7070").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let internal_routes = create_internal_router(state.clone());
    let user_routes = create_user_router(state.clone());

    // Root routes (health check - not versioned)
    let root_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(root_routes)
        .nest("/internal/v1", internal_routes)
        .nest("/api/v1", user_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Internal-service routes, all behind the static service token.
fn create_internal_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/budget/credit", post(budget::credit))
        .route("/budget/debit", post(budget::debit))
        .route("/budget/lock", post(budget::lock))
        .route("/budget/unlock", post(budget::unlock))
        .route("/budget/adjust", post(budget::adjust))
        .route("/budget/transfer", post(budget::transfer))
        .route("/settlement/rooms/{bull_pen_id}", post(settlement::settle_room))
        .route(
            "/cancellation/rooms/{bull_pen_id}",
            post(settlement::cancel_room),
        )
        .route(
            "/cancellation/rooms/{bull_pen_id}/members/{user_id}",
            post(settlement::cancel_member),
        )
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::service_token_middleware,
        ))
}

/// User-facing read routes, all behind JWT verification.
fn create_user_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/budget", get(budget::get_budget))
        .route("/budget/logs", get(budget::get_logs))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ))
}

/// Health check endpoint for monitoring and load balancers.
///
/// Executes a simple query against the database and reports overall status.
///
/// # Response
///
/// Returns `200 OK` if all components are healthy, or `503 Service Unavailable`
/// if any component fails.
///
/// # Example
///
/// ```bash
/// curl http://localhost:7070/health
/// # {"status":"healthy","version":"1.0.0","database":true,"timestamp":"2026-08-30T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    // Check database connectivity
    let db_healthy = sqlx::query("SELECT 1")
        .fetch_one(&*state.pool)
        .await
        .is_ok();

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
