//! Budget operation API handlers.
//!
//! This module provides the internal-service mutation endpoints (credit,
//! debit, lock, unlock, adjust, transfer) and the user-facing read endpoints
//! (current budget, paginated log history).
//!
//! Every mutation requires an `Idempotency-Key` header; a replayed key
//! returns the stored outcome with `idempotent: true` instead of applying
//! the operation again.
//!
//! # Examples
//!
//! Credit a user:
//! ```bash
//! curl -X POST http://localhost:7070/internal/v1/budget/credit \
//!   -H "Authorization: Bearer SERVICE_TOKEN" \
//!   -H "Idempotency-Key: order-12345-credit" \
//!   -H "Content-Type: application/json" \
//!   -d '{"user_id": 42, "amount": 100}'
//! ```
//!
//! Read a user's log history:
//! ```bash
//! curl http://localhost:7070/api/v1/budget/logs?limit=20 \
//!   -H "Authorization: Bearer JWT"
//! ```

use axum::{
    extract::{Extension, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bullpen_ledger::budget::{
    AdjustRequest, Budget, BudgetError, BudgetLogEntry, LogFilter, OperationOutcome,
    OperationRequest, TransferOutcome, TransferRequest,
};
use bullpen_ledger::DEFAULT_CURRENCY;
use serde::Deserialize;

use super::{AppState, ErrorResponse};
use crate::metrics;

/// Header carrying the caller's idempotency key, required on all mutations
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Extract the `Idempotency-Key` header or reject with `400`.
fn require_idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Missing Idempotency-Key header".to_string(),
                    code: "VALIDATION_ERROR".to_string(),
                }),
            )
        })
}

/// Map a budget error to an HTTP response with a stable code.
fn budget_error(err: BudgetError) -> ApiError {
    let code = err.code();
    let status = match code {
        "INTERNAL_ERROR" => StatusCode::INTERNAL_SERVER_ERROR,
        "IDEMPOTENCY_KEY_CONFLICT" | "CONCURRENT_REQUEST" => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.client_message(),
            code: code.to_string(),
        }),
    )
}

/// Record the outcome of one mutation and convert it to a response.
fn respond(
    operation: &'static str,
    result: Result<OperationOutcome, BudgetError>,
) -> Result<Json<OperationOutcome>, ApiError> {
    match result {
        Ok(outcome) => {
            let label = if outcome.idempotent { "replay" } else { "ok" };
            metrics::ledger_operations_total(operation, label);
            Ok(Json(outcome))
        }
        Err(err) => {
            metrics::ledger_operations_total(operation, err.code());
            Err(budget_error(err))
        }
    }
}

/// Credit a user's available balance.
///
/// # Errors
///
/// - `400 Bad Request`: Missing idempotency key, non-positive amount
/// - `409 Conflict`: Key reused with a different body, or in flight
/// - `500 Internal Server Error`: Database error
pub async fn credit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OperationRequest>,
) -> Result<Json<OperationOutcome>, ApiError> {
    let key = require_idempotency_key(&headers)?;
    respond("credit", state.engine.credit(&key, request).await)
}

/// Debit a user's available balance.
///
/// # Errors
///
/// Same as [`credit`], plus `400` with code `INSUFFICIENT_FUNDS` when the
/// available balance cannot cover the amount.
pub async fn debit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OperationRequest>,
) -> Result<Json<OperationOutcome>, ApiError> {
    let key = require_idempotency_key(&headers)?;
    respond("debit", state.engine.debit(&key, request).await)
}

/// Move funds from available to locked (e.g., a room buy-in reserve).
pub async fn lock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OperationRequest>,
) -> Result<Json<OperationOutcome>, ApiError> {
    let key = require_idempotency_key(&headers)?;
    respond("lock", state.engine.lock(&key, request).await)
}

/// Release locked funds back to available.
pub async fn unlock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OperationRequest>,
) -> Result<Json<OperationOutcome>, ApiError> {
    let key = require_idempotency_key(&headers)?;
    respond("unlock", state.engine.unlock(&key, request).await)
}

/// Admin adjustment in either direction, allowed even on frozen budgets.
pub async fn adjust(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AdjustRequest>,
) -> Result<Json<OperationOutcome>, ApiError> {
    let key = require_idempotency_key(&headers)?;
    respond("adjust", state.engine.adjust(&key, request).await)
}

/// Atomic wallet-to-wallet transfer; both legs commit or neither does.
pub async fn transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferOutcome>, ApiError> {
    let key = require_idempotency_key(&headers)?;
    match state.engine.transfer(&key, request).await {
        Ok(outcome) => {
            let label = if outcome.idempotent { "replay" } else { "ok" };
            metrics::ledger_operations_total("transfer", label);
            Ok(Json(outcome))
        }
        Err(err) => {
            metrics::ledger_operations_total("transfer", err.code());
            Err(budget_error(err))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BudgetQuery {
    pub currency: Option<String>,
}

/// Get the authenticated user's current budget.
///
/// # Errors
///
/// - `404 Not Found`: User has no budget yet (no operation has touched it)
/// - `500 Internal Server Error`: Database error
pub async fn get_budget(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Query(query): Query<BudgetQuery>,
) -> Result<Json<Budget>, ApiError> {
    let currency = query.currency.as_deref().unwrap_or(DEFAULT_CURRENCY);
    let budget = state
        .engine
        .store()
        .get_budget(user_id, currency)
        .await
        .map_err(budget_error)?;

    match budget {
        Some(budget) => Ok(Json(budget)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No budget for this user".to_string(),
                code: "NOT_FOUND".to_string(),
            }),
        )),
    }
}

/// Get the authenticated user's log history, newest first.
///
/// Supports `limit`, `offset`, `operation_type`, and `bull_pen_id` query
/// parameters. `limit` is clamped server-side.
pub async fn get_logs(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Query(filter): Query<LogFilter>,
) -> Result<Json<Vec<BudgetLogEntry>>, ApiError> {
    let entries = state
        .engine
        .store()
        .get_entries(user_id, &filter)
        .await
        .map_err(budget_error)?;

    Ok(Json(entries))
}
