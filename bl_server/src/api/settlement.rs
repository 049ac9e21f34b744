//! Settlement and cancellation API handlers.
//!
//! Internal-service endpoints that trigger room settlement and room or
//! per-member cancellation. Both are idempotent: settling an already settled
//! room returns the stored report as a no-op, and cancellation replays
//! refunds that already committed.
//!
//! # Examples
//!
//! Settle a completed room:
//! ```bash
//! curl -X POST http://localhost:7070/internal/v1/settlement/rooms/7 \
//!   -H "Authorization: Bearer SERVICE_TOKEN"
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bullpen_ledger::settlement::{CancellationReport, SettlementError, SettlementReport};

use super::{AppState, ErrorResponse};
use crate::metrics;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a settlement error to an HTTP response with a stable code.
fn settlement_error(err: SettlementError) -> ApiError {
    let code = err.code();
    let status = match code {
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "CONCURRENT_REQUEST" | "SETTLEMENT_ALREADY_COMPLETE" | "IDEMPOTENCY_KEY_CONFLICT" => {
            StatusCode::CONFLICT
        }
        "INTERNAL_ERROR" | "SETTLEMENT_PARTIAL_FAILURE" => StatusCode::INTERNAL_SERVER_ERROR,
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

/// Settle a completed room.
///
/// Marks every member's portfolio to market, ranks them, takes the rake,
/// and distributes payouts. Safe to retry: re-running a settled room is a
/// no-op reported with `already_complete: true`.
///
/// # Errors
///
/// - `400 Bad Request`: Room is not in the completed state
/// - `404 Not Found`: Unknown room
/// - `409 Conflict`: Another settlement run holds the room
/// - `500 Internal Server Error`: Partial failure (retryable) or database error
pub async fn settle_room(
    State(state): State<AppState>,
    Path(bull_pen_id): Path<i64>,
) -> Result<Json<SettlementReport>, ApiError> {
    match state.settlement.settle_room(bull_pen_id).await {
        Ok(report) => {
            if !report.already_complete {
                metrics::rooms_settled_total(1);
                metrics::rake_collected(report.rake);
            }
            Ok(Json(report))
        }
        Err(err) => {
            if matches!(err, SettlementError::PartialFailure { .. }) {
                metrics::rooms_settlement_failed_total(1);
            }
            Err(settlement_error(err))
        }
    }
}

/// Cancel a room, refunding every member's buy-in.
///
/// # Errors
///
/// - `404 Not Found`: Unknown room
/// - `409 Conflict`: Room is already settled
pub async fn cancel_room(
    State(state): State<AppState>,
    Path(bull_pen_id): Path<i64>,
) -> Result<Json<CancellationReport>, ApiError> {
    state
        .settlement
        .cancel_room(bull_pen_id)
        .await
        .map(Json)
        .map_err(settlement_error)
}

/// Cancel a single member's participation, refunding only their buy-in.
///
/// # Errors
///
/// - `404 Not Found`: Unknown room or member
/// - `409 Conflict`: Room is already settled
pub async fn cancel_member(
    State(state): State<AppState>,
    Path((bull_pen_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<CancellationReport>, ApiError> {
    state
        .settlement
        .cancel_member(bull_pen_id, user_id)
        .await
        .map(Json)
        .map_err(settlement_error)
}
