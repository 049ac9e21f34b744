//! Idempotency guard for externally-triggered budget operations.
//!
//! Retries from at-least-once callers (network timeouts, schedulers) must
//! never double-apply. Every mutating operation begins by claiming its
//! caller-supplied idempotency key here; the insert-if-absent race decides a
//! single winner, and everyone else either replays the stored result or is
//! rejected.
//!
//! Retry policy for failed attempts: a record finalized as `failed` may be
//! retried immediately. The flip back to `in_progress` is a conditional
//! UPDATE, so concurrent retries still elect exactly one winner.

use super::errors::{BudgetError, BudgetResult};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Outcome of claiming an idempotency key
#[derive(Debug)]
pub enum Begin {
    /// Key unseen (or failed and reclaimed): proceed with a fresh attempt
    Fresh,
    /// Key already completed with a matching fingerprint: the stored result
    Replay(serde_json::Value),
}

/// Idempotency guard over the shared pool
#[derive(Clone)]
pub struct IdempotencyGuard {
    pool: Arc<PgPool>,
}

impl IdempotencyGuard {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Fingerprint a request body for conflict detection.
    ///
    /// The operation name is folded in so the same key reused across
    /// different endpoints is a conflict rather than a replay.
    pub fn fingerprint(operation: &str, body: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update(b"\n");
        hasher.update(body.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Claim a key for execution.
    ///
    /// # Errors
    ///
    /// * `IdempotencyKeyConflict` - key seen with a different fingerprint
    /// * `ConcurrentRequest` - key currently in flight
    pub async fn begin(&self, key: &str, fingerprint: &str) -> BudgetResult<Begin> {
        let inserted = sqlx::query(
            "INSERT INTO idempotency_records (idempotency_key, request_fingerprint)
             VALUES ($1, $2)
             ON CONFLICT (idempotency_key) DO NOTHING",
        )
        .bind(key)
        .bind(fingerprint)
        .execute(self.pool.as_ref())
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(Begin::Fresh);
        }

        let row = sqlx::query(
            "SELECT request_fingerprint, status, result
             FROM idempotency_records
             WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_one(self.pool.as_ref())
        .await?;

        let stored_fingerprint: String = row.get("request_fingerprint");
        if stored_fingerprint != fingerprint {
            return Err(BudgetError::IdempotencyKeyConflict(key.to_string()));
        }

        match row.get::<String, _>("status").as_str() {
            "completed" => {
                let result: Option<serde_json::Value> = row.get("result");
                result
                    .map(Begin::Replay)
                    .ok_or_else(|| BudgetError::CorruptRecord(key.to_string()))
            }
            "in_progress" => Err(BudgetError::ConcurrentRequest(key.to_string())),
            "failed" => {
                // Reclaim for retry; losing the race means another retry is
                // already in flight.
                let reclaimed = sqlx::query(
                    "UPDATE idempotency_records
                     SET status = 'in_progress', updated_at = NOW()
                     WHERE idempotency_key = $1 AND status = 'failed'",
                )
                .bind(key)
                .execute(self.pool.as_ref())
                .await?
                .rows_affected();

                if reclaimed == 1 {
                    Ok(Begin::Fresh)
                } else {
                    Err(BudgetError::ConcurrentRequest(key.to_string()))
                }
            }
            other => Err(BudgetError::CorruptRecord(format!(
                "{key}: unknown status {other}"
            ))),
        }
    }

    /// Finalize a record as completed, storing the result for replay.
    pub async fn complete(&self, key: &str, result: &serde_json::Value) -> BudgetResult<()> {
        sqlx::query(
            "UPDATE idempotency_records
             SET status = 'completed', result = $1, updated_at = NOW()
             WHERE idempotency_key = $2",
        )
        .bind(result)
        .bind(key)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    /// Finalize a record as failed. No balance mutation happened, so a later
    /// retry with the same key is allowed.
    pub async fn fail(&self, key: &str, error: &str) -> BudgetResult<()> {
        sqlx::query(
            "UPDATE idempotency_records
             SET status = 'failed', result = $1, updated_at = NOW()
             WHERE idempotency_key = $2",
        )
        .bind(serde_json::json!({ "error": error }))
        .bind(key)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_stable() {
        let body = json!({"user_id": 1, "amount": 50});
        let a = IdempotencyGuard::fingerprint("credit", &body);
        let b = IdempotencyGuard::fingerprint("credit", &body);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "should be a sha256 hex digest");
    }

    #[test]
    fn test_fingerprint_differs_by_body() {
        let a = IdempotencyGuard::fingerprint("credit", &json!({"user_id": 1, "amount": 50}));
        let b = IdempotencyGuard::fingerprint("credit", &json!({"user_id": 1, "amount": 51}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_differs_by_operation() {
        let body = json!({"user_id": 1, "amount": 50});
        let a = IdempotencyGuard::fingerprint("credit", &body);
        let b = IdempotencyGuard::fingerprint("debit", &body);
        assert_ne!(a, b, "same key across endpoints must conflict");
    }
}
