//! Budget ledger error types.

use thiserror::Error;

/// Budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Transfer source and destination are the same user
    #[error("Cannot transfer to the same user")]
    SelfTransfer,

    /// Insufficient available balance
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },

    /// Insufficient locked balance
    #[error("Insufficient locked funds: locked {locked}, required {required}")]
    InsufficientLockedFunds { locked: i64, required: i64 },

    /// Budget is frozen and rejects non-admin mutations
    #[error("Budget is frozen for user {0}")]
    BudgetFrozen(i64),

    /// Same idempotency key seen with a different request body
    #[error("Idempotency key conflict: {0}")]
    IdempotencyKeyConflict(String),

    /// Same idempotency key currently in flight
    #[error("Concurrent request for idempotency key: {0}")]
    ConcurrentRequest(String),

    /// Balance arithmetic would overflow
    #[error("Balance overflow")]
    BalanceOverflow,

    /// Stored idempotency record is unusable (e.g., completed without result)
    #[error("Corrupt idempotency record: {0}")]
    CorruptRecord(String),
}

impl BudgetError {
    /// Stable machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            BudgetError::Database(_) | BudgetError::CorruptRecord(_) => "INTERNAL_ERROR",
            BudgetError::Serialization(_)
            | BudgetError::InvalidAmount(_)
            | BudgetError::SelfTransfer => "VALIDATION_ERROR",
            BudgetError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            BudgetError::InsufficientLockedFunds { .. } => "INSUFFICIENT_LOCKED_FUNDS",
            BudgetError::BudgetFrozen(_) => "BUDGET_FROZEN",
            BudgetError::IdempotencyKeyConflict(_) => "IDEMPOTENCY_KEY_CONFLICT",
            BudgetError::ConcurrentRequest(_) => "CONCURRENT_REQUEST",
            BudgetError::BalanceOverflow => "VALIDATION_ERROR",
        }
    }

    /// Get a client-safe error message that doesn't leak internals.
    ///
    /// Database errors are sanitized to prevent information disclosure about
    /// the internal system structure; user IDs are redacted.
    pub fn client_message(&self) -> String {
        match self {
            BudgetError::Database(_) | BudgetError::CorruptRecord(_) => {
                "Internal server error".to_string()
            }
            BudgetError::BudgetFrozen(_) => "Budget is frozen".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for budget operations
pub type BudgetResult<T> = Result<T, BudgetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = BudgetError::InsufficientFunds {
            available: 70,
            required: 200,
        };
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert!(err.client_message().contains("70"));

        let err = BudgetError::IdempotencyKeyConflict("k1".to_string());
        assert_eq!(err.code(), "IDEMPOTENCY_KEY_CONFLICT");

        let err = BudgetError::InvalidAmount(-5);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_database_error_is_sanitized() {
        let err = BudgetError::Database(sqlx::Error::PoolClosed);
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
