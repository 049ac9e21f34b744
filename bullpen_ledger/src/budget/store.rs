//! Durable, transactional storage of budgets and budget log entries.
//!
//! All mutating calls for a given (user_id, currency) pair are serialized by
//! a `FOR UPDATE` row lock taken inside the caller's transaction. Operations
//! on different users proceed in parallel; transfers must lock both rows in
//! ascending user_id order (see the engine) to avoid deadlock.

use super::{
    errors::{BudgetError, BudgetResult},
    models::{
        Budget, BudgetLogEntry, BudgetStatus, EntryDirection, LogFilter, NewLogEntry,
        OperationType,
    },
};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

const DEFAULT_LOG_PAGE: i64 = 50;
const MAX_LOG_PAGE: i64 = 200;

/// Ledger store over the shared connection pool
#[derive(Clone)]
pub struct LedgerStore {
    pool: Arc<PgPool>,
}

impl LedgerStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }

    /// Get the budget row for a user, creating it with zero balances if
    /// absent, and lock it against concurrent writers.
    ///
    /// Row insertion is itself idempotent via the (user_id, currency)
    /// unique constraint.
    pub async fn get_or_create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        currency: &str,
    ) -> BudgetResult<Budget> {
        sqlx::query(
            "INSERT INTO budgets (user_id, currency)
             VALUES ($1, $2)
             ON CONFLICT (user_id, currency) DO NOTHING",
        )
        .bind(user_id)
        .bind(currency)
        .execute(&mut **tx)
        .await?;

        let row = sqlx::query(
            "SELECT user_id, currency, available_balance, locked_balance, status,
                    created_at, updated_at
             FROM budgets
             WHERE user_id = $1 AND currency = $2
             FOR UPDATE",
        )
        .bind(user_id)
        .bind(currency)
        .fetch_one(&mut **tx)
        .await?;

        Ok(budget_from_row(&row))
    }

    /// Atomically apply a delta to a user's balances.
    ///
    /// Locks the row, validates that the resulting balances stay
    /// non-negative, writes the new balances, and returns the (before,
    /// after) states. Fails without partial writes.
    pub async fn apply_delta(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        currency: &str,
        available_delta: i64,
        locked_delta: i64,
        allow_frozen: bool,
    ) -> BudgetResult<(Budget, Budget)> {
        let before = self.get_or_create(tx, user_id, currency).await?;

        if before.status == BudgetStatus::Frozen && !allow_frozen {
            return Err(BudgetError::BudgetFrozen(user_id));
        }

        let new_available = before
            .available_balance
            .checked_add(available_delta)
            .ok_or(BudgetError::BalanceOverflow)?;
        let new_locked = before
            .locked_balance
            .checked_add(locked_delta)
            .ok_or(BudgetError::BalanceOverflow)?;

        if new_available < 0 {
            return Err(BudgetError::InsufficientFunds {
                available: before.available_balance,
                required: -available_delta,
            });
        }
        if new_locked < 0 {
            return Err(BudgetError::InsufficientLockedFunds {
                locked: before.locked_balance,
                required: -locked_delta,
            });
        }

        let row = sqlx::query(
            "UPDATE budgets
             SET available_balance = $1, locked_balance = $2, updated_at = NOW()
             WHERE user_id = $3 AND currency = $4
             RETURNING user_id, currency, available_balance, locked_balance, status,
                       created_at, updated_at",
        )
        .bind(new_available)
        .bind(new_locked)
        .bind(user_id)
        .bind(currency)
        .fetch_one(&mut **tx)
        .await?;

        Ok((before, budget_from_row(&row)))
    }

    /// Append one immutable log entry within the caller's transaction.
    ///
    /// Always called in the same transaction as the corresponding
    /// `apply_delta`, so a rollback discards both.
    pub async fn append_log(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewLogEntry,
    ) -> BudgetResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO budget_logs
                (user_id, direction, operation_type, amount, currency,
                 balance_before, balance_after, bull_pen_id, season_id,
                 correlation_id, related_log_id, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.direction.to_string())
        .bind(entry.operation_type.to_string())
        .bind(entry.amount)
        .bind(&entry.currency)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(entry.bull_pen_id)
        .bind(entry.season_id)
        .bind(&entry.correlation_id)
        .bind(entry.related_log_id)
        .bind(&entry.meta)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.get("id"))
    }

    /// Link a transfer leg to its opposite leg.
    pub async fn set_related_log(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        log_id: i64,
        related_log_id: i64,
    ) -> BudgetResult<()> {
        sqlx::query("UPDATE budget_logs SET related_log_id = $1 WHERE id = $2")
            .bind(related_log_id)
            .bind(log_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Read a user's budget without locking. `None` if no operation has
    /// created it yet.
    pub async fn get_budget(&self, user_id: i64, currency: &str) -> BudgetResult<Option<Budget>> {
        let row = sqlx::query(
            "SELECT user_id, currency, available_balance, locked_balance, status,
                    created_at, updated_at
             FROM budgets
             WHERE user_id = $1 AND currency = $2",
        )
        .bind(user_id)
        .bind(currency)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|r| budget_from_row(&r)))
    }

    /// Paginated log history for a user, newest first.
    pub async fn get_entries(
        &self,
        user_id: i64,
        filter: &LogFilter,
    ) -> BudgetResult<Vec<BudgetLogEntry>> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LOG_PAGE)
            .clamp(1, MAX_LOG_PAGE);
        let offset = filter.offset.unwrap_or(0).max(0);

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, direction, operation_type, amount, currency,
                   balance_before, balance_after, bull_pen_id, season_id,
                   correlation_id, related_log_id, meta, created_at
            FROM budget_logs
            WHERE user_id = $1
              AND ($2::text IS NULL OR operation_type = $2)
              AND ($3::bigint IS NULL OR bull_pen_id = $3)
            ORDER BY id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(filter.operation_type.map(|op| op.to_string()))
        .bind(filter.bull_pen_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(log_from_row).collect())
    }

    /// Sum of logged IN amounts minus OUT amounts for one user. Directions
    /// track the available balance (a lock is OUT, an unlock is IN), so this
    /// must equal the available balance at all times. The cast matters:
    /// SUM over bigint yields numeric, which sqlx will not decode as i64.
    pub async fn net_logged(&self, user_id: i64, currency: &str) -> BudgetResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(CASE WHEN direction = 'IN' THEN amount ELSE -amount END), 0)::bigint AS net
             FROM budget_logs
             WHERE user_id = $1 AND currency = $2",
        )
        .bind(user_id)
        .bind(currency)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.get("net"))
    }

    /// Set a budget's lifecycle status (freeze/unfreeze).
    pub async fn set_status(
        &self,
        user_id: i64,
        currency: &str,
        status: BudgetStatus,
    ) -> BudgetResult<()> {
        sqlx::query(
            "UPDATE budgets SET status = $1, updated_at = NOW()
             WHERE user_id = $2 AND currency = $3",
        )
        .bind(status.to_string())
        .bind(user_id)
        .bind(currency)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

fn budget_from_row(row: &sqlx::postgres::PgRow) -> Budget {
    Budget {
        user_id: row.get("user_id"),
        currency: row.get("currency"),
        available_balance: row.get("available_balance"),
        locked_balance: row.get("locked_balance"),
        status: BudgetStatus::parse(&row.get::<String, _>("status")),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
    }
}

fn log_from_row(row: &sqlx::postgres::PgRow) -> BudgetLogEntry {
    BudgetLogEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        direction: EntryDirection::parse(&row.get::<String, _>("direction")),
        operation_type: OperationType::parse(&row.get::<String, _>("operation_type"))
            .unwrap_or(OperationType::Adjustment),
        amount: row.get("amount"),
        currency: row.get("currency"),
        balance_before: row.get("balance_before"),
        balance_after: row.get("balance_after"),
        bull_pen_id: row.get("bull_pen_id"),
        season_id: row.get("season_id"),
        correlation_id: row.get("correlation_id"),
        related_log_id: row.get("related_log_id"),
        meta: row.get("meta"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    }
}
