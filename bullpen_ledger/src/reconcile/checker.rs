//! Reconciliation checker.
//!
//! Cross-checks the ledger against the room, rake, and promotion records it
//! is supposed to agree with. Strictly read-only: issues are reported to
//! operators, never repaired automatically.

use log::{info, warn};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use thiserror::Error;

/// Reconciliation errors
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Result of one check
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    /// Number of rows the check inspected
    pub checked: u64,
    pub issues: Vec<String>,
}

impl CheckOutcome {
    fn new(name: &'static str, checked: u64, issues: Vec<String>) -> Self {
        Self {
            name,
            checked,
            issues,
        }
    }
}

/// Aggregated result of a full reconciliation pass
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReconciliationReport {
    pub checks: Vec<CheckOutcome>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.checks.iter().all(|c| c.issues.is_empty())
    }

    pub fn issue_count(&self) -> usize {
        self.checks.iter().map(|c| c.issues.len()).sum()
    }
}

/// Read-only reconciliation checker
#[derive(Clone)]
pub struct ReconciliationChecker {
    pool: Arc<PgPool>,
}

impl ReconciliationChecker {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Run all checks and aggregate their outcomes. Issues are logged as
    /// they are found; the pass itself mutates nothing.
    pub async fn run_all(&self) -> ReconcileResult<ReconciliationReport> {
        let checks = vec![
            self.check_settled_rooms_have_entries().await?,
            self.check_settled_rooms_have_rake().await?,
            self.check_log_integrity().await?,
            self.check_bonus_redemptions().await?,
        ];

        let report = ReconciliationReport { checks };
        for check in &report.checks {
            for issue in &check.issues {
                warn!("reconciliation [{}]: {issue}", check.name);
            }
        }
        if report.is_clean() {
            info!("reconciliation pass clean");
        } else {
            warn!("reconciliation pass found {} issue(s)", report.issue_count());
        }
        Ok(report)
    }

    /// Every settled room must have at least one ledger entry under its
    /// settlement correlation id.
    pub async fn check_settled_rooms_have_entries(&self) -> ReconcileResult<CheckOutcome> {
        let checked = self.count_settled_rooms().await?;

        let rows = sqlx::query(
            "SELECT bp.id
             FROM bull_pens bp
             WHERE bp.settlement_status = 'completed'
               AND NOT EXISTS (
                   SELECT 1 FROM budget_logs bl
                   WHERE bl.bull_pen_id = bp.id
                     AND bl.correlation_id = bp.settlement_correlation_id
               )
             ORDER BY bp.id",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        let issues = rows
            .into_iter()
            .map(|row| {
                format!(
                    "settled bull pen {} has no ledger entries for its settlement",
                    row.get::<i64, _>("id")
                )
            })
            .collect();

        Ok(CheckOutcome::new("settled_rooms_have_entries", checked, issues))
    }

    /// Every settled room must have a rake collection row, amount possibly
    /// zero.
    pub async fn check_settled_rooms_have_rake(&self) -> ReconcileResult<CheckOutcome> {
        let checked = self.count_settled_rooms().await?;

        let rows = sqlx::query(
            "SELECT bp.id
             FROM bull_pens bp
             WHERE bp.settlement_status = 'completed'
               AND NOT EXISTS (
                   SELECT 1 FROM rake_collections rc WHERE rc.bull_pen_id = bp.id
               )
             ORDER BY bp.id",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        let issues = rows
            .into_iter()
            .map(|row| {
                format!(
                    "settled bull pen {} has no rake collection row",
                    row.get::<i64, _>("id")
                )
            })
            .collect();

        Ok(CheckOutcome::new("settled_rooms_have_rake", checked, issues))
    }

    /// Structural invariants on the log itself: settlement entries carry a
    /// correlation id, and no entry has a non-positive amount.
    pub async fn check_log_integrity(&self) -> ReconcileResult<CheckOutcome> {
        let checked: i64 = sqlx::query("SELECT COUNT(*) AS n FROM budget_logs")
            .fetch_one(self.pool.as_ref())
            .await?
            .get("n");

        let rows = sqlx::query(
            "SELECT id, operation_type, amount, correlation_id
             FROM budget_logs
             WHERE (operation_type IN ('ROOM_SETTLEMENT_WIN', 'ROOM_SETTLEMENT_LOSS',
                                       'ROOM_SETTLEMENT_BREAKEVEN')
                    AND correlation_id IS NULL)
                OR amount <= 0
             ORDER BY id",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        let issues = rows
            .into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let amount: i64 = row.get("amount");
                if amount <= 0 {
                    format!("log entry {id} has non-positive amount {amount}")
                } else {
                    format!(
                        "settlement log entry {id} ({}) has no correlation id",
                        row.get::<String, _>("operation_type")
                    )
                }
            })
            .collect();

        Ok(CheckOutcome::new("log_integrity", checked as u64, issues))
    }

    /// Every bonus redemption recorded by the promotion service must have a
    /// matching ledger entry under the same correlation id.
    pub async fn check_bonus_redemptions(&self) -> ReconcileResult<CheckOutcome> {
        let checked: i64 = sqlx::query("SELECT COUNT(*) AS n FROM bonus_redemptions")
            .fetch_one(self.pool.as_ref())
            .await?
            .get("n");

        let rows = sqlx::query(
            "SELECT br.id, br.user_id, br.correlation_id
             FROM bonus_redemptions br
             WHERE NOT EXISTS (
                 SELECT 1 FROM budget_logs bl
                 WHERE bl.correlation_id = br.correlation_id
                   AND bl.user_id = br.user_id
             )
             ORDER BY br.id",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        let issues = rows
            .into_iter()
            .map(|row| {
                format!(
                    "bonus redemption {} for user {} ({}) has no ledger entry",
                    row.get::<i64, _>("id"),
                    row.get::<i64, _>("user_id"),
                    row.get::<String, _>("correlation_id"),
                )
            })
            .collect();

        Ok(CheckOutcome::new("bonus_redemptions", checked as u64, issues))
    }

    async fn count_settled_rooms(&self) -> ReconcileResult<u64> {
        let n: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM bull_pens WHERE settlement_status = 'completed'")
                .fetch_one(self.pool.as_ref())
                .await?
                .get("n");
        Ok(n as u64)
    }
}
