//! Budget operations engine.
//!
//! Implements credit, debit, lock, unlock, transfer, and admin adjustments
//! as atomic state transitions over the ledger store. Every operation runs
//! the same pipeline: validate inputs, claim the idempotency key, execute
//! inside one storage transaction, finalize the idempotency record.

use super::{
    errors::{BudgetError, BudgetResult},
    idempotency::{Begin, IdempotencyGuard},
    models::{
        AdjustRequest, EntryDirection, NewLogEntry, OperationOutcome, OperationRequest,
        OperationType, TransferOutcome, TransferRequest,
    },
    store::LedgerStore,
};
use crate::DEFAULT_CURRENCY;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Outbound event port, invoked after each successful mutation.
///
/// The transport (push, poll, message bus) is an external collaborator; the
/// engine only reports that an entry was committed.
pub trait LedgerEvents: Send + Sync {
    fn on_entry(&self, log_id: i64, entry: &NewLogEntry);
}

/// Default no-op event sink
pub struct NoopEvents;

impl LedgerEvents for NoopEvents {
    fn on_entry(&self, _log_id: i64, _entry: &NewLogEntry) {}
}

/// The four single-budget operations share one execution path; only the
/// deltas and defaults differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Credit,
    Debit,
    Lock,
    Unlock,
}

impl OpKind {
    fn name(self) -> &'static str {
        match self {
            OpKind::Credit => "credit",
            OpKind::Debit => "debit",
            OpKind::Lock => "lock",
            OpKind::Unlock => "unlock",
        }
    }

    fn direction(self) -> EntryDirection {
        match self {
            OpKind::Credit | OpKind::Unlock => EntryDirection::In,
            OpKind::Debit | OpKind::Lock => EntryDirection::Out,
        }
    }

    fn default_operation_type(self) -> OperationType {
        match self {
            OpKind::Credit => OperationType::Credit,
            OpKind::Debit => OperationType::Debit,
            OpKind::Lock => OperationType::Lock,
            OpKind::Unlock => OperationType::Unlock,
        }
    }

    /// (available_delta, locked_delta) for a positive amount
    fn deltas(self, amount: i64) -> (i64, i64) {
        match self {
            OpKind::Credit => (amount, 0),
            OpKind::Debit => (-amount, 0),
            OpKind::Lock => (-amount, amount),
            OpKind::Unlock => (amount, -amount),
        }
    }
}

/// Budget operations engine
#[derive(Clone)]
pub struct BudgetEngine {
    store: LedgerStore,
    guard: IdempotencyGuard,
    pool: Arc<PgPool>,
    events: Arc<dyn LedgerEvents>,
}

impl BudgetEngine {
    /// Create a new engine over the shared connection pool
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self::with_events(pool, Arc::new(NoopEvents))
    }

    /// Create an engine with an outbound event sink
    pub fn with_events(pool: Arc<PgPool>, events: Arc<dyn LedgerEvents>) -> Self {
        Self {
            store: LedgerStore::new(pool.clone()),
            guard: IdempotencyGuard::new(pool.clone()),
            pool,
            events,
        }
    }

    /// Read access to the underlying ledger store
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Credit a user's available balance.
    pub async fn credit(
        &self,
        idempotency_key: &str,
        req: OperationRequest,
    ) -> BudgetResult<OperationOutcome> {
        self.apply_single(idempotency_key, OpKind::Credit, req, false)
            .await
    }

    /// Debit a user's available balance.
    ///
    /// # Errors
    ///
    /// * `InsufficientFunds` - the balance would go negative
    pub async fn debit(
        &self,
        idempotency_key: &str,
        req: OperationRequest,
    ) -> BudgetResult<OperationOutcome> {
        self.apply_single(idempotency_key, OpKind::Debit, req, false)
            .await
    }

    /// Reserve funds: available -> locked. Total balance is unchanged.
    pub async fn lock(
        &self,
        idempotency_key: &str,
        req: OperationRequest,
    ) -> BudgetResult<OperationOutcome> {
        self.apply_single(idempotency_key, OpKind::Lock, req, false)
            .await
    }

    /// Release reserved funds: locked -> available.
    ///
    /// # Errors
    ///
    /// * `InsufficientLockedFunds` - the locked balance would go negative
    pub async fn unlock(
        &self,
        idempotency_key: &str,
        req: OperationRequest,
    ) -> BudgetResult<OperationOutcome> {
        self.apply_single(idempotency_key, OpKind::Unlock, req, false)
            .await
    }

    /// Admin adjustment: a credit or debit logged as `ADJUSTMENT` with the
    /// operator recorded in the entry's meta. Applies to frozen budgets.
    pub async fn adjust(
        &self,
        idempotency_key: &str,
        req: AdjustRequest,
    ) -> BudgetResult<OperationOutcome> {
        let kind = match req.direction {
            EntryDirection::In => OpKind::Credit,
            EntryDirection::Out => OpKind::Debit,
        };

        let mut meta = match req.meta.clone() {
            Some(serde_json::Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        if let Some(created_by) = &req.created_by {
            meta.insert("created_by".to_string(), json!(created_by));
        }

        let op_req = OperationRequest {
            user_id: req.user_id,
            amount: req.amount,
            currency: req.currency.clone(),
            operation_type: Some(OperationType::Adjustment),
            bull_pen_id: None,
            season_id: None,
            correlation_id: req.correlation_id.clone(),
            meta: Some(serde_json::Value::Object(meta)),
        };

        self.apply_single(idempotency_key, kind, op_req, true).await
    }

    /// Move funds between two users' available balances.
    ///
    /// Both legs commit in one transaction, sharing a correlation ID and
    /// cross-referencing each other's log ids; either both succeed or
    /// neither does.
    pub async fn transfer(
        &self,
        idempotency_key: &str,
        req: TransferRequest,
    ) -> BudgetResult<TransferOutcome> {
        if req.amount <= 0 {
            return Err(BudgetError::InvalidAmount(req.amount));
        }
        if req.from_user_id == req.to_user_id {
            return Err(BudgetError::SelfTransfer);
        }

        let fingerprint =
            IdempotencyGuard::fingerprint("transfer", &serde_json::to_value(&req)?);
        match self.guard.begin(idempotency_key, &fingerprint).await? {
            Begin::Replay(stored) => {
                let mut outcome: TransferOutcome = serde_json::from_value(stored)?;
                outcome.idempotent = true;
                return Ok(outcome);
            }
            Begin::Fresh => {}
        }

        match self.execute_transfer(&req).await {
            Ok((outcome, legs)) => {
                self.guard
                    .complete(idempotency_key, &serde_json::to_value(&outcome)?)
                    .await?;
                for (log_id, entry) in &legs {
                    self.events.on_entry(*log_id, entry);
                }
                Ok(outcome)
            }
            Err(e) => {
                // Best effort: the original error matters more than a
                // failure to mark the record.
                let _ = self.guard.fail(idempotency_key, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Freeze a budget: all non-admin mutations are rejected until unfrozen.
    pub async fn freeze(&self, user_id: i64, currency: Option<&str>) -> BudgetResult<()> {
        self.store
            .set_status(
                user_id,
                currency.unwrap_or(DEFAULT_CURRENCY),
                super::models::BudgetStatus::Frozen,
            )
            .await
    }

    /// Unfreeze a budget.
    pub async fn unfreeze(&self, user_id: i64, currency: Option<&str>) -> BudgetResult<()> {
        self.store
            .set_status(
                user_id,
                currency.unwrap_or(DEFAULT_CURRENCY),
                super::models::BudgetStatus::Active,
            )
            .await
    }

    async fn apply_single(
        &self,
        idempotency_key: &str,
        kind: OpKind,
        req: OperationRequest,
        allow_frozen: bool,
    ) -> BudgetResult<OperationOutcome> {
        // Validation errors never touch state, including the guard.
        if req.amount <= 0 {
            return Err(BudgetError::InvalidAmount(req.amount));
        }

        let fingerprint =
            IdempotencyGuard::fingerprint(kind.name(), &serde_json::to_value(&req)?);
        match self.guard.begin(idempotency_key, &fingerprint).await? {
            Begin::Replay(stored) => {
                let mut outcome: OperationOutcome = serde_json::from_value(stored)?;
                outcome.idempotent = true;
                return Ok(outcome);
            }
            Begin::Fresh => {}
        }

        match self.execute_single(kind, &req, allow_frozen).await {
            Ok((outcome, log_id, entry)) => {
                self.guard
                    .complete(idempotency_key, &serde_json::to_value(&outcome)?)
                    .await?;
                self.events.on_entry(log_id, &entry);
                Ok(outcome)
            }
            Err(e) => {
                let _ = self.guard.fail(idempotency_key, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn execute_single(
        &self,
        kind: OpKind,
        req: &OperationRequest,
        allow_frozen: bool,
    ) -> BudgetResult<(OperationOutcome, i64, NewLogEntry)> {
        let currency = req
            .currency
            .clone()
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let (available_delta, locked_delta) = kind.deltas(req.amount);

        let mut tx = self.pool.begin().await?;

        let (before, after) = self
            .store
            .apply_delta(
                &mut tx,
                req.user_id,
                &currency,
                available_delta,
                locked_delta,
                allow_frozen,
            )
            .await?;

        let entry = NewLogEntry {
            user_id: req.user_id,
            direction: kind.direction(),
            operation_type: req
                .operation_type
                .unwrap_or_else(|| kind.default_operation_type()),
            amount: req.amount,
            currency,
            balance_before: before.available_balance,
            balance_after: after.available_balance,
            bull_pen_id: req.bull_pen_id,
            season_id: req.season_id,
            correlation_id: req.correlation_id.clone(),
            related_log_id: None,
            meta: req.meta.clone().unwrap_or_else(|| json!({})),
        };
        let log_id = self.store.append_log(&mut tx, &entry).await?;

        tx.commit().await?;

        let outcome = OperationOutcome {
            log_id,
            balance_before: before.available_balance,
            balance_after: after.available_balance,
            idempotent: false,
        };
        Ok((outcome, log_id, entry))
    }

    async fn execute_transfer(
        &self,
        req: &TransferRequest,
    ) -> BudgetResult<(TransferOutcome, Vec<(i64, NewLogEntry)>)> {
        let currency = req
            .currency
            .clone()
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let correlation_id = req
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let meta = req.meta.clone().unwrap_or_else(|| json!({}));

        let mut tx = self.pool.begin().await?;

        // Lock both rows in ascending user_id order so two opposite-direction
        // transfers can never deadlock.
        let (first, second) = if req.from_user_id < req.to_user_id {
            (req.from_user_id, req.to_user_id)
        } else {
            (req.to_user_id, req.from_user_id)
        };
        self.store.get_or_create(&mut tx, first, &currency).await?;
        self.store.get_or_create(&mut tx, second, &currency).await?;

        let (from_before, from_after) = self
            .store
            .apply_delta(&mut tx, req.from_user_id, &currency, -req.amount, 0, false)
            .await?;
        let (to_before, to_after) = self
            .store
            .apply_delta(&mut tx, req.to_user_id, &currency, req.amount, 0, false)
            .await?;

        let out_entry = NewLogEntry {
            user_id: req.from_user_id,
            direction: EntryDirection::Out,
            operation_type: OperationType::TransferOut,
            amount: req.amount,
            currency: currency.clone(),
            balance_before: from_before.available_balance,
            balance_after: from_after.available_balance,
            bull_pen_id: None,
            season_id: None,
            correlation_id: Some(correlation_id.clone()),
            related_log_id: None,
            meta: meta.clone(),
        };
        let from_log_id = self.store.append_log(&mut tx, &out_entry).await?;

        let in_entry = NewLogEntry {
            user_id: req.to_user_id,
            direction: EntryDirection::In,
            operation_type: OperationType::TransferIn,
            amount: req.amount,
            currency,
            balance_before: to_before.available_balance,
            balance_after: to_after.available_balance,
            bull_pen_id: None,
            season_id: None,
            correlation_id: Some(correlation_id.clone()),
            related_log_id: Some(from_log_id),
            meta,
        };
        let to_log_id = self.store.append_log(&mut tx, &in_entry).await?;
        self.store
            .set_related_log(&mut tx, from_log_id, to_log_id)
            .await?;

        tx.commit().await?;

        let outcome = TransferOutcome {
            from_log_id,
            to_log_id,
            from_balance_before: from_before.available_balance,
            from_balance_after: from_after.available_balance,
            to_balance_before: to_before.available_balance,
            to_balance_after: to_after.available_balance,
            correlation_id,
            idempotent: false,
        };
        Ok((
            outcome,
            vec![(from_log_id, out_entry), (to_log_id, in_entry)],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_kind_deltas() {
        assert_eq!(OpKind::Credit.deltas(50), (50, 0));
        assert_eq!(OpKind::Debit.deltas(50), (-50, 0));
        assert_eq!(OpKind::Lock.deltas(30), (-30, 30));
        assert_eq!(OpKind::Unlock.deltas(30), (30, -30));
    }

    #[test]
    fn test_op_kind_directions_match_balance_effect() {
        // IN increases the available balance, OUT decreases it.
        for kind in [OpKind::Credit, OpKind::Debit, OpKind::Lock, OpKind::Unlock] {
            let (available_delta, _) = kind.deltas(10);
            match kind.direction() {
                EntryDirection::In => assert!(available_delta > 0, "{:?}", kind),
                EntryDirection::Out => assert!(available_delta < 0, "{:?}", kind),
            }
        }
    }

    #[test]
    fn test_lock_and_unlock_preserve_total() {
        for kind in [OpKind::Lock, OpKind::Unlock] {
            let (available_delta, locked_delta) = kind.deltas(25);
            assert_eq!(available_delta + locked_delta, 0);
        }
    }
}
