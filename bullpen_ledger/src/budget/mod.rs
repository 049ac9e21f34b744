//! Budget ledger: per-user balances, append-only log, idempotent operations.
//!
//! The ledger store is the only shared mutable resource in the system; every
//! balance change goes through [`BudgetEngine`], which wraps each operation
//! in the idempotency guard and a single database transaction.

pub mod engine;
pub mod errors;
pub mod idempotency;
pub mod models;
pub mod store;

pub use engine::{BudgetEngine, LedgerEvents, NoopEvents};
pub use errors::{BudgetError, BudgetResult};
pub use idempotency::{Begin, IdempotencyGuard};
pub use models::{
    AdjustRequest, Budget, BudgetLogEntry, BudgetStatus, BullPenId, EntryDirection, LogFilter,
    NewLogEntry, OperationOutcome, OperationRequest, OperationType, TransferOutcome,
    TransferRequest,
};
pub use store::LedgerStore;
