//! Read-only reconciliation between the ledger and its neighbors.

pub mod checker;

pub use checker::{
    CheckOutcome, ReconcileError, ReconcileResult, ReconciliationChecker, ReconciliationReport,
};
