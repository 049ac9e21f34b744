//! # Bullpen Ledger
//!
//! Virtual-currency accounting for the bull pen fantasy trading game.
//!
//! The crate is built around a double-entry-style budget ledger: every user
//! holds one budget per currency (an available balance plus a locked
//! balance), every balance change appends an immutable log entry, and every
//! externally-triggered operation is deduplicated by a caller-supplied
//! idempotency key so at-least-once callers never double-apply.
//!
//! ## Core Modules
//!
//! - [`budget`]: ledger store, idempotency guard, and the budget operations
//!   engine (credit, debit, lock, unlock, transfer, adjust)
//! - [`settlement`]: room outcome computation, rake, and pool distribution
//! - [`reconcile`]: read-only cross-checks between the ledger and the
//!   room/settlement/promotion records
//! - [`db`]: PostgreSQL connection pooling
//!
//! ## Example
//!
//! ```no_run
//! use bullpen_ledger::budget::{BudgetEngine, OperationRequest};
//! use bullpen_ledger::db::{Database, DatabaseConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&DatabaseConfig::from_env()).await?;
//!     let engine = BudgetEngine::new(Arc::new(db.pool().clone()));
//!     let outcome = engine
//!         .credit("signup-bonus-42", OperationRequest::new(42, 10_000))
//!         .await?;
//!     println!("credited, log id {}", outcome.log_id);
//!     Ok(())
//! }
//! ```

/// PostgreSQL connection pooling and configuration.
pub mod db;
pub use db::{Database, DatabaseConfig};

/// Budget ledger: store, idempotency guard, operations engine.
pub mod budget;
pub use budget::{BudgetEngine, BudgetError, BudgetResult};

/// Room settlement: ranking, rake, pool distribution.
pub mod settlement;
pub use settlement::{SettlementEngine, SettlementError, SettlementResult};

/// Read-only reconciliation checks.
pub mod reconcile;
pub use reconcile::ReconciliationChecker;

/// Default virtual currency tag. A single currency is assumed; the tag is
/// carried on every row for future extension.
pub const DEFAULT_CURRENCY: &str = "BUX";
