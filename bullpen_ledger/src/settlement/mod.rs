//! Room settlement module.
//!
//! This module turns a completed room into ledger entries:
//! - Mark-to-market portfolio valuation and ranking
//! - Rake calculation from the active configuration
//! - Pool distribution by payout model
//! - Idempotent unlock and payout entries via the budget engine
//! - Room and member cancellation refunds
//!
//! ## Example
//!
//! ```no_run
//! use bullpen_ledger::budget::BudgetEngine;
//! use bullpen_ledger::settlement::{FixedPrices, PayoutModel, SettlementEngine};
//! use bullpen_ledger::db::Database;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let pool = Arc::new(db.pool().clone());
//!     let engine = BudgetEngine::new(pool.clone());
//!     let settlement = SettlementEngine::new(
//!         pool,
//!         engine,
//!         Arc::new(FixedPrices::default()),
//!         PayoutModel::WinnerTakeAll,
//!     );
//!
//!     let report = settlement.settle_room(7).await?;
//!     println!("settled: pool {}, rake {}", report.pool, report.rake);
//!
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod models;

pub use engine::{
    FixedPrices, PriceSource, SettlementEngine, SettlementError, SettlementResult,
};
pub use models::{
    BullPen, BullPenMember, BullPenState, CancellationReport, MemberResult, MemberSettlement,
    MemberStanding, PayoutModel, RakeConfig, SettlementReport, SettlementStatus, SweepOutcome,
};
