//! HTTP server for the bull pen budget ledger.
//!
//! Exposes the internal-service mutation endpoints (credit, debit, lock,
//! unlock, adjust, transfer, settlement, cancellation) and the user-facing
//! read endpoints (budget, budget logs) on top of the `bullpen_ledger`
//! library crate.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
