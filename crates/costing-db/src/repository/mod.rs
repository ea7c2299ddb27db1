//! # Repository Module
//!
//! Database repository implementations for the Batch Ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  CostingService                                                        │
//! │       │                                                                 │
//! │       │  db.consumptions().consume("b-1", 5, Sale, now)                │
//! │       ▼                                                                 │
//! │  ConsumptionRepository                                                 │
//! │  ├── BEGIN IMMEDIATE  (write lock first, queues on busy_timeout)       │
//! │  ├── read batch, run costing_core::ledger::plan_consumption            │
//! │  ├── guarded UPDATE (available_quantity >= q)                          │
//! │  ├── INSERT consumption record                                         │
//! │  └── COMMIT  (any error before this point rolls everything back)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  The rules live in costing-core; repositories decide only how the     │
//! │  outcome is written and where the transaction boundary sits.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`BatchRepository`](batch::BatchRepository) - Goods receipt and batch queries
//! - [`ConsumptionRepository`](consumption::ConsumptionRepository) - Consumption and returns
//! - [`CostSetRepository`](cost_set::CostSetRepository) - Purchase-order cost sets
//! - [`AllocationRepository`](allocation::AllocationRepository) - Applying allocation results
//! - [`StandardCostRepository`](standard_cost::StandardCostRepository) - Standard cost registry

pub mod allocation;
pub mod batch;
pub mod consumption;
pub mod cost_set;
pub mod standard_cost;

use costing_core::CoreError;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::error;

use crate::error::{DbError, DbResult};

/// Opens a transaction that holds the database write lock from its first
/// statement.
///
/// Write paths read before they write, and a deferred transaction cannot
/// upgrade a stale WAL snapshot to a writer (`SQLITE_BUSY`, no retry).
/// Writers queue on `busy_timeout` instead.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Wraps a costing rule failure raised inside a transaction.
///
/// Ledger inconsistencies are logged here, at the point they are detected,
/// before the transaction is dropped and rolled back.
pub(crate) fn ledger_error(err: CoreError) -> DbError {
    if err.is_fatal() {
        error!(error = %err, "Ledger invariant violated, transaction rolled back");
    }
    DbError::Core(err)
}
