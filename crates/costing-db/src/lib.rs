//! # costing-db: Database Layer for the Costing Engine
//!
//! This crate persists the Batch Ledger in SQLite with sqlx and runs every
//! ledger mutation as one transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Costing Engine Data Flow                         │
//! │                                                                         │
//! │  CostingService (AllocatePurchaseOrderCosts)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   costing-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ BatchRepo      │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ ConsumptionRepo│   │ 001_costing_ │  │   │
//! │  │   │ Connection    │    │ CostSetRepo    │   │ schema.sql   │  │   │
//! │  │   │ Management    │    │ AllocationRepo │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/costing.db                                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (batch, consumption, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use costing_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/costing.db")).await?;
//!
//! let batch = db.batches().receive(new_batch).await?;
//! let record = db.consumptions().consume(&batch.id, 5, ConsumptionKind::Sale, now).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::allocation::AllocationRepository;
pub use repository::batch::BatchRepository;
pub use repository::consumption::ConsumptionRepository;
pub use repository::cost_set::CostSetRepository;
pub use repository::standard_cost::StandardCostRepository;
