//! # Ledger Store
//!
//! Opens the SQLite file that holds the Batch Ledger and hands out
//! repositories over a shared pool.
//!
//! ## Readers and Writers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SqlitePool (WAL)                                │
//! │                                                                         │
//! │   valuation / report / optimizer        consume / return / allocate    │
//! │   ─────────────────────────────         ───────────────────────────    │
//! │   plain SELECT on any connection        BEGIN IMMEDIATE                 │
//! │   reads a committed snapshot            waits up to busy_timeout for    │
//! │   never blocks on a writer              the single write lock, then     │
//! │                                         reads fresh rows and writes     │
//! │                                                                         │
//! │   conn 1   conn 2   ...   conn N  (max_connections)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writers line up behind each other on `busy_timeout`. A writer that is
//! still waiting when the timeout expires fails with a database error and
//! leaves the ledger unchanged.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::allocation::AllocationRepository;
use crate::repository::batch::BatchRepository;
use crate::repository::consumption::ConsumptionRepository;
use crate::repository::cost_set::CostSetRepository;
use crate::repository::standard_cost::StandardCostRepository;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the ledger lives and how the pool around it behaves.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/costing/costing.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(15));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Ledger file; `:memory:` for a throwaway database.
    pub database_path: PathBuf,

    /// Pool ceiling. Default 5.
    pub max_connections: u32,

    /// Connections kept open while idle. Default 1.
    pub min_connections: u32,

    /// Wait for a free pool connection. Default 30 s.
    pub connect_timeout: Duration,

    /// Idle connections are closed after this. Default 10 min.
    pub idle_timeout: Duration,

    /// Wait for the SQLite write lock. Default 10 s.
    pub busy_timeout: Duration,

    /// Apply pending migrations when the pool opens. Default true.
    pub run_migrations: bool,
}

impl DbConfig {
    /// A file-backed ledger at `path`, created on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(10),
            run_migrations: true,
        }
    }

    /// A private in-memory ledger for tests.
    ///
    /// Every SQLite connection to `:memory:` opens its own empty database,
    /// so the pool is pinned to one connection.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            ..DbConfig::new(MEMORY_PATH)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn is_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    /// Per-connection SQLite settings: WAL journal, NORMAL sync, enforced
    /// foreign keys and the write-lock wait.
    fn connect_options(&self) -> SqliteConnectOptions {
        let options = if self.is_memory() {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
        };

        options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the ledger store. Clones share one pool.
///
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./costing.db")).await?;
/// let on_hand = db.batches().list_by_product("p-1", None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and, unless disabled, brings the schema up to date.
    ///
    /// ## Errors
    /// - `ConnectionFailed` when the file cannot be opened or created
    /// - `MigrationFailed` when a pending migration fails
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "Opening ledger store"
        );

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!("Pool ready");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Applies pending migrations. Safe to repeat.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await?;
        info!("Ledger schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Goods receipt and batch lookups.
    pub fn batches(&self) -> BatchRepository {
        BatchRepository::new(self.pool.clone())
    }

    /// Sales, transfers, scrap and returns.
    pub fn consumptions(&self) -> ConsumptionRepository {
        ConsumptionRepository::new(self.pool.clone())
    }

    /// Purchase-order cost sets.
    pub fn cost_sets(&self) -> CostSetRepository {
        CostSetRepository::new(self.pool.clone())
    }

    /// Applied allocation results and their audit trail.
    pub fn allocations(&self) -> AllocationRepository {
        AllocationRepository::new(self.pool.clone())
    }

    /// Standard cost registry.
    pub fn standard_costs(&self) -> StandardCostRepository {
        StandardCostRepository::new(self.pool.clone())
    }

    /// Closes every connection; later repository calls fail.
    pub async fn close(&self) {
        info!("Closing ledger store");
        self.pool.close().await;
    }

    /// `true` when a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
