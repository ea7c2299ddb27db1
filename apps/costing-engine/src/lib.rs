//! # Costing Engine Library
//!
//! Application layer of the costing engine: configuration, error mapping and
//! the request/response contract that callers drive.
//!
//! ## Module Organization
//! ```text
//! costing_engine/
//! ├── lib.rs          ◄─── You are here (tracing, startup)
//! ├── config.rs       ◄─── EngineConfig (TOML + COSTING_* overrides)
//! ├── error.rs        ◄─── API error type returned by every operation
//! ├── cli.rs          ◄─── clap command line
//! └── service/
//!     ├── mod.rs      ◄─── CostingService (state + clock)
//!     ├── dto.rs      ◄─── Request/response types, JSON envelope
//!     ├── ledger.rs   ◄─── Receive, consume, return, batch details
//!     ├── costs.rs    ◄─── Purchase-order cost sets and allocation
//!     └── analysis.rs ◄─── Optimizer, valuation, impact, cost report
//! ```
//!
//! ## Contract Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CostingService                                   │
//! │                                                                         │
//! │  get_batch_costing_details(batch_id)        → BatchCostingDetails      │
//! │  get_optimal_allocation(request)            → AllocationPlan           │
//! │  create_purchase_order_costs(request)       → accepted | rejected      │
//! │  allocate_purchase_order_costs(po, basis?)  → AllocationResult         │
//! │  get_cost_analysis_report(group_by, from?)  → CostAnalysisReport       │
//! │                                                                         │
//! │  Every failure is an ApiError { code, message }                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod service;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use config::EngineConfig;
pub use error::{ApiError, ErrorCode};
pub use service::CostingService;

/// Parses the command line, opens the ledger and runs one command.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                       Engine Startup                                    │
/// │                                                                         │
/// │  1. Initialize Logging ───────────────────────────────────────────────► │
/// │     • tracing-subscriber with env filter, written to stderr             │
/// │     • Default: info,costing=debug,sqlx=warn (override with RUST_LOG)    │
/// │                                                                         │
/// │  2. Load Configuration ───────────────────────────────────────────────► │
/// │     • defaults → costing.toml → COSTING_* environment                   │
/// │                                                                         │
/// │  3. Connect to Database ──────────────────────────────────────────────► │
/// │     • SQLite with WAL mode, pending migrations applied                  │
/// │                                                                         │
/// │  4. Run the Command ──────────────────────────────────────────────────► │
/// │     • JSON response on stdout, exit code 1 on ApiError                  │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run() -> ExitCode {
    init_tracing();

    let cli = cli::Cli::parse();
    info!("Starting costing engine");

    match cli::execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(code = ?err.code, "Command failed: {}", err.message);
            match serde_json::to_string_pretty(&err) {
                Ok(json) => println!("{}", json),
                Err(_) => eprintln!("{}", err),
            }
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=costing_db=trace` - Show trace for the ledger store only
/// - Default: INFO, DEBUG for the costing crates
///
/// Logs go to stderr; stdout carries the JSON response.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,costing=debug,sqlx=warn"));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
