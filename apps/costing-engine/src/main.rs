//! # Costing Engine Entry Point
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        costing-engine                                   │
//! │                                                                         │
//! │  request.json ──► cli.rs ──► CostingService ──► response JSON (stdout)  │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │                     costing-core rules + costing-db ledger              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Startup Sequence
//! 1. Initialize tracing (stderr)
//! 2. Load configuration
//! 3. Connect to database & run migrations
//! 4. Run the command, print the response

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // The actual setup is in lib.rs for testability
    costing_engine::run().await
}
