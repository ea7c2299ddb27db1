//! # Command Line
//!
//! ```text
//! costing-engine [--config FILE] [--db FILE] <COMMAND>
//!
//!   execute [FILE|-]            run one JSON request envelope
//!   batch <BATCH_ID>            GetBatchCostingDetails
//!   allocate <PO> [--basis B]   AllocatePurchaseOrderCosts
//!   report [--group-by G] [--from RFC3339]
//!                               GetCostAnalysisReport
//!   history <PO>                allocation audit trail
//!   config show | init          effective config / write defaults
//! ```
//!
//! Responses are pretty-printed JSON on stdout.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;

use costing_core::report::GroupBy;
use costing_core::AllocationBasis;

use crate::config::EngineConfig;
use crate::error::ApiError;
use crate::service::{CostingService, EngineRequest};

#[derive(Debug, Parser)]
#[command(name = "costing-engine", version, about = "Inventory costing and landed-cost allocation")]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute one JSON request envelope read from a file or stdin
    Execute {
        /// Request file; `-` or absent reads stdin
        file: Option<PathBuf>,
    },
    /// Show a batch with its cost percentages
    Batch { batch_id: String },
    /// Allocate the pending cost set of a purchase order
    Allocate {
        purchase_order_id: String,
        /// Override the cost set's allocation basis
        #[arg(long)]
        basis: Option<AllocationBasis>,
    },
    /// Cost analysis report
    Report {
        #[arg(long, default_value = "product")]
        group_by: GroupBy,
        /// Only batches received at or after this instant (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
    },
    /// Allocation history of a purchase order
    History { purchase_order_id: String },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration file
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Runs a parsed command line.
pub async fn execute(cli: Cli) -> Result<(), ApiError> {
    if let Command::Config {
        action: ConfigAction::Init { force },
    } = &cli.command
    {
        return init_config(cli.config.clone(), *force);
    }

    let mut config = EngineConfig::load(cli.config.clone())?;
    if let Some(db) = cli.db {
        config.database.path = Some(db);
    }

    if let Command::Config { action: ConfigAction::Show } = &cli.command {
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| ApiError::internal(format!("Failed to render config: {}", e)))?;
        print!("{}", rendered);
        return Ok(());
    }

    let service = CostingService::connect(config).await?;

    match cli.command {
        Command::Execute { file } => {
            let request = read_request(file)?;
            info!(operation = request.operation(), "Executing request");
            print_json(&service.handle(request).await?)
        }
        Command::Batch { batch_id } => print_json(&service.get_batch_costing_details(&batch_id).await?),
        Command::Allocate {
            purchase_order_id,
            basis,
        } => print_json(
            &service
                .allocate_purchase_order_costs(&purchase_order_id, basis)
                .await?,
        ),
        Command::Report { group_by, from } => {
            print_json(&service.get_cost_analysis_report(group_by, from).await?)
        }
        Command::History { purchase_order_id } => {
            print_json(&service.allocation_history(&purchase_order_id).await?)
        }
        Command::Config { .. } => Ok(()),
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<(), ApiError> {
    let target = path
        .or_else(EngineConfig::default_config_path)
        .ok_or_else(|| ApiError::from(crate::config::ConfigError::NoConfigDir))?;

    if target.exists() && !force {
        return Err(ApiError::validation(format!(
            "{} already exists; pass --force to replace it",
            target.display()
        )));
    }

    let written = EngineConfig::default().save(Some(target))?;
    println!("✅ Wrote {}", written.display());
    Ok(())
}

fn read_request(file: Option<PathBuf>) -> Result<EngineRequest, ApiError> {
    let contents = match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .map_err(|e| ApiError::validation(format!("Cannot read {}: {}", path.display(), e)))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| ApiError::validation(format!("Cannot read stdin: {}", e)))?;
            buffer
        }
    };

    parse_request(&contents)
}

fn parse_request(contents: &str) -> Result<EngineRequest, ApiError> {
    serde_json::from_str(contents).map_err(|e| ApiError::validation(format!("Malformed request: {}", e)))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ApiError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::internal(format!("Failed to serialize response: {}", e)))?;
    println!("{}", json);
    Ok(())
}
