//! # Costing Service
//!
//! The request/response contract of the engine. Each operation validates
//! its request, reads what it needs from the ledger, runs the pure costing
//! rules and, for writes, hands the outcome to a single repository
//! transaction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CostingService                                    │
//! │                                                                         │
//! │  ledger.rs    receive_batch · consume · return_stock                   │
//! │               get_batch_costing_details                                │
//! │                                                                         │
//! │  costs.rs     create_purchase_order_costs                              │
//! │               allocate_purchase_order_costs                            │
//! │               supersede_purchase_order_costs · allocation_history      │
//! │                                                                         │
//! │  analysis.rs  get_optimal_allocation · value_inventory                 │
//! │               compare_costing_methods · get_cost_analysis_report       │
//! │               set_standard_cost                                        │
//! │                                                                         │
//! │  handle(EngineRequest) ─► dispatch ─► JSON value                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Time
//! Nothing in `costing-core` reads a clock. The service owns one and uses
//! it only to fill in `as_of` / `occurred_at` when a request leaves them
//! out.

mod analysis;
mod costs;
pub mod dto;
mod ledger;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use costing_db::Database;

use crate::config::EngineConfig;
use crate::error::ApiError;

pub use dto::*;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Engine state shared by every operation.
///
/// Cheap to clone: the database is a pool handle.
#[derive(Clone)]
pub struct CostingService {
    db: Database,
    config: Arc<EngineConfig>,
    clock: Clock,
}

impl CostingService {
    /// Creates a service over an open database, reading the wall clock.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Self::with_clock(db, config, Arc::new(Utc::now))
    }

    /// Creates a service with an explicit clock.
    pub fn with_clock(db: Database, config: EngineConfig, clock: Clock) -> Self {
        CostingService {
            db,
            config: Arc::new(config),
            clock,
        }
    }

    /// Opens the configured database and builds the service.
    pub async fn connect(config: EngineConfig) -> Result<Self, ApiError> {
        let path = config.database_path()?;
        info!(?path, "Opening ledger database");
        let db = Database::new(config.db_config(path)).await?;
        Ok(Self::new(db, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Runs one enveloped request and returns its response as JSON.
    pub async fn handle(&self, request: EngineRequest) -> Result<serde_json::Value, ApiError> {
        let operation = request.operation();
        debug!(operation, "Handling request");

        match request {
            EngineRequest::GetBatchCostingDetails { batch_id } => {
                to_json(self.get_batch_costing_details(&batch_id).await?)
            }
            EngineRequest::GetOptimalAllocation(req) => {
                to_json(self.get_optimal_allocation(req).await?)
            }
            EngineRequest::CreatePurchaseOrderCosts(req) => {
                to_json(self.create_purchase_order_costs(req).await?)
            }
            EngineRequest::AllocatePurchaseOrderCosts(req) => to_json(
                self.allocate_purchase_order_costs(&req.purchase_order_id, req.basis)
                    .await?,
            ),
            EngineRequest::GetCostAnalysisReport(req) => {
                to_json(self.get_cost_analysis_report(req.group_by, req.date_from).await?)
            }
            EngineRequest::SupersedePurchaseOrderCosts {
                prior_cost_set_id,
                corrected,
            } => to_json(
                self.supersede_purchase_order_costs(&prior_cost_set_id, corrected)
                    .await?,
            ),
            EngineRequest::GetAllocationHistory { purchase_order_id } => {
                to_json(self.allocation_history(&purchase_order_id).await?)
            }
            EngineRequest::ReceiveBatch(new_batch) => to_json(self.receive_batch(new_batch).await?),
            EngineRequest::Consume(req) => to_json(self.consume(req).await?),
            EngineRequest::ReturnStock(req) => to_json(self.return_stock(req).await?),
            EngineRequest::ValueInventory(req) => to_json(self.value_inventory(req).await?),
            EngineRequest::CompareCostingMethods(req) => {
                to_json(self.compare_costing_methods(req).await?)
            }
            EngineRequest::SetStandardCost(req) => to_json(self.set_standard_cost(req).await?),
        }
    }
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value)
        .map_err(|e| ApiError::internal(format!("Failed to serialize response: {}", e)))
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::TimeZone;
    use costing_core::ledger::NewBatch;
    use costing_core::{QualityGrade, UnitCost};
    use costing_db::DbConfig;

    /// 2026-03-02 09:00 UTC.
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    /// A service over a fresh in-memory ledger whose clock reads `t0`.
    pub async fn service() -> CostingService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        CostingService::with_clock(db, EngineConfig::default(), Arc::new(t0))
    }

    pub fn new_batch(id: &str, purchase_order_id: Option<&str>, quantity: i64, cents: i64) -> NewBatch {
        NewBatch {
            id: Some(id.to_string()),
            product_id: "p-1".into(),
            location_id: "wh-1".into(),
            supplier_id: "sup-1".into(),
            purchase_order_id: purchase_order_id.map(str::to_string),
            quantity,
            unit_price: UnitCost::from_cents(cents),
            weight_grams: None,
            declared_value: None,
            received_at: t0() - chrono::Duration::days(30),
            expiry_at: None,
            quality_grade: QualityGrade::A,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_handle_round_trips_through_json() {
        let service = service().await;
        service.receive_batch(new_batch("b-1", None, 10, 500)).await.unwrap();

        let request: EngineRequest = serde_json::from_str(
            r#"{ "operation": "get_batch_costing_details", "params": { "batch_id": "b-1" } }"#,
        )
        .unwrap();
        let response = service.handle(request).await.unwrap();

        assert_eq!(response["batch"]["id"], "b-1");
        assert_eq!(response["on_hand_value"], 5_000);
        assert_eq!(response["cost_overhead_percentage"], 0.0);
    }

    #[tokio::test]
    async fn test_handle_surfaces_api_errors() {
        let service = service().await;
        let err = service
            .handle(EngineRequest::GetBatchCostingDetails {
                batch_id: "missing".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::NotFound);
    }
}
