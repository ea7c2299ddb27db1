//! # Request and Response Types
//!
//! Everything a caller sends to or receives from [`CostingService`]
//! besides the domain types of `costing-core`, plus the JSON envelope the
//! CLI reads.
//!
//! ```json
//! { "operation": "allocate_purchase_order_costs",
//!   "params": { "purchase_order_id": "PO-7", "basis": "by_weight" } }
//! ```
//!
//! [`CostingService`]: super::CostingService

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use costing_core::ledger::NewBatch;
use costing_core::optimizer::AllocationStrategy;
use costing_core::report::GroupBy;
use costing_core::valuation::ValuationMethod;
use costing_core::{
    AllocationBasis, AllocationResult, ConsumptionKind, ExchangeRate, Money,
    PurchaseOrderCostSet, SharedCosts, UnitCost,
};

use crate::error::ErrorCode;

// =============================================================================
// Contract Requests
// =============================================================================

/// Demand for `GetOptimalAllocation`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OptimalAllocationRequest {
    pub product_id: String,
    #[serde(default)]
    pub location_id: Option<String>,
    pub quantity: i64,
    /// Configured default when absent.
    #[serde(default)]
    pub strategy: Option<AllocationStrategy>,
    /// Clock time when absent.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub as_of: Option<DateTime<Utc>>,
}

/// Shared costs of a purchase order for `CreatePurchaseOrderCosts`.
///
/// Amounts are in minor units of `currency`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreatePurchaseOrderCostsRequest {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub purchase_order_id: String,
    #[serde(default)]
    pub freight: Money,
    #[serde(default)]
    pub insurance: Money,
    #[serde(default)]
    pub duty: Money,
    #[serde(default)]
    pub handling: Money,
    #[serde(default)]
    pub other: Money,
    /// Configured default when absent.
    #[serde(default)]
    pub basis: Option<AllocationBasis>,
    #[serde(default)]
    pub total_order_value: Money,
    /// Base currency when absent.
    #[serde(default)]
    pub currency: Option<String>,
    /// Required for any currency other than the base currency.
    #[serde(default)]
    pub exchange_rate: Option<ExchangeRate>,
    /// Allocated cost set this one corrects.
    #[serde(default)]
    pub supersedes: Option<String>,
}

impl CreatePurchaseOrderCostsRequest {
    pub fn costs(&self) -> SharedCosts {
        SharedCosts {
            freight: self.freight,
            insurance: self.insurance,
            duty: self.duty,
            handling: self.handling,
            other: self.other,
        }
    }
}

/// Outcome of `CreatePurchaseOrderCosts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CostSetDecision {
    Accepted { cost_set: PurchaseOrderCostSet },
    Rejected { code: ErrorCode, reason: String },
}

impl CostSetDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CostSetDecision::Accepted { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocatePurchaseOrderCostsRequest {
    pub purchase_order_id: String,
    /// Overrides the basis stored with the cost set.
    #[serde(default)]
    pub basis: Option<AllocationBasis>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostAnalysisRequest {
    #[serde(default)]
    pub group_by: GroupBy,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub date_from: Option<DateTime<Utc>>,
}

// =============================================================================
// Ledger Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConsumeRequest {
    pub batch_id: String,
    pub quantity: i64,
    pub kind: ConsumptionKind,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnStockRequest {
    /// The consumption being reversed.
    pub consumption_id: String,
    pub quantity: i64,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub occurred_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Analysis Requests
// =============================================================================

/// Inventory valuation; the standard cost registry fills in
/// `standard_cost` when absent.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ValueInventoryRequest {
    pub product_id: String,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default)]
    pub method: ValuationMethod,
    #[serde(default)]
    pub issue_quantity: Option<i64>,
    #[serde(default)]
    pub selling_price: Option<UnitCost>,
    #[serde(default)]
    pub standard_cost: Option<UnitCost>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompareMethodsRequest {
    pub product_id: String,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issue_quantity: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SetStandardCostRequest {
    pub product_id: String,
    pub unit_cost: UnitCost,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub effective_from: Option<DateTime<Utc>>,
}

// =============================================================================
// Allocation History
// =============================================================================

/// One allocation result and whether a correction replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationRecord {
    pub result: AllocationResult,
    pub superseded_by: Option<String>,
    pub active: bool,
}

/// Audit trail of a purchase order's landed costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationHistory {
    pub purchase_order_id: String,
    /// Oldest first, superseded results included.
    pub allocations: Vec<AllocationRecord>,
    pub pending_cost_set: Option<PurchaseOrderCostSet>,
}

// =============================================================================
// JSON Envelope
// =============================================================================

/// One request to the engine, as the CLI reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", content = "params", rename_all = "snake_case")]
pub enum EngineRequest {
    GetBatchCostingDetails {
        batch_id: String,
    },
    GetOptimalAllocation(OptimalAllocationRequest),
    CreatePurchaseOrderCosts(CreatePurchaseOrderCostsRequest),
    AllocatePurchaseOrderCosts(AllocatePurchaseOrderCostsRequest),
    GetCostAnalysisReport(CostAnalysisRequest),
    SupersedePurchaseOrderCosts {
        prior_cost_set_id: String,
        corrected: CreatePurchaseOrderCostsRequest,
    },
    GetAllocationHistory {
        purchase_order_id: String,
    },
    ReceiveBatch(NewBatch),
    Consume(ConsumeRequest),
    ReturnStock(ReturnStockRequest),
    ValueInventory(ValueInventoryRequest),
    CompareCostingMethods(CompareMethodsRequest),
    SetStandardCost(SetStandardCostRequest),
}

impl EngineRequest {
    /// Operation name as it appears in the envelope.
    pub fn operation(&self) -> &'static str {
        match self {
            EngineRequest::GetBatchCostingDetails { .. } => "get_batch_costing_details",
            EngineRequest::GetOptimalAllocation(_) => "get_optimal_allocation",
            EngineRequest::CreatePurchaseOrderCosts(_) => "create_purchase_order_costs",
            EngineRequest::AllocatePurchaseOrderCosts(_) => "allocate_purchase_order_costs",
            EngineRequest::GetCostAnalysisReport(_) => "get_cost_analysis_report",
            EngineRequest::SupersedePurchaseOrderCosts { .. } => "supersede_purchase_order_costs",
            EngineRequest::GetAllocationHistory { .. } => "get_allocation_history",
            EngineRequest::ReceiveBatch(_) => "receive_batch",
            EngineRequest::Consume(_) => "consume",
            EngineRequest::ReturnStock(_) => "return_stock",
            EngineRequest::ValueInventory(_) => "value_inventory",
            EngineRequest::CompareCostingMethods(_) => "compare_costing_methods",
            EngineRequest::SetStandardCost(_) => "set_standard_cost",
        }
    }
}
