//! # costing-core: Pure Costing Logic
//!
//! Inventory costing and landed-cost allocation as pure functions with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Costing Engine Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              costing-engine (request/response contract)         │   │
//! │  │  GetBatchCostingDetails, GetOptimalAllocation, ...              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ costing-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌─────────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  ledger  │─►│ landed_cost │  │ valuation │─►│  impact   │  │   │
//! │  │   │  rules   │  │  allocator  │  │  engine   │  │ analyzer  │  │   │
//! │  │   └──────────┘  └─────────────┘  └─────┬─────┘  └───────────┘  │   │
//! │  │                                        ▼                        │   │
//! │  │                                  ┌───────────┐  ┌───────────┐  │   │
//! │  │                                  │ optimizer │  │  report   │  │   │
//! │  │                                  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                costing-db (Database Layer)                      │   │
//! │  │        SQLite repositories, migrations, transactions            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money, UnitCost and ExchangeRate (integer arithmetic)
//! - [`types`] - Batches, consumption records, cost sets, allocation results
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`ledger`] - Batch Ledger rules and an in-memory ledger
//! - [`landed_cost`] - Landed Cost Allocator
//! - [`valuation`] - Valuation Engine (FIFO, LIFO, weighted average, standard)
//! - [`optimizer`] - Allocation Optimizer
//! - [`impact`] - Cost Impact Analyzer
//! - [`report`] - Batch costing details and the cost analysis report
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: same ledger and same `as_of` give the same figures
//! 2. **No ambient state**: the current time and exchange rates are parameters
//! 3. **Integer Money**: totals in cents, per-unit costs in micro-units
//! 4. **Explicit Errors**: every failure is a typed [`CoreError`]
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use costing_core::money::UnitCost;
//! use costing_core::valuation::{value, ValuationMethod, ValuationRequest};
//! use costing_core::ledger::{BatchLedger, NewBatch};
//!
//! let received = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
//! let mut ledger = BatchLedger::new();
//! for (id, qty, cents) in [("b-a", 100, 10_000), ("b-b", 50, 12_000)] {
//!     ledger
//!         .receive(NewBatch {
//!             id: Some(id.to_string()),
//!             product_id: "p-1".into(),
//!             location_id: "wh-1".into(),
//!             supplier_id: "sup-1".into(),
//!             purchase_order_id: None,
//!             quantity: qty,
//!             unit_price: UnitCost::from_cents(cents),
//!             weight_grams: None,
//!             declared_value: None,
//!             received_at: received,
//!             expiry_at: None,
//!             quality_grade: Default::default(),
//!         })
//!         .unwrap();
//! }
//!
//! let batches = ledger.product_batches("p-1", None);
//! let request = ValuationRequest::new("p-1", received, ValuationMethod::WeightedAvg);
//! let snapshot = value(&request, &batches).unwrap();
//!
//! // (100 × 100.00 + 50 × 120.00) / 150 = 106.67
//! assert_eq!(snapshot.unit_cost.to_money().cents(), 10_667);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod impact;
pub mod landed_cost;
pub mod ledger;
pub mod money;
pub mod optimizer;
pub mod report;
pub mod types;
pub mod valuation;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{ExchangeRate, Money, UnitCost};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of any identifier the engine accepts.
pub const MAX_ID_LENGTH: usize = 64;
