//! # Batch Ledger
//!
//! Rules for receiving, consuming and returning stock, plus an in-memory
//! ledger that applies them.
//!
//! ## Lifecycle of a Batch
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  receive ──► Batch { available = received, landed = base }             │
//! │                 │                                                       │
//! │                 ├── allocation ──► landed = base + Σ per-unit shares   │
//! │                 │                                                       │
//! │                 ├── consume(sale | transfer | scrap)                   │
//! │                 │      available -= q        (+ ConsumptionRecord)     │
//! │                 │                                                       │
//! │                 └── return(consumption_id)                             │
//! │                        available += q        (+ reversal record)       │
//! │                                                                         │
//! │  History is append-only. A return never edits the record it reverses.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `plan_*` functions decide the new available quantity without mutating
//! anything; `costing-db` runs them inside its transactions and
//! [`BatchLedger`] runs them against memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, UnitCost};
use crate::types::{
    AllocationResult, Batch, ConsumptionKind, ConsumptionRecord, LandedCostBreakdown,
    QualityGrade,
};
use crate::validation::{
    validate_expiry, validate_id, validate_non_negative_money, validate_optional_id,
    validate_quantity, validate_unit_cost, ValidationResult,
};

// =============================================================================
// Goods Receipt
// =============================================================================

/// Goods-receipt facts for a new batch.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewBatch {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub product_id: String,
    pub location_id: String,
    pub supplier_id: String,
    #[serde(default)]
    pub purchase_order_id: Option<String>,
    pub quantity: i64,
    pub unit_price: UnitCost,
    #[serde(default)]
    pub weight_grams: Option<i64>,
    #[serde(default)]
    pub declared_value: Option<Money>,
    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expiry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quality_grade: QualityGrade,
}

impl NewBatch {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_optional_id("id", self.id.as_deref())?;
        validate_id("product_id", &self.product_id)?;
        validate_id("location_id", &self.location_id)?;
        validate_id("supplier_id", &self.supplier_id)?;
        validate_optional_id("purchase_order_id", self.purchase_order_id.as_deref())?;
        validate_quantity("quantity", self.quantity)?;
        validate_unit_cost("unit_price", self.unit_price)?;
        if let Some(weight) = self.weight_grams {
            validate_quantity("weight_grams", weight)?;
        }
        if let Some(value) = self.declared_value {
            validate_non_negative_money("declared_value", value)?;
        }
        validate_expiry(self.received_at, self.expiry_at)?;
        Ok(())
    }

    /// Validates and builds the batch as received: fully available, landed
    /// cost equal to the base price.
    pub fn into_batch(self) -> CoreResult<Batch> {
        self.validate()?;
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(Batch {
            id,
            product_id: self.product_id,
            location_id: self.location_id,
            supplier_id: self.supplier_id,
            purchase_order_id: self.purchase_order_id,
            received_quantity: self.quantity,
            available_quantity: self.quantity,
            unit_price: self.unit_price,
            landed: LandedCostBreakdown::default(),
            landed_cost_per_unit: self.unit_price,
            weight_grams: self.weight_grams,
            declared_value: self.declared_value,
            received_at: self.received_at,
            expiry_at: self.expiry_at,
            quality_grade: self.quality_grade,
        })
    }
}

// =============================================================================
// Invariants
// =============================================================================

/// Checks the invariants every stored batch must satisfy.
///
/// A failure means the ledger itself is wrong, not the request.
pub fn check_batch_invariants(batch: &Batch) -> CoreResult<()> {
    if batch.available_quantity < 0 {
        return Err(CoreError::inconsistent(
            &batch.id,
            format!("negative available quantity {}", batch.available_quantity),
        ));
    }
    if batch.available_quantity > batch.received_quantity {
        return Err(CoreError::inconsistent(
            &batch.id,
            format!(
                "available quantity {} exceeds received quantity {}",
                batch.available_quantity, batch.received_quantity
            ),
        ));
    }
    if batch.unit_price.is_negative() {
        return Err(CoreError::inconsistent(&batch.id, "negative base unit price"));
    }
    if batch.landed.has_negative() {
        return Err(CoreError::inconsistent(&batch.id, "negative landed cost component"));
    }
    if batch.landed_cost_per_unit != batch.unit_price + batch.landed.total() {
        return Err(CoreError::inconsistent(
            &batch.id,
            "landed cost per unit does not equal base price plus shared costs",
        ));
    }
    Ok(())
}

/// Checks every batch, stopping at the first violation.
pub fn check_ledger<'a, I>(batches: I) -> CoreResult<()>
where
    I: IntoIterator<Item = &'a Batch>,
{
    batches.into_iter().try_for_each(check_batch_invariants)
}

// =============================================================================
// Consumption Rules
// =============================================================================

/// Decides the available quantity after an outbound movement.
///
/// ## Errors
/// - `Validation` for a non-positive quantity or a `return` kind
/// - `InsufficientStock` when the batch holds less than requested
/// - `InconsistentLedgerState` when the batch is already broken
pub fn plan_consumption(batch: &Batch, quantity: i64, kind: ConsumptionKind) -> CoreResult<i64> {
    validate_quantity("quantity", quantity)?;
    if !kind.is_outbound() {
        return Err(ValidationError::NotAllowed {
            field: "kind".to_string(),
            allowed: vec!["sale".into(), "transfer".into(), "scrap".into()],
        }
        .into());
    }
    check_batch_invariants(batch)?;

    if quantity > batch.available_quantity {
        return Err(CoreError::InsufficientStock {
            product_id: batch.product_id.clone(),
            available: batch.available_quantity,
            requested: quantity,
        });
    }

    Ok(batch.available_quantity - quantity)
}

/// Units of `original` already reversed by returns in `history`.
pub fn returned_quantity(history: &[ConsumptionRecord], original_id: &str) -> i64 {
    history
        .iter()
        .filter(|r| r.kind == ConsumptionKind::Return && r.reverses.as_deref() == Some(original_id))
        .map(|r| r.quantity)
        .sum()
}

/// Decides the available quantity after returning units of an earlier
/// outbound movement.
///
/// `already_returned` is the quantity previous returns reversed.
pub fn plan_return(
    batch: &Batch,
    original: &ConsumptionRecord,
    already_returned: i64,
    quantity: i64,
) -> CoreResult<i64> {
    validate_quantity("quantity", quantity)?;
    if !original.kind.is_outbound() {
        return Err(ValidationError::Inconsistent {
            field: "consumption_id".to_string(),
            reason: "a return cannot itself be returned".to_string(),
        }
        .into());
    }
    if original.batch_id != batch.id {
        return Err(CoreError::inconsistent(
            &batch.id,
            format!("consumption {} belongs to batch {}", original.id, original.batch_id),
        ));
    }
    check_batch_invariants(batch)?;

    let returnable = original.quantity - already_returned;
    if quantity > returnable {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: returnable.max(0),
        }
        .into());
    }

    let available = batch.available_quantity + quantity;
    if available > batch.received_quantity {
        return Err(CoreError::inconsistent(
            &batch.id,
            "return would raise available quantity above received quantity",
        ));
    }
    Ok(available)
}

/// Builds a new consumption record with a generated id.
pub fn new_consumption_record(
    batch: &Batch,
    kind: ConsumptionKind,
    quantity: i64,
    reverses: Option<String>,
    occurred_at: DateTime<Utc>,
) -> ConsumptionRecord {
    ConsumptionRecord {
        id: Uuid::new_v4().to_string(),
        batch_id: batch.id.clone(),
        product_id: batch.product_id.clone(),
        kind,
        quantity,
        reverses,
        occurred_at,
    }
}

// =============================================================================
// Allocation Application
// =============================================================================

/// Computes the batches an allocation result produces, without touching the
/// inputs.
///
/// `batches` must be every batch currently received against the result's
/// purchase order. All-or-nothing: a line without a batch, a batch without a
/// line, or a broken invariant fails the whole application.
///
/// ## Errors
/// - `Validation` when the order has a batch the result does not cover,
///   i.e. it was received after the result was computed; recompute and retry
/// - `BatchNotFound` for a line whose batch is missing
/// - `InconsistentLedgerState` for a broken batch or a line that disagrees
///   with its batch's base price
pub fn plan_allocation(batches: &[Batch], result: &AllocationResult) -> CoreResult<Vec<Batch>> {
    let by_id: HashMap<&str, &Batch> = batches.iter().map(|b| (b.id.as_str(), b)).collect();

    let uncovered: Vec<&str> = batches
        .iter()
        .filter(|b| b.purchase_order_id.as_deref() == Some(result.purchase_order_id.as_str()))
        .filter(|b| result.line_for(&b.id).is_none())
        .map(|b| b.id.as_str())
        .collect();
    if !uncovered.is_empty() {
        return Err(ValidationError::Inconsistent {
            field: "batches".to_string(),
            reason: format!(
                "purchase order {} has batches not covered by allocation {}: {}",
                result.purchase_order_id,
                result.id,
                uncovered.join(", ")
            ),
        }
        .into());
    }

    let mut updated = Vec::with_capacity(result.lines.len());
    for line in &result.lines {
        let batch = by_id
            .get(line.batch_id.as_str())
            .ok_or_else(|| CoreError::BatchNotFound(line.batch_id.clone()))?;
        check_batch_invariants(batch)?;

        let mut next = (*batch).clone();
        next.set_landed(line.per_unit);
        check_batch_invariants(&next)?;
        if next.landed_cost_per_unit != line.landed_cost_per_unit {
            return Err(CoreError::inconsistent(
                &next.id,
                "allocation line disagrees with base price of the batch",
            ));
        }
        updated.push(next);
    }
    Ok(updated)
}

// =============================================================================
// In-Memory Ledger
// =============================================================================

/// An in-memory Batch Ledger.
///
/// Holds batches, the consumption history and every allocation result,
/// applying the same rules as the SQLite store.
#[derive(Debug, Clone, Default)]
pub struct BatchLedger {
    batches: BTreeMap<String, Batch>,
    history: Vec<ConsumptionRecord>,
    allocations: Vec<AllocationResult>,
}

impl BatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a goods receipt.
    pub fn receive(&mut self, new_batch: NewBatch) -> CoreResult<Batch> {
        let batch = new_batch.into_batch()?;
        if self.batches.contains_key(&batch.id) {
            return Err(ValidationError::Inconsistent {
                field: "id".to_string(),
                reason: format!("batch {} already exists", batch.id),
            }
            .into());
        }
        self.batches.insert(batch.id.clone(), batch.clone());
        Ok(batch)
    }

    pub fn get(&self, batch_id: &str) -> Option<&Batch> {
        self.batches.get(batch_id)
    }

    /// All batches ordered by id.
    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.values()
    }

    /// Batches of a product, optionally restricted to one location.
    pub fn product_batches(&self, product_id: &str, location_id: Option<&str>) -> Vec<Batch> {
        self.batches
            .values()
            .filter(|b| b.product_id == product_id)
            .filter(|b| location_id.map_or(true, |loc| b.location_id == loc))
            .cloned()
            .collect()
    }

    /// Batches received against a purchase order, ordered by id.
    pub fn purchase_order_batches(&self, purchase_order_id: &str) -> Vec<Batch> {
        self.batches
            .values()
            .filter(|b| b.purchase_order_id.as_deref() == Some(purchase_order_id))
            .cloned()
            .collect()
    }

    /// Consumption history of a product in occurrence order.
    pub fn history(&self, product_id: &str) -> Vec<ConsumptionRecord> {
        let mut records: Vec<_> = self
            .history
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Removes units from a batch.
    pub fn consume(
        &mut self,
        batch_id: &str,
        quantity: i64,
        kind: ConsumptionKind,
        occurred_at: DateTime<Utc>,
    ) -> CoreResult<ConsumptionRecord> {
        let batch = self
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| CoreError::BatchNotFound(batch_id.to_string()))?;

        let available = plan_consumption(batch, quantity, kind)?;
        batch.available_quantity = available;

        let record = new_consumption_record(batch, kind, quantity, None, occurred_at);
        self.history.push(record.clone());
        Ok(record)
    }

    /// Returns units of an earlier consumption as a reversal record.
    pub fn return_stock(
        &mut self,
        consumption_id: &str,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> CoreResult<ConsumptionRecord> {
        let original = self
            .history
            .iter()
            .find(|r| r.id == consumption_id)
            .cloned()
            .ok_or_else(|| CoreError::ConsumptionNotFound(consumption_id.to_string()))?;
        let already_returned = returned_quantity(&self.history, consumption_id);

        let batch = self
            .batches
            .get_mut(&original.batch_id)
            .ok_or_else(|| CoreError::BatchNotFound(original.batch_id.clone()))?;

        let available = plan_return(batch, &original, already_returned, quantity)?;
        batch.available_quantity = available;

        let record = new_consumption_record(
            batch,
            ConsumptionKind::Return,
            quantity,
            Some(original.id.clone()),
            occurred_at,
        );
        self.history.push(record.clone());
        Ok(record)
    }

    /// The result recorded for a cost set, if it was applied.
    pub fn allocation_for(&self, cost_set_id: &str) -> Option<&AllocationResult> {
        self.allocations.iter().find(|r| r.cost_set_id == cost_set_id)
    }

    /// Every allocation result, oldest first (superseded ones included).
    pub fn allocations(&self) -> &[AllocationResult] {
        &self.allocations
    }

    /// Applies an allocation result to its batches exactly once.
    ///
    /// ## Errors
    /// - `AlreadyAllocated` if the cost set was applied before; nothing changes
    /// - any planning error; nothing changes
    pub fn apply_allocation(&mut self, result: AllocationResult) -> CoreResult<()> {
        if let Some(prior) = self.allocation_for(&result.cost_set_id) {
            return Err(CoreError::AlreadyAllocated {
                cost_set_id: result.cost_set_id.clone(),
                result_id: prior.id.clone(),
            });
        }

        let current = self.purchase_order_batches(&result.purchase_order_id);
        let updated = plan_allocation(&current, &result)?;

        for batch in updated {
            self.batches.insert(batch.id.clone(), batch);
        }
        self.allocations.push(result);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap()
    }

    fn new_batch(id: &str, qty: i64, cents: i64) -> NewBatch {
        NewBatch {
            id: Some(id.to_string()),
            product_id: "p-1".into(),
            location_id: "wh-1".into(),
            supplier_id: "sup-1".into(),
            purchase_order_id: Some("po-1".into()),
            quantity: qty,
            unit_price: UnitCost::from_cents(cents),
            weight_grams: None,
            declared_value: None,
            received_at: t0(),
            expiry_at: None,
            quality_grade: QualityGrade::A,
        }
    }

    #[test]
    fn test_receive_sets_available_and_landed() {
        let mut ledger = BatchLedger::new();
        let batch = ledger.receive(new_batch("b-1", 10, 500)).unwrap();
        assert_eq!(batch.available_quantity, 10);
        assert_eq!(batch.landed_cost_per_unit, UnitCost::from_cents(500));
        assert!(ledger.receive(new_batch("b-1", 5, 500)).is_err());
    }

    #[test]
    fn test_receive_rejects_bad_input() {
        let mut ledger = BatchLedger::new();
        assert!(ledger.receive(new_batch("b-1", 0, 500)).is_err());
        assert!(ledger.receive(new_batch("b-2", 5, -1)).is_err());

        let mut expired = new_batch("b-3", 5, 100);
        expired.expiry_at = Some(t0() - Duration::days(1));
        assert!(ledger.receive(expired).is_err());
    }

    #[test]
    fn test_consume_and_return() {
        let mut ledger = BatchLedger::new();
        ledger.receive(new_batch("b-1", 10, 500)).unwrap();

        let sale = ledger
            .consume("b-1", 4, ConsumptionKind::Sale, t0() + Duration::days(1))
            .unwrap();
        assert_eq!(ledger.get("b-1").unwrap().available_quantity, 6);

        let err = ledger
            .consume("b-1", 7, ConsumptionKind::Sale, t0())
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { available: 6, requested: 7, .. }));

        let ret = ledger.return_stock(&sale.id, 3, t0() + Duration::days(2)).unwrap();
        assert_eq!(ret.reverses.as_deref(), Some(sale.id.as_str()));
        assert_eq!(ledger.get("b-1").unwrap().available_quantity, 9);

        // Only one unit of the sale is left to return
        assert!(ledger.return_stock(&sale.id, 2, t0()).is_err());
        ledger.return_stock(&sale.id, 1, t0()).unwrap();
        assert_eq!(ledger.get("b-1").unwrap().available_quantity, 10);

        // The original record is untouched
        let history = ledger.history("p-1");
        assert_eq!(history.len(), 3);
        assert!(history.iter().any(|r| r.id == sale.id && r.quantity == 4));
    }

    #[test]
    fn test_return_of_return_rejected() {
        let mut ledger = BatchLedger::new();
        ledger.receive(new_batch("b-1", 10, 500)).unwrap();
        let sale = ledger.consume("b-1", 2, ConsumptionKind::Sale, t0()).unwrap();
        let ret = ledger.return_stock(&sale.id, 1, t0()).unwrap();
        assert!(matches!(
            ledger.return_stock(&ret.id, 1, t0()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_consume_with_return_kind_rejected() {
        let mut ledger = BatchLedger::new();
        ledger.receive(new_batch("b-1", 10, 500)).unwrap();
        assert!(matches!(
            ledger.consume("b-1", 1, ConsumptionKind::Return, t0()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_invariant_violations_are_fatal() {
        let mut batch = new_batch("b-1", 10, 500).into_batch().unwrap();
        batch.available_quantity = 11;
        let err = check_batch_invariants(&batch).unwrap_err();
        assert!(err.is_fatal());

        batch.available_quantity = -1;
        assert!(check_batch_invariants(&batch).unwrap_err().is_fatal());

        batch.available_quantity = 5;
        batch.landed_cost_per_unit = UnitCost::from_cents(400);
        assert!(check_batch_invariants(&batch).unwrap_err().is_fatal());
    }

    #[test]
    fn test_consume_refuses_broken_batch() {
        let mut batch = new_batch("b-1", 10, 500).into_batch().unwrap();
        batch.available_quantity = -2;
        let err = plan_consumption(&batch, 1, ConsumptionKind::Sale).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_allocation_must_cover_late_receipts() {
        use crate::landed_cost::allocate;
        use crate::money::ExchangeRate;
        use crate::types::{AllocationBasis, PurchaseOrderCostSet, SharedCosts};

        let mut ledger = BatchLedger::new();
        ledger.receive(new_batch("b-1", 6, 1_000)).unwrap();
        ledger.receive(new_batch("b-2", 4, 1_000)).unwrap();

        let set = PurchaseOrderCostSet {
            id: "cs-1".into(),
            purchase_order_id: "po-1".into(),
            costs: SharedCosts {
                freight: Money::from_cents(10_000),
                ..Default::default()
            },
            basis: AllocationBasis::ByQuantity,
            total_order_value: Money::from_cents(10_000),
            currency: "USD".into(),
            exchange_rate: ExchangeRate::PAR,
            supersedes: None,
            created_at: t0(),
        };
        let result = allocate(&set, &ledger.purchase_order_batches("po-1"), t0()).unwrap();

        // Arrives between computing and applying the result
        ledger.receive(new_batch("b-3", 5, 1_000)).unwrap();

        let err = plan_allocation(&ledger.purchase_order_batches("po-1"), &result).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("b-3"));

        assert!(ledger.apply_allocation(result).is_err());
        assert_eq!(ledger.get("b-1").unwrap().landed_cost_per_unit, UnitCost::from_cents(1_000));
        assert!(ledger.allocation_for("cs-1").is_none());
    }

    #[test]
    fn test_generated_id_when_absent() {
        let mut nb = new_batch("ignored", 1, 1);
        nb.id = None;
        let batch = nb.into_batch().unwrap();
        assert!(uuid::Uuid::parse_str(&batch.id).is_ok());
    }
}
