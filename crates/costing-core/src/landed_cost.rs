//! # Landed Cost Allocator
//!
//! Distributes the shared costs of a purchase order across its batches.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Convert cost-set totals to the base currency (one fixed rate)      │
//! │  2. Order batches by id ascending                                      │
//! │  3. Share weight per batch:                                            │
//! │       by_value     declared value (or received × unit price), cents    │
//! │       by_weight    declared weight, grams                              │
//! │       by_quantity  received quantity                                   │
//! │  4. For each of the five components independently:                     │
//! │       batch 1..n-1  round_half_even(total × w / Σw), capped so the     │
//! │                     running sum never passes the total                 │
//! │       batch n       total − running sum   (absorbs the residual)       │
//! │  5. Per-unit share = allocated / received quantity (micro-units)       │
//! │     landed cost    = base unit price + Σ per-unit shares               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Component sums (and so the grand total) always equal the converted cost
//! set to the cent.
//!
//! ## Example
//! ```rust
//! use costing_core::landed_cost::apportion;
//!
//! // 1000.00 freight over quantities 60 and 40
//! assert_eq!(apportion(100_000, &[60, 40]), vec![60_000, 40_000]);
//! // 0.10 over three equal shares: the last batch takes the extra cent
//! assert_eq!(apportion(10, &[1, 1, 1]), vec![3, 3, 4]);
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::check_batch_invariants;
use crate::money::{div_round_half_even, Money};
use crate::types::{
    AllocationBasis, AllocationLine, AllocationResult, Batch, CostComponent, LandedCostBreakdown,
    PurchaseOrderCostSet, SharedCosts,
};
use crate::validation::validate_cost_set;

// =============================================================================
// Apportionment
// =============================================================================

/// Splits `total` cents across `weights`, preserving the total exactly.
///
/// Weights and total must be non-negative and the weights must not all be
/// zero. The last entry absorbs the rounding residual.
pub fn apportion(total: i64, weights: &[i64]) -> Vec<i64> {
    let sum: i128 = weights.iter().map(|w| *w as i128).sum();
    let mut shares = Vec::with_capacity(weights.len());
    if weights.is_empty() {
        return shares;
    }
    if sum <= 0 {
        shares.resize(weights.len(), 0);
        return shares;
    }

    let total = total as i128;
    let mut running: i128 = 0;
    let last = weights.len() - 1;

    for (i, weight) in weights.iter().enumerate() {
        let share = if i == last {
            total - running
        } else {
            div_round_half_even(total * *weight as i128, sum)
                .min(total - running)
                .max(0)
        };
        running += share;
        shares.push(share as i64);
    }

    shares
}

/// The share weight of a batch under `basis`.
pub fn share_weight(batch: &Batch, basis: AllocationBasis) -> CoreResult<i64> {
    match basis {
        AllocationBasis::ByValue => Ok(batch.allocation_value().cents()),
        AllocationBasis::ByWeight => {
            batch
                .weight_grams
                .ok_or_else(|| CoreError::MissingAllocationBasisAttribute {
                    batch_id: batch.id.clone(),
                    basis: basis.to_string(),
                    attribute: "weight".to_string(),
                })
        }
        AllocationBasis::ByQuantity => Ok(batch.received_quantity),
    }
}

// =============================================================================
// Allocation
// =============================================================================

/// Allocates a cost set across the batches of its purchase order.
///
/// Pure: the batches are not modified. Apply the result with
/// [`crate::ledger::plan_allocation`] or through the database layer.
///
/// ## Errors
/// - `Validation` for a malformed cost set, an empty batch list, duplicate
///   batches or a batch from another purchase order
/// - `MissingAllocationBasisAttribute` when `by_weight` meets an undeclared
///   weight
/// - `IndeterminateAllocationBasis` when every share weight is zero
/// - `InconsistentLedgerState` when an input batch is broken
pub fn allocate(
    cost_set: &PurchaseOrderCostSet,
    batches: &[Batch],
    created_at: DateTime<Utc>,
) -> CoreResult<AllocationResult> {
    validate_cost_set(cost_set)?;

    if batches.is_empty() {
        return Err(ValidationError::required("batches").into());
    }

    let mut seen = HashSet::new();
    for batch in batches {
        if batch.purchase_order_id.as_deref() != Some(cost_set.purchase_order_id.as_str()) {
            return Err(ValidationError::Inconsistent {
                field: "batches".to_string(),
                reason: format!(
                    "batch {} was not received against purchase order {}",
                    batch.id, cost_set.purchase_order_id
                ),
            }
            .into());
        }
        if !seen.insert(batch.id.as_str()) {
            return Err(ValidationError::Inconsistent {
                field: "batches".to_string(),
                reason: format!("batch {} listed twice", batch.id),
            }
            .into());
        }
        check_batch_invariants(batch)?;
    }

    let mut ordered: Vec<&Batch> = batches.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let weights = ordered
        .iter()
        .map(|batch| share_weight(batch, cost_set.basis))
        .collect::<CoreResult<Vec<i64>>>()?;

    let weight_sum: i128 = weights.iter().map(|w| *w as i128).sum();
    if weight_sum <= 0 {
        return Err(CoreError::IndeterminateAllocationBasis {
            purchase_order_id: cost_set.purchase_order_id.clone(),
            basis: cost_set.basis.to_string(),
        });
    }

    let base_costs = cost_set.base_costs();
    let mut allocated = vec![SharedCosts::default(); ordered.len()];
    for component in CostComponent::ALL {
        let shares = apportion(base_costs.get(component).cents(), &weights);
        for (slot, share) in allocated.iter_mut().zip(shares) {
            slot.set(component, Money::from_cents(share));
        }
    }

    let lines = ordered
        .iter()
        .zip(weights.iter())
        .zip(allocated)
        .map(|((batch, weight), amounts)| {
            let mut per_unit = LandedCostBreakdown::default();
            for component in CostComponent::ALL {
                per_unit.set(component, amounts.get(component).per_unit(batch.received_quantity));
            }
            AllocationLine {
                batch_id: batch.id.clone(),
                share_weight: *weight,
                share_fraction: *weight as f64 / weight_sum as f64,
                allocated: amounts,
                per_unit,
                landed_cost_per_unit: batch.unit_price + per_unit.total(),
            }
        })
        .collect();

    let result = AllocationResult {
        id: Uuid::new_v4().to_string(),
        cost_set_id: cost_set.id.clone(),
        purchase_order_id: cost_set.purchase_order_id.clone(),
        basis: cost_set.basis,
        lines,
        total_allocated: base_costs.total(),
        supersedes: None,
        created_at,
    };

    check_conservation(&result)?;
    Ok(result)
}

/// Allocates a corrected cost set that replaces an earlier result.
///
/// The new result names `prior` in `supersedes`; per-unit shares are computed
/// from scratch, so applying it replaces the old breakdown rather than adding
/// to it.
pub fn supersede(
    prior: &AllocationResult,
    corrected: &PurchaseOrderCostSet,
    batches: &[Batch],
    created_at: DateTime<Utc>,
) -> CoreResult<AllocationResult> {
    if corrected.purchase_order_id != prior.purchase_order_id {
        return Err(ValidationError::Inconsistent {
            field: "purchase_order_id".to_string(),
            reason: format!(
                "correction targets {} but the prior result belongs to {}",
                corrected.purchase_order_id, prior.purchase_order_id
            ),
        }
        .into());
    }
    if corrected.id == prior.cost_set_id {
        return Err(CoreError::AlreadyAllocated {
            cost_set_id: corrected.id.clone(),
            result_id: prior.id.clone(),
        });
    }

    let mut result = allocate(corrected, batches, created_at)?;
    result.supersedes = Some(prior.id.clone());
    Ok(result)
}

/// Verifies that the lines of a result add up to its total, per component.
pub fn check_conservation(result: &AllocationResult) -> CoreResult<()> {
    let allocated: Money = result.lines.iter().map(AllocationLine::allocated_total).sum();
    if allocated != result.total_allocated {
        let batch_id = result
            .lines
            .last()
            .map(|line| line.batch_id.clone())
            .unwrap_or_default();
        return Err(CoreError::inconsistent(
            batch_id,
            format!(
                "allocation {} distributes {} but the cost set totals {}",
                result.id, allocated, result.total_allocated
            ),
        ));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
