//! # Valuation Engine
//!
//! Prices a product's on-hand stock from the Batch Ledger.
//!
//! ## Methods
//! ```text
//! ┌────────────────┬────────────────────────────────────────────────────────┐
//! │ fifo           │ layers by received_at ascending, then batch id         │
//! │ lifo           │ layers by received_at descending, then batch id        │
//! │ weighted_avg   │ Σ(available × landed) / Σ available                    │
//! │ standard       │ configured target cost; variance vs weighted average   │
//! └────────────────┴────────────────────────────────────────────────────────┘
//! ```
//!
//! Snapshots are derived: every call recomputes from the batches it is given,
//! so two calls over an unchanged ledger return identical figures.
//!
//! ## Issue Quantity
//! FIFO and LIFO price the first `issue_quantity` units drawn in method order.
//! Without it the whole on-hand quantity is priced, and FIFO, LIFO and the
//! weighted average all return the same total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::check_batch_invariants;
use crate::money::{div_round_half_even, Money, UnitCost, MICROS_PER_CENT};
use crate::types::Batch;
use crate::validation::{validate_id, validate_optional_id, validate_quantity, validate_unit_cost};

// =============================================================================
// Valuation Method
// =============================================================================

/// Inventory valuation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    Fifo,
    Lifo,
    #[default]
    WeightedAvg,
    Standard,
}

impl ValuationMethod {
    pub const ALL: [ValuationMethod; 4] = [
        ValuationMethod::Fifo,
        ValuationMethod::Lifo,
        ValuationMethod::WeightedAvg,
        ValuationMethod::Standard,
    ];
}

impl fmt::Display for ValuationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuationMethod::Fifo => write!(f, "fifo"),
            ValuationMethod::Lifo => write!(f, "lifo"),
            ValuationMethod::WeightedAvg => write!(f, "weighted_avg"),
            ValuationMethod::Standard => write!(f, "standard"),
        }
    }
}

impl FromStr for ValuationMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fifo" => Ok(ValuationMethod::Fifo),
            "lifo" => Ok(ValuationMethod::Lifo),
            "weighted_avg" | "weighted_average" => Ok(ValuationMethod::WeightedAvg),
            "standard" => Ok(ValuationMethod::Standard),
            _ => Err(ValidationError::NotAllowed {
                field: "method".to_string(),
                allowed: ValuationMethod::ALL.iter().map(|m| m.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Standard Cost
// =============================================================================

/// A configured target unit cost for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StandardCost {
    pub product_id: String,
    pub unit_cost: UnitCost,
    #[ts(as = "String")]
    pub effective_from: DateTime<Utc>,
}

// =============================================================================
// Request & Snapshot
// =============================================================================

/// Inputs for one valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ValuationRequest {
    pub product_id: String,
    #[serde(default)]
    pub location_id: Option<String>,
    #[ts(as = "String")]
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub method: ValuationMethod,
    /// Units to price; defaults to everything on hand.
    #[serde(default)]
    pub issue_quantity: Option<i64>,
    /// Per-unit selling price for the margin figure.
    #[serde(default)]
    pub selling_price: Option<UnitCost>,
    #[serde(default)]
    pub standard_cost: Option<UnitCost>,
}

impl ValuationRequest {
    pub fn new(product_id: impl Into<String>, as_of: DateTime<Utc>, method: ValuationMethod) -> Self {
        Self {
            product_id: product_id.into(),
            location_id: None,
            as_of,
            method,
            issue_quantity: None,
            selling_price: None,
            standard_cost: None,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_id("product_id", &self.product_id)?;
        validate_optional_id("location_id", self.location_id.as_deref())?;
        if let Some(qty) = self.issue_quantity {
            validate_quantity("issue_quantity", qty)?;
        }
        if let Some(price) = self.selling_price {
            validate_unit_cost("selling_price", price)?;
        }
        if let Some(standard) = self.standard_cost {
            validate_unit_cost("standard_cost", standard)?;
        }
        Ok(())
    }
}

/// Units drawn from one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostLayer {
    pub batch_id: String,
    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,
    pub quantity: i64,
    pub unit_cost: UnitCost,
    pub value: Money,
}

/// A derived valuation of one product at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ValuationSnapshot {
    pub product_id: String,
    #[ts(as = "String")]
    pub as_of: DateTime<Utc>,
    pub method: ValuationMethod,
    /// Total units on hand.
    pub on_hand_quantity: i64,
    /// Units the figures below price.
    pub priced_quantity: i64,
    pub unit_cost: UnitCost,
    pub total_value: Money,
    pub weighted_average_cost: Option<UnitCost>,
    pub standard_cost: Option<UnitCost>,
    /// `(weighted_avg − standard) / standard × 100`; `None` without a
    /// non-zero standard.
    pub variance_percentage: Option<f64>,
    /// `(selling − unit_cost) / selling × 100`; `None` without a selling price.
    pub margin_percentage: Option<f64>,
    /// Layers drawn (FIFO and LIFO only).
    pub layers: Vec<CostLayer>,
}

// =============================================================================
// Layer Ordering
// =============================================================================

/// Available batches of a product known at `as_of`, in receipt order
/// (ties by batch id).
pub fn on_hand_layers<'a>(
    batches: &'a [Batch],
    product_id: &str,
    location_id: Option<&str>,
    as_of: DateTime<Utc>,
) -> CoreResult<Vec<&'a Batch>> {
    let mut layers = Vec::new();
    for batch in batches {
        if batch.product_id != product_id || batch.received_at > as_of {
            continue;
        }
        if location_id.map_or(false, |loc| batch.location_id != loc) {
            continue;
        }
        check_batch_invariants(batch)?;
        if batch.is_available() {
            layers.push(batch);
        }
    }
    layers.sort_by(|a, b| a.received_at.cmp(&b.received_at).then_with(|| a.id.cmp(&b.id)));
    Ok(layers)
}

fn draw_layers(ordered: &[&Batch], quantity: i64) -> Vec<CostLayer> {
    let mut remaining = quantity;
    let mut drawn = Vec::new();
    for batch in ordered {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.available_quantity);
        remaining -= take;
        drawn.push(CostLayer {
            batch_id: batch.id.clone(),
            received_at: batch.received_at,
            quantity: take,
            unit_cost: batch.landed_cost_per_unit,
            value: batch.landed_cost_per_unit.times_quantity(take),
        });
    }
    drawn
}

/// Exact extended value of `(quantity, unit cost)` pairs, rounded once.
fn extended_value<I>(pairs: I) -> (i128, i128)
where
    I: IntoIterator<Item = (i64, UnitCost)>,
{
    pairs.into_iter().fold((0, 0), |(qty, micros), (q, cost)| {
        (qty + q as i128, micros + q as i128 * cost.micros() as i128)
    })
}

fn to_money(micros: i128) -> Money {
    let cents = div_round_half_even(micros, MICROS_PER_CENT as i128);
    Money::from_cents(cents.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
}

fn unit_of(micros: i128, quantity: i128) -> UnitCost {
    if quantity <= 0 {
        return UnitCost::zero();
    }
    let unit = div_round_half_even(micros, quantity);
    UnitCost::from_micros(unit.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
}

// =============================================================================
// Valuation
// =============================================================================

/// Values a product's on-hand stock with the requested method.
///
/// ## Errors
/// - `Validation` for a malformed request
/// - `InsufficientStock` when `issue_quantity` exceeds what is on hand
/// - `InconsistentLedgerState` when a batch of the product is broken
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use costing_core::valuation::{value, ValuationMethod, ValuationRequest};
///
/// let as_of = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
/// let snapshot = value(&ValuationRequest::new("p-1", as_of, ValuationMethod::Fifo), &[]).unwrap();
/// assert_eq!(snapshot.on_hand_quantity, 0);
/// assert!(snapshot.total_value.is_zero());
/// ```
pub fn value(request: &ValuationRequest, batches: &[Batch]) -> CoreResult<ValuationSnapshot> {
    request.validate()?;

    let ordered = on_hand_layers(
        batches,
        &request.product_id,
        request.location_id.as_deref(),
        request.as_of,
    )?;

    let (on_hand, on_hand_micros) =
        extended_value(ordered.iter().map(|b| (b.available_quantity, b.landed_cost_per_unit)));
    let on_hand_quantity = on_hand as i64;
    let weighted_average = UnitCost::weighted_mean(
        ordered.iter().map(|b| (b.available_quantity, b.landed_cost_per_unit)),
    );

    let mut snapshot = ValuationSnapshot {
        product_id: request.product_id.clone(),
        as_of: request.as_of,
        method: request.method,
        on_hand_quantity,
        priced_quantity: 0,
        unit_cost: UnitCost::zero(),
        total_value: Money::zero(),
        weighted_average_cost: weighted_average,
        standard_cost: request.standard_cost,
        variance_percentage: None,
        margin_percentage: None,
        layers: Vec::new(),
    };

    if on_hand_quantity == 0 {
        return Ok(snapshot);
    }

    let priced = request.issue_quantity.unwrap_or(on_hand_quantity);
    if priced > on_hand_quantity {
        return Err(CoreError::InsufficientStock {
            product_id: request.product_id.clone(),
            available: on_hand_quantity,
            requested: priced,
        });
    }
    snapshot.priced_quantity = priced;

    match request.method {
        ValuationMethod::Fifo | ValuationMethod::Lifo => {
            let mut walk = ordered.clone();
            if request.method == ValuationMethod::Lifo {
                walk.sort_by(|a, b| b.received_at.cmp(&a.received_at).then_with(|| a.id.cmp(&b.id)));
            }
            let layers = draw_layers(&walk, priced);
            let (qty, micros) = extended_value(layers.iter().map(|l| (l.quantity, l.unit_cost)));
            snapshot.unit_cost = unit_of(micros, qty);
            snapshot.total_value = to_money(micros);
            snapshot.layers = layers;
        }
        ValuationMethod::WeightedAvg => {
            snapshot.unit_cost = weighted_average.unwrap_or_default();
            // Scale before dividing so partial issues round once
            let cents = div_round_half_even(
                on_hand_micros * priced as i128,
                on_hand * MICROS_PER_CENT as i128,
            );
            snapshot.total_value = Money::from_cents(cents as i64);
        }
        ValuationMethod::Standard => {
            let unit = request
                .standard_cost
                .or(weighted_average)
                .unwrap_or_default();
            snapshot.unit_cost = unit;
            snapshot.total_value = unit.times_quantity(priced);
        }
    }

    snapshot.variance_percentage = variance_percentage(weighted_average, request.standard_cost);
    snapshot.margin_percentage = request
        .selling_price
        .and_then(|selling| margin_percentage(selling, snapshot.unit_cost));

    Ok(snapshot)
}

/// `(actual − standard) / standard × 100`, or `None` for a missing or zero
/// standard.
pub fn variance_percentage(actual: Option<UnitCost>, standard: Option<UnitCost>) -> Option<f64> {
    let actual = actual?;
    let standard = standard?;
    if standard.is_zero() {
        return None;
    }
    Some((actual.micros() - standard.micros()) as f64 / standard.micros() as f64 * 100.0)
}

/// `(selling − cost) / selling × 100`, or `None` for a zero selling price.
pub fn margin_percentage(selling: UnitCost, cost: UnitCost) -> Option<f64> {
    if selling.is_zero() {
        return None;
    }
    Some((selling.micros() - cost.micros()) as f64 / selling.micros() as f64 * 100.0)
}

// =============================================================================
// Unit Tests
// =============================================================================
