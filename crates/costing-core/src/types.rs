//! # Domain Types
//!
//! Ledger and purchase-order types shared by every component.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────────┐        ┌──────────────────────────┐          │
//! │  │        Batch         │◄───────│   ConsumptionRecord      │          │
//! │  │  ──────────────────  │        │  ──────────────────────  │          │
//! │  │  received / available│        │  sale | transfer | scrap │          │
//! │  │  unit_price          │        │  return (reverses = id)  │          │
//! │  │  landed breakdown    │        └──────────────────────────┘          │
//! │  └──────────▲───────────┘                                              │
//! │             │ per-unit shares                                           │
//! │  ┌──────────┴───────────┐        ┌──────────────────────────┐          │
//! │  │   AllocationResult   │◄───────│  PurchaseOrderCostSet    │          │
//! │  │  (immutable, audit)  │        │  freight, insurance,     │          │
//! │  │  supersedes = id?    │        │  duty, handling, other   │          │
//! │  └──────────────────────┘        └──────────────────────────┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity carries an opaque string `id` (UUID v4 when generated by the
//! engine). Product, location, supplier and purchase-order references belong
//! to external collaborators and are never interpreted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{ExchangeRate, Money, UnitCost};

// =============================================================================
// Quality Grade
// =============================================================================

/// Quality grade assigned at goods receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    A,
    B,
    C,
    #[default]
    Ungraded,
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityGrade::A => write!(f, "a"),
            QualityGrade::B => write!(f, "b"),
            QualityGrade::C => write!(f, "c"),
            QualityGrade::Ungraded => write!(f, "ungraded"),
        }
    }
}

// =============================================================================
// Landed Cost Breakdown
// =============================================================================

/// Per-unit shares of the five shared acquisition costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LandedCostBreakdown {
    pub freight: UnitCost,
    pub insurance: UnitCost,
    pub duty: UnitCost,
    pub handling: UnitCost,
    pub other: UnitCost,
}

impl LandedCostBreakdown {
    /// Sum of the five per-unit components.
    pub fn total(&self) -> UnitCost {
        self.freight + self.insurance + self.duty + self.handling + self.other
    }

    pub fn get(&self, component: CostComponent) -> UnitCost {
        match component {
            CostComponent::Freight => self.freight,
            CostComponent::Insurance => self.insurance,
            CostComponent::Duty => self.duty,
            CostComponent::Handling => self.handling,
            CostComponent::Other => self.other,
        }
    }

    fn slot(&mut self, component: CostComponent) -> &mut UnitCost {
        match component {
            CostComponent::Freight => &mut self.freight,
            CostComponent::Insurance => &mut self.insurance,
            CostComponent::Duty => &mut self.duty,
            CostComponent::Handling => &mut self.handling,
            CostComponent::Other => &mut self.other,
        }
    }

    pub fn set(&mut self, component: CostComponent, value: UnitCost) {
        *self.slot(component) = value;
    }

    pub fn has_negative(&self) -> bool {
        CostComponent::ALL.iter().any(|c| self.get(*c).is_negative())
    }
}

// =============================================================================
// Batch
// =============================================================================

/// One received lot of a product at a location.
///
/// ## Invariants
/// - `0 <= available_quantity <= received_quantity`
/// - `landed_cost_per_unit >= unit_price >= 0`
/// - `landed_cost_per_unit == unit_price + landed.total()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Batch {
    pub id: String,
    pub product_id: String,
    pub location_id: String,
    pub supplier_id: String,

    /// Purchase order the batch was received against, if any.
    pub purchase_order_id: Option<String>,

    pub received_quantity: i64,
    pub available_quantity: i64,

    /// Base purchase price per unit, in the base currency.
    pub unit_price: UnitCost,

    /// Per-unit shared costs from the active allocation.
    pub landed: LandedCostBreakdown,

    /// `unit_price + landed.total()`.
    pub landed_cost_per_unit: UnitCost,

    /// Declared gross weight, needed by the `by_weight` basis.
    pub weight_grams: Option<i64>,

    /// Declared customs/invoice value; `by_value` falls back to
    /// `received_quantity × unit_price` when absent.
    pub declared_value: Option<Money>,

    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub expiry_at: Option<DateTime<Utc>>,

    pub quality_grade: QualityGrade,
}

impl Batch {
    /// Value of the units still on hand at landed cost.
    pub fn on_hand_value(&self) -> Money {
        self.landed_cost_per_unit.times_quantity(self.available_quantity)
    }

    /// Landed cost above the base purchase price, per unit.
    pub fn overhead_per_unit(&self) -> UnitCost {
        self.landed_cost_per_unit - self.unit_price
    }

    /// Whole days from `as_of` until expiry (negative once expired).
    pub fn days_to_expiry(&self, as_of: DateTime<Utc>) -> Option<i64> {
        self.expiry_at.map(|expiry| (expiry - as_of).num_days())
    }

    pub fn is_available(&self) -> bool {
        self.available_quantity > 0
    }

    /// Value used as the `by_value` share weight.
    pub fn allocation_value(&self) -> Money {
        self.declared_value
            .unwrap_or_else(|| self.unit_price.times_quantity(self.received_quantity))
    }

    /// Replaces the landed breakdown and recomputes the landed unit cost.
    pub fn set_landed(&mut self, landed: LandedCostBreakdown) {
        self.landed = landed;
        self.landed_cost_per_unit = self.unit_price + landed.total();
    }
}

// =============================================================================
// Consumption
// =============================================================================

/// What removed (or returned) units from a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionKind {
    Sale,
    Transfer,
    Scrap,
    /// Reversal of an earlier consumption; adds units back.
    Return,
}

impl ConsumptionKind {
    /// True for kinds that decrement available quantity.
    pub fn is_outbound(&self) -> bool {
        !matches!(self, ConsumptionKind::Return)
    }
}

impl fmt::Display for ConsumptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumptionKind::Sale => write!(f, "sale"),
            ConsumptionKind::Transfer => write!(f, "transfer"),
            ConsumptionKind::Scrap => write!(f, "scrap"),
            ConsumptionKind::Return => write!(f, "return"),
        }
    }
}

impl FromStr for ConsumptionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sale" => Ok(ConsumptionKind::Sale),
            "transfer" => Ok(ConsumptionKind::Transfer),
            "scrap" => Ok(ConsumptionKind::Scrap),
            "return" => Ok(ConsumptionKind::Return),
            _ => Err(ValidationError::NotAllowed {
                field: "kind".to_string(),
                allowed: vec![
                    "sale".into(),
                    "transfer".into(),
                    "scrap".into(),
                    "return".into(),
                ],
            }),
        }
    }
}

/// An append-only movement against a batch.
///
/// History is never edited: a return is a new record whose `reverses`
/// points at the original outbound record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConsumptionRecord {
    pub id: String,
    pub batch_id: String,
    pub product_id: String,
    pub kind: ConsumptionKind,
    /// Always positive; direction comes from `kind`.
    pub quantity: i64,
    pub reverses: Option<String>,
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
}

// =============================================================================
// Allocation Basis
// =============================================================================

/// How shared purchase-order costs are split across batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AllocationBasis {
    #[default]
    ByValue,
    ByWeight,
    ByQuantity,
}

impl fmt::Display for AllocationBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationBasis::ByValue => write!(f, "by_value"),
            AllocationBasis::ByWeight => write!(f, "by_weight"),
            AllocationBasis::ByQuantity => write!(f, "by_quantity"),
        }
    }
}

impl FromStr for AllocationBasis {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "by_value" | "value" => Ok(AllocationBasis::ByValue),
            "by_weight" | "weight" => Ok(AllocationBasis::ByWeight),
            "by_quantity" | "quantity" => Ok(AllocationBasis::ByQuantity),
            _ => Err(ValidationError::NotAllowed {
                field: "basis".to_string(),
                allowed: vec!["by_value".into(), "by_weight".into(), "by_quantity".into()],
            }),
        }
    }
}

// =============================================================================
// Shared Costs
// =============================================================================

/// The five named shared-cost components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CostComponent {
    Freight,
    Insurance,
    Duty,
    Handling,
    Other,
}

impl CostComponent {
    pub const ALL: [CostComponent; 5] = [
        CostComponent::Freight,
        CostComponent::Insurance,
        CostComponent::Duty,
        CostComponent::Handling,
        CostComponent::Other,
    ];
}

impl fmt::Display for CostComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostComponent::Freight => write!(f, "freight"),
            CostComponent::Insurance => write!(f, "insurance"),
            CostComponent::Duty => write!(f, "duty"),
            CostComponent::Handling => write!(f, "handling"),
            CostComponent::Other => write!(f, "other"),
        }
    }
}

/// Amounts for each shared-cost component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SharedCosts {
    pub freight: Money,
    pub insurance: Money,
    pub duty: Money,
    pub handling: Money,
    pub other: Money,
}

impl SharedCosts {
    pub fn total(&self) -> Money {
        self.freight + self.insurance + self.duty + self.handling + self.other
    }

    pub fn get(&self, component: CostComponent) -> Money {
        match component {
            CostComponent::Freight => self.freight,
            CostComponent::Insurance => self.insurance,
            CostComponent::Duty => self.duty,
            CostComponent::Handling => self.handling,
            CostComponent::Other => self.other,
        }
    }

    pub fn set(&mut self, component: CostComponent, value: Money) {
        match component {
            CostComponent::Freight => self.freight = value,
            CostComponent::Insurance => self.insurance = value,
            CostComponent::Duty => self.duty = value,
            CostComponent::Handling => self.handling = value,
            CostComponent::Other => self.other = value,
        }
    }

    /// Converts every component with one fixed rate.
    pub fn convert(&self, rate: ExchangeRate) -> SharedCosts {
        let mut converted = SharedCosts::default();
        for component in CostComponent::ALL {
            converted.set(component, self.get(component).convert(rate));
        }
        converted
    }
}

// =============================================================================
// Purchase Order Cost Set
// =============================================================================

/// Shared acquisition costs of one purchase order.
///
/// Amounts are stated in `currency` and converted to the base currency with
/// `exchange_rate` before allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrderCostSet {
    pub id: String,
    pub purchase_order_id: String,
    pub costs: SharedCosts,
    pub basis: AllocationBasis,
    pub total_order_value: Money,
    /// ISO 4217 code, e.g. "USD".
    pub currency: String,
    pub exchange_rate: ExchangeRate,
    /// Cost set this one corrects, if any.
    pub supersedes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PurchaseOrderCostSet {
    /// Shared costs in the base currency.
    pub fn base_costs(&self) -> SharedCosts {
        self.costs.convert(self.exchange_rate)
    }
}

// =============================================================================
// Allocation Result
// =============================================================================

/// One batch's share of a cost set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationLine {
    pub batch_id: String,
    /// Raw basis measure (cents, grams or units).
    pub share_weight: i64,
    /// `share_weight / Σ share_weight`, for display.
    pub share_fraction: f64,
    /// Amounts absorbed by this batch, in the base currency.
    pub allocated: SharedCosts,
    pub per_unit: LandedCostBreakdown,
    pub landed_cost_per_unit: UnitCost,
}

impl AllocationLine {
    pub fn allocated_total(&self) -> Money {
        self.allocated.total()
    }
}

/// Immutable record of one cost-set application.
///
/// Corrections never edit a result: a new result names the one it
/// `supersedes`, and both are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationResult {
    pub id: String,
    pub cost_set_id: String,
    pub purchase_order_id: String,
    pub basis: AllocationBasis,
    /// Ordered by batch id ascending.
    pub lines: Vec<AllocationLine>,
    pub total_allocated: Money,
    pub supersedes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl AllocationResult {
    pub fn line_for(&self, batch_id: &str) -> Option<&AllocationLine> {
        self.lines.iter().find(|line| line.batch_id == batch_id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn batch() -> Batch {
        Batch {
            id: "b-1".into(),
            product_id: "p-1".into(),
            location_id: "l-1".into(),
            supplier_id: "s-1".into(),
            purchase_order_id: Some("po-1".into()),
            received_quantity: 10,
            available_quantity: 4,
            unit_price: UnitCost::from_cents(1000),
            landed: LandedCostBreakdown::default(),
            landed_cost_per_unit: UnitCost::from_cents(1000),
            weight_grams: None,
            declared_value: None,
            received_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            expiry_at: None,
            quality_grade: QualityGrade::A,
        }
    }

    #[test]
    fn test_set_landed_recomputes_unit_cost() {
        let mut b = batch();
        let landed = LandedCostBreakdown {
            freight: UnitCost::from_cents(100),
            duty: UnitCost::from_cents(50),
            ..Default::default()
        };
        b.set_landed(landed);
        assert_eq!(b.landed_cost_per_unit, UnitCost::from_cents(1150));
        assert_eq!(b.overhead_per_unit(), UnitCost::from_cents(150));
        assert_eq!(b.on_hand_value().cents(), 4600);
    }

    #[test]
    fn test_allocation_value_falls_back_to_extended_price() {
        let mut b = batch();
        assert_eq!(b.allocation_value().cents(), 10_000);
        b.declared_value = Some(Money::from_cents(7_500));
        assert_eq!(b.allocation_value().cents(), 7_500);
    }

    #[test]
    fn test_days_to_expiry() {
        let mut b = batch();
        let as_of = b.received_at;
        assert_eq!(b.days_to_expiry(as_of), None);
        b.expiry_at = Some(as_of + Duration::days(45));
        assert_eq!(b.days_to_expiry(as_of), Some(45));
        assert_eq!(b.days_to_expiry(as_of + Duration::days(50)), Some(-5));
    }

    #[test]
    fn test_basis_parsing() {
        assert_eq!("by_value".parse::<AllocationBasis>().unwrap(), AllocationBasis::ByValue);
        assert_eq!("weight".parse::<AllocationBasis>().unwrap(), AllocationBasis::ByWeight);
        assert!("by_volume".parse::<AllocationBasis>().is_err());
        assert_eq!(AllocationBasis::ByQuantity.to_string(), "by_quantity");
    }

    #[test]
    fn test_shared_costs_total_and_convert() {
        let costs = SharedCosts {
            freight: Money::from_cents(1000),
            duty: Money::from_cents(500),
            ..Default::default()
        };
        assert_eq!(costs.total().cents(), 1500);
        let converted = costs.convert(ExchangeRate::from_micros(2_000_000));
        assert_eq!(converted.total().cents(), 3000);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_value(AllocationBasis::ByWeight).unwrap(),
            serde_json::json!("by_weight")
        );
        let kind: ConsumptionKind = serde_json::from_str("\"transfer\"").unwrap();
        assert_eq!(kind, ConsumptionKind::Transfer);

        // Money and UnitCost travel as bare integers
        let json = serde_json::to_value(batch()).unwrap();
        assert_eq!(json["unit_price"], serde_json::json!(10_000_000));
        assert_eq!(json["quality_grade"], serde_json::json!("a"));
    }

    #[test]
    fn test_consumption_kind_direction() {
        assert!(ConsumptionKind::Sale.is_outbound());
        assert!(!ConsumptionKind::Return.is_outbound());
        assert_eq!("scrap".parse::<ConsumptionKind>().unwrap(), ConsumptionKind::Scrap);
    }
}
