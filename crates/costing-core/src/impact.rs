//! # Cost Impact Analyzer
//!
//! Compares valuation methods for a product and recommends one from its
//! inventory turnover.
//!
//! ## Turnover
//! ```text
//! window        = (as_of − lookback, as_of]
//! net sales     = Σ sale quantity − Σ returns of those sales   (in window)
//! annualised    = net sales × 365 / lookback days
//! closing       = on-hand at as_of
//! opening       = closing + net outbound − received             (in window)
//! turnover      = annualised / ((opening + closing) / 2)
//!
//!   turnover > 8   → fifo           high turnover favours current costs
//!   turnover < 3   → lifo           low turnover benefits from deferral
//!   otherwise      → weighted_avg
//! ```
//!
//! The thresholds are heuristic defaults; callers may override them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::{percentage, Money, UnitCost};
use crate::types::{Batch, ConsumptionKind, ConsumptionRecord};
use crate::valuation::{value, ValuationMethod, ValuationRequest};
use crate::validation::{validate_id, validate_optional_id, validate_quantity};

const DAYS_PER_YEAR: f64 = 365.0;

// =============================================================================
// Configuration
// =============================================================================

/// Turnover boundaries for the method recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct TurnoverThresholds {
    /// Above this ratio FIFO is recommended.
    pub high: f64,
    /// Below this ratio LIFO is recommended.
    pub low: f64,
    pub lookback_days: i64,
}

impl Default for TurnoverThresholds {
    fn default() -> Self {
        Self {
            high: 8.0,
            low: 3.0,
            lookback_days: 365,
        }
    }
}

impl TurnoverThresholds {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.low.is_finite() || !self.high.is_finite() || self.low < 0.0 || self.low > self.high {
            return Err(ValidationError::Inconsistent {
                field: "turnover.low".to_string(),
                reason: "must be non-negative and not above turnover.high".to_string(),
            });
        }
        if self.lookback_days <= 0 {
            return Err(ValidationError::must_be_positive("turnover.lookback_days"));
        }
        Ok(())
    }
}

// =============================================================================
// Report Types
// =============================================================================

/// Difference between two methods' unit costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MethodComparison {
    pub method_a: ValuationMethod,
    pub method_b: ValuationMethod,
    /// A − B per unit.
    pub cost_difference: UnitCost,
    /// Relative to B; `None` when B is zero.
    pub percentage_difference: Option<f64>,
    /// `cost_difference × on-hand quantity`.
    pub value_impact: Money,
}

/// Turnover figures behind a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TurnoverAnalysis {
    #[ts(as = "String")]
    pub window_start: DateTime<Utc>,
    #[ts(as = "String")]
    pub window_end: DateTime<Utc>,
    pub net_sales_quantity: i64,
    pub received_quantity: i64,
    pub opening_on_hand: i64,
    pub closing_on_hand: i64,
    pub average_on_hand: f64,
    /// `None` when the average on-hand quantity is zero.
    pub turnover_ratio: Option<f64>,
}

/// Inputs for a method comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompareRequest {
    pub product_id: String,
    #[serde(default)]
    pub location_id: Option<String>,
    #[ts(as = "String")]
    pub as_of: DateTime<Utc>,
    /// Units whose issue cost FIFO and LIFO are compared on (default 1).
    #[serde(default)]
    pub issue_quantity: Option<i64>,
}

/// Method comparison and recommendation for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostImpactReport {
    pub product_id: String,
    #[ts(as = "String")]
    pub as_of: DateTime<Utc>,
    pub on_hand_quantity: i64,
    pub issue_quantity: i64,
    pub fifo_unit_cost: UnitCost,
    pub lifo_unit_cost: UnitCost,
    pub weighted_average_cost: UnitCost,
    pub fifo_vs_weighted_avg: MethodComparison,
    pub lifo_vs_weighted_avg: MethodComparison,
    pub fifo_vs_lifo: MethodComparison,
    pub turnover: TurnoverAnalysis,
    pub recommended_method: ValuationMethod,
    pub rationale: String,
}

// =============================================================================
// Comparison
// =============================================================================

/// Compares unit cost `a` against `b`.
pub fn compare_methods(
    method_a: ValuationMethod,
    a: UnitCost,
    method_b: ValuationMethod,
    b: UnitCost,
    on_hand_quantity: i64,
) -> MethodComparison {
    let difference = a - b;
    MethodComparison {
        method_a,
        method_b,
        cost_difference: difference,
        percentage_difference: percentage(difference.micros(), b.micros()),
        value_impact: difference.times_quantity(on_hand_quantity),
    }
}

// =============================================================================
// Turnover
// =============================================================================

/// Computes turnover for a product over the lookback window ending at
/// `as_of`.
///
/// `batches` and `history` may hold other products; they are filtered here.
pub fn turnover(
    product_id: &str,
    batches: &[Batch],
    history: &[ConsumptionRecord],
    as_of: DateTime<Utc>,
    lookback_days: i64,
) -> TurnoverAnalysis {
    let window_start = as_of - Duration::days(lookback_days);
    let in_window = |at: DateTime<Utc>| at > window_start && at <= as_of;

    let known: HashSet<&str> = batches
        .iter()
        .filter(|b| b.product_id == product_id && b.received_at <= as_of)
        .map(|b| b.id.as_str())
        .collect();

    let received_quantity: i64 = batches
        .iter()
        .filter(|b| known.contains(b.id.as_str()) && in_window(b.received_at))
        .map(|b| b.received_quantity)
        .sum();

    let kinds: HashMap<&str, ConsumptionKind> =
        history.iter().map(|r| (r.id.as_str(), r.kind)).collect();

    let mut closing_on_hand: i64 = batches
        .iter()
        .filter(|b| known.contains(b.id.as_str()))
        .map(|b| b.available_quantity)
        .sum();
    let mut net_outbound = 0i64;
    let mut net_sales = 0i64;

    for record in history.iter().filter(|r| known.contains(r.batch_id.as_str())) {
        let signed = if record.kind.is_outbound() {
            record.quantity
        } else {
            -record.quantity
        };

        if record.occurred_at > as_of {
            // Undo movements after the snapshot instant
            closing_on_hand += signed;
            continue;
        }
        if !in_window(record.occurred_at) {
            continue;
        }

        net_outbound += signed;
        let is_sale = match record.kind {
            ConsumptionKind::Sale => true,
            ConsumptionKind::Return => record
                .reverses
                .as_deref()
                .and_then(|id| kinds.get(id))
                .map_or(false, |kind| *kind == ConsumptionKind::Sale),
            _ => false,
        };
        if is_sale {
            net_sales += signed;
        }
    }

    let opening_on_hand = (closing_on_hand + net_outbound - received_quantity).max(0);
    let average_on_hand = (opening_on_hand + closing_on_hand) as f64 / 2.0;
    let annualised = net_sales.max(0) as f64 * DAYS_PER_YEAR / lookback_days as f64;
    let turnover_ratio = (average_on_hand > 0.0).then(|| annualised / average_on_hand);

    TurnoverAnalysis {
        window_start,
        window_end: as_of,
        net_sales_quantity: net_sales,
        received_quantity,
        opening_on_hand,
        closing_on_hand,
        average_on_hand,
        turnover_ratio,
    }
}

/// Picks a valuation method from a turnover ratio.
pub fn recommend(
    turnover_ratio: Option<f64>,
    thresholds: &TurnoverThresholds,
) -> (ValuationMethod, &'static str) {
    match turnover_ratio {
        None => (
            ValuationMethod::WeightedAvg,
            "insufficient history: no on-hand stock in the lookback window",
        ),
        Some(ratio) if ratio > thresholds.high => (
            ValuationMethod::Fifo,
            "high turnover favors current-cost accuracy",
        ),
        Some(ratio) if ratio < thresholds.low => (
            ValuationMethod::Lifo,
            "low turnover benefits from cost deferral",
        ),
        Some(_) => (
            ValuationMethod::WeightedAvg,
            "balanced approach for moderate turnover",
        ),
    }
}

// =============================================================================
// Analyzer
// =============================================================================

/// Compares FIFO, LIFO and weighted-average costs for a product and
/// recommends a method.
///
/// FIFO and LIFO are compared on the cost of the next `issue_quantity` units
/// (capped at what is on hand); over the whole stock they would always agree.
pub fn compare(
    request: &CompareRequest,
    batches: &[Batch],
    history: &[ConsumptionRecord],
    thresholds: &TurnoverThresholds,
) -> CoreResult<CostImpactReport> {
    validate_id("product_id", &request.product_id)?;
    validate_optional_id("location_id", request.location_id.as_deref())?;
    if let Some(qty) = request.issue_quantity {
        validate_quantity("issue_quantity", qty)?;
    }
    thresholds.validate()?;

    let mut base = ValuationRequest::new(&request.product_id, request.as_of, ValuationMethod::WeightedAvg);
    base.location_id = request.location_id.clone();
    let average = value(&base, batches)?;
    let on_hand = average.on_hand_quantity;
    let issue = request.issue_quantity.unwrap_or(1).min(on_hand);

    let issue_cost = |method: ValuationMethod| -> CoreResult<UnitCost> {
        if issue == 0 {
            return Ok(UnitCost::zero());
        }
        let mut req = base.clone();
        req.method = method;
        req.issue_quantity = Some(issue);
        Ok(value(&req, batches)?.unit_cost)
    };
    let fifo = issue_cost(ValuationMethod::Fifo)?;
    let lifo = issue_cost(ValuationMethod::Lifo)?;
    let weighted = average.weighted_average_cost.unwrap_or_default();

    let analysis = turnover(
        &request.product_id,
        batches,
        history,
        request.as_of,
        thresholds.lookback_days,
    );
    let (method, rationale) = recommend(analysis.turnover_ratio, thresholds);

    Ok(CostImpactReport {
        product_id: request.product_id.clone(),
        as_of: request.as_of,
        on_hand_quantity: on_hand,
        issue_quantity: issue,
        fifo_unit_cost: fifo,
        lifo_unit_cost: lifo,
        weighted_average_cost: weighted,
        fifo_vs_weighted_avg: compare_methods(
            ValuationMethod::Fifo,
            fifo,
            ValuationMethod::WeightedAvg,
            weighted,
            on_hand,
        ),
        lifo_vs_weighted_avg: compare_methods(
            ValuationMethod::Lifo,
            lifo,
            ValuationMethod::WeightedAvg,
            weighted,
            on_hand,
        ),
        fifo_vs_lifo: compare_methods(ValuationMethod::Fifo, fifo, ValuationMethod::Lifo, lifo, on_hand),
        turnover: analysis,
        recommended_method: method,
        rationale: rationale.to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LandedCostBreakdown, QualityGrade};
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap()
    }

    fn batch(id: &str, received: i64, available: i64, cents: i64, days_ago: i64) -> Batch {
        let cost = UnitCost::from_cents(cents);
        Batch {
            id: id.into(),
            product_id: "p-1".into(),
            location_id: "wh-1".into(),
            supplier_id: "sup-1".into(),
            purchase_order_id: None,
            received_quantity: received,
            available_quantity: available,
            unit_price: cost,
            landed: LandedCostBreakdown::default(),
            landed_cost_per_unit: cost,
            weight_grams: None,
            declared_value: None,
            received_at: as_of() - Duration::days(days_ago),
            expiry_at: None,
            quality_grade: QualityGrade::B,
        }
    }

    fn record(id: &str, batch_id: &str, kind: ConsumptionKind, qty: i64, days_ago: i64) -> ConsumptionRecord {
        ConsumptionRecord {
            id: id.into(),
            batch_id: batch_id.into(),
            product_id: "p-1".into(),
            kind,
            quantity: qty,
            reverses: None,
            occurred_at: as_of() - Duration::days(days_ago),
        }
    }

    fn request() -> CompareRequest {
        CompareRequest {
            product_id: "p-1".into(),
            location_id: None,
            as_of: as_of(),
            issue_quantity: None,
        }
    }

    #[test]
    fn test_pairwise_differences() {
        let batches = vec![batch("b-a", 100, 100, 10_000, 400), batch("b-b", 50, 50, 12_000, 400)];
        let report = compare(&request(), &batches, &[], &TurnoverThresholds::default()).unwrap();

        assert_eq!(report.fifo_unit_cost, UnitCost::from_cents(10_000));
        assert_eq!(report.lifo_unit_cost, UnitCost::from_cents(10_000));
        assert_eq!(report.fifo_vs_lifo.cost_difference, UnitCost::zero());

        let cmp = &report.fifo_vs_weighted_avg;
        assert_eq!(cmp.cost_difference.micros(), 100_000_000 - 106_666_667);
        assert_eq!(cmp.value_impact.cents(), -100_000);
        assert!(cmp.percentage_difference.unwrap() < 0.0);
    }

    #[test]
    fn test_lifo_marginal_cost_differs_with_distinct_timestamps() {
        let batches = vec![batch("b-a", 100, 100, 10_000, 400), batch("b-b", 50, 50, 12_000, 380)];
        let report = compare(&request(), &batches, &[], &TurnoverThresholds::default()).unwrap();
        assert_eq!(report.lifo_unit_cost, UnitCost::from_cents(12_000));
        assert_eq!(report.fifo_vs_lifo.cost_difference, UnitCost::from_cents(-2_000));
        assert_eq!(report.fifo_vs_lifo.value_impact.cents(), -300_000);
    }

    #[test]
    fn test_high_turnover_recommends_fifo() {
        // 1000 received a year ago, 990 sold, 10 left
        let batches = vec![batch("b-a", 1_000, 10, 500, 360)];
        let history = vec![record("c-1", "b-a", ConsumptionKind::Sale, 990, 100)];
        let analysis = turnover("p-1", &batches, &history, as_of(), 365);
        assert_eq!(analysis.opening_on_hand, 0);
        assert_eq!(analysis.closing_on_hand, 10);
        // 990 / 5
        assert_eq!(analysis.turnover_ratio, Some(198.0));

        let report = compare(&request(), &batches, &history, &TurnoverThresholds::default()).unwrap();
        assert_eq!(report.recommended_method, ValuationMethod::Fifo);
    }

    #[test]
    fn test_low_turnover_recommends_lifo() {
        let batches = vec![batch("b-a", 100, 90, 500, 500)];
        let history = vec![record("c-1", "b-a", ConsumptionKind::Sale, 10, 30)];
        let analysis = turnover("p-1", &batches, &history, as_of(), 365);
        assert_eq!(analysis.opening_on_hand, 100);
        let (method, _) = recommend(analysis.turnover_ratio, &TurnoverThresholds::default());
        assert_eq!(method, ValuationMethod::Lifo);
    }

    #[test]
    fn test_returns_reduce_net_sales() {
        let batches = vec![batch("b-a", 100, 60, 500, 500)];
        let mut ret = record("c-2", "b-a", ConsumptionKind::Return, 10, 5);
        ret.reverses = Some("c-1".into());
        let history = vec![
            record("c-1", "b-a", ConsumptionKind::Sale, 50, 10),
            ret,
        ];
        let analysis = turnover("p-1", &batches, &history, as_of(), 365);
        assert_eq!(analysis.net_sales_quantity, 40);
        assert_eq!(analysis.opening_on_hand, 100);
    }

    #[test]
    fn test_moderate_and_empty() {
        let thresholds = TurnoverThresholds::default();
        assert_eq!(recommend(Some(5.0), &thresholds).0, ValuationMethod::WeightedAvg);
        assert_eq!(recommend(None, &thresholds).0, ValuationMethod::WeightedAvg);

        let report = compare(&request(), &[], &[], &thresholds).unwrap();
        assert_eq!(report.on_hand_quantity, 0);
        assert_eq!(report.fifo_vs_lifo.percentage_difference, None);
        assert_eq!(report.recommended_method, ValuationMethod::WeightedAvg);
    }

    #[test]
    fn test_threshold_validation() {
        let bad = TurnoverThresholds {
            high: 2.0,
            low: 3.0,
            lookback_days: 365,
        };
        assert!(bad.validate().is_err());
    }
}
