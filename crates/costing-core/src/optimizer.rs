//! # Allocation Optimizer
//!
//! Ranks the batches of a product as fulfillment candidates for a demand.
//!
//! ## Scoring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sub-scores, each 0..=100                                              │
//! │    cost      (max − landed) / (max − min) × 100   (all equal → 100)    │
//! │    expiry    (1 − days_to_expiry / horizon) × 100, clamped             │
//! │              (no expiry → 0, expired → 100)                            │
//! │    quantity  min(available / requested, 1) × 100                       │
//! │                                                                         │
//! │  score = Σ weight × sub-score / Σ weight                               │
//! │                                                                         │
//! │  Strategy            cost   expiry  quantity                           │
//! │  cost_optimization   0.70   0.20    0.10                               │
//! │  expiry_management   0.20   0.70    0.10                               │
//! │  balanced            1/3    1/3     1/3                                │
//! │  fifo_strict         100 × (n − rank) / n   by receipt order           │
//! │                                                                         │
//! │  Order: score desc → received_at asc → batch id asc                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Candidates are never merged: a batch that cannot cover the demand alone
//! is still listed, with `can_fulfill = false`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::UnitCost;
use crate::types::Batch;
use crate::valuation::on_hand_layers;
use crate::validation::{validate_id, validate_optional_id, validate_quantity};

// =============================================================================
// Strategy & Risk
// =============================================================================

/// Objective the ranking favours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    CostOptimization,
    ExpiryManagement,
    FifoStrict,
    #[default]
    Balanced,
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationStrategy::CostOptimization => write!(f, "cost_optimization"),
            AllocationStrategy::ExpiryManagement => write!(f, "expiry_management"),
            AllocationStrategy::FifoStrict => write!(f, "fifo_strict"),
            AllocationStrategy::Balanced => write!(f, "balanced"),
        }
    }
}

impl FromStr for AllocationStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cost_optimization" => Ok(AllocationStrategy::CostOptimization),
            "expiry_management" => Ok(AllocationStrategy::ExpiryManagement),
            "fifo_strict" => Ok(AllocationStrategy::FifoStrict),
            "balanced" => Ok(AllocationStrategy::Balanced),
            _ => Err(ValidationError::NotAllowed {
                field: "strategy".to_string(),
                allowed: vec![
                    "cost_optimization".into(),
                    "expiry_management".into(),
                    "fifo_strict".into(),
                    "balanced".into(),
                ],
            }),
        }
    }
}

/// Risk classification of a candidate, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskClass {
    HighExpiryRisk,
    MediumExpiryRisk,
    HighCost,
    LowRisk,
}

// =============================================================================
// Configuration
// =============================================================================

/// Relative weights of the three sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StrategyWeights {
    pub cost: f64,
    pub expiry: f64,
    pub quantity: f64,
}

impl StrategyWeights {
    pub const fn new(cost: f64, expiry: f64, quantity: f64) -> Self {
        Self { cost, expiry, quantity }
    }

    fn total(&self) -> f64 {
        self.cost + self.expiry + self.quantity
    }

    fn validate(&self, field: &str) -> Result<(), ValidationError> {
        let parts = [self.cost, self.expiry, self.quantity];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ValidationError::must_not_be_negative(field));
        }
        if self.total() <= 0.0 {
            return Err(ValidationError::must_be_positive(field));
        }
        Ok(())
    }
}

/// Weights per strategy plus the expiry horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct ScoringConfig {
    pub cost_optimization: StrategyWeights,
    pub expiry_management: StrategyWeights,
    pub balanced: StrategyWeights,
    /// Days at which expiry urgency reaches zero.
    pub expiry_horizon_days: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            cost_optimization: StrategyWeights::new(0.70, 0.20, 0.10),
            expiry_management: StrategyWeights::new(0.20, 0.70, 0.10),
            balanced: StrategyWeights::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0),
            expiry_horizon_days: 180,
        }
    }
}

impl ScoringConfig {
    /// Weights for a scored strategy; `None` for `fifo_strict`.
    pub fn weights(&self, strategy: AllocationStrategy) -> Option<StrategyWeights> {
        match strategy {
            AllocationStrategy::CostOptimization => Some(self.cost_optimization),
            AllocationStrategy::ExpiryManagement => Some(self.expiry_management),
            AllocationStrategy::Balanced => Some(self.balanced),
            AllocationStrategy::FifoStrict => None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.cost_optimization.validate("scoring.cost_optimization")?;
        self.expiry_management.validate("scoring.expiry_management")?;
        self.balanced.validate("scoring.balanced")?;
        if self.expiry_horizon_days <= 0 {
            return Err(ValidationError::must_be_positive("scoring.expiry_horizon_days"));
        }
        Ok(())
    }
}

/// Boundaries of the risk classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct RiskThresholds {
    /// Below this many days to expiry: `HIGH_EXPIRY_RISK`.
    pub high_expiry_days: i64,
    /// Below this many days to expiry: `MEDIUM_EXPIRY_RISK`.
    pub medium_expiry_days: i64,
    /// Premium over the weighted average that makes a batch `HIGH_COST`.
    pub cost_premium_percentage: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high_expiry_days: 30,
            medium_expiry_days: 90,
            cost_premium_percentage: 10.0,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.high_expiry_days < 0 || self.medium_expiry_days < self.high_expiry_days {
            return Err(ValidationError::Inconsistent {
                field: "risk.medium_expiry_days".to_string(),
                reason: "must be at least risk.high_expiry_days, both non-negative".to_string(),
            });
        }
        if !self.cost_premium_percentage.is_finite() || self.cost_premium_percentage < 0.0 {
            return Err(ValidationError::must_not_be_negative("risk.cost_premium_percentage"));
        }
        Ok(())
    }
}

/// Everything the optimizer is tuned by.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub scoring: ScoringConfig,
    pub risk: RiskThresholds,
}

// =============================================================================
// Request & Plan
// =============================================================================

/// A demand to fulfil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationRequest {
    pub product_id: String,
    #[serde(default)]
    pub location_id: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub strategy: AllocationStrategy,
    #[ts(as = "String")]
    pub as_of: DateTime<Utc>,
}

impl AllocationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("product_id", &self.product_id)?;
        validate_optional_id("location_id", self.location_id.as_deref())?;
        validate_quantity("quantity", self.quantity)?;
        Ok(())
    }
}

/// One ranked batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationCandidate {
    pub batch_id: String,
    pub location_id: String,
    pub available_quantity: i64,
    pub landed_cost_per_unit: UnitCost,
    /// Weighted average minus this batch's landed cost (positive = cheaper).
    pub cost_savings_per_unit: UnitCost,
    pub risk: RiskClass,
    pub score: f64,
    pub cost_score: f64,
    pub expiry_score: f64,
    pub quantity_score: f64,
    pub days_to_expiry: Option<i64>,
    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,
    /// Whether this batch alone covers the requested quantity.
    pub can_fulfill: bool,
}

/// Demand the candidate pool cannot cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Shortfall {
    pub requested: i64,
    pub available: i64,
}

/// Ranked candidates for one demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationPlan {
    pub product_id: String,
    pub strategy: AllocationStrategy,
    pub requested_quantity: i64,
    pub total_available: i64,
    pub weighted_average_cost: Option<UnitCost>,
    pub candidates: Vec<AllocationCandidate>,
    /// Present when every candidate combined falls short.
    pub shortfall: Option<Shortfall>,
}

// =============================================================================
// Classification & Scores
// =============================================================================

/// Classifies a batch; expiry is checked before cost.
pub fn classify_risk(
    batch: &Batch,
    as_of: DateTime<Utc>,
    weighted_average: Option<UnitCost>,
    thresholds: &RiskThresholds,
) -> RiskClass {
    if let Some(days) = batch.days_to_expiry(as_of) {
        if days < thresholds.high_expiry_days {
            return RiskClass::HighExpiryRisk;
        }
        if days < thresholds.medium_expiry_days {
            return RiskClass::MediumExpiryRisk;
        }
    }

    if let Some(avg) = weighted_average {
        let ceiling = avg.micros() as f64 * (1.0 + thresholds.cost_premium_percentage / 100.0);
        if batch.landed_cost_per_unit.micros() as f64 > ceiling {
            return RiskClass::HighCost;
        }
    }

    RiskClass::LowRisk
}

fn cost_score(cost: UnitCost, min: i64, max: i64) -> f64 {
    if max == min {
        return 100.0;
    }
    (max - cost.micros()) as f64 / (max - min) as f64 * 100.0
}

fn expiry_score(days_to_expiry: Option<i64>, horizon_days: i64) -> f64 {
    match days_to_expiry {
        None => 0.0,
        Some(days) => ((1.0 - days as f64 / horizon_days as f64) * 100.0).clamp(0.0, 100.0),
    }
}

fn quantity_score(available: i64, requested: i64) -> f64 {
    (available as f64 / requested as f64).min(1.0) * 100.0
}

// =============================================================================
// Optimizer
// =============================================================================

/// Ranks the available batches of a product for a demand.
///
/// An empty pool or a shortfall is reported in the plan, not raised.
///
/// ## Errors
/// - `Validation` for a malformed request (including `quantity == 0`)
/// - `InconsistentLedgerState` when a batch of the product is broken
pub fn optimal_allocation(
    request: &AllocationRequest,
    batches: &[Batch],
    config: &OptimizerConfig,
) -> CoreResult<AllocationPlan> {
    request.validate()?;

    // The cost baseline spans every location of the product
    let product_layers = on_hand_layers(batches, &request.product_id, None, request.as_of)?;
    let weighted_average = UnitCost::weighted_mean(
        product_layers
            .iter()
            .map(|b| (b.available_quantity, b.landed_cost_per_unit)),
    );

    let pool = on_hand_layers(
        batches,
        &request.product_id,
        request.location_id.as_deref(),
        request.as_of,
    )?;
    let total_available: i64 = pool.iter().map(|b| b.available_quantity).sum();

    let min_cost = pool.iter().map(|b| b.landed_cost_per_unit.micros()).min().unwrap_or(0);
    let max_cost = pool.iter().map(|b| b.landed_cost_per_unit.micros()).max().unwrap_or(0);
    let weights = config.scoring.weights(request.strategy);
    let n = pool.len();

    // `pool` is in receipt order, which is the fifo_strict rank
    let mut candidates: Vec<AllocationCandidate> = pool
        .iter()
        .enumerate()
        .map(|(rank, batch)| {
            let days = batch.days_to_expiry(request.as_of);
            let cost = cost_score(batch.landed_cost_per_unit, min_cost, max_cost);
            let expiry = expiry_score(days, config.scoring.expiry_horizon_days);
            let quantity = quantity_score(batch.available_quantity, request.quantity);

            let score = match weights {
                Some(w) => ((w.cost * cost + w.expiry * expiry + w.quantity * quantity) / w.total())
                    .clamp(0.0, 100.0),
                None => 100.0 * (n - rank) as f64 / n as f64,
            };

            AllocationCandidate {
                batch_id: batch.id.clone(),
                location_id: batch.location_id.clone(),
                available_quantity: batch.available_quantity,
                landed_cost_per_unit: batch.landed_cost_per_unit,
                cost_savings_per_unit: weighted_average.unwrap_or(batch.landed_cost_per_unit)
                    - batch.landed_cost_per_unit,
                risk: classify_risk(batch, request.as_of, weighted_average, &config.risk),
                score,
                cost_score: cost,
                expiry_score: expiry,
                quantity_score: quantity,
                days_to_expiry: days,
                received_at: batch.received_at,
                can_fulfill: batch.available_quantity >= request.quantity,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.received_at.cmp(&b.received_at))
            .then_with(|| a.batch_id.cmp(&b.batch_id))
    });

    let shortfall = (total_available < request.quantity).then_some(Shortfall {
        requested: request.quantity,
        available: total_available,
    });

    Ok(AllocationPlan {
        product_id: request.product_id.clone(),
        strategy: request.strategy,
        requested_quantity: request.quantity,
        total_available,
        weighted_average_cost: weighted_average,
        candidates,
        shortfall,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::types::{LandedCostBreakdown, QualityGrade};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn batch(id: &str, qty: i64, cents: i64, age_days: i64, expires_in: Option<i64>) -> Batch {
        let cost = UnitCost::from_cents(cents);
        Batch {
            id: id.into(),
            product_id: "p-1".into(),
            location_id: "wh-1".into(),
            supplier_id: "sup-1".into(),
            purchase_order_id: None,
            received_quantity: qty,
            available_quantity: qty,
            unit_price: cost,
            landed: LandedCostBreakdown::default(),
            landed_cost_per_unit: cost,
            weight_grams: None,
            declared_value: None,
            received_at: now() - Duration::days(age_days),
            expiry_at: expires_in.map(|d| now() + Duration::days(d)),
            quality_grade: QualityGrade::A,
        }
    }

    fn request(quantity: i64, strategy: AllocationStrategy) -> AllocationRequest {
        AllocationRequest {
            product_id: "p-1".into(),
            location_id: None,
            quantity,
            strategy,
            as_of: now(),
        }
    }

    fn pool() -> Vec<Batch> {
        vec![
            batch("b-old", 20, 1_000, 60, Some(200)),
            batch("b-cheap", 50, 800, 30, Some(300)),
            batch("b-expiring", 30, 1_200, 10, Some(20)),
        ]
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let err = optimal_allocation(&request(0, AllocationStrategy::Balanced), &pool(), &OptimizerConfig::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_scores_sorted_descending() {
        for strategy in [
            AllocationStrategy::CostOptimization,
            AllocationStrategy::ExpiryManagement,
            AllocationStrategy::Balanced,
            AllocationStrategy::FifoStrict,
        ] {
            let plan = optimal_allocation(&request(25, strategy), &pool(), &OptimizerConfig::default()).unwrap();
            assert!(plan.candidates.windows(2).all(|w| w[0].score >= w[1].score));
            assert!(plan.candidates.iter().all(|c| (0.0..=100.0).contains(&c.score)));
        }
    }

    #[test]
    fn test_fifo_strict_follows_receipt_order() {
        let plan = optimal_allocation(&request(10, AllocationStrategy::FifoStrict), &pool(), &OptimizerConfig::default())
            .unwrap();
        let ids: Vec<_> = plan.candidates.iter().map(|c| c.batch_id.as_str()).collect();
        assert_eq!(ids, vec!["b-old", "b-cheap", "b-expiring"]);
        assert_eq!(plan.candidates[0].score, 100.0);
    }

    #[test]
    fn test_cost_optimization_prefers_cheapest() {
        let plan = optimal_allocation(
            &request(10, AllocationStrategy::CostOptimization),
            &pool(),
            &OptimizerConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.candidates[0].batch_id, "b-cheap");
        assert!(plan.candidates[0].cost_savings_per_unit.micros() > 0);
    }

    #[test]
    fn test_expiry_management_prefers_expiring() {
        let plan = optimal_allocation(
            &request(10, AllocationStrategy::ExpiryManagement),
            &pool(),
            &OptimizerConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.candidates[0].batch_id, "b-expiring");
        assert_eq!(plan.candidates[0].risk, RiskClass::HighExpiryRisk);
    }

    #[test]
    fn test_risk_classes() {
        let thresholds = RiskThresholds::default();
        let avg = Some(UnitCost::from_cents(1_000));
        assert_eq!(
            classify_risk(&batch("x", 1, 5_000, 1, Some(10)), now(), avg, &thresholds),
            RiskClass::HighExpiryRisk
        );
        assert_eq!(
            classify_risk(&batch("x", 1, 1_000, 1, Some(60)), now(), avg, &thresholds),
            RiskClass::MediumExpiryRisk
        );
        assert_eq!(
            classify_risk(&batch("x", 1, 1_101, 1, None), now(), avg, &thresholds),
            RiskClass::HighCost
        );
        assert_eq!(
            classify_risk(&batch("x", 1, 1_100, 1, None), now(), avg, &thresholds),
            RiskClass::LowRisk
        );
        // Already expired
        assert_eq!(
            classify_risk(&batch("x", 1, 1_000, 1, Some(-3)), now(), avg, &thresholds),
            RiskClass::HighExpiryRisk
        );
    }

    #[test]
    fn test_partial_candidates_flagged_and_shortfall() {
        let plan = optimal_allocation(&request(40, AllocationStrategy::Balanced), &pool(), &OptimizerConfig::default())
            .unwrap();
        let old = plan.candidates.iter().find(|c| c.batch_id == "b-old").unwrap();
        assert!(!old.can_fulfill);
        assert!(plan.shortfall.is_none());

        let plan = optimal_allocation(&request(500, AllocationStrategy::Balanced), &pool(), &OptimizerConfig::default())
            .unwrap();
        assert_eq!(plan.shortfall, Some(Shortfall { requested: 500, available: 100 }));
        assert_eq!(plan.candidates.len(), 3);
    }

    #[test]
    fn test_location_filter_and_empty_pool() {
        let mut batches = pool();
        batches[1].location_id = "wh-2".into();
        let mut req = request(5, AllocationStrategy::Balanced);
        req.location_id = Some("wh-2".into());
        let plan = optimal_allocation(&req, &batches, &OptimizerConfig::default()).unwrap();
        assert_eq!(plan.candidates.len(), 1);

        req.location_id = Some("wh-9".into());
        let plan = optimal_allocation(&req, &batches, &OptimizerConfig::default()).unwrap();
        assert!(plan.candidates.is_empty());
        assert_eq!(plan.shortfall, Some(Shortfall { requested: 5, available: 0 }));
    }

    #[test]
    fn test_equal_scores_break_by_receipt() {
        let batches = vec![batch("b-new", 10, 1_000, 1, None), batch("b-older", 10, 1_000, 5, None)];
        let plan = optimal_allocation(&request(5, AllocationStrategy::Balanced), &batches, &OptimizerConfig::default())
            .unwrap();
        assert_eq!(plan.candidates[0].batch_id, "b-older");
    }

    #[test]
    fn test_config_validation() {
        assert!(OptimizerConfig::default().scoring.validate().is_ok());
        let mut scoring = ScoringConfig::default();
        scoring.balanced = StrategyWeights::new(0.0, 0.0, 0.0);
        assert!(scoring.validate().is_err());
        let risk = RiskThresholds {
            high_expiry_days: 90,
            medium_expiry_days: 30,
            ..Default::default()
        };
        assert!(risk.validate().is_err());
    }
}
