//! # Cost Reports
//!
//! Batch costing details and the grouped cost analysis report.
//!
//! ```text
//! cost_overhead_percentage = (landed − base) / base × 100
//! freight_percentage       = freight per unit / base × 100   (same for the
//!                            other four components)
//!
//! base price 0 → every percentage is null
//! ```

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, UnitCost};
use crate::types::{Batch, CostComponent};

// =============================================================================
// Batch Details
// =============================================================================

/// A batch with its derived cost percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchCostingDetails {
    pub batch: Batch,
    pub on_hand_value: Money,
    pub cost_overhead_percentage: Option<f64>,
    pub freight_percentage: Option<f64>,
    pub insurance_percentage: Option<f64>,
    pub duty_percentage: Option<f64>,
    pub handling_percentage: Option<f64>,
    pub other_percentage: Option<f64>,
}

fn relative_to_base(part: UnitCost, base: UnitCost) -> Option<f64> {
    if base.is_zero() {
        return None;
    }
    Some(part.micros() as f64 / base.micros() as f64 * 100.0)
}

/// Derives the cost percentages of a batch.
pub fn batch_details(batch: &Batch) -> BatchCostingDetails {
    let base = batch.unit_price;
    let component = |c: CostComponent| relative_to_base(batch.landed.get(c), base);

    BatchCostingDetails {
        on_hand_value: batch.on_hand_value(),
        cost_overhead_percentage: relative_to_base(batch.overhead_per_unit(), base),
        freight_percentage: component(CostComponent::Freight),
        insurance_percentage: component(CostComponent::Insurance),
        duty_percentage: component(CostComponent::Duty),
        handling_percentage: component(CostComponent::Handling),
        other_percentage: component(CostComponent::Other),
        batch: batch.clone(),
    }
}

// =============================================================================
// Grouping
// =============================================================================

/// Dimension the cost analysis report is broken down by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    Product,
    Location,
    Supplier,
    QualityGrade,
    ReceiptMonth,
}

impl GroupBy {
    /// Group key of a batch.
    pub fn key(&self, batch: &Batch) -> String {
        match self {
            GroupBy::Product => batch.product_id.clone(),
            GroupBy::Location => batch.location_id.clone(),
            GroupBy::Supplier => batch.supplier_id.clone(),
            GroupBy::QualityGrade => batch.quality_grade.to_string(),
            GroupBy::ReceiptMonth => format!(
                "{:04}-{:02}",
                batch.received_at.year(),
                batch.received_at.month()
            ),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::Product => write!(f, "product"),
            GroupBy::Location => write!(f, "location"),
            GroupBy::Supplier => write!(f, "supplier"),
            GroupBy::QualityGrade => write!(f, "quality_grade"),
            GroupBy::ReceiptMonth => write!(f, "receipt_month"),
        }
    }
}

impl FromStr for GroupBy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" => Ok(GroupBy::Product),
            "location" => Ok(GroupBy::Location),
            "supplier" => Ok(GroupBy::Supplier),
            "quality_grade" | "grade" => Ok(GroupBy::QualityGrade),
            "receipt_month" | "month" => Ok(GroupBy::ReceiptMonth),
            _ => Err(ValidationError::NotAllowed {
                field: "group_by".to_string(),
                allowed: vec![
                    "product".into(),
                    "location".into(),
                    "supplier".into(),
                    "quality_grade".into(),
                    "receipt_month".into(),
                ],
            }),
        }
    }
}

// =============================================================================
// Cost Analysis Report
// =============================================================================

/// Aggregate cost figures over a set of batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostSummary {
    pub total_batches: i64,
    /// Σ available × landed cost.
    pub total_inventory_value: Money,
    /// Mean landed cost per unit across batches.
    pub avg_landed_cost: UnitCost,
    /// Mean overhead percentage over batches with a non-zero base price.
    pub avg_cost_overhead: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GroupBreakdown {
    pub key: String,
    pub summary: CostSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostAnalysisReport {
    pub group_by: GroupBy,
    #[ts(as = "Option<String>")]
    pub date_from: Option<DateTime<Utc>>,
    pub summary: CostSummary,
    /// Ordered by key.
    pub groups: Vec<GroupBreakdown>,
}

fn summarize(batches: &[&Batch]) -> CostSummary {
    let count = batches.len() as i64;
    let total_inventory_value = batches.iter().map(|b| b.on_hand_value()).sum();
    let avg_landed_cost = UnitCost::weighted_mean(batches.iter().map(|b| (1, b.landed_cost_per_unit)))
        .unwrap_or_default();

    let overheads: Vec<f64> = batches
        .iter()
        .filter_map(|b| relative_to_base(b.overhead_per_unit(), b.unit_price))
        .collect();
    let avg_cost_overhead =
        (!overheads.is_empty()).then(|| overheads.iter().sum::<f64>() / overheads.len() as f64);

    CostSummary {
        total_batches: count,
        total_inventory_value,
        avg_landed_cost,
        avg_cost_overhead,
    }
}

/// Builds the cost analysis report over batches received on or after
/// `date_from`.
pub fn cost_analysis(
    batches: &[Batch],
    group_by: GroupBy,
    date_from: Option<DateTime<Utc>>,
) -> CostAnalysisReport {
    let selected: Vec<&Batch> = batches
        .iter()
        .filter(|b| date_from.map_or(true, |from| b.received_at >= from))
        .collect();

    let mut grouped: BTreeMap<String, Vec<&Batch>> = BTreeMap::new();
    for batch in &selected {
        grouped.entry(group_by.key(batch)).or_default().push(batch);
    }

    CostAnalysisReport {
        group_by,
        date_from,
        summary: summarize(&selected),
        groups: grouped
            .into_iter()
            .map(|(key, members)| GroupBreakdown {
                key,
                summary: summarize(&members),
            })
            .collect(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LandedCostBreakdown, QualityGrade};
    use chrono::TimeZone;

    fn batch(id: &str, product: &str, month: u32, base_cents: i64, freight_cents: i64) -> Batch {
        let mut b = Batch {
            id: id.into(),
            product_id: product.into(),
            location_id: "wh-1".into(),
            supplier_id: "sup-1".into(),
            purchase_order_id: None,
            received_quantity: 10,
            available_quantity: 10,
            unit_price: UnitCost::from_cents(base_cents),
            landed: LandedCostBreakdown::default(),
            landed_cost_per_unit: UnitCost::from_cents(base_cents),
            weight_grams: None,
            declared_value: None,
            received_at: Utc.with_ymd_and_hms(2026, month, 15, 0, 0, 0).unwrap(),
            expiry_at: None,
            quality_grade: QualityGrade::A,
        };
        b.set_landed(LandedCostBreakdown {
            freight: UnitCost::from_cents(freight_cents),
            ..Default::default()
        });
        b
    }

    #[test]
    fn test_batch_details_percentages() {
        let details = batch_details(&batch("b-1", "p-1", 1, 1_000, 150));
        assert_eq!(details.cost_overhead_percentage, Some(15.0));
        assert_eq!(details.freight_percentage, Some(15.0));
        assert_eq!(details.duty_percentage, Some(0.0));
        assert_eq!(details.on_hand_value.cents(), 11_500);
    }

    #[test]
    fn test_zero_base_price_has_no_percentages() {
        let details = batch_details(&batch("b-1", "p-1", 1, 0, 150));
        assert_eq!(details.cost_overhead_percentage, None);
        assert_eq!(details.freight_percentage, None);
    }

    #[test]
    fn test_report_groups_and_summary() {
        let batches = vec![
            batch("b-1", "p-2", 1, 1_000, 100),
            batch("b-2", "p-1", 2, 2_000, 0),
            batch("b-3", "p-1", 3, 0, 50),
        ];
        let report = cost_analysis(&batches, GroupBy::Product, None);
        assert_eq!(report.summary.total_batches, 3);
        // 10 × 11.00 + 10 × 20.00 + 10 × 0.50
        assert_eq!(report.summary.total_inventory_value.cents(), 31_500);
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups[0].key, "p-1");
        // b-3 has no base price, so only b-2 contributes overhead
        assert_eq!(report.groups[0].summary.avg_cost_overhead, Some(0.0));
    }

    #[test]
    fn test_report_date_filter_and_month_keys() {
        let batches = vec![batch("b-1", "p-1", 1, 1_000, 0), batch("b-2", "p-1", 4, 1_000, 0)];
        let from = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let report = cost_analysis(&batches, GroupBy::ReceiptMonth, Some(from));
        assert_eq!(report.summary.total_batches, 1);
        assert_eq!(report.groups[0].key, "2026-04");
    }

    #[test]
    fn test_empty_report() {
        let report = cost_analysis(&[], GroupBy::Supplier, None);
        assert_eq!(report.summary.total_batches, 0);
        assert!(report.summary.avg_cost_overhead.is_none());
        assert!(report.groups.is_empty());
    }
}
