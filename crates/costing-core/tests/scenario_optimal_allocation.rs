use chrono::{Duration, TimeZone, Utc};
use costing_core::ledger::{BatchLedger, NewBatch};
use costing_core::optimizer::*;
use costing_core::*;

fn ledger() -> BatchLedger {
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let mut ledger = BatchLedger::new();
    let lots = [
        ("L-1", 40, 900, 0, Some(400)),
        ("L-2", 25, 1_300, 10, Some(70)),
        ("L-3", 60, 1_000, 20, None),
        ("L-4", 15, 1_050, 30, Some(45)),
    ];
    for (id, qty, cents, day, expiry) in lots {
        ledger
            .receive(NewBatch {
                id: Some(id.to_string()),
                product_id: "SKU-9".into(),
                location_id: "WH-1".into(),
                supplier_id: "SUP-1".into(),
                purchase_order_id: None,
                quantity: qty,
                unit_price: UnitCost::from_cents(cents),
                weight_grams: None,
                declared_value: None,
                received_at: t0 + Duration::days(day),
                expiry_at: expiry.map(|d| t0 + Duration::days(d)),
                quality_grade: QualityGrade::B,
            })
            .unwrap();
    }
    ledger
}

fn request(quantity: i64, strategy: AllocationStrategy) -> AllocationRequest {
    AllocationRequest {
        product_id: "SKU-9".into(),
        location_id: Some("WH-1".into()),
        quantity,
        strategy,
        as_of: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
    }
}

#[test]
fn scenario_every_strategy_sorted_by_score() {
    let batches = ledger().product_batches("SKU-9", None);
    let config = OptimizerConfig::default();
    for strategy in [
        AllocationStrategy::CostOptimization,
        AllocationStrategy::ExpiryManagement,
        AllocationStrategy::Balanced,
        AllocationStrategy::FifoStrict,
    ] {
        let plan = optimal_allocation(&request(30, strategy), &batches, &config).unwrap();
        assert_eq!(plan.candidates.len(), 4);
        assert!(plan.candidates.windows(2).all(|w| w[0].score >= w[1].score), "{strategy}");
    }
}

#[test]
fn scenario_fifo_strict_is_receipt_order() {
    let batches = ledger().product_batches("SKU-9", None);
    let plan = optimal_allocation(&request(30, AllocationStrategy::FifoStrict), &batches, &OptimizerConfig::default())
        .unwrap();
    let order: Vec<_> = plan.candidates.iter().map(|c| c.batch_id.as_str()).collect();
    assert_eq!(order, vec!["L-1", "L-2", "L-3", "L-4"]);
}

#[test]
fn scenario_zero_quantity_fails_validation() {
    let batches = ledger().product_batches("SKU-9", None);
    let err = optimal_allocation(&request(0, AllocationStrategy::Balanced), &batches, &OptimizerConfig::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[test]
fn scenario_risk_classes_in_priority_order() {
    let batches = ledger().product_batches("SKU-9", None);
    let plan = optimal_allocation(&request(10, AllocationStrategy::Balanced), &batches, &OptimizerConfig::default())
        .unwrap();
    let risk = |id: &str| plan.candidates.iter().find(|c| c.batch_id == id).unwrap().risk;

    // 13.00 is well above average but L-2 expires in 39 days: expiry wins
    assert_eq!(risk("L-2"), RiskClass::MediumExpiryRisk);
    assert_eq!(risk("L-4"), RiskClass::HighExpiryRisk);
    assert_eq!(risk("L-1"), RiskClass::LowRisk);
    assert_eq!(risk("L-3"), RiskClass::LowRisk);
}

#[test]
fn scenario_shortfall_reported_not_raised() {
    let batches = ledger().product_batches("SKU-9", None);
    let plan = optimal_allocation(&request(1_000, AllocationStrategy::Balanced), &batches, &OptimizerConfig::default())
        .unwrap();
    assert_eq!(plan.total_available, 140);
    assert_eq!(plan.shortfall, Some(Shortfall { requested: 1_000, available: 140 }));
    assert!(plan.candidates.iter().all(|c| !c.can_fulfill));
}
