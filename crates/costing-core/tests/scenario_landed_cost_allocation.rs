use chrono::{TimeZone, Utc};
use costing_core::landed_cost::allocate;
use costing_core::ledger::{BatchLedger, NewBatch};
use costing_core::*;

fn ledger_with(batches: &[(&str, i64, i64)]) -> BatchLedger {
    let at = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
    let mut ledger = BatchLedger::new();
    for (id, qty, cents) in batches {
        ledger
            .receive(NewBatch {
                id: Some(id.to_string()),
                product_id: format!("SKU-{id}"),
                location_id: "WH-1".into(),
                supplier_id: "SUP-1".into(),
                purchase_order_id: Some("PO-1".into()),
                quantity: *qty,
                unit_price: UnitCost::from_cents(*cents),
                weight_grams: Some(*qty * 250),
                declared_value: None,
                received_at: at,
                expiry_at: None,
                quality_grade: QualityGrade::Ungraded,
            })
            .unwrap();
    }
    ledger
}

fn cost_set(id: &str, costs: SharedCosts, basis: AllocationBasis) -> PurchaseOrderCostSet {
    PurchaseOrderCostSet {
        id: id.into(),
        purchase_order_id: "PO-1".into(),
        costs,
        basis,
        total_order_value: Money::from_cents(500_000),
        currency: "USD".into(),
        exchange_rate: ExchangeRate::PAR,
        supersedes: None,
        created_at: Utc.with_ymd_and_hms(2026, 4, 2, 0, 0, 0).unwrap(),
    }
}

#[test]
fn scenario_freight_by_quantity_sixty_forty() {
    let mut ledger = ledger_with(&[("A", 60, 1_000), ("B", 40, 1_000)]);
    let set = cost_set(
        "CS-1",
        SharedCosts {
            freight: Money::from_cents(100_000),
            ..Default::default()
        },
        AllocationBasis::ByQuantity,
    );

    let result = allocate(&set, &ledger.purchase_order_batches("PO-1"), set.created_at).unwrap();
    assert_eq!(result.line_for("A").unwrap().allocated_total().cents(), 60_000);
    assert_eq!(result.line_for("B").unwrap().allocated_total().cents(), 40_000);

    ledger.apply_allocation(result).unwrap();
    assert_eq!(ledger.get("A").unwrap().landed_cost_per_unit, UnitCost::from_cents(2_000));
}

#[test]
fn scenario_no_currency_leakage_across_bases() {
    let costs = SharedCosts {
        freight: Money::from_cents(100_001),
        insurance: Money::from_cents(3_337),
        duty: Money::from_cents(12_345),
        handling: Money::from_cents(999),
        other: Money::from_cents(1),
    };
    for basis in [AllocationBasis::ByValue, AllocationBasis::ByWeight, AllocationBasis::ByQuantity] {
        let ledger = ledger_with(&[("A", 7, 333), ("B", 13, 1_999), ("C", 3, 50), ("D", 1, 99_999)]);
        let set = cost_set("CS-1", costs, basis);
        let result = allocate(&set, &ledger.purchase_order_batches("PO-1"), set.created_at).unwrap();

        let sum: Money = result.lines.iter().map(|l| l.allocated_total()).sum();
        assert_eq!(sum, costs.total(), "{basis}");
        for component in CostComponent::ALL {
            let per_component: Money = result.lines.iter().map(|l| l.allocated.get(component)).sum();
            assert_eq!(per_component, costs.get(component), "{basis} {component}");
        }
    }
}

#[test]
fn scenario_second_application_changes_nothing() {
    let mut ledger = ledger_with(&[("A", 60, 1_000), ("B", 40, 1_000)]);
    let set = cost_set(
        "CS-1",
        SharedCosts {
            duty: Money::from_cents(5_000),
            ..Default::default()
        },
        AllocationBasis::ByValue,
    );

    let first = allocate(&set, &ledger.purchase_order_batches("PO-1"), set.created_at).unwrap();
    ledger.apply_allocation(first.clone()).unwrap();
    let landed_after_first: Vec<_> = ledger.batches().map(|b| b.landed_cost_per_unit).collect();

    let again = allocate(&set, &ledger.purchase_order_batches("PO-1"), set.created_at).unwrap();
    let err = ledger.apply_allocation(again).unwrap_err();
    assert!(matches!(err, CoreError::AlreadyAllocated { ref result_id, .. } if *result_id == first.id));

    let landed_after_second: Vec<_> = ledger.batches().map(|b| b.landed_cost_per_unit).collect();
    assert_eq!(landed_after_first, landed_after_second);
}

#[test]
fn scenario_correction_replaces_rather_than_stacks() {
    let mut ledger = ledger_with(&[("A", 10, 1_000)]);
    let original = cost_set(
        "CS-1",
        SharedCosts {
            freight: Money::from_cents(10_000),
            ..Default::default()
        },
        AllocationBasis::ByQuantity,
    );
    let first = allocate(&original, &ledger.purchase_order_batches("PO-1"), original.created_at).unwrap();
    ledger.apply_allocation(first.clone()).unwrap();

    let mut corrected = cost_set(
        "CS-2",
        SharedCosts {
            freight: Money::from_cents(5_000),
            ..Default::default()
        },
        AllocationBasis::ByQuantity,
    );
    corrected.supersedes = Some("CS-1".into());
    let second = costing_core::landed_cost::supersede(
        &first,
        &corrected,
        &ledger.purchase_order_batches("PO-1"),
        corrected.created_at,
    )
    .unwrap();
    ledger.apply_allocation(second).unwrap();

    // 10.00 base + 5.00 freight, not 10.00 + 10.00 + 5.00
    assert_eq!(ledger.get("A").unwrap().landed_cost_per_unit, UnitCost::from_cents(1_500));
    assert_eq!(ledger.allocations().len(), 2);
}
