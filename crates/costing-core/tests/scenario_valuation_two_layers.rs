use chrono::{Duration, TimeZone, Utc};
use costing_core::ledger::{BatchLedger, NewBatch};
use costing_core::valuation::{value, ValuationMethod, ValuationRequest};
use costing_core::*;

fn receive(ledger: &mut BatchLedger, id: &str, qty: i64, cents: i64, day: i64) {
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    ledger
        .receive(NewBatch {
            id: Some(id.to_string()),
            product_id: "SKU-1".into(),
            location_id: "WH-1".into(),
            supplier_id: "SUP-1".into(),
            purchase_order_id: None,
            quantity: qty,
            unit_price: UnitCost::from_cents(cents),
            weight_grams: None,
            declared_value: None,
            received_at: t0 + Duration::days(day),
            expiry_at: None,
            quality_grade: QualityGrade::A,
        })
        .unwrap();
}

#[test]
fn scenario_weighted_average_of_two_layers() {
    let mut ledger = BatchLedger::new();
    receive(&mut ledger, "A", 100, 10_000, 0);
    receive(&mut ledger, "B", 50, 12_000, 1);

    let as_of = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    let batches = ledger.product_batches("SKU-1", None);
    let req = ValuationRequest::new("SKU-1", as_of, ValuationMethod::WeightedAvg);

    let first = value(&req, &batches).unwrap();
    // (100×100 + 50×120) / 150 = 106.67
    assert_eq!(first.unit_cost.to_money().cents(), 10_667);

    // Recomputing over an unchanged ledger is identical
    let second = value(&req, &ledger.product_batches("SKU-1", None)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn scenario_fifo_remaining_stock_splits_by_layer() {
    let mut ledger = BatchLedger::new();
    receive(&mut ledger, "A", 100, 10_000, 0);
    receive(&mut ledger, "B", 50, 12_000, 1);

    let as_of = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    let batches = ledger.product_batches("SKU-1", None);
    let snap = value(&ValuationRequest::new("SKU-1", as_of, ValuationMethod::Fifo), &batches).unwrap();

    assert_eq!(snap.total_value, Money::from_cents(1_600_000));
    let layers: Vec<_> = snap.layers.iter().map(|l| (l.batch_id.as_str(), l.value.cents())).collect();
    assert_eq!(layers, vec![("A", 1_000_000), ("B", 600_000)]);
}

#[test]
fn scenario_fifo_equals_lifo_for_uniform_cost() {
    let mut ledger = BatchLedger::new();
    receive(&mut ledger, "A", 30, 2_500, 0);
    receive(&mut ledger, "B", 70, 2_500, 3);
    receive(&mut ledger, "C", 10, 2_500, 9);
    ledger
        .consume("A", 12, ConsumptionKind::Sale, Utc.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap())
        .unwrap();

    let as_of = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    let batches = ledger.product_batches("SKU-1", None);
    for issue in [None, Some(1), Some(25), Some(98)] {
        let mut fifo = ValuationRequest::new("SKU-1", as_of, ValuationMethod::Fifo);
        fifo.issue_quantity = issue;
        let mut lifo = fifo.clone();
        lifo.method = ValuationMethod::Lifo;

        let f = value(&fifo, &batches).unwrap();
        let l = value(&lifo, &batches).unwrap();
        assert_eq!(f.unit_cost, l.unit_cost);
        assert_eq!(f.total_value, l.total_value);
    }
}
