//! # Seed Data Generator
//!
//! Populates the database with purchase orders, received batches, allocated
//! landed costs and some consumption history for development.
//!
//! ## Usage
//! ```bash
//! # Generate 20 purchase orders (default)
//! cargo run -p costing-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p costing-db --bin seed -- --orders 100
//!
//! # Specify database path
//! cargo run -p costing-db --bin seed -- --db ./data/costing.db
//! ```
//!
//! ## Generated Data
//! - Products from a small coffee catalog, at two warehouses
//! - 2-4 batches per purchase order with weights, grades and expiry dates
//! - One cost set per order (freight, insurance, duty, handling), rotating
//!   through the three allocation bases and two currencies
//! - Sales and scrap against older batches so turnover has history

use chrono::{Duration, TimeZone, Utc};
use costing_core::landed_cost::allocate;
use costing_core::ledger::NewBatch;
use costing_core::valuation::StandardCost;
use costing_core::{
    AllocationBasis, ConsumptionKind, ExchangeRate, Money, PurchaseOrderCostSet, QualityGrade,
    SharedCosts, UnitCost,
};
use costing_db::{Database, DbConfig};
use serde::Serialize;
use std::env;

/// (product id, base price in cents, shelf life in days)
const PRODUCTS: &[(&str, i64, i64)] = &[
    ("ETH-YIRGACHEFFE", 1_250, 365),
    ("COL-HUILA", 980, 365),
    ("BRA-CERRADO", 740, 300),
    ("KEN-AA", 1_410, 240),
    ("GUA-ANTIGUA", 1_060, 270),
    ("SUM-MANDHELING", 1_120, 180),
];

const LOCATIONS: &[&str] = &["WH-NORTH", "WH-SOUTH"];
const SUPPLIERS: &[&str] = &["SUP-IMPORTA", "SUP-VERDE", "SUP-ALTURA"];
const GRADES: &[QualityGrade] = &[QualityGrade::A, QualityGrade::B, QualityGrade::A, QualityGrade::C];

#[derive(Debug, Default, Serialize)]
struct SeedSummary {
    purchase_orders: usize,
    batches: usize,
    allocations: usize,
    consumptions: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut orders: usize = 20;
    let mut db_path = String::from("./costing_dev.db");
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--orders" | "-o" => {
                if i + 1 < args.len() {
                    orders = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--json" => json = true,
            "--help" | "-h" => {
                println!("Costing Engine Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -o, --orders <N>   Number of purchase orders to generate (default: 20)");
                println!("  -d, --db <PATH>    Database file path (default: ./costing_dev.db)");
                println!("      --json         Print the summary as JSON");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Costing Engine Seed Data Generator");
    println!("=====================================");
    println!("Database: {}", db_path);
    println!("Purchase orders: {}", orders);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.batches().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} batches", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let epoch = Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).single().ok_or("bad epoch")?;
    let mut summary = SeedSummary::default();

    for (product_id, base_cents, _) in PRODUCTS {
        db.standard_costs()
            .set(&StandardCost {
                product_id: product_id.to_string(),
                unit_cost: UnitCost::from_cents(base_cents + base_cents / 10),
                effective_from: epoch,
            })
            .await?;
    }

    println!();
    println!("Generating purchase orders...");

    for order in 0..orders {
        let po = format!("PO-{:05}", order + 1);
        let received_at = epoch + Duration::days(order as i64 * 9);
        let lines = 2 + order % 3;

        for line in 0..lines {
            let seed = order * 7 + line * 3;
            let (product_id, base_cents, shelf_life) = PRODUCTS[seed % PRODUCTS.len()];
            let quantity = 40 + ((seed * 37) % 160) as i64;
            let price_drift = ((seed * 13) % 120) as i64 - 60;

            let batch = NewBatch {
                id: Some(format!("{}-L{}", po, line + 1)),
                product_id: product_id.to_string(),
                location_id: LOCATIONS[order % LOCATIONS.len()].to_string(),
                supplier_id: SUPPLIERS[order % SUPPLIERS.len()].to_string(),
                purchase_order_id: Some(po.clone()),
                quantity,
                unit_price: UnitCost::from_cents(base_cents + price_drift),
                weight_grams: Some(quantity * 1_000),
                declared_value: None,
                received_at,
                expiry_at: Some(received_at + Duration::days(shelf_life)),
                quality_grade: GRADES[seed % GRADES.len()],
            };

            if let Err(e) = db.batches().receive(batch).await {
                eprintln!("Failed to receive batch for {}: {}", po, e);
                continue;
            }
            summary.batches += 1;
        }

        let (basis, currency, rate) = match order % 3 {
            0 => (AllocationBasis::ByValue, "USD", ExchangeRate::PAR),
            1 => (AllocationBasis::ByWeight, "EUR", ExchangeRate::from_micros(1_080_000)),
            _ => (AllocationBasis::ByQuantity, "USD", ExchangeRate::PAR),
        };
        let cost_set = PurchaseOrderCostSet {
            id: format!("CS-{:05}", order + 1),
            purchase_order_id: po.clone(),
            costs: SharedCosts {
                freight: Money::from_cents(35_000 + (order as i64 % 5) * 4_500),
                insurance: Money::from_cents(4_200),
                duty: Money::from_cents(12_750 + (order as i64 % 4) * 1_000),
                handling: Money::from_cents(6_000),
                other: Money::zero(),
            },
            basis,
            total_order_value: Money::from_cents(500_000),
            currency: currency.to_string(),
            exchange_rate: rate,
            supersedes: None,
            created_at: received_at,
        };
        db.cost_sets().create(&cost_set).await?;

        let batches = db.batches().list_by_purchase_order(&po).await?;
        let result = allocate(&cost_set, &batches, received_at)?;
        db.allocations().apply(&result).await?;
        summary.allocations += 1;
        summary.purchase_orders += 1;

        // Older orders have been partly sold through
        for (idx, batch) in batches.iter().enumerate() {
            let sold = batch.received_quantity * (orders - order) as i64 / (orders as i64 * 2);
            if sold > 0 {
                db.consumptions()
                    .consume(&batch.id, sold, ConsumptionKind::Sale, received_at + Duration::days(5))
                    .await?;
                summary.consumptions += 1;
            }
            if idx == 0 && order % 4 == 0 && batch.received_quantity - sold > 2 {
                db.consumptions()
                    .consume(&batch.id, 2, ConsumptionKind::Scrap, received_at + Duration::days(6))
                    .await?;
                summary.consumptions += 1;
            }
        }

        if (order + 1) % 10 == 0 {
            println!("  Generated {} purchase orders...", order + 1);
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!(
        "✓ Generated {} orders, {} batches, {} allocations, {} movements in {:?}",
        summary.purchase_orders, summary.batches, summary.allocations, summary.consumptions, elapsed
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
