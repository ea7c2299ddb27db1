//! # Batch Repository
//!
//! Goods receipt and batch queries.
//!
//! Stored landed columns are read back as written, never recomputed, so a
//! damaged row is caught by `check_batch_invariants` instead of being masked.

use chrono::{DateTime, Utc};
use costing_core::ledger::NewBatch;
use costing_core::{Batch, LandedCostBreakdown, Money, QualityGrade, UnitCost};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// Prefixes `$tail` with the full batch column list.
macro_rules! select_batches {
    ($tail:literal) => {
        concat!(
            "SELECT id, product_id, location_id, supplier_id, purchase_order_id, ",
            "received_quantity, available_quantity, unit_price_micros, ",
            "freight_micros, insurance_micros, duty_micros, handling_micros, other_micros, ",
            "landed_cost_micros, weight_grams, declared_value_cents, ",
            "received_at, expiry_at, quality_grade ",
            "FROM batches ",
            $tail
        )
    };
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: String,
    product_id: String,
    location_id: String,
    supplier_id: String,
    purchase_order_id: Option<String>,
    received_quantity: i64,
    available_quantity: i64,
    unit_price_micros: i64,
    freight_micros: i64,
    insurance_micros: i64,
    duty_micros: i64,
    handling_micros: i64,
    other_micros: i64,
    landed_cost_micros: i64,
    weight_grams: Option<i64>,
    declared_value_cents: Option<i64>,
    received_at: DateTime<Utc>,
    expiry_at: Option<DateTime<Utc>>,
    quality_grade: QualityGrade,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            id: row.id,
            product_id: row.product_id,
            location_id: row.location_id,
            supplier_id: row.supplier_id,
            purchase_order_id: row.purchase_order_id,
            received_quantity: row.received_quantity,
            available_quantity: row.available_quantity,
            unit_price: UnitCost::from_micros(row.unit_price_micros),
            landed: LandedCostBreakdown {
                freight: UnitCost::from_micros(row.freight_micros),
                insurance: UnitCost::from_micros(row.insurance_micros),
                duty: UnitCost::from_micros(row.duty_micros),
                handling: UnitCost::from_micros(row.handling_micros),
                other: UnitCost::from_micros(row.other_micros),
            },
            landed_cost_per_unit: UnitCost::from_micros(row.landed_cost_micros),
            weight_grams: row.weight_grams,
            declared_value: row.declared_value_cents.map(Money::from_cents),
            received_at: row.received_at,
            expiry_at: row.expiry_at,
            quality_grade: row.quality_grade,
        }
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Reads one batch on the given connection (usually an open transaction).
pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Batch>> {
    let row = sqlx::query_as::<_, BatchRow>(select_batches!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Batch::from))
}

/// Reads every batch of a purchase order, ordered by id.
pub(crate) async fn fetch_for_purchase_order(
    conn: &mut SqliteConnection,
    purchase_order_id: &str,
) -> DbResult<Vec<Batch>> {
    let rows = sqlx::query_as::<_, BatchRow>(select_batches!(
        "WHERE purchase_order_id = ?1 ORDER BY id"
    ))
    .bind(purchase_order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Batch::from).collect())
}

/// Writes a new landed breakdown for a batch.
pub(crate) async fn update_landed(conn: &mut SqliteConnection, batch: &Batch) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE batches SET
            freight_micros = ?1,
            insurance_micros = ?2,
            duty_micros = ?3,
            handling_micros = ?4,
            other_micros = ?5,
            landed_cost_micros = ?6,
            updated_at = ?7
        WHERE id = ?8 AND unit_price_micros = ?9
        "#,
    )
    .bind(batch.landed.freight.micros())
    .bind(batch.landed.insurance.micros())
    .bind(batch.landed.duty.micros())
    .bind(batch.landed.handling.micros())
    .bind(batch.landed.other.micros())
    .bind(batch.landed_cost_per_unit.micros())
    .bind(Utc::now())
    .bind(&batch.id)
    .bind(batch.unit_price.micros())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Batch", &batch.id));
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for batch database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = BatchRepository::new(pool);
/// let batch = repo.receive(new_batch).await?;
/// let on_hand = repo.list_by_product("p-1", Some("wh-1")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    /// Creates a new BatchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    /// Records a goods receipt.
    ///
    /// The batch starts fully available with its landed cost equal to the
    /// base price.
    pub async fn receive(&self, new_batch: NewBatch) -> DbResult<Batch> {
        let batch = new_batch.into_batch()?;
        let now = Utc::now();

        debug!(id = %batch.id, product_id = %batch.product_id, "Inserting batch");

        sqlx::query(
            r#"
            INSERT INTO batches (
                id, product_id, location_id, supplier_id, purchase_order_id,
                received_quantity, available_quantity, unit_price_micros,
                freight_micros, insurance_micros, duty_micros, handling_micros, other_micros,
                landed_cost_micros, weight_grams, declared_value_cents,
                received_at, expiry_at, quality_grade, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, 0, 0, 0, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.product_id)
        .bind(&batch.location_id)
        .bind(&batch.supplier_id)
        .bind(&batch.purchase_order_id)
        .bind(batch.received_quantity)
        .bind(batch.available_quantity)
        .bind(batch.unit_price.micros())
        .bind(batch.landed_cost_per_unit.micros())
        .bind(batch.weight_grams)
        .bind(batch.declared_value.map(|v| v.cents()))
        .bind(batch.received_at)
        .bind(batch.expiry_at)
        .bind(batch.quality_grade)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("batch id", &batch.id),
            other => other,
        })?;

        info!(
            id = %batch.id,
            product_id = %batch.product_id,
            quantity = batch.received_quantity,
            "Batch received"
        );
        Ok(batch)
    }

    /// Gets a batch by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Batch>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Lists the batches of a product, optionally at one location, in
    /// receipt order.
    pub async fn list_by_product(
        &self,
        product_id: &str,
        location_id: Option<&str>,
    ) -> DbResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(select_batches!(
            "WHERE product_id = ?1 AND (?2 IS NULL OR location_id = ?2) ORDER BY received_at, id"
        ))
        .bind(product_id)
        .bind(location_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(product_id = %product_id, count = rows.len(), "Listed product batches");
        Ok(rows.into_iter().map(Batch::from).collect())
    }

    /// Lists the batches received against a purchase order, ordered by id.
    pub async fn list_by_purchase_order(&self, purchase_order_id: &str) -> DbResult<Vec<Batch>> {
        let mut conn = self.pool.acquire().await?;
        fetch_for_purchase_order(&mut conn, purchase_order_id).await
    }

    /// Lists batches received on or after `date_from` (all when `None`).
    pub async fn list_received_since(
        &self,
        date_from: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(select_batches!(
            "WHERE (?1 IS NULL OR received_at >= ?1) ORDER BY received_at, id"
        ))
        .bind(date_from)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Batch::from).collect())
    }

    /// Counts stored batches.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batches")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
