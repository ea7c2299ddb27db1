//! # Consumption Repository
//!
//! Outbound movements and returns against batches.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  consume(b-1, 5, sale)                                                 │
//! │                                                                         │
//! │  BEGIN IMMEDIATE                                                       │
//! │    SELECT batch ──► plan_consumption (validation, invariants, stock)   │
//! │    UPDATE batches SET available = available - 5                        │
//! │           WHERE id = 'b-1' AND available >= 5     ◄── guard           │
//! │    0 rows? another writer took the stock → InsufficientStock           │
//! │    INSERT consumption_records                                          │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  Two consumers racing for the last units: exactly one guard matches.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! History is append-only: a return is a new record whose `reverses` names
//! the original, and no record is ever updated or deleted.

use chrono::{DateTime, Utc};
use costing_core::ledger::{new_consumption_record, plan_consumption, plan_return};
use costing_core::{ConsumptionKind, ConsumptionRecord, CoreError};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::{batch, begin_write, ledger_error};
use crate::error::DbResult;

macro_rules! select_records {
    ($tail:literal) => {
        concat!(
            "SELECT id, batch_id, product_id, kind, quantity, reverses, occurred_at ",
            "FROM consumption_records ",
            $tail
        )
    };
}

#[derive(Debug, sqlx::FromRow)]
struct ConsumptionRow {
    id: String,
    batch_id: String,
    product_id: String,
    kind: ConsumptionKind,
    quantity: i64,
    reverses: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl From<ConsumptionRow> for ConsumptionRecord {
    fn from(row: ConsumptionRow) -> Self {
        ConsumptionRecord {
            id: row.id,
            batch_id: row.batch_id,
            product_id: row.product_id,
            kind: row.kind,
            quantity: row.quantity,
            reverses: row.reverses,
            occurred_at: row.occurred_at,
        }
    }
}

async fn insert_record(conn: &mut SqliteConnection, record: &ConsumptionRecord) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO consumption_records (
            id, batch_id, product_id, kind, quantity, reverses, occurred_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&record.id)
    .bind(&record.batch_id)
    .bind(&record.product_id)
    .bind(record.kind)
    .bind(record.quantity)
    .bind(&record.reverses)
    .bind(record.occurred_at)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Repository for consumption history.
#[derive(Debug, Clone)]
pub struct ConsumptionRepository {
    pool: SqlitePool,
}

impl ConsumptionRepository {
    /// Creates a new ConsumptionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ConsumptionRepository { pool }
    }

    /// Removes `quantity` units from a batch and appends the record.
    ///
    /// ## Errors
    /// - `Core(BatchNotFound)` for an unknown batch
    /// - `Core(Validation)` for a non-positive quantity or a `return` kind
    /// - `Core(InsufficientStock)` when the batch holds less than requested,
    ///   including when a concurrent consumer got there first
    /// - `Core(InconsistentLedgerState)` when the stored batch is broken
    pub async fn consume(
        &self,
        batch_id: &str,
        quantity: i64,
        kind: ConsumptionKind,
        occurred_at: DateTime<Utc>,
    ) -> DbResult<ConsumptionRecord> {
        let mut tx = begin_write(&self.pool).await?;

        let batch = batch::fetch(&mut tx, batch_id)
            .await?
            .ok_or_else(|| CoreError::BatchNotFound(batch_id.to_string()))?;
        let remaining = plan_consumption(&batch, quantity, kind).map_err(ledger_error)?;

        debug!(batch_id = %batch_id, quantity, remaining, "Decrementing batch");

        let result = sqlx::query(
            r#"
            UPDATE batches
            SET available_quantity = available_quantity - ?1, updated_at = ?2
            WHERE id = ?3 AND available_quantity >= ?1
            "#,
        )
        .bind(quantity)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(batch_id = %batch_id, quantity, "Guarded decrement matched no rows");
            return Err(CoreError::InsufficientStock {
                product_id: batch.product_id.clone(),
                available: batch.available_quantity,
                requested: quantity,
            }
            .into());
        }

        let record = new_consumption_record(&batch, kind, quantity, None, occurred_at);
        insert_record(&mut tx, &record).await?;
        tx.commit().await?;

        info!(
            id = %record.id,
            batch_id = %batch_id,
            kind = %kind,
            quantity,
            "Stock consumed"
        );
        Ok(record)
    }

    /// Returns `quantity` units of an earlier outbound record.
    ///
    /// ## Errors
    /// - `Core(ConsumptionNotFound)` for an unknown record
    /// - `Core(Validation)` when the quantity exceeds what is still
    ///   un-reversed, or the record is itself a return
    /// - `Core(InconsistentLedgerState)` when the return would lift available
    ///   above received
    pub async fn return_stock(
        &self,
        consumption_id: &str,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> DbResult<ConsumptionRecord> {
        let mut tx = begin_write(&self.pool).await?;

        let original = sqlx::query_as::<_, ConsumptionRow>(select_records!("WHERE id = ?1"))
            .bind(consumption_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(ConsumptionRecord::from)
            .ok_or_else(|| CoreError::ConsumptionNotFound(consumption_id.to_string()))?;

        let already_returned: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM consumption_records WHERE reverses = ?1",
        )
        .bind(consumption_id)
        .fetch_one(&mut *tx)
        .await?;

        let batch = batch::fetch(&mut tx, &original.batch_id)
            .await?
            .ok_or_else(|| CoreError::BatchNotFound(original.batch_id.clone()))?;
        plan_return(&batch, &original, already_returned, quantity).map_err(ledger_error)?;

        let result = sqlx::query(
            r#"
            UPDATE batches
            SET available_quantity = available_quantity + ?1, updated_at = ?2
            WHERE id = ?3 AND available_quantity + ?1 <= received_quantity
            "#,
        )
        .bind(quantity)
        .bind(Utc::now())
        .bind(&batch.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ledger_error(CoreError::inconsistent(
                &batch.id,
                "return would raise available quantity above received quantity",
            )));
        }

        let record = new_consumption_record(
            &batch,
            ConsumptionKind::Return,
            quantity,
            Some(original.id.clone()),
            occurred_at,
        );
        insert_record(&mut tx, &record).await?;
        tx.commit().await?;

        info!(
            id = %record.id,
            reverses = %original.id,
            batch_id = %batch.id,
            quantity,
            "Stock returned"
        );
        Ok(record)
    }

    /// Gets a consumption record by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ConsumptionRecord>> {
        let row = sqlx::query_as::<_, ConsumptionRow>(select_records!("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ConsumptionRecord::from))
    }

    /// Consumption history of a product in occurrence order, optionally
    /// limited to `[from, to]`.
    pub async fn history_for_product(
        &self,
        product_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<ConsumptionRecord>> {
        let rows = sqlx::query_as::<_, ConsumptionRow>(select_records!(
            "WHERE product_id = ?1 \
             AND (?2 IS NULL OR occurred_at >= ?2) \
             AND (?3 IS NULL OR occurred_at <= ?3) \
             ORDER BY occurred_at, id"
        ))
        .bind(product_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        debug!(product_id = %product_id, count = rows.len(), "Loaded consumption history");
        Ok(rows.into_iter().map(ConsumptionRecord::from).collect())
    }

    /// Records against one batch in occurrence order.
    pub async fn list_for_batch(&self, batch_id: &str) -> DbResult<Vec<ConsumptionRecord>> {
        let rows = sqlx::query_as::<_, ConsumptionRow>(select_records!(
            "WHERE batch_id = ?1 ORDER BY occurred_at, id"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ConsumptionRecord::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
