//! # Allocation Repository
//!
//! Applies allocation results to the ledger and keeps them for audit.
//!
//! ## One Transaction per Application
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply(result)                                                         │
//! │                                                                         │
//! │  BEGIN IMMEDIATE                                                       │
//! │   1. UPDATE cost_sets SET allocation_result_id = result.id             │
//! │        WHERE id = result.cost_set_id                                   │
//! │          AND allocation_result_id IS NULL       ◄── claim, once only   │
//! │      0 rows → AlreadyAllocated (or unknown cost set)                   │
//! │   2. SELECT batches of the purchase order                              │
//! │      plan_allocation → new landed breakdown per batch                  │
//! │      a batch without a line (received since) → Validation, retry       │
//! │   3. UPDATE batches (one row per line)                                 │
//! │   4. INSERT allocation_results + allocation_lines                      │
//! │   5. correction? UPDATE prior SET superseded_by = result.id            │
//! │        WHERE superseded_by IS NULL               ◄── one successor    │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  Every batch of the order gets its share, or none does.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use costing_core::landed_cost::check_conservation;
use costing_core::ledger::plan_allocation;
use costing_core::{
    AllocationBasis, AllocationLine, AllocationResult, Batch, CoreError, LandedCostBreakdown,
    Money, SharedCosts, UnitCost, ValidationError,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{batch, begin_write, cost_set, ledger_error};
use crate::error::DbResult;

// =============================================================================
// Row Mapping
// =============================================================================

macro_rules! select_results {
    ($tail:literal) => {
        concat!(
            "SELECT id, cost_set_id, purchase_order_id, basis, total_allocated_cents, ",
            "supersedes, superseded_by, created_at ",
            "FROM allocation_results ",
            $tail
        )
    };
}

#[derive(Debug, sqlx::FromRow)]
struct ResultRow {
    id: String,
    cost_set_id: String,
    purchase_order_id: String,
    basis: AllocationBasis,
    total_allocated_cents: i64,
    supersedes: Option<String>,
    superseded_by: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    batch_id: String,
    share_weight: i64,
    share_fraction: f64,
    freight_cents: i64,
    insurance_cents: i64,
    duty_cents: i64,
    handling_cents: i64,
    other_cents: i64,
    freight_micros: i64,
    insurance_micros: i64,
    duty_micros: i64,
    handling_micros: i64,
    other_micros: i64,
    landed_cost_micros: i64,
}

impl From<LineRow> for AllocationLine {
    fn from(row: LineRow) -> Self {
        AllocationLine {
            batch_id: row.batch_id,
            share_weight: row.share_weight,
            share_fraction: row.share_fraction,
            allocated: SharedCosts {
                freight: Money::from_cents(row.freight_cents),
                insurance: Money::from_cents(row.insurance_cents),
                duty: Money::from_cents(row.duty_cents),
                handling: Money::from_cents(row.handling_cents),
                other: Money::from_cents(row.other_cents),
            },
            per_unit: LandedCostBreakdown {
                freight: UnitCost::from_micros(row.freight_micros),
                insurance: UnitCost::from_micros(row.insurance_micros),
                duty: UnitCost::from_micros(row.duty_micros),
                handling: UnitCost::from_micros(row.handling_micros),
                other: UnitCost::from_micros(row.other_micros),
            },
            landed_cost_per_unit: UnitCost::from_micros(row.landed_cost_micros),
        }
    }
}

/// An allocation result with its audit status.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAllocation {
    pub result: AllocationResult,
    /// The result that replaced this one, if it was corrected.
    pub superseded_by: Option<String>,
}

impl StoredAllocation {
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }
}

async fn load_lines(conn: &mut SqliteConnection, result_id: &str) -> DbResult<Vec<AllocationLine>> {
    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT batch_id, share_weight, share_fraction,
               freight_cents, insurance_cents, duty_cents, handling_cents, other_cents,
               freight_micros, insurance_micros, duty_micros, handling_micros, other_micros,
               landed_cost_micros
        FROM allocation_lines
        WHERE result_id = ?1
        ORDER BY batch_id
        "#,
    )
    .bind(result_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(AllocationLine::from).collect())
}

async fn hydrate(conn: &mut SqliteConnection, row: ResultRow) -> DbResult<StoredAllocation> {
    let lines = load_lines(conn, &row.id).await?;
    Ok(StoredAllocation {
        result: AllocationResult {
            id: row.id,
            cost_set_id: row.cost_set_id,
            purchase_order_id: row.purchase_order_id,
            basis: row.basis,
            lines,
            total_allocated: Money::from_cents(row.total_allocated_cents),
            supersedes: row.supersedes,
            created_at: row.created_at,
        },
        superseded_by: row.superseded_by,
    })
}

async fn insert_result(conn: &mut SqliteConnection, result: &AllocationResult) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO allocation_results (
            id, cost_set_id, purchase_order_id, basis, total_allocated_cents,
            supersedes, superseded_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)
        "#,
    )
    .bind(&result.id)
    .bind(&result.cost_set_id)
    .bind(&result.purchase_order_id)
    .bind(result.basis)
    .bind(result.total_allocated.cents())
    .bind(&result.supersedes)
    .bind(result.created_at)
    .execute(&mut *conn)
    .await?;

    for line in &result.lines {
        sqlx::query(
            r#"
            INSERT INTO allocation_lines (
                result_id, batch_id, share_weight, share_fraction,
                freight_cents, insurance_cents, duty_cents, handling_cents, other_cents,
                freight_micros, insurance_micros, duty_micros, handling_micros, other_micros,
                landed_cost_micros
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&result.id)
        .bind(&line.batch_id)
        .bind(line.share_weight)
        .bind(line.share_fraction)
        .bind(line.allocated.freight.cents())
        .bind(line.allocated.insurance.cents())
        .bind(line.allocated.duty.cents())
        .bind(line.allocated.handling.cents())
        .bind(line.allocated.other.cents())
        .bind(line.per_unit.freight.micros())
        .bind(line.per_unit.insurance.micros())
        .bind(line.per_unit.duty.micros())
        .bind(line.per_unit.handling.micros())
        .bind(line.per_unit.other.micros())
        .bind(line.landed_cost_per_unit.micros())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for allocation results.
#[derive(Debug, Clone)]
pub struct AllocationRepository {
    pool: SqlitePool,
}

impl AllocationRepository {
    /// Creates a new AllocationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AllocationRepository { pool }
    }

    /// Applies a computed result to its batches and stores it.
    ///
    /// Returns the batches as they stand after the update.
    ///
    /// ## Errors
    /// - `Core(AlreadyAllocated)` if the cost set already carries a result;
    ///   no batch changes
    /// - `Core(CostSetNotFound)` for an unknown cost set
    /// - `Core(Validation)` when a correction targets a result that is
    ///   missing or already superseded, or when the purchase order gained a
    ///   batch after the result was computed
    /// - `Core(BatchNotFound)` when a line names a batch the order lacks
    /// - `Core(InconsistentLedgerState)` for broken conservation or a broken
    ///   batch; logged and rolled back
    pub async fn apply(&self, result: &AllocationResult) -> DbResult<Vec<Batch>> {
        check_conservation(result).map_err(ledger_error)?;

        let mut tx = begin_write(&self.pool).await?;

        if !cost_set::mark_allocated(&mut tx, &result.cost_set_id, &result.id).await? {
            return Err(match cost_set::allocation_result_id(&mut tx, &result.cost_set_id).await? {
                Some(Some(existing)) => CoreError::AlreadyAllocated {
                    cost_set_id: result.cost_set_id.clone(),
                    result_id: existing,
                },
                _ => CoreError::CostSetNotFound(result.cost_set_id.clone()),
            }
            .into());
        }

        let current = batch::fetch_for_purchase_order(&mut tx, &result.purchase_order_id).await?;
        let updated = plan_allocation(&current, result).map_err(ledger_error)?;

        for next in &updated {
            debug!(
                batch_id = %next.id,
                landed_micros = next.landed_cost_per_unit.micros(),
                "Updating landed cost"
            );
            batch::update_landed(&mut tx, next).await?;
        }

        insert_result(&mut tx, result).await?;

        if let Some(prior) = &result.supersedes {
            let marked = sqlx::query(
                "UPDATE allocation_results SET superseded_by = ?1 WHERE id = ?2 AND superseded_by IS NULL",
            )
            .bind(&result.id)
            .bind(prior)
            .execute(&mut *tx)
            .await?;
            if marked.rows_affected() == 0 {
                return Err(CoreError::from(ValidationError::Inconsistent {
                    field: "supersedes".to_string(),
                    reason: format!("allocation {} is missing or already superseded", prior),
                })
                .into());
            }
        }

        tx.commit().await?;

        info!(
            id = %result.id,
            cost_set_id = %result.cost_set_id,
            purchase_order_id = %result.purchase_order_id,
            batches = updated.len(),
            total_cents = result.total_allocated.cents(),
            supersedes = ?result.supersedes,
            "Allocation applied"
        );
        Ok(updated)
    }

    /// Gets a result and its audit status by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StoredAllocation>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, ResultRow>(select_results!("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(hydrate(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    /// The result a cost set was applied as.
    pub async fn for_cost_set(&self, cost_set_id: &str) -> DbResult<Option<StoredAllocation>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, ResultRow>(select_results!("WHERE cost_set_id = ?1"))
            .bind(cost_set_id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(hydrate(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    /// The result currently reflected in the batches of a purchase order.
    pub async fn active_for_purchase_order(
        &self,
        purchase_order_id: &str,
    ) -> DbResult<Option<StoredAllocation>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, ResultRow>(select_results!(
            "WHERE purchase_order_id = ?1 AND superseded_by IS NULL \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(purchase_order_id)
        .fetch_optional(&mut *conn)
        .await?;
        match row {
            Some(row) => Ok(Some(hydrate(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    /// Every result of a purchase order, oldest first, superseded included.
    pub async fn history_for_purchase_order(
        &self,
        purchase_order_id: &str,
    ) -> DbResult<Vec<StoredAllocation>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, ResultRow>(select_results!(
            "WHERE purchase_order_id = ?1 ORDER BY created_at, id"
        ))
        .bind(purchase_order_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(hydrate(&mut conn, row).await?);
        }
        Ok(results)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
