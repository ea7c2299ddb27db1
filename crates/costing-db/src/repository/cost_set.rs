//! # Cost Set Repository
//!
//! Purchase-order cost sets and their allocation status.
//!
//! ## Lifecycle
//! ```text
//! created ──► pending (allocation_result_id IS NULL)
//!                │
//!                └── AllocationRepository::apply ──► allocated (result id set once)
//!
//! A purchase order has at most one pending cost set. Once it is allocated,
//! further cost sets for the order must supersede the allocated one.
//! ```

use chrono::{DateTime, Utc};
use costing_core::validation::validate_cost_set;
use costing_core::{
    AllocationBasis, CoreError, ExchangeRate, Money, PurchaseOrderCostSet, SharedCosts,
    ValidationError,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::begin_write;
use crate::error::{DbError, DbResult};

macro_rules! select_cost_sets {
    ($tail:literal) => {
        concat!(
            "SELECT id, purchase_order_id, freight_cents, insurance_cents, duty_cents, ",
            "handling_cents, other_cents, basis, total_order_value_cents, currency, ",
            "exchange_rate_micros, supersedes, allocation_result_id, created_at ",
            "FROM cost_sets ",
            $tail
        )
    };
}

#[derive(Debug, sqlx::FromRow)]
struct CostSetRow {
    id: String,
    purchase_order_id: String,
    freight_cents: i64,
    insurance_cents: i64,
    duty_cents: i64,
    handling_cents: i64,
    other_cents: i64,
    basis: AllocationBasis,
    total_order_value_cents: i64,
    currency: String,
    exchange_rate_micros: i64,
    supersedes: Option<String>,
    allocation_result_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl CostSetRow {
    fn into_parts(self) -> (PurchaseOrderCostSet, Option<String>) {
        let cost_set = PurchaseOrderCostSet {
            id: self.id,
            purchase_order_id: self.purchase_order_id,
            costs: SharedCosts {
                freight: Money::from_cents(self.freight_cents),
                insurance: Money::from_cents(self.insurance_cents),
                duty: Money::from_cents(self.duty_cents),
                handling: Money::from_cents(self.handling_cents),
                other: Money::from_cents(self.other_cents),
            },
            basis: self.basis,
            total_order_value: Money::from_cents(self.total_order_value_cents),
            currency: self.currency,
            exchange_rate: ExchangeRate::from_micros(self.exchange_rate_micros),
            supersedes: self.supersedes,
            created_at: self.created_at,
        };
        (cost_set, self.allocation_result_id)
    }
}

/// A cost set with the result it was applied as, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCostSet {
    pub cost_set: PurchaseOrderCostSet,
    pub allocation_result_id: Option<String>,
}

impl StoredCostSet {
    pub fn is_allocated(&self) -> bool {
        self.allocation_result_id.is_some()
    }
}

impl From<CostSetRow> for StoredCostSet {
    fn from(row: CostSetRow) -> Self {
        let (cost_set, allocation_result_id) = row.into_parts();
        StoredCostSet {
            cost_set,
            allocation_result_id,
        }
    }
}

async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<StoredCostSet>> {
    let row = sqlx::query_as::<_, CostSetRow>(select_cost_sets!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(StoredCostSet::from))
}

/// Marks a cost set as applied, exactly once.
///
/// Returns `false` when the cost set is unknown or already carries a result.
pub(crate) async fn mark_allocated(
    conn: &mut SqliteConnection,
    cost_set_id: &str,
    result_id: &str,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE cost_sets SET allocation_result_id = ?1 WHERE id = ?2 AND allocation_result_id IS NULL",
    )
    .bind(result_id)
    .bind(cost_set_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Result a cost set was applied as, if any.
pub(crate) async fn allocation_result_id(
    conn: &mut SqliteConnection,
    cost_set_id: &str,
) -> DbResult<Option<Option<String>>> {
    let row: Option<Option<String>> =
        sqlx::query_scalar("SELECT allocation_result_id FROM cost_sets WHERE id = ?1")
            .bind(cost_set_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row)
}

fn conflict(reason: String) -> DbError {
    ValidationError::Inconsistent {
        field: "purchase_order_id".to_string(),
        reason,
    }
    .into()
}

/// Repository for purchase-order cost sets.
#[derive(Debug, Clone)]
pub struct CostSetRepository {
    pool: SqlitePool,
}

impl CostSetRepository {
    /// Creates a new CostSetRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CostSetRepository { pool }
    }

    /// Accepts a cost set.
    ///
    /// ## Rules
    /// - The cost set passes `validate_cost_set`
    /// - A correction (`supersedes` set) names an allocated cost set of the
    ///   same purchase order whose result is still active
    /// - Otherwise the order must have no allocated cost set
    /// - The order never has two pending cost sets
    pub async fn create(&self, cost_set: &PurchaseOrderCostSet) -> DbResult<()> {
        validate_cost_set(cost_set)?;

        let mut tx = begin_write(&self.pool).await?;
        let po = cost_set.purchase_order_id.as_str();

        match &cost_set.supersedes {
            Some(prior_id) => {
                let prior = fetch(&mut tx, prior_id)
                    .await?
                    .ok_or_else(|| CoreError::CostSetNotFound(prior_id.clone()))?;
                if prior.cost_set.purchase_order_id != po {
                    return Err(conflict(format!(
                        "cost set {} belongs to purchase order {}",
                        prior_id, prior.cost_set.purchase_order_id
                    )));
                }
                let Some(result_id) = prior.allocation_result_id else {
                    return Err(conflict(format!(
                        "cost set {} has not been allocated yet and cannot be corrected",
                        prior_id
                    )));
                };
                let superseded: Option<Option<String>> = sqlx::query_scalar(
                    "SELECT superseded_by FROM allocation_results WHERE id = ?1",
                )
                .bind(&result_id)
                .fetch_optional(&mut *tx)
                .await?;
                if let Some(Some(by)) = superseded {
                    return Err(conflict(format!(
                        "cost set {} was already corrected by allocation {}",
                        prior_id, by
                    )));
                }
            }
            None => {
                let allocated: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM cost_sets WHERE purchase_order_id = ?1 AND allocation_result_id IS NOT NULL",
                )
                .bind(po)
                .fetch_one(&mut *tx)
                .await?;
                if allocated > 0 {
                    return Err(conflict(format!(
                        "purchase order {} is already allocated; submit a correction that supersedes its cost set",
                        po
                    )));
                }
            }
        }

        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cost_sets WHERE purchase_order_id = ?1 AND allocation_result_id IS NULL",
        )
        .bind(po)
        .fetch_one(&mut *tx)
        .await?;
        if pending > 0 {
            return Err(conflict(format!(
                "purchase order {} already has a cost set awaiting allocation",
                po
            )));
        }

        debug!(id = %cost_set.id, purchase_order_id = %po, "Inserting cost set");

        sqlx::query(
            r#"
            INSERT INTO cost_sets (
                id, purchase_order_id, freight_cents, insurance_cents, duty_cents,
                handling_cents, other_cents, basis, total_order_value_cents, currency,
                exchange_rate_micros, supersedes, allocation_result_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, ?13)
            "#,
        )
        .bind(&cost_set.id)
        .bind(po)
        .bind(cost_set.costs.freight.cents())
        .bind(cost_set.costs.insurance.cents())
        .bind(cost_set.costs.duty.cents())
        .bind(cost_set.costs.handling.cents())
        .bind(cost_set.costs.other.cents())
        .bind(cost_set.basis)
        .bind(cost_set.total_order_value.cents())
        .bind(&cost_set.currency)
        .bind(cost_set.exchange_rate.micros())
        .bind(&cost_set.supersedes)
        .bind(cost_set.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("cost set id", &cost_set.id),
            other => other,
        })?;

        tx.commit().await?;

        info!(
            id = %cost_set.id,
            purchase_order_id = %po,
            total_cents = cost_set.costs.total().cents(),
            currency = %cost_set.currency,
            "Cost set accepted"
        );
        Ok(())
    }

    /// Gets a cost set and its allocation status.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StoredCostSet>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// The cost set of a purchase order still awaiting allocation.
    pub async fn pending_for_purchase_order(
        &self,
        purchase_order_id: &str,
    ) -> DbResult<Option<PurchaseOrderCostSet>> {
        let row = sqlx::query_as::<_, CostSetRow>(select_cost_sets!(
            "WHERE purchase_order_id = ?1 AND allocation_result_id IS NULL \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(purchase_order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.into_parts().0))
    }

    /// Every cost set of a purchase order, oldest first.
    pub async fn list_for_purchase_order(
        &self,
        purchase_order_id: &str,
    ) -> DbResult<Vec<StoredCostSet>> {
        let rows = sqlx::query_as::<_, CostSetRow>(select_cost_sets!(
            "WHERE purchase_order_id = ?1 ORDER BY created_at, id"
        ))
        .bind(purchase_order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredCostSet::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
