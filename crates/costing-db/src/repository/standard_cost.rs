//! # Standard Cost Repository
//!
//! Configured target unit costs per product, effective from a timestamp.
//! The cost in force at `as_of` is the latest entry not after it.

use chrono::{DateTime, Utc};
use costing_core::valuation::StandardCost;
use costing_core::validation::{validate_id, validate_unit_cost};
use costing_core::UnitCost;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
struct StandardCostRow {
    product_id: String,
    unit_cost_micros: i64,
    effective_from: DateTime<Utc>,
}

impl From<StandardCostRow> for StandardCost {
    fn from(row: StandardCostRow) -> Self {
        StandardCost {
            product_id: row.product_id,
            unit_cost: UnitCost::from_micros(row.unit_cost_micros),
            effective_from: row.effective_from,
        }
    }
}

/// Repository for the standard cost registry.
#[derive(Debug, Clone)]
pub struct StandardCostRepository {
    pool: SqlitePool,
}

impl StandardCostRepository {
    /// Creates a new StandardCostRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StandardCostRepository { pool }
    }

    /// Records a standard cost, replacing any entry with the same
    /// `effective_from`.
    pub async fn set(&self, standard: &StandardCost) -> DbResult<()> {
        validate_id("product_id", &standard.product_id)?;
        validate_unit_cost("unit_cost", standard.unit_cost)?;

        sqlx::query(
            r#"
            INSERT INTO standard_costs (product_id, unit_cost_micros, effective_from)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (product_id, effective_from)
            DO UPDATE SET unit_cost_micros = excluded.unit_cost_micros
            "#,
        )
        .bind(&standard.product_id)
        .bind(standard.unit_cost.micros())
        .bind(standard.effective_from)
        .execute(&self.pool)
        .await?;

        info!(
            product_id = %standard.product_id,
            unit_cost_micros = standard.unit_cost.micros(),
            effective_from = %standard.effective_from,
            "Standard cost set"
        );
        Ok(())
    }

    /// The standard cost in force for a product at `as_of`.
    pub async fn current(
        &self,
        product_id: &str,
        as_of: DateTime<Utc>,
    ) -> DbResult<Option<StandardCost>> {
        let row = sqlx::query_as::<_, StandardCostRow>(
            r#"
            SELECT product_id, unit_cost_micros, effective_from
            FROM standard_costs
            WHERE product_id = ?1 AND effective_from <= ?2
            ORDER BY effective_from DESC
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StandardCost::from))
    }

    /// Every entry of a product, oldest first.
    pub async fn history(&self, product_id: &str) -> DbResult<Vec<StandardCost>> {
        let rows = sqlx::query_as::<_, StandardCostRow>(
            r#"
            SELECT product_id, unit_cost_micros, effective_from
            FROM standard_costs
            WHERE product_id = ?1
            ORDER BY effective_from
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StandardCost::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::t0;
    use crate::{Database, DbConfig};
    use chrono::Duration;

    fn standard(cents: i64, from: DateTime<Utc>) -> StandardCost {
        StandardCost {
            product_id: "p-1".into(),
            unit_cost: UnitCost::from_cents(cents),
            effective_from: from,
        }
    }

    #[tokio::test]
    async fn test_current_follows_effective_dates() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.standard_costs();
        repo.set(&standard(1_000, t0())).await.unwrap();
        repo.set(&standard(1_200, t0() + Duration::days(30))).await.unwrap();

        assert!(repo.current("p-1", t0() - Duration::days(1)).await.unwrap().is_none());
        let early = repo.current("p-1", t0() + Duration::days(5)).await.unwrap().unwrap();
        assert_eq!(early.unit_cost, UnitCost::from_cents(1_000));
        let late = repo.current("p-1", t0() + Duration::days(31)).await.unwrap().unwrap();
        assert_eq!(late.unit_cost, UnitCost::from_cents(1_200));

        // same effective date replaces
        repo.set(&standard(1_100, t0())).await.unwrap();
        assert_eq!(repo.history("p-1").await.unwrap().len(), 2);
        assert!(repo.set(&standard(-1, t0())).await.is_err());
    }
}
