//! Read-side operations: the allocation optimizer, inventory valuation,
//! costing method comparison and the cost analysis report.
//!
//! All of them load a product's batches (and, for the comparison, its
//! consumption history) and hand them to the pure functions of
//! `costing-core`. None of them writes to the ledger except
//! [`CostingService::set_standard_cost`].

use chrono::{DateTime, Utc};
use tracing::debug;

use costing_core::impact::{self, CompareRequest, CostImpactReport};
use costing_core::optimizer::{self, AllocationPlan, AllocationRequest};
use costing_core::report::{self, CostAnalysisReport, GroupBy};
use costing_core::valuation::{self, StandardCost, ValuationRequest, ValuationSnapshot};

use super::dto::{
    CompareMethodsRequest, OptimalAllocationRequest, SetStandardCostRequest, ValueInventoryRequest,
};
use super::CostingService;
use crate::error::ApiError;

impl CostingService {
    /// `GetOptimalAllocation`: ranks the on-hand batches of a product for a
    /// demand.
    ///
    /// A pool that cannot cover the demand is reported as a shortfall in the
    /// plan, not as an error.
    pub async fn get_optimal_allocation(
        &self,
        request: OptimalAllocationRequest,
    ) -> Result<AllocationPlan, ApiError> {
        let request = AllocationRequest {
            strategy: request
                .strategy
                .unwrap_or(self.config.allocation.default_strategy),
            as_of: request.as_of.unwrap_or_else(|| self.now()),
            product_id: request.product_id,
            location_id: request.location_id,
            quantity: request.quantity,
        };
        debug!(product_id = %request.product_id, strategy = %request.strategy, "get_optimal_allocation");

        // Every location: the cost baseline is product-wide
        let batches = self.db.batches().list_by_product(&request.product_id, None).await?;
        let plan = optimizer::optimal_allocation(&request, &batches, &self.config.optimizer_config())?;

        if let Some(shortfall) = &plan.shortfall {
            debug!(
                product_id = %plan.product_id,
                requested = shortfall.requested,
                available = shortfall.available,
                "Demand exceeds on-hand stock"
            );
        }
        Ok(plan)
    }

    /// Values a product's on-hand stock with one costing method.
    pub async fn value_inventory(
        &self,
        request: ValueInventoryRequest,
    ) -> Result<ValuationSnapshot, ApiError> {
        let as_of = request.as_of.unwrap_or_else(|| self.now());

        let standard_cost = match request.standard_cost {
            Some(cost) => Some(cost),
            None => self
                .db
                .standard_costs()
                .current(&request.product_id, as_of)
                .await?
                .map(|standard| standard.unit_cost),
        };

        let valuation_request = ValuationRequest {
            location_id: request.location_id,
            issue_quantity: request.issue_quantity,
            selling_price: request.selling_price,
            standard_cost,
            ..ValuationRequest::new(request.product_id, as_of, request.method)
        };

        let batches = self
            .db
            .batches()
            .list_by_product(&valuation_request.product_id, None)
            .await?;
        Ok(valuation::value(&valuation_request, &batches)?)
    }

    /// Compares FIFO, LIFO and weighted-average costs of a product and
    /// recommends a method from its turnover.
    pub async fn compare_costing_methods(
        &self,
        request: CompareMethodsRequest,
    ) -> Result<CostImpactReport, ApiError> {
        let request = CompareRequest {
            as_of: request.as_of.unwrap_or_else(|| self.now()),
            product_id: request.product_id,
            location_id: request.location_id,
            issue_quantity: request.issue_quantity,
        };

        // Batches hold current quantities, so movements after `as_of` are
        // needed to rewind them.
        let batches = self.db.batches().list_by_product(&request.product_id, None).await?;
        let history = self
            .db
            .consumptions()
            .history_for_product(&request.product_id, None, None)
            .await?;

        Ok(impact::compare(&request, &batches, &history, &self.config.turnover)?)
    }

    /// `GetCostAnalysisReport`: inventory value and overhead, overall and
    /// per group, over batches received on or after `date_from`.
    pub async fn get_cost_analysis_report(
        &self,
        group_by: GroupBy,
        date_from: Option<DateTime<Utc>>,
    ) -> Result<CostAnalysisReport, ApiError> {
        debug!(%group_by, ?date_from, "get_cost_analysis_report");

        let batches = self.db.batches().list_received_since(date_from).await?;
        Ok(report::cost_analysis(&batches, group_by, date_from))
    }

    /// Records a standard cost, effective now unless stated.
    pub async fn set_standard_cost(
        &self,
        request: SetStandardCostRequest,
    ) -> Result<StandardCost, ApiError> {
        let standard = StandardCost {
            effective_from: request.effective_from.unwrap_or_else(|| self.now()),
            product_id: request.product_id,
            unit_cost: request.unit_cost,
        };
        self.db.standard_costs().set(&standard).await?;
        Ok(standard)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::error::ErrorCode;
    use crate::service::dto::ConsumeRequest;
    use chrono::Duration;
    use costing_core::optimizer::{AllocationStrategy, RiskClass};
    use costing_core::valuation::ValuationMethod;
    use costing_core::{ConsumptionKind, UnitCost};

    fn value_request(method: ValuationMethod) -> ValueInventoryRequest {
        ValueInventoryRequest {
            product_id: "p-1".into(),
            location_id: None,
            as_of: None,
            method,
            issue_quantity: None,
            selling_price: None,
            standard_cost: None,
        }
    }

    #[tokio::test]
    async fn test_optimal_allocation_prefers_short_dated_stock() {
        let service = service().await;

        let mut fresh = new_batch("b-fresh", None, 50, 1_000);
        fresh.expiry_at = Some(t0() + Duration::days(170));
        let mut dated = new_batch("b-dated", None, 50, 1_000);
        dated.expiry_at = Some(t0() + Duration::days(20));
        service.receive_batch(fresh).await.unwrap();
        service.receive_batch(dated).await.unwrap();

        let plan = service
            .get_optimal_allocation(OptimalAllocationRequest {
                product_id: "p-1".into(),
                location_id: None,
                quantity: 10,
                strategy: Some(AllocationStrategy::ExpiryManagement),
                as_of: None,
            })
            .await
            .unwrap();

        assert_eq!(plan.candidates[0].batch_id, "b-dated");
        assert_eq!(plan.candidates[0].risk, RiskClass::HighExpiryRisk);
        assert_eq!(plan.total_available, 100);
        assert!(plan.shortfall.is_none());
    }

    #[tokio::test]
    async fn test_optimal_allocation_reports_shortfall() {
        let service = service().await;
        service.receive_batch(new_batch("b-1", None, 5, 1_000)).await.unwrap();

        let plan = service
            .get_optimal_allocation(OptimalAllocationRequest {
                product_id: "p-1".into(),
                location_id: None,
                quantity: 8,
                strategy: None,
                as_of: None,
            })
            .await
            .unwrap();

        assert_eq!(plan.strategy, AllocationStrategy::Balanced);
        let shortfall = plan.shortfall.unwrap();
        assert_eq!(shortfall.requested, 8);
        assert_eq!(shortfall.available, 5);
    }

    #[tokio::test]
    async fn test_valuation_methods_over_two_layers() {
        let service = service().await;
        let mut older = new_batch("b-old", None, 100, 1_000);
        older.received_at = t0() - Duration::days(60);
        service.receive_batch(older).await.unwrap();
        service.receive_batch(new_batch("b-new", None, 50, 1_200)).await.unwrap();

        let mut fifo = value_request(ValuationMethod::Fifo);
        fifo.issue_quantity = Some(120);
        let snapshot = service.value_inventory(fifo).await.unwrap();
        // 100 × 10.00 + 20 × 12.00
        assert_eq!(snapshot.total_value.cents(), 124_000);

        let average = service
            .value_inventory(value_request(ValuationMethod::WeightedAvg))
            .await
            .unwrap();
        assert_eq!(average.total_value.cents(), 160_000);
        assert_eq!(average.on_hand_quantity, 150);
    }

    #[tokio::test]
    async fn test_standard_cost_comes_from_registry() {
        let service = service().await;
        service.receive_batch(new_batch("b-1", None, 10, 1_100)).await.unwrap();
        service
            .set_standard_cost(SetStandardCostRequest {
                product_id: "p-1".into(),
                unit_cost: UnitCost::from_cents(1_000),
                effective_from: Some(t0() - Duration::days(1)),
            })
            .await
            .unwrap();

        let snapshot = service
            .value_inventory(value_request(ValuationMethod::Standard))
            .await
            .unwrap();
        assert_eq!(snapshot.standard_cost, Some(UnitCost::from_cents(1_000)));
        assert_eq!(snapshot.total_value.cents(), 10_000);
        let variance = snapshot.variance_percentage.unwrap();
        assert!((variance - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_valuing_more_than_on_hand_is_insufficient_stock() {
        let service = service().await;
        service.receive_batch(new_batch("b-1", None, 10, 1_000)).await.unwrap();

        let mut request = value_request(ValuationMethod::Lifo);
        request.issue_quantity = Some(11);
        let err = service.value_inventory(request).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStock);
    }

    #[tokio::test]
    async fn test_compare_uses_consumption_history() {
        let service = service().await;
        let mut older = new_batch("b-old", None, 100, 1_000);
        older.received_at = t0() - Duration::days(60);
        service.receive_batch(older).await.unwrap();
        service.receive_batch(new_batch("b-new", None, 50, 1_200)).await.unwrap();
        service
            .consume(ConsumeRequest {
                batch_id: "b-old".into(),
                quantity: 40,
                kind: ConsumptionKind::Sale,
                occurred_at: Some(t0() - Duration::days(10)),
            })
            .await
            .unwrap();

        let report = service
            .compare_costing_methods(CompareMethodsRequest {
                product_id: "p-1".into(),
                location_id: None,
                as_of: None,
                issue_quantity: None,
            })
            .await
            .unwrap();

        assert_eq!(report.on_hand_quantity, 110);
        assert_eq!(report.fifo_unit_cost, UnitCost::from_cents(1_000));
        assert_eq!(report.lifo_unit_cost, UnitCost::from_cents(1_200));
        assert_eq!(report.turnover.net_sales_quantity, 40);
        assert!(report.turnover.turnover_ratio.is_some());
    }

    #[tokio::test]
    async fn test_cost_analysis_report_groups_by_supplier() {
        let service = service().await;
        service.receive_batch(new_batch("b-1", None, 10, 1_000)).await.unwrap();
        let mut other = new_batch("b-2", None, 5, 2_000);
        other.supplier_id = "sup-2".into();
        service.receive_batch(other).await.unwrap();

        let report = service
            .get_cost_analysis_report(GroupBy::Supplier, None)
            .await
            .unwrap();
        assert_eq!(report.summary.total_batches, 2);
        assert_eq!(report.summary.total_inventory_value.cents(), 20_000);
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups[1].key, "sup-2");

        let later = service
            .get_cost_analysis_report(GroupBy::Product, Some(t0()))
            .await
            .unwrap();
        assert_eq!(later.summary.total_batches, 0);
    }
}
