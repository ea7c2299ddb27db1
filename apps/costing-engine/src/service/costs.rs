//! Purchase-order shared costs: accepting cost sets, allocating them to
//! batches, corrections and the audit trail.
//!
//! ```text
//!  create_purchase_order_costs ──► cost set (pending)
//!                                        │
//!  allocate_purchase_order_costs ────────┤ landed_cost::allocate
//!                                        │   or landed_cost::supersede
//!                                        ▼
//!                         AllocationRepository::apply (one transaction)
//!                         batches updated · result stored · cost set marked
//! ```

use tracing::{debug, info, warn};
use uuid::Uuid;

use costing_core::landed_cost;
use costing_core::validation::validate_id;
use costing_core::{
    AllocationBasis, AllocationResult, CoreError, ExchangeRate, PurchaseOrderCostSet,
    ValidationError,
};

use super::dto::{AllocationHistory, AllocationRecord, CostSetDecision, CreatePurchaseOrderCostsRequest};
use super::CostingService;
use crate::error::ApiError;

impl CostingService {
    /// `CreatePurchaseOrderCosts`: accepts or rejects a cost set.
    ///
    /// Anything the caller can correct comes back as `Rejected` with the
    /// reason. Infrastructure failures are errors.
    pub async fn create_purchase_order_costs(
        &self,
        request: CreatePurchaseOrderCostsRequest,
    ) -> Result<CostSetDecision, ApiError> {
        debug!(purchase_order_id = %request.purchase_order_id, "create_purchase_order_costs");

        let cost_set = match self.build_cost_set(request) {
            Ok(cost_set) => cost_set,
            Err(err) => return Ok(rejection(err.into())),
        };

        match self.db.cost_sets().create(&cost_set).await {
            Ok(()) => Ok(CostSetDecision::Accepted { cost_set }),
            Err(err) => {
                let err = ApiError::from(err);
                if err.is_rejection() {
                    warn!(
                        purchase_order_id = %cost_set.purchase_order_id,
                        reason = %err.message,
                        "Cost set rejected"
                    );
                    Ok(rejection(err))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn build_cost_set(
        &self,
        request: CreatePurchaseOrderCostsRequest,
    ) -> Result<PurchaseOrderCostSet, ValidationError> {
        let base_currency = &self.config.allocation.base_currency;
        let currency = request.currency.clone().unwrap_or_else(|| base_currency.clone());

        let exchange_rate = match (&currency == base_currency, request.exchange_rate) {
            (true, None) => ExchangeRate::PAR,
            (true, Some(rate)) if rate == ExchangeRate::PAR => rate,
            (true, Some(_)) => {
                return Err(ValidationError::Inconsistent {
                    field: "exchange_rate".to_string(),
                    reason: format!("cost sets in {} must use a rate of 1.0", base_currency),
                })
            }
            (false, Some(rate)) => rate,
            (false, None) => return Err(ValidationError::required("exchange_rate")),
        };

        Ok(PurchaseOrderCostSet {
            id: request.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            costs: request.costs(),
            basis: request.basis.unwrap_or(self.config.allocation.default_basis),
            total_order_value: request.total_order_value,
            currency,
            exchange_rate,
            supersedes: request.supersedes,
            purchase_order_id: request.purchase_order_id,
            created_at: self.now(),
        })
    }

    /// `AllocatePurchaseOrderCosts`: applies the pending cost set of a
    /// purchase order to its batches.
    ///
    /// `basis` overrides the basis stored with the cost set. A cost set that
    /// supersedes an earlier one replaces that allocation instead of adding
    /// to it.
    ///
    /// ## Errors
    /// - `ALREADY_ALLOCATED` when nothing is pending and the order already
    ///   carries an allocation
    /// - `NOT_FOUND` when the order has no cost set at all
    /// - `MISSING_ALLOCATION_BASIS_ATTRIBUTE`, `INDETERMINATE_ALLOCATION_BASIS`
    ///   from the allocator; the cost set stays pending
    pub async fn allocate_purchase_order_costs(
        &self,
        purchase_order_id: &str,
        basis: Option<AllocationBasis>,
    ) -> Result<AllocationResult, ApiError> {
        validate_id("purchase_order_id", purchase_order_id)?;
        debug!(purchase_order_id = %purchase_order_id, ?basis, "allocate_purchase_order_costs");

        let Some(mut cost_set) = self
            .db
            .cost_sets()
            .pending_for_purchase_order(purchase_order_id)
            .await?
        else {
            return Err(match self.db.allocations().active_for_purchase_order(purchase_order_id).await? {
                Some(active) => CoreError::AlreadyAllocated {
                    cost_set_id: active.result.cost_set_id,
                    result_id: active.result.id,
                }
                .into(),
                None => ApiError::not_found("Cost set for purchase order", purchase_order_id),
            });
        };

        if let Some(basis) = basis {
            cost_set.basis = basis;
        }

        let batches = self.db.batches().list_by_purchase_order(purchase_order_id).await?;
        let now = self.now();

        let result = match &cost_set.supersedes {
            Some(prior_id) => {
                let prior = self
                    .db
                    .allocations()
                    .for_cost_set(prior_id)
                    .await?
                    .ok_or_else(|| CoreError::CostSetNotFound(prior_id.clone()))?;
                landed_cost::supersede(&prior.result, &cost_set, &batches, now)?
            }
            None => landed_cost::allocate(&cost_set, &batches, now)?,
        };

        self.db.allocations().apply(&result).await?;

        info!(
            purchase_order_id = %purchase_order_id,
            cost_set_id = %result.cost_set_id,
            result_id = %result.id,
            basis = %result.basis,
            total_cents = result.total_allocated.cents(),
            "Purchase order costs allocated"
        );
        Ok(result)
    }

    /// Corrects an allocated cost set: accepts `corrected` as its
    /// successor and allocates it, superseding the earlier result.
    pub async fn supersede_purchase_order_costs(
        &self,
        prior_cost_set_id: &str,
        corrected: CreatePurchaseOrderCostsRequest,
    ) -> Result<AllocationResult, ApiError> {
        let request = CreatePurchaseOrderCostsRequest {
            supersedes: Some(prior_cost_set_id.to_string()),
            ..corrected
        };

        match self.create_purchase_order_costs(request).await? {
            CostSetDecision::Accepted { cost_set } => {
                self.allocate_purchase_order_costs(&cost_set.purchase_order_id, None)
                    .await
            }
            CostSetDecision::Rejected { code, reason } => Err(ApiError::new(code, reason)),
        }
    }

    /// Every allocation of a purchase order, superseded ones included, and
    /// the cost set still awaiting allocation.
    pub async fn allocation_history(&self, purchase_order_id: &str) -> Result<AllocationHistory, ApiError> {
        let cost_sets = self.db.cost_sets().list_for_purchase_order(purchase_order_id).await?;
        if cost_sets.is_empty() {
            return Err(ApiError::not_found("Cost set for purchase order", purchase_order_id));
        }

        let allocations = self
            .db
            .allocations()
            .history_for_purchase_order(purchase_order_id)
            .await?
            .into_iter()
            .map(|stored| AllocationRecord {
                active: stored.is_active(),
                result: stored.result,
                superseded_by: stored.superseded_by,
            })
            .collect();

        let pending_cost_set = cost_sets
            .into_iter()
            .rev()
            .find(|stored| !stored.is_allocated())
            .map(|stored| stored.cost_set);

        Ok(AllocationHistory {
            purchase_order_id: purchase_order_id.to_string(),
            allocations,
            pending_cost_set,
        })
    }
}

fn rejection(err: ApiError) -> CostSetDecision {
    CostSetDecision::Rejected {
        code: err.code,
        reason: err.message,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::error::ErrorCode;
    use costing_core::{Money, UnitCost};

    fn freight(purchase_order_id: &str, cents: i64) -> CreatePurchaseOrderCostsRequest {
        CreatePurchaseOrderCostsRequest {
            purchase_order_id: purchase_order_id.to_string(),
            freight: Money::from_cents(cents),
            basis: Some(AllocationBasis::ByQuantity),
            total_order_value: Money::from_cents(10_000),
            ..Default::default()
        }
    }

    async fn received_po(service: &CostingService) {
        service.receive_batch(new_batch("b-1", Some("PO-1"), 6, 1_000)).await.unwrap();
        service.receive_batch(new_batch("b-2", Some("PO-1"), 4, 1_000)).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_then_allocate_updates_landed_costs() {
        let service = service().await;
        received_po(&service).await;

        let decision = service.create_purchase_order_costs(freight("PO-1", 10_000)).await.unwrap();
        assert!(decision.is_accepted());

        let result = service.allocate_purchase_order_costs("PO-1", None).await.unwrap();
        assert_eq!(result.total_allocated.cents(), 10_000);
        assert_eq!(result.line_for("b-1").unwrap().allocated.freight.cents(), 6_000);
        assert_eq!(result.line_for("b-2").unwrap().allocated.freight.cents(), 4_000);

        let details = service.get_batch_costing_details("b-1").await.unwrap();
        assert_eq!(details.batch.landed_cost_per_unit, UnitCost::from_cents(2_000));
        assert_eq!(details.freight_percentage, Some(100.0));
        assert_eq!(details.cost_overhead_percentage, Some(100.0));
    }

    #[tokio::test]
    async fn test_second_allocation_is_already_allocated() {
        let service = service().await;
        received_po(&service).await;
        service.create_purchase_order_costs(freight("PO-1", 10_000)).await.unwrap();
        service.allocate_purchase_order_costs("PO-1", None).await.unwrap();

        let err = service.allocate_purchase_order_costs("PO-1", None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyAllocated);

        // Landed costs did not stack.
        let details = service.get_batch_costing_details("b-2").await.unwrap();
        assert_eq!(details.batch.landed_cost_per_unit, UnitCost::from_cents(2_000));
    }

    #[tokio::test]
    async fn test_allocate_without_cost_set_is_not_found() {
        let service = service().await;
        received_po(&service).await;

        let err = service.allocate_purchase_order_costs("PO-1", None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_invalid_cost_sets_are_rejected() {
        let service = service().await;
        received_po(&service).await;

        let negative = service.create_purchase_order_costs(freight("PO-1", -1)).await.unwrap();
        assert!(matches!(
            negative,
            CostSetDecision::Rejected { code: ErrorCode::ValidationError, .. }
        ));

        let mut foreign = freight("PO-1", 10_000);
        foreign.currency = Some("EUR".into());
        let decision = service.create_purchase_order_costs(foreign).await.unwrap();
        match decision {
            CostSetDecision::Rejected { reason, .. } => assert!(reason.contains("exchange_rate")),
            other => panic!("expected rejection, got {:?}", other),
        }

        service.create_purchase_order_costs(freight("PO-1", 10_000)).await.unwrap();
        let second_pending = service.create_purchase_order_costs(freight("PO-1", 5_000)).await.unwrap();
        assert!(!second_pending.is_accepted());
    }

    #[tokio::test]
    async fn test_foreign_currency_is_converted_before_allocation() {
        let service = service().await;
        received_po(&service).await;

        let mut request = freight("PO-1", 10_000);
        request.currency = Some("EUR".into());
        request.exchange_rate = Some(ExchangeRate::from_micros(1_100_000));
        service.create_purchase_order_costs(request).await.unwrap();

        let result = service.allocate_purchase_order_costs("PO-1", None).await.unwrap();
        assert_eq!(result.total_allocated.cents(), 11_000);
        assert_eq!(result.line_for("b-1").unwrap().allocated.freight.cents(), 6_600);
    }

    #[tokio::test]
    async fn test_missing_weight_keeps_cost_set_pending_until_basis_override() {
        let service = service().await;
        received_po(&service).await;

        let mut request = freight("PO-1", 10_000);
        request.basis = Some(AllocationBasis::ByWeight);
        service.create_purchase_order_costs(request).await.unwrap();

        let err = service.allocate_purchase_order_costs("PO-1", None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingAllocationBasisAttribute);

        let result = service
            .allocate_purchase_order_costs("PO-1", Some(AllocationBasis::ByQuantity))
            .await
            .unwrap();
        assert_eq!(result.basis, AllocationBasis::ByQuantity);
    }

    #[tokio::test]
    async fn test_zero_value_batches_are_indeterminate() {
        let service = service().await;
        service.receive_batch(new_batch("b-1", Some("PO-9"), 5, 0)).await.unwrap();

        let mut request = freight("PO-9", 1_000);
        request.basis = Some(AllocationBasis::ByValue);
        service.create_purchase_order_costs(request).await.unwrap();

        let err = service.allocate_purchase_order_costs("PO-9", None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::IndeterminateAllocationBasis);
    }

    #[tokio::test]
    async fn test_supersede_replaces_landed_costs_and_keeps_history() {
        let service = service().await;
        received_po(&service).await;

        let first = match service.create_purchase_order_costs(freight("PO-1", 10_000)).await.unwrap() {
            CostSetDecision::Accepted { cost_set } => cost_set,
            other => panic!("expected acceptance, got {:?}", other),
        };
        let original = service.allocate_purchase_order_costs("PO-1", None).await.unwrap();

        let corrected = service
            .supersede_purchase_order_costs(&first.id, freight("PO-1", 5_000))
            .await
            .unwrap();
        assert_eq!(corrected.supersedes.as_deref(), Some(original.id.as_str()));

        let details = service.get_batch_costing_details("b-1").await.unwrap();
        assert_eq!(details.batch.landed_cost_per_unit, UnitCost::from_cents(1_500));

        // Both results carry the same clock time, so look them up by id.
        let history = service.allocation_history("PO-1").await.unwrap();
        assert_eq!(history.allocations.len(), 2);
        let record = |id: &str| {
            history
                .allocations
                .iter()
                .find(|r| r.result.id == id)
                .unwrap()
                .clone()
        };
        let replaced = record(&original.id);
        assert!(!replaced.active);
        assert_eq!(replaced.superseded_by.as_deref(), Some(corrected.id.as_str()));
        assert!(record(&corrected.id).active);
        assert!(history.pending_cost_set.is_none());
    }

    #[tokio::test]
    async fn test_correction_of_unallocated_cost_set_is_rejected() {
        let service = service().await;
        received_po(&service).await;

        let first = match service.create_purchase_order_costs(freight("PO-1", 10_000)).await.unwrap() {
            CostSetDecision::Accepted { cost_set } => cost_set,
            other => panic!("expected acceptance, got {:?}", other),
        };

        let err = service
            .supersede_purchase_order_costs(&first.id, freight("PO-1", 5_000))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}
