//! Batch Ledger operations: goods receipt, consumption, returns and the
//! per-batch costing view.

use tracing::{debug, info};

use costing_core::ledger::NewBatch;
use costing_core::report::{self, BatchCostingDetails};
use costing_core::{Batch, ConsumptionRecord};

use super::dto::{ConsumeRequest, ReturnStockRequest};
use super::CostingService;
use crate::error::ApiError;

impl CostingService {
    /// `GetBatchCostingDetails`: the batch with its cost percentages
    /// relative to the base purchase price.
    pub async fn get_batch_costing_details(&self, batch_id: &str) -> Result<BatchCostingDetails, ApiError> {
        debug!(batch_id = %batch_id, "get_batch_costing_details");

        let batch = self
            .db
            .batches()
            .get_by_id(batch_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Batch", batch_id))?;

        Ok(report::batch_details(&batch))
    }

    /// Records a goods receipt.
    pub async fn receive_batch(&self, new_batch: NewBatch) -> Result<Batch, ApiError> {
        let batch = self.db.batches().receive(new_batch).await?;
        info!(batch_id = %batch.id, product_id = %batch.product_id, "Batch received");
        Ok(batch)
    }

    /// Removes units from a batch by sale, transfer or scrap.
    pub async fn consume(&self, request: ConsumeRequest) -> Result<ConsumptionRecord, ApiError> {
        let occurred_at = request.occurred_at.unwrap_or_else(|| self.now());
        let record = self
            .db
            .consumptions()
            .consume(&request.batch_id, request.quantity, request.kind, occurred_at)
            .await?;
        Ok(record)
    }

    /// Reverses part or all of an earlier consumption.
    pub async fn return_stock(&self, request: ReturnStockRequest) -> Result<ConsumptionRecord, ApiError> {
        let occurred_at = request.occurred_at.unwrap_or_else(|| self.now());
        let record = self
            .db
            .consumptions()
            .return_stock(&request.consumption_id, request.quantity, occurred_at)
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::error::ErrorCode;
    use crate::service::dto::{ConsumeRequest, ReturnStockRequest};
    use costing_core::ConsumptionKind;

    #[tokio::test]
    async fn test_consume_then_return_restores_stock() {
        let service = service().await;
        service.receive_batch(new_batch("b-1", None, 10, 250)).await.unwrap();

        let sale = service
            .consume(ConsumeRequest {
                batch_id: "b-1".into(),
                quantity: 4,
                kind: ConsumptionKind::Sale,
                occurred_at: None,
            })
            .await
            .unwrap();
        assert_eq!(sale.occurred_at, t0());

        let details = service.get_batch_costing_details("b-1").await.unwrap();
        assert_eq!(details.batch.available_quantity, 6);

        let reversal = service
            .return_stock(ReturnStockRequest {
                consumption_id: sale.id.clone(),
                quantity: 4,
                occurred_at: None,
            })
            .await
            .unwrap();
        assert_eq!(reversal.reverses.as_deref(), Some(sale.id.as_str()));

        let details = service.get_batch_costing_details("b-1").await.unwrap();
        assert_eq!(details.batch.available_quantity, 10);
    }

    #[tokio::test]
    async fn test_overdraw_is_insufficient_stock() {
        let service = service().await;
        service.receive_batch(new_batch("b-1", None, 3, 250)).await.unwrap();

        let err = service
            .consume(ConsumeRequest {
                batch_id: "b-1".into(),
                quantity: 5,
                kind: ConsumptionKind::Scrap,
                occurred_at: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStock);
    }

    #[tokio::test]
    async fn test_duplicate_receipt_is_rejected() {
        let service = service().await;
        service.receive_batch(new_batch("b-1", None, 3, 250)).await.unwrap();

        let err = service
            .receive_batch(new_batch("b-1", None, 3, 250))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}
