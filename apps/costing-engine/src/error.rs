//! # API Error Type
//!
//! Unified error type for every contract operation.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Costing Engine                     │
//! │                                                                         │
//! │  Caller                      Rust Engine                                │
//! │  ──────                      ───────────                                │
//! │                                                                         │
//! │  allocate_purchase_order_costs("PO-7")                                  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Service Operation                                               │  │
//! │  │  Result<T, ApiError>                                             │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Database Error? ─── DbError::QueryFailed("...") ──┐            │  │
//! │  │         │                                          │            │  │
//! │  │         ▼                                          ▼            │  │
//! │  │  Costing Rule? ─── CoreError::AlreadyAllocated ── ApiError ────►│  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Ledger Broken? ── logged at error, LEDGER_INCONSISTENT ───────►│  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  { "code": "ALREADY_ALLOCATED",                                        │
//! │    "message": "Cost set cs-1 was already allocated (result ar-1)" }    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use costing_core::{CoreError, ValidationError};
use costing_db::DbError;

use crate::config::ConfigError;

/// API error returned from contract operations.
///
/// ## Serialization
/// This is what the caller receives when an operation fails:
/// ```json
/// {
///   "code": "INSUFFICIENT_STOCK",
///   "message": "Insufficient stock for p-1: available 3, requested 5"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found
    NotFound,

    /// Input validation failed; nothing was changed
    ValidationError,

    /// Share weights of a purchase order sum to zero
    IndeterminateAllocationBasis,

    /// The cost set was already applied
    AlreadyAllocated,

    /// Requested quantity exceeds what the ledger holds
    InsufficientStock,

    /// A batch lacks the weight or declared value the basis needs
    MissingAllocationBasisAttribute,

    /// A ledger invariant is broken. Needs an operator.
    LedgerInconsistent,

    /// Database operation failed
    DatabaseError,

    /// Configuration could not be loaded
    ConfigError,

    /// Internal error
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }

    /// True for errors a caller can fix by changing the request.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::NotFound
                | ErrorCode::ValidationError
                | ErrorCode::IndeterminateAllocationBasis
                | ErrorCode::AlreadyAllocated
                | ErrorCode::InsufficientStock
                | ErrorCode::MissingAllocationBasisAttribute
        )
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::warn!("Foreign key violation: {}", message);
                ApiError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            DbError::CheckViolation(message) => {
                tracing::error!("Ledger constraint rejected a write: {}", message);
                ApiError::new(
                    ErrorCode::LedgerInconsistent,
                    format!(
                        "Ledger constraint violated ({}). Operator intervention required",
                        message
                    ),
                )
            }
            DbError::Core(core) => ApiError::from(core),
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Database migration failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database transaction failed")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Validation(e) => ApiError::validation(e.to_string()),
            CoreError::IndeterminateAllocationBasis { .. } => {
                ApiError::new(ErrorCode::IndeterminateAllocationBasis, message)
            }
            CoreError::AlreadyAllocated { .. } => ApiError::new(ErrorCode::AlreadyAllocated, message),
            CoreError::InsufficientStock { .. } => {
                ApiError::new(ErrorCode::InsufficientStock, message)
            }
            CoreError::MissingAllocationBasisAttribute { .. } => {
                ApiError::new(ErrorCode::MissingAllocationBasisAttribute, message)
            }
            CoreError::InconsistentLedgerState { batch_id, reason } => {
                tracing::error!(batch_id = %batch_id, reason = %reason, "Inconsistent ledger state");
                ApiError::new(
                    ErrorCode::LedgerInconsistent,
                    format!("{}. Operator intervention required", message),
                )
            }
            CoreError::BatchNotFound(id) => ApiError::not_found("Batch", &id),
            CoreError::CostSetNotFound(id) => ApiError::not_found("Cost set", &id),
            CoreError::ConsumptionNotFound(id) => ApiError::not_found("Consumption record", &id),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(ErrorCode::ConfigError, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
