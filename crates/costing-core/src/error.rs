//! # Error Types
//!
//! Domain-specific error types for costing-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  costing-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule and ledger failures              │
//! │  └── ValidationError  - Malformed input, rejected before state change  │
//! │                                                                         │
//! │  costing-db errors (separate crate)                                    │
//! │  └── DbError          - Persistence failures (wraps CoreError)         │
//! │                                                                         │
//! │  costing-engine errors (app)                                           │
//! │  └── ApiError         - What callers see (serialized)                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Caller       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Severity
//! Every variant is a recoverable, typed result except
//! [`CoreError::InconsistentLedgerState`], which aborts the enclosing
//! transaction and needs an operator.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The share weights of a purchase order sum to zero.
    ///
    /// ## When This Occurs
    /// - `by_value` where every batch has a zero purchase price
    /// - `by_weight` where every declared weight is zero
    #[error("Cannot allocate costs for purchase order {purchase_order_id}: {basis} share weights sum to zero")]
    IndeterminateAllocationBasis {
        purchase_order_id: String,
        basis: String,
    },

    /// The cost set has already been applied to its batches.
    #[error("Cost set {cost_set_id} was already allocated (result {result_id})")]
    AlreadyAllocated {
        cost_set_id: String,
        result_id: String,
    },

    /// Requested quantity exceeds what the ledger holds.
    ///
    /// ## When This Occurs
    /// - Consuming more than a batch's available quantity
    /// - Optimizer demand larger than every candidate combined (reported
    ///   alongside the candidates, not raised)
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// A batch lacks the attribute the chosen allocation basis needs.
    #[error("Batch {batch_id} has no declared {attribute} required by the {basis} basis")]
    MissingAllocationBasisAttribute {
        batch_id: String,
        basis: String,
        attribute: String,
    },

    /// A ledger invariant was found broken mid-computation.
    ///
    /// Fatal: never corrected silently.
    #[error("Inconsistent ledger state for batch {batch_id}: {reason}")]
    InconsistentLedgerState { batch_id: String, reason: String },

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Cost set not found: {0}")]
    CostSetNotFound(String),

    #[error("Consumption record not found: {0}")]
    ConsumptionNotFound(String),
}

impl CoreError {
    /// Creates an InconsistentLedgerState error.
    pub fn inconsistent(batch_id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InconsistentLedgerState {
            batch_id: batch_id.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that must abort the enclosing transaction and reach
    /// an operator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::InconsistentLedgerState { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any ledger state is read or changed.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, bad currency code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two fields contradict each other.
    #[error("{field} is inconsistent: {reason}")]
    Inconsistent { field: String, reason: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required { field: field.into() }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive { field: field.into() }
    }

    pub fn must_not_be_negative(field: impl Into<String>) -> Self {
        ValidationError::MustNotBeNegative { field: field.into() }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "P-1".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for P-1: available 3, requested 5"
        );

        let err = ValidationError::required("batch_id");
        assert_eq!(err.to_string(), "batch_id is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::must_be_positive("quantity").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert!(!core_err.is_fatal());
    }

    #[test]
    fn test_only_ledger_inconsistency_is_fatal() {
        assert!(CoreError::inconsistent("b-1", "available exceeds received").is_fatal());
        assert!(!CoreError::BatchNotFound("b-1".into()).is_fatal());
    }
}
