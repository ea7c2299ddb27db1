//! # Validation Module
//!
//! Input validation for engine requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request decoding (costing-engine)                            │
//! │  └── Type validation (serde deserialization)                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Identifiers, quantities, money signs, currency codes              │
//! │  └── Rejected BEFORE any ledger read or write                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (available <= received, ...)                    │
//! │  └── UNIQUE / FOREIGN KEY constraints                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::money::{ExchangeRate, Money, UnitCost};
use crate::types::{LandedCostBreakdown, PurchaseOrderCostSet};
use crate::MAX_ID_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an opaque identifier (batch, product, location, ...).
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Letters, digits, `-`, `_`, `.`, `:` only
///
/// ```rust
/// use costing_core::validation::validate_id;
///
/// assert!(validate_id("product_id", "SKU-1001").is_ok());
/// assert!(validate_id("product_id", "").is_err());
/// assert!(validate_id("product_id", "has space").is_err());
/// ```
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::required(field));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LENGTH,
        });
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, digits, '-', '_', '.' and ':'".to_string(),
        });
    }

    Ok(())
}

/// Validates an optional identifier when present.
pub fn validate_optional_id(field: &str, id: Option<&str>) -> ValidationResult<()> {
    match id {
        Some(id) => validate_id(field, id),
        None => Ok(()),
    }
}

/// Validates a UUID string.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity that must be strictly positive.
///
/// ```rust
/// use costing_core::validation::validate_quantity;
///
/// assert!(validate_quantity("quantity", 1).is_ok());
/// assert!(validate_quantity("quantity", 0).is_err());
/// ```
pub fn validate_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive(field));
    }

    Ok(())
}

/// Validates a monetary amount that must not be negative.
pub fn validate_non_negative_money(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::must_not_be_negative(field));
    }

    Ok(())
}

/// Validates a per-unit cost that must not be negative.
pub fn validate_unit_cost(field: &str, cost: UnitCost) -> ValidationResult<()> {
    if cost.is_negative() {
        return Err(ValidationError::must_not_be_negative(field));
    }

    Ok(())
}

/// Validates an exchange rate (must be > 0).
pub fn validate_exchange_rate(rate: ExchangeRate) -> ValidationResult<()> {
    if !rate.is_positive() {
        return Err(ValidationError::must_be_positive("exchange_rate"));
    }

    Ok(())
}

/// Validates an ISO 4217 style currency code (three uppercase letters).
///
/// ```rust
/// use costing_core::validation::validate_currency_code;
///
/// assert!(validate_currency_code("USD").is_ok());
/// assert!(validate_currency_code("usd").is_err());
/// assert!(validate_currency_code("US").is_err());
/// ```
pub fn validate_currency_code(code: &str) -> ValidationResult<()> {
    if code.is_empty() {
        return Err(ValidationError::required("currency"));
    }

    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a three-letter uppercase code".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates a purchase-order cost set before it is accepted.
///
/// ## Rules
/// - Identifiers well formed
/// - Every cost total and the order value >= 0
/// - Exchange rate > 0
/// - Currency code well formed
pub fn validate_cost_set(cost_set: &PurchaseOrderCostSet) -> ValidationResult<()> {
    validate_id("id", &cost_set.id)?;
    validate_id("purchase_order_id", &cost_set.purchase_order_id)?;
    validate_optional_id("supersedes", cost_set.supersedes.as_deref())?;

    for component in crate::types::CostComponent::ALL {
        validate_non_negative_money(&component.to_string(), cost_set.costs.get(component))?;
    }
    validate_non_negative_money("total_order_value", cost_set.total_order_value)?;
    validate_exchange_rate(cost_set.exchange_rate)?;
    validate_currency_code(&cost_set.currency)?;

    Ok(())
}

/// Validates a per-unit landed breakdown (all components >= 0).
pub fn validate_breakdown(breakdown: &LandedCostBreakdown) -> ValidationResult<()> {
    if breakdown.has_negative() {
        return Err(ValidationError::must_not_be_negative("landed cost component"));
    }

    Ok(())
}

/// Validates that an optional expiry is after the receipt timestamp.
pub fn validate_expiry(
    received_at: DateTime<Utc>,
    expiry_at: Option<DateTime<Utc>>,
) -> ValidationResult<()> {
    if let Some(expiry) = expiry_at {
        if expiry <= received_at {
            return Err(ValidationError::Inconsistent {
                field: "expiry_at".to_string(),
                reason: "must be after received_at".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
