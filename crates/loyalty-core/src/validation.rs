//! # Validation Module
//!
//! Input validation for checkout and discount code operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: API facade (loyalty-api)                                     │
//! │  ├── Deserialization, payment method parsing                           │
//! │  └── THIS MODULE: order shape and range rules                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── CHECK constraints (quantity ≥ 1, prices ≥ 0)                      │
//! │  ├── UNIQUE (user_id), UNIQUE (active_code)                            │
//! │  └── Partial UNIQUE on consumed discount codes                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Order validation collects every failing field instead of stopping at the
//! first, so the caller can report all of them at once.

use crate::error::ValidationError;
use crate::types::NewOrder;
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest code an administrator may assign.
pub const MAX_CODE_LEN: usize = 64;

// =============================================================================
// Single-Field Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price. Zero is allowed (free items).
///
/// ## Example
/// ```rust
/// use loyalty_core::validation::validate_price;
///
/// assert!(validate_price("line_price", 25_000).is_ok());
/// assert!(validate_price("line_price", 0).is_ok());
/// assert!(validate_price("line_price", -1).is_err());
/// ```
pub fn validate_price(field: &str, units: i64) -> ValidationResult<()> {
    if units < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a user or product identifier (non-blank, bounded length).
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates a discount code supplied by a user or administrator.
///
/// ## Rules
/// - Must not be blank
/// - At most 64 characters
/// - No whitespace inside the code
///
/// Returns the trimmed code.
pub fn validate_discount_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "discount_code".to_string(),
        });
    }

    if code.len() > MAX_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "discount_code".to_string(),
            max: MAX_CODE_LEN,
        });
    }

    if code.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "discount_code".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(code.to_string())
}

// =============================================================================
// Order Validation
// =============================================================================

/// Validates a candidate order, collecting every failure.
///
/// ## Rules
/// - cashier_id present
/// - at least one item, at most MAX_ORDER_ITEMS
/// - every item: product_id present, 1 ≤ quantity ≤ 999, line_price ≥ 0
/// - the line prices sum without overflowing
///
/// ## Example
/// ```rust
/// use loyalty_core::types::{NewOrder, NewOrderItem, PaymentMethod};
/// use loyalty_core::validation::validate_new_order;
///
/// let order = NewOrder::new(
///     "cashier-1",
///     vec![NewOrderItem::new("p-1", 0, -5)],
///     PaymentMethod::Cash,
/// );
/// let errors = validate_new_order(&order).unwrap_err();
/// assert_eq!(errors.len(), 2);
/// ```
pub fn validate_new_order(order: &NewOrder) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_identifier("cashier_id", &order.cashier_id) {
        errors.push(e);
    }

    if order.items.is_empty() {
        errors.push(ValidationError::Required {
            field: "items".to_string(),
        });
    } else if order.items.len() > MAX_ORDER_ITEMS {
        errors.push(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_ITEMS as i64,
        });
    }

    for (i, item) in order.items.iter().enumerate() {
        let checks = [
            validate_identifier(&format!("items[{i}].product_id"), &item.product_id),
            validate_quantity(&format!("items[{i}].quantity"), item.quantity),
            validate_price(&format!("items[{i}].line_price"), item.line_price),
        ];
        errors.extend(checks.into_iter().filter_map(Result::err));
    }

    let prices_valid = order.items.iter().all(|item| item.line_price >= 0);
    if prices_valid && order.subtotal().is_none() {
        errors.push(ValidationError::TooLarge {
            field: "items".to_string(),
        });
    }

    if let Some(code) = &order.discount_code {
        if let Err(e) = validate_discount_code(code) {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
