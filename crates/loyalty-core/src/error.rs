//! # Error Types
//!
//! Domain-specific error types for loyalty-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  loyalty-core errors (this file)                                       │
//! │  ├── CoreError        - Loyalty and discount rule violations           │
//! │  └── ValidationError  - Field-level input validation failures          │
//! │                                                                         │
//! │  loyalty-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  loyalty-api errors                                                    │
//! │  ├── ServiceError     - Service outcome (core / db / order failure)    │
//! │  └── ApiError         - What callers see (serialized envelope)         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → ApiError           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core loyalty and order rule errors.
///
/// Business-rule outcomes such as [`CoreError::DiscountCodeAlreadyUsed`] are
/// expected results, not faults. Callers translate them into envelopes.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No loyalty account exists for the user.
    #[error("Loyalty account not found for user {0}")]
    AccountNotFound(String),

    /// Order cannot be found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// The code does not match an active discount code.
    ///
    /// ## When This Occurs
    /// - Code was never issued
    /// - Code was replaced by a newer one after a tier upgrade
    /// - Owner-scoped check and the code belongs to someone else
    #[error("Discount code {code} is not valid")]
    DiscountCodeInvalid { code: String },

    /// The code has already been consumed by an order.
    ///
    /// ## User Workflow
    /// ```text
    /// Order #1 with DISCOUNT_AB12CD34 ──► discount applied, code consumed
    ///      │
    ///      ▼
    /// Order #2 with DISCOUNT_AB12CD34
    ///      │
    ///      ▼
    /// DiscountCodeAlreadyUsed { code: "DISCOUNT_AB12CD34" }
    /// ```
    #[error("Discount code {code} has already been used")]
    DiscountCodeAlreadyUsed { code: String },

    /// The user has no discount code they are entitled to see.
    #[error("No discount code available for user {0}")]
    NoDiscountCode(String),

    /// Code generation kept colliding with issued codes.
    #[error("Could not generate a unique discount code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// One or more input fields failed validation.
    #[error("Validation failed: {}", ValidationErrors(.0))]
    Validation(Vec<ValidationError>),
}

impl From<ValidationError> for CoreError {
    fn from(err: ValidationError) -> Self {
        CoreError::Validation(vec![err])
    }
}

/// Display helper joining validation messages with "; ".
struct ValidationErrors<'a>(&'a [ValidationError]);

impl fmt::Display for ValidationErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Every variant carries the offending field so callers can return
/// structured, field-level messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
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

    /// Invalid format (e.g., malformed discount code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// A sum of amounts does not fit in the money range.
    #[error("{field} total is too large")]
    TooLarge { field: String },

    /// Duplicate value (e.g., a discount code held by another account).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    /// Returns the name of the field that failed validation.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::TooLarge { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::NotAllowed { field, .. }
            | ValidationError::Duplicate { field, .. } => field,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::DiscountCodeAlreadyUsed {
            code: "DISCOUNT_AB12CD34".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Discount code DISCOUNT_AB12CD34 has already been used"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        match core_err {
            CoreError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_multiple_validation_errors_are_joined() {
        let err = CoreError::Validation(vec![
            ValidationError::Required {
                field: "items".to_string(),
            },
            ValidationError::MustBePositive {
                field: "items[0].quantity".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: items is required; items[0].quantity must be positive"
        );
    }

    #[test]
    fn test_field_accessor() {
        let err = ValidationError::OutOfRange {
            field: "items[2].line_price".to_string(),
            min: 0,
            max: i64::MAX,
        };
        assert_eq!(err.field(), "items[2].line_price");
    }
}
