//! # Service and API Errors
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Kasir Loyalty                          │
//! │                                                                         │
//! │  LoyaltyApi::place_order(ctx, request)                                 │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Service call → ServiceResult<T>                                 │  │
//! │  │                                                                  │  │
//! │  │  ValidationError ─► CoreError::Validation ──┐                    │  │
//! │  │  Code rules ──────► CoreError::Discount* ───┤                    │  │
//! │  │  SQLite ──────────► DbError ────────────────┼─► ServiceError     │  │
//! │  │  Token ───────────► AuthError ──────────────┘        │           │  │
//! │  │                                                      ▼           │  │
//! │  │                                   ApiError { code, message,      │  │
//! │  │                                              errors[] }          │  │
//! │  └──────────────────────────────────────────────────────┬───────────┘  │
//! │                                                         ▼              │
//! │  Envelope { success: false, status: "CODE_ALREADY_USED", ... }         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Internal details (SQL errors, pool state) are logged with
//! `tracing::error!` and replaced by a generic message before they reach a
//! caller.

use serde::{Deserialize, Serialize};
use tracing::error;

use loyalty_core::{CoreError, ValidationError};
use loyalty_db::DbError;

use crate::auth::AuthError;

// =============================================================================
// Service Error
// =============================================================================

/// Outcome of a failed service call.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Domain rule or input validation failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failure outside checkout.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Missing, expired, revoked or malformed token.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Checkout persistence failed; nothing was committed.
    #[error("Order creation failed: {0}")]
    OrderCreationFailed(String),
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Core(err.into())
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// API Error
// =============================================================================

/// Machine-readable envelope status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    Unauthenticated,
    InvalidInput,
    NotFound,
    CodeInvalid,
    CodeAlreadyUsed,
    OrderCreationFailed,
    Internal,
}

impl StatusCode {
    /// HTTP status a transport adapter should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Unauthenticated => 401,
            StatusCode::InvalidInput => 422,
            StatusCode::NotFound => 404,
            StatusCode::CodeInvalid => 400,
            StatusCode::CodeAlreadyUsed => 409,
            StatusCode::OrderCreationFailed => 500,
            StatusCode::Internal => 500,
        }
    }
}

/// A single field-level validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl From<&ValidationError> for FieldError {
    fn from(err: &ValidationError) -> Self {
        FieldError {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}

/// Error as seen by API callers.
///
/// ## Serialization
/// ```json
/// {
///   "code": "INVALID_INPUT",
///   "message": "Validation failed",
///   "errors": [{ "field": "items[0].quantity", "message": "items[0].quantity must be positive" }]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: StatusCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl ApiError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::NotFound, message)
    }

    pub fn validation(errors: &[ValidationError]) -> Self {
        ApiError {
            code: StatusCode::InvalidInput,
            message: "Validation failed".to_string(),
            errors: errors.iter().map(FieldError::from).collect(),
        }
    }

    pub fn internal() -> Self {
        ApiError::new(StatusCode::Internal, "An internal error occurred")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(errors) => ApiError::validation(&errors),
            CoreError::AccountNotFound(_) => ApiError::not_found("Loyalty data not found"),
            CoreError::OrderNotFound(id) => ApiError::not_found(format!("Order not found: {}", id)),
            CoreError::NoDiscountCode(_) => ApiError::not_found("No discount code available"),
            CoreError::DiscountCodeInvalid { .. } => {
                ApiError::new(StatusCode::CodeInvalid, "Discount code is not valid")
            }
            CoreError::DiscountCodeAlreadyUsed { .. } => ApiError::new(
                StatusCode::CodeAlreadyUsed,
                "Discount code has already been used",
            ),
            CoreError::CodeSpaceExhausted { attempts } => {
                error!(attempts, "Discount code generation exhausted");
                ApiError::internal()
            }
        }
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => {
                ApiError::not_found(format!("{} not found: {}", entity, id))
            }
            other => {
                // Log the actual error but return a generic message
                error!(error = %other, "Database operation failed");
                ApiError::internal()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(e) => {
                error!(error = %e, "Token signing failed");
                ApiError::internal()
            }
            AuthError::MissingToken => {
                ApiError::new(StatusCode::Unauthenticated, "Token not provided")
            }
            AuthError::Expired => ApiError::new(StatusCode::Unauthenticated, "Token has expired"),
            AuthError::Revoked | AuthError::WrongTokenType { .. } | AuthError::Invalid(_) => {
                ApiError::new(StatusCode::Unauthenticated, "Token is not valid")
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Core(e) => e.into(),
            ServiceError::Db(e) => e.into(),
            ServiceError::Auth(e) => e.into(),
            ServiceError::OrderCreationFailed(reason) => {
                error!(reason = %reason, "Order creation failed");
                ApiError::new(StatusCode::OrderCreationFailed, "Failed to create order")
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
