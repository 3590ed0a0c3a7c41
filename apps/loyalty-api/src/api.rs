//! # API Facade
//!
//! Transport-facing operations. Each returns an [`Envelope`], never an
//! `Err`, so any transport (HTTP, IPC) can serialize the result as is.
//!
//! ## Operations
//! ```text
//! ┌──────────────────────────┬───────────────────────────────────────────┐
//! │ Operation                │ Acts on                                   │
//! ├──────────────────────────┼───────────────────────────────────────────┤
//! │ login / refresh / logout │ tokens                                    │
//! │ get_loyalty              │ caller's account (created if absent)      │
//! │ validate_discount_code   │ caller's own code                         │
//! │ place_order              │ caller as cashier, any live code          │
//! │ get_discount_code        │ caller's code, if visible                 │
//! │ update_discount_code     │ caller's code                             │
//! │ store_discount_code      │ any user's code                           │
//! │ upgrade_level            │ caller's account                          │
//! │ orders_by_cashier        │ a cashier's order history                 │
//! │ cancel_order             │ one order                                 │
//! └──────────────────────────┴───────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use loyalty_core::validation::validate_new_order;
use loyalty_core::{
    LoyaltyAccount, NewOrder, NewOrderItem, Order, OrderWithItems, Page, PaymentMethod,
    PlacedOrder, ValidationError,
};
use loyalty_db::{Database, DbResult};

use crate::auth::{Authenticator, JwtManager, LogoutOutcome, RequestContext, TokenPair, UserIdentity};
use crate::config::ApiConfig;
use crate::error::{ApiError, FieldError, ServiceResult, StatusCode};
use crate::services::{CodeScope, LoyaltyService, OrderProcessor};

// =============================================================================
// Envelope
// =============================================================================

/// Uniform response wrapper.
///
/// ```json
/// { "success": true, "status": "OK", "message": "Order created", "data": { ... } }
/// { "success": false, "status": "CODE_ALREADY_USED", "message": "Discount code has already been used" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    pub status: StatusCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Envelope {
            success: true,
            status: StatusCode::Ok,
            message: message.into(),
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn fail(err: ApiError) -> Self {
        Envelope {
            success: false,
            status: err.code,
            message: err.message,
            data: None,
            errors: err.errors,
        }
    }

    fn from_result(result: ServiceResult<T>, message: &str) -> Self {
        match result {
            Ok(data) => Envelope::ok(message, data),
            Err(e) => Envelope::fail(e.into()),
        }
    }
}

impl<T> From<ApiError> for Envelope<T> {
    fn from(err: ApiError) -> Self {
        Envelope::fail(err)
    }
}

// =============================================================================
// Requests / Responses
// =============================================================================

/// Checkout request as it arrives from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub items: Vec<NewOrderItem>,
    pub payment_method: String,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub transaction_time: Option<DateTime<Utc>>,
}

impl PlaceOrderRequest {
    /// Builds the typed order for `cashier_id`, collecting every field error.
    pub fn into_new_order(self, cashier_id: &str) -> Result<NewOrder, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let payment_method = match self.payment_method.parse::<PaymentMethod>() {
            Ok(method) => Some(method),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let mut order = NewOrder::new(
            cashier_id,
            self.items,
            payment_method.unwrap_or(PaymentMethod::Cash),
        );
        if let Some(code) = self.discount_code {
            order = order.with_discount_code(code);
        }
        if let Some(at) = self.transaction_time {
            order = order.with_transaction_time(at);
        }

        if let Err(item_errors) = validate_new_order(&order) {
            errors.extend(item_errors);
        }

        if errors.is_empty() {
            Ok(order)
        } else {
            Err(errors)
        }
    }
}

/// Result of validating one's own code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountValidation {
    pub discount_code: String,
    pub discount_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeView {
    pub discount_code: String,
}

/// Tier state after an upgrade check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelView {
    pub level: i64,
    pub discount: i64,
    pub discount_code: Option<String>,
}

impl From<LoyaltyAccount> for LevelView {
    fn from(account: LoyaltyAccount) -> Self {
        LevelView {
            level: account.tier,
            discount: account.discount_percent,
            discount_code: account.active_code,
        }
    }
}

// =============================================================================
// Facade
// =============================================================================

/// Entry point for transports.
#[derive(Debug, Clone)]
pub struct LoyaltyApi {
    jwt: Arc<JwtManager>,
    loyalty: Arc<LoyaltyService>,
    orders: OrderProcessor,
}

impl LoyaltyApi {
    /// Wires services over an open database.
    pub fn new(db: Database, config: &ApiConfig) -> Self {
        let loyalty = Arc::new(LoyaltyService::new(db.clone()));
        LoyaltyApi::from_parts(
            Arc::new(JwtManager::from_config(config)),
            loyalty.clone(),
            OrderProcessor::new(db, loyalty, config.page_size),
        )
    }

    pub fn from_parts(jwt: Arc<JwtManager>, loyalty: Arc<LoyaltyService>, orders: OrderProcessor) -> Self {
        LoyaltyApi { jwt, loyalty, orders }
    }

    /// Opens the configured database (running migrations) and wires services.
    pub async fn connect(config: &ApiConfig) -> DbResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Ok(LoyaltyApi::new(db, config))
    }

    /// Resolves an `Authorization` header value to a request context.
    pub fn authenticate(&self, authorization: &str) -> Result<RequestContext, ApiError> {
        self.jwt.authenticate(authorization).map_err(ApiError::from)
    }

    // -------------------------------------------------------------------------
    // Tokens
    // -------------------------------------------------------------------------

    /// Issues tokens for an identity whose credentials were checked upstream.
    pub fn login(&self, identity: UserIdentity) -> Envelope<TokenPair> {
        match self.jwt.issue_tokens(&identity) {
            Ok(pair) => Envelope::ok("Login successful", pair),
            Err(e) => ApiError::from(e).into(),
        }
    }

    pub fn refresh(&self, refresh_token: &str) -> Envelope<TokenPair> {
        match self.jwt.refresh(refresh_token) {
            Ok(pair) => Envelope::ok("Token refreshed", pair),
            Err(e) => ApiError::from(e).into(),
        }
    }

    pub fn logout(&self, authorization: &str) -> Envelope<()> {
        let token = crate::auth::extract_bearer_token(authorization).unwrap_or(authorization);
        match self.jwt.logout(token) {
            Ok(LogoutOutcome::Revoked) => Envelope::ok("Logout successful", ()),
            Ok(LogoutOutcome::AlreadyExpired) => {
                Envelope::ok("Logout successful, token had already expired", ())
            }
            Err(e) => ApiError::from(e).into(),
        }
    }

    // -------------------------------------------------------------------------
    // Loyalty
    // -------------------------------------------------------------------------

    pub async fn get_loyalty(&self, ctx: &RequestContext) -> Envelope<LoyaltyAccount> {
        debug!(user_id = %ctx.user_id(), "get_loyalty");
        Envelope::from_result(self.loyalty.get_loyalty(ctx.user_id()).await, "Loyalty data")
    }

    /// Checks the caller's own live code.
    ///
    /// Consumption is owner-scoped: only orders placed by the caller count.
    /// A code redeemed at another cashier's checkout still reports as valid
    /// here; `place_order` checks consumption across all orders and rejects
    /// it there.
    pub async fn validate_discount_code(
        &self,
        ctx: &RequestContext,
        code: &str,
    ) -> Envelope<DiscountValidation> {
        debug!(user_id = %ctx.user_id(), "validate_discount_code");
        let result = self
            .loyalty
            .validate_code(CodeScope::Owner(ctx.user_id()), code)
            .await
            .map(|discount_percent| DiscountValidation {
                discount_code: code.trim().to_string(),
                discount_percent,
            });
        Envelope::from_result(result, "Discount code is valid")
    }

    pub async fn get_discount_code(&self, ctx: &RequestContext) -> Envelope<DiscountCodeView> {
        let result = self
            .loyalty
            .get_discount_code(ctx.user_id())
            .await
            .map(|discount_code| DiscountCodeView { discount_code });
        Envelope::from_result(result, "Discount code")
    }

    /// Overwrites the caller's own code.
    pub async fn update_discount_code(
        &self,
        ctx: &RequestContext,
        code: &str,
    ) -> Envelope<LoyaltyAccount> {
        Envelope::from_result(
            self.loyalty.assign_code(ctx.user_id(), code).await,
            "Discount code updated successfully",
        )
    }

    /// Overwrites another user's code.
    pub async fn store_discount_code(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        code: &str,
    ) -> Envelope<LoyaltyAccount> {
        debug!(by = %ctx.user_id(), user_id = %user_id, "store_discount_code");
        Envelope::from_result(
            self.loyalty.assign_code(user_id, code).await,
            "Discount code saved successfully",
        )
    }

    pub async fn upgrade_level(&self, ctx: &RequestContext) -> Envelope<LevelView> {
        let result = self.loyalty.upgrade_level(ctx.user_id()).await.map(LevelView::from);
        Envelope::from_result(result, "Level upgraded and discount code updated")
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    pub async fn place_order(
        &self,
        ctx: &RequestContext,
        request: PlaceOrderRequest,
    ) -> Envelope<PlacedOrder> {
        let order = match request.into_new_order(ctx.user_id()) {
            Ok(order) => order,
            Err(errors) => return ApiError::validation(&errors).into(),
        };
        Envelope::from_result(self.orders.place_order(order).await, "Order created")
    }

    pub async fn orders_by_cashier(
        &self,
        ctx: &RequestContext,
        cashier_id: &str,
        page: Option<u32>,
    ) -> Envelope<Page<OrderWithItems>> {
        debug!(user_id = %ctx.user_id(), cashier_id = %cashier_id, ?page, "orders_by_cashier");
        Envelope::from_result(
            self.orders.orders_by_cashier(cashier_id, page.unwrap_or(1)).await,
            "Order history",
        )
    }

    pub async fn cancel_order(&self, ctx: &RequestContext, order_id: &str) -> Envelope<Order> {
        debug!(user_id = %ctx.user_id(), order_id = %order_id, "cancel_order");
        Envelope::from_result(self.orders.cancel_order(order_id).await, "Order cancelled")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
