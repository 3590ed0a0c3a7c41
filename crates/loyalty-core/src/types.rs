//! # Domain Types
//!
//! Core domain types used throughout the loyalty backend.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │  LoyaltyAccount  │   │      Order       │   │    OrderItem     │    │
//! │  │  ──────────────  │   │  ──────────────  │   │  ──────────────  │    │
//! │  │  user_id (key)   │   │  id (UUID)       │   │  id (UUID)       │    │
//! │  │  total_spent     │   │  cashier_id      │   │  order_id (FK)   │    │
//! │  │  tier            │   │  total_price     │   │  product_id      │    │
//! │  │  discount_%      │   │  discount_code   │   │  quantity        │    │
//! │  │  active_code     │   │  is_disc_applied │   │  line_price      │    │
//! │  └──────────────────┘   └──────────────────┘   └──────────────────┘    │
//! │                                                                         │
//! │  Inputs: NewOrder, NewOrderItem        Outputs: PlacedOrder, Page<T>   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entities are built through typed constructors; there is no field-bag
//! update path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::tier::{tier_for, Tier};

// =============================================================================
// Loyalty Account
// =============================================================================

/// Loyalty state for one user.
///
/// ## Invariants
/// - One account per `user_id`
/// - `total_spent` never decreases through normal operation
/// - `tier` never decreases; `discount_percent` is the tier's percentage
/// - `active_code` is unique across all accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyAccount {
    pub user_id: String,

    /// Cumulative paid amount in currency units.
    pub total_spent: i64,

    /// Loyalty tier level (0–5).
    pub tier: i64,

    /// Discount percentage granted by the tier (0–30).
    pub discount_percent: i64,

    /// The one live discount code, if any.
    pub active_code: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl LoyaltyAccount {
    /// A fresh account: zero spend, tier 0, no code.
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        LoyaltyAccount {
            user_id: user_id.into(),
            total_spent: 0,
            tier: Tier::BASE.level() as i64,
            discount_percent: Tier::BASE.discount_percent() as i64,
            active_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn total_spent(&self) -> Money {
        Money::from_units(self.total_spent)
    }

    #[inline]
    pub fn tier(&self) -> Tier {
        Tier::from_level(self.tier)
    }

    /// Discount percentage as stored.
    #[inline]
    pub fn discount_percent(&self) -> u8 {
        self.discount_percent.clamp(0, 100) as u8
    }

    /// The tier the current spend qualifies for.
    pub fn qualified_tier(&self) -> Tier {
        tier_for(self.total_spent())
    }

    /// Whether `code` is this account's live code.
    pub fn holds_code(&self, code: &str) -> bool {
        self.active_code.as_deref() == Some(code)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How an order was paid.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Cash,
    Qr,
    Transfer,
}

impl PaymentMethod {
    /// Wire names accepted by [`FromStr`].
    pub const ALLOWED: [&'static str; 3] = ["CASH", "QR", "TRANSFER"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Qr => "QR",
            PaymentMethod::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CASH" => Ok(PaymentMethod::Cash),
            "QR" => Ok(PaymentMethod::Qr),
            "TRANSFER" => Ok(PaymentMethod::Transfer),
            _ => Err(ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                allowed: PaymentMethod::ALLOWED.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// A persisted order.
///
/// Immutable after creation apart from `is_cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,

    /// The user who placed the order at the till.
    pub cashier_id: String,

    /// Sum of line prices before discount.
    pub subtotal: i64,

    pub discount_amount: i64,

    /// Amount paid (subtotal minus discount).
    pub total_price: i64,

    /// Sum of line quantities.
    pub total_items: i64,

    pub payment_method: PaymentMethod,

    /// The code supplied at checkout, if any.
    pub discount_code: Option<String>,

    /// True when the code produced a non-zero discount and is now consumed.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "discount_consumed"))]
    pub is_discount_applied: bool,

    pub is_cancelled: bool,

    #[ts(as = "String")]
    pub transaction_time: DateTime<Utc>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_units(self.total_price)
    }
}

/// A persisted order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Line total (not unit price).
    pub line_price: i64,
}

/// An order together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Order Input
// =============================================================================

/// A line of a candidate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub product_id: String,
    pub quantity: i64,
    pub line_price: i64,
}

impl NewOrderItem {
    pub fn new(product_id: impl Into<String>, quantity: i64, line_price: i64) -> Self {
        NewOrderItem {
            product_id: product_id.into(),
            quantity,
            line_price,
        }
    }
}

/// A candidate order as received at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub cashier_id: String,
    pub items: Vec<NewOrderItem>,
    pub payment_method: PaymentMethod,
    pub discount_code: Option<String>,
    /// Defaults to the placement time when absent.
    pub transaction_time: Option<DateTime<Utc>>,
}

impl NewOrder {
    pub fn new(
        cashier_id: impl Into<String>,
        items: Vec<NewOrderItem>,
        payment_method: PaymentMethod,
    ) -> Self {
        NewOrder {
            cashier_id: cashier_id.into(),
            items,
            payment_method,
            discount_code: None,
            transaction_time: None,
        }
    }

    /// Sets the discount code; blank codes count as no code.
    pub fn with_discount_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        let code = code.trim();
        self.discount_code = if code.is_empty() {
            None
        } else {
            Some(code.to_string())
        };
        self
    }

    pub fn with_transaction_time(mut self, at: DateTime<Utc>) -> Self {
        self.transaction_time = Some(at);
        self
    }

    /// Sum of line prices, `None` if it overflows.
    pub fn subtotal(&self) -> Option<Money> {
        self.items.iter().try_fold(Money::zero(), |acc, item| {
            acc.checked_add(Money::from_units(item.line_price))
        })
    }

    /// Sum of quantities.
    pub fn total_items(&self) -> i64 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

// =============================================================================
// Order Output
// =============================================================================

/// Result of a successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Percentage taken off the subtotal (0 when no code).
    pub discount_percent: u8,
    pub discount_amount: i64,
    pub discount_applied: bool,
}

// =============================================================================
// Pagination
// =============================================================================

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Builds a request, clamping page to ≥1 and per_page to 1..=100.
    pub fn new(page: u32, per_page: u32) -> Self {
        PageRequest {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn first(per_page: u32) -> Self {
        PageRequest::new(1, per_page)
    }

    /// Row offset for SQL `OFFSET`.
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::first(crate::DEFAULT_PAGE_SIZE)
    }
}

/// One page of results with its position in the full set.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let per_page = request.per_page as i64;
        let last_page = ((total + per_page - 1) / per_page).max(1) as u32;
        Page {
            items,
            current_page: request.page,
            last_page,
            per_page: request.per_page,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
