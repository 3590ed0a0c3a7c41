//! # loyalty-core: Pure Loyalty Logic
//!
//! This crate holds the loyalty program rules as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Kasir Loyalty Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 loyalty-api (services + facade)                 │   │
//! │  │   LoyaltyApi ──► OrderProcessor ──► LoyaltyService              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ loyalty-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌───────────────┐ ┌────────────┐   │   │
//! │  │   │  tier    │ │  money   │ │ discount_code │ │ validation │   │   │
//! │  │   │ tier_for │ │  Money   │ │  generate     │ │  orders    │   │   │
//! │  │   └──────────┘ └──────────┘ └───────────────┘ └────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  loyalty-db (Database Layer)                    │   │
//! │  │          SQLite queries, migrations, repositories               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`tier`] - Spend thresholds to tier / discount percentage
//! - [`discount_code`] - `DISCOUNT_XXXXXXXX` code generation
//! - [`types`] - Domain types (LoyaltyAccount, Order, OrderItem, ...)
//! - [`money`] - Integer money with percentage discounts
//! - [`validation`] - Order and code input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use loyalty_core::money::Money;
//! use loyalty_core::tier::tier_for;
//!
//! let tier = tier_for(Money::from_units(600_000));
//! assert_eq!(tier.level(), 2);
//! assert_eq!(tier.discount_percent(), 15);
//!
//! let subtotal = Money::from_units(100_000);
//! assert_eq!(subtotal.discount_amount(15).units(), 15_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod discount_code;
pub mod error;
pub mod money;
pub mod tier;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use tier::{tier_for, Tier};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed in a single order.
pub const MAX_ORDER_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Default page size for order history.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
