//! Service layer.
//!
//! - [`loyalty`] - Tier upgrades, code issuance and validation
//! - [`order`] - Checkout, order history, cancellation

pub mod loyalty;
pub mod order;

pub use loyalty::{CodeGrant, CodeScope, LoyaltyService};
pub use order::OrderProcessor;
