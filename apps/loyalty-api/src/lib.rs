//! # loyalty-api: Loyalty Services for Kasir
//!
//! Checkout with discount-code redemption, tier upgrades, and the
//! token-authenticated facade that wraps every result in an envelope.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Loyalty API                                     │
//! │                                                                         │
//! │  Authorization: Bearer <jwt>                                            │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌────────────────┐   ┌────────────────────────────────────────────┐   │
//! │  │  JwtManager    │   │  LoyaltyApi                                │   │
//! │  │                │──►│                                            │   │
//! │  │ • login        │   │ • place_order ──────► OrderProcessor       │   │
//! │  │ • refresh      │   │ • get_loyalty ──┐                          │   │
//! │  │ • logout       │   │ • codes ────────┼───► LoyaltyService       │   │
//! │  └────────────────┘   │ • upgrade ──────┘                          │   │
//! │                       └─────────────────────┬──────────────────────┘   │
//! │                                             ▼                           │
//! │                                 loyalty-db (SQLite)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables (see [`config`]):
//! - `LOYALTY_DATABASE_PATH` - SQLite file (default: `./loyalty.db`)
//! - `LOYALTY_DB_MAX_CONNECTIONS` - Pool size (default: 5)
//! - `LOYALTY_JWT_SECRET` - Secret for JWT signing (must be non-empty)
//! - `LOYALTY_JWT_ACCESS_LIFETIME_SECS` - Access token lifetime (default: 3600)
//! - `LOYALTY_JWT_REFRESH_LIFETIME_SECS` - Refresh token lifetime (default: 1209600)
//! - `LOYALTY_PAGE_SIZE` - Order history page size (default: 10)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod services;

use tracing_subscriber::EnvFilter;

// Re-exports
pub use api::{Envelope, LoyaltyApi, PlaceOrderRequest};
pub use auth::{Authenticator, JwtManager, RequestContext, TokenPair, UserIdentity};
pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, ServiceError, ServiceResult, StatusCode};
pub use services::{LoyaltyService, OrderProcessor};

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=loyalty_api=trace` - Show trace for this crate only
/// - Default: INFO, with debug for the loyalty crates
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,loyalty_api=debug,loyalty_db=debug,loyalty_core=debug,sqlx=warn")
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
