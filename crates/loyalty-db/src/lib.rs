//! # loyalty-db: Database Layer for the Loyalty Backend
//!
//! SQLite storage for loyalty accounts and orders, via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Loyalty Data Flow                                │
//! │                                                                         │
//! │  LoyaltyService / OrderProcessor (loyalty-api)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    loyalty-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ LoyaltyRepo   │    │ 001_initial  │  │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo     │    │   _schema    │  │   │
//! │  │   │ Transactions  │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Loyalty account and order repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loyalty_db::{Database, DbConfig, LoyaltyRepository};
//!
//! let db = Database::new(DbConfig::new("loyalty.db")).await?;
//! let mut conn = db.acquire().await?;
//! let account = LoyaltyRepository::find_by_user(&mut conn, "user-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::loyalty::{LoyaltyRepository, ACTIVE_CODE_COLUMN};
pub use repository::order::{
    generate_order_id, generate_order_item_id, OrderRepository, CONSUMED_CODE_COLUMN,
};
