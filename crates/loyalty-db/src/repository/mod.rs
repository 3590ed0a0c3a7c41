//! # Repository Module
//!
//! SQL for the loyalty backend, one repository per aggregate.
//!
//! ## Connection Passing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service                                                               │
//! │       │  let mut tx = db.begin().await?;                               │
//! │       ▼                                                                 │
//! │  LoyaltyRepository::get_or_create(&mut tx, ..)                         │
//! │  OrderRepository::insert_order(&mut tx, ..)                            │
//! │  LoyaltyRepository::update(&mut tx, ..)                                │
//! │       │                                                                 │
//! │       ▼  tx.commit() or drop → rollback                                │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method takes `&mut SqliteConnection`. A pooled connection and a
//! transaction both deref to one, so the same SQL serves reads outside a
//! transaction and writes inside it.
//!
//! ## Available Repositories
//!
//! - [`LoyaltyRepository`] - Loyalty accounts and live codes
//! - [`OrderRepository`] - Orders, items and consumed codes

pub mod loyalty;
pub mod order;

pub use loyalty::LoyaltyRepository;
pub use order::OrderRepository;
