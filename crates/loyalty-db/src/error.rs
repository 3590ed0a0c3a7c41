//! # Database Error Types
//!
//! ## Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error                                                            │
//! │       │                                                                 │
//! │       ├── RowNotFound ─────────────────────────► NotFound               │
//! │       ├── "UNIQUE constraint failed: t.c" ─────► UniqueViolation {t.c}  │
//! │       │      loyalty_accounts.active_code  → retry code generation      │
//! │       │      orders.discount_code          → code already used          │
//! │       ├── SQLITE_BUSY / BUSY_SNAPSHOT ─────────► Busy                   │
//! │       ├── PoolTimedOut ────────────────────────► PoolTimedOut           │
//! │       └── anything else ───────────────────────► QueryFailed / Internal │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only `NotFound` and the two unique violations carry meaning above this
//! crate. Everything else is a storage fault that callers log and hide.

use thiserror::Error;

/// SQLite result codes for a lock conflict between writers.
const BUSY_CODES: [&str; 4] = ["5", "6", "261", "517"];

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// No row for the requested key.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A unique index rejected the write.
    ///
    /// `column` is `table.column` as SQLite reports it.
    #[error("Duplicate {column}: '{value}' already exists")]
    UniqueViolation { column: String, value: String },

    /// Another writer held the database lock past the busy timeout.
    #[error("Database is busy: {0}")]
    Busy(String),

    /// Could not open the database file.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Embedded migrations could not be applied.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// The statement failed for another database reason.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// BEGIN or COMMIT failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// No pooled connection became free within the acquire timeout.
    #[error("Timed out waiting for a pooled connection")]
    PoolTimedOut,

    /// Driver-level failure (I/O, decoding, protocol).
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True if this is a unique violation on `table.column`.
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_db::DbError;
    ///
    /// let err = DbError::UniqueViolation {
    ///     column: "orders.discount_code".to_string(),
    ///     value: "DISCOUNT_AB12CD34".to_string(),
    /// };
    /// assert!(err.is_unique_violation_on("orders.discount_code"));
    /// assert!(!err.is_unique_violation_on("loyalty_accounts.active_code"));
    /// ```
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { column: c, .. } if c == column)
    }

    /// Fills in the rejected value of a unique violation; other errors pass
    /// through.
    ///
    /// SQLite names the column but not the value, so repositories attach
    /// the code they tried to write.
    pub fn with_value(self, value: Option<&str>) -> Self {
        match self {
            DbError::UniqueViolation { column, .. } => DbError::UniqueViolation {
                column,
                value: value.unwrap_or_default().to_string(),
            },
            other => other,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                if let Some(column) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    return DbError::UniqueViolation {
                        column: column.to_string(),
                        value: String::new(),
                    };
                }

                let busy = db_err
                    .code()
                    .is_some_and(|code| BUSY_CODES.contains(&code.as_ref()));
                if busy || msg.contains("database is locked") {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolTimedOut,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
