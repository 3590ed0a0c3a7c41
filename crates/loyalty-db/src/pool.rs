//! # Database Pool
//!
//! One SQLite file shared by every till, opened in WAL mode.
//!
//! ## Concurrency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SqlitePool (max_connections)                                           │
//! │                                                                         │
//! │  checkout A ── BEGIN ── INSERT account ─┐ write lock held              │
//! │  checkout B ── BEGIN ── INSERT account ─┼─ waits (busy_timeout) ──┐    │
//! │                                         │                         │    │
//! │  A: validate code, insert order, COMMIT ┘                         │    │
//! │  B: sees A's order ──► code already used ◄────────────────────────┘    │
//! │                                                                         │
//! │  Readers (history, code lookup) never wait on the writer.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A transaction that writes must write first. SQLite cannot upgrade a read
//! snapshot that another writer has moved past; it fails with
//! `SQLITE_BUSY_SNAPSHOT` instead of waiting.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;

// =============================================================================
// Configuration
// =============================================================================

/// Pool settings.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/kasir/loyalty.db").max_connections(8);
/// let db = Database::new(config).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Default: 5
    pub max_connections: u32,

    /// How long a writer waits for the lock before failing with `Busy`.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// How long a caller waits for a free pooled connection.
    /// Default: 30 seconds
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// File-backed configuration. The file is created if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Private in-memory database for tests.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool is
    /// pinned to one connection that never idles out.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared database handle.
///
/// Repositories are stateless: every method takes the connection it runs
/// on, so the caller decides whether a call joins a transaction.
///
/// ## Usage
/// ```rust,ignore
/// let mut tx = db.begin().await?;
/// let account = LoyaltyRepository::get_or_create(&mut tx, "user-1", Utc::now()).await?;
/// OrderRepository::insert_order(&mut tx, &order).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and applies embedded migrations.
    ///
    /// Connections run with WAL journaling, `synchronous = NORMAL`, foreign
    /// keys on and the configured busy timeout.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Opening loyalty database"
        );

        let connect_options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        migrations::run_migrations(&pool).await?;

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checks out a single pooled connection.
    pub async fn acquire(&self) -> DbResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Begins a transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
        assert!(total > 0);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/loyalty.db")
            .max_connections(10)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        {
            let mut tx = db.begin().await.unwrap();
            sqlx::query(
                "INSERT INTO loyalty_accounts (user_id, created_at, updated_at) VALUES ('u', 'x', 'x')",
            )
            .execute(&mut *tx)
            .await
            .unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loyalty_accounts")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
