//! # Loyalty Repository
//!
//! Persistence for loyalty accounts.
//!
//! ## Account Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Loyalty Account Lifecycle                           │
//! │                                                                         │
//! │  1. CREATE (lazily, on first read or first paid order)                 │
//! │     └── get_or_create() → { total_spent: 0, tier: 0, code: None }      │
//! │                                                                         │
//! │  2. ACCRUE                                                             │
//! │     └── update() with total_spent += paid                              │
//! │                                                                         │
//! │  3. UPGRADE (tier strictly rises)                                      │
//! │     └── update() with new tier, percent and a freshly minted code      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `UNIQUE(active_code)` means `update()` fails with
//! [`DbError::UniqueViolation`] on `loyalty_accounts.active_code` when the
//! code is already live on another account.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use loyalty_core::LoyaltyAccount;

/// Column that enforces one live code per account set.
pub const ACTIVE_CODE_COLUMN: &str = "loyalty_accounts.active_code";

const SELECT_ACCOUNT: &str = r#"
    SELECT
        user_id,
        total_spent,
        tier,
        discount_percent,
        active_code,
        created_at,
        updated_at
    FROM loyalty_accounts
"#;

/// Repository for loyalty account operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoyaltyRepository;

impl LoyaltyRepository {
    /// Gets the account for a user.
    pub async fn find_by_user(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> DbResult<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(&format!(
            "{SELECT_ACCOUNT} WHERE user_id = ?1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(account)
    }

    /// Gets the account whose live code is `code`.
    pub async fn find_by_code(
        conn: &mut SqliteConnection,
        code: &str,
    ) -> DbResult<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(&format!(
            "{SELECT_ACCOUNT} WHERE active_code = ?1"
        ))
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(account)
    }

    /// True if any account holds `code` as its live code.
    pub async fn code_exists(conn: &mut SqliteConnection, code: &str) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM loyalty_accounts WHERE active_code = ?1)",
        )
        .bind(code)
        .fetch_one(&mut *conn)
        .await?;

        Ok(exists)
    }

    /// Returns the user's account, creating a zeroed one if absent.
    ///
    /// Safe under concurrent first use: the insert is `ON CONFLICT DO NOTHING`
    /// and the row is re-read afterwards.
    pub async fn get_or_create(
        conn: &mut SqliteConnection,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<LoyaltyAccount> {
        let fresh = LoyaltyAccount::new(user_id, now);

        let inserted = sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (
                user_id, total_spent, tier, discount_percent,
                active_code, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(&fresh.user_id)
        .bind(fresh.total_spent)
        .bind(fresh.tier)
        .bind(fresh.discount_percent)
        .bind(&fresh.active_code)
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if inserted == 1 {
            debug!(user_id = %user_id, "Created loyalty account");
        }

        Self::find_by_user(conn, user_id)
            .await?
            .ok_or_else(|| DbError::not_found("LoyaltyAccount", user_id))
    }

    /// Takes the database write lock for the current transaction.
    ///
    /// A no-op UPDATE on the account row. Statements after it in the same
    /// transaction see the latest committed data and cannot hit a stale
    /// read snapshot when they write. Returns whether the account exists.
    pub async fn lock(conn: &mut SqliteConnection, user_id: &str) -> DbResult<bool> {
        let result =
            sqlx::query("UPDATE loyalty_accounts SET updated_at = updated_at WHERE user_id = ?1")
                .bind(user_id)
                .execute(&mut *conn)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Writes spend, tier, percentage and code for an existing account.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No such user
    /// * `Err(DbError::UniqueViolation)` - Code already live elsewhere
    pub async fn update(conn: &mut SqliteConnection, account: &LoyaltyAccount) -> DbResult<()> {
        debug!(
            user_id = %account.user_id,
            tier = account.tier,
            total_spent = account.total_spent,
            "Updating loyalty account"
        );

        let result = sqlx::query(
            r#"
            UPDATE loyalty_accounts SET
                total_spent = ?2,
                tier = ?3,
                discount_percent = ?4,
                active_code = ?5,
                updated_at = ?6
            WHERE user_id = ?1
            "#,
        )
        .bind(&account.user_id)
        .bind(account.total_spent)
        .bind(account.tier)
        .bind(account.discount_percent)
        .bind(&account.active_code)
        .bind(account.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).with_value(account.active_code.as_deref()))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("LoyaltyAccount", &account.user_id));
        }

        Ok(())
    }

    /// Number of accounts.
    pub async fn count(conn: &mut SqliteConnection) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loyalty_accounts")
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();

        let first = LoyaltyRepository::get_or_create(&mut conn, "user-1", Utc::now())
            .await
            .unwrap();
        assert_eq!(first.total_spent, 0);
        assert_eq!(first.tier, 0);
        assert!(first.active_code.is_none());

        let again = LoyaltyRepository::get_or_create(&mut conn, "user-1", Utc::now())
            .await
            .unwrap();
        assert_eq!(again.created_at, first.created_at);
        assert_eq!(LoyaltyRepository::count(&mut conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lock_reports_existence() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();

        assert!(!LoyaltyRepository::lock(&mut tx, "ghost").await.unwrap());

        let created = LoyaltyRepository::get_or_create(&mut tx, "user-1", Utc::now())
            .await
            .unwrap();
        assert!(LoyaltyRepository::lock(&mut tx, "user-1").await.unwrap());

        let after = LoyaltyRepository::find_by_user(&mut tx, "user-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.updated_at, created.updated_at);
    }

    #[tokio::test]
    async fn test_update_and_find_by_code() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();

        let mut account = LoyaltyRepository::get_or_create(&mut conn, "user-1", Utc::now())
            .await
            .unwrap();
        account.total_spent = 600_000;
        account.tier = 2;
        account.discount_percent = 15;
        account.active_code = Some("DISCOUNT_AAAA1111".to_string());
        LoyaltyRepository::update(&mut conn, &account).await.unwrap();

        let found = LoyaltyRepository::find_by_code(&mut conn, "DISCOUNT_AAAA1111")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, "user-1");
        assert_eq!(found.discount_percent, 15);
        assert!(LoyaltyRepository::code_exists(&mut conn, "DISCOUNT_AAAA1111")
            .await
            .unwrap());
        assert!(!LoyaltyRepository::code_exists(&mut conn, "DISCOUNT_BBBB2222")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_active_code_rejected() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();

        let mut a = LoyaltyRepository::get_or_create(&mut conn, "a", Utc::now())
            .await
            .unwrap();
        let mut b = LoyaltyRepository::get_or_create(&mut conn, "b", Utc::now())
            .await
            .unwrap();

        a.active_code = Some("DISCOUNT_SAME0000".to_string());
        LoyaltyRepository::update(&mut conn, &a).await.unwrap();

        b.active_code = Some("DISCOUNT_SAME0000".to_string());
        let err = LoyaltyRepository::update(&mut conn, &b).await.unwrap_err();
        assert!(err.is_unique_violation_on(ACTIVE_CODE_COLUMN));
    }

    #[tokio::test]
    async fn test_update_missing_account() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();

        let ghost = LoyaltyAccount::new("ghost", Utc::now());
        let err = LoyaltyRepository::update(&mut conn, &ghost).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
