//! # Loyalty Service
//!
//! Tier re-evaluation, discount code issuance and code validation.
//!
//! ## Upgrade Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reevaluate(account)                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  qualified = tier_for(total_spent)                                     │
//! │       │                                                                 │
//! │       ├── qualified ≤ tier ──► unchanged (tiers never go down)         │
//! │       │                                                                 │
//! │       └── qualified > tier ──► tier, percent = qualified               │
//! │                                active_code = fresh DISCOUNT_XXXXXXXX   │
//! │                                (retry on UNIQUE(active_code))          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods ending in `_in` run on a caller-supplied connection so that the
//! order processor can fold them into its checkout transaction. The others
//! open their own connection or transaction.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use loyalty_core::discount_code::{DiscountCodeGenerator, MAX_ATTEMPTS};
use loyalty_core::validation::{validate_discount_code, validate_identifier, validate_price};
use loyalty_core::{CoreError, LoyaltyAccount, Money, Tier, ValidationError};
use loyalty_db::{Database, DbError, LoyaltyRepository, OrderRepository, ACTIVE_CODE_COLUMN};

use crate::error::{ServiceError, ServiceResult};

/// Whose code, and whose orders, a validation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeScope<'a> {
    /// The code must be this user's live code; consumption is checked among
    /// this user's orders.
    Owner(&'a str),
    /// The code may be any account's live code; consumption is checked
    /// across all orders. The holder's percentage applies.
    Global,
}

/// A code that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeGrant {
    pub code: String,
    pub holder_id: String,
    pub discount_percent: u8,
}

/// Loyalty lifecycle orchestration.
#[derive(Debug)]
pub struct LoyaltyService {
    db: Database,
    generator: Mutex<DiscountCodeGenerator>,
}

impl LoyaltyService {
    pub fn new(db: Database) -> Self {
        LoyaltyService::with_generator(db, DiscountCodeGenerator::new())
    }

    /// Uses the given generator (seeded generators make tests deterministic).
    pub fn with_generator(db: Database, generator: DiscountCodeGenerator) -> Self {
        LoyaltyService {
            db,
            generator: Mutex::new(generator),
        }
    }

    fn next_candidate(&self) -> String {
        self.generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .candidate()
    }

    // =========================================================================
    // Connection-level operations
    // =========================================================================

    /// Fetches the user's account, creating a zeroed one if absent.
    pub async fn get_or_create_in(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> ServiceResult<LoyaltyAccount> {
        validate_identifier("user_id", user_id)?;
        Ok(LoyaltyRepository::get_or_create(conn, user_id, Utc::now()).await?)
    }

    /// Applies a tier upgrade if the spend qualifies for one.
    ///
    /// Only upgrades are written. An upgrade always mints a new code, since
    /// any existing code predates it.
    pub async fn reevaluate_in(
        &self,
        conn: &mut SqliteConnection,
        mut account: LoyaltyAccount,
    ) -> ServiceResult<LoyaltyAccount> {
        let current = account.tier();
        let qualified = account.qualified_tier();

        if qualified <= current {
            debug!(
                user_id = %account.user_id,
                tier = current.level(),
                qualified = qualified.level(),
                "No tier upgrade"
            );
            return Ok(account);
        }

        account.tier = qualified.level() as i64;
        account.discount_percent = qualified.discount_percent() as i64;
        account.updated_at = Utc::now();

        for attempt in 1..=MAX_ATTEMPTS {
            let candidate = self.next_candidate();
            if LoyaltyRepository::code_exists(conn, &candidate).await? {
                debug!(attempt, "Discount code candidate already issued");
                continue;
            }

            account.active_code = Some(candidate);
            match LoyaltyRepository::update(conn, &account).await {
                Ok(()) => {
                    info!(
                        user_id = %account.user_id,
                        from = current.level(),
                        to = qualified.level(),
                        discount_percent = account.discount_percent,
                        "Tier upgraded, new discount code issued"
                    );
                    return Ok(account);
                }
                Err(e) if e.is_unique_violation_on(ACTIVE_CODE_COLUMN) => {
                    warn!(attempt, "Discount code taken concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::CodeSpaceExhausted {
            attempts: MAX_ATTEMPTS,
        }
        .into())
    }

    /// Checks that `code` is live and unconsumed within `scope`.
    pub async fn validate_code_in(
        &self,
        conn: &mut SqliteConnection,
        scope: CodeScope<'_>,
        code: &str,
    ) -> ServiceResult<CodeGrant> {
        let code = validate_discount_code(code)?;

        let holder = match scope {
            CodeScope::Owner(user_id) => LoyaltyRepository::find_by_user(conn, user_id)
                .await?
                .filter(|account| account.holds_code(&code)),
            CodeScope::Global => LoyaltyRepository::find_by_code(conn, &code).await?,
        };

        let holder = match holder {
            Some(account) => account,
            None => {
                debug!(code = %code, ?scope, "Discount code not recognised");
                return Err(CoreError::DiscountCodeInvalid { code }.into());
            }
        };

        let consumed = match scope {
            CodeScope::Owner(user_id) => {
                OrderRepository::is_code_consumed_by(conn, &code, user_id).await?
            }
            CodeScope::Global => OrderRepository::is_code_consumed(conn, &code).await?,
        };

        if consumed {
            return Err(CoreError::DiscountCodeAlreadyUsed { code }.into());
        }

        Ok(CodeGrant {
            code,
            discount_percent: holder.discount_percent(),
            holder_id: holder.user_id,
        })
    }

    /// Adds a paid amount to the user's spend, then re-evaluates the tier.
    pub async fn record_spend_in(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: Money,
    ) -> ServiceResult<LoyaltyAccount> {
        validate_price("amount", amount.units())?;

        let mut account = self.get_or_create_in(conn, user_id).await?;
        if amount.is_positive() {
            let total_spent = account.total_spent().checked_add(amount).ok_or_else(|| {
                ValidationError::TooLarge {
                    field: "total_spent".to_string(),
                }
            })?;
            account.total_spent = total_spent.units();
            account.updated_at = Utc::now();
            LoyaltyRepository::update(conn, &account).await?;
            debug!(user_id = %user_id, amount = %amount, total_spent = account.total_spent, "Spend recorded");
        }

        self.reevaluate_in(conn, account).await
    }

    // =========================================================================
    // Standalone operations
    // =========================================================================

    /// Fetches the user's account, creating a zeroed one if absent.
    pub async fn get_or_create_account(&self, user_id: &str) -> ServiceResult<LoyaltyAccount> {
        let mut conn = self.db.acquire().await?;
        self.get_or_create_in(&mut conn, user_id).await
    }

    /// Account for display: created if absent, upgraded if it qualifies.
    pub async fn get_loyalty(&self, user_id: &str) -> ServiceResult<LoyaltyAccount> {
        let mut tx = self.db.begin().await?;
        let account = self.get_or_create_in(&mut tx, user_id).await?;
        let account = self.reevaluate_in(&mut tx, account).await?;
        commit(tx).await?;
        Ok(account)
    }

    /// Validates a code in the given scope; returns the discount percentage.
    pub async fn validate_code(&self, scope: CodeScope<'_>, code: &str) -> ServiceResult<u8> {
        let mut conn = self.db.acquire().await?;
        let grant = self.validate_code_in(&mut conn, scope, code).await?;
        Ok(grant.discount_percent)
    }

    /// Adds spend outside of checkout (e.g. imported sales).
    pub async fn record_spend(&self, user_id: &str, amount: Money) -> ServiceResult<LoyaltyAccount> {
        let mut tx = self.db.begin().await?;
        let account = self.record_spend_in(&mut tx, user_id, amount).await?;
        commit(tx).await?;
        Ok(account)
    }

    /// Re-evaluates an existing account.
    ///
    /// ## Returns
    /// * `Err(CoreError::AccountNotFound)` - The user has no account yet
    pub async fn upgrade_level(&self, user_id: &str) -> ServiceResult<LoyaltyAccount> {
        let mut tx = self.db.begin().await?;
        let account = locked_account(&mut tx, user_id).await?;
        let account = self.reevaluate_in(&mut tx, account).await?;
        commit(tx).await?;
        Ok(account)
    }

    /// The code the user may see.
    ///
    /// ## Rules
    /// - No account → `AccountNotFound`
    /// - No orders yet → the current code
    /// - Otherwise → the current code only from tier 2 up
    pub async fn get_discount_code(&self, user_id: &str) -> ServiceResult<String> {
        let mut conn = self.db.acquire().await?;

        let account = LoyaltyRepository::find_by_user(&mut conn, user_id)
            .await?
            .ok_or_else(|| CoreError::AccountNotFound(user_id.to_string()))?;
        let order_count = OrderRepository::count_by_cashier(&mut conn, user_id).await?;

        let visible = order_count == 0 || account.tier() >= Tier::from_level(2);

        match account.active_code {
            Some(code) if visible => Ok(code),
            _ => Err(CoreError::NoDiscountCode(user_id.to_string()).into()),
        }
    }

    /// Overwrites a user's live code.
    ///
    /// ## Returns
    /// * `Err(CoreError::Validation)` - Blank/malformed code, or code live on another account
    /// * `Err(CoreError::AccountNotFound)` - No account for the user
    pub async fn assign_code(&self, user_id: &str, code: &str) -> ServiceResult<LoyaltyAccount> {
        let code = validate_discount_code(code)?;
        let duplicate = || ValidationError::Duplicate {
            field: "discount_code".to_string(),
            value: code.clone(),
        };

        let mut tx = self.db.begin().await?;

        let mut account = locked_account(&mut tx, user_id).await?;

        if let Some(holder) = LoyaltyRepository::find_by_code(&mut tx, &code).await? {
            if holder.user_id != account.user_id {
                return Err(duplicate().into());
            }
        }

        account.active_code = Some(code.clone());
        account.updated_at = Utc::now();
        match LoyaltyRepository::update(&mut tx, &account).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation_on(ACTIVE_CODE_COLUMN) => {
                return Err(duplicate().into())
            }
            Err(e) => return Err(e.into()),
        }
        commit(tx).await?;

        info!(user_id = %user_id, "Discount code assigned");
        Ok(account)
    }
}

/// Locks then reads an existing account, for transactions that write later.
async fn locked_account(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> ServiceResult<LoyaltyAccount> {
    let missing = || CoreError::AccountNotFound(user_id.to_string());
    if !LoyaltyRepository::lock(conn, user_id).await? {
        return Err(missing().into());
    }
    Ok(LoyaltyRepository::find_by_user(conn, user_id)
        .await?
        .ok_or_else(missing)?)
}

pub(crate) async fn commit(tx: sqlx::Transaction<'static, sqlx::Sqlite>) -> ServiceResult<()> {
    tx.commit()
        .await
        .map_err(|e| ServiceError::Db(DbError::TransactionFailed(e.to_string())))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use loyalty_core::discount_code::is_well_formed;
    use loyalty_core::{Order, PaymentMethod};
    use loyalty_db::{generate_order_id, DbConfig};

    async fn setup(seed: u64) -> (Database, LoyaltyService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = LoyaltyService::with_generator(db.clone(), DiscountCodeGenerator::with_seed(seed));
        (db, service)
    }

    async fn consume(db: &Database, cashier: &str, code: &str) {
        let now = Utc::now();
        let order = Order {
            id: generate_order_id(),
            cashier_id: cashier.to_string(),
            subtotal: 100_000,
            discount_amount: 15_000,
            total_price: 85_000,
            total_items: 1,
            payment_method: PaymentMethod::Cash,
            discount_code: Some(code.to_string()),
            is_discount_applied: true,
            is_cancelled: false,
            transaction_time: now,
            created_at: now,
        };
        let mut conn = db.acquire().await.unwrap();
        OrderRepository::insert_order(&mut conn, &order).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_account_is_zeroed() {
        let (_db, service) = setup(1).await;
        let account = service.get_or_create_account("user-1").await.unwrap();
        assert_eq!(account.total_spent, 0);
        assert_eq!(account.tier, 0);
        assert_eq!(account.discount_percent, 0);
        assert!(account.active_code.is_none());
    }

    #[tokio::test]
    async fn test_spend_upgrades_and_reissues_code() {
        let (_db, service) = setup(1).await;

        let account = service
            .record_spend("user-1", Money::from_units(600_000))
            .await
            .unwrap();
        assert_eq!(account.tier, 2);
        assert_eq!(account.discount_percent, 15);
        let first_code = account.active_code.clone().unwrap();
        assert!(is_well_formed(&first_code));

        let account = service
            .record_spend("user-1", Money::from_units(3_000_000))
            .await
            .unwrap();
        assert_eq!(account.total_spent, 3_600_000);
        assert_eq!(account.tier, 4);
        assert_eq!(account.discount_percent, 25);
        let second_code = account.active_code.unwrap();
        assert_ne!(first_code, second_code);
    }

    #[tokio::test]
    async fn test_small_spend_keeps_tier_and_code() {
        let (_db, service) = setup(1).await;

        let before = service
            .record_spend("user-1", Money::from_units(600_000))
            .await
            .unwrap();
        let after = service
            .record_spend("user-1", Money::from_units(10_000))
            .await
            .unwrap();

        assert_eq!(after.tier, 2);
        assert_eq!(after.active_code, before.active_code);
    }

    #[tokio::test]
    async fn test_tier_never_decreases() {
        let (db, service) = setup(1).await;

        let mut account = service
            .record_spend("user-1", Money::from_units(1_200_000))
            .await
            .unwrap();
        assert_eq!(account.tier, 3);

        account.total_spent = 0;
        {
            let mut conn = db.acquire().await.unwrap();
            LoyaltyRepository::update(&mut conn, &account).await.unwrap();
        }

        let again = service.upgrade_level("user-1").await.unwrap();
        assert_eq!(again.tier, 3);
        assert_eq!(again.discount_percent, 20);
        assert_eq!(again.active_code, account.active_code);
    }

    #[tokio::test]
    async fn test_upgrade_retries_on_issued_code() {
        let mut preview = DiscountCodeGenerator::with_seed(9);
        let first = preview.candidate();
        let second = preview.candidate();

        let (_db, service) = setup(9).await;
        service.get_or_create_account("other").await.unwrap();
        service.assign_code("other", &first).await.unwrap();

        let account = service
            .record_spend("user-1", Money::from_units(500_000))
            .await
            .unwrap();
        assert_eq!(account.active_code.as_deref(), Some(second.as_str()));
    }

    #[tokio::test]
    async fn test_upgrade_level_requires_account() {
        let (_db, service) = setup(1).await;
        let err = service.upgrade_level("ghost").await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_validate_code_scopes() {
        let (db, service) = setup(3).await;

        let holder = service
            .record_spend("holder", Money::from_units(600_000))
            .await
            .unwrap();
        let code = holder.active_code.unwrap();
        service.get_or_create_account("stranger").await.unwrap();

        assert_eq!(service.validate_code(CodeScope::Owner("holder"), &code).await.unwrap(), 15);
        assert_eq!(service.validate_code(CodeScope::Global, &code).await.unwrap(), 15);

        let err = service
            .validate_code(CodeScope::Owner("stranger"), &code)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::DiscountCodeInvalid { .. })));

        let err = service
            .validate_code(CodeScope::Global, "DISCOUNT_NOPE0000")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::DiscountCodeInvalid { .. })));

        consume(&db, "holder", &code).await;

        let err = service.validate_code(CodeScope::Global, &code).await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::DiscountCodeAlreadyUsed { .. })));
        let err = service
            .validate_code(CodeScope::Owner("holder"), &code)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::DiscountCodeAlreadyUsed { .. })));
    }

    #[tokio::test]
    async fn test_get_discount_code_rules() {
        let (db, service) = setup(5).await;

        let err = service.get_discount_code("ghost").await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::AccountNotFound(_))));

        // Tier 1 with no orders: code visible
        let account = service
            .record_spend("user-1", Money::from_units(150_000))
            .await
            .unwrap();
        let code = account.active_code.unwrap();
        assert_eq!(service.get_discount_code("user-1").await.unwrap(), code);

        // Tier 1 after an order: hidden
        consume(&db, "user-1", "DISCOUNT_OTHER000").await;
        let err = service.get_discount_code("user-1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::NoDiscountCode(_))));

        // Tier 2 after an order: visible again
        let account = service
            .record_spend("user-1", Money::from_units(400_000))
            .await
            .unwrap();
        assert_eq!(account.tier, 2);
        assert_eq!(
            service.get_discount_code("user-1").await.unwrap(),
            account.active_code.unwrap()
        );
    }

    #[tokio::test]
    async fn test_assign_code() {
        let (_db, service) = setup(1).await;

        let err = service.assign_code("ghost", "PROMO2024").await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::AccountNotFound(_))));

        service.get_or_create_account("a").await.unwrap();
        service.get_or_create_account("b").await.unwrap();

        let account = service.assign_code("a", " PROMO2024 ").await.unwrap();
        assert_eq!(account.active_code.as_deref(), Some("PROMO2024"));

        // Re-assigning your own code is fine
        service.assign_code("a", "PROMO2024").await.unwrap();

        let err = service.assign_code("b", "PROMO2024").await.unwrap_err();
        match err {
            ServiceError::Core(CoreError::Validation(errors)) => {
                assert_eq!(errors[0].field(), "discount_code");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = service.assign_code("b", "   ").await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_loyalty_creates_account() {
        let (_db, service) = setup(1).await;
        let account = service.get_loyalty("fresh").await.unwrap();
        assert_eq!(account.user_id, "fresh");
        assert_eq!(account.tier, 0);
    }

    #[tokio::test]
    async fn test_spend_overflow_is_rejected() {
        let (_db, service) = setup(1).await;

        let account = service
            .record_spend("whale", Money::from_units(i64::MAX - 10))
            .await
            .unwrap();
        assert_eq!(account.tier, 5);

        let err = service
            .record_spend("whale", Money::from_units(100))
            .await
            .unwrap_err();
        match err {
            ServiceError::Core(CoreError::Validation(errors)) => {
                assert_eq!(errors[0].field(), "total_spent");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let account = service.get_or_create_account("whale").await.unwrap();
        assert_eq!(account.total_spent, i64::MAX - 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_do_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("loyalty.db")).max_connections(8))
            .await
            .unwrap();
        let service = std::sync::Arc::new(LoyaltyService::with_generator(
            db,
            DiscountCodeGenerator::with_seed(9),
        ));
        service.get_or_create_account("shared").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..4 {
            let svc = service.clone();
            tasks.push(tokio::spawn(async move {
                svc.record_spend("shared", Money::from_units(200_000)).await.map(drop)
            }));
            let svc = service.clone();
            tasks.push(tokio::spawn(async move {
                svc.upgrade_level("shared").await.map(drop)
            }));
            let svc = service.clone();
            tasks.push(tokio::spawn(async move {
                svc.get_loyalty("shared").await.map(drop)
            }));
            let svc = service.clone();
            tasks.push(tokio::spawn(async move {
                let user = format!("user-{i}");
                svc.get_or_create_account(&user).await?;
                svc.assign_code(&user, &format!("PROMO{i}")).await.map(drop)
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let account = service.get_or_create_account("shared").await.unwrap();
        assert_eq!(account.total_spent, 800_000);
        assert_eq!(account.tier, 2);
        assert!(account.active_code.is_some());
    }
}
