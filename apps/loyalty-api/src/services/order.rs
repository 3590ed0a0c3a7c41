//! # Order Processor
//!
//! Checkout with discount redemption, plus order history and cancellation.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       place_order(NewOrder)                             │
//! │                                                                         │
//! │  1. validate_new_order ───────── InvalidInput (all field errors)       │
//! │                                                                         │
//! │  ┌─────────────────────── one transaction ──────────────────────────┐  │
//! │  │ 2. cashier account (takes the write lock)                        │  │
//! │  │ 3. code? validate_code_in(Global) ── CodeInvalid / AlreadyUsed   │  │
//! │  │ 4. discount = subtotal × percent (half-up)                       │  │
//! │  │ 5. INSERT order ── UNIQUE(consumed code) ── CodeAlreadyUsed      │  │
//! │  │ 6. INSERT items                                                  │  │
//! │  │ 7. record_spend_in(cashier, total)                               │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │  COMMIT ── any storage failure in 2–7 ── OrderCreationFailed           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error drops the transaction, so a failed checkout leaves no order,
//! no items and no loyalty change behind.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use loyalty_core::validation::validate_new_order;
use loyalty_core::{
    CoreError, NewOrder, Order, OrderItem, OrderWithItems, Page, PageRequest, PlacedOrder,
    ValidationError,
};
use loyalty_db::{
    generate_order_id, generate_order_item_id, Database, DbError, OrderRepository,
    CONSUMED_CODE_COLUMN,
};

use crate::error::{ServiceError, ServiceResult};
use crate::services::loyalty::{commit, CodeScope, LoyaltyService};

/// Storage failures during checkout become `OrderCreationFailed`, logged
/// with the cashier and the order payload; rule failures pass through
/// untouched.
fn checkout_failure(order: &NewOrder, err: ServiceError) -> ServiceError {
    match err {
        ServiceError::Db(e) => {
            error!(
                cashier_id = %order.cashier_id,
                payload = ?order,
                error = %e,
                "Order creation failed"
            );
            ServiceError::OrderCreationFailed(e.to_string())
        }
        other => other,
    }
}

/// Places orders and reads order history.
#[derive(Debug, Clone)]
pub struct OrderProcessor {
    db: Database,
    loyalty: Arc<LoyaltyService>,
    page_size: u32,
}

impl OrderProcessor {
    pub fn new(db: Database, loyalty: Arc<LoyaltyService>, page_size: u32) -> Self {
        OrderProcessor {
            db,
            loyalty,
            page_size,
        }
    }

    /// Places an order, redeeming its discount code if any.
    ///
    /// ## Returns
    /// * `Err(CoreError::Validation)` - Bad items or code format
    /// * `Err(CoreError::DiscountCodeInvalid)` - Code is not live on any account
    /// * `Err(CoreError::DiscountCodeAlreadyUsed)` - Code already consumed
    /// * `Err(ServiceError::OrderCreationFailed)` - Storage failure, rolled back
    pub async fn place_order(&self, order: NewOrder) -> ServiceResult<PlacedOrder> {
        validate_new_order(&order).map_err(CoreError::Validation)?;
        let subtotal = order.subtotal().ok_or_else(|| ValidationError::TooLarge {
            field: "items".to_string(),
        })?;

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| checkout_failure(&order, e.into()))?;
        let now = Utc::now();

        // First statement is a write so concurrent checkouts queue here
        // instead of failing on a stale read snapshot later.
        self.loyalty
            .get_or_create_in(&mut tx, &order.cashier_id)
            .await
            .map_err(|e| checkout_failure(&order, e))?;

        let grant = match &order.discount_code {
            Some(code) => Some(
                self.loyalty
                    .validate_code_in(&mut tx, CodeScope::Global, code)
                    .await
                    .map_err(|e| checkout_failure(&order, e))?,
            ),
            None => None,
        };

        let discount_percent = grant.as_ref().map_or(0, |g| g.discount_percent);
        let discount = subtotal.discount_amount(discount_percent);
        let total = subtotal - discount;

        let record = Order {
            id: generate_order_id(),
            cashier_id: order.cashier_id.clone(),
            subtotal: subtotal.units(),
            discount_amount: discount.units(),
            total_price: total.units(),
            total_items: order.total_items(),
            payment_method: order.payment_method,
            discount_code: grant
                .as_ref()
                .map(|g| g.code.clone())
                .or_else(|| order.discount_code.clone()),
            // A 0% code leaves the code live
            is_discount_applied: discount.is_positive(),
            is_cancelled: false,
            transaction_time: order.transaction_time.unwrap_or(now),
            created_at: now,
        };

        OrderRepository::insert_order(&mut tx, &record)
            .await
            .map_err(|e| match e {
                e if e.is_unique_violation_on(CONSUMED_CODE_COLUMN) => {
                    warn!(code = ?record.discount_code, "Discount code consumed concurrently");
                    ServiceError::Core(CoreError::DiscountCodeAlreadyUsed {
                        code: record.discount_code.clone().unwrap_or_default(),
                    })
                }
                e => checkout_failure(&order, e.into()),
            })?;

        let mut items = Vec::with_capacity(order.items.len());
        for line in &order.items {
            let item = OrderItem {
                id: generate_order_item_id(),
                order_id: record.id.clone(),
                product_id: line.product_id.trim().to_string(),
                quantity: line.quantity,
                line_price: line.line_price,
            };
            OrderRepository::insert_item(&mut tx, &item)
                .await
                .map_err(|e| checkout_failure(&order, e.into()))?;
            items.push(item);
        }

        self.loyalty
            .record_spend_in(&mut tx, &record.cashier_id, total)
            .await
            .map_err(|e| checkout_failure(&order, e))?;

        commit(tx).await.map_err(|e| checkout_failure(&order, e))?;

        info!(
            order_id = %record.id,
            cashier_id = %record.cashier_id,
            subtotal = record.subtotal,
            discount_percent,
            total_price = record.total_price,
            discount_applied = record.is_discount_applied,
            "Order placed"
        );

        Ok(PlacedOrder {
            discount_percent,
            discount_amount: record.discount_amount,
            discount_applied: record.is_discount_applied,
            order: record,
            items,
        })
    }

    /// A page of the cashier's orders, newest transaction first.
    ///
    /// An empty page (no orders, or past the last page) is `NotFound`.
    pub async fn orders_by_cashier(
        &self,
        cashier_id: &str,
        page: u32,
    ) -> ServiceResult<Page<OrderWithItems>> {
        let request = PageRequest::new(page, self.page_size);
        let mut conn = self.db.acquire().await?;

        let total = OrderRepository::count_by_cashier(&mut conn, cashier_id).await?;
        let orders = OrderRepository::list_by_cashier(&mut conn, cashier_id, request).await?;

        if orders.is_empty() {
            return Err(DbError::not_found(
                "Orders",
                format!("cashier {}, page {}", cashier_id, request.page),
            )
            .into());
        }

        let mut rows = Vec::with_capacity(orders.len());
        for order in orders {
            let items = OrderRepository::items_for(&mut conn, &order.id).await?;
            rows.push(OrderWithItems { order, items });
        }

        Ok(Page::new(rows, request, total))
    }

    /// Flags an order as cancelled.
    ///
    /// Loyalty is not rolled back and a consumed code stays consumed.
    ///
    /// ## Returns
    /// * `Err(CoreError::OrderNotFound)` - Missing or already cancelled
    pub async fn cancel_order(&self, order_id: &str) -> ServiceResult<Order> {
        let mut conn = self.db.acquire().await?;

        let cancelled = match OrderRepository::cancel(&mut conn, order_id).await {
            Ok(cancelled) => cancelled,
            Err(DbError::NotFound { .. }) => false,
            Err(e) => return Err(e.into()),
        };

        if !cancelled {
            return Err(CoreError::OrderNotFound(order_id.to_string()).into());
        }

        let order = OrderRepository::get_by_id(&mut conn, order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;

        info!(order_id = %order_id, "Order cancelled");
        Ok(order)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use loyalty_core::discount_code::DiscountCodeGenerator;
    use loyalty_core::{Money, NewOrderItem, PaymentMethod};
    use loyalty_db::{DbConfig, LoyaltyRepository};

    struct Fixture {
        db: Database,
        loyalty: Arc<LoyaltyService>,
        orders: OrderProcessor,
    }

    async fn setup() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let loyalty = Arc::new(LoyaltyService::with_generator(
            db.clone(),
            DiscountCodeGenerator::with_seed(11),
        ));
        let orders = OrderProcessor::new(db.clone(), loyalty.clone(), 10);
        Fixture { db, loyalty, orders }
    }

    fn order_of(cashier: &str, amount: i64) -> NewOrder {
        NewOrder::new(
            cashier,
            vec![NewOrderItem::new("p-1", 1, amount)],
            PaymentMethod::Cash,
        )
    }

    /// A tier-2 account holding a 15% code.
    async fn holder_code(fx: &Fixture, user: &str) -> String {
        fx.loyalty
            .record_spend(user, Money::from_units(600_000))
            .await
            .unwrap()
            .active_code
            .unwrap()
    }

    async fn order_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_order_without_code() {
        let fx = setup().await;

        let placed = fx
            .orders
            .place_order(NewOrder::new(
                "cashier-1",
                vec![
                    NewOrderItem::new("p-1", 2, 40_000),
                    NewOrderItem::new("p-2", 1, 60_000),
                ],
                PaymentMethod::Qr,
            ))
            .await
            .unwrap();

        assert_eq!(placed.order.subtotal, 100_000);
        assert_eq!(placed.order.total_price, 100_000);
        assert_eq!(placed.order.total_items, 3);
        assert_eq!(placed.discount_percent, 0);
        assert!(!placed.discount_applied);
        assert_eq!(placed.items.len(), 2);

        let account = fx.loyalty.get_or_create_account("cashier-1").await.unwrap();
        assert_eq!(account.total_spent, 100_000);
        assert_eq!(account.tier, 1);
    }

    #[tokio::test]
    async fn test_code_applies_once() {
        let fx = setup().await;
        let code = holder_code(&fx, "member").await;

        let placed = fx
            .orders
            .place_order(order_of("member", 100_000).with_discount_code(code.clone()))
            .await
            .unwrap();
        assert_eq!(placed.discount_percent, 15);
        assert_eq!(placed.discount_amount, 15_000);
        assert_eq!(placed.order.total_price, 85_000);
        assert!(placed.order.is_discount_applied);
        assert_eq!(placed.order.discount_code.as_deref(), Some(code.as_str()));

        let before = order_count(&fx.db).await;
        let err = fx
            .orders
            .place_order(order_of("member", 50_000).with_discount_code(code))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::DiscountCodeAlreadyUsed { .. })));
        assert_eq!(order_count(&fx.db).await, before);
    }

    #[tokio::test]
    async fn test_holder_percentage_applies_to_other_cashier() {
        let fx = setup().await;
        let code = holder_code(&fx, "member").await;

        let placed = fx
            .orders
            .place_order(order_of("cashier-2", 200_000).with_discount_code(code))
            .await
            .unwrap();
        assert_eq!(placed.order.total_price, 170_000);
        assert_eq!(placed.order.cashier_id, "cashier-2");

        // Spend accrues to the placing cashier
        let cashier = fx.loyalty.get_or_create_account("cashier-2").await.unwrap();
        assert_eq!(cashier.total_spent, 170_000);
    }

    #[tokio::test]
    async fn test_unknown_code_changes_nothing() {
        let fx = setup().await;
        fx.loyalty.get_or_create_account("cashier-1").await.unwrap();

        let err = fx
            .orders
            .place_order(order_of("cashier-1", 900_000).with_discount_code("DISCOUNT_UNKNOWN1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::DiscountCodeInvalid { .. })));

        assert_eq!(order_count(&fx.db).await, 0);
        let account = fx.loyalty.get_or_create_account("cashier-1").await.unwrap();
        assert_eq!(account.total_spent, 0);
        assert_eq!(account.tier, 0);
    }

    #[tokio::test]
    async fn test_zero_percent_code_is_not_consumed() {
        let fx = setup().await;
        let code = fx
            .loyalty
            .record_spend("tier1", Money::from_units(150_000))
            .await
            .unwrap()
            .active_code
            .unwrap();

        for _ in 0..2 {
            let placed = fx
                .orders
                .place_order(order_of("tier1", 10_000).with_discount_code(code.clone()))
                .await
                .unwrap();
            assert!(!placed.discount_applied);
            assert_eq!(placed.order.total_price, 10_000);
        }
    }

    #[tokio::test]
    async fn test_checkout_upgrades_tier() {
        let fx = setup().await;

        let placed = fx
            .orders
            .place_order(order_of("cashier-1", 600_000))
            .await
            .unwrap();
        assert_eq!(placed.order.total_price, 600_000);

        let account = fx.loyalty.get_or_create_account("cashier-1").await.unwrap();
        assert_eq!(account.tier, 2);
        assert_eq!(account.discount_percent, 15);
        assert!(account.active_code.is_some());
    }

    #[tokio::test]
    async fn test_invalid_items_collect_errors() {
        let fx = setup().await;

        let err = fx
            .orders
            .place_order(NewOrder::new(
                "cashier-1",
                vec![NewOrderItem::new("p-1", 0, 10_000), NewOrderItem::new("p-2", 1, -5)],
                PaymentMethod::Cash,
            ))
            .await
            .unwrap_err();

        match err {
            ServiceError::Core(CoreError::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field()).collect();
                assert_eq!(fields, vec!["items[0].quantity", "items[1].line_price"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(order_count(&fx.db).await, 0);
    }

    #[tokio::test]
    async fn test_overflowing_subtotal_is_rejected() {
        let fx = setup().await;

        let err = fx
            .orders
            .place_order(NewOrder::new(
                "cashier-1",
                vec![NewOrderItem::new("p-1", 1, i64::MAX), NewOrderItem::new("p-2", 1, 1)],
                PaymentMethod::Cash,
            ))
            .await
            .unwrap_err();

        match err {
            ServiceError::Core(CoreError::Validation(errors)) => {
                assert_eq!(errors[0].field(), "items");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(order_count(&fx.db).await, 0);
    }

    #[test]
    fn test_checkout_failure_logs_cashier_and_payload() {
        #[derive(Clone, Default)]
        struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

        impl std::io::Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let logs = Captured::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();

        let order = order_of("cashier-9", 5_000).with_discount_code("DISCOUNT_AB12CD34");
        let (storage, rule) = tracing::subscriber::with_default(subscriber, || {
            let storage = checkout_failure(
                &order,
                ServiceError::Db(DbError::Busy("database is locked".to_string())),
            );
            let rule = checkout_failure(
                &order,
                CoreError::DiscountCodeInvalid {
                    code: "DISCOUNT_AB12CD34".to_string(),
                }
                .into(),
            );
            (storage, rule)
        });

        assert!(matches!(storage, ServiceError::OrderCreationFailed(_)));
        assert!(matches!(rule, ServiceError::Core(CoreError::DiscountCodeInvalid { .. })));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("Order creation failed").count(), 1);
        assert!(output.contains("cashier-9"));
        assert!(output.contains("DISCOUNT_AB12CD34"));
        assert!(output.contains("database is locked"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_consume_code_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("loyalty.db")).max_connections(8))
            .await
            .unwrap();
        let loyalty = Arc::new(LoyaltyService::with_generator(
            db.clone(),
            DiscountCodeGenerator::with_seed(5),
        ));
        let orders = OrderProcessor::new(db.clone(), loyalty.clone(), 10);
        let code = loyalty
            .record_spend("member", Money::from_units(600_000))
            .await
            .unwrap()
            .active_code
            .unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let orders = orders.clone();
                let order = order_of(&format!("cashier-{i}"), 100_000).with_discount_code(code.clone());
                tokio::spawn(async move { orders.place_order(order).await })
            })
            .collect();

        let (mut placed, mut used) = (0, 0);
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => placed += 1,
                Err(ServiceError::Core(CoreError::DiscountCodeAlreadyUsed { .. })) => used += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(placed, 1);
        assert_eq!(used, 7);

        let consumed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE discount_consumed = 1")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(order_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_orders_by_cashier_pages() {
        let fx = setup().await;
        let start = Utc::now() - Duration::hours(1);

        for i in 0..12 {
            fx.orders
                .place_order(
                    order_of("cashier-1", 1_000 + i)
                        .with_transaction_time(start + Duration::minutes(i)),
                )
                .await
                .unwrap();
        }

        let page = fx.orders.orders_by_cashier("cashier-1", 1).await.unwrap();
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.total, 12);
        assert_eq!(page.last_page, 2);
        assert_eq!(page.items[0].order.subtotal, 1_011);
        assert_eq!(page.items[0].items.len(), 1);

        let page = fx.orders.orders_by_cashier("cashier-1", 2).await.unwrap();
        assert_eq!(page.items.len(), 2);

        let err = fx.orders.orders_by_cashier("cashier-1", 3).await.unwrap_err();
        assert!(matches!(err, ServiceError::Db(DbError::NotFound { .. })));
        let err = fx.orders.orders_by_cashier("nobody", 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::Db(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let fx = setup().await;
        let placed = fx
            .orders
            .place_order(order_of("cashier-1", 600_000))
            .await
            .unwrap();

        let cancelled = fx.orders.cancel_order(&placed.order.id).await.unwrap();
        assert!(cancelled.is_cancelled);

        let err = fx.orders.cancel_order(&placed.order.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::OrderNotFound(_))));
        let err = fx.orders.cancel_order("missing").await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::OrderNotFound(_))));

        // Loyalty is kept
        let mut conn = fx.db.acquire().await.unwrap();
        let account = LoyaltyRepository::find_by_user(&mut conn, "cashier-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.tier, 2);
    }
}
