//! # Order Repository
//!
//! Database operations for orders and order items.
//!
//! ## Consumed Codes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  orders                                                                │
//! │  ┌──────────┬───────────────────┬───────────────────┐                  │
//! │  │ id       │ discount_code     │ discount_consumed │                  │
//! │  ├──────────┼───────────────────┼───────────────────┤                  │
//! │  │ o-1      │ DISCOUNT_AB12CD34 │ 1                 │ ◄── consumed     │
//! │  │ o-2      │ DISCOUNT_AB12CD34 │ 0                 │ ◄── 0% code,     │
//! │  │ o-3      │ NULL              │ 0                 │     not consumed │
//! │  └──────────┴───────────────────┴───────────────────┘                  │
//! │                                                                         │
//! │  UNIQUE (discount_code) WHERE discount_consumed = 1                    │
//! │  → a second consuming insert fails with UniqueViolation                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use loyalty_core::{Order, OrderItem, PageRequest};

/// Column guarded by the consumed-code partial index.
pub const CONSUMED_CODE_COLUMN: &str = "orders.discount_code";

const SELECT_ORDER: &str = r#"
    SELECT
        id,
        cashier_id,
        subtotal,
        discount_amount,
        total_price,
        total_items,
        payment_method,
        discount_code,
        discount_consumed,
        is_cancelled,
        transaction_time,
        created_at
    FROM orders
"#;

/// Repository for order database operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderRepository;

impl OrderRepository {
    /// Inserts an order header.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` on [`CONSUMED_CODE_COLUMN`] when the
    ///   order consumes a code some other order already consumed
    pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(
            id = %order.id,
            cashier_id = %order.cashier_id,
            total_price = order.total_price,
            "Inserting order"
        );

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, cashier_id, subtotal, discount_amount, total_price,
                total_items, payment_method, discount_code, discount_consumed,
                is_cancelled, transaction_time, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.cashier_id)
        .bind(order.subtotal)
        .bind(order.discount_amount)
        .bind(order.total_price)
        .bind(order.total_items)
        .bind(order.payment_method)
        .bind(&order.discount_code)
        .bind(order.is_discount_applied)
        .bind(order.is_cancelled)
        .bind(order.transaction_time)
        .bind(order.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).with_value(order.discount_code.as_deref()))?;

        Ok(())
    }

    /// Inserts an order line.
    pub async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, line_price)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.line_price)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Gets an order by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!("{SELECT_ORDER} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(order)
    }

    /// Gets the lines of an order.
    pub async fn items_for(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, quantity, line_price
            FROM order_items
            WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(items)
    }

    /// True if any order has consumed `code`.
    pub async fn is_code_consumed(conn: &mut SqliteConnection, code: &str) -> DbResult<bool> {
        let consumed: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM orders WHERE discount_code = ?1 AND discount_consumed = 1)",
        )
        .bind(code)
        .fetch_one(&mut *conn)
        .await?;

        Ok(consumed)
    }

    /// True if an order placed by `cashier_id` has consumed `code`.
    pub async fn is_code_consumed_by(
        conn: &mut SqliteConnection,
        code: &str,
        cashier_id: &str,
    ) -> DbResult<bool> {
        let consumed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM orders
                WHERE discount_code = ?1 AND cashier_id = ?2 AND discount_consumed = 1
            )
            "#,
        )
        .bind(code)
        .bind(cashier_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(consumed)
    }

    /// Number of orders placed by a cashier.
    pub async fn count_by_cashier(conn: &mut SqliteConnection, cashier_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE cashier_id = ?1")
            .bind(cashier_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    /// One page of a cashier's orders, newest transaction first.
    pub async fn list_by_cashier(
        conn: &mut SqliteConnection,
        cashier_id: &str,
        page: PageRequest,
    ) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "{SELECT_ORDER} WHERE cashier_id = ?1 \
             ORDER BY transaction_time DESC, created_at DESC \
             LIMIT ?2 OFFSET ?3"
        ))
        .bind(cashier_id)
        .bind(page.per_page as i64)
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await?;

        Ok(orders)
    }

    /// Marks an order cancelled. Returns false if it already was.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No such order
    pub async fn cancel(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE orders SET is_cancelled = 1 WHERE id = ?1 AND is_cancelled = 0")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 1 {
            debug!(id = %id, "Order cancelled");
            return Ok(true);
        }

        match Self::get_by_id(conn, id).await? {
            Some(_) => Ok(false),
            None => Err(DbError::not_found("Order", id)),
        }
    }
}

/// Generates a new order ID.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new order item ID.
pub fn generate_order_item_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
