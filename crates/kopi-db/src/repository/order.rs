//! # Order Repository
//!
//! Orders, their priced line items and the per-outlet-per-day sequence.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. NUMBER                                                             │
//! │     └── next_sequence_tx() → first write of the order transaction      │
//! │                                                                         │
//! │  2. PERSIST                                                            │
//! │     └── insert_order_tx() → Order { status: Pending }                  │
//! │     └── insert_item_tx()  → OrderItem + option/modifier snapshots      │
//! │                                                                         │
//! │  3. PROGRESS (staff)                                                   │
//! │     └── update_status_tx(from, to) → zero rows if status moved         │
//! │                                                                         │
//! │  4. SETTLE                                                             │
//! │     └── update_payment_status(from, to)                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kopi_core::{
    DeliveryAddress, Money, Order, OrderDetail, OrderItem, OrderItemModifier, OrderItemOption,
    OrderStatus, OrderType, PaymentMethod, PaymentStatus,
};

// =============================================================================
// Row Types
// =============================================================================

/// Flat `orders` row; money as integer rupiah, address as JSON text.
#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    user_id: String,
    outlet_id: String,
    table_id: Option<String>,
    order_type: OrderType,
    status: OrderStatus,
    scheduled_at: Option<DateTime<Utc>>,
    delivery_address: Option<String>,
    subtotal: i64,
    tax: i64,
    discount: i64,
    points_discount: i64,
    points_redeemed: i64,
    delivery_fee: i64,
    total: i64,
    voucher_id: Option<String>,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let delivery_address = row
            .delivery_address
            .as_deref()
            .map(serde_json::from_str::<DeliveryAddress>)
            .transpose()?;

        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            user_id: row.user_id,
            outlet_id: row.outlet_id,
            table_id: row.table_id,
            order_type: row.order_type,
            status: row.status,
            scheduled_at: row.scheduled_at,
            delivery_address,
            subtotal: Money::from_rupiah(row.subtotal),
            tax: Money::from_rupiah(row.tax),
            discount: Money::from_rupiah(row.discount),
            points_discount: Money::from_rupiah(row.points_discount),
            points_redeemed: row.points_redeemed,
            delivery_fee: Money::from_rupiah(row.delivery_fee),
            total: Money::from_rupiah(row.total),
            voucher_id: row.voucher_id,
            payment_method: row.payment_method,
            payment_status: row.payment_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: String,
    order_id: String,
    product_id: String,
    product_name: String,
    quantity: i64,
    unit_price: i64,
    line_amount: i64,
    notes: Option<String>,
}

#[derive(Debug, FromRow)]
struct ItemOptionRow {
    order_item_id: String,
    option_id: String,
    option_name: String,
    value_id: String,
    value_name: String,
    price_delta: i64,
}

#[derive(Debug, FromRow)]
struct ItemModifierRow {
    order_item_id: String,
    modifier_id: String,
    modifier_name: String,
    quantity: i64,
    unit_price: i64,
}

const SELECT_ORDER: &str = r#"
    SELECT
        id, order_number, user_id, outlet_id, table_id, order_type, status,
        scheduled_at, delivery_address,
        subtotal, tax, discount, points_discount, points_redeemed, delivery_fee, total,
        voucher_id, payment_method, payment_status, created_at, updated_at
    FROM orders
    WHERE id = ?1
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for order reads and pool-level updates.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order header by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        get_tx(&mut conn, id).await
    }

    /// Gets an order's items with their option and modifier snapshots.
    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, product_name, quantity, unit_price, line_amount, notes
            FROM order_items
            WHERE order_id = ?1
            ORDER BY sort_order
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let options: Vec<ItemOptionRow> = sqlx::query_as(
            r#"
            SELECT o.order_item_id, o.option_id, o.option_name, o.value_id, o.value_name, o.price_delta
            FROM order_item_options o
            JOIN order_items i ON i.id = o.order_item_id
            WHERE i.order_id = ?1
            ORDER BY o.sort_order
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let modifiers: Vec<ItemModifierRow> = sqlx::query_as(
            r#"
            SELECT m.order_item_id, m.modifier_id, m.modifier_name, m.quantity, m.unit_price
            FROM order_item_modifiers m
            JOIN order_items i ON i.id = m.order_item_id
            WHERE i.order_id = ?1
            ORDER BY m.sort_order
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items
            .into_iter()
            .map(|item| OrderItem {
                options: options
                    .iter()
                    .filter(|o| o.order_item_id == item.id)
                    .map(|o| OrderItemOption {
                        option_id: o.option_id.clone(),
                        option_name: o.option_name.clone(),
                        value_id: o.value_id.clone(),
                        value_name: o.value_name.clone(),
                        price_delta: Money::from_rupiah(o.price_delta),
                    })
                    .collect(),
                modifiers: modifiers
                    .iter()
                    .filter(|m| m.order_item_id == item.id)
                    .map(|m| OrderItemModifier {
                        modifier_id: m.modifier_id.clone(),
                        modifier_name: m.modifier_name.clone(),
                        quantity: m.quantity,
                        unit_price: Money::from_rupiah(m.unit_price),
                    })
                    .collect(),
                id: item.id,
                order_id: item.order_id,
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: Money::from_rupiah(item.unit_price),
                line_amount: Money::from_rupiah(item.line_amount),
                notes: item.notes,
            })
            .collect())
    }

    /// Gets an order together with its items.
    pub async fn get_detail(&self, id: &str) -> DbResult<Option<OrderDetail>> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };
        let items = self.get_items(id).await?;

        Ok(Some(OrderDetail { order, items }))
    }

    /// Counts a user's orders that were not cancelled or rejected.
    ///
    /// Feeds the `new_user` voucher eligibility class.
    pub async fn count_active_for_user(&self, user_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE user_id = ?1 AND status NOT IN ('cancelled', 'rejected')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Moves payment status, conditional on the status the caller read.
    ///
    /// Returns `false` when the stored status was no longer `from`.
    pub async fn update_payment_status(
        &self,
        id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(id = %id, from = from.as_str(), to = to.as_str(), "Updating payment status");

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = ?3, updated_at = ?4
            WHERE id = ?1 AND payment_status = ?2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Takes the next number for a sequence key (`{prefix}{DDMMYY}`).
///
/// One upsert: the first call for a key seeds the counter from the highest
/// existing `{key}-NNN` suffix, later calls increment it. Being a write, it
/// also takes SQLite's write lock for the rest of the transaction.
pub async fn next_sequence_tx(conn: &mut SqliteConnection, sequence_key: &str) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO order_sequences (sequence_key, last_value)
        VALUES (
            ?1,
            COALESCE(
                (SELECT MAX(CAST(substr(order_number, length(?1) + 2) AS INTEGER))
                 FROM orders
                 WHERE order_number LIKE ?1 || '-%'),
                0
            ) + 1
        )
        ON CONFLICT(sequence_key) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(sequence_key)
    .fetch_one(&mut *conn)
    .await?;

    debug!(sequence_key = %sequence_key, value, "Sequence advanced");
    Ok(value)
}

pub async fn get_tx(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    let row: Option<OrderRow> = sqlx::query_as(SELECT_ORDER)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(Order::try_from).transpose()
}

/// Inserts the order header.
pub async fn insert_order_tx(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(id = %order.id, order_number = %order.order_number, "Inserting order");

    let delivery_address = order
        .delivery_address
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, user_id, outlet_id, table_id, order_type, status,
            scheduled_at, delivery_address,
            subtotal, tax, discount, points_discount, points_redeemed, delivery_fee, total,
            voucher_id, payment_method, payment_status, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9,
            ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21
        )
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.user_id)
    .bind(&order.outlet_id)
    .bind(&order.table_id)
    .bind(order.order_type)
    .bind(order.status)
    .bind(order.scheduled_at)
    .bind(delivery_address)
    .bind(order.subtotal.rupiah())
    .bind(order.tax.rupiah())
    .bind(order.discount.rupiah())
    .bind(order.points_discount.rupiah())
    .bind(order.points_redeemed)
    .bind(order.delivery_fee.rupiah())
    .bind(order.total.rupiah())
    .bind(&order.voucher_id)
    .bind(order.payment_method)
    .bind(order.payment_status)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts one line item with its option and modifier snapshots.
///
/// `position` keeps cart order stable on read.
pub async fn insert_item_tx(conn: &mut SqliteConnection, item: &OrderItem, position: usize) -> DbResult<()> {
    debug!(order_id = %item.order_id, product_id = %item.product_id, "Inserting order item");

    sqlx::query(
        r#"
        INSERT INTO order_items (
            id, order_id, product_id, product_name, quantity, unit_price, line_amount, notes, sort_order
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&item.id)
    .bind(&item.order_id)
    .bind(&item.product_id)
    .bind(&item.product_name)
    .bind(item.quantity)
    .bind(item.unit_price.rupiah())
    .bind(item.line_amount.rupiah())
    .bind(&item.notes)
    .bind(position as i64)
    .execute(&mut *conn)
    .await?;

    for (i, option) in item.options.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_item_options (
                order_item_id, option_id, option_name, value_id, value_name, price_delta, sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&item.id)
        .bind(&option.option_id)
        .bind(&option.option_name)
        .bind(&option.value_id)
        .bind(&option.value_name)
        .bind(option.price_delta.rupiah())
        .bind(i as i64)
        .execute(&mut *conn)
        .await?;
    }

    for (i, modifier) in item.modifiers.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_item_modifiers (
                order_item_id, modifier_id, modifier_name, quantity, unit_price, sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(&modifier.modifier_id)
        .bind(&modifier.modifier_name)
        .bind(modifier.quantity)
        .bind(modifier.unit_price.rupiah())
        .bind(i as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Moves an order from `from` to `to`.
///
/// Returns `false` when the order was no longer in `from`; the caller lost
/// a race with another status update.
pub async fn update_status_tx(
    conn: &mut SqliteConnection,
    id: &str,
    from: OrderStatus,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    debug!(id = %id, from = %from, to = %to, "Updating order status");

    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = ?3, updated_at = ?4
        WHERE id = ?1 AND status = ?2
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Sum of item quantities, the basis for points earned.
pub async fn total_quantity_tx(conn: &mut SqliteConnection, order_id: &str) -> DbResult<i64> {
    let quantity: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM order_items WHERE order_id = ?1",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(quantity)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{self, OUTLET};

    fn order(id: &str, number: &str) -> Order {
        let now = Utc::now();
        Order {
            id: id.to_string(),
            order_number: number.to_string(),
            user_id: "u1".to_string(),
            outlet_id: OUTLET.to_string(),
            table_id: None,
            order_type: OrderType::Delivery,
            status: OrderStatus::Pending,
            scheduled_at: None,
            delivery_address: Some(DeliveryAddress {
                recipient_name: "Sari".to_string(),
                phone: "+62 812 0000 1111".to_string(),
                address_line: "Jl. Kemang Raya 10".to_string(),
                city: Some("Jakarta".to_string()),
                postal_code: None,
                notes: None,
            }),
            subtotal: Money::from_rupiah(70_000),
            tax: Money::from_rupiah(7_700),
            discount: Money::zero(),
            points_discount: Money::zero(),
            points_redeemed: 0,
            delivery_fee: Money::zero(),
            total: Money::from_rupiah(77_700),
            voucher_id: None,
            payment_method: PaymentMethod::Qris,
            payment_status: PaymentStatus::Unpaid,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seed_product(db: &crate::Database) {
        sqlx::query("INSERT INTO categories (id, name) VALUES ('coffee', 'Coffee')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO products (id, category_id, name, base_price) VALUES ('latte', 'coffee', 'Latte', 35000)",
        )
        .execute(db.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_sequence_starts_at_one_and_increments() {
        let db = fixtures::database().await;

        let mut tx = db.begin().await.unwrap();
        assert_eq!(next_sequence_tx(&mut tx, "KEMA181026").await.unwrap(), 1);
        assert_eq!(next_sequence_tx(&mut tx, "KEMA181026").await.unwrap(), 2);
        assert_eq!(next_sequence_tx(&mut tx, "KEMA191026").await.unwrap(), 1);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_sequence_seeds_from_existing_orders() {
        let db = fixtures::database().await;

        let mut tx = db.begin().await.unwrap();
        insert_order_tx(&mut tx, &order("o1", "KEMA181026-007")).await.unwrap();
        insert_order_tx(&mut tx, &order("o2", "KEMA181026-012")).await.unwrap();
        assert_eq!(next_sequence_tx(&mut tx, "KEMA181026").await.unwrap(), 13);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_order_graph_round_trips() {
        let db = fixtures::database().await;
        seed_product(&db).await;

        let item = OrderItem {
            id: "i1".to_string(),
            order_id: "o1".to_string(),
            product_id: "latte".to_string(),
            product_name: "Latte".to_string(),
            quantity: 2,
            unit_price: Money::from_rupiah(35_000),
            line_amount: Money::from_rupiah(70_000),
            notes: Some("less ice".to_string()),
            options: vec![OrderItemOption {
                option_id: "size".to_string(),
                option_name: "Size".to_string(),
                value_id: "size-r".to_string(),
                value_name: "Regular".to_string(),
                price_delta: Money::zero(),
            }],
            modifiers: vec![OrderItemModifier {
                modifier_id: "shot".to_string(),
                modifier_name: "Extra Shot".to_string(),
                quantity: 1,
                unit_price: Money::zero(),
            }],
        };

        let mut tx = db.begin().await.unwrap();
        insert_order_tx(&mut tx, &order("o1", "KEMA181026-001")).await.unwrap();
        insert_item_tx(&mut tx, &item, 0).await.unwrap();
        assert_eq!(total_quantity_tx(&mut tx, "o1").await.unwrap(), 2);
        tx.commit().await.unwrap();

        let detail = db.orders().get_detail("o1").await.unwrap().unwrap();
        assert_eq!(detail.order.total, Money::from_rupiah(77_700));
        assert_eq!(
            detail.order.delivery_address.as_ref().map(|a| a.recipient_name.as_str()),
            Some("Sari")
        );
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].options, item.options);
        assert_eq!(detail.items[0].modifiers, item.modifiers);
    }

    #[tokio::test]
    async fn test_duplicate_order_number_is_unique_violation() {
        let db = fixtures::database().await;

        let mut tx = db.begin().await.unwrap();
        insert_order_tx(&mut tx, &order("o1", "KEMA181026-001")).await.unwrap();
        let err = insert_order_tx(&mut tx, &order("o2", "KEMA181026-001"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_status_update_is_conditional() {
        let db = fixtures::database().await;
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        insert_order_tx(&mut tx, &order("o1", "KEMA181026-001")).await.unwrap();
        assert!(update_status_tx(&mut tx, "o1", OrderStatus::Pending, OrderStatus::Confirmed, now)
            .await
            .unwrap());
        assert!(!update_status_tx(&mut tx, "o1", OrderStatus::Pending, OrderStatus::Rejected, now)
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let stored = db.orders().get("o1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_active_order_count_skips_cancelled() {
        let db = fixtures::database().await;
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        insert_order_tx(&mut tx, &order("o1", "KEMA181026-001")).await.unwrap();
        insert_order_tx(&mut tx, &order("o2", "KEMA181026-002")).await.unwrap();
        update_status_tx(&mut tx, "o2", OrderStatus::Pending, OrderStatus::Cancelled, now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.orders().count_active_for_user("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_payment_update_is_conditional() {
        let db = fixtures::database().await;
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        insert_order_tx(&mut tx, &order("o1", "KEMA181026-001")).await.unwrap();
        tx.commit().await.unwrap();

        let repo = db.orders();
        assert!(repo
            .update_payment_status("o1", PaymentStatus::Unpaid, PaymentStatus::Paid, now)
            .await
            .unwrap());
        assert!(!repo
            .update_payment_status("o1", PaymentStatus::Unpaid, PaymentStatus::Paid, now)
            .await
            .unwrap());
    }
}
