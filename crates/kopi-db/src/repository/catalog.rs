//! # Catalog Repository
//!
//! Read access to products with their options, option values and modifiers.
//!
//! ## Product Graph
//! ```text
//! products ──┬── product_options ──── option_values
//!            └── modifiers
//! ```
//!
//! The order pipeline reads a product as one [`Product`] value and prices
//! against it; nothing here is written during an order.

use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kopi_core::{Modifier, Money, OptionValue, Product, ProductOption};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    category_id: String,
    name: String,
    base_price: i64,
    is_available: bool,
}

#[derive(Debug, FromRow)]
struct OptionRow {
    id: String,
    name: String,
    min_select: i64,
    max_select: i64,
}

#[derive(Debug, FromRow)]
struct OptionValueRow {
    id: String,
    option_id: String,
    name: String,
    price_delta: i64,
}

#[derive(Debug, FromRow)]
struct ModifierRow {
    id: String,
    name: String,
    price: i64,
    is_available: bool,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog reads.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets a product with its options and modifiers.
    ///
    /// Options, values and modifiers come back in `sort_order`.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        debug!(product_id = %id, "Loading product");

        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, category_id, name, base_price, is_available
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let option_rows: Vec<OptionRow> = sqlx::query_as(
            r#"
            SELECT id, name, min_select, max_select
            FROM product_options
            WHERE product_id = ?1
            ORDER BY sort_order, id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let value_rows: Vec<OptionValueRow> = sqlx::query_as(
            r#"
            SELECT v.id, v.option_id, v.name, v.price_delta
            FROM option_values v
            JOIN product_options o ON o.id = v.option_id
            WHERE o.product_id = ?1
            ORDER BY v.sort_order, v.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let modifier_rows: Vec<ModifierRow> = sqlx::query_as(
            r#"
            SELECT id, name, price, is_available
            FROM modifiers
            WHERE product_id = ?1
            ORDER BY sort_order, id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let options = option_rows
            .into_iter()
            .map(|o| ProductOption {
                values: value_rows
                    .iter()
                    .filter(|v| v.option_id == o.id)
                    .map(|v| OptionValue {
                        id: v.id.clone(),
                        name: v.name.clone(),
                        price_delta: Money::from_rupiah(v.price_delta),
                    })
                    .collect(),
                id: o.id,
                name: o.name,
                min_select: o.min_select,
                max_select: o.max_select,
            })
            .collect();

        let modifiers = modifier_rows
            .into_iter()
            .map(|m| Modifier {
                id: m.id,
                name: m.name,
                price: Money::from_rupiah(m.price),
                is_available: m.is_available,
            })
            .collect();

        Ok(Some(Product {
            id: row.id,
            category_id: row.category_id,
            name: row.name,
            base_price: Money::from_rupiah(row.base_price),
            is_available: row.is_available,
            options,
            modifiers,
        }))
    }

    /// Inserts a category.
    pub async fn insert_category(&self, id: &str, name: &str) -> DbResult<()> {
        debug!(id = %id, name = %name, "Inserting category");

        sqlx::query("INSERT INTO categories (id, name) VALUES (?1, ?2)")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Inserts a product with its whole option/modifier graph.
    ///
    /// Runs in one transaction; a failure leaves no partial product.
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, category_id, name, base_price, is_available)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&product.id)
        .bind(&product.category_id)
        .bind(&product.name)
        .bind(product.base_price.rupiah())
        .bind(product.is_available)
        .execute(&mut *tx)
        .await?;

        for (i, option) in product.options.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO product_options (id, product_id, name, min_select, max_select, sort_order)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&option.id)
            .bind(&product.id)
            .bind(&option.name)
            .bind(option.min_select)
            .bind(option.max_select)
            .bind(i as i64)
            .execute(&mut *tx)
            .await?;

            for (j, value) in option.values.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO option_values (id, option_id, name, price_delta, sort_order)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(&value.id)
                .bind(&option.id)
                .bind(&value.name)
                .bind(value.price_delta.rupiah())
                .bind(j as i64)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (i, modifier) in product.modifiers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO modifiers (id, product_id, name, price, is_available, sort_order)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&modifier.id)
            .bind(&product.id)
            .bind(&modifier.name)
            .bind(modifier.price.rupiah())
            .bind(modifier.is_available)
            .bind(i as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Flips a product's availability flag.
    pub async fn set_available(&self, id: &str, available: bool) -> DbResult<bool> {
        debug!(id = %id, available, "Updating product availability");

        let result = sqlx::query("UPDATE products SET is_available = ?2 WHERE id = ?1")
            .bind(id)
            .bind(available)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
