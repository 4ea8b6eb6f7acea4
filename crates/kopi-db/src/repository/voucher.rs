//! # Voucher Repository
//!
//! Vouchers, their eligibility scopes and per-user usage rows.
//!
//! ## Counters
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  vouchers.used_count        global uses, bumped by increment_usage_tx   │
//! │                             only while used_count < usage_limit         │
//! │                                                                         │
//! │  user_vouchers (order_id)   one row per use; per-user limit counted     │
//! │                             inside the same INSERT ... SELECT           │
//! │                                                                         │
//! │  user_vouchers (reward,     a points-bought claim waiting for an order; │
//! │   order_id IS NULL)         consume_claim_tx attaches the order to it   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kopi_core::voucher::{CustomerEligibility, DiscountKind};
use kopi_core::{Money, OrderType, UserVoucher, Voucher};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct VoucherRow {
    id: String,
    code: String,
    name: String,
    discount_type: String,
    discount_value: i64,
    max_discount: Option<i64>,
    min_order: i64,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    usage_limit: Option<i64>,
    used_count: i64,
    per_user_limit: Option<i64>,
    eligibility: CustomerEligibility,
    points_cost: Option<i64>,
    is_redeemable: bool,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct ScopeRow {
    scope_kind: String,
    target_id: String,
}

const SELECT_VOUCHER: &str = r#"
    SELECT
        id, code, name, discount_type, discount_value, max_discount, min_order,
        starts_at, ends_at, usage_limit, used_count, per_user_limit, eligibility,
        points_cost, is_redeemable, is_active
    FROM vouchers
"#;

fn discount_kind(row: &VoucherRow) -> DbResult<DiscountKind> {
    match row.discount_type.as_str() {
        "fixed" => Ok(DiscountKind::Fixed {
            amount: Money::from_rupiah(row.discount_value),
        }),
        "percentage" => Ok(DiscountKind::Percentage {
            percent: row.discount_value,
            max_discount: row.max_discount.map(Money::from_rupiah),
        }),
        other => Err(DbError::InvalidData(format!(
            "voucher {} has discount_type '{}'",
            row.id, other
        ))),
    }
}

fn assemble(row: VoucherRow, scopes: Vec<ScopeRow>) -> DbResult<Voucher> {
    let discount = discount_kind(&row)?;

    let mut product_ids = Vec::new();
    let mut category_ids = Vec::new();
    let mut eligible_user_ids = Vec::new();
    let mut order_types = Vec::new();

    for scope in scopes {
        match scope.scope_kind.as_str() {
            "product" => product_ids.push(scope.target_id),
            "category" => category_ids.push(scope.target_id),
            "user" => eligible_user_ids.push(scope.target_id),
            "order_type" => {
                let order_type = OrderType::parse(&scope.target_id).ok_or_else(|| {
                    DbError::InvalidData(format!(
                        "voucher {} scoped to unknown order type '{}'",
                        row.id, scope.target_id
                    ))
                })?;
                order_types.push(order_type);
            }
            other => {
                return Err(DbError::InvalidData(format!(
                    "voucher {} has scope kind '{}'",
                    row.id, other
                )))
            }
        }
    }

    Ok(Voucher {
        id: row.id,
        code: row.code,
        name: row.name,
        discount,
        min_order: Money::from_rupiah(row.min_order),
        starts_at: row.starts_at,
        ends_at: row.ends_at,
        usage_limit: row.usage_limit,
        used_count: row.used_count,
        per_user_limit: row.per_user_limit,
        order_types,
        product_ids,
        category_ids,
        eligibility: row.eligibility,
        eligible_user_ids,
        points_cost: row.points_cost,
        is_redeemable: row.is_redeemable,
        is_active: row.is_active,
    })
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for vouchers.
#[derive(Debug, Clone)]
pub struct VoucherRepository {
    pool: SqlitePool,
}

impl VoucherRepository {
    /// Creates a new VoucherRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VoucherRepository { pool }
    }

    /// Gets a voucher by its normalized (uppercase) code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Voucher>> {
        debug!(code = %code, "Loading voucher by code");

        let row: Option<VoucherRow> = sqlx::query_as(&format!("{} WHERE code = ?1", SELECT_VOUCHER))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.with_scopes(row).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Voucher>> {
        let row: Option<VoucherRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_VOUCHER))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.with_scopes(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn with_scopes(&self, row: VoucherRow) -> DbResult<Voucher> {
        let scopes: Vec<ScopeRow> = sqlx::query_as(
            r#"
            SELECT scope_kind, target_id
            FROM voucher_scopes
            WHERE voucher_id = ?1
            ORDER BY scope_kind, target_id
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        assemble(row, scopes)
    }

    /// Counts the orders in which a user already used a voucher.
    pub async fn count_user_usage(&self, user_id: &str, voucher_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM user_vouchers
            WHERE user_id = ?1 AND voucher_id = ?2 AND order_id IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(voucher_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Counts reward claims a user holds that no order has consumed yet.
    pub async fn count_unused_claims(&self, user_id: &str, voucher_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM user_vouchers
            WHERE user_id = ?1 AND voucher_id = ?2 AND source = 'reward' AND order_id IS NULL
            "#,
        )
        .bind(user_id)
        .bind(voucher_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Inserts a voucher with its scope rows.
    pub async fn insert(&self, voucher: &Voucher) -> DbResult<()> {
        debug!(id = %voucher.id, code = %voucher.code, "Inserting voucher");

        let (discount_type, discount_value, max_discount) = match voucher.discount {
            DiscountKind::Fixed { amount } => ("fixed", amount.rupiah(), None),
            DiscountKind::Percentage {
                percent,
                max_discount,
            } => ("percentage", percent, max_discount.map(|m| m.rupiah())),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO vouchers (
                id, code, name, discount_type, discount_value, max_discount, min_order,
                starts_at, ends_at, usage_limit, used_count, per_user_limit, eligibility,
                points_cost, is_redeemable, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&voucher.id)
        .bind(&voucher.code)
        .bind(&voucher.name)
        .bind(discount_type)
        .bind(discount_value)
        .bind(max_discount)
        .bind(voucher.min_order.rupiah())
        .bind(voucher.starts_at)
        .bind(voucher.ends_at)
        .bind(voucher.usage_limit)
        .bind(voucher.used_count)
        .bind(voucher.per_user_limit)
        .bind(voucher.eligibility)
        .bind(voucher.points_cost)
        .bind(voucher.is_redeemable)
        .bind(voucher.is_active)
        .execute(&mut *tx)
        .await?;

        let scopes = voucher
            .product_ids
            .iter()
            .map(|id| ("product", id.as_str()))
            .chain(voucher.category_ids.iter().map(|id| ("category", id.as_str())))
            .chain(voucher.eligible_user_ids.iter().map(|id| ("user", id.as_str())))
            .chain(voucher.order_types.iter().map(|t| ("order_type", t.as_str())));

        for (kind, target) in scopes {
            sqlx::query(
                "INSERT INTO voucher_scopes (voucher_id, scope_kind, target_id) VALUES (?1, ?2, ?3)",
            )
            .bind(&voucher.id)
            .bind(kind)
            .bind(target)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Lists a user's reward claims, newest first.
    pub async fn list_claims(&self, user_id: &str) -> DbResult<Vec<UserVoucher>> {
        let claims = sqlx::query_as::<_, UserVoucher>(
            r#"
            SELECT id, user_id, voucher_id, order_id, source, created_at
            FROM user_vouchers
            WHERE user_id = ?1 AND source = 'reward'
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(claims)
    }
}

// =============================================================================
// Transaction-scoped writes
// =============================================================================

/// Bumps `used_count` while the voucher is active and under its limit.
///
/// Returns `false` when the limit was reached at write time.
pub async fn increment_usage_tx(conn: &mut SqliteConnection, voucher_id: &str) -> DbResult<bool> {
    debug!(voucher_id = %voucher_id, "Incrementing voucher usage");

    let result = sqlx::query(
        r#"
        UPDATE vouchers
        SET used_count = used_count + 1
        WHERE id = ?1
          AND is_active = 1
          AND (usage_limit IS NULL OR used_count < usage_limit)
        "#,
    )
    .bind(voucher_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Records that an order used a voucher, within the per-user limit.
///
/// The limit is counted in the same statement. Returns `false` when the
/// user already reached it.
pub async fn record_usage_tx(
    conn: &mut SqliteConnection,
    usage: &UserVoucher,
    per_user_limit: Option<i64>,
) -> DbResult<bool> {
    debug!(user_id = %usage.user_id, voucher_id = %usage.voucher_id, "Recording voucher usage");

    let result = sqlx::query(
        r#"
        INSERT INTO user_vouchers (id, user_id, voucher_id, order_id, source, created_at)
        SELECT ?1, ?2, ?3, ?4, ?5, ?6
        WHERE ?7 IS NULL OR (
            SELECT COUNT(*) FROM user_vouchers
            WHERE user_id = ?2 AND voucher_id = ?3 AND order_id IS NOT NULL
        ) < ?7
        "#,
    )
    .bind(&usage.id)
    .bind(&usage.user_id)
    .bind(&usage.voucher_id)
    .bind(&usage.order_id)
    .bind(usage.source)
    .bind(usage.created_at)
    .bind(per_user_limit)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Attaches an order to the user's oldest unused reward claim.
///
/// Returns `false` when no claim is left or the per-user limit is reached.
pub async fn consume_claim_tx(
    conn: &mut SqliteConnection,
    user_id: &str,
    voucher_id: &str,
    order_id: &str,
    per_user_limit: Option<i64>,
) -> DbResult<bool> {
    debug!(user_id = %user_id, voucher_id = %voucher_id, order_id = %order_id, "Consuming reward claim");

    let result = sqlx::query(
        r#"
        UPDATE user_vouchers
        SET order_id = ?3
        WHERE id = (
            SELECT id FROM user_vouchers
            WHERE user_id = ?1 AND voucher_id = ?2 AND source = 'reward' AND order_id IS NULL
            ORDER BY created_at, rowid
            LIMIT 1
        )
        AND (?4 IS NULL OR (
            SELECT COUNT(*) FROM user_vouchers
            WHERE user_id = ?1 AND voucher_id = ?2 AND order_id IS NOT NULL
        ) < ?4)
        "#,
    )
    .bind(user_id)
    .bind(voucher_id)
    .bind(order_id)
    .bind(per_user_limit)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Inserts a user voucher row unconditionally (reward claims).
pub async fn insert_user_voucher_tx(conn: &mut SqliteConnection, row: &UserVoucher) -> DbResult<()> {
    debug!(user_id = %row.user_id, voucher_id = %row.voucher_id, source = ?row.source, "Inserting user voucher");

    sqlx::query(
        r#"
        INSERT INTO user_vouchers (id, user_id, voucher_id, order_id, source, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&row.id)
    .bind(&row.user_id)
    .bind(&row.voucher_id)
    .bind(&row.order_id)
    .bind(row.source)
    .bind(row.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
