//! # User Repository
//!
//! Users, their cached points balance and their cached tier.
//!
//! The balance column is a cache of the ledger sum. It is only moved by
//! [`debit_points_tx`] and [`credit_points_tx`], always in the same
//! transaction as the matching `loyalty_transactions` row.

use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kopi_core::User;

/// Balance, ledger sum and stored tier read in one statement.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PointsSnapshot {
    pub balance: i64,
    pub ledger_sum: i64,
    pub tier_id: Option<String>,
}

const SELECT_USER: &str = r#"
    SELECT id, name, role, outlet_id, points_balance, tier_id, created_at
    FROM users
    WHERE id = ?1
"#;

/// Repository for users.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(SELECT_USER)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn insert(&self, user: &User) -> DbResult<()> {
        debug!(id = %user.id, role = ?user.role, "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (id, name, role, outlet_id, points_balance, tier_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.role)
        .bind(&user.outlet_id)
        .bind(user.points_balance)
        .bind(&user.tier_id)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads the cached balance next to the ledger sum.
    ///
    /// Both values come from one statement so they describe the same
    /// committed state.
    pub async fn points_snapshot(&self, id: &str) -> DbResult<Option<PointsSnapshot>> {
        let snapshot = sqlx::query_as::<_, PointsSnapshot>(
            r#"
            SELECT
                u.points_balance AS balance,
                COALESCE((SELECT SUM(t.points) FROM loyalty_transactions t WHERE t.user_id = u.id), 0)
                    AS ledger_sum,
                u.tier_id
            FROM users u
            WHERE u.id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(snapshot)
    }

    /// Writes the cached tier computed from `balance`, only while the stored
    /// balance is still `balance` and the tier differs.
    ///
    /// Returns `false` when a concurrent credit or debit moved the balance;
    /// that writer has already set the tier for the new balance.
    pub async fn set_tier_at_balance(&self, id: &str, tier_id: Option<&str>, balance: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET tier_id = ?2 WHERE id = ?1 AND points_balance = ?3 AND tier_id IS NOT ?2",
        )
        .bind(id)
        .bind(tier_id)
        .bind(balance)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(user_id = %id, tier_id = ?tier_id, balance, "Tier updated");
        }

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Subtracts points if the balance covers them.
///
/// Returns the new balance, or `None` when the balance was too low at
/// write time (a concurrent redemption got there first).
pub async fn debit_points_tx(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
) -> DbResult<Option<i64>> {
    debug!(user_id = %user_id, points, "Debiting points");

    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE users
        SET points_balance = points_balance - ?2
        WHERE id = ?1 AND points_balance >= ?2
        RETURNING points_balance
        "#,
    )
    .bind(user_id)
    .bind(points)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(balance)
}

/// Adds points and returns the new balance.
pub async fn credit_points_tx(conn: &mut SqliteConnection, user_id: &str, points: i64) -> DbResult<i64> {
    debug!(user_id = %user_id, points, "Crediting points");

    let balance: i64 = sqlx::query_scalar(
        r#"
        UPDATE users
        SET points_balance = points_balance + ?2
        WHERE id = ?1
        RETURNING points_balance
        "#,
    )
    .bind(user_id)
    .bind(points)
    .fetch_one(&mut *conn)
    .await?;

    Ok(balance)
}

/// Writes the cached tier when it differs from the stored one.
///
/// Returns whether a row changed.
pub async fn set_tier_tx(conn: &mut SqliteConnection, user_id: &str, tier_id: Option<&str>) -> DbResult<bool> {
    let result = sqlx::query("UPDATE users SET tier_id = ?2 WHERE id = ?1 AND tier_id IS NOT ?2")
        .bind(user_id)
        .bind(tier_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() > 0 {
        debug!(user_id = %user_id, tier_id = ?tier_id, "Tier updated");
    }

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Unit Tests
// =============================================================================
