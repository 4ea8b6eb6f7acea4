//! # Loyalty Repository
//!
//! Program setting, membership tiers and the append-only points ledger.
//!
//! Ledger rows are never updated or deleted. Earning for an order is
//! guarded twice: [`has_earned_entry_tx`] before the credit, and the
//! `idx_loyalty_earned_once` unique index as a backstop.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kopi_core::{LoyaltySetting, LoyaltyTransaction, MembershipTier};

/// Repository for loyalty configuration and ledger reads.
#[derive(Debug, Clone)]
pub struct LoyaltyRepository {
    pool: SqlitePool,
}

impl LoyaltyRepository {
    /// Creates a new LoyaltyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LoyaltyRepository { pool }
    }

    /// The single active program setting, if any.
    ///
    /// When several rows are flagged active the most recently updated wins.
    pub async fn active_setting(&self) -> DbResult<Option<LoyaltySetting>> {
        let setting = sqlx::query_as::<_, LoyaltySetting>(
            r#"
            SELECT id, is_enabled, points_per_item, point_value_idr,
                   min_redeem_points, max_redeem_points, max_redeem_percentage
            FROM loyalty_settings
            WHERE is_active = 1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(setting)
    }

    /// All tiers, ascending by minimum points.
    pub async fn tiers(&self) -> DbResult<Vec<MembershipTier>> {
        let tiers = sqlx::query_as::<_, MembershipTier>(
            r#"
            SELECT id, level, name, min_points, max_points, benefits
            FROM membership_tiers
            ORDER BY min_points
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tiers)
    }

    /// A user's ledger entries, most recent first.
    pub async fn history(&self, user_id: &str, limit: u32) -> DbResult<Vec<LoyaltyTransaction>> {
        debug!(user_id = %user_id, limit, "Loading points history");

        let entries = sqlx::query_as::<_, LoyaltyTransaction>(
            r#"
            SELECT id, user_id, order_id, kind, points, balance_after, description, created_at
            FROM loyalty_transactions
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Stores a setting as the active one.
    pub async fn insert_setting(&self, setting: &LoyaltySetting, now: DateTime<Utc>) -> DbResult<()> {
        debug!(id = %setting.id, "Inserting loyalty setting");

        sqlx::query(
            r#"
            INSERT INTO loyalty_settings (
                id, is_enabled, points_per_item, point_value_idr,
                min_redeem_points, max_redeem_points, max_redeem_percentage,
                is_active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)
            "#,
        )
        .bind(&setting.id)
        .bind(setting.is_enabled)
        .bind(setting.points_per_item)
        .bind(setting.point_value_idr)
        .bind(setting.min_redeem_points)
        .bind(setting.max_redeem_points)
        .bind(setting.max_redeem_percentage)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_tier(&self, tier: &MembershipTier) -> DbResult<()> {
        debug!(id = %tier.id, level = tier.level, "Inserting tier");

        sqlx::query(
            r#"
            INSERT INTO membership_tiers (id, level, name, min_points, max_points, benefits)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&tier.id)
        .bind(tier.level)
        .bind(&tier.name)
        .bind(tier.min_points)
        .bind(tier.max_points)
        .bind(&tier.benefits)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Appends one signed ledger entry.
pub async fn append_entry_tx(conn: &mut SqliteConnection, entry: &LoyaltyTransaction) -> DbResult<()> {
    debug!(
        user_id = %entry.user_id,
        kind = ?entry.kind,
        points = entry.points,
        balance_after = entry.balance_after,
        "Appending ledger entry"
    );

    sqlx::query(
        r#"
        INSERT INTO loyalty_transactions (
            id, user_id, order_id, kind, points, balance_after, description, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.user_id)
    .bind(&entry.order_id)
    .bind(entry.kind)
    .bind(entry.points)
    .bind(entry.balance_after)
    .bind(&entry.description)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Whether points were already earned for an order.
pub async fn has_earned_entry_tx(conn: &mut SqliteConnection, order_id: &str) -> DbResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM loyalty_transactions WHERE order_id = ?1 AND kind = 'earned')",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(exists)
}

// =============================================================================
// Unit Tests
// =============================================================================
