//! # Loyalty Commands
//!
//! Balance and tier reads, points history, reward claims and the inbox.
//!
//! ## Balance Invariant
//! ```text
//! users.points_balance == Σ loyalty_transactions.points   (per user)
//!
//!   redeem_reward:  debit ─► ledger(-cost) ─► user_voucher ─► tier   (one tx)
//!   create_order:   debit ─► ledger(-pts)  ─► tier                   (order tx)
//!   completion:     credit ─► ledger(+pts) ─► tier                   (status tx)
//! ```
//!
//! Reads check the invariant and refuse to answer when it does not hold.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::DbState;
use kopi_core::loyalty::{validate_reward_claim, verify_ledger, LoyaltyProfile};
use kopi_core::request::{PointsHistoryRequest, RedeemRewardRequest};
use kopi_core::tier::{classify, progress, reassign, TierAssignment};
use kopi_core::{
    CallerContext, CoreError, LedgerEntryKind, LoyaltyTransaction, MembershipTier, Notification,
    PointsRejection, UserVoucher, ValidationError, VoucherRejection, VoucherSource,
};
use kopi_db::repository::{loyalty as loyalty_repo, user as user_repo, voucher as voucher_repo};
use kopi_db::{Database, DbError, DbResult};

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

/// Writes the tier matching `balance` back to the user, inside the caller's
/// transaction. A no-op when it already matches.
pub(crate) async fn apply_tier_tx(
    conn: &mut SqliteConnection,
    user_id: &str,
    tiers: &[MembershipTier],
    balance: i64,
) -> DbResult<()> {
    let tier_id = classify(tiers, balance).map(|t| t.id.as_str());
    if user_repo::set_tier_tx(conn, user_id, tier_id).await? {
        debug!(user_id = %user_id, tier = ?tier_id, balance, "Tier changed");
    }
    Ok(())
}

// =============================================================================
// Reads
// =============================================================================

/// Reads a user's balance, checked against the ledger.
///
/// Every read of loyalty state goes through here. A stored tier that
/// disagrees with the balance is corrected, unless the balance moved since
/// the read.
pub(crate) async fn verified_balance(
    database: &Database,
    user_id: &str,
    tiers: &[MembershipTier],
) -> Result<i64, ApiError> {
    let snapshot = database
        .users()
        .points_snapshot(user_id)
        .await?
        .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;

    verify_ledger(user_id, snapshot.balance, snapshot.ledger_sum)?;

    if let TierAssignment::Changed(tier_id) = reassign(snapshot.tier_id.as_deref(), tiers, snapshot.balance) {
        if database
            .users()
            .set_tier_at_balance(user_id, tier_id.as_deref(), snapshot.balance)
            .await?
        {
            info!(user_id = %user_id, tier = ?tier_id, "Corrected stored tier");
        }
    }

    Ok(snapshot.balance)
}

/// Balance, tier and progress for the caller.
pub async fn loyalty_profile(db: &DbState, caller: &CallerContext) -> Result<LoyaltyProfile, ApiError> {
    debug!(user_id = %caller.user_id, "loyalty_profile command");

    let database = db.inner();
    let tiers = database.loyalty().tiers().await?;
    let balance = verified_balance(database, &caller.user_id, &tiers).await?;

    let setting = database.loyalty().active_setting().await?;
    Ok(LoyaltyProfile::build(
        &caller.user_id,
        balance,
        progress(&tiers, balance),
        setting.as_ref(),
    ))
}

/// The caller's ledger, newest first.
pub async fn points_history(
    db: &DbState,
    caller: &CallerContext,
    request: PointsHistoryRequest,
) -> Result<Vec<LoyaltyTransaction>, ApiError> {
    debug!(user_id = %caller.user_id, limit = ?request.limit, "points_history command");

    let limit = request.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_HISTORY_LIMIT,
        }
        .into());
    }

    let database = db.inner();
    let tiers = database.loyalty().tiers().await?;
    verified_balance(database, &caller.user_id, &tiers).await?;

    Ok(database.loyalty().history(&caller.user_id, limit as u32).await?)
}

/// The caller's inbox, newest first.
pub async fn list_notifications(
    db: &DbState,
    caller: &CallerContext,
    request: PointsHistoryRequest,
) -> Result<Vec<Notification>, ApiError> {
    let limit = request.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    Ok(db
        .inner()
        .notifications()
        .list_for_user(&caller.user_id, limit as u32)
        .await?)
}

// =============================================================================
// Reward Claims
// =============================================================================

/// A claimed reward and the balance left after paying for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardClaim {
    pub user_voucher: UserVoucher,
    pub points_balance: i64,
}

/// Spends points on a reward voucher.
///
/// The claim is a `user_vouchers` row with no order; a later order consumes
/// it. Debit, ledger entry, claim and tier land in one transaction.
pub async fn redeem_reward(
    db: &DbState,
    caller: &CallerContext,
    request: RedeemRewardRequest,
) -> Result<RewardClaim, ApiError> {
    debug!(user_id = %caller.user_id, voucher_id = %request.voucher_id, "redeem_reward command");

    let database = db.inner();
    let now = Utc::now();

    let voucher = database
        .vouchers()
        .get_by_id(&request.voucher_id)
        .await?
        .ok_or(VoucherRejection::NotFound)?;

    let cost = match voucher.points_cost {
        Some(cost) if voucher.is_redeemable && cost > 0 => cost,
        _ => return Err(CoreError::VoucherNotRedeemable(voucher.id).into()),
    };
    if !voucher.is_active {
        return Err(VoucherRejection::Inactive.into());
    }
    if voucher.ends_at.is_some_and(|ends| now > ends) {
        return Err(VoucherRejection::Expired.into());
    }

    let tiers = database.loyalty().tiers().await?;
    let current = verified_balance(database, &caller.user_id, &tiers).await?;
    let setting = database.loyalty().active_setting().await?;
    validate_reward_claim(setting.as_ref(), cost, current)?;

    let mut tx = database.begin().await?;

    let balance = user_repo::debit_points_tx(&mut tx, &caller.user_id, cost)
        .await?
        .ok_or(PointsRejection::InsufficientBalance {
            balance: current,
            requested: cost,
        })?;

    loyalty_repo::append_entry_tx(
        &mut tx,
        &LoyaltyTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: caller.user_id.clone(),
            order_id: None,
            kind: LedgerEntryKind::Redeemed,
            points: -cost,
            balance_after: balance,
            description: format!("Claimed reward {}", voucher.name),
            created_at: now,
        },
    )
    .await?;

    let claim = UserVoucher {
        id: Uuid::new_v4().to_string(),
        user_id: caller.user_id.clone(),
        voucher_id: voucher.id.clone(),
        order_id: None,
        source: VoucherSource::Reward,
        created_at: now,
    };
    voucher_repo::insert_user_voucher_tx(&mut tx, &claim).await?;

    apply_tier_tx(&mut tx, &caller.user_id, &tiers, balance).await?;

    tx.commit().await.map_err(DbError::from)?;

    info!(user_id = %caller.user_id, voucher_id = %voucher.id, cost, balance, "Reward claimed");

    Ok(RewardClaim {
        user_voucher: claim,
        points_balance: balance,
    })
}
