//! # Loyalty Ledger
//!
//! Points earning, redemption checks and ledger consistency.
//!
//! ## Ledger Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  loyalty_transactions (append-only)                                     │
//! │                                                                         │
//! │  kind      points   balance_after   order                              │
//! │  earned      +40         40         ORD-A   (completed, 4 cups × 10)   │
//! │  redeemed   -100          …         ORD-B   (100 pts × Rp100 off)      │
//! │  redeemed   -200          …         -       (reward voucher claim)     │
//! │                                                                         │
//! │  Σ points == users.points_balance, always.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::tier::{MembershipTier, TierProgress};

// =============================================================================
// Settings & Entries
// =============================================================================

/// The single active loyalty program configuration.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltySetting {
    pub id: String,
    pub is_enabled: bool,
    /// Points per item quantity on a completed order.
    pub points_per_item: i64,
    /// Rupiah value of one point when redeemed.
    pub point_value_idr: i64,
    pub min_redeem_points: i64,
    pub max_redeem_points: Option<i64>,
    /// Share of the bill (after voucher) that points may pay, in percent.
    pub max_redeem_percentage: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Earned,
    Redeemed,
}

/// One signed ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyTransaction {
    pub id: String,
    pub user_id: String,
    pub order_id: Option<String>,
    pub kind: LedgerEntryKind,
    /// Positive for earned, negative for redeemed.
    pub points: i64,
    /// Balance right after this entry.
    pub balance_after: i64,
    pub description: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Earning
// =============================================================================

/// Points for a completed order: `Σ quantity × points_per_item`.
///
/// Zero when there is no setting or the program is switched off.
///
/// ## Example
/// ```rust
/// use kopi_core::loyalty::{points_for_order, LoyaltySetting};
///
/// let setting = LoyaltySetting {
///     id: "default".into(),
///     is_enabled: true,
///     points_per_item: 10,
///     point_value_idr: 100,
///     min_redeem_points: 50,
///     max_redeem_points: None,
///     max_redeem_percentage: 50,
/// };
/// assert_eq!(points_for_order(Some(&setting), 4), 40);
/// assert_eq!(points_for_order(None, 4), 0);
/// ```
pub fn points_for_order(setting: Option<&LoyaltySetting>, total_quantity: i64) -> i64 {
    match setting {
        Some(s) if s.is_enabled => total_quantity.max(0) * s.points_per_item.max(0),
        _ => 0,
    }
}

// =============================================================================
// Redemption
// =============================================================================

/// Why a points redemption was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PointsRejection {
    #[error("The points program is not active")]
    ProgramDisabled,

    #[error("Redeem at least {minimum} points (requested {requested})")]
    BelowMinimum { minimum: i64, requested: i64 },

    #[error("Not enough points: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("At most {maximum} points can be redeemed per order")]
    ExceedsTransactionCap { maximum: i64, requested: i64 },

    #[error("Points can pay at most {max_discount} of this order")]
    ExceedsBillShare { max_discount: Money, requested: Money },
}

impl PointsRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            PointsRejection::ProgramDisabled => "loyalty_disabled",
            PointsRejection::BelowMinimum { .. } => "below_minimum_points",
            PointsRejection::InsufficientBalance { .. } => "insufficient_points",
            PointsRejection::ExceedsTransactionCap { .. } => "exceeds_points_cap",
            PointsRejection::ExceedsBillShare { .. } => "exceeds_bill_share",
        }
    }
}

/// An accepted redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsRedemption {
    pub points: i64,
    pub discount: Money,
}

/// Checks a redemption request against the program rules.
///
/// ## Check Order
/// ```text
/// enabled ─► requested ≥ minimum ─► requested ≤ balance
///         ─► requested ≤ per-order maximum ─► discount ≤ bill share
/// ```
///
/// `bill` is subtotal plus tax minus the voucher discount.
pub fn validate_redemption(
    setting: Option<&LoyaltySetting>,
    requested: i64,
    balance: i64,
    bill: Money,
) -> Result<PointsRedemption, PointsRejection> {
    let setting = match setting {
        Some(s) if s.is_enabled => s,
        _ => return Err(PointsRejection::ProgramDisabled),
    };

    if requested < setting.min_redeem_points {
        return Err(PointsRejection::BelowMinimum {
            minimum: setting.min_redeem_points,
            requested,
        });
    }

    if requested > balance {
        return Err(PointsRejection::InsufficientBalance { balance, requested });
    }

    if let Some(maximum) = setting.max_redeem_points {
        if requested > maximum {
            return Err(PointsRejection::ExceedsTransactionCap { maximum, requested });
        }
    }

    let discount = Money::from_rupiah(setting.point_value_idr).multiply_quantity(requested);
    let max_discount = bill.percentage_of(setting.max_redeem_percentage);
    if discount > max_discount {
        return Err(PointsRejection::ExceedsBillShare {
            max_discount,
            requested: discount,
        });
    }

    Ok(PointsRedemption {
        points: requested,
        discount,
    })
}

/// Checks that a reward costing `cost` points can be claimed.
pub fn validate_reward_claim(
    setting: Option<&LoyaltySetting>,
    cost: i64,
    balance: i64,
) -> Result<(), PointsRejection> {
    match setting {
        Some(s) if s.is_enabled => {}
        _ => return Err(PointsRejection::ProgramDisabled),
    }

    if cost > balance {
        return Err(PointsRejection::InsufficientBalance {
            balance,
            requested: cost,
        });
    }

    Ok(())
}

// =============================================================================
// Consistency
// =============================================================================

/// Cached balance must equal the ledger sum.
pub fn verify_ledger(user_id: &str, balance: i64, ledger_sum: i64) -> CoreResult<()> {
    if balance != ledger_sum {
        return Err(CoreError::LedgerDivergence {
            user_id: user_id.to_string(),
            balance,
            ledger_sum,
        });
    }
    Ok(())
}

// =============================================================================
// Profile
// =============================================================================

/// Loyalty view for the customer app's account screen.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyProfile {
    pub user_id: String,
    pub points_balance: i64,
    pub tier: Option<MembershipTier>,
    pub next_tier: Option<MembershipTier>,
    /// 0..=100 towards `next_tier`.
    pub progress_percent: Option<i64>,
    pub points_to_next_tier: Option<i64>,
    /// Rupiah the whole balance is worth right now.
    pub balance_value: Money,
}

impl LoyaltyProfile {
    pub fn build(
        user_id: &str,
        balance: i64,
        progress: TierProgress,
        setting: Option<&LoyaltySetting>,
    ) -> Self {
        let point_value = setting.map(|s| s.point_value_idr).unwrap_or(0);
        LoyaltyProfile {
            user_id: user_id.to_string(),
            points_balance: balance,
            tier: progress.current,
            next_tier: progress.next,
            progress_percent: progress.percent,
            points_to_next_tier: progress.points_to_next,
            balance_value: Money::from_rupiah(point_value).multiply_quantity(balance),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
