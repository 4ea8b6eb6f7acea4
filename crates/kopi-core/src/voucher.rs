//! # Vouchers
//!
//! Voucher definitions and the pure rule evaluation behind both order
//! creation and the speculative `check_voucher` command.
//!
//! ## Rule Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  exists ─► active ─► starts ≤ now ≤ ends ─► used < limit               │
//! │     ─► user uses < per-user limit ─► subtotal ≥ minimum                 │
//! │     ─► order type allowed ─► an eligible line (if scoped)              │
//! │     ─► customer class ─► reward claim held (if redeemable)             │
//! │                                                                         │
//! │  The first failing rule is the reason. Nothing here writes.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scoped Percentage Vouchers
//! When a voucher is limited to products or categories, the percentage is
//! taken of the eligible lines' amount, not the whole subtotal. Unscoped
//! vouchers use the subtotal. Either way the discount never exceeds the
//! subtotal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::money::Money;
use crate::types::OrderType;

// =============================================================================
// Voucher Definition
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountKind {
    Fixed {
        amount: Money,
    },
    Percentage {
        percent: i64,
        #[serde(default)]
        max_discount: Option<Money>,
    },
}

/// Which customers may use a voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CustomerEligibility {
    All,
    /// No prior non-cancelled orders.
    NewUser,
    /// Listed in `eligible_user_ids`.
    SpecificUsers,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub id: String,
    /// Unique, uppercase.
    pub code: String,
    pub name: String,
    pub discount: DiscountKind,
    pub min_order: Money,
    #[ts(as = "Option<String>")]
    pub starts_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    /// Only increases, and only in the transaction that consumes it.
    pub used_count: i64,
    pub per_user_limit: Option<i64>,
    /// Empty means every order type.
    pub order_types: Vec<OrderType>,
    pub product_ids: Vec<String>,
    pub category_ids: Vec<String>,
    pub eligibility: CustomerEligibility,
    pub eligible_user_ids: Vec<String>,
    /// Price in points in the reward catalog.
    pub points_cost: Option<i64>,
    /// Claimable from the reward catalog; using it then needs a claim.
    pub is_redeemable: bool,
    pub is_active: bool,
}

impl Voucher {
    /// Limited to specific products or categories.
    pub fn is_scoped(&self) -> bool {
        !self.product_ids.is_empty() || !self.category_ids.is_empty()
    }

    pub fn line_is_eligible(&self, line: &CartLine) -> bool {
        if !self.is_scoped() {
            return true;
        }
        self.product_ids.iter().any(|p| *p == line.product_id)
            || self.category_ids.iter().any(|c| *c == line.category_id)
    }

    pub fn allows_order_type(&self, order_type: OrderType) -> bool {
        self.order_types.is_empty() || self.order_types.contains(&order_type)
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// A priced line as the voucher rules see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: String,
    pub category_id: String,
    pub line_amount: Money,
    pub quantity: i64,
}

/// Everything the rules need besides the voucher itself.
///
/// Counts come from storage; `now` from the caller's clock.
#[derive(Debug, Clone)]
pub struct VoucherContext<'a> {
    pub user_id: &'a str,
    pub subtotal: Money,
    pub order_type: OrderType,
    pub lines: &'a [CartLine],
    pub now: DateTime<Utc>,
    /// Orders by this user that already consumed this voucher.
    pub user_usage_count: i64,
    /// This user's orders that were not cancelled or rejected.
    pub prior_order_count: i64,
    /// Reward claims for this voucher not yet consumed by an order.
    pub unused_claims: i64,
}

/// Why a voucher cannot be applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoucherRejection {
    #[error("Voucher code not found")]
    NotFound,

    #[error("Voucher is not active")]
    Inactive,

    #[error("Voucher is not valid yet")]
    NotStarted,

    #[error("Voucher has expired")]
    Expired,

    #[error("Voucher has been fully used")]
    UsageLimitReached,

    #[error("You have already used this voucher the maximum number of times")]
    PerUserLimitReached,

    #[error("Minimum order for this voucher is {minimum}")]
    BelowMinimumOrder { minimum: Money },

    #[error("Voucher is not valid for {} orders", .order_type.as_str())]
    OrderTypeNotAllowed { order_type: OrderType },

    #[error("No item in your cart is eligible for this voucher")]
    NoEligibleItems,

    #[error("Voucher is only for new customers")]
    NotNewUser,

    #[error("Voucher is not available for your account")]
    NotEligibleUser,

    #[error("Claim this voucher with points before using it")]
    NotClaimed,
}

impl VoucherRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            VoucherRejection::NotFound => "voucher_not_found",
            VoucherRejection::Inactive => "voucher_inactive",
            VoucherRejection::NotStarted => "voucher_not_started",
            VoucherRejection::Expired => "voucher_expired",
            VoucherRejection::UsageLimitReached => "usage_limit_reached",
            VoucherRejection::PerUserLimitReached => "per_user_limit_reached",
            VoucherRejection::BelowMinimumOrder { .. } => "below_minimum_order",
            VoucherRejection::OrderTypeNotAllowed { .. } => "order_type_not_allowed",
            VoucherRejection::NoEligibleItems => "no_eligible_items",
            VoucherRejection::NotNewUser => "not_new_user",
            VoucherRejection::NotEligibleUser => "not_eligible_user",
            VoucherRejection::NotClaimed => "voucher_not_claimed",
        }
    }
}

/// Evaluates a voucher for one cart and returns the discount.
///
/// `voucher` is `None` when the code did not match anything.
pub fn evaluate(
    voucher: Option<&Voucher>,
    ctx: &VoucherContext<'_>,
) -> Result<Money, VoucherRejection> {
    let voucher = voucher.ok_or(VoucherRejection::NotFound)?;

    if !voucher.is_active {
        return Err(VoucherRejection::Inactive);
    }

    if let Some(starts_at) = voucher.starts_at {
        if ctx.now < starts_at {
            return Err(VoucherRejection::NotStarted);
        }
    }
    if let Some(ends_at) = voucher.ends_at {
        if ctx.now > ends_at {
            return Err(VoucherRejection::Expired);
        }
    }

    if let Some(limit) = voucher.usage_limit {
        if voucher.used_count >= limit {
            return Err(VoucherRejection::UsageLimitReached);
        }
    }

    if let Some(limit) = voucher.per_user_limit {
        if ctx.user_usage_count >= limit {
            return Err(VoucherRejection::PerUserLimitReached);
        }
    }

    if ctx.subtotal < voucher.min_order {
        return Err(VoucherRejection::BelowMinimumOrder {
            minimum: voucher.min_order,
        });
    }

    if !voucher.allows_order_type(ctx.order_type) {
        return Err(VoucherRejection::OrderTypeNotAllowed {
            order_type: ctx.order_type,
        });
    }

    if voucher.is_scoped() && !ctx.lines.iter().any(|l| voucher.line_is_eligible(l)) {
        return Err(VoucherRejection::NoEligibleItems);
    }

    match voucher.eligibility {
        CustomerEligibility::All => {}
        CustomerEligibility::NewUser => {
            if ctx.prior_order_count > 0 {
                return Err(VoucherRejection::NotNewUser);
            }
        }
        CustomerEligibility::SpecificUsers => {
            if !voucher.eligible_user_ids.iter().any(|u| u == ctx.user_id) {
                return Err(VoucherRejection::NotEligibleUser);
            }
        }
    }

    if voucher.is_redeemable && ctx.unused_claims == 0 {
        return Err(VoucherRejection::NotClaimed);
    }

    Ok(compute_discount(voucher, ctx.subtotal, ctx.lines))
}

/// Discount for a voucher that passed every rule.
///
/// ## Example
/// ```rust
/// use kopi_core::money::Money;
/// use kopi_core::voucher::{compute_discount_amount, DiscountKind};
///
/// let ten_percent_capped = DiscountKind::Percentage {
///     percent: 10,
///     max_discount: Some(Money::from_rupiah(10_000)),
/// };
/// let d = compute_discount_amount(ten_percent_capped, Money::from_rupiah(200_000), Money::from_rupiah(200_000));
/// assert_eq!(d.rupiah(), 10_000);
/// ```
pub fn compute_discount(voucher: &Voucher, subtotal: Money, lines: &[CartLine]) -> Money {
    let base: Money = if voucher.is_scoped() {
        lines
            .iter()
            .filter(|l| voucher.line_is_eligible(l))
            .map(|l| l.line_amount)
            .sum()
    } else {
        subtotal
    };

    compute_discount_amount(voucher.discount, base, subtotal)
}

/// Applies a discount kind to `base`, capped at `subtotal`.
pub fn compute_discount_amount(kind: DiscountKind, base: Money, subtotal: Money) -> Money {
    let raw = match kind {
        DiscountKind::Fixed { amount } => amount,
        DiscountKind::Percentage {
            percent,
            max_discount,
        } => {
            let portion = base.percentage_of(percent);
            match max_discount {
                Some(cap) => portion.min(cap),
                None => portion,
            }
        }
    };

    raw.min(subtotal).max(Money::zero())
}

// =============================================================================
// Check Result
// =============================================================================

/// Response of the speculative voucher check.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct VoucherCheck {
    pub code: String,
    pub valid: bool,
    pub subtotal: Money,
    pub discount: Money,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl VoucherCheck {
    pub fn from_outcome(code: &str, subtotal: Money, outcome: Result<Money, VoucherRejection>) -> Self {
        match outcome {
            Ok(discount) => VoucherCheck {
                code: code.to_string(),
                valid: true,
                subtotal,
                discount,
                reason: None,
                message: None,
            },
            Err(rejection) => VoucherCheck {
                code: code.to_string(),
                valid: false,
                subtotal,
                discount: Money::zero(),
                reason: Some(rejection.reason().to_string()),
                message: Some(rejection.to_string()),
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
