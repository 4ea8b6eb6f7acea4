//! # Membership Tiers
//!
//! The tier is a pure function of the current points balance. Crossing a
//! boundary downwards demotes just like crossing upwards promotes.
//!
//! ```text
//!   0        500        2000              ∞
//!   ├─Bronze──┼──Silver──┼──Gold───────────►
//!   min incl.   max excl.
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MembershipTier {
    pub id: String,
    pub level: i64,
    pub name: String,
    /// Inclusive.
    pub min_points: i64,
    /// Exclusive. `None` for the top tier.
    pub max_points: Option<i64>,
    pub benefits: Option<String>,
}

/// The tier whose range holds `balance`, or `None` if no tier does.
///
/// Scans tiers ascending by minimum and keeps the last one the balance
/// reaches. Input order does not matter.
pub fn classify(tiers: &[MembershipTier], balance: i64) -> Option<&MembershipTier> {
    let mut best: Option<&MembershipTier> = None;
    for tier in sorted(tiers) {
        if balance >= tier.min_points {
            best = Some(tier);
        }
    }
    best
}

/// Where a balance sits between its tier and the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierProgress {
    pub current: Option<MembershipTier>,
    pub next: Option<MembershipTier>,
    pub percent: Option<i64>,
    pub points_to_next: Option<i64>,
}

/// `(balance − current.min) / (next.min − current.min) × 100`, clamped to
/// `0..=100`. No next tier means no progress.
pub fn progress(tiers: &[MembershipTier], balance: i64) -> TierProgress {
    let ordered = sorted(tiers);
    let current = classify(tiers, balance);
    let floor = current.map(|t| t.min_points).unwrap_or(0);
    let next = ordered.into_iter().find(|t| t.min_points > balance);

    let (percent, points_to_next) = match next {
        Some(next) => {
            let span = next.min_points - floor;
            let percent = if span <= 0 {
                100
            } else {
                ((balance - floor) * 100 / span).clamp(0, 100)
            };
            (Some(percent), Some(next.min_points - balance))
        }
        None => (None, None),
    };

    TierProgress {
        current: current.cloned(),
        next: next.cloned(),
        percent,
        points_to_next,
    }
}

/// Outcome of recomputing a stored tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierAssignment {
    Unchanged,
    /// New tier id to write back. `None` clears it.
    Changed(Option<String>),
}

/// Compares the stored tier with the computed one. Only a difference is
/// written back.
pub fn reassign(
    stored_tier_id: Option<&str>,
    tiers: &[MembershipTier],
    balance: i64,
) -> TierAssignment {
    let computed = classify(tiers, balance).map(|t| t.id.as_str());
    if computed == stored_tier_id {
        TierAssignment::Unchanged
    } else {
        TierAssignment::Changed(computed.map(str::to_string))
    }
}

/// Checks that tiers partition `[0, ∞)`.
///
/// ## Rules
/// - Lowest tier starts at 0
/// - Each bounded tier ends where the next begins
/// - Only the highest tier is open-ended
pub fn validate_tiers(tiers: &[MembershipTier]) -> Result<(), ValidationError> {
    let ordered = sorted(tiers);
    let invalid = |reason: String| ValidationError::InvalidFormat {
        field: "tiers".to_string(),
        reason,
    };

    let Some(first) = ordered.first() else {
        return Ok(());
    };
    if first.min_points != 0 {
        return Err(invalid(format!("{} must start at 0 points", first.name)));
    }

    for pair in ordered.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        match lower.max_points {
            Some(max) if max == upper.min_points => {}
            Some(max) => {
                return Err(invalid(format!(
                    "{} ends at {} but {} starts at {}",
                    lower.name, max, upper.name, upper.min_points
                )))
            }
            None => {
                return Err(invalid(format!(
                    "{} is open-ended but {} follows it",
                    lower.name, upper.name
                )))
            }
        }
    }

    if let Some(last) = ordered.last() {
        if last.max_points.is_some() {
            return Err(invalid(format!("{} must be open-ended", last.name)));
        }
    }

    Ok(())
}

fn sorted(tiers: &[MembershipTier]) -> Vec<&MembershipTier> {
    let mut ordered: Vec<&MembershipTier> = tiers.iter().collect();
    ordered.sort_by_key(|t| t.min_points);
    ordered
}

// =============================================================================
// Unit Tests
// =============================================================================
