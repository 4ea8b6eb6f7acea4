//! # Money Module
//!
//! Provides the `Money` type for rupiah amounts.
//!
//! ## Why Whole Rupiah?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IDR HAS NO MINOR UNIT IN PRACTICE                                      │
//! │                                                                         │
//! │  Menu prices:   Rp35.000, Rp5.000, Rp2.500                             │
//! │  Tax (11%):     Rp70.000 × 11% = Rp7.700                               │
//! │  Percentages:   Rp123.456 × 10% = Rp12.345,6 → Rp12.346 (half-up)      │
//! │                                                                         │
//! │  Every amount is an i64 of whole rupiah.                               │
//! │  Every percentage is computed in i128 and rounded exactly once.        │
//! │  No f64 ever touches an amount.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kopi_core::money::Money;
//!
//! let latte = Money::from_rupiah(35_000);
//! let line = latte.multiply_quantity(2);
//! assert_eq!(line.rupiah(), 70_000);
//! assert_eq!(line.to_string(), "Rp70.000");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in whole rupiah.
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  base_price + option deltas + modifiers ──► unit_price ──► line_amount │
/// │                                                                         │
/// │  Σ line_amount ──► subtotal ──► tax ──► total                          │
/// │                        │                  ▲                             │
/// │                        ├── voucher discount ┘                           │
/// │                        └── points discount ─┘                           │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from whole rupiah.
    #[inline]
    pub const fn from_rupiah(rupiah: i64) -> Self {
        Money(rupiah)
    }

    /// Returns the value in whole rupiah.
    #[inline]
    pub const fn rupiah(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Calculates tax, rounding half-up to the nearest rupiah.
    ///
    /// ## Implementation
    /// Integer math in i128: `(amount * bps + 5000) / 10000`.
    /// The +5000 is the half-up rounding term (5000/10000 = 0.5).
    ///
    /// ## Example
    /// ```rust
    /// use kopi_core::money::Money;
    /// use kopi_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_rupiah(70_000);
    /// assert_eq!(subtotal.calculate_tax(TaxRate::STANDARD).rupiah(), 7_700);
    ///
    /// // 12.345 × 11% = 1357.95 → 1358
    /// assert_eq!(Money::from_rupiah(12_345).calculate_tax(TaxRate::STANDARD).rupiah(), 1_358);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_rupiah(tax as i64)
    }

    /// Returns `percent`% of this amount, rounded half-up.
    ///
    /// ## Example
    /// ```rust
    /// use kopi_core::money::Money;
    ///
    /// assert_eq!(Money::from_rupiah(100_000).percentage_of(10).rupiah(), 10_000);
    /// assert_eq!(Money::from_rupiah(12_345).percentage_of(10).rupiah(), 1_235);
    /// ```
    pub fn percentage_of(&self, percent: i64) -> Money {
        let portion = (self.0 as i128 * percent as i128 + 50) / 100;
        Money::from_rupiah(portion as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Rupiah display with dot thousands separators: `Rp77.700`.
///
/// ## Note
/// Used in notification bodies and log lines. The customer app formats
/// amounts itself.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let digits = self.0.unsigned_abs().to_string();

        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        write!(f, "{}Rp{}", sign, grouped)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
