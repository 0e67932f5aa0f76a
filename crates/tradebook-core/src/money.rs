//! # Money Module
//!
//! Provides the `Money` type for currency amounts and `PercentRate` for
//! levy and VAT percentages.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  125.50 × 1% = 1.255                                                    │
//! │    as f64:      1.2549999999999999 → rounds to 1.25  ❌ WRONG!          │
//! │    as Decimal:  1.255              → rounds to 1.26  ✅                 │
//! │                                                                         │
//! │  OUR SOLUTION                                                           │
//! │    Quantities and rates per unit are exact `Decimal`s.                 │
//! │    Every stored amount is integer cents (`Money`).                     │
//! │    Decimal → cents conversion rounds half-up exactly once.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use rust_decimal::Decimal;
//! use tradebook_core::money::{Money, PercentRate};
//!
//! let gross = Money::from_cents(12550);           // 125.50
//! let levy = gross.checked_apply_rate(PercentRate::from_bps(100)).unwrap(); // 1%
//! assert_eq!(levy.cents(), 126);                  // 1.255 → 1.26
//!
//! let line = Money::try_from_decimal(Decimal::new(12345, 3)).unwrap(); // 12.345
//! assert_eq!(line.cents(), 1235);
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::MONEY_DECIMAL_PLACES;

// =============================================================================
// Money Type
// =============================================================================

/// A currency amount in the smallest unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: balances and statement running totals can be negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **No float constructor**: amounts come from cents or exact decimals
///
/// The `+`/`-` operators assume amounts already bounded by validation
/// (line totals and invoice totals are built with the `checked_*` methods).
/// Unbounded input must go through `checked_add`/`checked_sub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts an exact decimal amount to cents, rounding half-up
    /// (midpoint away from zero) to 2 decimal places.
    ///
    /// Returns `None` when the amount does not fit in i64 cents.
    ///
    /// ## Example
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use tradebook_core::money::Money;
    ///
    /// assert_eq!(Money::try_from_decimal(Decimal::new(1255, 3)).unwrap().cents(), 126);
    /// assert_eq!(Money::try_from_decimal(Decimal::new(-1255, 3)).unwrap().cents(), -126);
    /// ```
    pub fn try_from_decimal(amount: Decimal) -> Option<Self> {
        let rounded = round_half_up(amount);
        let cents = rounded.checked_mul(Decimal::ONE_HUNDRED)?;
        cents.to_i64().map(Money)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the amount as an exact decimal with 2 decimal places.
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, MONEY_DECIMAL_PLACES)
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts. `None` on i64 overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Subtracts `other`. `None` on i64 overflow.
    #[inline]
    pub const fn checked_sub(&self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Applies a percentage rate and rounds half-up to whole cents.
    ///
    /// Returns `None` when the result does not fit in i64 cents (only
    /// possible for rates above 100%).
    ///
    /// ## Implementation
    /// Integer math on the absolute value: `(|cents| * bps + 5000) / 10000`,
    /// then the sign is restored, so -0.5 cents rounds to -1 just as
    /// +0.5 rounds to +1.
    ///
    /// ## Example
    /// ```rust
    /// use tradebook_core::money::{Money, PercentRate};
    ///
    /// let before_vat = Money::from_cents(12676);          // 126.76
    /// let vat = before_vat.checked_apply_rate(PercentRate::from_bps(1650)).unwrap(); // 16.5%
    /// // 126.76 × 16.5% = 20.9154 → 20.92
    /// assert_eq!(vat.cents(), 2092);
    /// ```
    pub fn checked_apply_rate(&self, rate: PercentRate) -> Option<Money> {
        // i128 holds u64::MAX * u32::MAX
        let magnitude = (i128::from(self.0.unsigned_abs()) * i128::from(rate.bps()) + 5000) / 10000;
        let signed = if self.0 < 0 { -magnitude } else { magnitude };
        i64::try_from(signed).ok().map(Money)
    }
}

/// Rounds a decimal half-up (midpoint away from zero) to 2 decimal places.
///
/// Every monetary rounding in the crate goes through here.
#[inline]
pub fn round_half_up(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the amount with 2 decimals and no currency symbol; the caller
/// decides the currency.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Percent Rate
// =============================================================================

/// A percentage rate (levy, VAT) in basis points.
///
/// ## Why Basis Points?
/// 1 basis point = 0.01%. Levy and VAT rates are published with at most two
/// decimals (16.5%, 1%), so basis points hold them exactly:
/// 1650 bps = 16.5%, 100 bps = 1%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PercentRate(u32);

impl PercentRate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        PercentRate(bps)
    }

    /// Creates a rate from a percentage such as `16.5`.
    ///
    /// Returns `None` when the percentage is negative or has more than two
    /// decimal places (it would not be representable in basis points).
    ///
    /// ## Example
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use tradebook_core::money::PercentRate;
    ///
    /// assert_eq!(PercentRate::from_percentage(Decimal::new(165, 1)).unwrap().bps(), 1650);
    /// assert!(PercentRate::from_percentage(Decimal::new(16525, 3)).is_none());
    /// ```
    pub fn from_percentage(pct: Decimal) -> Option<Self> {
        if pct.is_sign_negative() && !pct.is_zero() {
            return None;
        }
        let bps = pct.checked_mul(Decimal::ONE_HUNDRED)?;
        if bps.fract() != Decimal::ZERO {
            return None;
        }
        bps.to_u32().map(PercentRate)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as an exact percentage (1650 bps → 16.50).
    #[inline]
    pub fn percentage(&self) -> Decimal {
        Decimal::new(self.0 as i64, 2)
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        PercentRate(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PercentRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percentage().normalize())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(14768).to_string(), "147.68");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_decimal_conversion_rounds_half_up() {
        assert_eq!(Money::try_from_decimal(dec!(1.255)).unwrap().cents(), 126);
        assert_eq!(Money::try_from_decimal(dec!(1.254)).unwrap().cents(), 125);
        assert_eq!(Money::try_from_decimal(dec!(0.005)).unwrap().cents(), 1);
        assert_eq!(Money::try_from_decimal(dec!(-0.005)).unwrap().cents(), -1);
        assert_eq!(Money::try_from_decimal(dec!(125.5)).unwrap().cents(), 12550);
    }

    #[test]
    fn test_decimal_conversion_overflow() {
        assert!(Money::try_from_decimal(Decimal::MAX).is_none());
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(Money::from_cents(12676).to_decimal(), dec!(126.76));
    }

    fn rate_of(cents: i64, bps: u32) -> i64 {
        Money::from_cents(cents)
            .checked_apply_rate(PercentRate::from_bps(bps))
            .unwrap()
            .cents()
    }

    #[test]
    fn test_apply_rate_half_up() {
        // 125.50 at 1% = 1.255 → 1.26
        assert_eq!(rate_of(12550, 100), 126);
        // 10.00 at 8.25% = 0.825 → 0.83
        assert_eq!(rate_of(1000, 825), 83);
        // Symmetric for negative amounts
        assert_eq!(rate_of(-1000, 825), -83);
        assert_eq!(rate_of(1000, 0), 0);
    }

    #[test]
    fn test_checked_operations_overflow() {
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max.checked_add(Money::from_cents(1)), None);
        assert_eq!(Money::from_cents(i64::MIN).checked_sub(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(5).checked_add(Money::from_cents(7)),
            Some(Money::from_cents(12))
        );
        assert_eq!(max.checked_apply_rate(PercentRate::from_bps(20000)), None);
        assert_eq!(max.checked_apply_rate(PercentRate::from_bps(10000)), Some(max));
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((-a).cents(), -1000);
        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_percent_rate_from_percentage() {
        assert_eq!(PercentRate::from_percentage(dec!(16.5)).unwrap().bps(), 1650);
        assert_eq!(PercentRate::from_percentage(dec!(1)).unwrap().bps(), 100);
        assert_eq!(PercentRate::from_percentage(dec!(0)).unwrap().bps(), 0);
        assert!(PercentRate::from_percentage(dec!(-1)).is_none());
        assert!(PercentRate::from_percentage(dec!(0.125)).is_none());
    }

    #[test]
    fn test_percent_rate_display() {
        assert_eq!(PercentRate::from_bps(1650).to_string(), "16.5%");
        assert_eq!(PercentRate::from_bps(100).to_string(), "1%");
    }
}
