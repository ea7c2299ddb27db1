//! # Money Module
//!
//! Integer monetary types used by every costing computation.
//!
//! ## Three Scales
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Money        i64 minor units (cents)      freight total, batch value  │
//! │  UnitCost     i64 micro-units per unit     landed cost per unit        │
//! │  ExchangeRate i64 micro-units (1.0 = 1e6)  PO currency → base currency │
//! │                                                                         │
//! │  1 cent = 10_000 micro-units                                           │
//! │                                                                         │
//! │  $10.00 freight over 3 units:                                          │
//! │    Money:    1000 cents (exact, what was paid)                         │
//! │    UnitCost: 3_333_333 micro-units per unit (3.333333)                 │
//! │                                                                         │
//! │  Totals are always Money. Per-unit figures are always UnitCost.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding
//! Every scale change rounds half to even (Bankers Rounding), so repeated
//! conversions carry no systematic bias.
//!
//! ## Usage
//! ```rust
//! use costing_core::money::{Money, UnitCost};
//!
//! let freight = Money::from_cents(1000);
//! let per_unit = freight.per_unit(3);
//! assert_eq!(per_unit.micros(), 3_333_333);
//!
//! let price = UnitCost::from_cents(250);
//! assert_eq!(price.times_quantity(4).cents(), 1000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

/// Micro-units per cent.
pub const MICROS_PER_CENT: i64 = 10_000;

/// Micro-units per major currency unit.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Divides with Bankers Rounding (round half to even).
///
/// `den` must be positive. Works for negative numerators.
pub(crate) fn div_round_half_even(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);
    let quotient = num.div_euclid(den);
    let remainder = num.rem_euclid(den);
    let twice = remainder * 2;
    if twice > den || (twice == den && quotient % 2 != 0) {
        quotient + 1
    } else {
        quotient
    }
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

// =============================================================================
// Money
// =============================================================================

/// A monetary amount in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: deltas between valuation methods can be negative
/// - **No float constructor**: amounts enter the engine already in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ```rust
    /// use costing_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero.
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

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Converts an amount stated in a purchase-order currency into the base
    /// currency using a fixed exchange rate.
    ///
    /// ```rust
    /// use costing_core::money::{ExchangeRate, Money};
    ///
    /// let eur = Money::from_cents(10_000);
    /// let rate = ExchangeRate::from_micros(1_085_000); // 1.085
    /// assert_eq!(eur.convert(rate).cents(), 10_850);
    /// ```
    pub fn convert(&self, rate: ExchangeRate) -> Money {
        let converted = div_round_half_even(
            self.0 as i128 * rate.micros() as i128,
            MICROS_PER_UNIT as i128,
        );
        Money(clamp_i64(converted))
    }

    /// Spreads this amount over `quantity` units.
    ///
    /// Returns zero for a non-positive quantity; callers validate quantities
    /// before dividing.
    pub fn per_unit(&self, quantity: i64) -> UnitCost {
        if quantity <= 0 {
            return UnitCost::zero();
        }
        let micros = div_round_half_even(
            self.0 as i128 * MICROS_PER_CENT as i128,
            quantity as i128,
        );
        UnitCost::from_micros(clamp_i64(micros))
    }

    /// Returns the amount in major units as a float (display only).
    pub fn to_major_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
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
// UnitCost
// =============================================================================

/// A per-unit cost in micro-units of the major currency unit.
///
/// ## Why Not Cents?
/// ```text
/// Freight $10.00 spread over 3 units = $3.333... per unit
///
///   in cents:  333 per unit → 999 cents rebuilt  (1 cent lost)
///   in micros: 3_333_333    → 999.9999 cents rebuilt (sub-cent drift only)
/// ```
/// Shared-cost totals stay exact in [`Money`]; only the per-unit view is
/// carried at the finer scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UnitCost(i64);

impl UnitCost {
    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        UnitCost(micros)
    }

    /// Creates a unit cost from whole cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        UnitCost(cents * MICROS_PER_CENT)
    }

    #[inline]
    pub const fn micros(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        UnitCost(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Extends a unit cost over a quantity, rounding to the cent.
    pub fn times_quantity(&self, quantity: i64) -> Money {
        let cents = div_round_half_even(
            self.0 as i128 * quantity as i128,
            MICROS_PER_CENT as i128,
        );
        Money::from_cents(clamp_i64(cents))
    }

    /// Rounds to the nearest cent.
    pub fn to_money(&self) -> Money {
        self.times_quantity(1)
    }

    /// Weighted mean of `(quantity, unit cost)` pairs.
    ///
    /// Returns `None` when the total quantity is not positive.
    ///
    /// ```rust
    /// use costing_core::money::UnitCost;
    ///
    /// let avg = UnitCost::weighted_mean([
    ///     (100, UnitCost::from_cents(10_000)),
    ///     (50, UnitCost::from_cents(12_000)),
    /// ])
    /// .unwrap();
    /// assert_eq!(avg.to_money().cents(), 10_667);
    /// ```
    pub fn weighted_mean<I>(layers: I) -> Option<UnitCost>
    where
        I: IntoIterator<Item = (i64, UnitCost)>,
    {
        let mut quantity: i128 = 0;
        let mut extended: i128 = 0;
        for (qty, cost) in layers {
            quantity += qty as i128;
            extended += qty as i128 * cost.micros() as i128;
        }
        if quantity <= 0 {
            return None;
        }
        Some(UnitCost(clamp_i64(div_round_half_even(extended, quantity))))
    }

    /// Returns the cost in major units as a float (display and scoring only).
    pub fn to_major_f64(&self) -> f64 {
        self.0 as f64 / MICROS_PER_UNIT as f64
    }
}

impl fmt::Display for UnitCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.to_major_f64())
    }
}

impl Default for UnitCost {
    fn default() -> Self {
        UnitCost::zero()
    }
}

impl Add for UnitCost {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        UnitCost(self.0 + other.0)
    }
}

impl AddAssign for UnitCost {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for UnitCost {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        UnitCost(self.0 - other.0)
    }
}

impl Sum for UnitCost {
    fn sum<I: Iterator<Item = UnitCost>>(iter: I) -> Self {
        iter.fold(UnitCost::zero(), |acc, c| acc + c)
    }
}

// =============================================================================
// ExchangeRate
// =============================================================================

/// A fixed conversion rate from a purchase-order currency to the base
/// currency, in micro-units (1.0 = 1_000_000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExchangeRate(i64);

impl ExchangeRate {
    /// Identity rate (base currency purchase orders).
    pub const PAR: ExchangeRate = ExchangeRate(MICROS_PER_UNIT);

    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        ExchangeRate(micros)
    }

    #[inline]
    pub const fn micros(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        ExchangeRate::PAR
    }
}

/// Returns `part / whole × 100`, or `None` when `whole` is zero.
pub fn percentage(part: i64, whole: i64) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    Some(part as f64 / whole as f64 * 100.0)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_even() {
        assert_eq!(div_round_half_even(5, 2), 2);
        assert_eq!(div_round_half_even(7, 2), 4);
        assert_eq!(div_round_half_even(-5, 2), -2);
        assert_eq!(div_round_half_even(10, 3), 3);
        assert_eq!(div_round_half_even(20, 3), 7);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_per_unit_and_back() {
        let freight = Money::from_cents(1000);
        let per_unit = freight.per_unit(3);
        assert_eq!(per_unit.micros(), 3_333_333);
        // Rebuilding loses less than a cent
        assert_eq!(per_unit.times_quantity(3).cents(), 1000);
    }

    #[test]
    fn test_per_unit_zero_quantity() {
        assert_eq!(Money::from_cents(1000).per_unit(0), UnitCost::zero());
    }

    #[test]
    fn test_convert() {
        let amount = Money::from_cents(1000);
        assert_eq!(amount.convert(ExchangeRate::PAR).cents(), 1000);
        assert_eq!(amount.convert(ExchangeRate::from_micros(1_500_000)).cents(), 1500);
        // 1000 × 0.333333 = 333.333 → 333
        assert_eq!(amount.convert(ExchangeRate::from_micros(333_333)).cents(), 333);
        // Exact halves round to even: 0.5 → 0, 1.5 → 2
        assert_eq!(amount.convert(ExchangeRate::from_micros(500)).cents(), 0);
        assert_eq!(Money::from_cents(3000).convert(ExchangeRate::from_micros(500)).cents(), 2);
    }

    #[test]
    fn test_weighted_mean() {
        let avg = UnitCost::weighted_mean([
            (100, UnitCost::from_cents(10_000)),
            (50, UnitCost::from_cents(12_000)),
        ])
        .unwrap();
        assert_eq!(avg.micros(), 106_666_667);
        assert!(UnitCost::weighted_mean(Vec::new()).is_none());
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money::from_cents(1), Money::from_cents(2)].into_iter().sum();
        assert_eq!(total.cents(), 3);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(25, 100), Some(25.0));
        assert_eq!(percentage(1, 0), None);
    }
}
