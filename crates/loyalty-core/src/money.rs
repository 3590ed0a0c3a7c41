//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Float discount math drifts:                                            │
//! │    100000 × 0.15 → 15000.000000000002  ❌                               │
//! │                                                                         │
//! │  OUR SOLUTION: Integer currency units                                   │
//! │    (100000 × 15 + 50) / 100 = 15000                                     │
//! │    Rounding is explicit (half-up) and happens exactly once             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts are whole currency units (the till works in Rupiah, which has no
//! minor unit in practice). Loyalty thresholds use the same unit.
//!
//! ## Usage
//! ```rust
//! use loyalty_core::money::Money;
//!
//! let subtotal = Money::from_units(100_000);
//! let total = subtotal.apply_percentage_discount(15);
//! assert_eq!(total.units(), 85_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in whole currency units.
///
/// ## Design Decisions
/// - **i64 (signed)**: subtraction never wraps; negative values are rejected by
///   validation rather than by the type
/// - **Single field tuple struct**: zero-cost abstraction over i64
///
/// ## Where Money is Used
/// ```text
/// OrderItem.line_price ──► Order subtotal ──► discount ──► Order total_price
///                                                              │
///                                                              ▼
///                                          LoyaltyAccount.total_spent += total
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from whole currency units.
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::money::Money;
    ///
    /// let price = Money::from_units(25_000);
    /// assert_eq!(price.units(), 25_000);
    /// ```
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Money(units)
    }

    /// Returns the value in whole currency units.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0
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

    /// Calculates `percent`% of this amount, rounded half-up.
    ///
    /// ## Implementation
    /// Integer math: `(amount * percent + 50) / 100`.
    /// i128 keeps large amounts from overflowing.
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::money::Money;
    ///
    /// let subtotal = Money::from_units(100_000);
    /// assert_eq!(subtotal.discount_amount(15).units(), 15_000);
    ///
    /// // 333 × 15% = 49.95 → 50
    /// assert_eq!(Money::from_units(333).discount_amount(15).units(), 50);
    /// ```
    pub fn discount_amount(&self, percent: u8) -> Money {
        let amount = (self.0 as i128 * percent as i128 + 50) / 100;
        Money::from_units(amount as i64)
    }

    /// Applies a percentage discount and returns the discounted total.
    ///
    /// ## User Workflow
    /// ```text
    /// Subtotal: 100.000
    ///      │
    ///      ▼
    /// apply_percentage_discount(15) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// Total: 85.000
    /// ```
    pub fn apply_percentage_discount(&self, percent: u8) -> Money {
        *self - self.discount_amount(percent)
    }

    /// Adds two amounts, `None` on overflow.
    ///
    /// Sums of caller-supplied amounts (line prices, lifetime spend) go
    /// through here.
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::money::Money;
    ///
    /// let a = Money::from_units(60_000);
    /// assert_eq!(a.checked_add(Money::from_units(40_000)), Some(Money::from_units(100_000)));
    /// assert_eq!(Money::from_units(i64::MAX).checked_add(Money::from_units(1)), None);
    /// ```
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(units) => Some(Money(units)),
            None => None,
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display groups thousands with dots, e.g. `Rp 1.250.000`.
///
/// ## Note
/// This is for logs and debugging. Receipt formatting belongs to the frontend.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}Rp {}", sign, grouped)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
