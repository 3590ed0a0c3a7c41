//! # Loyalty Tiers
//!
//! Maps cumulative spend to a loyalty tier and its discount percentage.
//!
//! ## Tier Table
//! ```text
//! ┌────────────────────────┬──────┬───────────┐
//! │ total spent            │ tier │ discount  │
//! ├────────────────────────┼──────┼───────────┤
//! │ ≥ 5.000.000            │  5   │   30%     │
//! │ ≥ 2.500.000            │  4   │   25%     │
//! │ ≥ 1.000.000            │  3   │   20%     │
//! │ ≥   500.000            │  2   │   15%     │
//! │ ≥   100.000            │  1   │    0%     │
//! │ otherwise              │  0   │    0%     │
//! └────────────────────────┴──────┴───────────┘
//! ```
//!
//! Bands are checked from the highest threshold down; the first match wins.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

/// Spend thresholds, highest first: (minimum spend, tier level, discount %).
const TIER_BANDS: [(i64, u8, u8); 5] = [
    (5_000_000, 5, 30),
    (2_500_000, 4, 25),
    (1_000_000, 3, 20),
    (500_000, 2, 15),
    (100_000, 1, 0),
];

/// Highest tier level.
pub const MAX_TIER: u8 = 5;

/// A loyalty tier (0–5) with its discount percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Tier(u8);

impl Tier {
    /// The tier every new account starts at.
    pub const BASE: Tier = Tier(0);

    /// Builds a tier from its stored level. Levels above [`MAX_TIER`] clamp.
    pub fn from_level(level: i64) -> Self {
        Tier(level.clamp(0, MAX_TIER as i64) as u8)
    }

    #[inline]
    pub const fn level(&self) -> u8 {
        self.0
    }

    /// Discount percentage granted at this tier.
    pub fn discount_percent(&self) -> u8 {
        TIER_BANDS
            .iter()
            .find(|(_, level, _)| *level == self.0)
            .map(|(_, _, percent)| *percent)
            .unwrap_or(0)
    }

    /// Minimum cumulative spend needed to hold this tier.
    pub fn threshold(&self) -> Money {
        TIER_BANDS
            .iter()
            .find(|(_, level, _)| *level == self.0)
            .map(|(min, _, _)| Money::from_units(*min))
            .unwrap_or_else(Money::zero)
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::BASE
    }
}

/// Computes the tier for a cumulative spend.
///
/// ## Example
/// ```rust
/// use loyalty_core::money::Money;
/// use loyalty_core::tier::tier_for;
///
/// assert_eq!(tier_for(Money::from_units(99_999)).level(), 0);
/// assert_eq!(tier_for(Money::from_units(3_600_000)).level(), 4);
/// assert_eq!(tier_for(Money::from_units(3_600_000)).discount_percent(), 25);
/// ```
pub fn tier_for(total_spent: Money) -> Tier {
    TIER_BANDS
        .iter()
        .find(|(min, _, _)| total_spent.units() >= *min)
        .map(|(_, level, _)| Tier(*level))
        .unwrap_or(Tier::BASE)
}

// =============================================================================
// Unit Tests
// =============================================================================
