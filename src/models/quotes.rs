//! Level-1 tick snapshot delivered by the quote feed

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Five price levels each side plus the day's reference prices.
///
/// A zero `ask1` means the security is at its upper price limit (no
/// sellers); a zero `bid1` means the lower limit (no buyers). The matcher
/// requeues against those instead of rejecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quotes {
    pub symbol: String,
    pub current: Decimal,
    pub last_close: Decimal,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    /// Bid prices, best first.
    pub bid_p: [Decimal; 5],
    /// Bid volumes, aligned with `bid_p`.
    pub bid_v: [u64; 5],
    /// Ask prices, best first.
    pub ask_p: [Decimal; 5],
    /// Ask volumes, aligned with `ask_p`.
    pub ask_v: [u64; 5],
    pub timestamp: DateTime<Utc>,
}

impl Quotes {
    /// Best ask price (level 1).
    #[inline]
    pub fn ask1_p(&self) -> Decimal {
        self.ask_p[0]
    }

    /// Best bid price (level 1).
    #[inline]
    pub fn bid1_p(&self) -> Decimal {
        self.bid_p[0]
    }
}
