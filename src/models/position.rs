//! Positions: one holding per (user, symbol, exchange)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{StockCode, UserId};
use crate::models::enums::Exchange;

/// A user's holding in one security.
///
/// Invariant: `0 <= available_volume <= volume`. `available_volume` lags
/// `volume` when shares were bought today under T+1 or are frozen by an
/// open sell. A position whose volume reaches zero is deleted at the next
/// liquidation pass, not at fill time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub user: UserId,
    pub symbol: String,
    pub exchange: Exchange,
    pub volume: u64,
    pub available_volume: u64,
    /// Average cost basis per share.
    pub cost: Decimal,
    /// Last mark.
    pub current_price: Decimal,
    /// `(current_price - cost) * volume` at the last mark.
    pub profit: Decimal,
    pub first_buy_date: Option<DateTime<Utc>>,
    pub last_sell_date: Option<DateTime<Utc>>,
}

impl Position {
    pub fn stock_code(&self) -> StockCode {
        format!("{}.{}", self.symbol, self.exchange)
    }

    /// Mark-to-market value at the last recorded price.
    pub fn market_value(&self) -> Decimal {
        self.current_price * Decimal::from(self.volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_value() {
        let position = Position {
            user: "u".into(),
            symbol: "600519".into(),
            exchange: Exchange::SH,
            volume: 200,
            available_volume: 100,
            cost: dec!(10),
            current_price: dec!(12.5),
            profit: dec!(500),
            first_buy_date: Some(Utc::now()),
            last_sell_date: None,
        };
        assert_eq!(position.market_value(), dec!(2500));
        assert_eq!(position.stock_code(), "600519.SH");
    }
}
