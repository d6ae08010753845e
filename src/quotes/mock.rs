//! Scriptable in-process quote provider
//!
//! Tests and standalone runs set ticks per stock code; lookups for unset
//! codes answer `EntityNotFound` like the real feed.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::core_types::StockCode;
use crate::errors::QuotesError;
use crate::models::Quotes;
use crate::quotes::{QuoteProvider, split_stock_code};

#[derive(Default)]
pub struct MockQuotes {
    ticks: DashMap<StockCode, Quotes>,
}

impl MockQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a full tick snapshot for `stock_code`.
    pub fn set_ticks(&self, stock_code: &str, quotes: Quotes) {
        self.ticks.insert(stock_code.to_string(), quotes);
    }

    /// Install a flat book: `current` everywhere, `ask1`/`bid1` as given.
    /// Zero on either side scripts a price limit.
    pub fn set_top_of_book(&self, stock_code: &str, current: Decimal, bid1: Decimal, ask1: Decimal) {
        let symbol = split_stock_code(stock_code)
            .map(|(symbol, _)| symbol.to_string())
            .unwrap_or_else(|_| stock_code.to_string());
        let quotes = Quotes {
            symbol,
            current,
            last_close: current,
            open: current,
            high: current,
            low: current,
            bid_p: [bid1; 5],
            bid_v: [100; 5],
            ask_p: [ask1; 5],
            ask_v: [100; 5],
            timestamp: Utc::now(),
        };
        self.ticks.insert(stock_code.to_string(), quotes);
    }

    /// Forget a code so lookups fail again.
    pub fn clear(&self, stock_code: &str) {
        self.ticks.remove(stock_code);
    }
}

#[async_trait]
impl QuoteProvider for MockQuotes {
    async fn get_ticks(&self, stock_code: &str) -> Result<Quotes, QuotesError> {
        self.ticks
            .get(stock_code)
            .map(|entry| entry.clone())
            .ok_or_else(|| QuotesError::EntityNotFound(stock_code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_set_and_get() {
        let provider = MockQuotes::new();
        provider.set_top_of_book("600519.SH", dec!(10), dec!(9.99), dec!(10.01));

        let quotes = provider.get_ticks("600519.SH").await.unwrap();
        assert_eq!(quotes.current, dec!(10));
        assert_eq!(quotes.bid1_p(), dec!(9.99));
        assert_eq!(quotes.ask1_p(), dec!(10.01));

        provider.clear("600519.SH");
        assert!(matches!(
            provider.get_ticks("600519.SH").await,
            Err(QuotesError::EntityNotFound(_))
        ));
    }
}
