//! Quote feed - level-1 tick consumption
//!
//! The provider itself is an external read-only service; the engines only
//! consume `get_ticks`. `http` adapts the hq text endpoint, `mock` is the
//! scriptable in-process provider for tests and standalone runs.

pub mod http;
pub mod mock;

use async_trait::async_trait;

use crate::errors::QuotesError;
use crate::models::Quotes;

/// Read-only tick source keyed by stock code (`600519.SH`).
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_ticks(&self, stock_code: &str) -> Result<Quotes, QuotesError>;
}

/// Split `600519.SH` into symbol and exchange suffix.
pub fn split_stock_code(stock_code: &str) -> Result<(&str, &str), QuotesError> {
    stock_code
        .split_once('.')
        .filter(|(symbol, exchange)| !symbol.is_empty() && !exchange.is_empty())
        .ok_or_else(|| QuotesError::Malformed(stock_code.to_string()))
}
