//! HTTP adapter for the hq text tick endpoint
//!
//! The endpoint answers `GET <base_url>/<list>=sh600519` with a line per
//! security:
//!
//! ```text
//! var hq_str_sh600519="贵州茅台,1701.00,1700.01,1705.92,...";
//! ```
//!
//! Comma-separated fields: name, open, last_close, current, high, low,
//! bid, ask, volume, amount, then five (volume, price) bid levels, five
//! (volume, price) ask levels, date, time. A security the feed does not
//! know comes back with an empty quote string.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::errors::QuotesError;
use crate::models::Quotes;
use crate::quotes::{QuoteProvider, split_stock_code};

// Field offsets in the hq line.
const FIELD_OPEN: usize = 1;
const FIELD_LAST_CLOSE: usize = 2;
const FIELD_CURRENT: usize = 3;
const FIELD_HIGH: usize = 4;
const FIELD_LOW: usize = 5;
const FIELD_BID_LEVELS: usize = 10;
const FIELD_ASK_LEVELS: usize = 20;
const MIN_FIELDS: usize = 30;

pub struct HqClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HqClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    /// `600519.SH` -> `sh600519`, the feed's code format.
    fn feed_code(stock_code: &str) -> Result<String, QuotesError> {
        let (symbol, exchange) = split_stock_code(stock_code)?;
        Ok(format!("{}{}", exchange.to_lowercase(), symbol))
    }
}

#[async_trait]
impl QuoteProvider for HqClient {
    async fn get_ticks(&self, stock_code: &str) -> Result<Quotes, QuotesError> {
        let code = Self::feed_code(stock_code)?;
        let url = format!("{}/list={}", self.base_url, code);

        let request = async {
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| QuotesError::Transport(e.to_string()))?;
            response
                .text()
                .await
                .map_err(|e| QuotesError::Transport(e.to_string()))
        };
        let body = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| QuotesError::Timeout)??;

        parse_hq_line(stock_code, &body)
    }
}

fn parse_decimal(stock_code: &str, raw: &str) -> Result<Decimal, QuotesError> {
    Decimal::from_str(raw.trim()).map_err(|_| QuotesError::Malformed(stock_code.to_string()))
}

fn parse_volume(stock_code: &str, raw: &str) -> Result<u64, QuotesError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| QuotesError::Malformed(stock_code.to_string()))
}

/// Parse one `var hq_str_<code>="...";` line into a tick snapshot.
pub fn parse_hq_line(stock_code: &str, body: &str) -> Result<Quotes, QuotesError> {
    let (symbol, _) = split_stock_code(stock_code)?;
    let quoted = body
        .split_once('"')
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(inner, _)| inner)
        .ok_or_else(|| QuotesError::Malformed(stock_code.to_string()))?;

    if quoted.is_empty() {
        return Err(QuotesError::EntityNotFound(stock_code.to_string()));
    }

    let fields: Vec<&str> = quoted.split(',').collect();
    if fields.len() < MIN_FIELDS {
        return Err(QuotesError::Malformed(stock_code.to_string()));
    }

    let mut bid_p = [Decimal::ZERO; 5];
    let mut bid_v = [0u64; 5];
    let mut ask_p = [Decimal::ZERO; 5];
    let mut ask_v = [0u64; 5];
    for level in 0..5 {
        bid_v[level] = parse_volume(stock_code, fields[FIELD_BID_LEVELS + level * 2])?;
        bid_p[level] = parse_decimal(stock_code, fields[FIELD_BID_LEVELS + level * 2 + 1])?;
        ask_v[level] = parse_volume(stock_code, fields[FIELD_ASK_LEVELS + level * 2])?;
        ask_p[level] = parse_decimal(stock_code, fields[FIELD_ASK_LEVELS + level * 2 + 1])?;
    }

    Ok(Quotes {
        symbol: symbol.to_string(),
        current: parse_decimal(stock_code, fields[FIELD_CURRENT])?,
        last_close: parse_decimal(stock_code, fields[FIELD_LAST_CLOSE])?,
        open: parse_decimal(stock_code, fields[FIELD_OPEN])?,
        high: parse_decimal(stock_code, fields[FIELD_HIGH])?,
        low: parse_decimal(stock_code, fields[FIELD_LOW])?,
        bid_p,
        bid_v,
        ask_p,
        ask_v,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = concat!(
        "var hq_str_sh600519=\"贵州茅台,1701.00,1700.01,1705.92,1710.00,1695.00,",
        "1705.90,1705.92,2651900,4520340000.00,",
        "100,1705.90,200,1705.80,300,1705.70,400,1705.60,500,1705.50,",
        "120,1705.92,220,1706.00,320,1706.10,420,1706.20,520,1706.30,",
        "2026-07-31,14:59:57,00\";"
    );

    #[test]
    fn test_parse_hq_line() {
        let quotes = parse_hq_line("600519.SH", SAMPLE).unwrap();
        assert_eq!(quotes.symbol, "600519");
        assert_eq!(quotes.current, dec!(1705.92));
        assert_eq!(quotes.last_close, dec!(1700.01));
        assert_eq!(quotes.bid1_p(), dec!(1705.90));
        assert_eq!(quotes.ask1_p(), dec!(1705.92));
        assert_eq!(quotes.bid_v[0], 100);
        assert_eq!(quotes.ask_v[4], 520);
    }

    #[test]
    fn test_empty_quote_is_not_found() {
        let body = "var hq_str_sh000000=\"\";";
        assert_eq!(
            parse_hq_line("000000.SH", body),
            Err(QuotesError::EntityNotFound("000000.SH".to_string()))
        );
    }

    #[test]
    fn test_short_line_is_malformed() {
        let body = "var hq_str_sh600519=\"a,b,c\";";
        assert!(matches!(
            parse_hq_line("600519.SH", body),
            Err(QuotesError::Malformed(_))
        ));
    }

    #[test]
    fn test_feed_code() {
        assert_eq!(HqClient::feed_code("600519.SH").unwrap(), "sh600519");
        assert_eq!(HqClient::feed_code("000001.SZ").unwrap(), "sz000001");
        assert!(HqClient::feed_code("600519").is_err());
    }
}
