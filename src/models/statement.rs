//! Statements: immutable trade records produced at fill

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{EntrustId, UserId};
use crate::models::enums::{Exchange, TradeCategory};

/// Fees charged on one fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Costs {
    pub commission: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl Costs {
    pub fn zero() -> Self {
        Self {
            commission: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }
}

/// Append-only trade record. Exactly one exists per terminal filled order,
/// keyed by `entrust_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub entrust_id: EntrustId,
    pub user: UserId,
    pub symbol: String,
    pub exchange: Exchange,
    pub trade_category: TradeCategory,
    pub volume: u64,
    pub sold_price: Decimal,
    /// Signed cash flow: negative for buys, positive for sells.
    pub amount: Decimal,
    pub costs: Costs,
    pub deal_time: DateTime<Utc>,
}
