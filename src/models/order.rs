//! Orders: the submission shape, the stored shape, and the receipt

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{EntrustId, StockCode, UserId};
use crate::models::enums::{Exchange, OrderStatus, OrderType, PriceType, TradeType};

/// An order as submitted by the adapter, before validation and enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub symbol: String,
    pub exchange: Exchange,
    pub volume: u64,
    /// Zero encodes a market order.
    pub price: Decimal,
    pub order_type: OrderType,
    pub trade_type: TradeType,
}

/// An order as persisted and matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Durable-store document id, absent until first insert.
    pub id: Option<String>,
    /// Public correlation key across events and cancel requests.
    pub entrust_id: EntrustId,
    pub user: UserId,
    pub symbol: String,
    pub exchange: Exchange,
    pub volume: u64,
    pub price: Decimal,
    pub price_type: PriceType,
    pub order_type: OrderType,
    pub trade_type: TradeType,
    pub status: OrderStatus,
    pub traded_volume: u64,
    /// Execution price once filled.
    pub sold_price: Decimal,
    pub deal_time: Option<DateTime<Utc>>,
    /// Cash reserved at submission for buys, released at terminal status.
    pub frozen_amount: Decimal,
    /// Shares reserved at submission for sells, released at terminal status.
    pub frozen_stock_volume: u64,
    /// Scopes the end-of-day refusal sweep.
    pub order_date: DateTime<Utc>,
}

impl Order {
    /// Quote-feed lookup key, `SYMBOL.EXCHANGE`.
    pub fn stock_code(&self) -> StockCode {
        format!("{}.{}", self.symbol, self.exchange)
    }

    /// Build the stored shape from a validated submission.
    pub fn from_new(new_order: &NewOrder, user: UserId, entrust_id: EntrustId) -> Self {
        let price_type = if new_order.price.is_zero() {
            PriceType::Market
        } else {
            PriceType::Limit
        };
        Self {
            id: None,
            entrust_id,
            user,
            symbol: new_order.symbol.clone(),
            exchange: new_order.exchange,
            volume: new_order.volume,
            price: new_order.price,
            price_type,
            order_type: new_order.order_type,
            trade_type: new_order.trade_type,
            status: OrderStatus::Submitting,
            traded_volume: 0,
            sold_price: Decimal::ZERO,
            deal_time: None,
            frozen_amount: Decimal::ZERO,
            frozen_stock_volume: 0,
            order_date: Utc::now(),
        }
    }

    /// Derive the cancel order targeting this order's entrust id.
    pub fn to_cancel(&self) -> Self {
        let mut cancel = self.clone();
        cancel.id = None;
        cancel.order_type = OrderType::Cancel;
        cancel.status = OrderStatus::Submitting;
        cancel.frozen_amount = Decimal::ZERO;
        cancel.frozen_stock_volume = 0;
        cancel
    }
}

/// What the submitter gets back: the correlation key for later queries
/// and cancels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub entrust_id: EntrustId,
}
