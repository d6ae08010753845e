//! Market engine - trading-hours gate and the matchmaking core
//!
//! Validated orders enter the entrust queue; a single worker resolves them
//! against the current top-of-book. Fills execute fully against level-1 or
//! requeue (price limits, unmet limit prices). The worker serializes every
//! order state transition, so settlement needs no cross-order locks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::core_types::EntrustId;
use crate::entrust_queue::{ControlEvent, EntrustQueue, QueueItem};
use crate::errors::ValidationError;
use crate::event::{BusHandle, Event, FillReport};
use crate::models::{Exchange, Order, OrderStatus, OrderType, PriceType};
use crate::quotes::QuoteProvider;
use crate::session::TradingSession;
use crate::user_engine::UserEngine;

/// Pause before re-examining a requeued order, so a queue holding only
/// orders waiting on the same tick does not spin against the feed.
const REQUEUE_PAUSE: Duration = Duration::from_millis(250);

pub struct MarketEngine {
    market_name: String,
    exchange_symbols: [Exchange; 2],
    bus: BusHandle,
    user_engine: Arc<UserEngine>,
    quotes: Arc<dyn QuoteProvider>,
    entrust_orders: Arc<EntrustQueue>,
    session: TradingSession,
    /// True while a matchmaking worker should keep running.
    matchmaking: Arc<AtomicBool>,
}

impl MarketEngine {
    pub fn new(
        bus: BusHandle,
        user_engine: Arc<UserEngine>,
        quotes: Arc<dyn QuoteProvider>,
        session: TradingSession,
    ) -> Self {
        Self {
            market_name: "china_a_market".to_string(),
            exchange_symbols: [Exchange::SH, Exchange::SZ],
            bus,
            user_engine,
            quotes,
            entrust_orders: Arc::new(EntrustQueue::new()),
            session,
            matchmaking: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn market_name(&self) -> &str {
        &self.market_name
    }

    /// Narrow (or retarget) the accepted exchanges; the default is SH+SZ.
    pub fn with_exchange_symbols(mut self, symbols: [Exchange; 2]) -> Self {
        self.exchange_symbols = symbols;
        self
    }

    pub fn is_trading_time(&self) -> bool {
        self.session.is_trading_time()
    }

    /// Start the matchmaking worker. Idempotent; the scheduler calls this
    /// on every session edge.
    pub fn start_matchmaking(self: &Arc<Self>) {
        if self.matchmaking.swap(true, Ordering::AcqRel) {
            return;
        }
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.matchmaking().await;
        });
        info!(market = %self.market_name, "matchmaking started");
    }

    /// Ask the worker to exit after the entry it is handling; a sentinel
    /// wakes it if the queue is empty.
    pub async fn stop_matchmaking(&self) {
        if self.matchmaking.swap(false, Ordering::AcqRel) {
            self.entrust_orders.put_control(ControlEvent::ExitEngine).await;
            info!(market = %self.market_name, "matchmaking stopping");
        }
    }

    pub async fn startup(self: &Arc<Self>) {
        self.start_matchmaking();
        info!(market = %self.market_name, "market engine started");
    }

    pub async fn shutdown(&self) {
        self.stop_matchmaking().await;
    }

    /// Accept a validated order: check its exchange, mark it `NotDone`,
    /// and enqueue it for the worker.
    pub async fn put(&self, order: Order) -> Result<(), ValidationError> {
        self.exchange_validation(&order)?;
        self.bus.put(Event::OrderUpdateStatus {
            entrust_id: order.entrust_id.clone(),
            status: OrderStatus::NotDone,
        });
        info!(entrust_id = %order.entrust_id, order_type = order.order_type.as_str(), "order received");
        self.entrust_orders.put(order).await;
        Ok(())
    }

    /// Drop a queued order (used by the refusal sweep once it rejects the
    /// persisted copy). Returns whether it was still queued.
    pub async fn remove_entrust(&self, entrust_id: &EntrustId) -> bool {
        self.entrust_orders.delete(entrust_id).await.is_some()
    }

    fn exchange_validation(&self, order: &Order) -> Result<(), ValidationError> {
        if self.exchange_symbols.contains(&order.exchange) {
            Ok(())
        } else {
            Err(ValidationError::InvalidExchange(order.exchange.to_string()))
        }
    }

    async fn matchmaking(&self) {
        while self.matchmaking.load(Ordering::Acquire) {
            let order = match self.entrust_orders.take().await {
                QueueItem::Control(ControlEvent::ExitEngine) => continue,
                QueueItem::Order(order) => *order,
            };
            match order.order_type {
                OrderType::Cancel => self.resolve_cancel(order).await,
                OrderType::Buy | OrderType::Sell => self.resolve_trade(order).await,
            }
        }
        info!(market = %self.market_name, "matchmaking stopped");
    }

    /// Cancel branch: delete the live target from the queue and release
    /// its reservation. A second cancel finds nothing and is dropped, so
    /// at most one canceled transition happens per entrust id.
    async fn resolve_cancel(&self, cancel: Order) {
        match self.entrust_orders.delete(&cancel.entrust_id).await {
            Some(target) => {
                self.bus.put(Event::OrderUpdateStatus {
                    entrust_id: target.entrust_id.clone(),
                    status: OrderStatus::Canceled,
                });
                self.bus.put(Event::Unfreeze(target));
                info!(entrust_id = %cancel.entrust_id, "entrust order canceled");
            }
            None => {
                info!(entrust_id = %cancel.entrust_id, "cancel target already processed");
            }
        }
    }

    async fn resolve_trade(&self, order: Order) {
        // The scheduler drives the session edges, but a skewed clock or a
        // missed firing must not let the worker match outside the session.
        if !self.session.is_trading_time() {
            self.requeue(order).await;
            return;
        }

        let quotes = match self.quotes.get_ticks(&order.stock_code()).await {
            Ok(quotes) => quotes,
            Err(error) => {
                warn!(
                    entrust_id = %order.entrust_id,
                    stock_code = %order.stock_code(),
                    %error,
                    "tick fetch failed, order dropped until the close sweep"
                );
                return;
            }
        };

        match order.order_type {
            OrderType::Buy => self.match_buy(order, quotes.ask1_p()).await,
            OrderType::Sell => self.match_sell(order, quotes.bid1_p()).await,
            OrderType::Cancel => {}
        }
    }

    /// Buys execute at ask1. A zero ask1 is the upper price limit (no
    /// sellers) and the order waits on the queue for a later tick.
    async fn match_buy(&self, mut order: Order, ask1: Decimal) {
        if ask1.is_zero() {
            self.requeue(order).await;
            return;
        }
        match order.price_type {
            PriceType::Market => {
                order.price = ask1;
            }
            PriceType::Limit => {
                if order.price < ask1 {
                    self.requeue(order).await;
                    return;
                }
                // Price improvement: the limit fills at the ask.
            }
        }
        order.sold_price = ask1;
        order.traded_volume = order.volume;
        self.save_order(order).await;
    }

    /// Sells mirror buys at bid1; zero bid1 is the lower price limit.
    async fn match_sell(&self, mut order: Order, bid1: Decimal) {
        if bid1.is_zero() {
            self.requeue(order).await;
            return;
        }
        match order.price_type {
            PriceType::Market => {
                order.price = bid1;
            }
            PriceType::Limit => {
                if order.price > bid1 {
                    self.requeue(order).await;
                    return;
                }
            }
        }
        order.sold_price = bid1;
        order.traded_volume = order.volume;
        self.save_order(order).await;
    }

    async fn requeue(&self, order: Order) {
        self.entrust_orders.put(order).await;
        tokio::time::sleep(REQUEUE_PAUSE).await;
    }

    /// Settle a matched order: apply it to the user's account, mark the
    /// order finished, and publish the fill for persistence.
    async fn save_order(&self, mut order: Order) {
        order.deal_time = Some(Utc::now());
        let result = match order.order_type {
            OrderType::Buy => self.user_engine.create_position(&order).await,
            OrderType::Sell => self.user_engine.reduce_position(&order).await,
            OrderType::Cancel => return,
        };
        let (securities_diff, costs) = match result {
            Ok(settled) => settled,
            Err(error) => {
                error!(
                    entrust_id = %order.entrust_id,
                    %error,
                    "fill settlement failed"
                );
                return;
            }
        };
        order.status = if order.volume == order.traded_volume {
            OrderStatus::AllFinished
        } else {
            OrderStatus::PartFinished
        };
        info!(
            entrust_id = %order.entrust_id,
            sold_price = %order.sold_price,
            traded_volume = order.traded_volume,
            "order filled"
        );
        self.bus.put(Event::OrderUpdate(order.clone()));
        self.bus.put(Event::StatementCreate(FillReport {
            order,
            costs,
            securities_diff,
        }));
    }
}
