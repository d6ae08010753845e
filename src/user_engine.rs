//! User engine - the only writer of user financial state in the hot path
//!
//! Pre-trade validation freezes cash or shares atomically in the fast
//! store; post-trade mutation applies the fill to positions and balances
//! and emits the projection events the cache handlers consume. The serial
//! market worker guarantees at most one fill is being settled at a time,
//! so none of this needs cross-order locks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::cache::{FreezeOutcome, PositionCache, UserCache};
use crate::core_types::UserId;
use crate::errors::{OrderError, StoreError, ValidationError};
use crate::event::{BusHandle, Event, EventBus, EventHandler, EventKind};
use crate::models::{
    Costs, NewOrder, Order, OrderType, Position, TradeType, User, UserAssetsRecord, UserStatus,
};
use crate::quotes::QuoteProvider;
use crate::repository::{
    PositionRepository, UserAssetsRecordRepository, UserRepository,
};
use crate::session::TradingSession;

/// What pre-trade validation reserved: cash for buys, shares for sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frozen {
    Cash(Decimal),
    Volume(u64),
}

pub struct UserEngine {
    bus: BusHandle,
    user_repo: Arc<dyn UserRepository>,
    position_repo: Arc<dyn PositionRepository>,
    record_repo: Arc<dyn UserAssetsRecordRepository>,
    user_cache: Arc<dyn UserCache>,
    position_cache: Arc<dyn PositionCache>,
    quotes: Arc<dyn QuoteProvider>,
    session: TradingSession,
}

impl UserEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: BusHandle,
        user_repo: Arc<dyn UserRepository>,
        position_repo: Arc<dyn PositionRepository>,
        record_repo: Arc<dyn UserAssetsRecordRepository>,
        user_cache: Arc<dyn UserCache>,
        position_cache: Arc<dyn PositionCache>,
        quotes: Arc<dyn QuoteProvider>,
        session: TradingSession,
    ) -> Self {
        Self {
            bus,
            user_repo,
            position_repo,
            record_repo,
            user_cache,
            position_cache,
            quotes,
            session,
        }
    }

    /// Reload the cache from the durable store (when asked to) and attach
    /// the engine's event handlers.
    pub async fn startup(self: &Arc<Self>, bus: &EventBus) -> anyhow::Result<()> {
        self.load_store_to_cache().await?;
        self.register_events(bus).await;
        Ok(())
    }

    pub async fn shutdown(&self) {
        // State is flushed by the market-close settlement, not here.
    }

    async fn register_events(self: &Arc<Self>, bus: &EventBus) {
        let projection: Arc<dyn EventHandler> = Arc::new(CacheProjectionHandler {
            user_cache: Arc::clone(&self.user_cache),
            position_cache: Arc::clone(&self.position_cache),
        });
        bus.register(EventKind::UserUpdateAssets, Arc::clone(&projection))
            .await;
        bus.register(EventKind::PositionCreate, Arc::clone(&projection))
            .await;
        bus.register(EventKind::PositionUpdate, projection).await;
        bus.register(
            EventKind::Unfreeze,
            Arc::new(UnfreezeHandler {
                engine: Arc::clone(self),
            }),
        )
        .await;
        bus.register(
            EventKind::MarketClose,
            Arc::new(CloseSettlementHandler {
                engine: Arc::clone(self),
            }),
        )
        .await;
    }

    // ------------------------------------------------------------
    // Pre-trade validation
    // ------------------------------------------------------------

    /// Validate a submission against the caller's account and atomically
    /// reserve what it needs. Runs on the submitter's task; the freeze is
    /// the single read-modify-write that prevents double-spending.
    pub async fn pre_trade_validation(
        &self,
        order: &NewOrder,
        user: &User,
    ) -> Result<Frozen, OrderError> {
        if user.status == UserStatus::Terminated {
            return Err(ValidationError::AccountTerminated.into());
        }
        match order.order_type {
            OrderType::Buy => self.capital_validation(order, user).await,
            OrderType::Sell => self.position_validation(order, user).await,
            OrderType::Cancel => Ok(Frozen::Cash(Decimal::ZERO)),
        }
    }

    async fn capital_validation(
        &self,
        order: &NewOrder,
        user: &User,
    ) -> Result<Frozen, OrderError> {
        let cash_needs =
            Decimal::from(order.volume) * order.price * (Decimal::ONE + user.commission);
        match self.user_cache.freeze_cash(&user.id, cash_needs).await? {
            FreezeOutcome::Frozen => Ok(Frozen::Cash(cash_needs)),
            FreezeOutcome::Insufficient => Err(ValidationError::InsufficientFunds.into()),
        }
    }

    async fn position_validation(
        &self,
        order: &NewOrder,
        user: &User,
    ) -> Result<Frozen, OrderError> {
        match self
            .position_cache
            .freeze_volume(&user.id, &order.symbol, order.exchange, order.volume)
            .await
        {
            Ok(FreezeOutcome::Frozen) => Ok(Frozen::Volume(order.volume)),
            Ok(FreezeOutcome::Insufficient) => {
                Err(ValidationError::NotEnoughAvailablePositions.into())
            }
            Err(StoreError::EntityDoesNotExist) => {
                Err(ValidationError::NoPositionsAvailable.into())
            }
            Err(error) => Err(error.into()),
        }
    }

    // ------------------------------------------------------------
    // Post-trade position mutation
    // ------------------------------------------------------------

    /// Apply a buy fill: create or grow the position, then settle balances.
    /// Returns the order's securities value and the fees charged.
    pub async fn create_position(&self, order: &Order) -> anyhow::Result<(Decimal, Costs)> {
        if order.traded_volume == 0 {
            anyhow::bail!("buy fill with zero traded volume");
        }
        let user = self.user_cache.get_user(&order.user).await?;
        // T+1 keeps today's buys unsellable until the next trading day.
        let order_available = if order.trade_type == TradeType::T0 {
            order.traded_volume
        } else {
            0
        };
        let quotes = self.quotes.get_ticks(&order.stock_code()).await?;
        let traded = Decimal::from(order.traded_volume);
        let securities_order = traded * order.sold_price;
        let securities_diff = traded * quotes.current;
        let commission = securities_order * user.commission;
        let amount = securities_order + commission;

        match self
            .position_cache
            .get_position(&order.user, &order.symbol, order.exchange)
            .await
        {
            Err(StoreError::EntityDoesNotExist) => {
                let cost = amount / traded;
                let profit = (quotes.current - order.sold_price) * traded - commission;
                let position = Position {
                    user: order.user.clone(),
                    symbol: order.symbol.clone(),
                    exchange: order.exchange,
                    volume: order.traded_volume,
                    available_volume: order_available,
                    cost,
                    current_price: quotes.current,
                    profit,
                    first_buy_date: Some(Utc::now()),
                    last_sell_date: None,
                };
                self.bus.put(Event::PositionCreate(position));
            }
            Ok(mut position) => {
                let volume = position.volume + order.traded_volume;
                let volume_dec = Decimal::from(volume);
                // New basis folds the whole spend, fees included, into the
                // weighted average.
                let cost = (Decimal::from(position.volume) * position.cost + amount) / volume_dec;
                position.volume = volume;
                position.available_volume += order_available;
                position.cost = cost;
                position.current_price = quotes.current;
                position.profit = (quotes.current - cost) * volume_dec;
                self.bus.put(Event::PositionUpdate(position));
            }
            Err(error) => return Err(error.into()),
        }

        let costs = Costs {
            commission,
            tax: Decimal::ZERO,
            total: commission,
        };
        self.update_user(order, amount, securities_diff).await?;
        Ok((securities_order, costs))
    }

    /// Apply a sell fill: shrink or empty the position, then settle
    /// balances. The emptied position stays (volume 0) until the next
    /// liquidation pass deletes it.
    pub async fn reduce_position(&self, order: &Order) -> anyhow::Result<(Decimal, Costs)> {
        if order.traded_volume == 0 {
            anyhow::bail!("sell fill with zero traded volume");
        }
        let mut position = self
            .position_cache
            .get_position(&order.user, &order.symbol, order.exchange)
            .await?;
        let user = self.user_cache.get_user(&order.user).await?;

        let traded = Decimal::from(order.traded_volume);
        let commission = traded * order.sold_price * user.commission;
        let tax = traded * order.sold_price * user.tax_rate;
        let volume = position
            .volume
            .checked_sub(order.traded_volume)
            .ok_or_else(|| anyhow::anyhow!("sell fill exceeds held volume"))?;
        let quotes = self.quotes.get_ticks(&order.stock_code()).await?;
        let old_spent = Decimal::from(position.volume) * position.cost;

        if volume == 0 {
            let cost = (old_spent + commission + tax) / traded;
            position.volume = 0;
            position.available_volume = 0;
            position.cost = cost;
            position.profit = (quotes.current - cost) * traded;
        } else {
            let available = (position.available_volume + order.frozen_stock_volume)
                .saturating_sub(order.traded_volume);
            let volume_dec = Decimal::from(volume);
            let cost = (old_spent + commission + tax - order.sold_price * traded) / volume_dec;
            position.volume = volume;
            position.available_volume = available;
            position.cost = cost;
            position.profit = (quotes.current - cost) * volume_dec;
        }
        position.current_price = quotes.current;
        position.last_sell_date = Some(Utc::now());
        self.bus.put(Event::PositionUpdate(position));

        let costs = Costs {
            commission,
            tax,
            total: commission + tax,
        };
        let securities_diff = traded * order.sold_price;
        let amount = securities_diff - commission - tax;
        self.update_user(order, amount, securities_diff).await?;
        Ok((securities_diff, costs))
    }

    /// Settle a fill into the user's balances and publish the projection.
    async fn update_user(
        &self,
        order: &Order,
        amount: Decimal,
        securities_diff: Decimal,
    ) -> anyhow::Result<()> {
        let mut user = self.user_cache.get_user(&order.user).await?;
        if order.order_type == OrderType::Buy {
            user.cash -= amount;
            // Release the reservation, spend the actual amount.
            user.available_cash = user.available_cash + order.frozen_amount - amount;
            user.securities += securities_diff;
        } else {
            user.cash += amount;
            user.available_cash += amount;
            // Floored at zero; the periodic asset sync recomputes the
            // true mark-to-market figure.
            user.securities = (user.securities - securities_diff).max(Decimal::ZERO);
        }
        user.assets = user.cash + user.securities;
        self.bus.put(Event::UserUpdateAssets(user));
        Ok(())
    }

    // ------------------------------------------------------------
    // Unfreeze
    // ------------------------------------------------------------

    /// Release the reservations of a canceled or rejected order and ask
    /// for its persisted frozen fields to be cleared.
    pub async fn process_unfreeze(&self, order: &Order) -> anyhow::Result<()> {
        if !order.frozen_amount.is_zero() {
            self.user_cache
                .unfreeze_cash(&order.user, order.frozen_amount)
                .await?;
        }
        if order.frozen_stock_volume > 0 {
            self.position_cache
                .unfreeze_volume(
                    &order.user,
                    &order.symbol,
                    order.exchange,
                    order.frozen_stock_volume,
                )
                .await?;
        }
        self.bus.put(Event::OrderUpdateFrozen {
            entrust_id: order.entrust_id.clone(),
        });
        Ok(())
    }

    // ------------------------------------------------------------
    // Liquidation
    // ------------------------------------------------------------

    /// Mark every position of `user_id` to the current tick. With
    /// `refresh_volume` the T+1 locks are released and emptied positions
    /// are deleted.
    pub async fn liquidate_user_position(
        &self,
        user_id: &UserId,
        refresh_volume: bool,
    ) -> anyhow::Result<()> {
        let positions = self.position_cache.positions_by_user(user_id).await?;
        for mut position in positions {
            if refresh_volume && position.volume == 0 {
                self.position_cache
                    .delete_position(&position.user, &position.symbol, position.exchange)
                    .await?;
                continue;
            }
            let quotes = match self.quotes.get_ticks(&position.stock_code()).await {
                Ok(quotes) => quotes,
                Err(error) => {
                    warn!(
                        stock_code = %position.stock_code(),
                        %error,
                        "no ticks for position, mark skipped"
                    );
                    continue;
                }
            };
            position.current_price = quotes.current;
            if refresh_volume {
                position.available_volume = position.volume;
            }
            position.profit =
                (quotes.current - position.cost) * Decimal::from(position.volume);
            self.position_cache.update_position(&position).await?;
        }
        Ok(())
    }

    /// Recompute `securities` and `assets` from the marked positions. With
    /// `refresh_frozen` the cash reservations are reset (`available_cash =
    /// cash`).
    pub async fn liquidate_user_profit(
        &self,
        user_id: &UserId,
        refresh_frozen: bool,
    ) -> anyhow::Result<()> {
        let mut user = self.user_cache.get_user(user_id).await?;
        let positions = self.position_cache.positions_by_user(user_id).await?;
        let securities: Decimal = positions.iter().map(Position::market_value).sum();
        user.assets = user.cash + securities;
        if !securities.is_zero() {
            user.securities = securities;
        }
        if refresh_frozen {
            user.available_cash = user.cash;
        }
        self.user_cache.update_user_assets(&user).await?;
        Ok(())
    }

    /// Upsert today's (user, date) asset snapshot.
    pub async fn update_user_assets_record(&self, user_id: &UserId) -> anyhow::Result<()> {
        let user = self.user_cache.get_user(user_id).await?;
        let record = UserAssetsRecord::snapshot(&user, self.session.today());
        self.record_repo.upsert_record(&record).await?;
        Ok(())
    }

    /// In-session periodic mark: positions, profit, and the daily record,
    /// without touching reservations or volumes.
    pub async fn sync_user_assets(&self) -> anyhow::Result<()> {
        let users = self.user_cache.all_users().await?;
        for user in &users {
            if let Err(error) = self.sync_one_user(&user.id).await {
                warn!(user_id = %user.id, %error, "asset sync failed for user");
            }
        }
        Ok(())
    }

    async fn sync_one_user(&self, user_id: &UserId) -> anyhow::Result<()> {
        self.liquidate_user_position(user_id, false).await?;
        self.liquidate_user_profit(user_id, false).await?;
        self.update_user_assets_record(user_id).await
    }

    /// End-of-day settlement: release T+1 locks and reservations, delete
    /// emptied positions, snapshot every user, then flush the cache back
    /// to the durable store.
    pub async fn process_market_close(&self) -> anyhow::Result<()> {
        info!("end-of-day settlement started");
        let users = self.user_cache.all_users().await?;
        for user in &users {
            debug!(user_id = %user.id, "settling user");
            if let Err(error) = self.settle_user_at_close(&user.id).await {
                error!(user_id = %user.id, %error, "end-of-day settlement failed for user");
            }
        }
        self.flush_cache_to_store().await?;
        info!(users = users.len(), "end-of-day settlement finished");
        Ok(())
    }

    async fn settle_user_at_close(&self, user_id: &UserId) -> anyhow::Result<()> {
        self.liquidate_user_position(user_id, true).await?;
        self.liquidate_user_profit(user_id, true).await?;
        self.update_user_assets_record(user_id).await
    }

    // ------------------------------------------------------------
    // Cache reconciliation
    // ------------------------------------------------------------

    /// Bulk-load non-terminated users and their positions into the fast
    /// store when its reload flag is set.
    pub async fn load_store_to_cache(&self) -> anyhow::Result<()> {
        if !self.user_cache.is_reload().await? {
            return Ok(());
        }
        let users = self.user_repo.list_active_users().await?;
        self.user_cache.set_users(&users).await?;

        let loads = users
            .iter()
            .map(|user| self.position_repo.list_positions_by_user(&user.id));
        let positions: Vec<Position> = futures::future::join_all(loads)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();
        if !positions.is_empty() {
            self.position_cache.set_positions(&positions).await?;
        }
        self.user_cache.clear_reload_flag().await?;
        info!(users = users.len(), "fast store reloaded from durable store");
        Ok(())
    }

    /// Flush cached users and positions back with bulk upserts; positions
    /// the cache dropped are deleted from the store.
    pub async fn flush_cache_to_store(&self) -> anyhow::Result<()> {
        let users = self.user_cache.all_users().await?;
        self.user_repo.bulk_update_users(&users).await?;

        let mut upserts = Vec::new();
        let mut deletes = Vec::new();
        for user in &users {
            let cached = self.position_cache.positions_by_user(&user.id).await?;
            let stored = self.position_repo.list_positions_by_user(&user.id).await?;
            for position in stored {
                let still_cached = cached
                    .iter()
                    .any(|c| c.symbol == position.symbol && c.exchange == position.exchange);
                if !still_cached {
                    deletes.push((user.id.clone(), position.symbol, position.exchange));
                }
            }
            upserts.extend(cached);
        }
        if !upserts.is_empty() {
            self.position_repo.bulk_upsert_positions(&upserts).await?;
        }
        if !deletes.is_empty() {
            self.position_repo.bulk_delete_positions(&deletes).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // Account operations
    // ------------------------------------------------------------

    /// Apply a signed cash delta (deposit or withdrawal). Callers gate on
    /// the trading session.
    pub async fn adjust_user_cash(
        &self,
        user_id: &UserId,
        delta: Decimal,
    ) -> Result<User, OrderError> {
        let mut user = self.user_cache.get_user(user_id).await?;
        if user.available_cash + delta < Decimal::ZERO {
            return Err(ValidationError::InsufficientFunds.into());
        }
        user.cash += delta;
        user.available_cash += delta;
        user.assets = user.cash + user.securities;
        self.bus.put(Event::UserUpdateAssets(user.clone()));
        Ok(user)
    }

    /// Mark the account terminated and purge it from the fast store.
    pub async fn terminate_user(&self, user_id: &UserId) -> Result<(), StoreError> {
        let mut user = match self.user_cache.get_user(user_id).await {
            Ok(user) => user,
            Err(StoreError::EntityDoesNotExist) => {
                self.user_repo.get_user_by_id(user_id).await?
            }
            Err(error) => return Err(error),
        };
        user.status = UserStatus::Terminated;
        self.user_repo.update_user(&user).await?;
        self.user_cache.delete_user(user_id).await?;
        self.position_cache.delete_user_positions(user_id).await?;
        info!(user_id = %user_id, "account terminated");
        Ok(())
    }
}

// ------------------------------------------------------------
// Event handlers
// ------------------------------------------------------------

/// Applies projection events to the fast store.
struct CacheProjectionHandler {
    user_cache: Arc<dyn UserCache>,
    position_cache: Arc<dyn PositionCache>,
}

#[async_trait]
impl EventHandler for CacheProjectionHandler {
    fn name(&self) -> &str {
        "user_engine.cache_projection"
    }

    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::UserUpdateAssets(user) => self.user_cache.update_user_assets(&user).await?,
            Event::PositionCreate(position) => {
                self.position_cache.set_position(&position).await?
            }
            Event::PositionUpdate(position) => {
                self.position_cache.update_position(&position).await?
            }
            _ => {}
        }
        Ok(())
    }
}

struct UnfreezeHandler {
    engine: Arc<UserEngine>,
}

#[async_trait]
impl EventHandler for UnfreezeHandler {
    fn name(&self) -> &str {
        "user_engine.unfreeze"
    }

    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        if let Event::Unfreeze(order) = event {
            self.engine.process_unfreeze(&order).await?;
        }
        Ok(())
    }
}

struct CloseSettlementHandler {
    engine: Arc<UserEngine>,
}

#[async_trait]
impl EventHandler for CloseSettlementHandler {
    fn name(&self) -> &str {
        "user_engine.close_settlement"
    }

    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        if let Event::MarketClose = event {
            self.engine.process_market_close().await?;
        }
        Ok(())
    }
}
