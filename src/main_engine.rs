//! Main engine - the front door for order submission
//!
//! Composes the sub-engines, registers the persistence handlers that turn
//! lifecycle events into document-store writes, runs the end-of-day refusal
//! sweep, and reloads open orders at startup.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::cache::{PositionCache, UserCache};
use crate::core_types::{EntrustId, UserId, new_object_id};
use crate::errors::{OrderError, StoreError};
use crate::event::{BusHandle, Event, EventBus, EventHandler, EventKind, FillReport};
use crate::market_engine::MarketEngine;
use crate::models::{
    NewOrder, Order, OrderReceipt, OrderStatus, OrderType, Position, Statement, TradeCategory,
    User,
};
use crate::quotes::QuoteProvider;
use crate::repository::{
    OrderQuery, OrderRepository, PositionRepository, StatementRepository,
    UserAssetsRecordRepository, UserRepository,
};
use crate::session::TradingSession;
use crate::user_engine::{Frozen, UserEngine};

/// Every store and feed the engines consume, injected at construction.
#[derive(Clone)]
pub struct EngineContext {
    pub user_repo: Arc<dyn UserRepository>,
    pub order_repo: Arc<dyn OrderRepository>,
    pub position_repo: Arc<dyn PositionRepository>,
    pub statement_repo: Arc<dyn StatementRepository>,
    pub record_repo: Arc<dyn UserAssetsRecordRepository>,
    pub user_cache: Arc<dyn UserCache>,
    pub position_cache: Arc<dyn PositionCache>,
    pub quotes: Arc<dyn QuoteProvider>,
}

impl EngineContext {
    /// Memory-backed context for tests and standalone runs.
    pub fn in_memory(quotes: Arc<dyn QuoteProvider>) -> Self {
        use crate::cache::memory::{MemoryPositionCache, MemoryUserCache};
        use crate::repository::memory::{
            MemoryOrderRepository, MemoryPositionRepository, MemoryStatementRepository,
            MemoryUserAssetsRecordRepository, MemoryUserRepository,
        };
        Self {
            user_repo: Arc::new(MemoryUserRepository::new()),
            order_repo: Arc::new(MemoryOrderRepository::new()),
            position_repo: Arc::new(MemoryPositionRepository::new()),
            statement_repo: Arc::new(MemoryStatementRepository::new()),
            record_repo: Arc::new(MemoryUserAssetsRecordRepository::new()),
            user_cache: Arc::new(MemoryUserCache::new()),
            position_cache: Arc::new(MemoryPositionCache::new()),
            quotes,
        }
    }
}

pub struct MainEngine {
    bus: Arc<EventBus>,
    context: EngineContext,
    session: TradingSession,
    pub user_engine: Arc<UserEngine>,
    pub market_engine: Arc<MarketEngine>,
}

impl MainEngine {
    pub fn new(context: EngineContext, session: TradingSession) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let user_engine = Arc::new(UserEngine::new(
            bus.handle(),
            Arc::clone(&context.user_repo),
            Arc::clone(&context.position_repo),
            Arc::clone(&context.record_repo),
            Arc::clone(&context.user_cache),
            Arc::clone(&context.position_cache),
            Arc::clone(&context.quotes),
            session.clone(),
        ));
        let market_engine = Arc::new(MarketEngine::new(
            bus.handle(),
            Arc::clone(&user_engine),
            Arc::clone(&context.quotes),
            session.clone(),
        ));
        Arc::new(Self {
            bus,
            context,
            session,
            user_engine,
            market_engine,
        })
    }

    pub fn bus(&self) -> BusHandle {
        self.bus.handle()
    }

    pub fn session(&self) -> &TradingSession {
        &self.session
    }

    /// Bring the whole stack up: bus first, then persistence handlers (the
    /// refusal sweep before the user engine's close settlement, so swept
    /// reservations are released before `available_cash` is refreshed),
    /// then the sub-engines, then the open-order reload.
    pub async fn startup(self: &Arc<Self>) -> anyhow::Result<()> {
        self.bus.startup().await;
        self.register_events().await;
        self.user_engine.startup(&self.bus).await?;
        self.market_engine.startup().await;
        self.load_entrust_orders().await?;
        info!("main engine started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.market_engine.shutdown().await;
        self.user_engine.shutdown().await;
        self.bus.shutdown();
        info!("main engine stopped");
    }

    async fn register_events(self: &Arc<Self>) {
        let persist: Arc<dyn EventHandler> = Arc::new(OrderPersistHandler {
            order_repo: Arc::clone(&self.context.order_repo),
        });
        self.bus
            .register(EventKind::OrderCreate, Arc::clone(&persist))
            .await;
        self.bus
            .register(EventKind::OrderUpdate, Arc::clone(&persist))
            .await;
        self.bus
            .register(EventKind::OrderUpdateStatus, Arc::clone(&persist))
            .await;
        self.bus
            .register(EventKind::OrderUpdateFrozen, persist)
            .await;
        self.bus
            .register(
                EventKind::StatementCreate,
                Arc::new(StatementPersistHandler {
                    statement_repo: Arc::clone(&self.context.statement_repo),
                }),
            )
            .await;
        self.bus
            .register(
                EventKind::MarketClose,
                Arc::new(CloseSweepHandler {
                    order_repo: Arc::clone(&self.context.order_repo),
                    user_engine: Arc::clone(&self.user_engine),
                    market_engine: Arc::clone(&self.market_engine),
                    bus: self.bus.handle(),
                }),
            )
            .await;
    }

    // ------------------------------------------------------------
    // Order intake
    // ------------------------------------------------------------

    /// Validate, freeze, persist, and enqueue a new order. The returned
    /// entrust id is the caller's handle for queries and cancels.
    pub async fn on_order_arrived(
        &self,
        new_order: NewOrder,
        user: &User,
    ) -> Result<OrderReceipt, OrderError> {
        let frozen = self
            .user_engine
            .pre_trade_validation(&new_order, user)
            .await?;
        let mut order = Order::from_new(&new_order, user.id.clone(), new_object_id());
        match frozen {
            Frozen::Cash(amount) => order.frozen_amount = amount,
            Frozen::Volume(volume) => order.frozen_stock_volume = volume,
        }
        let receipt = OrderReceipt {
            entrust_id: order.entrust_id.clone(),
        };
        self.bus.put(Event::OrderCreate(order.clone()));
        self.market_engine
            .put(order)
            .await
            .map_err(OrderError::Validation)?;
        Ok(receipt)
    }

    /// Issue a cancel order against an open entrust on behalf of `user`.
    pub async fn on_order_cancel(
        &self,
        entrust_id: &EntrustId,
        user: &User,
    ) -> Result<OrderReceipt, OrderError> {
        let target = self
            .context
            .order_repo
            .get_order_by_entrust_id(entrust_id)
            .await?;
        if target.user != user.id {
            // Foreign entrust ids look exactly like unknown ones.
            return Err(StoreError::EntityDoesNotExist.into());
        }
        let cancel = target.to_cancel();
        let receipt = OrderReceipt {
            entrust_id: cancel.entrust_id.clone(),
        };
        self.market_engine
            .put(cancel)
            .await
            .map_err(OrderError::Validation)?;
        Ok(receipt)
    }

    /// Reload today's still-open orders into the matchmaking queue.
    /// Orders are scoped by their UTC `order_date`, the clock they were
    /// stamped with.
    async fn load_entrust_orders(&self) -> anyhow::Result<()> {
        let today = Utc::now().date_naive();
        let open = self
            .context
            .order_repo
            .list_orders(&OrderQuery {
                status: vec![
                    OrderStatus::Submitting,
                    OrderStatus::NotDone,
                    OrderStatus::PartFinished,
                ],
                start_date: Some(today),
                end_date: Some(today),
                ..OrderQuery::default()
            })
            .await?;
        let count = open.len();
        for order in open {
            if let Err(error) = self.market_engine.put(order).await {
                warn!(%error, "carried-over order refused by the market engine");
            }
        }
        if count > 0 {
            info!(orders = count, "entrust orders reloaded");
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // Scheduler triggers
    // ------------------------------------------------------------

    /// Post the market-close event (refusal sweep + settlement + flush).
    pub fn trigger_market_close(&self) {
        self.bus.put(Event::MarketClose);
    }

    /// In-session periodic asset sync.
    pub async fn trigger_sync_user_assets(&self) -> anyhow::Result<()> {
        self.user_engine.sync_user_assets().await
    }

    // ------------------------------------------------------------
    // Adapter queries
    // ------------------------------------------------------------

    /// Open an account funded with `capital`, persisted and cached.
    pub async fn register_user(
        &self,
        capital: Decimal,
        desc: Option<String>,
    ) -> Result<User, StoreError> {
        let mut user = User::activated(new_object_id(), capital);
        user.desc = desc;
        self.context.user_repo.create_user(&user).await?;
        self.context.user_cache.set_user(&user).await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Resolve a user for request handling: the cache first, the durable
    /// store for accounts not active this session.
    pub async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError> {
        match self.context.user_cache.get_user(user_id).await {
            Ok(user) => Ok(user),
            Err(StoreError::EntityDoesNotExist) => {
                self.context.user_repo.get_user_by_id(user_id).await
            }
            Err(error) => Err(error),
        }
    }

    pub async fn get_order(&self, entrust_id: &EntrustId) -> Result<Order, StoreError> {
        self.context
            .order_repo
            .get_order_by_entrust_id(entrust_id)
            .await
    }

    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        self.context.order_repo.list_orders(query).await
    }

    /// Positions served from the fast store, the in-session authority.
    pub async fn list_positions(&self, user_id: &UserId) -> Result<Vec<Position>, StoreError> {
        self.context.position_cache.positions_by_user(user_id).await
    }

    pub async fn list_statements(&self, user_id: &UserId) -> Result<Vec<Statement>, StoreError> {
        self.context
            .statement_repo
            .list_statements_by_user(user_id)
            .await
    }
}

// ------------------------------------------------------------
// Persistence handlers
// ------------------------------------------------------------

/// Writes order lifecycle events to the durable store.
struct OrderPersistHandler {
    order_repo: Arc<dyn OrderRepository>,
}

#[async_trait]
impl EventHandler for OrderPersistHandler {
    fn name(&self) -> &str {
        "main_engine.order_persist"
    }

    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::OrderCreate(order) => self.order_repo.create_order(&order).await?,
            Event::OrderUpdate(order) => self.order_repo.update_order(&order).await?,
            Event::OrderUpdateStatus { entrust_id, status } => {
                self.order_repo
                    .update_order_status(&entrust_id, status)
                    .await?
            }
            Event::OrderUpdateFrozen { entrust_id } => {
                self.order_repo.clear_frozen(&entrust_id).await?
            }
            _ => {}
        }
        Ok(())
    }
}

/// Turns fill reports into signed statements.
struct StatementPersistHandler {
    statement_repo: Arc<dyn StatementRepository>,
}

/// Build the statement for a fill; `None` for order types that leave no
/// trade record.
pub fn statement_from_fill(report: &FillReport) -> Option<Statement> {
    let order = &report.order;
    let (trade_category, amount) = match order.order_type {
        // Money leaves the account on buys.
        OrderType::Buy => (
            TradeCategory::Buy,
            -(report.securities_diff + report.costs.total),
        ),
        OrderType::Sell => (
            TradeCategory::Sell,
            report.securities_diff - report.costs.total,
        ),
        OrderType::Cancel => return None,
    };
    Some(Statement {
        entrust_id: order.entrust_id.clone(),
        user: order.user.clone(),
        symbol: order.symbol.clone(),
        exchange: order.exchange,
        trade_category,
        volume: order.traded_volume,
        sold_price: order.sold_price,
        amount,
        costs: report.costs.clone(),
        deal_time: order.deal_time.unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl EventHandler for StatementPersistHandler {
    fn name(&self) -> &str {
        "main_engine.statement_persist"
    }

    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        if let Event::StatementCreate(report) = event {
            if let Some(statement) = statement_from_fill(&report) {
                self.statement_repo.create_statement(&statement).await?;
            }
        }
        Ok(())
    }
}

/// End-of-day refusal sweep: every `NotDone` order dated today becomes
/// `Rejected` and its reservation is released. Runs before the user
/// engine's close settlement (registration order), so the release lands
/// before `available_cash` is refreshed.
struct CloseSweepHandler {
    order_repo: Arc<dyn OrderRepository>,
    user_engine: Arc<UserEngine>,
    market_engine: Arc<MarketEngine>,
    bus: BusHandle,
}

#[async_trait]
impl EventHandler for CloseSweepHandler {
    fn name(&self) -> &str {
        "main_engine.close_sweep"
    }

    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        if !matches!(event, Event::MarketClose) {
            return Ok(());
        }
        let today = Utc::now().date_naive();
        let open = self
            .order_repo
            .list_orders(&OrderQuery {
                status: vec![OrderStatus::NotDone],
                start_date: Some(today),
                end_date: Some(today),
                ..OrderQuery::default()
            })
            .await?;
        let count = open.len();
        for mut order in open {
            self.market_engine.remove_entrust(&order.entrust_id).await;
            order.status = OrderStatus::Rejected;
            self.bus.put(Event::OrderUpdate(order.clone()));
            if let Err(error) = self.user_engine.process_unfreeze(&order).await {
                error!(entrust_id = %order.entrust_id, %error, "unfreeze failed during close sweep");
            }
        }
        if count > 0 {
            info!(orders = count, "unfilled entrust orders refused at close");
        }
        Ok(())
    }
}
