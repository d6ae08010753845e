//! End-to-end flows through the full engine stack: memory-backed stores,
//! scripted quote feed, real event bus and matchmaking worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use papertrade::cache::PositionCache;
use papertrade::core_types::new_object_id;
use papertrade::errors::{OrderError, ValidationError};
use papertrade::main_engine::{EngineContext, MainEngine};
use papertrade::models::{
    Exchange, NewOrder, Order, OrderStatus, OrderType, Position, TradeCategory, TradeType, User,
};
use papertrade::quotes::QuoteProvider;
use papertrade::quotes::mock::MockQuotes;
use papertrade::repository::{
    OrderQuery, OrderRepository, PositionRepository, UserAssetsRecordRepository, UserRepository,
};
use papertrade::session::TradingSession;

struct TestStack {
    engine: Arc<MainEngine>,
    context: EngineContext,
    quotes: Arc<MockQuotes>,
}

/// Session offset chosen so the local clock reads 10:xx right now, inside
/// the morning trading window.
fn open_session() -> TradingSession {
    let utc_hour = Utc::now().hour() as i32;
    let mut offset = 10 - utc_hour;
    if offset > 12 {
        offset -= 24;
    }
    if offset < -11 {
        offset += 24;
    }
    TradingSession::china_a(offset)
}

async fn stack() -> TestStack {
    let quotes = Arc::new(MockQuotes::new());
    let context = EngineContext::in_memory(Arc::clone(&quotes) as Arc<dyn QuoteProvider>);
    let engine = MainEngine::new(context.clone(), open_session());
    engine.startup().await.unwrap();
    TestStack {
        engine,
        context,
        quotes,
    }
}

async fn drain() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

/// Long enough to cover a couple of requeue pauses plus bus drains.
async fn drain_long() {
    tokio::time::sleep(Duration::from_millis(800)).await;
}

fn buy(volume: u64, price: Decimal) -> NewOrder {
    NewOrder {
        symbol: "600519".to_string(),
        exchange: Exchange::SH,
        volume,
        price,
        order_type: OrderType::Buy,
        trade_type: TradeType::T0,
    }
}

fn sell(volume: u64, price: Decimal) -> NewOrder {
    NewOrder {
        order_type: OrderType::Sell,
        ..buy(volume, price)
    }
}

#[tokio::test]
async fn successful_buy_settles_position_statement_and_balances() {
    let stack = stack().await;
    let user = stack.engine.register_user(dec!(1_000_000), None).await.unwrap();
    stack
        .quotes
        .set_top_of_book("600519.SH", dec!(10), dec!(9.99), dec!(10));

    let receipt = stack
        .engine
        .on_order_arrived(buy(100, dec!(10)), &user)
        .await
        .unwrap();
    drain().await;

    let order = stack.engine.get_order(&receipt.entrust_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::AllFinished);
    assert_eq!(order.traded_volume, 100);
    assert_eq!(order.sold_price, dec!(10));
    assert!(order.deal_time.is_some());

    let positions = stack.engine.list_positions(&user.id).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].volume, 100);
    assert_eq!(positions[0].available_volume, 100);

    let statements = stack.engine.list_statements(&user.id).await.unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].entrust_id, receipt.entrust_id);
    assert_eq!(statements[0].trade_category, TradeCategory::Buy);
    assert_eq!(statements[0].volume, 100);
    assert_eq!(statements[0].costs.commission, dec!(0.3));
    assert_eq!(statements[0].costs.tax, dec!(0));
    assert_eq!(statements[0].amount, dec!(-1000.3));

    let settled = stack.engine.get_user(&user.id).await.unwrap();
    assert_eq!(settled.cash, dec!(998999.7));
    assert_eq!(settled.securities, dec!(1000));
    assert_eq!(settled.assets, settled.cash + settled.securities);
    assert_eq!(settled.available_cash, settled.cash);

    stack.engine.shutdown().await;
}

#[tokio::test]
async fn insufficient_funds_rejects_without_persisting() {
    let stack = stack().await;
    let user = stack.engine.register_user(dec!(100), None).await.unwrap();

    let err = stack
        .engine
        .on_order_arrived(buy(100, dec!(10)), &user)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        OrderError::Validation(ValidationError::InsufficientFunds)
    );
    drain().await;

    let orders = stack
        .engine
        .list_orders(&OrderQuery::default())
        .await
        .unwrap();
    assert!(orders.is_empty());
    assert_eq!(
        stack.engine.get_user(&user.id).await.unwrap().available_cash,
        dec!(100)
    );

    stack.engine.shutdown().await;
}

#[tokio::test]
async fn unmet_limit_buy_waits_then_rejected_at_close() {
    let stack = stack().await;
    let user = stack.engine.register_user(dec!(1_000_000), None).await.unwrap();
    stack
        .quotes
        .set_top_of_book("600519.SH", dec!(10), dec!(9.99), dec!(10));

    let receipt = stack
        .engine
        .on_order_arrived(buy(100, dec!(9)), &user)
        .await
        .unwrap();
    drain().await;

    let order = stack.engine.get_order(&receipt.entrust_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::NotDone);
    assert!(stack.engine.list_statements(&user.id).await.unwrap().is_empty());
    assert_eq!(
        stack.engine.get_user(&user.id).await.unwrap().available_cash,
        dec!(1_000_000) - dec!(900.27)
    );

    stack.engine.trigger_market_close();
    drain_long().await;

    let order = stack.engine.get_order(&receipt.entrust_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.frozen_amount, dec!(0));
    let settled = stack.engine.get_user(&user.id).await.unwrap();
    assert_eq!(settled.available_cash, dec!(1_000_000));
    assert!(stack.engine.list_statements(&user.id).await.unwrap().is_empty());

    stack.engine.shutdown().await;
}

#[tokio::test]
async fn cancel_restores_available_cash() {
    let stack = stack().await;
    let user = stack.engine.register_user(dec!(10_000), None).await.unwrap();
    // Upper price limit: the buy keeps waiting on the queue until canceled.
    stack
        .quotes
        .set_top_of_book("600519.SH", dec!(10), dec!(9.99), dec!(0));

    let receipt = stack
        .engine
        .on_order_arrived(buy(100, dec!(10)), &user)
        .await
        .unwrap();
    drain().await;
    assert_eq!(
        stack.engine.get_user(&user.id).await.unwrap().available_cash,
        dec!(10_000) - dec!(1000.3)
    );

    stack
        .engine
        .on_order_cancel(&receipt.entrust_id, &user)
        .await
        .unwrap();
    drain_long().await;

    let order = stack.engine.get_order(&receipt.entrust_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Canceled);
    assert_eq!(order.frozen_amount, dec!(0));
    assert_eq!(
        stack.engine.get_user(&user.id).await.unwrap().available_cash,
        dec!(10_000)
    );

    stack.engine.shutdown().await;
}

#[tokio::test]
async fn sell_empties_position_and_liquidation_removes_it() {
    let stack = stack().await;
    let user = stack.engine.register_user(dec!(0), None).await.unwrap();
    stack
        .context
        .position_cache
        .set_position(&Position {
            user: user.id.clone(),
            symbol: "600519".to_string(),
            exchange: Exchange::SH,
            volume: 100,
            available_volume: 100,
            cost: dec!(10),
            current_price: dec!(10),
            profit: dec!(0),
            first_buy_date: None,
            last_sell_date: None,
        })
        .await
        .unwrap();
    stack
        .quotes
        .set_top_of_book("600519.SH", dec!(11), dec!(11), dec!(11.02));

    stack
        .engine
        .on_order_arrived(sell(100, dec!(11)), &user)
        .await
        .unwrap();
    drain().await;

    let statements = stack.engine.list_statements(&user.id).await.unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].trade_category, TradeCategory::Sell);
    // 11 * 100 * (commission 0.0003 + tax 0.001)
    assert_eq!(statements[0].costs.total, dec!(1.43));

    // The emptied position survives until the next liquidation pass.
    assert_eq!(stack.engine.list_positions(&user.id).await.unwrap().len(), 1);
    stack.engine.trigger_market_close();
    drain_long().await;
    assert!(stack.engine.list_positions(&user.id).await.unwrap().is_empty());

    let settled = stack.engine.get_user(&user.id).await.unwrap();
    assert_eq!(settled.cash, dec!(1098.57));
    assert_eq!(settled.available_cash, settled.cash);

    stack.engine.shutdown().await;
}

#[tokio::test]
async fn market_close_rejects_open_orders_snapshots_and_flushes() {
    let stack = stack().await;
    let trader = stack.engine.register_user(dec!(1_000_000), None).await.unwrap();
    let holder = stack.engine.register_user(dec!(5_000), None).await.unwrap();
    stack
        .context
        .position_cache
        .set_position(&Position {
            user: holder.id.clone(),
            symbol: "601318".to_string(),
            exchange: Exchange::SH,
            volume: 200,
            available_volume: 0,
            cost: dec!(30),
            current_price: dec!(30),
            profit: dec!(0),
            first_buy_date: None,
            last_sell_date: None,
        })
        .await
        .unwrap();
    stack
        .quotes
        .set_top_of_book("601318.SH", dec!(31), dec!(31), dec!(31.05));
    // Upper limit keeps the trader's buy open all day.
    stack
        .quotes
        .set_top_of_book("600519.SH", dec!(10), dec!(9.99), dec!(0));

    let receipt = stack
        .engine
        .on_order_arrived(buy(100, dec!(10)), &trader)
        .await
        .unwrap();
    drain().await;

    stack.engine.trigger_market_close();
    drain_long().await;

    // Open order refused.
    let order = stack.engine.get_order(&receipt.entrust_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);

    // One snapshot per user for today.
    let today = stack.engine.session().today();
    for user in [&trader, &holder] {
        let record = stack
            .context
            .record_repo
            .get_record(&user.id, today)
            .await
            .unwrap();
        let cached = stack.engine.get_user(&user.id).await.unwrap();
        assert_eq!(record.assets, cached.assets);
        assert_eq!(record.cash, cached.cash);
    }

    // Holder was marked to the close tick and flushed to the durable store.
    let stored_holder = stack
        .context
        .user_repo
        .get_user_by_id(&holder.id)
        .await
        .unwrap();
    assert_eq!(stored_holder.securities, dec!(6200));
    assert_eq!(stored_holder.assets, dec!(11_200));
    let stored_positions = stack
        .context
        .position_repo
        .list_positions_by_user(&holder.id)
        .await
        .unwrap();
    assert_eq!(stored_positions.len(), 1);
    // T+1 locks release at close.
    assert_eq!(stored_positions[0].available_volume, 200);

    stack.engine.shutdown().await;
}

#[tokio::test]
async fn startup_reloads_open_entrust_orders() {
    let quotes = Arc::new(MockQuotes::new());
    let context = EngineContext::in_memory(Arc::clone(&quotes) as Arc<dyn QuoteProvider>);

    // An account and an order it left open, as a crashed session would.
    let user = User::activated(new_object_id(), dec!(100_000));
    context.user_repo.create_user(&user).await.unwrap();
    let mut order = Order::from_new(&buy(100, dec!(10)), user.id.clone(), new_object_id());
    order.status = OrderStatus::NotDone;
    order.frozen_amount = dec!(1000.3);
    context.order_repo.create_order(&order).await.unwrap();

    quotes.set_top_of_book("600519.SH", dec!(10), dec!(9.99), dec!(10));

    let engine = MainEngine::new(context.clone(), open_session());
    engine.startup().await.unwrap();
    drain().await;

    let stored = engine.get_order(&order.entrust_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::AllFinished);
    assert_eq!(stored.traded_volume, 100);

    engine.shutdown().await;
}

#[tokio::test]
async fn market_order_fills_at_top_of_book() {
    let stack = stack().await;
    let user = stack.engine.register_user(dec!(50_000), None).await.unwrap();
    stack
        .quotes
        .set_top_of_book("600519.SH", dec!(10.05), dec!(10), dec!(10.10));

    // Price zero encodes a market order; it freezes nothing and fills at
    // the ask.
    let receipt = stack
        .engine
        .on_order_arrived(buy(100, dec!(0)), &user)
        .await
        .unwrap();
    drain().await;

    let order = stack.engine.get_order(&receipt.entrust_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::AllFinished);
    assert_eq!(order.sold_price, dec!(10.10));

    stack.engine.shutdown().await;
}
