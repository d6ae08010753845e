//! In-memory reference implementation of the durable-store interfaces
//!
//! Backs the test suite and standalone runs. Documents live in hash maps
//! behind an async RwLock; ids are allocated on first insert the way the
//! document store would.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use crate::core_types::{EntrustId, UserId, new_object_id};
use crate::errors::StoreError;
use crate::models::{
    Exchange, Order, OrderStatus, Position, Statement, User, UserAssetsRecord, UserStatus,
};
use crate::repository::{
    OrderQuery, OrderRepository, PositionRepository, StatementRepository,
    UserAssetsRecordRepository, UserRepository,
};

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<FxHashMap<UserId, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        self.users
            .write()
            .await
            .insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or(StoreError::EntityDoesNotExist)
    }

    async fn list_active_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.status != UserStatus::Terminated)
            .cloned()
            .collect())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(StoreError::EntityDoesNotExist);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn bulk_update_users(&self, updated: &[User]) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        for user in updated {
            users.insert(user.id.clone(), user.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryOrderRepository {
    orders: RwLock<FxHashMap<EntrustId, Order>>,
}

impl MemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut stored = order.clone();
        if stored.id.is_none() {
            stored.id = Some(new_object_id());
        }
        self.orders
            .write()
            .await
            .insert(stored.entrust_id.clone(), stored);
        Ok(())
    }

    async fn get_order_by_entrust_id(&self, entrust_id: &EntrustId) -> Result<Order, StoreError> {
        self.orders
            .read()
            .await
            .get(entrust_id)
            .cloned()
            .ok_or(StoreError::EntityDoesNotExist)
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.entrust_id)
            .ok_or(StoreError::EntityDoesNotExist)?;
        let id = stored.id.clone();
        *stored = order.clone();
        stored.id = id;
        Ok(())
    }

    async fn update_order_status(
        &self,
        entrust_id: &EntrustId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(entrust_id)
            .ok_or(StoreError::EntityDoesNotExist)?;
        stored.status = status;
        Ok(())
    }

    async fn clear_frozen(&self, entrust_id: &EntrustId) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(entrust_id)
            .ok_or(StoreError::EntityDoesNotExist)?;
        stored.frozen_amount = Decimal::ZERO;
        stored.frozen_stock_volume = 0;
        Ok(())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut matched: Vec<Order> = orders
            .values()
            .filter(|o| match &query.user {
                Some(user) => &o.user == user,
                None => true,
            })
            .filter(|o| query.status.is_empty() || query.status.contains(&o.status))
            .filter(|o| {
                let date = o.order_date.date_naive();
                query.start_date.is_none_or(|start| date >= start)
                    && query.end_date.is_none_or(|end| date <= end)
            })
            .cloned()
            .collect();
        matched.sort_by_key(|o| o.order_date);
        Ok(matched)
    }
}

fn position_key(user: &UserId, symbol: &str, exchange: Exchange) -> String {
    format!("{user}:{symbol}:{exchange}")
}

#[derive(Default)]
pub struct MemoryPositionRepository {
    positions: RwLock<FxHashMap<String, Position>>,
}

impl MemoryPositionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionRepository for MemoryPositionRepository {
    async fn get_position(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
    ) -> Result<Position, StoreError> {
        self.positions
            .read()
            .await
            .get(&position_key(user, symbol, exchange))
            .cloned()
            .ok_or(StoreError::EntityDoesNotExist)
    }

    async fn list_positions_by_user(&self, user: &UserId) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .positions
            .read()
            .await
            .values()
            .filter(|p| &p.user == user)
            .cloned()
            .collect())
    }

    async fn bulk_upsert_positions(&self, upserts: &[Position]) -> Result<(), StoreError> {
        let mut positions = self.positions.write().await;
        for position in upserts {
            positions.insert(
                position_key(&position.user, &position.symbol, position.exchange),
                position.clone(),
            );
        }
        Ok(())
    }

    async fn bulk_delete_positions(
        &self,
        keys: &[(UserId, String, Exchange)],
    ) -> Result<(), StoreError> {
        let mut positions = self.positions.write().await;
        for (user, symbol, exchange) in keys {
            positions.remove(&position_key(user, symbol, *exchange));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStatementRepository {
    statements: RwLock<FxHashMap<EntrustId, Statement>>,
}

impl MemoryStatementRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatementRepository for MemoryStatementRepository {
    async fn create_statement(&self, statement: &Statement) -> Result<(), StoreError> {
        self.statements
            .write()
            .await
            .entry(statement.entrust_id.clone())
            .or_insert_with(|| statement.clone());
        Ok(())
    }

    async fn list_statements_by_user(&self, user: &UserId) -> Result<Vec<Statement>, StoreError> {
        let mut matched: Vec<Statement> = self
            .statements
            .read()
            .await
            .values()
            .filter(|s| &s.user == user)
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.deal_time);
        Ok(matched)
    }
}

#[derive(Default)]
pub struct MemoryUserAssetsRecordRepository {
    records: RwLock<FxHashMap<(UserId, NaiveDate), UserAssetsRecord>>,
}

impl MemoryUserAssetsRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserAssetsRecordRepository for MemoryUserAssetsRecordRepository {
    async fn upsert_record(&self, record: &UserAssetsRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert((record.user.clone(), record.date), record.clone());
        Ok(())
    }

    async fn get_record(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<UserAssetsRecord, StoreError> {
        self.records
            .read()
            .await
            .get(&(user.clone(), date))
            .cloned()
            .ok_or(StoreError::EntityDoesNotExist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewOrder, OrderType, TradeType};
    use rust_decimal_macros::dec;

    fn sample_order(entrust_id: &str, status: OrderStatus) -> Order {
        let new_order = NewOrder {
            symbol: "600519".to_string(),
            exchange: Exchange::SH,
            volume: 100,
            price: dec!(10),
            order_type: OrderType::Buy,
            trade_type: TradeType::T0,
        };
        let mut order = Order::from_new(&new_order, "user-1".to_string(), entrust_id.to_string());
        order.status = status;
        order
    }

    #[tokio::test]
    async fn test_order_create_assigns_id_and_update_keeps_it() {
        let repo = MemoryOrderRepository::new();
        repo.create_order(&sample_order("e1", OrderStatus::Submitting))
            .await
            .unwrap();

        let stored = repo
            .get_order_by_entrust_id(&"e1".to_string())
            .await
            .unwrap();
        assert!(stored.id.is_some());

        let mut updated = stored.clone();
        updated.id = None;
        updated.status = OrderStatus::AllFinished;
        repo.update_order(&updated).await.unwrap();

        let after = repo
            .get_order_by_entrust_id(&"e1".to_string())
            .await
            .unwrap();
        assert_eq!(after.id, stored.id);
        assert_eq!(after.status, OrderStatus::AllFinished);
    }

    #[tokio::test]
    async fn test_list_orders_filters_by_status_and_date() {
        let repo = MemoryOrderRepository::new();
        repo.create_order(&sample_order("open", OrderStatus::NotDone))
            .await
            .unwrap();
        repo.create_order(&sample_order("done", OrderStatus::AllFinished))
            .await
            .unwrap();

        let today = chrono::Utc::now().date_naive();
        let open = repo
            .list_orders(&OrderQuery {
                status: vec![OrderStatus::NotDone],
                start_date: Some(today),
                end_date: Some(today),
                ..OrderQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].entrust_id, "open");

        let none_yesterday = repo
            .list_orders(&OrderQuery {
                end_date: today.pred_opt(),
                ..OrderQuery::default()
            })
            .await
            .unwrap();
        assert!(none_yesterday.is_empty());
    }

    #[tokio::test]
    async fn test_statement_create_is_existence_keyed() {
        let repo = MemoryStatementRepository::new();
        let statement = Statement {
            entrust_id: "e1".to_string(),
            user: "user-1".to_string(),
            symbol: "600519".to_string(),
            exchange: Exchange::SH,
            trade_category: crate::models::TradeCategory::Buy,
            volume: 100,
            sold_price: dec!(10),
            amount: dec!(-1000.3),
            costs: crate::models::Costs::zero(),
            deal_time: chrono::Utc::now(),
        };
        repo.create_statement(&statement).await.unwrap();

        let mut duplicate = statement.clone();
        duplicate.amount = dec!(0);
        repo.create_statement(&duplicate).await.unwrap();

        let listed = repo
            .list_statements_by_user(&"user-1".to_string())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].amount, dec!(-1000.3));
    }

    #[tokio::test]
    async fn test_assets_record_upserts_by_user_and_date() {
        let repo = MemoryUserAssetsRecordRepository::new();
        let user = User::activated("user-1".to_string(), dec!(1000));
        let today = chrono::Utc::now().date_naive();

        repo.upsert_record(&UserAssetsRecord::snapshot(&user, today))
            .await
            .unwrap();

        let mut richer = user.clone();
        richer.assets = dec!(2000);
        repo.upsert_record(&UserAssetsRecord::snapshot(&richer, today))
            .await
            .unwrap();

        let stored = repo.get_record(&user.id, today).await.unwrap();
        assert_eq!(stored.assets, dec!(2000));
    }
}
