//! Durable-store interfaces
//!
//! The engines consume these traits; concrete adapters (document store,
//! SQL, ...) live with the deployment. `memory` ships the reference
//! implementation used by tests and standalone runs.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::core_types::{EntrustId, UserId};
use crate::errors::StoreError;
use crate::models::{Exchange, Order, OrderStatus, Position, Statement, User, UserAssetsRecord};

/// Typed access to user documents.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError>;

    /// All non-terminated users, for the cache reload at startup.
    async fn list_active_users(&self) -> Result<Vec<User>, StoreError>;

    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    /// Upsert many users in one round-trip (cache flush at close).
    async fn bulk_update_users(&self, users: &[User]) -> Result<(), StoreError>;
}

/// Filters for order list queries.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub user: Option<UserId>,
    pub status: Vec<OrderStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Typed access to order documents, keyed by entrust id.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn get_order_by_entrust_id(&self, entrust_id: &EntrustId) -> Result<Order, StoreError>;

    /// Replace the mutable fields of the order with `order.entrust_id`.
    async fn update_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn update_order_status(
        &self,
        entrust_id: &EntrustId,
        status: OrderStatus,
    ) -> Result<(), StoreError>;

    /// Zero the frozen reservation fields of a terminal order.
    async fn clear_frozen(&self, entrust_id: &EntrustId) -> Result<(), StoreError>;

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError>;
}

/// Typed access to position documents, keyed by (user, symbol, exchange).
#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn get_position(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
    ) -> Result<Position, StoreError>;

    async fn list_positions_by_user(&self, user: &UserId) -> Result<Vec<Position>, StoreError>;

    /// Upsert many positions (cache flush at close).
    async fn bulk_upsert_positions(&self, positions: &[Position]) -> Result<(), StoreError>;

    /// Delete by key; used when the cache no longer holds the position.
    async fn bulk_delete_positions(
        &self,
        keys: &[(UserId, String, Exchange)],
    ) -> Result<(), StoreError>;
}

/// Append-only statement store.
#[async_trait]
pub trait StatementRepository: Send + Sync {
    /// Insert keyed by entrust id; a second insert for the same entrust id
    /// is a no-op, preserving exactly-one-per-fill.
    async fn create_statement(&self, statement: &Statement) -> Result<(), StoreError>;

    async fn list_statements_by_user(&self, user: &UserId) -> Result<Vec<Statement>, StoreError>;
}

/// Daily asset snapshots, upserted by (user, date).
#[async_trait]
pub trait UserAssetsRecordRepository: Send + Sync {
    async fn upsert_record(&self, record: &UserAssetsRecord) -> Result<(), StoreError>;

    async fn get_record(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<UserAssetsRecord, StoreError>;
}
