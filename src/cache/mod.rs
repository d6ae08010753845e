//! Fast-store interfaces
//!
//! During the session the cache is authoritative for `available_cash` and
//! `available_volume`; the freeze operations below are the single atomic
//! read-modify-write that keeps concurrent submissions from double-spending.
//! An external store implements them as a CAS loop or a short lease on the
//! key; the memory backend uses entry-level locking.

pub mod memory;

use async_trait::async_trait;

use rust_decimal::Decimal;

use crate::core_types::UserId;
use crate::errors::StoreError;
use crate::models::{Exchange, Position, User};

/// Outcome of an atomic freeze attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeOutcome {
    Frozen,
    /// The balance or holding was present but too small; nothing changed.
    Insufficient,
}

/// User projection in the fast store.
#[async_trait]
pub trait UserCache: Send + Sync {
    /// Whether the cache wants a bulk reload from the durable store
    /// (fresh or flushed cache).
    async fn is_reload(&self) -> Result<bool, StoreError>;

    async fn clear_reload_flag(&self) -> Result<(), StoreError>;

    async fn set_user(&self, user: &User) -> Result<(), StoreError>;

    async fn set_users(&self, users: &[User]) -> Result<(), StoreError>;

    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError>;

    /// Overwrite the cached projection.
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    /// Overwrite only cash, available_cash, securities, and assets.
    async fn update_user_assets(&self, user: &User) -> Result<(), StoreError>;

    /// Atomically deduct `amount` from `available_cash` if it covers it.
    async fn freeze_cash(
        &self,
        user_id: &UserId,
        amount: Decimal,
    ) -> Result<FreezeOutcome, StoreError>;

    /// Atomically add `amount` back to `available_cash`.
    async fn unfreeze_cash(&self, user_id: &UserId, amount: Decimal) -> Result<(), StoreError>;

    async fn all_users(&self) -> Result<Vec<User>, StoreError>;

    async fn delete_user(&self, user_id: &UserId) -> Result<(), StoreError>;
}

/// Position projection in the fast store, keyed by (user, symbol, exchange).
#[async_trait]
pub trait PositionCache: Send + Sync {
    async fn set_position(&self, position: &Position) -> Result<(), StoreError>;

    async fn set_positions(&self, positions: &[Position]) -> Result<(), StoreError>;

    async fn get_position(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
    ) -> Result<Position, StoreError>;

    /// Overwrite the cached projection.
    async fn update_position(&self, position: &Position) -> Result<(), StoreError>;

    async fn positions_by_user(&self, user: &UserId) -> Result<Vec<Position>, StoreError>;

    /// Atomically deduct `volume` from `available_volume` if it covers it.
    /// `EntityDoesNotExist` when the position is absent.
    async fn freeze_volume(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
        volume: u64,
    ) -> Result<FreezeOutcome, StoreError>;

    /// Atomically add `volume` back to `available_volume`.
    async fn unfreeze_volume(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
        volume: u64,
    ) -> Result<(), StoreError>;

    async fn delete_position(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
    ) -> Result<(), StoreError>;

    /// Drop every position of one user (account termination).
    async fn delete_user_positions(&self, user: &UserId) -> Result<(), StoreError>;
}
