//! DashMap-backed fast store
//!
//! Entry-level mutation runs under the map's shard lock, which is what
//! makes `freeze_cash`/`freeze_volume` single atomic read-modify-writes.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::cache::{FreezeOutcome, PositionCache, UserCache};
use crate::core_types::UserId;
use crate::errors::StoreError;
use crate::models::{Exchange, Position, User};

pub struct MemoryUserCache {
    users: DashMap<UserId, User>,
    reload: AtomicBool,
}

impl MemoryUserCache {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            // A fresh cache wants the durable store loaded into it.
            reload: AtomicBool::new(true),
        }
    }
}

impl Default for MemoryUserCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserCache for MemoryUserCache {
    async fn is_reload(&self) -> Result<bool, StoreError> {
        Ok(self.reload.load(Ordering::Acquire))
    }

    async fn clear_reload_flag(&self) -> Result<(), StoreError> {
        self.reload.store(false, Ordering::Release);
        Ok(())
    }

    async fn set_user(&self, user: &User) -> Result<(), StoreError> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn set_users(&self, users: &[User]) -> Result<(), StoreError> {
        for user in users {
            self.users.insert(user.id.clone(), user.clone());
        }
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError> {
        self.users
            .get(user_id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::EntityDoesNotExist)
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        match self.users.get_mut(&user.id) {
            Some(mut entry) => {
                *entry = user.clone();
                Ok(())
            }
            None => Err(StoreError::EntityDoesNotExist),
        }
    }

    async fn update_user_assets(&self, user: &User) -> Result<(), StoreError> {
        match self.users.get_mut(&user.id) {
            Some(mut entry) => {
                entry.cash = user.cash;
                entry.available_cash = user.available_cash;
                entry.securities = user.securities;
                entry.assets = user.assets;
                Ok(())
            }
            None => Err(StoreError::EntityDoesNotExist),
        }
    }

    async fn freeze_cash(
        &self,
        user_id: &UserId,
        amount: Decimal,
    ) -> Result<FreezeOutcome, StoreError> {
        match self.users.get_mut(user_id) {
            Some(mut entry) => {
                if entry.available_cash >= amount {
                    entry.available_cash -= amount;
                    Ok(FreezeOutcome::Frozen)
                } else {
                    Ok(FreezeOutcome::Insufficient)
                }
            }
            None => Err(StoreError::EntityDoesNotExist),
        }
    }

    async fn unfreeze_cash(&self, user_id: &UserId, amount: Decimal) -> Result<(), StoreError> {
        match self.users.get_mut(user_id) {
            Some(mut entry) => {
                entry.available_cash += amount;
                Ok(())
            }
            None => Err(StoreError::EntityDoesNotExist),
        }
    }

    async fn all_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.iter().map(|entry| entry.clone()).collect())
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<(), StoreError> {
        self.users.remove(user_id);
        Ok(())
    }
}

fn position_key(user: &UserId, symbol: &str, exchange: Exchange) -> String {
    format!("{user}:{symbol}:{exchange}")
}

pub struct MemoryPositionCache {
    positions: DashMap<String, Position>,
}

impl MemoryPositionCache {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
        }
    }
}

impl Default for MemoryPositionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionCache for MemoryPositionCache {
    async fn set_position(&self, position: &Position) -> Result<(), StoreError> {
        self.positions.insert(
            position_key(&position.user, &position.symbol, position.exchange),
            position.clone(),
        );
        Ok(())
    }

    async fn set_positions(&self, positions: &[Position]) -> Result<(), StoreError> {
        for position in positions {
            self.set_position(position).await?;
        }
        Ok(())
    }

    async fn get_position(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
    ) -> Result<Position, StoreError> {
        self.positions
            .get(&position_key(user, symbol, exchange))
            .map(|entry| entry.clone())
            .ok_or(StoreError::EntityDoesNotExist)
    }

    async fn update_position(&self, position: &Position) -> Result<(), StoreError> {
        let key = position_key(&position.user, &position.symbol, position.exchange);
        match self.positions.get_mut(&key) {
            Some(mut entry) => {
                *entry = position.clone();
                Ok(())
            }
            None => Err(StoreError::EntityDoesNotExist),
        }
    }

    async fn positions_by_user(&self, user: &UserId) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .positions
            .iter()
            .filter(|entry| &entry.user == user)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn freeze_volume(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
        volume: u64,
    ) -> Result<FreezeOutcome, StoreError> {
        match self.positions.get_mut(&position_key(user, symbol, exchange)) {
            Some(mut entry) => {
                if entry.available_volume >= volume {
                    entry.available_volume -= volume;
                    Ok(FreezeOutcome::Frozen)
                } else {
                    Ok(FreezeOutcome::Insufficient)
                }
            }
            None => Err(StoreError::EntityDoesNotExist),
        }
    }

    async fn unfreeze_volume(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
        volume: u64,
    ) -> Result<(), StoreError> {
        match self.positions.get_mut(&position_key(user, symbol, exchange)) {
            Some(mut entry) => {
                entry.available_volume += volume;
                Ok(())
            }
            None => Err(StoreError::EntityDoesNotExist),
        }
    }

    async fn delete_position(
        &self,
        user: &UserId,
        symbol: &str,
        exchange: Exchange,
    ) -> Result<(), StoreError> {
        self.positions.remove(&position_key(user, symbol, exchange));
        Ok(())
    }

    async fn delete_user_positions(&self, user: &UserId) -> Result<(), StoreError> {
        self.positions.retain(|_, position| &position.user != user);
        Ok(())
    }
}
