//! Daily per-user asset snapshots

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::UserId;
use crate::models::user::User;

/// One row per (user, date); updated in place when the day already has one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAssetsRecord {
    pub user: UserId,
    pub date: NaiveDate,
    pub assets: Decimal,
    pub cash: Decimal,
    pub securities: Decimal,
    pub check_time: DateTime<Utc>,
}

impl UserAssetsRecord {
    /// Snapshot a user's balances for `date`.
    pub fn snapshot(user: &User, date: NaiveDate) -> Self {
        Self {
            user: user.id.clone(),
            date,
            assets: user.assets,
            cash: user.cash,
            securities: user.securities,
            check_time: Utc::now(),
        }
    }
}
