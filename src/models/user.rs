//! User account state
//!
//! The durable store holds the full document; the fast cache holds the same
//! shape and is authoritative for `available_cash` during the session.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::UserId;
use crate::models::enums::UserStatus;

/// A simulated trading account.
///
/// Invariants (checked at quiescent points, not per write):
/// - `assets == cash + securities` after each settlement
/// - `0 <= available_cash <= cash`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Initial funding, never mutated after creation.
    pub capital: Decimal,
    /// Realized cash balance.
    pub cash: Decimal,
    /// Cash minus the reservations of open buy orders.
    pub available_cash: Decimal,
    /// Mark-to-market value of holdings.
    pub securities: Decimal,
    /// `cash + securities`.
    pub assets: Decimal,
    /// Commission rate applied to both sides of a trade.
    pub commission: Decimal,
    /// Stamp-tax rate applied to sells.
    pub tax_rate: Decimal,
    /// Slippage rate, carried for fee models that use it.
    pub slippage: Decimal,
    pub status: UserStatus,
    pub desc: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Open a fresh account funded with `capital`.
    pub fn activated(id: UserId, capital: Decimal) -> Self {
        Self {
            id,
            capital,
            cash: capital,
            available_cash: capital,
            securities: Decimal::ZERO,
            assets: capital,
            commission: default_commission(),
            tax_rate: default_tax_rate(),
            slippage: default_slippage(),
            status: UserStatus::Activated,
            desc: None,
            created_at: Utc::now(),
        }
    }
}

// Store defaults mirror the bootstrap documents: 0.03% commission,
// 0.1% stamp tax, 1% slippage.
fn default_commission() -> Decimal {
    Decimal::new(3, 4)
}

fn default_tax_rate() -> Decimal {
    Decimal::new(1, 3)
}

fn default_slippage() -> Decimal {
    Decimal::new(1, 2)
}
