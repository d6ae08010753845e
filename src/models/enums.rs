//! Closed enumerations of the trading domain

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stock exchange the security is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// Shanghai
    SH,
    /// Shenzhen
    SZ,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SH => "SH",
            Self::SZ => "SZ",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SH" => Ok(Self::SH),
            "SZ" => Ok(Self::SZ),
            other => Err(format!("unknown exchange `{other}`")),
        }
    }
}

/// Order intent. Cancellation is a first-class order resolved by the
/// matchmaking worker, not an out-of-band store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Buy,
    Sell,
    Cancel,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Cancel => "cancel",
        }
    }
}

/// Price type. A submitted price of zero encodes a market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    Limit,
    Market,
}

/// Settlement regime. Under T1 the shares bought today stay unsellable
/// until the next trading day; T0 makes them sellable intraday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    T0,
    T1,
}

/// Order lifecycle status.
///
/// `Submitting` -> `NotDone` -> `AllFinished` | `Canceled` | `Rejected`.
/// `PartFinished` is reachable by the status machinery but the matcher
/// fills fully against level-1 or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Submitting,
    NotDone,
    PartFinished,
    AllFinished,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitting => "submitting",
            Self::NotDone => "not_done",
            Self::PartFinished => "part_finished",
            Self::AllFinished => "all_finished",
            Self::Canceled => "canceled",
            Self::Rejected => "rejected",
        }
    }

    /// Terminal statuses release their frozen reservations and accept no
    /// further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AllFinished | Self::Canceled | Self::Rejected)
    }
}

/// Account status. Terminated accounts accept no new orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Activated,
    Terminated,
}

/// Direction recorded on a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeCategory {
    Buy,
    Sell,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_round_trip() {
        assert_eq!("SH".parse::<Exchange>().unwrap(), Exchange::SH);
        assert_eq!("SZ".parse::<Exchange>().unwrap(), Exchange::SZ);
        assert!("NYSE".parse::<Exchange>().is_err());
        assert_eq!(Exchange::SH.to_string(), "SH");
    }

    #[test]
    fn test_status_wire_format() {
        // Store adapters persist these as snake_case strings.
        assert_eq!(
            serde_json::to_string(&OrderStatus::NotDone).unwrap(),
            "\"not_done\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::AllFinished).unwrap(),
            "\"all_finished\""
        );
        assert_eq!(serde_json::to_string(&Exchange::SH).unwrap(), "\"SH\"");
        assert_eq!(serde_json::to_string(&TradeType::T1).unwrap(), "\"T1\"");
        assert_eq!(serde_json::to_string(&OrderType::Buy).unwrap(), "\"buy\"");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::AllFinished.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Submitting.is_terminal());
        assert!(!OrderStatus::NotDone.is_terminal());
        assert!(!OrderStatus::PartFinished.is_terminal());
    }
}
