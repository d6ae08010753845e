//! papertrade - Paper-Trading Engine for China A-Shares
//!
//! A simulated brokerage core: orders validate against user funds and
//! holdings, match against a live level-1 quote feed, and settle into
//! positions and immutable statements.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier aliases (UserId, EntrustId, ...)
//! - [`config`] - Service configuration (YAML)
//! - [`models`] - Domain entities (users, orders, positions, statements)
//! - [`event`] - Typed event bus with a single cooperative drain worker
//! - [`entrust_queue`] - Ordered blocking map of open orders
//! - [`user_engine`] - Fund/position freezing, settlement, liquidation
//! - [`market_engine`] - Trading-hours gate and the matchmaking loop
//! - [`main_engine`] - Composition root, order intake, persistence
//! - [`repository`] / [`cache`] - Store interfaces + memory backends
//! - [`quotes`] - Level-1 tick feed interface and adapters
//! - [`session`] - Trading-hours schedule
//! - [`auth`] - Bearer-token handling (JWT/UID)
//! - [`scheduler`] - Session-edge triggers and the jobs lock

// Core types - must be first!
pub mod core_types;

// Configuration & ambient plumbing
pub mod config;
pub mod errors;
pub mod logging;

// Domain
pub mod models;

// Engine components
pub mod cache;
pub mod entrust_queue;
pub mod event;
pub mod main_engine;
pub mod market_engine;
pub mod quotes;
pub mod repository;
pub mod scheduler;
pub mod session;
pub mod user_engine;

// Auth for the REST adapter
pub mod auth;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use core_types::{EntrustId, StockCode, UserId};
pub use entrust_queue::EntrustQueue;
pub use errors::{AuthError, OrderError, QuotesError, StoreError, ValidationError};
pub use event::{Event, EventBus, EventKind};
pub use main_engine::{EngineContext, MainEngine};
pub use market_engine::MarketEngine;
pub use models::{NewOrder, Order, OrderReceipt, Position, Statement, User};
pub use session::TradingSession;
pub use user_engine::UserEngine;
