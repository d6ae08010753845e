//! Event bus - typed in-process publish/subscribe
//!
//! Events fan out to the handlers registered for their kind. One drain
//! worker pulls events off an unbounded FIFO and awaits every handler
//! sequentially, which yields two properties the engines rely on:
//!
//! - **Per-kind ordering**: events of one kind reach their handlers in
//!   publish order.
//! - **Per-event atomicity**: all handlers of an event run before the next
//!   event is touched, without any cross-handler locking.
//!
//! A handler error is logged and skipped; the event still counts as
//! delivered. The queue is lost on process exit - durability belongs to the
//! persistence handlers writing the document store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::core_types::EntrustId;
use crate::models::{Costs, Order, OrderStatus, Position, User};

/// Tag identifying an event variant; handler registration is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderCreate,
    OrderUpdate,
    OrderUpdateStatus,
    OrderUpdateFrozen,
    StatementCreate,
    UserUpdateAssets,
    PositionCreate,
    PositionUpdate,
    Unfreeze,
    MarketClose,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreate => "order_create_event",
            Self::OrderUpdate => "order_update_event",
            Self::OrderUpdateStatus => "order_update_status_event",
            Self::OrderUpdateFrozen => "order_update_frozen_event",
            Self::StatementCreate => "statement_create_event",
            Self::UserUpdateAssets => "user_update_assets_event",
            Self::PositionCreate => "position_create_event",
            Self::PositionUpdate => "position_update_event",
            Self::Unfreeze => "unfreeze_event",
            Self::MarketClose => "market_close_event",
        }
    }
}

/// Everything the market worker needs to persist one fill.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub order: Order,
    pub costs: Costs,
    /// Traded volume times execution price; signed into the statement
    /// amount by the persistence handler.
    pub securities_diff: Decimal,
}

/// Tagged union of event payloads.
#[derive(Debug, Clone)]
pub enum Event {
    OrderCreate(Order),
    OrderUpdate(Order),
    OrderUpdateStatus {
        entrust_id: EntrustId,
        status: OrderStatus,
    },
    /// Clear the frozen reservation fields of a terminal order.
    OrderUpdateFrozen { entrust_id: EntrustId },
    StatementCreate(FillReport),
    UserUpdateAssets(User),
    PositionCreate(Position),
    PositionUpdate(Position),
    Unfreeze(Order),
    MarketClose,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::OrderCreate(_) => EventKind::OrderCreate,
            Self::OrderUpdate(_) => EventKind::OrderUpdate,
            Self::OrderUpdateStatus { .. } => EventKind::OrderUpdateStatus,
            Self::OrderUpdateFrozen { .. } => EventKind::OrderUpdateFrozen,
            Self::StatementCreate(_) => EventKind::StatementCreate,
            Self::UserUpdateAssets(_) => EventKind::UserUpdateAssets,
            Self::PositionCreate(_) => EventKind::PositionCreate,
            Self::PositionUpdate(_) => EventKind::PositionUpdate,
            Self::Unfreeze(_) => EventKind::Unfreeze,
            Self::MarketClose => EventKind::MarketClose,
        }
    }
}

/// A subscriber. `name` identifies the handler for idempotent registration
/// and unregistration.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}

enum BusMessage {
    Deliver(Box<Event>),
    /// Wake the drain worker so it can observe the exit flag.
    Stop,
}

type HandlerMap = FxHashMap<EventKind, Vec<Arc<dyn EventHandler>>>;

/// Publisher half of the bus, cheap to clone into engines and handlers.
#[derive(Clone)]
pub struct BusHandle {
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl BusHandle {
    /// Enqueue an event. Delivery is asynchronous; a stopped bus drops the
    /// event with a warning.
    pub fn put(&self, event: Event) {
        let kind = event.kind();
        if self.tx.send(BusMessage::Deliver(Box::new(event))).is_err() {
            warn!(kind = kind.as_str(), "event bus is down, event dropped");
        }
    }
}

/// The bus itself: handler registry plus the drain worker's endpoints.
pub struct EventBus {
    handlers: Arc<RwLock<HandlerMap>>,
    tx: mpsc::UnboundedSender<BusMessage>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<BusMessage>>>,
    should_exit: Arc<AtomicBool>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handlers: Arc::new(RwLock::new(HandlerMap::default())),
            tx,
            rx: Mutex::new(Some(rx)),
            should_exit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> BusHandle {
        BusHandle {
            tx: self.tx.clone(),
        }
    }

    /// Append `handler` to the list for `kind`. Idempotent by handler name.
    pub async fn register(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        let list = handlers.entry(kind).or_default();
        if list.iter().any(|h| h.name() == handler.name()) {
            return;
        }
        list.push(handler);
    }

    /// Remove the handler registered under `name` for `kind`; no-op if
    /// absent.
    pub async fn unregister(&self, kind: EventKind, name: &str) {
        let mut handlers = self.handlers.write().await;
        if let Some(list) = handlers.get_mut(&kind) {
            list.retain(|h| h.name() != name);
        }
    }

    /// Enqueue an event.
    pub fn put(&self, event: Event) {
        self.handle().put(event);
    }

    /// Spawn the drain worker. Calling twice is a no-op.
    pub async fn startup(&self) {
        let Some(mut rx) = self.rx.lock().await.take() else {
            warn!("event bus already started");
            return;
        };
        let handlers = Arc::clone(&self.handlers);
        let should_exit = Arc::clone(&self.should_exit);
        tokio::spawn(async move {
            info!("event bus started");
            while let Some(message) = rx.recv().await {
                if should_exit.load(Ordering::Acquire) {
                    break;
                }
                let event = match message {
                    BusMessage::Deliver(event) => *event,
                    BusMessage::Stop => break,
                };
                let kind = event.kind();
                let list = handlers
                    .read()
                    .await
                    .get(&kind)
                    .cloned()
                    .unwrap_or_default();
                for handler in list {
                    if let Err(error) = handler.handle(event.clone()).await {
                        error!(
                            kind = kind.as_str(),
                            handler = handler.name(),
                            %error,
                            "event handler failed, event considered delivered"
                        );
                    }
                }
            }
            debug!("event bus drained");
        });
    }

    /// Stop after the event currently being delivered. Undelivered events
    /// are dropped.
    pub fn shutdown(&self) {
        self.should_exit.store(true, Ordering::Release);
        let _ = self.tx.send(BusMessage::Stop);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Recorder {
        name: String,
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, event: Event) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("boom");
            }
            let tag = match event {
                Event::OrderUpdateStatus { entrust_id, status } => {
                    format!("{}:{}:{}", self.name, entrust_id, status.as_str())
                }
                other => format!("{}:{}", self.name, other.kind().as_str()),
            };
            self.seen.lock().await.push(tag);
            Ok(())
        }
    }

    fn recorder(name: &str, seen: &Arc<Mutex<Vec<String>>>) -> Arc<dyn EventHandler> {
        Arc::new(Recorder {
            name: name.to_string(),
            seen: Arc::clone(seen),
            fail: false,
        })
    }

    async fn drain_pause() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn status_event(id: &str, status: OrderStatus) -> Event {
        Event::OrderUpdateStatus {
            entrust_id: id.to_string(),
            status,
        }
    }

    #[tokio::test]
    async fn test_per_kind_ordering_and_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register(EventKind::OrderUpdateStatus, recorder("a", &seen))
            .await;
        bus.register(EventKind::OrderUpdateStatus, recorder("b", &seen))
            .await;
        bus.startup().await;

        bus.put(status_event("1", OrderStatus::NotDone));
        bus.put(status_event("2", OrderStatus::Canceled));
        drain_pause().await;

        let log = seen.lock().await.clone();
        assert_eq!(
            log,
            vec![
                "a:1:not_done".to_string(),
                "b:1:not_done".to_string(),
                "a:2:canceled".to_string(),
                "b:2:canceled".to_string(),
            ]
        );
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register(EventKind::MarketClose, recorder("once", &seen))
            .await;
        bus.register(EventKind::MarketClose, recorder("once", &seen))
            .await;
        bus.startup().await;

        bus.put(Event::MarketClose);
        drain_pause().await;

        assert_eq!(seen.lock().await.len(), 1);
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_unregister_is_noop_when_absent() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register(EventKind::MarketClose, recorder("keep", &seen))
            .await;
        bus.unregister(EventKind::MarketClose, "ghost").await;
        bus.unregister(EventKind::MarketClose, "keep").await;
        bus.startup().await;

        bus.put(Event::MarketClose);
        drain_pause().await;

        assert!(seen.lock().await.is_empty());
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_block_later_handlers() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register(
            EventKind::MarketClose,
            Arc::new(Recorder {
                name: "bad".to_string(),
                seen: Arc::clone(&seen),
                fail: true,
            }),
        )
        .await;
        bus.register(EventKind::MarketClose, recorder("good", &seen))
            .await;
        bus.startup().await;

        bus.put(Event::MarketClose);
        drain_pause().await;

        assert_eq!(
            seen.lock().await.clone(),
            vec!["good:market_close_event".to_string()]
        );
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register(EventKind::MarketClose, recorder("h", &seen))
            .await;
        bus.startup().await;
        bus.shutdown();
        drain_pause().await;

        bus.put(Event::MarketClose);
        drain_pause().await;

        assert!(seen.lock().await.is_empty());
    }
}
