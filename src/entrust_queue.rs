//! Entrust queue - ordered map of open orders with a blocking take
//!
//! FIFO by insertion order, keyed by entrust id. A `put` that hits an
//! existing key replaces the value in place so the entry keeps its queue
//! position. Two keys are reserved: `<entrust_id>_cancel` keeps a cancel
//! from colliding with its target, and `event` carries control sentinels
//! such as the engine-exit signal.
//!
//! The realization is a mutex-guarded deque+map with a wake-one notifier;
//! the matchmaking worker is the single awaiter.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, Notify};

use crate::core_types::EntrustId;
use crate::models::{Order, OrderType};

/// Reserved key for control entries.
pub const EVENT_KEY: &str = "event";

/// Control sentinels delivered through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Posted when the session ends or the engine shuts down; the
    /// matchmaking loop observes it and re-checks its run flag.
    ExitEngine,
}

/// What `take` hands to the matchmaking worker.
#[derive(Debug, Clone)]
pub enum QueueItem {
    Order(Box<Order>),
    Control(ControlEvent),
}

#[derive(Default)]
struct Inner {
    /// Insertion order of live keys. May hold stale keys for deleted
    /// entries; `take` skips those.
    order: VecDeque<String>,
    items: FxHashMap<String, QueueItem>,
}

/// Blocking ordered map owned by the market engine.
pub struct EntrustQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl EntrustQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Queue key for a cancel targeting `entrust_id`.
    pub fn cancel_key(entrust_id: &str) -> String {
        format!("{entrust_id}_cancel")
    }

    /// Insert an order at the tail; an order already queued under the same
    /// key is replaced in place.
    pub async fn put(&self, order: Order) {
        let key = if order.order_type == OrderType::Cancel {
            Self::cancel_key(&order.entrust_id)
        } else {
            order.entrust_id.clone()
        };
        self.insert(key, QueueItem::Order(Box::new(order))).await;
    }

    /// Post a control sentinel under the reserved `event` key.
    pub async fn put_control(&self, control: ControlEvent) {
        self.insert(EVENT_KEY.to_string(), QueueItem::Control(control))
            .await;
    }

    async fn insert(&self, key: String, item: QueueItem) {
        {
            let mut inner = self.inner.lock().await;
            if inner.items.insert(key.clone(), item).is_none() {
                inner.order.push_back(key);
            }
        }
        self.notify.notify_one();
    }

    /// Await until non-empty, remove the head entry, and return it.
    pub async fn take(&self) -> QueueItem {
        loop {
            {
                let mut inner = self.inner.lock().await;
                while let Some(key) = inner.order.pop_front() {
                    if let Some(item) = inner.items.remove(&key) {
                        return item;
                    }
                    // Stale key left behind by `delete`; skip it.
                }
            }
            self.notify.notified().await;
        }
    }

    /// Remove the live order stored under `entrust_id`, returning it if it
    /// was present.
    pub async fn delete(&self, entrust_id: &EntrustId) -> Option<Order> {
        let mut inner = self.inner.lock().await;
        match inner.items.remove(entrust_id) {
            Some(QueueItem::Order(order)) => Some(*order),
            Some(control) => {
                // Only orders live under entrust-id keys; put it back.
                inner.items.insert(entrust_id.clone(), control);
                None
            }
            None => None,
        }
    }

    /// Current open orders in queue order, for the shutdown drain.
    pub async fn snapshot(&self) -> Vec<Order> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|key| match inner.items.get(key) {
                Some(QueueItem::Order(order)) => Some((**order).clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.items.is_empty()
    }
}

impl Default for EntrustQueue {
    fn default() -> Self {
        Self::new()
    }
}
