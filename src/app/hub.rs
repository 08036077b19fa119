// ordertail - app/hub.rs
//
// Subscriber Hub: fans every resolved order update out to the current
// subscriber set over two channels — `instant` (one delivery per update,
// immediately) and `batched` (updates coalesced into one `{count,
// orders}` delivery per period). A subscriber that fails delivery is
// removed from the set rather than allowed to stall the fan-out.

use crate::core::model::{Order, Update};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// One period's worth of coalesced updates delivered to the `batched`
/// channel.
#[derive(Debug, Clone)]
pub struct BatchedDelivery {
    pub count: usize,
    pub orders: Vec<Order>,
}

/// Why a subscriber's send failed. Known benign failures (disconnects,
/// send timeouts, keepalive expiry) are noisy in ordinary operation and
/// logged at debug level; anything else indicates a real problem and is
/// logged at error level.
#[derive(Debug, Clone)]
pub enum FailureKind {
    Disconnected,
    Timeout,
    KeepaliveExpired,
    Other(String),
}

impl FailureKind {
    fn is_benign(&self) -> bool {
        matches!(
            self,
            FailureKind::Disconnected | FailureKind::Timeout | FailureKind::KeepaliveExpired
        )
    }
}

/// Outcome of one subscriber delivery attempt.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Ok,
    Failed(FailureKind),
}

/// A sink the Hub fans updates out to. Implementors decide how to
/// surface a delivery (a websocket write, an in-process channel, a test
/// probe); a `Failed` outcome is treated as a failed delivery and the
/// subscriber is dropped from the set.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;
    async fn send_instant(&self, update: Update) -> SendOutcome;
    async fn send_batched(&self, batch: BatchedDelivery) -> SendOutcome;
}

/// The subscriber set plus fan-out logic. Cheaply cloneable via `Arc` so
/// the same hub can be shared between the task driving delivery and
/// whatever registers subscribers (e.g. an accepting listener).
pub struct Hub {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers
            .write()
            .expect("hub lock poisoned")
            .push(subscriber);
    }

    pub fn unsubscribe(&self, name: &str) {
        self.subscribers
            .write()
            .expect("hub lock poisoned")
            .retain(|s| s.name() != name);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("hub lock poisoned").len()
    }

    /// Snapshot the subscriber set before iterating so a concurrent
    /// `subscribe`/`unsubscribe` never observes or mutates a set that's
    /// mid fan-out.
    fn snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        self.subscribers.read().expect("hub lock poisoned").clone()
    }

    async fn fan_out_instant(&self, update: Update) {
        let snapshot = self.snapshot();
        let mut failed = Vec::new();
        for subscriber in &snapshot {
            if let SendOutcome::Failed(kind) = subscriber.send_instant(update.clone()).await {
                log_send_failure(subscriber.name(), &kind, "instant");
                failed.push(subscriber.name().to_string());
            }
        }
        self.remove_failed(failed);
    }

    async fn fan_out_batched(&self, batch: BatchedDelivery) {
        let snapshot = self.snapshot();
        let mut failed = Vec::new();
        for subscriber in &snapshot {
            if let SendOutcome::Failed(kind) = subscriber.send_batched(batch.clone()).await {
                log_send_failure(subscriber.name(), &kind, "batched");
                failed.push(subscriber.name().to_string());
            }
        }
        self.remove_failed(failed);
    }

    fn remove_failed(&self, failed: Vec<String>) {
        if failed.is_empty() {
            return;
        }
        self.subscribers
            .write()
            .expect("hub lock poisoned")
            .retain(|s| !failed.contains(&s.name().to_string()));
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

fn log_send_failure(subscriber: &str, kind: &FailureKind, channel: &str) {
    if kind.is_benign() {
        tracing::debug!(subscriber, channel, reason = ?kind, "subscriber failed delivery, removing");
    } else {
        tracing::error!(subscriber, channel, reason = ?kind, "subscriber failed delivery, removing");
    }
}

/// Drive the Hub's fan-out lifecycle: every update is delivered instantly
/// and coalesced into the next period's batched delivery. Runs until
/// `cancel` is set or `updates_rx` closes.
pub async fn run(
    hub: Arc<Hub>,
    mut updates_rx: mpsc::Receiver<Update>,
    batched_period_ms: u64,
    cancel: Arc<AtomicBool>,
) {
    let mut pending: Vec<Order> = Vec::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(batched_period_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if cancel.load(Ordering::Relaxed) {
            return;
        }

        tokio::select! {
            received = updates_rx.recv() => {
                match received {
                    Some(update) => {
                        pending.push(update.order().clone());
                        hub.fan_out_instant(update).await;
                    }
                    None => return,
                }
            }
            _ = ticker.tick() => {
                if !pending.is_empty() {
                    let batch = BatchedDelivery {
                        count: pending.len(),
                        orders: std::mem::take(&mut pending),
                    };
                    hub.fan_out_batched(batch).await;
                }
            }
        }
    }
}
