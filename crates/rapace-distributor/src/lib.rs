//! Many-subscriber fan-out primitive (C9): the primitive responders use to
//! serve long-lived server-streams to several clients at once.
//!
//! Grounded in the runtime spec's §4.9 and in the source pack's
//! `ChannelMetrics`/`GlobalMetrics` atomics-plus-`snapshot()` idiom for the
//! metrics half.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rapace_core::Metadata;

/// Default bound on each subscriber's inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// An item handed to a subscriber: the published value plus whatever
/// metadata accompanied that publish call.
#[derive(Debug, Clone)]
pub struct Delivered<T> {
    pub item: T,
    pub metadata: Option<Metadata>,
}

/// Errors raised by distributor operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributorError {
    UnknownSubscriber(u64),
    Disposed,
}

impl fmt::Display for DistributorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributorError::UnknownSubscriber(id) => write!(f, "unknown subscriber {id}"),
            DistributorError::Disposed => write!(f, "distributor has been disposed"),
        }
    }
}

impl std::error::Error for DistributorError {}

struct Subscriber<T> {
    tx: mpsc::Sender<Delivered<T>>,
    created_at: Instant,
    last_active: Instant,
    paused: bool,
    messages_received: u64,
}

/// Running counters for one distributor (totals, not currently-active
/// counts, mirroring the spec's "totals and running counts").
#[derive(Debug, Default)]
pub struct DistributorMetrics {
    subscribers_created: AtomicU64,
    subscribers_closed: AtomicU64,
    messages_published: AtomicU64,
    messages_delivered: AtomicU64,
    bytes_delivered: AtomicU64,
    errors: AtomicU64,
}

impl DistributorMetrics {
    fn record_subscribe(&self) {
        self.subscribers_created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_close(&self) {
        self.subscribers_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_publish(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    fn record_delivery(&self, len_hint: usize) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered
            .fetch_add(len_hint as u64, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DistributorMetricsSnapshot {
        let messages_delivered = self.messages_delivered.load(Ordering::Relaxed);
        let bytes_delivered = self.bytes_delivered.load(Ordering::Relaxed);
        let mean_message_size = if messages_delivered > 0 {
            bytes_delivered as f64 / messages_delivered as f64
        } else {
            0.0
        };
        DistributorMetricsSnapshot {
            subscribers_created: self.subscribers_created.load(Ordering::Relaxed),
            subscribers_closed: self.subscribers_closed.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            messages_delivered,
            errors: self.errors.load(Ordering::Relaxed),
            mean_message_size,
        }
    }

    pub fn reset(&self) {
        self.subscribers_created.store(0, Ordering::Relaxed);
        self.subscribers_closed.store(0, Ordering::Relaxed);
        self.messages_published.store(0, Ordering::Relaxed);
        self.messages_delivered.store(0, Ordering::Relaxed);
        self.bytes_delivered.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributorMetricsSnapshot {
    pub subscribers_created: u64,
    pub subscribers_closed: u64,
    pub messages_published: u64,
    pub messages_delivered: u64,
    pub errors: u64,
    pub mean_message_size: f64,
}

/// Fan-out publisher over any `Clone`-able item type.
///
/// Ownership is one-directional: the distributor owns the subscriber record
/// and its inbox outright; the `Receiver` handed back by [`subscribe`] is a
/// weak reference in spirit — dropping it doesn't notify the distributor,
/// and [`dispose`] tears down every inbox regardless of outstanding
/// receivers.
///
/// [`subscribe`]: StreamDistributor::subscribe
/// [`dispose`]: StreamDistributor::dispose
pub struct StreamDistributor<T> {
    subscribers: Mutex<HashMap<u64, Subscriber<T>>>,
    next_id: AtomicU64,
    inbox_capacity: usize,
    disposed: AtomicBool,
    metrics: DistributorMetrics,
}

impl<T> StreamDistributor<T> {
    pub fn new() -> Self {
        Self::with_inbox_capacity(DEFAULT_INBOX_CAPACITY)
    }

    pub fn with_inbox_capacity(inbox_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            inbox_capacity,
            disposed: AtomicBool::new(false),
            metrics: DistributorMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &DistributorMetrics {
        &self.metrics
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Register a new subscriber, auto-assigning an ID if `subscriber_id`
    /// is `None`. Re-subscribing an existing ID replaces it.
    pub fn subscribe(&self, subscriber_id: Option<u64>) -> (u64, mpsc::Receiver<Delivered<T>>) {
        let id = subscriber_id.unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        let now = Instant::now();
        self.subscribers.lock().insert(
            id,
            Subscriber {
                tx,
                created_at: now,
                last_active: now,
                paused: false,
                messages_received: 0,
            },
        );
        self.metrics.record_subscribe();
        (id, rx)
    }

    pub fn pause(&self, subscriber_id: u64) -> Result<(), DistributorError> {
        let mut subs = self.subscribers.lock();
        let sub = subs
            .get_mut(&subscriber_id)
            .ok_or(DistributorError::UnknownSubscriber(subscriber_id))?;
        sub.paused = true;
        Ok(())
    }

    pub fn resume(&self, subscriber_id: u64) -> Result<(), DistributorError> {
        let mut subs = self.subscribers.lock();
        let sub = subs
            .get_mut(&subscriber_id)
            .ok_or(DistributorError::UnknownSubscriber(subscriber_id))?;
        sub.paused = false;
        sub.last_active = Instant::now();
        Ok(())
    }

    pub fn close_subscriber(&self, subscriber_id: u64) -> Result<(), DistributorError> {
        self.subscribers
            .lock()
            .remove(&subscriber_id)
            .ok_or(DistributorError::UnknownSubscriber(subscriber_id))?;
        self.metrics.record_close();
        Ok(())
    }

    /// Close every subscriber idle (no delivery or explicit resume) for at
    /// least `threshold`. Returns how many were closed.
    pub fn close_inactive(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let mut subs = self.subscribers.lock();
        let stale: Vec<u64> = subs
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_active) >= threshold)
            .map(|(&id, _)| id)
            .collect();
        for id in &stale {
            subs.remove(id);
        }
        for _ in 0..stale.len() {
            self.metrics.record_close();
        }
        stale.len()
    }

    /// Tear down every subscriber and refuse further publishes/subscribes.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        let mut subs = self.subscribers.lock();
        let n = subs.len();
        subs.clear();
        for _ in 0..n {
            self.metrics.record_close();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Spawn a background task that periodically closes subscribers idle
    /// longer than `threshold`. The task exits once the distributor is
    /// disposed.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, interval: Duration, threshold: Duration) -> JoinHandle<()>
    where
        T: Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if this.is_disposed() {
                    break;
                }
                let closed = this.close_inactive(threshold);
                if closed > 0 {
                    tracing::debug!(closed, "idle sweeper closed inactive subscribers");
                }
            }
        })
    }
}

impl<T: Clone> StreamDistributor<T> {
    /// Deliver `item` to every unpaused subscriber. Returns the count of
    /// subscribers reached.
    pub fn publish(&self, item: T, len_hint: usize, metadata: Option<Metadata>) -> usize {
        self.publish_filtered(item, len_hint, metadata, |_| true)
    }

    /// Deliver `item` to unpaused subscribers satisfying `predicate`.
    pub fn publish_filtered<F>(
        &self,
        item: T,
        len_hint: usize,
        metadata: Option<Metadata>,
        predicate: F,
    ) -> usize
    where
        F: Fn(u64) -> bool,
    {
        if self.disposed.load(Ordering::Acquire) {
            return 0;
        }
        self.metrics.record_publish();

        let mut reached = 0;
        let mut overflowed = Vec::new();
        {
            let mut subs = self.subscribers.lock();
            for (&id, sub) in subs.iter_mut() {
                if sub.paused || !predicate(id) {
                    continue;
                }
                let delivered = Delivered {
                    item: item.clone(),
                    metadata: metadata.clone(),
                };
                match sub.tx.try_send(delivered) {
                    Ok(()) => {
                        sub.last_active = Instant::now();
                        sub.messages_received += 1;
                        reached += 1;
                        self.metrics.record_delivery(len_hint);
                    }
                    Err(_) => {
                        overflowed.push(id);
                        self.metrics.record_error();
                    }
                }
            }
            for id in &overflowed {
                subs.remove(id);
            }
        }
        for _ in &overflowed {
            self.metrics.record_close();
        }
        reached
    }

    /// Deliver `item` to exactly one subscriber. A paused subscriber
    /// silently drops the item, matching `publish`'s semantics.
    pub fn publish_to(
        &self,
        subscriber_id: u64,
        item: T,
        len_hint: usize,
        metadata: Option<Metadata>,
    ) -> Result<(), DistributorError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(DistributorError::Disposed);
        }
        self.metrics.record_publish();

        let mut subs = self.subscribers.lock();
        let sub = subs
            .get_mut(&subscriber_id)
            .ok_or(DistributorError::UnknownSubscriber(subscriber_id))?;
        if sub.paused {
            return Ok(());
        }
        match sub.tx.try_send(Delivered { item, metadata }) {
            Ok(()) => {
                sub.last_active = Instant::now();
                sub.messages_received += 1;
                self.metrics.record_delivery(len_hint);
                Ok(())
            }
            Err(_) => {
                subs.remove(&subscriber_id);
                self.metrics.record_error();
                self.metrics.record_close();
                Ok(())
            }
        }
    }
}

impl<T> Default for StreamDistributor<T> {
    fn default() -> Self {
        Self::new()
    }
}
