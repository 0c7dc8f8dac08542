//! In-process paired transport: the reference `Transport` implementation
//! (§4.4). Directly adapted from the source pack's `MemTransport` — two
//! peers sharing a pair of one-way `mpsc` queues — and extended with the
//! per-stream routing and transport-wide flow-control window the spec
//! requires but the source file's single-logical-stream version didn't need.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use rapace_wire::{Role, StreamIdManager};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::metadata::Metadata;
use crate::metrics::TransportMetrics;
use crate::transport::{Transport, TransportMessage};

/// Capacity of the raw, not-yet-demultiplexed channel between peers.
const RAW_CHANNEL_CAPACITY: usize = 64;

/// Tracks local/remote end-of-stream observation for one stream ID, so a
/// second local send after `end_of_stream=true` is rejected (§4.4).
#[derive(Debug, Default, Clone, Copy)]
struct EosState {
    local: bool,
    remote: bool,
}

/// Transport-wide flow-control window (§4.4). Grows lazily up to `max`;
/// a reservation that still doesn't fit after growth fails.
#[derive(Debug)]
struct Window {
    used: AtomicU64,
    limit: AtomicU64,
    max: u64,
}

impl Window {
    fn new(initial: u64, max: u64) -> Self {
        Self {
            used: AtomicU64::new(0),
            limit: AtomicU64::new(initial),
            max,
        }
    }

    fn try_reserve(&self, len: u64) -> Result<(), TransportError> {
        loop {
            let used = self.used.load(Ordering::Acquire);
            let limit = self.limit.load(Ordering::Acquire);
            let needed = used + len;

            if needed <= limit {
                if self
                    .used
                    .compare_exchange(used, needed, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return Ok(());
                }
                continue;
            }

            let grown = needed.min(self.max);
            if grown > limit {
                let _ = self.limit.compare_exchange(
                    limit,
                    grown,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                continue;
            }

            return Err(TransportError::WindowExceeded {
                requested: len,
                available: limit.saturating_sub(used),
            });
        }
    }

    fn release(&self, len: u64) {
        let _ = self.used.fetch_update(Ordering::AcqRel, Ordering::Acquire, |u| {
            Some(u.saturating_sub(len))
        });
    }
}

#[derive(Clone)]
struct MailboxEntry {
    tx: mpsc::Sender<TransportMessage>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<TransportMessage>>>,
}

struct Inner {
    #[allow(dead_code)] // kept for introspection/debugging symmetry with the peer's role
    role: Role,
    out_tx: mpsc::Sender<TransportMessage>,
    incoming_rx: tokio::sync::Mutex<mpsc::Receiver<TransportMessage>>,
    stream_ids: Mutex<StreamIdManager>,
    mailboxes: Mutex<HashMap<u32, MailboxEntry>>,
    eos: Mutex<HashMap<u32, EosState>>,
    out_window: Arc<Window>,
    in_window: Arc<Window>,
    closed: AtomicBool,
    closed_notify: Notify,
    config: TransportConfig,
    metrics: TransportMetrics,
}

impl Inner {
    fn ensure_mailbox(&self, stream_id: u32) -> MailboxEntry {
        self.mailboxes
            .lock()
            .entry(stream_id)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.config.inbound_queue_depth);
                MailboxEntry {
                    tx,
                    rx: Arc::new(tokio::sync::Mutex::new(rx)),
                }
            })
            .clone()
    }
}

/// The in-process reference transport: two instances sharing a pair of
/// one-way queues, one per direction.
pub struct InProcTransport {
    inner: Arc<Inner>,
}

impl InProcTransport {
    /// Construct a connected pair. Must be called from within a Tokio
    /// runtime: each side spawns a task that demultiplexes its inbound
    /// queue into per-stream mailboxes.
    pub fn pair(config: TransportConfig) -> (Self, Self) {
        let (tx_a_to_b, rx_a_to_b) = mpsc::channel(RAW_CHANNEL_CAPACITY);
        let (tx_b_to_a, rx_b_to_a) = mpsc::channel(RAW_CHANNEL_CAPACITY);
        let (incoming_tx_a, incoming_rx_a) = mpsc::channel(RAW_CHANNEL_CAPACITY);
        let (incoming_tx_b, incoming_rx_b) = mpsc::channel(RAW_CHANNEL_CAPACITY);

        // window_ab bounds bytes in flight from A to B; window_ba the reverse.
        let window_ab = Arc::new(Window::new(config.initial_window, config.max_window));
        let window_ba = Arc::new(Window::new(config.initial_window, config.max_window));

        let inner_a = Arc::new(Inner {
            role: Role::Caller,
            out_tx: tx_a_to_b,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx_a),
            stream_ids: Mutex::new(StreamIdManager::new(Role::Caller)),
            mailboxes: Mutex::new(HashMap::new()),
            eos: Mutex::new(HashMap::new()),
            out_window: window_ab.clone(),
            in_window: window_ba.clone(),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
            config,
            metrics: TransportMetrics::default(),
        });

        let inner_b = Arc::new(Inner {
            role: Role::Responder,
            out_tx: tx_b_to_a,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx_b),
            stream_ids: Mutex::new(StreamIdManager::new(Role::Responder)),
            mailboxes: Mutex::new(HashMap::new()),
            eos: Mutex::new(HashMap::new()),
            out_window: window_ba,
            in_window: window_ab,
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
            config,
            metrics: TransportMetrics::default(),
        });

        tokio::spawn(demux_loop(inner_a.clone(), rx_b_to_a, incoming_tx_a));
        tokio::spawn(demux_loop(inner_b.clone(), rx_a_to_b, incoming_tx_b));

        (Self { inner: inner_a }, Self { inner: inner_b })
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.inner.metrics
    }

    async fn send_raw(&self, msg: TransportMessage, payload_len: u64) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        {
            let mut eos = self.inner.eos.lock();
            let state = eos.entry(msg.stream_id).or_default();
            if state.local {
                return Err(TransportError::AlreadyHalfClosed(msg.stream_id));
            }
            if msg.end_of_stream {
                state.local = true;
            }
        }

        self.inner.metrics.record_send(payload_len);
        self.inner
            .out_tx
            .send(msg)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv_from(
        &self,
        rx: &tokio::sync::Mutex<mpsc::Receiver<TransportMessage>>,
    ) -> Result<TransportMessage, TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let mut guard = rx.lock().await;
        tokio::select! {
            msg = guard.recv() => msg.ok_or(TransportError::Closed),
            _ = self.inner.closed_notify.notified() => Err(TransportError::Closed),
        }
    }
}

impl Transport for InProcTransport {
    fn create_stream(&self) -> Result<u32, TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let id = self
            .inner
            .stream_ids
            .lock()
            .generate()
            .map_err(|_| TransportError::StreamIdsExhausted)?;
        self.inner.ensure_mailbox(id);
        Ok(id)
    }

    async fn send_metadata(
        &self,
        stream_id: u32,
        metadata: Metadata,
        end_of_stream: bool,
    ) -> Result<(), TransportError> {
        self.send_raw(TransportMessage::metadata(stream_id, metadata, end_of_stream), 0)
            .await
    }

    async fn send_message(
        &self,
        stream_id: u32,
        bytes: Bytes,
        end_of_stream: bool,
    ) -> Result<(), TransportError> {
        let len = bytes.len() as u64;
        if let Err(e) = self.inner.out_window.try_reserve(len) {
            self.inner.metrics.record_flow_control_stall();
            return Err(e);
        }
        self.send_raw(TransportMessage::payload(stream_id, bytes, end_of_stream), len)
            .await
    }

    async fn finish_sending(&self, stream_id: u32) -> Result<(), TransportError> {
        let already_local = self
            .inner
            .eos
            .lock()
            .get(&stream_id)
            .map(|s| s.local)
            .unwrap_or(false);
        if already_local {
            return Err(TransportError::AlreadyHalfClosed(stream_id));
        }
        self.send_raw(TransportMessage::payload(stream_id, Bytes::new(), true), 0)
            .await
    }

    async fn incoming(&self) -> Result<TransportMessage, TransportError> {
        self.recv_from(&self.inner.incoming_rx).await
    }

    async fn messages_for(&self, stream_id: u32) -> Result<TransportMessage, TransportError> {
        let entry = self.inner.ensure_mailbox(stream_id);
        self.recv_from(&entry.rx).await
    }

    fn release_stream_id(&self, stream_id: u32) {
        self.inner.stream_ids.lock().release(stream_id);
        self.inner.mailboxes.lock().remove(&stream_id);
        self.inner.eos.lock().remove(&stream_id);
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.closed_notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Reads the raw inbound queue and fans each message out to (a) the
/// dispatcher-visible `incoming()` queue and (b) the per-stream mailbox
/// `messages_for` drains. A full mailbox suspends this task, which in turn
/// lets the raw queue fill and backpressures the sender — the reference
/// transport's whole backpressure chain in one blocking `send`.
async fn demux_loop(
    inner: Arc<Inner>,
    mut raw_rx: mpsc::Receiver<TransportMessage>,
    incoming_tx: mpsc::Sender<TransportMessage>,
) {
    while let Some(msg) = raw_rx.recv().await {
        let stream_id = msg.stream_id;
        let payload_len = msg.bytes.as_ref().map(|b| b.len() as u64).unwrap_or(0);

        inner.metrics.record_recv(payload_len);
        inner.in_window.release(payload_len);

        if msg.end_of_stream {
            inner.eos.lock().entry(stream_id).or_default().remote = true;
        }

        let entry = inner.ensure_mailbox(stream_id);
        if incoming_tx.send(msg.clone()).await.is_err() {
            // Dispatcher side gone; per-stream consumers may still be alive.
        }
        if entry.tx.send(msg).await.is_err() {
            // No one is reading this stream's mailbox (e.g. dropped call); drop.
        }
    }
    inner.closed.store(true, Ordering::Release);
    inner.closed_notify.notify_waiters();
}
