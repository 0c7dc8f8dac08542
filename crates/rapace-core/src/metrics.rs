//! Atomic counters attached to a transport, in the style of the source
//! pack's channel/global metrics (atomics + `snapshot()`/`reset()`).

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for one transport instance.
#[derive(Debug, Default)]
pub struct TransportMetrics {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    flow_control_stalls: AtomicU64,
    errors: AtomicU64,
}

impl TransportMetrics {
    pub fn record_send(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recv(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flow_control_stall(&self) {
        self.flow_control_stalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportMetricsSnapshot {
        TransportMetricsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            flow_control_stalls: self.flow_control_stalls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.messages_sent.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
        self.flow_control_stalls.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time, non-atomic copy of [`TransportMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportMetricsSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub flow_control_stalls: u64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate() {
        let m = TransportMetrics::default();
        m.record_send(10);
        m.record_send(5);
        m.record_recv(3);
        m.record_error();
        m.record_flow_control_stall();

        let snap = m.snapshot();
        assert_eq!(snap.bytes_sent, 15);
        assert_eq!(snap.messages_sent, 2);
        assert_eq!(snap.bytes_received, 3);
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.flow_control_stalls, 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let m = TransportMetrics::default();
        m.record_send(10);
        m.reset();
        assert_eq!(m.snapshot(), TransportMetricsSnapshot::default());
    }
}
