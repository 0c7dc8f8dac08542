//! Tunable configuration, builder-style in the manner of the registry's
//! `ServiceBuilder`/`MethodBuilder` pair.

use std::time::Duration;

/// Tunables for a single transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Payload length above which a frame is rejected (§4.2, default 16 MiB).
    pub max_frame_len: u32,
    /// Starting size of the transport-wide flow-control window (§4.4).
    pub initial_window: u64,
    /// Ceiling the window may grow to before sends start failing (§4.4).
    pub max_window: u64,
    /// Bound on each per-stream inbound payload queue (§4.6).
    pub inbound_queue_depth: usize,
}

impl TransportConfig {
    pub fn with_max_frame_len(mut self, max_frame_len: u32) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn with_initial_window(mut self, initial_window: u64) -> Self {
        self.initial_window = initial_window;
        self
    }

    pub fn with_max_window(mut self, max_window: u64) -> Self {
        self.max_window = max_window;
        self
    }

    pub fn with_inbound_queue_depth(mut self, inbound_queue_depth: usize) -> Self {
        self.inbound_queue_depth = inbound_queue_depth;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_len: rapace_wire::DEFAULT_MAX_FRAME_LEN,
            initial_window: 10 * 1024 * 1024,
            max_window: 100 * 1024 * 1024,
            inbound_queue_depth: 64,
        }
    }
}

/// Tunables for an endpoint sitting on top of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Default unary-call timeout when the caller doesn't override it (§4.6.1).
    pub unary_timeout: Duration,
    /// Grace period `close()` waits for in-flight calls before forcing
    /// `UNAVAILABLE` trailers (§4.7).
    pub close_grace_period: Duration,
}

impl EndpointConfig {
    pub fn with_unary_timeout(mut self, timeout: Duration) -> Self {
        self.unary_timeout = timeout;
        self
    }

    pub fn with_close_grace_period(mut self, grace_period: Duration) -> Self {
        self.close_grace_period = grace_period;
        self
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            unary_timeout: Duration::from_secs(30),
            close_grace_period: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_config_defaults() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.max_frame_len, 16 * 1024 * 1024);
        assert_eq!(cfg.initial_window, 10 * 1024 * 1024);
        assert_eq!(cfg.max_window, 100 * 1024 * 1024);
        assert_eq!(cfg.inbound_queue_depth, 64);
    }

    #[test]
    fn transport_config_builder() {
        let cfg = TransportConfig::default()
            .with_max_frame_len(1024)
            .with_initial_window(2048)
            .with_max_window(4096)
            .with_inbound_queue_depth(8);
        assert_eq!(cfg.max_frame_len, 1024);
        assert_eq!(cfg.initial_window, 2048);
        assert_eq!(cfg.max_window, 4096);
        assert_eq!(cfg.inbound_queue_depth, 8);
    }

    #[test]
    fn endpoint_config_defaults() {
        let cfg = EndpointConfig::default();
        assert_eq!(cfg.unary_timeout, Duration::from_secs(30));
        assert_eq!(cfg.close_grace_period, Duration::from_secs(10));
    }
}
