//! Prometheus metrics for the peer transport node.
//!
//! Exposes counters and gauges covering the connection registry and the
//! establishment handshake. The [`NodeMetrics`] struct owns a dedicated
//! [`Registry`] that an operator can scrape directly or wire behind an
//! HTTP endpoint.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Opts, Registry,
};

use burst_network::{Direction, MessageCategory, MetricsSink, PurgeObserver};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Total bytes sent across all channels.
    pub bytes_sent: IntCounter,
    /// Total bytes received across all channels.
    pub bytes_received: IntCounter,
    /// Total outbound connection attempts started.
    pub connections_dialed: IntCounter,
    /// Total inbound connections accepted.
    pub connections_accepted: IntCounter,
    /// Total identity handshakes that failed (timeout, bad signature, malformed frame).
    pub handshake_failures: IntCounter,
    /// Total channels purged for being idle or closed.
    pub channels_purged: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Current number of live channels in the registry.
    pub peer_count: IntGauge,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let bytes_sent = register_int_counter_with_registry!(
            Opts::new("burst_bytes_sent_total", "Total bytes sent to peers"),
            registry
        )
        .expect("failed to register bytes_sent counter");

        let bytes_received = register_int_counter_with_registry!(
            Opts::new("burst_bytes_received_total", "Total bytes received from peers"),
            registry
        )
        .expect("failed to register bytes_received counter");

        let connections_dialed = register_int_counter_with_registry!(
            Opts::new(
                "burst_connections_dialed_total",
                "Total outbound connection attempts started"
            ),
            registry
        )
        .expect("failed to register connections_dialed counter");

        let connections_accepted = register_int_counter_with_registry!(
            Opts::new(
                "burst_connections_accepted_total",
                "Total inbound connections accepted"
            ),
            registry
        )
        .expect("failed to register connections_accepted counter");

        let handshake_failures = register_int_counter_with_registry!(
            Opts::new(
                "burst_handshake_failures_total",
                "Total identity handshakes that failed"
            ),
            registry
        )
        .expect("failed to register handshake_failures counter");

        let channels_purged = register_int_counter_with_registry!(
            Opts::new(
                "burst_channels_purged_total",
                "Total channels purged for being idle or closed"
            ),
            registry
        )
        .expect("failed to register channels_purged counter");

        let peer_count = register_int_gauge_with_registry!(
            Opts::new("burst_peer_count", "Current number of connected peers"),
            registry
        )
        .expect("failed to register peer_count gauge");

        Self {
            registry,
            bytes_sent,
            bytes_received,
            connections_dialed,
            connections_accepted,
            handshake_failures,
            channels_purged,
            peer_count,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for NodeMetrics {
    fn record(&self, _category: MessageCategory, direction: Direction, bytes: usize) {
        match direction {
            Direction::Outbound => self.bytes_sent.inc_by(bytes as u64),
            Direction::Inbound => self.bytes_received.inc_by(bytes as u64),
        }
    }
}

impl PurgeObserver for NodeMetrics {
    fn observe_purged(&self, count: usize) {
        self.channels_purged.inc_by(count as u64);
    }
}
