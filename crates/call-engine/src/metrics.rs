//! Engine counters for embedder-side observability.
//!
//! The engine keeps lightweight atomic counters rather than wiring up an
//! exporter; the embedding application decides what to do with them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared engine counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Gossip messages handed to the presence channel for publish.
    published: AtomicU64,
    /// Publishes the presence channel reported as failed.
    publish_failures: AtomicU64,
    /// Inbound payloads dropped as unparseable or unrecognized.
    malformed_payloads: AtomicU64,
    /// Channel events processed by the identity actor.
    channel_events_processed: AtomicU64,
    /// Transport events processed by the transport actor.
    transport_events_processed: AtomicU64,
}

impl EngineMetrics {
    /// Create a new shared counter set.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_payload(&self) {
        self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_channel_event(&self) {
        self.channel_events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_event(&self) {
        self.transport_events_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            channel_events_processed: self.channel_events_processed.load(Ordering::Relaxed),
            transport_events_processed: self.transport_events_processed.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub publish_failures: u64,
    pub malformed_payloads: u64,
    pub channel_events_processed: u64,
    pub transport_events_processed: u64,
}
