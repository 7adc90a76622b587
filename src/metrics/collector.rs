//! Metrics collection using Prometheus
//!
//! This module provides metrics for the dashboard: subscriber fan-out,
//! published snapshots and aggregator output.

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Main metrics collector for the dashboard service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Broadcaster fan-out metrics
    broadcast_metrics: BroadcastMetrics,

    /// Aggregator output metrics
    aggregator_metrics: AggregatorMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,
}

/// Broadcaster fan-out metrics
#[derive(Clone)]
pub struct BroadcastMetrics {
    /// Subscribers currently attached
    pub active_subscribers: IntGauge,

    /// Subscriptions started since service start
    pub subscriptions_total: IntCounter,

    /// Subscriptions that ended because a write failed
    pub subscriber_write_failures_total: IntCounter,

    /// Values accepted by the broadcaster
    pub snapshots_published_total: IntCounter,
}

/// Aggregator output metrics
#[derive(Clone)]
pub struct AggregatorMetrics {
    /// Documents emitted by the root aggregator
    pub snapshots_emitted_total: IntCounter,

    /// Size of emitted documents
    pub snapshot_size_bytes: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let broadcast_metrics = BroadcastMetrics::new(&registry)?;
        let aggregator_metrics = AggregatorMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            broadcast_metrics,
            aggregator_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get broadcaster metrics
    pub fn broadcast(&self) -> &BroadcastMetrics {
        &self.broadcast_metrics
    }

    /// Get aggregator metrics
    pub fn aggregator(&self) -> &AggregatorMetrics {
        &self.aggregator_metrics
    }

    pub fn record_subscriber_added(&self) {
        self.broadcast_metrics.subscriptions_total.inc();
        self.broadcast_metrics.active_subscribers.inc();
    }

    pub fn record_subscriber_removed(&self) {
        self.broadcast_metrics.active_subscribers.dec();
    }

    pub fn record_subscriber_write_failure(&self) {
        self.broadcast_metrics.subscriber_write_failures_total.inc();
    }

    pub fn record_snapshot_published(&self) {
        self.broadcast_metrics.snapshots_published_total.inc();
    }

    /// Record a document leaving the root aggregator
    pub fn record_snapshot_emitted(&self, size_bytes: usize) {
        self.aggregator_metrics.snapshots_emitted_total.inc();
        self.aggregator_metrics
            .snapshot_size_bytes
            .observe(size_bytes as f64);
    }

    /// Update service uptime
    pub fn update_uptime(&self, seconds: u64) {
        self.service_metrics.uptime_seconds.set(seconds as i64);
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("matchboard_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self { uptime_seconds })
    }
}

impl BroadcastMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_subscribers = IntGauge::new(
            "matchboard_active_subscribers",
            "Number of attached dashboard subscribers",
        )?;
        registry.register(Box::new(active_subscribers.clone()))?;

        let subscriptions_total = IntCounter::new(
            "matchboard_subscriptions_total",
            "Total subscriptions started",
        )?;
        registry.register(Box::new(subscriptions_total.clone()))?;

        let subscriber_write_failures_total = IntCounter::new(
            "matchboard_subscriber_write_failures_total",
            "Total subscriptions ended by a failed write",
        )?;
        registry.register(Box::new(subscriber_write_failures_total.clone()))?;

        let snapshots_published_total = IntCounter::new(
            "matchboard_snapshots_published_total",
            "Total values accepted by the broadcaster",
        )?;
        registry.register(Box::new(snapshots_published_total.clone()))?;

        Ok(Self {
            active_subscribers,
            subscriptions_total,
            subscriber_write_failures_total,
            snapshots_published_total,
        })
    }
}

impl AggregatorMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let snapshots_emitted_total = IntCounter::new(
            "matchboard_snapshots_emitted_total",
            "Total documents emitted by the root aggregator",
        )?;
        registry.register(Box::new(snapshots_emitted_total.clone()))?;

        let snapshot_size_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "matchboard_snapshot_size_bytes",
                "Size of emitted documents in bytes",
            )
            .buckets(prometheus::exponential_buckets(64.0, 4.0, 8)?),
        )?;
        registry.register(Box::new(snapshot_size_bytes.clone()))?;

        Ok(Self {
            snapshots_emitted_total,
            snapshot_size_bytes,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
