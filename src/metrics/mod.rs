//! Metrics and monitoring for the matchboard dashboard
//!
//! Prometheus metrics for subscriber fan-out and aggregator output. The
//! registry is served by the dashboard HTTP server at `/metrics`.

pub mod collector;

pub use collector::{AggregatorMetrics, BroadcastMetrics, MetricsCollector, ServiceMetrics};

use anyhow::Result;
use prometheus::TextEncoder;

/// Encode every registered metric in the Prometheus text format
pub fn encode_metrics(collector: &MetricsCollector) -> Result<String> {
    let metric_families = collector.registry().gather();
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&metric_families)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))
}
