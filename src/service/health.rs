//! Health reporting
//!
//! This module builds the health and statistics report served by the
//! dashboard server and printed by `--health-check`.

use crate::metrics::MetricsCollector;
use crate::utils::{current_timestamp, format_uptime};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Crate version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Websocket subscribers currently attached
    pub active_subscribers: i64,
    /// Subscriptions started since service start
    pub subscriptions_total: u64,
    /// Snapshots accepted by the broadcaster
    pub snapshots_published: u64,
    /// Seconds since service start
    pub uptime_seconds: u64,
    /// Human-readable uptime
    pub uptime_info: String,
}

impl HealthCheck {
    /// Build a report from the current metrics. A service that is shutting
    /// down reports unhealthy.
    pub fn check(
        service: &str,
        started_at: DateTime<Utc>,
        metrics: &MetricsCollector,
        shutting_down: bool,
    ) -> Self {
        let uptime_seconds = (current_timestamp() - started_at).num_seconds().max(0) as u64;
        let broadcast = metrics.broadcast();

        HealthCheck {
            status: if shutting_down {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Healthy
            },
            service: service.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: current_timestamp(),
            stats: ServiceStats {
                active_subscribers: broadcast.active_subscribers.get(),
                subscriptions_total: broadcast.subscriptions_total.get(),
                snapshots_published: broadcast.snapshots_published_total.get(),
                uptime_seconds,
                uptime_info: format_uptime(uptime_seconds),
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
