//! Main application state and service coordination
//!
//! This module contains the AppState that wires the broadcaster, the root
//! aggregator, the demo producers and the dashboard server together, and
//! manages their background tasks.

use crate::aggregator::{FieldAggregator, FieldHandle, SnapshotSink};
use crate::broadcast::{Broadcaster, Publisher};
use crate::components::{ClientsComponent, UptimeComponent};
use crate::config::AppConfig;
use crate::metrics::MetricsCollector;
use crate::server::{DashboardServer, DashboardServerConfig, DashboardState};
use crate::types::Snapshot;
use crate::utils::{current_timestamp, pretty_json};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Publishes every document of the root aggregator to the broadcaster
struct DashboardSink {
    publisher: Publisher<Snapshot>,
    metrics: Arc<MetricsCollector>,
    pretty: bool,
}

#[async_trait]
impl SnapshotSink for DashboardSink {
    async fn emit(&self, snapshot: String) {
        let snapshot = if self.pretty {
            pretty_json(&snapshot).unwrap_or(snapshot)
        } else {
            snapshot
        };

        self.metrics.record_snapshot_emitted(snapshot.len());

        if self
            .publisher
            .publish_latest(Snapshot::from(snapshot))
            .await
            .is_err()
        {
            debug!("Broadcaster closed, dropping snapshot");
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Metrics collector shared by every component
    metrics: Arc<MetricsCollector>,

    /// Subscribe side of the snapshot broadcaster
    broadcaster: Broadcaster<Snapshot>,

    /// Root document; producers write through its field handles
    aggregator: FieldAggregator,

    /// Dashboard HTTP server
    server: Arc<DashboardServer>,

    /// Cancels the aggregator and every producer
    producers: CancellationToken,

    /// Cancels the server and every websocket subscription
    server_shutdown: CancellationToken,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Build every component. Nothing is served until [`AppState::start`].
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing matchboard dashboard service");

        let metrics = Arc::new(
            MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            })?,
        );

        let (publisher, broadcaster) =
            Broadcaster::with_metrics(config.sweep_interval(), metrics.clone());

        let producers = CancellationToken::new();
        let aggregator = FieldAggregator::new(
            producers.clone(),
            DashboardSink {
                publisher,
                metrics: metrics.clone(),
                pretty: config.broadcast.pretty_snapshots,
            },
        );

        let server_shutdown = CancellationToken::new();
        let server = Arc::new(DashboardServer::new(
            DashboardServerConfig {
                port: config.service.http_port,
                host: config.service.host.clone(),
            },
            DashboardState {
                service_name: config.service.name.clone(),
                broadcaster: broadcaster.clone(),
                metrics: metrics.clone(),
                started_at: current_timestamp(),
                shutdown: server_shutdown.clone(),
            },
        ));

        Ok(Self {
            config,
            metrics,
            broadcaster,
            aggregator,
            server,
            producers,
            server_shutdown,
            background_tasks: Vec::new(),
        })
    }

    /// Start the dashboard server and the demo producers
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting matchboard dashboard service");

        self.start_server().await?;
        self.start_components();
        self.start_uptime_metrics();

        info!("✅ Matchboard dashboard service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of matchboard service");

        // Subscribers first, so nobody sees the final empty document.
        self.server.stop();
        self.producers.cancel();

        self.stop_background_tasks().await;

        info!(
            "Final statistics: {} snapshots published, {} subscriptions served",
            self.metrics.broadcast().snapshots_published_total.get(),
            self.metrics.broadcast().subscriptions_total.get()
        );
        info!("✅ Matchboard service shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub fn is_running(&self) -> bool {
        !self.server_shutdown.is_cancelled()
    }

    /// Get the metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Get the snapshot broadcaster
    pub fn broadcaster(&self) -> Broadcaster<Snapshot> {
        self.broadcaster.clone()
    }

    /// Handle for one top-level field of the dashboard document
    pub fn field(&self, name: &str) -> FieldHandle {
        self.aggregator.for_field(name)
    }

    /// Token that stops every producer when cancelled
    pub fn producer_cancellation(&self) -> CancellationToken {
        self.producers.clone()
    }

    async fn start_server(&mut self) -> Result<(), ServiceError> {
        info!("Starting dashboard server");

        let server = self.server.clone();
        let port = self.config.service.http_port;

        let server_handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Dashboard server failed: {}", e);
            } else {
                info!("Dashboard server task completed");
            }
        });
        self.background_tasks.push(server_handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Dashboard server started on port {}", port);
        Ok(())
    }

    fn start_components(&mut self) {
        let demo = &self.config.demo;

        if demo.enable_uptime {
            info!("Starting uptime component");
            let component = UptimeComponent::new(self.field("uptime"));
            self.background_tasks
                .push(tokio::spawn(component.run(self.producers.child_token())));
        }

        if demo.enable_clients {
            info!(
                "Starting clients component ({} players, {}s per status)",
                demo.fake_clients, demo.client_cycle_seconds
            );
            let component = ClientsComponent::new(
                self.field("clients"),
                demo.fake_clients,
                self.config.client_cycle(),
            );
            self.background_tasks
                .push(tokio::spawn(component.run(self.producers.child_token())));
        }
    }

    /// Keep the uptime gauge current
    fn start_uptime_metrics(&mut self) {
        let metrics = self.metrics.clone();
        let cancel = self.producers.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            let start_time = tokio::time::Instant::now();
            debug!("Uptime metrics task started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => metrics.update_uptime(start_time.elapsed().as_secs()),
                }
            }

            debug!("Uptime metrics task stopped");
        });
        self.background_tasks.push(task);
    }

    /// Wait for background tasks to wind down, aborting stragglers
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        let timeout = self.config.shutdown_timeout();
        for (i, mut task) in self.background_tasks.drain(..).enumerate() {
            match tokio::time::timeout(timeout, &mut task).await {
                Ok(_) => debug!("Background task {}/{} finished", i + 1, task_count),
                Err(_) => {
                    warn!(
                        "Background task {}/{} did not stop in time, aborting",
                        i + 1,
                        task_count
                    );
                    task.abort();
                }
            }
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
