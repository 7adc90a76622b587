//! Test fixtures shared by the integration tests

use async_trait::async_trait;
use matchboard::broadcast::{Broadcaster, Publisher};
use matchboard::metrics::MetricsCollector;
use matchboard::server::{DashboardServer, DashboardServerConfig, DashboardState};
use matchboard::types::Snapshot;
use matchboard::utils::current_timestamp;
use matchboard::{FieldSetter, FieldUpdate, Sink, SnapshotSink};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Snapshot sink that keeps every document it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingSnapshotSink {
    snapshots: Arc<Mutex<Vec<String>>>,
}

impl RecordingSnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<String> {
        self.snapshots
            .lock()
            .map(|snapshots| snapshots.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<String> {
        self.snapshots().last().cloned()
    }
}

#[async_trait]
impl SnapshotSink for RecordingSnapshotSink {
    async fn emit(&self, snapshot: String) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(snapshot);
        }
    }
}

/// Field setter that records updates as strings (`<removed>` for removals)
#[derive(Debug, Clone, Default)]
pub struct RecordingSetter {
    updates: Arc<Mutex<Vec<String>>>,
}

impl RecordingSetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<String> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FieldSetter for RecordingSetter {
    async fn apply(&self, update: FieldUpdate) {
        let entry = match update {
            FieldUpdate::Set(raw) => raw.get().to_string(),
            FieldUpdate::Remove => "<removed>".to_string(),
        };
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(entry);
        }
    }
}

/// Broadcaster sink that keeps every value written to it
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    values: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> Vec<String> {
        self.values
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Sink<Snapshot> for CollectingSink {
    async fn write(&mut self, value: &Snapshot) -> anyhow::Result<()> {
        if let Ok(mut values) = self.values.lock() {
            values.push(value.to_string());
        }
        Ok(())
    }
}

/// Forwards aggregator documents straight to a broadcaster
pub struct PublishingSink {
    publisher: Publisher<Snapshot>,
}

impl PublishingSink {
    pub fn new(publisher: Publisher<Snapshot>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl SnapshotSink for PublishingSink {
    async fn emit(&self, snapshot: String) {
        let _ = self.publisher.publish_latest(Snapshot::from(snapshot)).await;
    }
}

/// A dashboard server bound to an ephemeral local port
pub struct TestDashboard {
    pub addr: SocketAddr,
    pub metrics: Arc<MetricsCollector>,
    pub broadcaster: Broadcaster<Snapshot>,
    pub shutdown: CancellationToken,
    pub server: Arc<DashboardServer>,
}

impl TestDashboard {
    /// Start a server that streams `broadcaster`
    pub async fn start(
        broadcaster: Broadcaster<Snapshot>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let server = Arc::new(DashboardServer::new(
            DashboardServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
            },
            DashboardState {
                service_name: "matchboard-test".to_string(),
                broadcaster: broadcaster.clone(),
                metrics: metrics.clone(),
                started_at: current_timestamp(),
                shutdown: shutdown.clone(),
            },
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let serving = server.clone();
        tokio::spawn(async move {
            let _ = serving.serve(listener).await;
        });

        Self {
            addr,
            metrics,
            broadcaster,
            shutdown,
            server,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/connect", self.addr)
    }

    /// Plain HTTP/1.1 GET, returning the raw response
    pub async fn get(&self, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(self.addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, self.addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }
}

/// Broadcaster with a short sweep interval and its own metrics
pub fn test_broadcaster() -> (
    Publisher<Snapshot>,
    Broadcaster<Snapshot>,
    Arc<MetricsCollector>,
) {
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let (publisher, broadcaster) =
        Broadcaster::with_metrics(Duration::from_millis(50), metrics.clone());
    (publisher, broadcaster, metrics)
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
