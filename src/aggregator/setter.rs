//! Output side of an aggregator

use async_trait::async_trait;
use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tracing::trace;

/// Change to one field of an aggregated document
#[derive(Debug)]
pub enum FieldUpdate {
    /// Set the field to this encoded JSON value (which may be `null`)
    Set(Box<RawValue>),
    /// Delete the field
    Remove,
}

/// Something that accepts updates for a single field. A nested aggregator
/// writes its whole document through one of these.
#[async_trait]
pub trait FieldSetter: Send + Sync + 'static {
    async fn apply(&self, update: FieldUpdate);
}

/// Receives the serialized document of a root aggregator
#[async_trait]
pub trait SnapshotSink: Send + Sync + 'static {
    async fn emit(&self, snapshot: String);
}

#[async_trait]
impl SnapshotSink for mpsc::Sender<String> {
    async fn emit(&self, snapshot: String) {
        if self.send(snapshot).await.is_err() {
            trace!("Snapshot receiver dropped");
        }
    }
}

#[async_trait]
impl SnapshotSink for mpsc::UnboundedSender<String> {
    async fn emit(&self, snapshot: String) {
        if self.send(snapshot).is_err() {
            trace!("Snapshot receiver dropped");
        }
    }
}

/// Adapts a [`SnapshotSink`] to the field setter interface: a removal is
/// reported as the JSON literal `null`.
pub(crate) struct RootSetter<S> {
    sink: S,
}

impl<S> RootSetter<S> {
    pub(crate) fn new(sink: S) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl<S: SnapshotSink> FieldSetter for RootSetter<S> {
    async fn apply(&self, update: FieldUpdate) {
        let snapshot = match update {
            FieldUpdate::Set(raw) => String::from(raw.get()),
            FieldUpdate::Remove => "null".to_string(),
        };
        self.sink.emit(snapshot).await;
    }
}
