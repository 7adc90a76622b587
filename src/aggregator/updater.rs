//! Concurrent named-field JSON aggregator
//!
//! A [`FieldAggregator`] behaves like a JSON object whose fields are each
//! owned by a different producer. Producers write through a [`FieldHandle`];
//! one task applies the updates and, after every batch, hands the serialized
//! object to its output. Aggregators nest: a child's output is simply a
//! field handle of its parent.

use crate::aggregator::serialize::force_serialize;
use crate::aggregator::setter::{FieldSetter, FieldUpdate, RootSetter, SnapshotSink};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Capacity of the update channel. Producers beyond this wait for the
/// aggregator task; bursts are coalesced into one serialization either way.
const UPDATE_BUFFER: usize = 64;

#[derive(Debug)]
struct Update {
    field: Arc<str>,
    value: Option<Box<RawValue>>,
}

/// Aggregates independently updated fields into one JSON document
pub struct FieldAggregator {
    updates: mpsc::Sender<Update>,
    cancel: CancellationToken,
}

impl FieldAggregator {
    /// Create a root aggregator.
    ///
    /// `sink` receives the whole document after each batch of updates
    /// (starting with `{}`), and `null` once `cancel` fires.
    pub fn new<S: SnapshotSink>(cancel: CancellationToken, sink: S) -> Self {
        Self::new_nested(cancel, RootSetter::new(sink))
    }

    /// Create an aggregator whose document is written through `parent`,
    /// usually a field of another aggregator. On cancellation the field is
    /// removed from the parent.
    pub fn new_nested<P: FieldSetter>(cancel: CancellationToken, parent: P) -> Self {
        let (aggregator, task) = Self::create(cancel, parent);
        tokio::spawn(task.run());
        aggregator
    }

    fn create<P: FieldSetter>(cancel: CancellationToken, output: P) -> (Self, AggregatorTask<P>) {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);

        let task = AggregatorTask {
            fields: BTreeMap::new(),
            updates: updates_rx,
            cancel: cancel.clone(),
            output,
        };

        (
            Self {
                updates: updates_tx,
                cancel,
            },
            task,
        )
    }

    /// Handle for setting the value of `field`
    pub fn for_field(&self, field: impl Into<String>) -> FieldHandle {
        FieldHandle {
            field: Arc::from(field.into()),
            updates: self.updates.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Whether the aggregator has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Writes one field of a [`FieldAggregator`]. Cheap to clone and safe to use
/// from any number of tasks.
#[derive(Clone)]
pub struct FieldHandle {
    field: Arc<str>,
    updates: mpsc::Sender<Update>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for FieldHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldHandle")
            .field("field", &self.field)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl FieldHandle {
    /// Name of the field this handle writes
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Set the field to the JSON encoding of `value`. A value that encodes
    /// to `null` keeps the field present with a `null` value.
    pub async fn set<V>(&self, value: &V)
    where
        V: Serialize + ?Sized,
    {
        self.send(Some(force_serialize(value))).await;
    }

    /// Remove the field from the document
    pub async fn remove(&self) {
        self.send(None).await;
    }

    /// Queue an update, giving up silently once the aggregator is cancelled
    async fn send(&self, value: Option<Box<RawValue>>) {
        if self.cancel.is_cancelled() {
            trace!("Dropping update for '{}': aggregator cancelled", self.field);
            return;
        }

        let update = Update {
            field: self.field.clone(),
            value,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                trace!("Dropping update for '{}': aggregator cancelled", self.field);
            }
            sent = self.updates.send(update) => {
                if sent.is_err() {
                    trace!("Dropping update for '{}': aggregator stopped", self.field);
                }
            }
        }
    }
}

#[async_trait]
impl FieldSetter for FieldHandle {
    async fn apply(&self, update: FieldUpdate) {
        match update {
            FieldUpdate::Set(raw) => self.send(Some(raw)).await,
            FieldUpdate::Remove => self.send(None).await,
        }
    }
}

struct AggregatorTask<P> {
    fields: BTreeMap<String, Box<RawValue>>,
    updates: mpsc::Receiver<Update>,
    cancel: CancellationToken,
    output: P,
}

impl<P: FieldSetter> AggregatorTask<P> {
    async fn run(mut self) {
        loop {
            self.emit().await;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                update = self.updates.recv() => match update {
                    Some(update) => {
                        self.apply(update);
                        let coalesced = self.apply_waiting();
                        if coalesced > 0 {
                            trace!("Coalesced {} queued updates into one batch", coalesced);
                        }
                    }
                    None => break,
                },
            }
        }

        // Updates accepted before cancellation still make it out.
        if self.apply_waiting() > 0 {
            self.emit().await;
        }

        debug!("Aggregator stopping with {} fields", self.fields.len());
        self.output.apply(FieldUpdate::Remove).await;
    }

    fn apply(&mut self, update: Update) {
        match update.value {
            Some(value) => {
                self.fields.insert(update.field.to_string(), value);
            }
            None => {
                self.fields.remove(&*update.field);
            }
        }
    }

    /// Apply every update already queued without waiting for more
    fn apply_waiting(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.updates.try_recv() {
            self.apply(update);
            applied += 1;
        }
        applied
    }

    async fn emit(&self) {
        let snapshot = force_serialize(&self.fields);
        self.output.apply(FieldUpdate::Set(snapshot)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    async fn next(rx: &mut mpsc::Receiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for a snapshot")
            .expect("sink closed")
    }

    #[tokio::test]
    async fn test_nested_field_semantics() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);

        let base = FieldAggregator::new(cancel.clone(), tx);
        assert_eq!(next(&mut rx).await, "{}");

        let child = FieldAggregator::new_nested(cancel.clone(), base.for_field("Foo"));
        assert_eq!(next(&mut rx).await, "{\"Foo\":{}}");

        child.for_field("Bar").set(&None::<i32>).await;
        assert_eq!(next(&mut rx).await, "{\"Foo\":{\"Bar\":null}}");

        child.for_field("Bar").remove().await;
        assert_eq!(next(&mut rx).await, "{\"Foo\":{}}");

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_root_emits_null_on_cancel() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);

        let _aggregator = FieldAggregator::new(cancel.clone(), tx);
        assert_eq!(next(&mut rx).await, "{}");

        cancel.cancel();
        assert_eq!(next(&mut rx).await, "null");
    }

    #[tokio::test]
    async fn test_cancelled_child_removes_itself_from_parent() {
        let root_cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);

        let base = FieldAggregator::new(root_cancel.clone(), tx);
        assert_eq!(next(&mut rx).await, "{}");

        let session = root_cancel.child_token();
        let child = FieldAggregator::new_nested(session.clone(), base.for_field("session"));
        assert_eq!(next(&mut rx).await, "{\"session\":{}}");

        child.for_field("players").set(&2).await;
        assert_eq!(next(&mut rx).await, "{\"session\":{\"players\":2}}");

        session.cancel();
        assert_eq!(next(&mut rx).await, "{}");

        // Writes after cancellation are ignored.
        child.for_field("players").set(&3).await;
        assert!(child.is_cancelled());

        root_cancel.cancel();
        assert_eq!(next(&mut rx).await, "null");
    }

    #[tokio::test]
    async fn test_unencodable_value_becomes_error_field() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);

        let base = FieldAggregator::new(cancel.clone(), tx);
        assert_eq!(next(&mut rx).await, "{}");

        let mut bad = HashMap::new();
        bad.insert((1, 1), 1);
        base.for_field("bad").set(&bad).await;

        let snapshot: serde_json::Value = serde_json::from_str(&next(&mut rx).await).unwrap();
        assert!(snapshot["bad"]["Error"].is_string());

        cancel.cancel();
    }

    /// Records the latest document written through it
    struct RecordingSetter {
        latest: Arc<Mutex<Option<String>>>,
        stopped: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl FieldSetter for RecordingSetter {
        async fn apply(&self, update: FieldUpdate) {
            match update {
                FieldUpdate::Set(raw) => {
                    *self.latest.lock().unwrap() = Some(raw.get().to_string());
                }
                FieldUpdate::Remove => {
                    let _ = self.stopped.send(());
                }
            }
        }
    }

    // Many concurrent producers force the batching path to run.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_burst_of_producers_is_fully_applied() {
        let cancel = CancellationToken::new();
        let latest = Arc::new(Mutex::new(None));
        let (stopped_tx, mut stopped_rx) = mpsc::unbounded_channel();

        let aggregator = FieldAggregator::new_nested(
            cancel.clone(),
            RecordingSetter {
                latest: latest.clone(),
                stopped: stopped_tx,
            },
        );

        let producers: Vec<_> = (0..100)
            .map(|i| {
                let handle = aggregator.for_field(i.to_string());
                tokio::spawn(async move { handle.set("Hi").await })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), stopped_rx.recv())
            .await
            .unwrap()
            .unwrap();

        let expected: BTreeMap<String, &str> = (0..100).map(|i| (i.to_string(), "Hi")).collect();
        let expected = serde_json::to_string(&expected).unwrap();

        assert_eq!(latest.lock().unwrap().as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_set_after_cancel_is_noop() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let base = FieldAggregator::new(cancel.clone(), tx);
        assert_eq!(rx.recv().await.as_deref(), Some("{}"));

        cancel.cancel();
        base.for_field("late").set("value").await;

        assert_eq!(rx.recv().await.as_deref(), Some("null"));
        assert_eq!(rx.recv().await, None);
    }
}
