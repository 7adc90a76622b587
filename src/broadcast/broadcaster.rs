//! Latest-value broadcaster
//!
//! One [`Publisher`] hands values to a single coordinating task which fans
//! them out to any number of subscribers. Every subscriber reads through its
//! own coalescing relay, so a slow reader only ever falls back to the newest
//! value and never holds up the publisher or the other readers.
//!
//! All broadcaster state (latest value, live subscribers) is owned by the
//! coordinating task. Publishing, subscribing and the periodic liveness sweep
//! are serialized through `tokio::select!`, so no locks are involved.

use crate::broadcast::relay::{relay, LatestReceiver};
use crate::broadcast::sink::Sink;
use crate::metrics::MetricsCollector;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Default liveness sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Shorter sweep intervals (including zero) are raised to this
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Why a subscription ended with an error
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("subscriber sink failed: {0}")]
    Sink(#[source] anyhow::Error),

    #[error("subscription cancelled")]
    Cancelled,
}

/// Error returned by [`Publisher::publish_latest`] once the broadcaster task
/// has stopped.
#[derive(Debug, Error)]
#[error("broadcaster is closed")]
pub struct PublishError;

struct Subscriber<T> {
    id: Uuid,
    tx: mpsc::Sender<Option<T>>,
    cancel: CancellationToken,
}

impl<T> Subscriber<T> {
    /// Offer `value` to the subscriber. Returns false if the subscriber is
    /// cancelled or gone and should be dropped.
    async fn deliver(&self, value: Option<T>) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(value) => sent.is_ok(),
        }
    }
}

/// Publishing half of a broadcaster. Dropping it (or calling
/// [`Publisher::close`]) closes every subscription.
pub struct Publisher<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Publisher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Hand a new latest value to the broadcaster. Returns once the value is
    /// accepted; delivery to subscribers happens asynchronously.
    pub async fn publish_latest(&self, value: T) -> Result<(), PublishError> {
        self.tx.send(value).await.map_err(|_| PublishError)
    }

    /// Close the publish stream
    pub fn close(self) {
        drop(self);
    }
}

/// Subscribing half of a broadcaster. Cheap to clone.
pub struct Broadcaster<T> {
    subscribe_tx: mpsc::Sender<Subscriber<T>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe_tx: self.subscribe_tx.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T> Broadcaster<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start a broadcaster whose liveness sweep runs every `sweep_interval`,
    /// but never more often than [`MIN_SWEEP_INTERVAL`]
    pub fn new(sweep_interval: Duration) -> (Publisher<T>, Self) {
        Self::start(sweep_interval, None)
    }

    /// Like [`Broadcaster::new`], recording subscriber activity in `metrics`
    pub fn with_metrics(
        sweep_interval: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> (Publisher<T>, Self) {
        Self::start(sweep_interval, Some(metrics))
    }

    fn start(
        sweep_interval: Duration,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> (Publisher<T>, Self) {
        if sweep_interval < MIN_SWEEP_INTERVAL {
            warn!(
                "Sweep interval of {:?} is too short, using {:?}",
                sweep_interval, MIN_SWEEP_INTERVAL
            );
        }
        let sweep_interval = sweep_interval.max(MIN_SWEEP_INTERVAL);

        let (publish_tx, publish_rx) = mpsc::channel(1);
        let (subscribe_tx, subscribe_rx) = mpsc::channel(1);

        let task = BroadcastTask {
            latest: None,
            subscribers: Vec::new(),
            publish_rx,
            subscribe_rx,
            sweep_interval,
            metrics: metrics.clone(),
        };
        tokio::spawn(task.run());

        (
            Publisher { tx: publish_tx },
            Self {
                subscribe_tx,
                metrics,
            },
        )
    }

    /// Register a subscriber and return its coalescing stream.
    ///
    /// The first item is the latest value at registration time, `None` if
    /// nothing has been published yet. The stream closes when `cancel` fires
    /// (within one sweep interval) or when the publisher closes.
    pub async fn watch(&self, cancel: CancellationToken) -> LatestReceiver<Option<T>> {
        let (tx, rx) = mpsc::channel(1);
        let out = relay(rx);

        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            tx,
            cancel,
        };
        // If the broadcaster has stopped the request (and its sender) is
        // dropped here, which closes `out`.
        let _ = self.subscribe_tx.send(subscriber).await;

        out
    }

    /// Write every latest value into `sink` until `cancel` fires or the
    /// publisher closes.
    ///
    /// Returns the sink's error if a write fails, [`SubscribeError::Cancelled`]
    /// if `cancel` has fired by the time the loop ends, `Ok(())` otherwise.
    pub async fn subscribe<S>(
        &self,
        cancel: CancellationToken,
        mut sink: S,
    ) -> Result<(), SubscribeError>
    where
        S: Sink<T>,
    {
        let subscription = cancel.child_token();
        let mut values = self.watch(subscription.clone()).await;
        // Only counted once the broadcaster has answered with a first value
        let mut joined = false;

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(SubscribeError::Cancelled),
                next = values.recv() => next,
            };

            let Some(value) = next else {
                if cancel.is_cancelled() {
                    break Err(SubscribeError::Cancelled);
                }
                break Ok(());
            };

            if !joined {
                joined = true;
                if let Some(metrics) = &self.metrics {
                    metrics.record_subscriber_added();
                }
            }

            // `None` means nothing has been published yet
            if let Some(value) = value {
                if let Err(e) = sink.write(&value).await {
                    debug!("Subscriber sink failed: {}", e);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_subscriber_write_failure();
                    }
                    break Err(SubscribeError::Sink(e));
                }
            }
        };

        // Let the broadcaster drop this subscriber, and release the relay so
        // it never waits on a reader that is gone.
        subscription.cancel();
        drop(values);

        if joined {
            if let Some(metrics) = &self.metrics {
                metrics.record_subscriber_removed();
            }
        }

        result
    }
}

struct BroadcastTask<T> {
    latest: Option<T>,
    subscribers: Vec<Subscriber<T>>,
    publish_rx: mpsc::Receiver<T>,
    subscribe_rx: mpsc::Receiver<Subscriber<T>>,
    sweep_interval: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<T> BroadcastTask<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            "Broadcaster started (sweep every {}ms)",
            self.sweep_interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = sweep.tick() => self.sweep(),
                published = self.publish_rx.recv() => match published {
                    Some(value) => {
                        self.latest = Some(value);
                        self.deliver_latest().await;
                    }
                    None => break,
                },
                Some(subscriber) = self.subscribe_rx.recv() => self.add(subscriber).await,
            }
        }

        info!(
            "Publish stream closed, closing {} subscribers",
            self.subscribers.len()
        );
        // Dropping the senders closes every subscriber's relay.
        self.subscribers.clear();
    }

    fn sweep(&mut self) {
        let before = self.subscribers.len();
        self.subscribers
            .retain(|s| !s.cancel.is_cancelled() && !s.tx.is_closed());

        let removed = before - self.subscribers.len();
        if removed > 0 {
            debug!("Liveness sweep removed {} subscribers", removed);
        }
        trace!("{} live subscribers", self.subscribers.len());
    }

    async fn deliver_latest(&mut self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot_published();
        }

        let mut live = Vec::with_capacity(self.subscribers.len());
        for subscriber in self.subscribers.drain(..) {
            if subscriber.deliver(self.latest.clone()).await {
                live.push(subscriber);
            } else {
                debug!("Removing subscriber {}", subscriber.id);
            }
        }
        self.subscribers = live;
    }

    async fn add(&mut self, subscriber: Subscriber<T>) {
        if subscriber.deliver(self.latest.clone()).await {
            debug!("Added subscriber {}", subscriber.id);
            self.subscribers.push(subscriber);
        } else {
            debug!("Subscriber {} went away before joining", subscriber.id);
        }
    }
}
