//! Single-slot coalescing relay
//!
//! [`relay`] turns an mpsc receiver into a [`LatestReceiver`] that only ever
//! holds the newest undelivered value. A consumer that falls behind skips the
//! intermediate values instead of building up a queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Notify};
use tracing::trace;

/// Error returned by [`LatestReceiver::try_recv`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryRecvError {
    #[error("no value pending")]
    Empty,

    #[error("relay closed")]
    Closed,
}

struct SlotState<T> {
    pending: Option<T>,
    closed: bool,
    receiver_dropped: bool,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    /// Wakes the consumer when a value lands or the relay closes
    ready: Notify,
    /// Wakes the relay task when the consumer goes away
    receiver_gone: Notify,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                closed: false,
                receiver_dropped: false,
            }),
            ready: Notify::new(),
            receiver_gone: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the pending value. Returns false once the receiver is gone.
    fn put(&self, value: T) -> bool {
        let mut state = self.lock();
        if state.receiver_dropped {
            return false;
        }
        if state.pending.replace(value).is_some() {
            trace!("Relay replaced an undelivered value");
        }
        drop(state);

        self.ready.notify_one();
        true
    }

    /// Close the output. A value still pending is dropped, never delivered.
    fn close(&self) {
        let mut state = self.lock();
        state.pending = None;
        state.closed = true;
        drop(state);

        self.ready.notify_one();
    }

    fn receiver_dropped(&self) -> bool {
        self.lock().receiver_dropped
    }
}

/// Receiving half of a relay. Yields the most recent value the relay has seen
/// and not yet handed out.
pub struct LatestReceiver<T> {
    slot: Arc<Slot<T>>,
}

impl<T> LatestReceiver<T> {
    /// Wait for the next value. Returns `None` once the input has closed.
    ///
    /// Cancel safe: dropping the future leaves any pending value in place.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => self.slot.ready.notified().await,
            }
        }
    }

    /// Take the pending value without waiting
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        let mut state = self.slot.lock();
        if let Some(value) = state.pending.take() {
            return Ok(value);
        }
        if state.closed {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Whether the relay has closed its output
    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    /// A receiver that is already closed
    pub fn closed() -> Self {
        let slot = Slot::new();
        slot.close();
        Self {
            slot: Arc::new(slot),
        }
    }
}

impl<T> Drop for LatestReceiver<T> {
    fn drop(&mut self) {
        let mut state = self.slot.lock();
        state.receiver_dropped = true;
        state.pending = None;
        drop(state);

        self.slot.receiver_gone.notify_one();
    }
}

/// Relay `input` through a single coalescing slot.
///
/// Spawns a task that runs until `input` closes (the output is then closed
/// too) or until the returned receiver is dropped (the input is then dropped,
/// so senders observe a closed channel).
pub fn relay<T>(mut input: mpsc::Receiver<T>) -> LatestReceiver<T>
where
    T: Send + 'static,
{
    let slot = Arc::new(Slot::new());
    let task_slot = slot.clone();

    tokio::spawn(async move {
        loop {
            if task_slot.receiver_dropped() {
                break;
            }

            tokio::select! {
                value = input.recv() => match value {
                    Some(value) => {
                        if !task_slot.put(value) {
                            break;
                        }
                    }
                    None => {
                        task_slot.close();
                        break;
                    }
                },
                _ = task_slot.receiver_gone.notified() => break,
            }
        }

        trace!("Relay task finished");
    });

    LatestReceiver { slot }
}
