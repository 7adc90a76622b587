//! Latest-value fan-out
//!
//! A [`Broadcaster`] pushes the most recent value to many subscribers, each
//! reading through a coalescing [`relay`] so that slow readers skip stale
//! values rather than queueing them.

pub mod broadcaster;
pub mod relay;
pub mod sink;

pub use broadcaster::{
    Broadcaster, PublishError, Publisher, SubscribeError, DEFAULT_SWEEP_INTERVAL,
    MIN_SWEEP_INTERVAL,
};
pub use relay::{relay, LatestReceiver, TryRecvError};
pub use sink::Sink;
