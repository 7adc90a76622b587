//! Matchboard - live matchmaking demo dashboard
//!
//! This crate aggregates independently updated demo state into one JSON
//! document and pushes the latest version of it to any number of websocket
//! clients, dropping stale versions for clients that fall behind.

pub mod aggregator;
pub mod broadcast;
pub mod components;
pub mod config;
pub mod error;
pub mod metrics;
pub mod server;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{BoardError, Result};
pub use types::*;

// Re-export key components
pub use aggregator::{FieldAggregator, FieldHandle, FieldSetter, FieldUpdate, SnapshotSink};
pub use broadcast::{relay, Broadcaster, LatestReceiver, Publisher, Sink, SubscribeError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
