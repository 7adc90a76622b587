//! Shared types for the dashboard service

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A serialized dashboard document as pushed to websocket clients
pub type Snapshot = Arc<str>;

/// Display status of a simulated player on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientStatus {
    /// What the player is currently doing
    pub status: String,
    /// Completed status cycles
    pub rounds: u32,
}

impl ClientStatus {
    pub fn new(status: impl Into<String>, rounds: u32) -> Self {
        Self {
            status: status.into(),
            rounds,
        }
    }
}
