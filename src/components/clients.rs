//! Simulated players
//!
//! Every simulated player owns one field of a nested `clients` document and
//! walks through a fixed set of display statuses. Cancelling the component
//! removes the whole `clients` field from the parent document.

use crate::aggregator::{FieldAggregator, FieldHandle};
use crate::types::ClientStatus;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Statuses a simulated player cycles through
pub const CLIENT_STATUSES: [&str; 3] = ["Main Menu", "Searching for a match", "Playing a match"];

/// Runs a group of simulated players under one nested aggregator
pub struct ClientsComponent {
    parent: FieldHandle,
    players: usize,
    cycle: Duration,
}

impl ClientsComponent {
    pub fn new(parent: FieldHandle, players: usize, cycle: Duration) -> Self {
        Self {
            parent,
            players,
            cycle,
        }
    }

    /// Run until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let clients = FieldAggregator::new_nested(cancel.clone(), self.parent);
        info!("Starting {} simulated players", self.players);

        let mut players = JoinSet::new();
        for i in 0..self.players {
            let field = clients.for_field(format!("fakeplayer_{}", i));
            // Spread the players out so they do not all change at once.
            let offset = self.cycle.mul_f64(i as f64 / self.players as f64);
            players.spawn(run_player(field, self.cycle, offset, cancel.clone()));
        }

        while players.join_next().await.is_some() {}
        debug!("Simulated players stopped");
    }
}

async fn run_player(
    field: FieldHandle,
    cycle: Duration,
    offset: Duration,
    cancel: CancellationToken,
) {
    let mut rounds = 0u32;

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(offset) => {}
    }

    loop {
        for status in CLIENT_STATUSES {
            field.set(&ClientStatus::new(status, rounds)).await;

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(cycle) => {}
            }
        }
        rounds += 1;
    }
}
