//! Uptime producer

use crate::aggregator::FieldHandle;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Publishes the number of seconds since it started
pub struct UptimeComponent {
    field: FieldHandle,
    period: Duration,
}

impl UptimeComponent {
    pub fn new(field: FieldHandle) -> Self {
        Self::with_period(field, Duration::from_secs(1))
    }

    pub fn with_period(field: FieldHandle, period: Duration) -> Self {
        Self { field, period }
    }

    /// Run until `cancel` fires, then remove the field
    pub async fn run(self, cancel: CancellationToken) {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!("Uptime component writing field '{}'", self.field.field());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.field.set(&started.elapsed().as_secs()).await;
                }
            }
        }

        self.field.remove().await;
        debug!("Uptime component stopped");
    }
}
