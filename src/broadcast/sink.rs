//! Write side of a subscription

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Destination for the values a subscription delivers, typically a single
/// network connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sink<T: Send + Sync + 'static>: Send {
    /// Write one value. An error ends the subscription.
    async fn write(&mut self, value: &T) -> anyhow::Result<()>;
}

/// Forwards every written value into a channel
#[async_trait]
impl<T> Sink<T> for mpsc::Sender<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn write(&mut self, value: &T) -> anyhow::Result<()> {
        self.send(value.clone())
            .await
            .map_err(|_| anyhow::anyhow!("sink channel closed"))
    }
}
