//! Websocket subscribers
//!
//! Each `/connect` connection becomes one broadcaster subscription. The
//! subscription ends when the client goes away, a write fails, or the server
//! shuts down.

use crate::broadcast::{Broadcaster, Sink, SubscribeError};
use crate::types::Snapshot;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Writes snapshots as text frames to a websocket (or anything else that
/// accepts [`Message`]s)
pub struct WebSocketSink<S> {
    inner: S,
}

impl<S> WebSocketSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S, E> Sink<Snapshot> for WebSocketSink<S>
where
    S: futures::Sink<Message, Error = E> + Unpin + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    async fn write(&mut self, value: &Snapshot) -> anyhow::Result<()> {
        self.inner.send(Message::Text(value.to_string().into())).await?;
        Ok(())
    }
}

/// Stream snapshots to one websocket client until it disconnects
pub async fn serve_subscriber(
    socket: WebSocket,
    broadcaster: Broadcaster<Snapshot>,
    shutdown: CancellationToken,
) {
    let (sender, mut receiver) = socket.split();
    let cancel = shutdown.child_token();

    // Clients never send anything useful; reading only tells us when they leave.
    let reader = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(message) = receiver.next().await {
                match message {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            cancel.cancel();
        })
    };

    let result = broadcaster
        .subscribe(cancel.clone(), WebSocketSink::new(sender))
        .await;

    cancel.cancel();
    reader.abort();

    match result {
        Ok(()) => debug!("Snapshot stream closed, websocket subscriber finished"),
        Err(SubscribeError::Cancelled) => debug!("Websocket subscriber disconnected"),
        Err(SubscribeError::Sink(e)) => warn!("Websocket write failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sink_writes_text_frames() {
        let (tx, mut rx) = mpsc::channel::<Message>(4);
        let mut sink = WebSocketSink::new(tx);

        let snapshot: Snapshot = Arc::from("{\"a\":1}");
        sink.write(&snapshot).await.unwrap();

        match rx.next().await {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), "{\"a\":1}"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sink_reports_closed_connection() {
        let (tx, rx) = mpsc::channel::<Message>(4);
        drop(rx);

        let mut sink = WebSocketSink::new(tx);
        let snapshot: Snapshot = Arc::from("{}");
        assert!(sink.write(&snapshot).await.is_err());
    }
}
