//! Board Watcher CLI Tool
//!
//! Connects to a running matchboard instance and prints every snapshot it
//! streams over the `/connect` websocket.
//!
//! Usage:
//!   cargo run --bin board-watcher -- --help
//!   cargo run --bin board-watcher -- --url ws://localhost:51507/connect
//!   cargo run --bin board-watcher -- --count 5 --compact

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use matchboard::utils::pretty_json;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "board-watcher")]
#[command(about = "Print the snapshots a matchboard dashboard streams to its subscribers")]
struct Cli {
    /// Websocket endpoint of the dashboard
    #[arg(long, default_value = "ws://localhost:51507/connect")]
    url: String,

    /// Stop after this many snapshots
    #[arg(short, long)]
    count: Option<usize>,

    /// Give up if no snapshot arrives for this many seconds
    #[arg(short, long, default_value = "30")]
    idle_timeout: u64,

    /// Print snapshots exactly as received instead of re-indenting them
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    info!("Connecting to {}", cli.url);
    let (stream, _) = connect_async(cli.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", cli.url))?;
    info!("✅ Connected, waiting for snapshots");

    let (mut write, mut read) = stream.split();
    let idle = Duration::from_secs(cli.idle_timeout);
    let mut received = 0usize;

    loop {
        if cli.count.is_some_and(|count| received >= count) {
            break;
        }

        let message = match tokio::time::timeout(idle, read.next()).await {
            Ok(Some(message)) => message.context("Websocket read failed")?,
            Ok(None) => {
                info!("Dashboard closed the stream");
                break;
            }
            Err(_) => {
                warn!("No snapshot for {}s, giving up", cli.idle_timeout);
                break;
            }
        };

        match message {
            Message::Text(text) => {
                received += 1;
                let text = text.as_str();
                let shown = if cli.compact {
                    text.to_string()
                } else {
                    pretty_json(text).unwrap_or_else(|| text.to_string())
                };
                println!("--- snapshot #{} ---", received);
                println!("{}", shown);
            }
            Message::Close(frame) => {
                info!("Dashboard closed the connection: {:?}", frame);
                break;
            }
            _ => {}
        }
    }

    // Best effort; the server may already be gone.
    let _ = write.send(Message::Close(None)).await;

    info!("📊 Received {} snapshots", received);
    Ok(())
}
