//! Dashboard Broadcast Channel
//!
//! One-way, lossy JSON frame stream for dashboard consumers. Frames are
//! fanned out over a `tokio::sync::broadcast` channel; WebSocket clients
//! attach through a small listener task. Consumers are untrusted
//! observers — no backpressure, no durability, and a slow client simply
//! drops frames when its buffer lags.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

const HEARTBEAT_SECS: u64 = 30;

/// Serialize one frame: `{type, data, ts}`.
pub fn frame(kind: &str, data: impl Serialize) -> String {
    let data = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
    json!({
        "type": kind,
        "data": data,
        "ts": Utc::now().to_rfc3339(),
    })
    .to_string()
}

/// Publishing side of the frame stream. Cheap to clone; publishing with
/// no connected consumers is a no-op.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<String>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, kind: &str, data: impl Serialize) {
        // Send only fails with zero receivers — that is fine here.
        let _ = self.tx.send(frame(kind, data));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Accept WebSocket dashboard clients and relay the frame stream to
/// each. Runs until the process shuts down.
pub async fn run_ws_server(listen_addr: String, bus: BroadcastBus) -> Result<()> {
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind dashboard feed on {listen_addr}"))?;
    info!("dashboard feed listening on ws://{}", listen_addr);

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        let rx = bus.subscribe();
        tokio::spawn(async move {
            debug!("dashboard client connected: {}", peer);
            if let Err(e) = handle_client(stream, rx).await {
                debug!("dashboard client {} closed: {}", peer, e);
            }
        });
    }
}

async fn handle_client(stream: TcpStream, mut rx: broadcast::Receiver<String>) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    sink.send(Message::Text(frame(
        "welcome",
        json!({ "service": "dexcycle-bot", "version": env!("CARGO_PKG_VERSION") }),
    )))
    .await?;

    let mut heartbeat = tokio::time::interval(tokio::time::Duration::from_secs(HEARTBEAT_SECS));
    heartbeat.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(text) => sink.send(Message::Text(text)).await?,
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    debug!("slow dashboard client dropped {} frames", dropped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = heartbeat.tick() => {
                sink.send(Message::Text(frame("heartbeat", json!({})))).await?;
            }
            incoming = source.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // observers only; inbound frames ignored
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }

    Ok(())
}
