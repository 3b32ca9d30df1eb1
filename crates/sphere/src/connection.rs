// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single peer session.
//!
//! `Connection` is the handle shared between the dispatcher, channels, and
//! the per-connection writer task. It owns the outbound send queue and the
//! channel-membership set; the raw WebSocket itself is owned by the reader
//! and writer tasks spawned in [`crate::http`], not by `Connection` —
//! giving the writer task sole ownership of the socket's write half.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::collections::ShardedMap;
use crate::config::SphereConfig;
use crate::error::Result;
use crate::packet::Packet;

/// Bound on the per-connection outbound queue. Past this, `Channel::emit`
/// drops the delivery for this recipient only.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// A connected peer.
pub struct Connection {
    id: String,
    cid: AtomicU64,
    /// Names of channels this connection is currently a member of. Mirrors
    /// the other half of the membership graph held in each `Channel`;
    /// the dispatcher alone keeps both sides in sync.
    pub(crate) channels: ShardedMap<()>,
    outbound: mpsc::Sender<Packet>,
    done: CancellationToken,
    remote_addr: Option<String>,
}

impl Connection {
    /// Assemble a connection handle plus the receiving half of its outbound
    /// queue, which the caller hands to [`run_writer_loop`].
    pub fn new(id: impl Into<String>, remote_addr: Option<String>) -> (Arc<Self>, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let conn = Arc::new(Self {
            id: id.into(),
            cid: AtomicU64::new(0),
            channels: ShardedMap::new(),
            outbound: tx,
            done: CancellationToken::new(),
            remote_addr,
        });
        (conn, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Enqueue a packet for delivery. Assigns the next `cid` unless the
    /// packet is already a reply (spec §4.4). Non-blocking: if the queue is
    /// full the delivery is dropped for this connection only.
    pub fn emit_packet(&self, mut packet: Packet) {
        if !packet.reply {
            packet.cid = self.cid.fetch_add(1, Ordering::SeqCst) + 1;
        }
        match self.outbound.try_send(packet) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection = %self.id, "outbound queue full, dropping delivery");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!(connection = %self.id, "outbound queue closed, dropping delivery");
            }
        }
    }

    /// Record membership in `channel_name`. Idempotent.
    pub(crate) fn mark_subscribed(&self, channel_name: &str) {
        self.channels.set(channel_name, ());
    }

    pub(crate) fn mark_unsubscribed(&self, channel_name: &str) {
        self.channels.remove(channel_name);
    }

    pub(crate) fn is_subscribed_to(&self, channel_name: &str) -> bool {
        self.channels.has(channel_name)
    }

    /// Snapshot of channel names this connection currently belongs to, used
    /// during teardown.
    pub(crate) fn channel_names(&self) -> Vec<String> {
        self.channels.iter().into_iter().map(|(k, _)| k).collect()
    }

    /// Signal the writer task to close the socket and return.
    pub fn close(&self) {
        self.done.cancel();
    }

    pub(crate) fn done_signal(&self) -> CancellationToken {
        self.done.clone()
    }
}

/// Per-connection writer task (spec §4.4). The sole owner of the
/// WebSocket's write half: forwards queued packets, sends periodic pings,
/// and performs the close handshake when `done` fires.
pub async fn run_writer_loop(
    mut ws_tx: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<Packet>,
    done: CancellationToken,
    config: Arc<SphereConfig>,
) {
    let mut ticker = tokio::time::interval(config.ping_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            packet = outbound.recv() => {
                let Some(packet) = packet else { break };
                let Ok(json) = packet.to_json() else { continue };
                if tokio::time::timeout(config.write_wait, ws_tx.send(WsMessage::Text(json.into())))
                    .await
                    .is_err()
                {
                    debug!("write deadline exceeded, closing connection");
                    break;
                }
            }
            _ = ticker.tick() => {
                if tokio::time::timeout(config.write_wait, ws_tx.send(WsMessage::Ping(Vec::new().into())))
                    .await
                    .is_err()
                {
                    debug!("ping write failed, closing connection");
                    break;
                }
            }
            _ = done.cancelled() => {
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }
}

/// Per-connection reader loop (spec §4.4). Runs on the accepting task;
/// dispatches each inbound message to `on_message` as an independent task
/// so a slow handler never stalls the read loop.
pub async fn run_reader_loop<F, Fut>(
    mut ws_rx: futures_util::stream::SplitStream<WebSocket>,
    conn: Arc<Connection>,
    config: Arc<SphereConfig>,
    on_message: F,
) where
    F: Fn(Arc<Connection>, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    loop {
        let next = tokio::time::timeout(config.pong_wait, ws_rx.next()).await;
        let msg = match next {
            Ok(Some(Ok(m))) => m,
            Ok(Some(Err(_))) | Ok(None) | Err(_) => break,
        };

        match msg {
            WsMessage::Text(text) => {
                if text.len() > config.max_message_size {
                    debug!(connection = %conn.id, "dropping oversized text frame");
                    continue;
                }
                let bytes = text.as_bytes().to_vec();
                let conn2 = Arc::clone(&conn);
                tokio::spawn(on_message(conn2, bytes));
            }
            WsMessage::Binary(data) => {
                if data.len() > config.max_message_size {
                    continue;
                }
                let conn2 = Arc::clone(&conn);
                tokio::spawn(on_message(conn2, data.to_vec()));
            }
            WsMessage::Pong(_) => {
                trace!(connection = %conn.id, "pong received");
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) => {}
        }
    }
    conn.close();
}
