// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Axum WebSocket upgrade glue.
//!
//! The wire codec, HTTP surface, and upgrade handshake are out of scope as
//! library internals (spec §1), but a library with no runnable surface
//! cannot be demoed or integration-tested, so this module supplies a thin
//! `axum` adapter wiring [`Connection`], the reader/writer loops, and a
//! [`Sphere`] dispatcher together — the `Handler(w, r)` entrypoint from
//! spec §6, rendered as an Axum extractor-based handler instead of the
//! `net/http` signature it is grounded on.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::connection::{run_reader_loop, run_writer_loop, Connection};
use crate::packet::Packet;
use crate::sphere::Sphere;

/// An Axum handler function: `.route("/ws", axum::routing::get(upgrade)).with_state(sphere)`.
pub async fn upgrade(
    State(sphere): State<Arc<Sphere>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(sphere, socket, Some(addr.to_string())))
}

async fn handle_socket(sphere: Arc<Sphere>, socket: WebSocket, remote_addr: Option<String>) {
    let id = uuid::Uuid::new_v4().to_string();
    let (conn, outbound_rx) = Connection::new(id.clone(), remote_addr);
    sphere.register_connection(&conn);
    info!(connection = %id, "connection accepted");

    let (ws_tx, ws_rx) = socket.split();
    let config = Arc::new(sphere.config().clone());
    let done = conn.done_signal();

    let writer = tokio::spawn(run_writer_loop(ws_tx, outbound_rx, done, Arc::clone(&config)));

    let dispatch_sphere = Arc::clone(&sphere);
    run_reader_loop(ws_rx, Arc::clone(&conn), config, move |conn, bytes| {
        let sphere = Arc::clone(&dispatch_sphere);
        async move {
            match Packet::parse(&bytes) {
                Ok(packet) => sphere.process(packet, conn).await,
                Err(e) => debug!(connection = %conn.id(), err = %e, "dropping malformed inbound frame"),
            }
        }
    })
    .await;

    sphere.teardown_connection(&conn).await;
    let _ = writer.await;
    info!(connection = %id, "connection closed");
}
