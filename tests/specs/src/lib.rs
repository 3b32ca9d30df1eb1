// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness: spins up a real `sphere`-backed `axum` server on an
//! ephemeral port so integration tests can drive it with real WebSocket
//! clients instead of calling the dispatcher directly.
#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sphere::Sphere;

/// Bind `sphere` behind a minimal `/ws` route on an OS-assigned port and run
/// it on a background task. Returns the address clients should connect to.
pub async fn spawn_server(sphere: Arc<Sphere>) -> SocketAddr {
    let app = Router::new().route("/ws", axum::routing::get(sphere::http::upgrade)).with_state(sphere);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("test server crashed");
    });

    addr
}

pub fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/ws")
}
