// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end wire scenarios driven over real WebSocket connections.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sphere::{ChannelModel, Connection, Sphere};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMsg;

struct AcceptAll;

#[async_trait]
impl ChannelModel for AcceptAll {
    fn namespace(&self) -> &str {
        "test"
    }

    async fn subscribe(&self, _room: &str, _conn: &Connection) -> sphere::Result<bool> {
        Ok(true)
    }

    async fn disconnect(&self, _room: &str, _conn: &Connection) -> sphere::Result<()> {
        Ok(())
    }

    async fn receive(&self, _event: &str, _data: &str) -> sphere::Result<String> {
        Ok("you_got_me".to_string())
    }
}

async fn send_json(
    ws: &mut (impl futures_util::Sink<WsMsg, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    v: Value,
) {
    ws.send(WsMsg::Text(v.to_string().into())).await.unwrap();
}

async fn recv_json(
    ws: &mut (impl futures_util::Stream<Item = Result<WsMsg, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Value {
    loop {
        match ws.next().await.expect("stream closed before a reply arrived").unwrap() {
            WsMsg::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn ping_pong() {
    let sphere = Sphere::builder().build();
    let addr = sphere_specs::spawn_server(sphere).await;
    let (mut ws, _) = connect_async(sphere_specs::ws_url(addr)).await.unwrap();

    send_json(&mut ws, json!({"type": "ping", "cid": 0, "reply": false})).await;
    let reply = recv_json(&mut ws).await;

    assert_eq!(reply["type"], "pong");
    assert_eq!(reply["cid"], 0);
    assert_eq!(reply["reply"], true);
}

#[tokio::test]
async fn subscribe_accepted() {
    let sphere = Sphere::builder().channel_model(Arc::new(AcceptAll)).build();
    let addr = sphere_specs::spawn_server(sphere).await;
    let (mut ws, _) = connect_async(sphere_specs::ws_url(addr)).await.unwrap();

    send_json(&mut ws, json!({"type": "subscribe", "namespace": "test", "room": "r1", "cid": 1, "reply": false}))
        .await;
    let reply = recv_json(&mut ws).await;

    assert_eq!(reply["type"], "subscribed");
    assert_eq!(reply["namespace"], "test");
    assert_eq!(reply["room"], "r1");
    assert_eq!(reply["cid"], 1);
    assert_eq!(reply["reply"], true);
    assert!(reply.get("error").is_none());
}

#[tokio::test]
async fn subscribe_unknown_namespace() {
    let sphere = Sphere::builder().build();
    let addr = sphere_specs::spawn_server(sphere).await;
    let (mut ws, _) = connect_async(sphere_specs::ws_url(addr)).await.unwrap();

    send_json(
        &mut ws,
        json!({"type": "subscribe", "namespace": "absent", "room": "r1", "cid": 2, "reply": false}),
    )
    .await;
    let reply = recv_json(&mut ws).await;

    assert_eq!(reply["type"], "subscribed");
    assert_eq!(reply["error"], "not supported");
}

#[tokio::test]
async fn bad_scheme() {
    let sphere = Sphere::builder().build();
    let addr = sphere_specs::spawn_server(sphere).await;
    let (mut ws, _) = connect_async(sphere_specs::ws_url(addr)).await.unwrap();

    send_json(&mut ws, json!({"type": "subscribe", "cid": 3})).await;
    let reply = recv_json(&mut ws).await;

    assert_eq!(reply["type"], "subscribe");
    assert_eq!(reply["error"], "bad scheme");
}

#[tokio::test]
async fn channel_publish_round_trip() {
    let sphere = Sphere::builder().channel_model(Arc::new(AcceptAll)).build();
    let addr = sphere_specs::spawn_server(sphere).await;
    let (mut ws, _) = connect_async(sphere_specs::ws_url(addr)).await.unwrap();

    send_json(&mut ws, json!({"type": "subscribe", "namespace": "test", "room": "r1", "cid": 1, "reply": false}))
        .await;
    recv_json(&mut ws).await; // subscribed ack

    send_json(
        &mut ws,
        json!({
            "type": "channel",
            "namespace": "test",
            "room": "r1",
            "cid": 4,
            "message": {"event": "HelloEvent", "data": "HelloWorld"},
        }),
    )
    .await;

    let delivered = recv_json(&mut ws).await;
    assert_eq!(delivered["type"], "channel");
    assert_eq!(delivered["message"]["data"], "you_got_me");
}

#[tokio::test]
async fn unsubscribe_cleanup() {
    let sphere = Sphere::builder().channel_model(Arc::new(AcceptAll)).build();
    let sphere_handle = Arc::clone(&sphere);
    let addr = sphere_specs::spawn_server(sphere).await;
    let (mut ws, _) = connect_async(sphere_specs::ws_url(addr)).await.unwrap();

    send_json(&mut ws, json!({"type": "subscribe", "namespace": "test", "room": "r1", "cid": 1, "reply": false}))
        .await;
    recv_json(&mut ws).await;
    assert!(sphere_handle.is_broker_subscribed("test", "r1").await);

    send_json(&mut ws, json!({"type": "unsubscribe", "namespace": "test", "room": "r1", "cid": 2, "reply": false}))
        .await;
    recv_json(&mut ws).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if !sphere_handle.is_broker_subscribed("test", "r1").await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("broker subscription was not torn down within the deadline");
}
