// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrency stress tests for the testable properties in the design doc:
//! fan-out totality and cid monotonicity, exercised over real connections
//! rather than asserted against the dispatcher's internal state.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

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
        "room"
    }
    async fn subscribe(&self, _room: &str, _conn: &Connection) -> sphere::Result<bool> {
        Ok(true)
    }
    async fn disconnect(&self, _room: &str, _conn: &Connection) -> sphere::Result<()> {
        Ok(())
    }
    async fn receive(&self, _event: &str, _data: &str) -> sphere::Result<String> {
        Ok(String::new())
    }
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

/// A single publish on (room, lobby) with N subscribers must deliver exactly
/// one Channel-typed packet to every currently-subscribed connection.
#[tokio::test]
async fn fan_out_reaches_every_subscriber_exactly_once() {
    const SUBSCRIBERS: usize = 8;

    let sphere = Sphere::builder().channel_model(Arc::new(AcceptAll)).build();
    let addr = sphere_specs::spawn_server(sphere).await;

    let mut clients = Vec::with_capacity(SUBSCRIBERS);
    for i in 0..SUBSCRIBERS {
        let (mut ws, _) = connect_async(sphere_specs::ws_url(addr)).await.unwrap();
        ws.send(WsMsg::Text(
            json!({"type": "subscribe", "namespace": "room", "room": "lobby", "cid": 1, "reply": false})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
        let ack = recv_json(&mut ws).await;
        assert_eq!(ack["type"], "subscribed", "subscriber {i} was rejected");
        clients.push(ws);
    }

    clients[0]
        .send(WsMsg::Text(
            json!({
                "type": "channel",
                "namespace": "room",
                "room": "lobby",
                "cid": 2,
                "message": {"event": "ping", "data": "hi"},
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();

    for (i, ws) in clients.iter_mut().enumerate() {
        let delivered = recv_json(ws).await;
        assert_eq!(delivered["type"], "channel", "subscriber {i} did not receive the fan-out");
        assert_eq!(delivered["message"]["data"], "hi");
    }
}

/// The sequence of cids on non-reply outbound packets for a single
/// connection must be strictly increasing.
/// Channel-typed deliveries are pushes, not replies: each one gets the
/// connection's own next cid rather than inheriting the publisher's,
/// so a run of several publishes must read back as a strictly increasing
/// sequence (spec §8 property 3).
#[tokio::test]
async fn cid_is_strictly_monotone_on_channel_pushes() {
    let sphere = Sphere::builder().channel_model(Arc::new(AcceptAll)).build();
    let addr = sphere_specs::spawn_server(sphere).await;
    let (mut ws, _) = connect_async(sphere_specs::ws_url(addr)).await.unwrap();

    ws.send(WsMsg::Text(
        json!({"type": "subscribe", "namespace": "room", "room": "lobby", "cid": 1, "reply": false})
            .to_string()
            .into(),
    ))
    .await
    .unwrap();
    let ack = recv_json(&mut ws).await;
    assert_eq!(ack["type"], "subscribed");

    for i in 0..5u32 {
        ws.send(WsMsg::Text(
            json!({
                "type": "channel",
                "namespace": "room",
                "room": "lobby",
                "cid": 100 + i,
                "message": {"event": "tick", "data": i.to_string()},
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();
    }

    let mut cids = Vec::new();
    for _ in 0..5 {
        let push = recv_json(&mut ws).await;
        assert_eq!(push["type"], "channel");
        assert_eq!(push["reply"], false);
        cids.push(push["cid"].as_u64().unwrap());
    }

    assert!(cids.windows(2).all(|w| w[0] < w[1]), "cids must be strictly increasing, got {cids:?}");
}
