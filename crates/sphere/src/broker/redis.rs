// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis pub/sub backplane.
//!
//! Ported from the original's `broker_redis.go`: one client dedicated to
//! publishing, one to subscribing, matching the `gopkg.in/redis.v3`
//! `pubclient`/`subclient` split (Redis pub/sub connections are exclusive —
//! a connection that issues `SUBSCRIBE` cannot also run other commands).

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::collections::ShardedMap;
use crate::config::RedisBrokerConfig;
use crate::error::{Result, SphereError};
use crate::packet::Packet;

use super::Broker;

struct Subscription {
    done: CancellationToken,
}

/// Clustered broker backed by Redis `PUBLISH`/`SUBSCRIBE`.
pub struct RedisBroker {
    id: String,
    publish_client: redis::Client,
    subscribe_client: redis::Client,
    subscriptions: ShardedMap<Arc<Subscription>>,
}

impl RedisBroker {
    /// Open both the publish and subscribe clients against the same URL.
    /// Opening a `redis::Client` never touches the network — the actual TCP
    /// connect happens lazily, per operation, so `connect` itself cannot
    /// fail against an unreachable server.
    pub async fn connect(config: RedisBrokerConfig) -> Result<Self> {
        let open = |url: &str| {
            redis::Client::open(url).map_err(|e| SphereError::Broker(format!("redis connect: {e}")))
        };
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            publish_client: open(&config.url)?,
            subscribe_client: open(&config.url)?,
            subscriptions: ShardedMap::new(),
        })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.has(channel)
    }

    async fn on_subscribe(&self, channel: &Arc<Channel>) -> Result<()> {
        let name = channel.name();
        if self.subscriptions.has(&name) {
            return Ok(());
        }

        let mut pubsub = self
            .subscribe_client
            .get_async_pubsub()
            .await
            .map_err(|e| SphereError::Broker(format!("redis subscribe: {e}")))?;
        pubsub
            .subscribe(&name)
            .await
            .map_err(|e| SphereError::Broker(format!("redis subscribe: {e}")))?;

        let done = CancellationToken::new();
        self.subscriptions.set(&name, Arc::new(Subscription { done: done.clone() }));

        let channel = Arc::clone(channel);
        let broker_id = self.id.clone();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    msg = stream.next() => {
                        let Some(msg) = msg else { break };
                        let payload = msg.get_payload_bytes().to_vec();
                        match Packet::parse(&payload) {
                            Ok(packet) => channel.emit(packet, None),
                            Err(e) => debug!(channel = %channel.name(), err = %e, "dropping malformed redis payload"),
                        }
                    }
                    _ = done.cancelled() => break,
                }
            }
            debug!(channel = %channel.name(), broker = %broker_id, "redis subscriber exiting");
        });

        Ok(())
    }

    async fn on_unsubscribe(&self, channel: &Arc<Channel>) -> Result<()> {
        let name = channel.name();
        if let Some(sub) = self.subscriptions.remove(&name) {
            sub.done.cancel();
        }
        Ok(())
    }

    async fn on_publish(&self, channel: &Arc<Channel>, packet: &Packet) -> Result<()> {
        let name = channel.name();
        let json = packet.to_json()?;
        let mut conn = self
            .publish_client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SphereError::Broker(format!("redis publish connection: {e}")))?;
        let _: i64 = conn.publish(&name, json).await.map_err(|e| {
            warn!(channel = %name, err = %e, "redis publish failed");
            SphereError::Broker(format!("redis publish: {e}"))
        })?;
        Ok(())
    }
}
