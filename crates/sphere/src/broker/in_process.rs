// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process backplane: fans messages out within a single node.
//!
//! Ported from the original's `broker_simple.go`. Each locally-subscribed
//! channel owns an mpsc `receive` queue and a `CancellationToken` done
//! signal; `on_subscribe` spawns a forwarding task that drains `receive`
//! into [`Broker::on_message`] until `on_unsubscribe` cancels it.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::collections::ShardedMap;
use crate::error::{Result, SphereError};
use crate::packet::Packet;

use super::Broker;

struct Subscription {
    receive: mpsc::Sender<Packet>,
    done: CancellationToken,
}

/// Single-node broker: publishes and deliveries never leave the process.
pub struct InProcessBroker {
    id: String,
    subscriptions: ShardedMap<Arc<Subscription>>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), subscriptions: ShardedMap::new() }
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InProcessBroker {
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

        let (tx, mut rx) = mpsc::channel::<Packet>(256);
        let done = CancellationToken::new();
        self.subscriptions.set(&name, Arc::new(Subscription { receive: tx, done: done.clone() }));

        let channel = Arc::clone(channel);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    packet = rx.recv() => {
                        let Some(packet) = packet else { break };
                        channel.emit(packet, None);
                    }
                    _ = done.cancelled() => break,
                }
            }
            debug!(channel = %channel.name(), "in-process broker forwarder exiting");
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
        let Some(sub) = self.subscriptions.get(&name) else {
            return Ok(());
        };
        sub.receive.send(packet.clone()).await.map_err(|_| {
            warn!(channel = %name, "in-process broker publish: forwarder gone");
            SphereError::Broker("forwarder gone".to_string())
        })
    }
}
