// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable backplane adapters.
//!
//! A [`Broker`] mediates between local [`Channel`]s and the outside world —
//! nothing, for the in-process adapter; another process's subscribers, for
//! the Redis adapter. The dispatcher talks to brokers only through this
//! trait, so the same routing engine runs single-node or clustered.

pub mod in_process;
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use std::sync::Arc;

use crate::channel::Channel;
use crate::error::{ProtocolKind, Result, SphereError};
use crate::packet::Packet;

pub use in_process::InProcessBroker;
#[cfg(feature = "redis")]
pub use redis::RedisBroker;

/// Backplane adapter contract (spec §3/§4.5).
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Stable identifier for this broker instance, stamped into
    /// `Packet.machine` on publish.
    fn id(&self) -> &str;

    /// Deterministic channel name for `(namespace, room)`.
    fn channel_name(&self, namespace: &str, room: &str) -> String {
        format!("{namespace}:{room}")
    }

    /// Whether this broker currently has an active backplane subscription
    /// for `channel`.
    async fn is_subscribed(&self, channel: &str) -> bool;

    /// Called when the first local connection subscribes to `channel`.
    async fn on_subscribe(&self, channel: &Arc<Channel>) -> Result<()>;

    /// Called when the last local connection unsubscribes from `channel`.
    async fn on_unsubscribe(&self, channel: &Arc<Channel>) -> Result<()>;

    /// Called to publish `packet` on `channel`'s backplane.
    async fn on_publish(&self, channel: &Arc<Channel>, packet: &Packet) -> Result<()>;

    /// Called by the adapter's receive task when a remote publish arrives;
    /// default behavior fans the packet out to local members.
    async fn on_message(&self, channel: &Arc<Channel>, packet: Packet) -> Result<()> {
        channel.emit(packet, None);
        Ok(())
    }
}

/// The "please override" abstract base from the original `broker.go`,
/// selected as the default backplane when a [`crate::sphere::Sphere`] is
/// constructed with zero brokers (spec §9). Every operation that a real
/// adapter must implement returns `NotImplemented`.
pub struct NoopBroker {
    id: String,
}

impl NoopBroker {
    pub fn new() -> Self {
        Self { id: uuid::Uuid::new_v4().to_string() }
    }
}

impl Default for NoopBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for NoopBroker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn is_subscribed(&self, _channel: &str) -> bool {
        false
    }

    async fn on_subscribe(&self, _channel: &Arc<Channel>) -> Result<()> {
        Err(SphereError::Protocol(ProtocolKind::NotImplemented))
    }

    async fn on_unsubscribe(&self, _channel: &Arc<Channel>) -> Result<()> {
        Err(SphereError::Protocol(ProtocolKind::NotImplemented))
    }

    async fn on_publish(&self, _channel: &Arc<Channel>, _packet: &Packet) -> Result<()> {
        Err(SphereError::Protocol(ProtocolKind::NotImplemented))
    }

    async fn on_message(&self, _channel: &Arc<Channel>, _packet: Packet) -> Result<()> {
        Err(SphereError::Protocol(ProtocolKind::NotImplemented))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_broker_rejects_every_operation() {
        let broker = NoopBroker::new();
        let ch = Arc::new(Channel::new("test", "r1"));
        assert!(!broker.is_subscribed("test:r1").await);
        assert!(broker.on_subscribe(&ch).await.is_err());
        assert!(broker.on_unsubscribe(&ch).await.is_err());
        let packet = Packet::new(crate::packet::PacketType::Channel);
        assert!(broker.on_publish(&ch, &packet).await.is_err());
    }
}
