// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespace model registry.
//!
//! A `ChannelModel` governs a family of `(namespace, room)` channels: it
//! decides admission on subscribe, is notified on disconnect, and handles
//! published events. An `EventModel` is the simpler request/response flavor
//! with no subscription concept at all. The two registries are disjoint —
//! the same namespace string may be bound in both (spec §4.6).

use async_trait::async_trait;
use std::sync::Arc;

use crate::collections::ShardedMap;
use crate::connection::Connection;
use crate::error::Result;

/// A namespace handler for channel-style (subscribe/publish) traffic.
#[async_trait]
pub trait ChannelModel: Send + Sync + 'static {
    /// The namespace this model answers for.
    fn namespace(&self) -> &str;

    /// Admission check for a subscribe request. `Ok(true)` accepts the
    /// connection into the room, `Ok(false)` rejects it (surfaced to the
    /// client as `Unauthorized`).
    async fn subscribe(&self, room: &str, conn: &Connection) -> Result<bool>;

    /// Called when a connection leaves a room it was subscribed to
    /// (explicit unsubscribe or connection teardown).
    async fn disconnect(&self, room: &str, conn: &Connection) -> Result<()>;

    /// Handle a published event. A non-empty returned string overwrites the
    /// response packet's `message.data` before it is fanned out.
    async fn receive(&self, event: &str, data: &str) -> Result<String>;
}

/// A namespace handler for request/response (non-subscription) traffic.
#[async_trait]
pub trait EventModel: Send + Sync + 'static {
    fn namespace(&self) -> &str;

    /// Handle an event. A non-empty returned string overwrites the
    /// response packet's `message.data`.
    async fn receive(&self, event: &str, data: &str) -> Result<String>;
}

pub(crate) type ChannelModelRegistry = ShardedMap<Arc<dyn ChannelModel>>;
pub(crate) type EventModelRegistry = ShardedMap<Arc<dyn EventModel>>;
