// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The top-level dispatcher: owns the broker, connections, channels, and
//! namespace registries, and implements the packet state machine that ties
//! them together.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::broker::{Broker, InProcessBroker};
use crate::channel::Channel;
use crate::collections::ShardedMap;
use crate::config::SphereConfig;
use crate::connection::Connection;
use crate::error::{ClientKind, ProtocolKind, Result, SphereError};
use crate::model::{ChannelModel, ChannelModelRegistry, EventModel, EventModelRegistry};
use crate::packet::{Message, Packet, PacketType};

/// A namespace handler pending registration, produced by [`Model::channel`]
/// or [`Model::event`] and handed to [`SphereBuilder::models`].
pub enum Model {
    Channel(Arc<dyn ChannelModel>),
    Event(Arc<dyn EventModel>),
}

impl Model {
    pub fn channel(model: Arc<dyn ChannelModel>) -> Self {
        Model::Channel(model)
    }

    pub fn event(model: Arc<dyn EventModel>) -> Self {
        Model::Event(model)
    }
}

/// Builder for [`Sphere`]. Defaults to an [`InProcessBroker`] when no broker
/// is supplied (spec §6's "constructor taking zero or more broker
/// implementations").
#[derive(Default)]
pub struct SphereBuilder {
    broker: Option<Arc<dyn Broker>>,
    config: SphereConfig,
    models: Vec<Model>,
}

impl SphereBuilder {
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn config(mut self, config: SphereConfig) -> Self {
        self.config = config;
        self
    }

    pub fn channel_model(mut self, model: Arc<dyn ChannelModel>) -> Self {
        self.models.push(Model::Channel(model));
        self
    }

    pub fn event_model(mut self, model: Arc<dyn EventModel>) -> Self {
        self.models.push(Model::Event(model));
        self
    }

    /// The `Models(...)` registration entrypoint (spec §6). Accepts any mix
    /// of channel-style and event-style namespace handlers.
    pub fn models(mut self, models: impl IntoIterator<Item = Model>) -> Self {
        self.models.extend(models);
        self
    }

    pub fn build(self) -> Arc<Sphere> {
        let sphere = Arc::new(Sphere {
            config: Arc::new(self.config),
            broker: self.broker.unwrap_or_else(|| Arc::new(InProcessBroker::new())),
            connections: ShardedMap::new(),
            channels: ShardedMap::new(),
            channel_models: ShardedMap::new(),
            event_models: ShardedMap::new(),
        });
        for model in self.models {
            sphere.register(model);
        }
        sphere
    }
}

/// The routing and subscription engine.
pub struct Sphere {
    config: Arc<SphereConfig>,
    broker: Arc<dyn Broker>,
    connections: ShardedMap<Arc<Connection>>,
    channels: ShardedMap<Arc<Channel>>,
    channel_models: ChannelModelRegistry,
    event_models: EventModelRegistry,
}

impl Sphere {
    pub fn builder() -> SphereBuilder {
        SphereBuilder::default()
    }

    pub fn config(&self) -> &SphereConfig {
        &self.config
    }

    /// A namespace name may be bound at most once per registry; a duplicate
    /// registration is a programmer error (spec §4.6, fail fast).
    #[allow(clippy::panic)]
    fn register(&self, model: Model) {
        match model {
            Model::Channel(m) => {
                let ns = m.namespace().to_string();
                if !self.channel_models.set_if_absent(&ns, m) {
                    panic!("sphere: namespace {ns:?} is already registered as a channel model");
                }
            }
            Model::Event(m) => {
                let ns = m.namespace().to_string();
                if !self.event_models.set_if_absent(&ns, m) {
                    panic!("sphere: namespace {ns:?} is already registered as an event model");
                }
            }
        }
    }

    pub fn register_connection(&self, conn: &Arc<Connection>) {
        self.connections.set(conn.id(), Arc::clone(conn));
    }

    /// Unsubscribe `conn` from every channel it still belongs to, tearing
    /// down each channel's broker subscription once it has no local members
    /// left, then drop the connection from the engine registry (spec §5
    /// "Cancellation and teardown"). Notifies each channel's model via
    /// `disconnect`, matching `handle_unsubscribe` — a connection leaving by
    /// abrupt close or read error is still "a connection leaving a room it
    /// was subscribed to" per the model contract, not just an explicit
    /// unsubscribe packet.
    pub async fn teardown_connection(&self, conn: &Arc<Connection>) {
        for name in conn.channel_names() {
            let Some(channel) = self.channels.get(&name) else { continue };

            if let Some(model) = self.channel_models.get(channel.namespace()) {
                if let Err(e) = model.disconnect(channel.room(), conn).await {
                    warn!(channel = %name, connection = %conn.id(), err = %e, "model disconnect failed during teardown");
                }
            }

            match channel.unsubscribe(conn) {
                Ok(was_last) => {
                    conn.mark_unsubscribed(&name);
                    self.retire_if_empty(&name, &channel, was_last).await;
                }
                Err(_) => continue,
            }
        }
        self.connections.remove(conn.id());
    }

    /// Resolve `(ns, room)` to a `Channel`, auto-creating it if absent
    /// (spec §4.7 "Channel lookup policy"). Safe under concurrent subscribes
    /// on the same channel name via insert-if-absent.
    fn channel_name(&self, ns: &str, room: &str) -> String {
        self.broker.channel_name(ns, room)
    }

    fn lookup_channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(name)
    }

    fn lookup_or_create_channel(&self, name: &str, ns: &str, room: &str) -> Arc<Channel> {
        self.channels.get_or_insert_with(name, || Arc::new(Channel::new(ns, room)))
    }

    /// Tear down `channel`'s broker subscription and drop it from the
    /// engine's channel map, iff `was_last` (the caller's
    /// `Channel::unsubscribe` result) says this call was the transition from
    /// one to zero local members — determined atomically by the caller
    /// rather than by re-reading `channel.is_empty()` here, which would
    /// race against a concurrent subscribe/unsubscribe on the same channel.
    /// The map removal itself is still guarded against a racing resubscribe
    /// by `ShardedMap::remove_if` (spec §9 "Channel destruction").
    async fn retire_if_empty(&self, name: &str, channel: &Arc<Channel>, was_last: bool) {
        if !was_last {
            return;
        }
        if let Err(e) = self.broker.on_unsubscribe(channel).await {
            warn!(channel = %name, err = %e, "broker on_unsubscribe failed during teardown");
        }
        self.channels.remove_if(name, |ch| ch.is_empty());
        debug!(channel = %name, "channel retired");
    }

    /// Process one inbound packet from `conn`. Spawned as an independent
    /// task per packet by the reader loop (spec §4.7), so a slow handler
    /// never stalls the connection's read side.
    pub async fn process(&self, packet: Packet, conn: Arc<Connection>) {
        match packet.kind {
            PacketType::Subscribe => self.handle_subscribe(packet, conn).await,
            PacketType::Unsubscribe => self.handle_unsubscribe(packet, conn).await,
            PacketType::Channel => self.handle_publish(packet, conn).await,
            PacketType::Message => self.handle_event(packet, conn).await,
            PacketType::Ping => conn.emit_packet(packet.response()),
            other => {
                debug!(connection = %conn.id(), kind = ?other, "dropping inbound packet of a server-only or unknown type");
            }
        }
    }

    fn require_namespace_and_room(packet: &Packet) -> Option<(String, String)> {
        let ns = packet.namespace.clone()?;
        let room = packet.room.clone()?;
        if ns.is_empty() || room.is_empty() {
            return None;
        }
        Some((ns, room))
    }

    /// A packet too malformed to know how to transform echoes the inbound
    /// packet verbatim with the error attached, rather than going through
    /// `Packet::response` (spec §8 "Bad scheme" scenario).
    fn bad_scheme_response(packet: &Packet) -> Packet {
        let mut resp = packet.clone();
        resp.reply = true;
        resp.error = Some(SphereError::Protocol(ProtocolKind::BadScheme).wire_message());
        resp
    }

    async fn handle_subscribe(&self, packet: Packet, conn: Arc<Connection>) {
        let Some((ns, room)) = Self::require_namespace_and_room(&packet) else {
            conn.emit_packet(Self::bad_scheme_response(&packet));
            return;
        };

        let Some(model) = self.channel_models.get(&ns) else {
            conn.emit_packet(
                packet.response().with_error(&SphereError::Protocol(ProtocolKind::NotSupported)),
            );
            return;
        };

        match model.subscribe(&room, &conn).await {
            Ok(true) => {}
            Ok(false) => {
                conn.emit_packet(
                    packet
                        .response()
                        .with_error(&SphereError::Protocol(ProtocolKind::Unauthorized)),
                );
                return;
            }
            Err(e) => {
                conn.emit_packet(packet.response().with_error(&e));
                return;
            }
        }

        let name = self.channel_name(&ns, &room);
        let channel = self.lookup_or_create_channel(&name, &ns, &room);

        match channel.subscribe(&conn) {
            Ok(was_first) => {
                conn.mark_subscribed(&name);
                if was_first {
                    if let Err(e) = self.broker.on_subscribe(&channel).await {
                        conn.emit_packet(packet.response().with_error(&e));
                        return;
                    }
                }
                debug!(namespace = %ns, room = %room, connection = %conn.id(), "subscribed");
                conn.emit_packet(packet.response());
            }
            Err(e) => conn.emit_packet(packet.response().with_error(&e)),
        }
    }

    async fn handle_unsubscribe(&self, packet: Packet, conn: Arc<Connection>) {
        let Some((ns, room)) = Self::require_namespace_and_room(&packet) else {
            conn.emit_packet(Self::bad_scheme_response(&packet));
            return;
        };

        let Some(model) = self.channel_models.get(&ns) else {
            conn.emit_packet(
                packet.response().with_error(&SphereError::Protocol(ProtocolKind::NotSupported)),
            );
            return;
        };

        let name = self.channel_name(&ns, &room);
        let Some(channel) = self.lookup_channel(&name) else {
            conn.emit_packet(
                packet.response().with_error(&SphereError::Client(ClientKind::NotSubscribed)),
            );
            return;
        };

        if let Err(e) = model.disconnect(&room, &conn).await {
            conn.emit_packet(packet.response().with_error(&e));
            return;
        }

        match channel.unsubscribe(&conn) {
            Ok(was_last) => {
                conn.mark_unsubscribed(&name);
                self.retire_if_empty(&name, &channel, was_last).await;
                debug!(namespace = %ns, room = %room, connection = %conn.id(), "unsubscribed");
                conn.emit_packet(packet.response());
            }
            Err(e) => conn.emit_packet(packet.response().with_error(&e)),
        }
    }

    async fn handle_publish(&self, mut packet: Packet, conn: Arc<Connection>) {
        let Some((ns, room)) = Self::require_namespace_and_room(&packet) else {
            conn.emit_packet(Self::bad_scheme_response(&packet));
            return;
        };

        let name = self.channel_name(&ns, &room);
        let Some(channel) = self.lookup_channel(&name) else {
            conn.emit_packet(
                packet.response().with_error(&SphereError::Client(ClientKind::NotSubscribed)),
            );
            return;
        };

        if !channel.is_subscribed(&conn) {
            conn.emit_packet(
                packet.response().with_error(&SphereError::Client(ClientKind::NotSubscribed)),
            );
            return;
        }

        packet.machine = Some(self.broker.id().to_string());

        let Some(model) = self.channel_models.get(&ns) else {
            conn.emit_packet(packet.response().with_error(&SphereError::Protocol(ProtocolKind::NotSupported)));
            return;
        };

        let msg = packet.message.clone().unwrap_or_default();
        let mut outgoing_message = packet.message.clone();
        match model.receive(&msg.event, &msg.data).await {
            Ok(reply) if !reply.is_empty() => {
                outgoing_message = Some(Message { event: msg.event, data: reply });
            }
            Ok(_) => {}
            Err(e) => {
                conn.emit_packet(packet.response().with_error(&e));
                return;
            }
        }

        // Unlike Subscribe/Unsubscribe/Ping, a publish has no synchronous
        // ack (spec §4.7's Channel row has a blank Response column): the
        // broker round trip delivers this as a push to every member,
        // including the publisher, each assigning it their own next cid
        // rather than inheriting the publisher's (spec §8 property 3).
        let mut delivery = Packet::new(PacketType::Channel);
        delivery.namespace = Some(ns.clone());
        delivery.room = Some(room.clone());
        delivery.message = outgoing_message;
        delivery.machine = packet.machine.clone();

        if self.broker.is_subscribed(&name).await {
            if let Err(e) = self.broker.on_publish(&channel, &delivery).await {
                warn!(channel = %name, err = %e, "broker on_publish failed");
            }
        } else {
            warn!(channel = %name, "publish with no active broker subscription");
        }
    }

    async fn handle_event(&self, packet: Packet, conn: Arc<Connection>) {
        let Some(ns) = packet.namespace.clone().filter(|ns| !ns.is_empty()) else {
            conn.emit_packet(Self::bad_scheme_response(&packet));
            return;
        };

        let Some(model) = self.event_models.get(&ns) else {
            conn.emit_packet(
                packet.response().with_error(&SphereError::Protocol(ProtocolKind::NotSupported)),
            );
            return;
        };

        let msg = packet.message.clone().unwrap_or_default();
        let mut response = packet.response();
        match model.receive(&msg.event, &msg.data).await {
            Ok(reply) => {
                if !reply.is_empty() {
                    response.message = Some(Message { event: msg.event, data: reply });
                }
                conn.emit_packet(response);
            }
            Err(e) => conn.emit_packet(response.with_error(&e)),
        }
    }

    /// Whether the broker backplane currently has an active subscription
    /// for `(ns, room)` — exposed for the "unsubscribe cleanup" testable
    /// property (spec §8, property 2).
    pub async fn is_broker_subscribed(&self, ns: &str, room: &str) -> bool {
        self.broker.is_subscribed(&self.channel_name(ns, room)).await
    }
}
