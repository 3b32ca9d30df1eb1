// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire packet format.
//!
//! JSON is the canonical wire format (§6 of the design doc). `Packet` maps
//! directly onto the JSON object a client sends and receives; `machine` is
//! carried in memory for broker-loop bookkeeping but is never serialized.

use serde::{Deserialize, Serialize};

use crate::error::{PacketKind, SphereError};

/// Packet type tag. Serializes to the lower-case wire string; an unknown
/// string on the way in deserializes to [`PacketType::Unknown`] rather than
/// failing the whole packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    Message,
    Channel,
    Subscribe,
    Unsubscribe,
    Subscribed,
    Unsubscribed,
    Ping,
    Pong,
    Unknown,
}

impl<'de> Deserialize<'de> for PacketType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "message" => PacketType::Message,
            "channel" => PacketType::Channel,
            "subscribe" => PacketType::Subscribe,
            "unsubscribe" => PacketType::Unsubscribe,
            "subscribed" => PacketType::Subscribed,
            "unsubscribed" => PacketType::Unsubscribed,
            "ping" => PacketType::Ping,
            "pong" => PacketType::Pong,
            _ => PacketType::Unknown,
        })
    }
}

impl PacketType {
    /// The `Response()` type transform (spec §4.1): Subscribe -> Subscribed,
    /// Unsubscribe -> Unsubscribed, Ping -> Pong; everything else unchanged.
    pub fn response(self) -> Self {
        match self {
            PacketType::Subscribe => PacketType::Subscribed,
            PacketType::Unsubscribe => PacketType::Unsubscribed,
            PacketType::Ping => PacketType::Pong,
            other => other,
        }
    }
}

/// The inner `{event, data}` payload carried by `channel` and `message` packets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: String,
}

/// A single wire packet, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "type")]
    pub kind: PacketType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default)]
    pub cid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default)]
    pub reply: bool,
    /// Origin broker id. Never serialized onto the wire.
    #[serde(skip)]
    pub machine: Option<String>,
}

impl Packet {
    pub fn new(kind: PacketType) -> Self {
        Self {
            kind,
            namespace: None,
            room: None,
            cid: 0,
            error: None,
            message: None,
            reply: false,
            machine: None,
        }
    }

    /// Parse a packet off the wire. A malformed payload is always a
    /// [`PacketKind::BadScheme`], per spec §4.1.
    pub fn parse(bytes: &[u8]) -> Result<Self, SphereError> {
        serde_json::from_slice(bytes).map_err(|_| SphereError::Packet(PacketKind::BadScheme))
    }

    /// Serialize for the wire. `machine` is dropped by `#[serde(skip)]`.
    pub fn to_json(&self) -> Result<String, SphereError> {
        serde_json::to_string(self).map_err(|_| SphereError::Packet(PacketKind::BadScheme))
    }

    /// Build the server-generated response to this packet: `reply = true`,
    /// the same `cid`, and the type transformed per [`PacketType::response`].
    pub fn response(&self) -> Self {
        Self {
            kind: self.kind.response(),
            namespace: self.namespace.clone(),
            room: self.room.clone(),
            cid: self.cid,
            error: None,
            message: self.message.clone(),
            reply: true,
            machine: self.machine.clone(),
        }
    }

    /// Attach an error message to a response packet (spec §7 propagation).
    pub fn with_error(mut self, err: &SphereError) -> Self {
        self.error = Some(err.wire_message());
        self
    }
}
