// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified error taxonomy shared by the packet codec, the dispatcher, and
//! broker adapters.
//!
//! The original implementation split errors into three small hierarchies
//! (`ProtocolError`, `ClientError`, `PacketError`). Per the re-architecture
//! notes, those collapse into one tagged-variant enum here so a single
//! `to_string()` can be dropped straight into a response [`Packet`]'s
//! `error` field.

use thiserror::Error;

/// Protocol-level errors raised while admitting or routing a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolKind {
    #[error("not found")]
    NotFound,
    #[error("not supported")]
    NotSupported,
    #[error("not implemented")]
    NotImplemented,
    #[error("too many requests")]
    TooManyRequests,
    #[error("bad scheme")]
    BadScheme,
    #[error("bad status")]
    BadStatus,
    #[error("bad method")]
    BadMethod,
    #[error("unauthorized")]
    Unauthorized,
    #[error("server errors")]
    ServerErrors,
    #[error("request failed")]
    RequestFailed,
}

/// Client-originated subscription-state errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientKind {
    #[error("already subscribed")]
    AlreadySubscribed,
    #[error("not subscribed")]
    NotSubscribed,
}

/// Wire-packet decode errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketKind {
    #[error("packet bad scheme")]
    BadScheme,
    #[error("packet bad type")]
    BadType,
}

/// The single error type produced and consumed across the crate.
#[derive(Debug, Error)]
pub enum SphereError {
    #[error(transparent)]
    Protocol(#[from] ProtocolKind),
    #[error(transparent)]
    Client(#[from] ClientKind),
    #[error(transparent)]
    Packet(#[from] PacketKind),
    /// A broker adapter reported a failure (subscribe/unsubscribe/publish RPC).
    #[error("broker error: {0}")]
    Broker(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SphereError {
    /// Render the error the way it is placed into `Packet.error` on the wire.
    pub fn wire_message(&self) -> String {
        self.to_string()
    }
}

impl Clone for SphereError {
    fn clone(&self) -> Self {
        match self {
            Self::Protocol(k) => Self::Protocol(*k),
            Self::Client(k) => Self::Client(*k),
            Self::Packet(k) => Self::Packet(*k),
            Self::Broker(s) => Self::Broker(s.clone()),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, SphereError>;
