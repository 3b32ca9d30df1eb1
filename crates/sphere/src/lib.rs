// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A WebSocket real-time pub/sub routing engine.
//!
//! `sphere` routes JSON packets between connected clients over namespaced
//! channels, with subscribe/unsubscribe/publish semantics enforced by
//! embedder-supplied [`model::ChannelModel`] and [`model::EventModel`]
//! handlers. A [`broker::Broker`] adapter fans published packets out past a
//! single process — in-process by default, Redis when the `redis` feature
//! is enabled.
//!
//! ```no_run
//! use sphere::Sphere;
//!
//! # fn run() {
//! let sphere = Sphere::builder().build();
//! let app = axum::Router::new()
//!     .route("/ws", axum::routing::get(sphere::http::upgrade))
//!     .with_state(sphere);
//! # let _ = app;
//! # }
//! ```

pub mod broker;
pub mod channel;
pub mod collections;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod model;
pub mod packet;
pub mod sphere;

pub use broker::{Broker, InProcessBroker, NoopBroker};
#[cfg(feature = "redis")]
pub use broker::RedisBroker;
pub use channel::{Channel, ChannelState};
pub use config::SphereConfig;
#[cfg(feature = "redis")]
pub use config::RedisBrokerConfig;
pub use connection::Connection;
pub use error::{ClientKind, PacketKind, ProtocolKind, Result, SphereError};
pub use model::{ChannelModel, EventModel};
pub use packet::{Message, Packet, PacketType};
pub use sphere::{Sphere, SphereBuilder};
