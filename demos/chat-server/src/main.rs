// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runnable example embedding `sphere`: a single "chat" namespace that
//! accepts every subscriber and relays published events verbatim.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use clap::Parser;
use sphere::{ChannelModel, Connection, Sphere};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "chat-server", about = "sphere chat demo")]
struct Args {
    /// Address to bind the WebSocket server on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// When set, fan out through Redis pub/sub instead of the in-process broker.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,
}

struct ChatRoom;

#[async_trait]
impl ChannelModel for ChatRoom {
    fn namespace(&self) -> &str {
        "chat"
    }

    async fn subscribe(&self, room: &str, conn: &Connection) -> sphere::Result<bool> {
        info!(room, connection = conn.id(), "joined chat room");
        Ok(true)
    }

    async fn disconnect(&self, room: &str, conn: &Connection) -> sphere::Result<()> {
        info!(room, connection = conn.id(), "left chat room");
        Ok(())
    }

    async fn receive(&self, _event: &str, _data: &str) -> sphere::Result<String> {
        // Empty string means "forward the published payload unchanged".
        Ok(String::new())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let mut builder = Sphere::builder().channel_model(Arc::new(ChatRoom));
    if let Some(url) = args.redis_url {
        let config = sphere::RedisBrokerConfig { url };
        let broker = sphere::RedisBroker::connect(config).await?;
        builder = builder.broker(Arc::new(broker));
    }
    let sphere = builder.build();

    let app = Router::new()
        .route("/ws", axum::routing::get(sphere::http::upgrade))
        .with_state(sphere)
        .layer(TraceLayer::new_for_http());

    info!(addr = %args.bind, "chat-server listening");
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
