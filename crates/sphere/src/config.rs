// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tuning constants and backplane configuration.
//!
//! Defaults match spec §6 exactly; embedders may override any of them when
//! constructing a [`crate::sphere::Sphere`].

use std::time::Duration;

/// Engine-wide tuning knobs.
#[derive(Debug, Clone)]
pub struct SphereConfig {
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub write_wait: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub max_message_size: usize,
    pub shards: usize,
}

impl Default for SphereConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            read_buffer_size: 1024,
            write_buffer_size: 1024,
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: 512,
            shards: crate::collections::DEFAULT_SHARDS,
        }
    }
}

/// Connection parameters for [`crate::broker::redis::RedisBroker`].
#[cfg(feature = "redis")]
#[derive(Debug, Clone)]
pub struct RedisBrokerConfig {
    pub url: String,
}

#[cfg(feature = "redis")]
impl RedisBrokerConfig {
    /// Read `REDIS_URL`, defaulting to `redis://127.0.0.1:6379` (matching
    /// the original's hardcoded `localhost:6379` default, now overridable).
    pub fn from_env() -> Self {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Self { url }
    }
}
