// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A named membership set of connections: the unit of subscription.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::collections::ShardedMap;
use crate::connection::Connection;
use crate::error::{ClientKind, Result, SphereError};
use crate::packet::Packet;

/// Lifecycle state of a channel (restored from the original's
/// `channel_state.go` tri-state; folded into spec.md's Data Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Pending,
    Subscribed,
    Unsubscribed,
}

impl ChannelState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ChannelState::Subscribed,
            2 => ChannelState::Unsubscribed,
            _ => ChannelState::Pending,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ChannelState::Pending => 0,
            ChannelState::Subscribed => 1,
            ChannelState::Unsubscribed => 2,
        }
    }
}

/// The `(namespace, room)` pair; the unit of subscription (spec §3).
pub struct Channel {
    namespace: String,
    room: String,
    state: AtomicU8,
    /// Authoritative member count, maintained alongside `connections` so the
    /// empty<->non-empty transition can be detected atomically at the same
    /// point a `subscribe`/`unsubscribe` call mutates membership, rather
    /// than by separately re-reading `connections.len()` afterwards (which
    /// races against a concurrent subscribe/unsubscribe landing in a
    /// different shard).
    member_count: AtomicUsize,
    connections: ShardedMap<Arc<Connection>>,
}

impl Channel {
    pub fn new(namespace: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            room: room.into(),
            state: AtomicU8::new(ChannelState::Pending.as_u8()),
            member_count: AtomicUsize::new(0),
            connections: ShardedMap::new(),
        }
    }

    /// Canonical name: `namespace:room`.
    pub fn name(&self) -> String {
        format!("{}:{}", self.namespace, self.room)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: ChannelState) {
        self.state.store(s.as_u8(), Ordering::Release);
    }

    /// Ids of currently-member connections (restored introspection
    /// accessor from the original's `Channel.Connections()`).
    pub fn member_ids(&self) -> Vec<String> {
        self.connections.iter().into_iter().map(|(k, _)| k).collect()
    }

    pub fn member_count(&self) -> usize {
        self.member_count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.member_count() == 0
    }

    /// Add `conn` to the membership set. Returns `Ok(true)` iff this insert
    /// was the transition from zero to one local member — the caller's
    /// signal to invoke `broker.on_subscribe` — determined atomically via
    /// `member_count`'s `fetch_add` rather than by re-reading the member
    /// count afterwards, which would race against a second connection
    /// subscribing to the same brand-new channel concurrently (both inserts
    /// land before either reads the count, so both would see "not first"
    /// and the broker would never be subscribed). Returns
    /// `ClientKind::AlreadySubscribed` if `conn` was already a member.
    pub fn subscribe(&self, conn: &Arc<Connection>) -> Result<bool> {
        if self.connections.set_if_absent(conn.id(), Arc::clone(conn)) {
            let previous = self.member_count.fetch_add(1, Ordering::AcqRel);
            self.set_state(ChannelState::Subscribed);
            Ok(previous == 0)
        } else {
            Err(SphereError::Client(ClientKind::AlreadySubscribed))
        }
    }

    /// Remove `conn` from the membership set. Returns `Ok(true)` iff this
    /// removal was the transition from one to zero local members — the
    /// caller's signal to invoke `broker.on_unsubscribe` — determined
    /// atomically the same way `subscribe` detects the reverse transition.
    /// Returns `ClientKind::NotSubscribed` if `conn` was not a member.
    pub fn unsubscribe(&self, conn: &Arc<Connection>) -> Result<bool> {
        if self.connections.remove(conn.id()).is_some() {
            let previous = self.member_count.fetch_sub(1, Ordering::AcqRel);
            if previous == 1 {
                self.set_state(ChannelState::Unsubscribed);
            }
            Ok(previous == 1)
        } else {
            Err(SphereError::Client(ClientKind::NotSubscribed))
        }
    }

    pub fn is_subscribed(&self, conn: &Arc<Connection>) -> bool {
        self.connections.has(conn.id())
    }

    /// Fan a packet out to every member connection except `exclude` (the
    /// broker fan-out suppression decision, design doc §7 open question 1).
    /// A slow or full recipient is skipped — `Connection::emit_packet` is
    /// itself non-blocking, so fan-out to the rest never stalls.
    pub fn emit(&self, packet: Packet, exclude: Option<&str>) {
        for (id, conn) in self.connections.iter() {
            if Some(id.as_str()) == exclude {
                continue;
            }
            conn.emit_packet(packet.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::dummy_connection;
    use crate::packet::PacketType;

    #[test]
    fn name_is_namespace_colon_room() {
        let ch = Channel::new("test", "r1");
        assert_eq!(ch.name(), "test:r1");
    }

    #[test]
    fn subscribe_then_resubscribe_errors() {
        let ch = Channel::new("test", "r1");
        let conn = dummy_connection();
        assert!(ch.subscribe(&conn).unwrap());
        assert!(matches!(
            ch.subscribe(&conn),
            Err(SphereError::Client(ClientKind::AlreadySubscribed))
        ));
        assert_eq!(ch.state(), ChannelState::Subscribed);
    }

    #[test]
    fn unsubscribe_unknown_connection_errors() {
        let ch = Channel::new("test", "r1");
        let conn = dummy_connection();
        assert!(matches!(
            ch.unsubscribe(&conn),
            Err(SphereError::Client(ClientKind::NotSubscribed))
        ));
    }

    #[test]
    fn last_unsubscribe_marks_unsubscribed_state() {
        let ch = Channel::new("test", "r1");
        let a = dummy_connection();
        let b = dummy_connection();
        ch.subscribe(&a).unwrap();
        ch.subscribe(&b).unwrap();
        ch.unsubscribe(&a).unwrap();
        assert_eq!(ch.state(), ChannelState::Subscribed);
        ch.unsubscribe(&b).unwrap();
        assert_eq!(ch.state(), ChannelState::Unsubscribed);
        assert!(ch.is_empty());
    }

    #[test]
    fn emit_excludes_the_given_connection() {
        let ch = Channel::new("test", "r1");
        let a = dummy_connection();
        let b = dummy_connection();
        ch.subscribe(&a).unwrap();
        ch.subscribe(&b).unwrap();

        let mut packet = Packet::new(PacketType::Channel);
        packet.reply = true; // avoid cid churn for this assertion
        ch.emit(packet, Some(a.id()));

        // No panics / no direct way to observe delivery without a real
        // outbound receiver; member bookkeeping is the invariant under test.
        assert_eq!(ch.member_count(), 2);
    }

    #[test]
    fn subscribe_reports_first_member_for_exactly_one_of_two_concurrent_joiners() {
        use std::sync::Arc as StdArc;
        use std::thread;

        let ch = StdArc::new(Channel::new("test", "r1"));
        let a = dummy_connection();
        let b = dummy_connection();

        let ch_a = StdArc::clone(&ch);
        let t = thread::spawn(move || ch_a.subscribe(&a).unwrap());
        let was_first_b = ch.subscribe(&b).unwrap();
        let was_first_a = t.join().unwrap();

        assert_ne!(was_first_a, was_first_b, "exactly one concurrent subscribe must see the empty->non-empty transition");
        assert_eq!(ch.member_count(), 2);
    }
}
