//! RoomRegistry - per-node index of room membership.
//!
//! Rooms are plain string keys. The registry keeps two maps in step:
//!
//! ```text
//! rooms:        "lobby"   -> {conn-a, conn-b}
//!               "conn-a"  -> {conn-a}          (self-named room)
//! memberships:  conn-a    -> {"lobby", "conn-a"}
//! ```
//!
//! Both maps and the connection table sit behind one `RwLock`, so every
//! mutation observes and leaves a consistent snapshot. A room with no
//! members is removed from the index immediately.
//!
//! Only the source-room mutations (`add_room_members_to_rooms`,
//! `remove_room_members_from_rooms`, `leave_all_rooms`) are mirrored to
//! peer nodes, and only when their origin is [`MutationOrigin::Local`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::connection::{resolve_targets, Connection, ConnectionTarget, OutboundMessage};
use crate::domain::foundation::{validate_room_name, ConnectionId, UsageError};
use crate::domain::room::{LeaveAllOptions, MembershipMutation, MutationOrigin};
use crate::ports::MembershipMirror;

#[derive(Default)]
struct RegistryState {
    rooms: HashMap<String, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<String>>,
    connections: HashMap<ConnectionId, Arc<Connection>>,
}

impl RegistryState {
    fn add(&mut self, id: &ConnectionId, room: &str) -> bool {
        let inserted = self
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(id.clone());
        self.memberships
            .entry(id.clone())
            .or_default()
            .insert(room.to_string());
        inserted
    }

    fn remove(&mut self, id: &ConnectionId, room: &str) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
                removed
            }
            None => false,
        };
        if let Some(rooms) = self.memberships.get_mut(id) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.memberships.remove(id);
            }
        }
        removed
    }

    fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Applies a mutation and returns how many local members it touched.
    /// Like `remove`, but a connection never leaves its self-named room.
    fn leave(&mut self, id: &ConnectionId, room: &str) -> bool {
        if room == id.as_str() {
            return false;
        }
        self.remove(id, room)
    }

    fn apply(&mut self, mutation: &MembershipMutation) -> usize {
        let members = self.members_of(mutation.source_room());
        match mutation {
            MembershipMutation::AddMembers { dest_rooms, .. } => {
                for id in &members {
                    for room in dest_rooms {
                        self.add(id, room);
                    }
                }
            }
            MembershipMutation::RemoveMembers { dest_rooms, .. } => {
                for id in &members {
                    for room in dest_rooms {
                        self.leave(id, room);
                    }
                }
            }
            MembershipMutation::LeaveAll {
                source_room,
                options,
            } => {
                for id in &members {
                    let rooms: Vec<String> = self
                        .memberships
                        .get(id)
                        .map(|rooms| rooms.iter().cloned().collect())
                        .unwrap_or_default();
                    for room in rooms {
                        if room == id.as_str() && !options.include_socket_rooms {
                            continue;
                        }
                        if room == *source_room && !options.include_source_room {
                            continue;
                        }
                        self.remove(id, &room);
                    }
                }
            }
        }
        members.len()
    }
}

/// Per-node room registry.
pub struct RoomRegistry {
    state: RwLock<RegistryState>,
    mirror: Option<Arc<dyn MembershipMirror>>,
}

impl RoomRegistry {
    /// Registry that never mirrors (single-node deployments, tests).
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            mirror: None,
        }
    }

    /// Registry whose local source-room mutations are handed to `mirror`.
    pub fn with_mirror(mirror: Arc<dyn MembershipMirror>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            mirror: Some(mirror),
        }
    }

    // ════════════════════════════════════════════════════════════════════
    // Connection lifecycle
    // ════════════════════════════════════════════════════════════════════

    /// Track a newly accepted connection and join it to its self-named room.
    pub async fn register(&self, connection: Arc<Connection>) {
        let id = connection.id().clone();
        let mut state = self.state.write().await;
        state.connections.insert(id.clone(), connection);
        state.add(&id, id.as_str());
        tracing::debug!(connection_id = %id, "connection registered");
    }

    /// Remove a connection from every room it belongs to and forget it.
    ///
    /// Returns the rooms it was removed from. Peers are not told.
    pub async fn unregister(&self, id: &ConnectionId) -> Vec<String> {
        let mut state = self.state.write().await;
        let rooms: Vec<String> = state
            .memberships
            .get(id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        for room in &rooms {
            state.remove(id, room);
        }
        state.connections.remove(id);
        tracing::debug!(connection_id = %id, rooms = rooms.len(), "connection unregistered");
        rooms
    }

    /// Look up a registered connection.
    pub async fn connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.state.read().await.connections.get(id).cloned()
    }

    // ════════════════════════════════════════════════════════════════════
    // Local membership
    // ════════════════════════════════════════════════════════════════════

    /// Add each target connection to `room`. Joining twice is a no-op.
    ///
    /// Fails without mutating anything if a target is not registered here.
    pub async fn join<I, T>(&self, targets: I, room: &str) -> Result<(), UsageError>
    where
        I: IntoIterator<Item = T>,
        T: ConnectionTarget,
    {
        validate_room_name(room)?;
        let ids = resolve_targets(targets);

        let mut state = self.state.write().await;
        if let Some(unknown) = ids.iter().find(|id| !state.connections.contains_key(*id)) {
            return Err(UsageError::UnknownConnection(unknown.to_string()));
        }
        for id in &ids {
            if state.add(id, room) {
                tracing::trace!(connection_id = %id, room, "joined room");
            }
        }
        Ok(())
    }

    /// Remove each target connection from `room`. Non-members are ignored,
    /// as is a target whose self-named room is `room`.
    pub async fn leave<I, T>(&self, targets: I, room: &str) -> Result<(), UsageError>
    where
        I: IntoIterator<Item = T>,
        T: ConnectionTarget,
    {
        validate_room_name(room)?;
        let ids = resolve_targets(targets);

        let mut state = self.state.write().await;
        for id in &ids {
            if state.leave(id, room) {
                tracing::trace!(connection_id = %id, room, "left room");
            }
        }
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════
    // Delivery
    // ════════════════════════════════════════════════════════════════════

    /// Deliver an event to every local member of `room` except `omit`.
    ///
    /// Returns the number of connections the event was queued on. Never
    /// crosses nodes.
    pub async fn broadcast(
        &self,
        room: &str,
        event: &str,
        payload: serde_json::Value,
        omit: Option<&ConnectionId>,
    ) -> Result<usize, UsageError> {
        validate_room_name(room)?;
        if event.is_empty() {
            return Err(UsageError::EmptyEventName);
        }

        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room) else {
            return Ok(0);
        };

        let mut delivered = 0;
        for id in members {
            if Some(id) == omit {
                continue;
            }
            if let Some(connection) = state.connections.get(id) {
                if connection.send(OutboundMessage::event(event, payload.clone())) {
                    delivered += 1;
                }
            }
        }
        tracing::debug!(room, event, delivered, "room broadcast");
        Ok(delivered)
    }

    /// Deliver an event to specific connections through their self-named
    /// rooms. Targets not on this node are skipped.
    pub async fn emit_to<I, T>(
        &self,
        targets: I,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<usize, UsageError>
    where
        I: IntoIterator<Item = T>,
        T: ConnectionTarget,
    {
        if event.is_empty() {
            return Err(UsageError::EmptyEventName);
        }
        let ids = resolve_targets(targets);

        let state = self.state.read().await;
        let mut delivered = 0;
        for id in &ids {
            let Some(members) = state.rooms.get(id.as_str()) else {
                continue;
            };
            for member in members {
                if let Some(connection) = state.connections.get(member) {
                    if connection.send(OutboundMessage::event(event, payload.clone())) {
                        delivered += 1;
                    }
                }
            }
        }
        Ok(delivered)
    }

    // ════════════════════════════════════════════════════════════════════
    // Source-room mutations (mirrored)
    // ════════════════════════════════════════════════════════════════════

    /// Add every local member of `source_room` to each of `dest_rooms`.
    pub async fn add_room_members_to_rooms(
        &self,
        source_room: &str,
        dest_rooms: &[&str],
        origin: MutationOrigin,
    ) -> Result<usize, UsageError> {
        let mutation = MembershipMutation::AddMembers {
            source_room: source_room.to_string(),
            dest_rooms: dest_rooms.iter().map(|r| r.to_string()).collect(),
        };
        self.apply(mutation, origin).await
    }

    /// Remove every local member of `source_room` from each of `dest_rooms`.
    pub async fn remove_room_members_from_rooms(
        &self,
        source_room: &str,
        dest_rooms: &[&str],
        origin: MutationOrigin,
    ) -> Result<usize, UsageError> {
        let mutation = MembershipMutation::RemoveMembers {
            source_room: source_room.to_string(),
            dest_rooms: dest_rooms.iter().map(|r| r.to_string()).collect(),
        };
        self.apply(mutation, origin).await
    }

    /// Remove every local member of `source_room` from all of its rooms,
    /// keeping its self-named room and `source_room` unless `options` say
    /// otherwise.
    pub async fn leave_all_rooms(
        &self,
        source_room: &str,
        options: LeaveAllOptions,
        origin: MutationOrigin,
    ) -> Result<usize, UsageError> {
        let mutation = MembershipMutation::LeaveAll {
            source_room: source_room.to_string(),
            options,
        };
        self.apply(mutation, origin).await
    }

    /// Apply a membership mutation, mirroring it when it is local.
    ///
    /// Returns the number of local members of the source room. The mirror
    /// is invoked after the lock is released and is not awaited.
    pub async fn apply(
        &self,
        mutation: MembershipMutation,
        origin: MutationOrigin,
    ) -> Result<usize, UsageError> {
        validate_room_name(mutation.source_room())?;
        if let MembershipMutation::AddMembers { dest_rooms, .. }
        | MembershipMutation::RemoveMembers { dest_rooms, .. } = &mutation
        {
            for room in dest_rooms {
                validate_room_name(room)?;
            }
        }

        let touched = self.state.write().await.apply(&mutation);
        tracing::debug!(
            room = mutation.source_room(),
            ?origin,
            members = touched,
            "membership mutation applied"
        );

        if origin.should_mirror() {
            if let Some(mirror) = &self.mirror {
                mirror.mirror(mutation);
            }
        }
        Ok(touched)
    }

    // ════════════════════════════════════════════════════════════════════
    // Queries
    // ════════════════════════════════════════════════════════════════════

    /// Local members of `room`, sorted.
    pub async fn subscribers(&self, room: &str) -> Vec<ConnectionId> {
        let state = self.state.read().await;
        let mut members = state.members_of(room);
        members.sort();
        members
    }

    /// Rooms a connection belongs to, sorted.
    pub async fn rooms_of(&self, target: impl ConnectionTarget) -> Vec<String> {
        let id = target.into_connection_id();
        let state = self.state.read().await;
        state
            .memberships
            .get(&id)
            .map(|rooms| rooms.iter().cloned().collect::<BTreeSet<_>>())
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    /// Whether a connection is a local member of `room`.
    pub async fn is_member(&self, room: &str, target: impl ConnectionTarget) -> bool {
        let id = target.into_connection_id();
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(&id))
    }

    /// Every non-empty room on this node, sorted.
    pub async fn room_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.rooms.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::{Handshake, SessionRef};
    use crate::domain::foundation::SessionId;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn connection(id: &str) -> (Arc<Connection>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = Connection::new(
            ConnectionId::from(id),
            Handshake::new(None),
            SessionRef {
                id: SessionId::new("sess"),
                anonymous: true,
            },
            tx,
        );
        (Arc::new(conn), rx)
    }

    async fn registered(registry: &RoomRegistry, id: &str) -> mpsc::Receiver<OutboundMessage> {
        let (conn, rx) = connection(id);
        registry.register(conn).await;
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[derive(Default)]
    struct RecordingMirror(Mutex<Vec<MembershipMutation>>);

    impl MembershipMirror for RecordingMirror {
        fn mirror(&self, mutation: MembershipMutation) {
            self.0.lock().unwrap().push(mutation);
        }
    }

    #[tokio::test]
    async fn register_joins_self_named_room() {
        let registry = RoomRegistry::new();
        let _rx = registered(&registry, "a").await;

        assert_eq!(registry.rooms_of("a").await, vec!["a"]);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn join_then_leave_removes_membership() {
        let registry = RoomRegistry::new();
        let _rx = registered(&registry, "a").await;

        registry.join(["a"], "lobby").await.unwrap();
        registry.join(["a"], "lobby").await.unwrap();
        assert_eq!(registry.subscribers("lobby").await, vec![ConnectionId::from("a")]);

        registry.leave(["a"], "lobby").await.unwrap();
        assert!(registry.subscribers("lobby").await.is_empty());
        assert!(!registry.room_names().await.contains(&"lobby".to_string()));
    }

    #[tokio::test]
    async fn leave_of_non_member_is_noop() {
        let registry = RoomRegistry::new();
        let _rx = registered(&registry, "a").await;

        registry.leave(["a", "ghost"], "lobby").await.unwrap();
        assert_eq!(registry.room_names().await, vec!["a"]);
    }

    #[tokio::test]
    async fn leave_of_self_named_room_keeps_connection_addressable() {
        let registry = RoomRegistry::new();
        let mut rx = registered(&registry, "a").await;

        registry.leave(["a"], "a").await.unwrap();
        assert!(registry.is_member("a", "a").await);

        let delivered = registry.emit_to(["a"], "ping", json!({})).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut rx), vec![OutboundMessage::event("ping", json!({}))]);
    }

    #[tokio::test]
    async fn remove_room_members_spares_self_named_rooms() {
        let registry = RoomRegistry::new();
        let _rx = registered(&registry, "b").await;
        registry.join(["b"], "team-7").await.unwrap();

        registry
            .remove_room_members_from_rooms("team-7", &["b"], MutationOrigin::Local)
            .await
            .unwrap();
        assert!(registry.is_member("b", "b").await);
    }

    #[tokio::test]
    async fn join_unknown_connection_mutates_nothing() {
        let registry = RoomRegistry::new();
        let _rx = registered(&registry, "a").await;

        let err = registry.join(["a", "ghost"], "lobby").await.unwrap_err();
        assert_eq!(err, UsageError::UnknownConnection("ghost".to_string()));
        assert!(registry.subscribers("lobby").await.is_empty());
    }

    #[tokio::test]
    async fn empty_room_name_is_usage_error() {
        let registry = RoomRegistry::new();
        assert_eq!(
            registry.join(Vec::<&str>::new(), "").await,
            Err(UsageError::EmptyRoomName)
        );
        assert_eq!(
            registry.broadcast("lobby", "", json!({}), None).await,
            Err(UsageError::EmptyEventName)
        );
    }

    #[tokio::test]
    async fn broadcast_skips_omitted_connection() {
        let registry = RoomRegistry::new();
        let mut rx_a = registered(&registry, "a").await;
        let mut rx_b = registered(&registry, "b").await;
        let mut rx_c = registered(&registry, "c").await;
        registry.join(["a", "b"], "lobby").await.unwrap();

        let omit = ConnectionId::from("b");
        let delivered = registry
            .broadcast("lobby", "chat", json!({"msg": "hi"}), Some(&omit))
            .await
            .unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(
            drain(&mut rx_a),
            vec![OutboundMessage::event("chat", json!({"msg": "hi"}))]
        );
        assert!(drain(&mut rx_b).is_empty());
        assert!(drain(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn emit_to_uses_self_named_room() {
        let registry = RoomRegistry::new();
        let mut rx_a = registered(&registry, "a").await;
        let mut rx_b = registered(&registry, "b").await;

        let delivered = registry
            .emit_to(["b", "nobody"], "ping", json!(1))
            .await
            .unwrap();

        assert_eq!(delivered, 1);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![OutboundMessage::event("ping", json!(1))]);
    }

    #[tokio::test]
    async fn unregister_removes_from_every_room() {
        let registry = RoomRegistry::new();
        let _rx = registered(&registry, "a").await;
        registry.join(["a"], "lobby").await.unwrap();
        registry.join(["a"], "team-7").await.unwrap();

        let mut left = registry.unregister(&ConnectionId::from("a")).await;
        left.sort();

        assert_eq!(left, vec!["a", "lobby", "team-7"]);
        assert!(registry.subscribers("lobby").await.is_empty());
        assert!(registry.room_names().await.is_empty());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn remove_room_members_mirrors_local_calls_only() {
        let mirror = Arc::new(RecordingMirror::default());
        let registry = RoomRegistry::with_mirror(mirror.clone());
        let _rx = registered(&registry, "b").await;
        registry.join(["b"], "team-7").await.unwrap();
        registry.join(["b"], "lobby").await.unwrap();

        let touched = registry
            .remove_room_members_from_rooms("team-7", &["lobby"], MutationOrigin::RemoteReplay)
            .await
            .unwrap();
        assert_eq!(touched, 1);
        assert!(!registry.is_member("lobby", "b").await);
        assert!(mirror.0.lock().unwrap().is_empty());

        registry
            .remove_room_members_from_rooms("team-7", &["lobby"], MutationOrigin::Local)
            .await
            .unwrap();
        assert_eq!(
            mirror.0.lock().unwrap().as_slice(),
            &[MembershipMutation::RemoveMembers {
                source_room: "team-7".to_string(),
                dest_rooms: vec!["lobby".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn add_room_members_copies_membership() {
        let registry = RoomRegistry::new();
        let _a = registered(&registry, "a").await;
        let _b = registered(&registry, "b").await;
        registry.join(["a", "b"], "team-7").await.unwrap();

        registry
            .add_room_members_to_rooms("team-7", &["lobby", "ops"], MutationOrigin::Local)
            .await
            .unwrap();

        assert_eq!(registry.subscribers("lobby").await.len(), 2);
        assert_eq!(registry.subscribers("ops").await.len(), 2);
    }

    #[tokio::test]
    async fn leave_all_keeps_socket_and_source_rooms_by_default() {
        let registry = RoomRegistry::new();
        let _rx = registered(&registry, "a").await;
        registry.join(["a"], "team-7").await.unwrap();
        registry.join(["a"], "lobby").await.unwrap();
        registry.join(["a"], "ops").await.unwrap();

        registry
            .leave_all_rooms("team-7", LeaveAllOptions::default(), MutationOrigin::Local)
            .await
            .unwrap();

        assert_eq!(registry.rooms_of("a").await, vec!["a", "team-7"]);
    }

    #[tokio::test]
    async fn leave_all_honors_include_flags() {
        let registry = RoomRegistry::new();
        let _rx = registered(&registry, "a").await;
        registry.join(["a"], "team-7").await.unwrap();
        registry.join(["a"], "lobby").await.unwrap();

        let options = LeaveAllOptions {
            include_socket_rooms: true,
            include_source_room: true,
        };
        registry
            .leave_all_rooms("team-7", options, MutationOrigin::Local)
            .await
            .unwrap();

        assert!(registry.rooms_of("a").await.is_empty());
        assert!(registry.room_names().await.is_empty());
    }

    #[tokio::test]
    async fn mutation_on_unknown_source_room_touches_nothing() {
        let mirror = Arc::new(RecordingMirror::default());
        let registry = RoomRegistry::with_mirror(mirror.clone());

        let touched = registry
            .remove_room_members_from_rooms("nobody-here", &["lobby"], MutationOrigin::Local)
            .await
            .unwrap();

        assert_eq!(touched, 0);
        // Peers may still have members of the source room.
        assert_eq!(mirror.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_joins_are_not_lost() {
        let registry = Arc::new(RoomRegistry::new());
        let mut receivers = Vec::new();
        for i in 0..32 {
            receivers.push(registered(&registry, &format!("c{i}")).await);
        }

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.join([format!("c{i}")], "lobby").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.subscribers("lobby").await.len(), 32);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Join(usize),
        Leave(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..4).prop_map(Op::Join),
            (0usize..4).prop_map(Op::Leave),
        ]
    }

    proptest! {
        #[test]
        fn membership_equals_net_effect_of_calls(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let registry = RoomRegistry::new();
                let mut receivers = Vec::new();
                for i in 0..4 {
                    receivers.push(registered(&registry, &format!("c{i}")).await);
                }

                let mut expected = BTreeSet::new();
                for op in &ops {
                    match op {
                        Op::Join(i) => {
                            registry.join([format!("c{i}")], "room").await.unwrap();
                            expected.insert(ConnectionId::from(format!("c{i}")));
                        }
                        Op::Leave(i) => {
                            registry.leave([format!("c{i}")], "room").await.unwrap();
                            expected.remove(&ConnectionId::from(format!("c{i}")));
                        }
                    }
                }

                let actual: BTreeSet<_> = registry.subscribers("room").await.into_iter().collect();
                prop_assert_eq!(actual, expected);
                Ok(())
            })?;
        }
    }
}
