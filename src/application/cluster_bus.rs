//! ClusterBus - fan-out of cluster messages over one shared pub/sub channel.
//!
//! ```text
//!   send_message ──► publish {originId: self, ...} ──► peers
//!        └─────────► local listeners (direct, once)
//!
//!   blast ─────────► publish {event, payload} ──► every node, self included
//!
//!   receive ──► decode ──► drop own echo ──► replay membership (RemoteReplay)
//!                                      └───► local listeners
//! ```
//!
//! Publishing is fire-and-forget for callers. Encoded envelopes go onto one
//! queue drained by a single publisher task, so a node's messages reach the
//! channel in the order they were issued. Nothing is retried or
//! acknowledged; a lost message leaves peers eventually consistent at best.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::StreamExt;
use tokio::sync::{mpsc, watch};

use crate::domain::cluster::ClusterMessage;
use crate::domain::foundation::{NodeId, UsageError};
use crate::domain::room::{MembershipMutation, MutationOrigin};
use crate::ports::{BusSignal, ClusterListener, ClusterPublisher, MembershipMirror, SignalStream};

use super::room_registry::RoomRegistry;

/// Snapshot of bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Messages handed to the publisher.
    pub published: u64,
    /// Publishes that failed.
    pub publish_failures: u64,
    /// Raw messages received from the subscription.
    pub received: u64,
    /// Membership messages replayed against the local registry.
    pub applied: u64,
    /// Own suppressed messages dropped on receipt.
    pub echoes_dropped: u64,
    /// Undeserializable or invalid messages dropped on receipt.
    pub malformed_dropped: u64,
}

#[derive(Default)]
struct BusCounters {
    published: AtomicU64,
    publish_failures: AtomicU64,
    received: AtomicU64,
    applied: AtomicU64,
    echoes_dropped: AtomicU64,
    malformed_dropped: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// What happened to one received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Application event delivered to listeners.
    Delivered,
    /// Membership mutation replayed, then delivered to listeners.
    Applied,
    /// This node's own suppressed message.
    EchoDropped,
    /// Could not be decoded or interpreted.
    Malformed,
}

/// An encoded envelope waiting for the publisher task.
struct Outgoing {
    event: String,
    bytes: Vec<u8>,
}

/// FIFO queue in front of the publisher. The drain task is spawned on the
/// first publish, from inside the runtime.
struct Outbox {
    tx: mpsc::UnboundedSender<Outgoing>,
    pending_rx: Mutex<Option<mpsc::UnboundedReceiver<Outgoing>>>,
}

impl Outbox {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            pending_rx: Mutex::new(Some(rx)),
        }
    }
}

/// Cluster bus for one node.
pub struct ClusterBus {
    node_id: NodeId,
    channel: String,
    publisher: Arc<dyn ClusterPublisher>,
    outbox: Outbox,
    listeners: RwLock<Vec<Arc<dyn ClusterListener>>>,
    counters: Arc<BusCounters>,
}

impl ClusterBus {
    /// Create a bus with a freshly generated node id.
    pub fn new(publisher: Arc<dyn ClusterPublisher>, channel: impl Into<String>) -> Self {
        Self::with_node_id(NodeId::generate(), publisher, channel)
    }

    /// Create a bus with a known node id.
    pub fn with_node_id(
        node_id: NodeId,
        publisher: Arc<dyn ClusterPublisher>,
        channel: impl Into<String>,
    ) -> Self {
        let channel = channel.into();
        tracing::info!(node_id = %node_id, channel = %channel, "cluster bus created");
        Self {
            node_id,
            channel,
            publisher,
            outbox: Outbox::new(),
            listeners: RwLock::new(Vec::new()),
            counters: Arc::new(BusCounters::default()),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Attach a generic listener.
    pub fn add_listener(&self, listener: Arc<dyn ClusterListener>) {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::debug!(listener = listener.name(), "cluster listener attached");
        listeners.push(listener);
    }

    /// Suppressed send: publish to peers and deliver once to local listeners.
    pub fn send_message(
        &self,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), UsageError> {
        let event = event.into();
        if event.is_empty() {
            return Err(UsageError::EmptyEventName);
        }
        let message = ClusterMessage::suppressed(self.node_id.clone(), event, payload);
        self.publish_detached(&message);
        self.deliver_local(&message);
        Ok(())
    }

    /// Unsuppressed send: publish only. Every node, this one included,
    /// handles it when it comes back on the subscription.
    pub fn blast(
        &self,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), UsageError> {
        let event = event.into();
        if event.is_empty() {
            return Err(UsageError::EmptyEventName);
        }
        self.publish_detached(&ClusterMessage::unsuppressed(event, payload));
        Ok(())
    }

    /// Current counter values.
    pub fn stats(&self) -> BusStats {
        let c = &self.counters;
        BusStats {
            published: c.published.load(Ordering::Relaxed),
            publish_failures: c.publish_failures.load(Ordering::Relaxed),
            received: c.received.load(Ordering::Relaxed),
            applied: c.applied.load(Ordering::Relaxed),
            echoes_dropped: c.echoes_dropped.load(Ordering::Relaxed),
            malformed_dropped: c.malformed_dropped.load(Ordering::Relaxed),
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn ClusterListener>> {
        match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn deliver_local(&self, message: &ClusterMessage) {
        for listener in self.listeners() {
            listener.on_message(message);
        }
    }

    fn publish_detached(&self, message: &ClusterMessage) {
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                bump(&self.counters.publish_failures);
                tracing::error!(event = %message.event, error = %e, "failed to encode cluster message");
                return;
            }
        };

        if !self.ensure_publisher_task() {
            bump(&self.counters.publish_failures);
            tracing::error!(event = %message.event, "no async runtime to publish cluster message");
            return;
        }

        let outgoing = Outgoing {
            event: message.event.clone(),
            bytes,
        };
        if self.outbox.tx.send(outgoing).is_err() {
            bump(&self.counters.publish_failures);
            tracing::error!(event = %message.event, "cluster publisher task has stopped");
        }
    }

    /// Spawns the drain task unless it is already running.
    fn ensure_publisher_task(&self) -> bool {
        let mut pending = self
            .outbox
            .pending_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if pending.is_none() {
            return true;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let Some(rx) = pending.take() else {
            return true;
        };

        runtime.spawn(drain_outbox(
            rx,
            Arc::clone(&self.publisher),
            self.channel.clone(),
            Arc::clone(&self.counters),
        ));
        true
    }

    /// Handle one raw message from the subscription.
    pub async fn handle_payload(&self, bytes: &[u8], registry: &RoomRegistry) -> ReceiveOutcome {
        bump(&self.counters.received);

        let message = match ClusterMessage::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                bump(&self.counters.malformed_dropped);
                tracing::warn!(node_id = %self.node_id, error = %e, len = bytes.len(), "dropping malformed cluster message");
                return ReceiveOutcome::Malformed;
            }
        };

        if message.origin_id.as_ref() == Some(&self.node_id) {
            bump(&self.counters.echoes_dropped);
            tracing::trace!(node_id = %self.node_id, event = %message.event, "dropping own echo");
            return ReceiveOutcome::EchoDropped;
        }

        let outcome = match message.to_mutation() {
            Ok(Some(mutation)) => match registry.apply(mutation, MutationOrigin::RemoteReplay).await {
                Ok(_) => {
                    bump(&self.counters.applied);
                    ReceiveOutcome::Applied
                }
                Err(e) => {
                    bump(&self.counters.malformed_dropped);
                    tracing::warn!(event = %message.event, error = %e, "dropping unusable membership message");
                    return ReceiveOutcome::Malformed;
                }
            },
            Ok(None) => ReceiveOutcome::Delivered,
            Err(e) => {
                bump(&self.counters.malformed_dropped);
                tracing::warn!(event = %message.event, error = %e, "dropping invalid membership message");
                return ReceiveOutcome::Malformed;
            }
        };

        self.deliver_local(&message);
        outcome
    }

    /// Handle one signal from the subscription.
    pub async fn handle_signal(&self, signal: BusSignal, registry: &RoomRegistry) {
        match signal {
            BusSignal::Message(bytes) => {
                self.handle_payload(&bytes, registry).await;
            }
            BusSignal::Connected => {
                tracing::info!(node_id = %self.node_id, channel = %self.channel, "cluster bus connected");
                for listener in self.listeners() {
                    listener.on_bus_connected();
                }
            }
            BusSignal::Disconnected => {
                tracing::warn!(node_id = %self.node_id, channel = %self.channel, "cluster bus disconnected");
                for listener in self.listeners() {
                    listener.on_bus_disconnected();
                }
            }
        }
    }

    /// Drive the receive side until the stream ends or shutdown is signalled.
    pub async fn run(
        self: Arc<Self>,
        mut signals: SignalStream,
        registry: Arc<RoomRegistry>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(node_id = %self.node_id, "cluster bus stopping");
                        return;
                    }
                }
                signal = signals.next() => {
                    match signal {
                        Some(signal) => self.handle_signal(signal, &registry).await,
                        None => {
                            tracing::warn!(node_id = %self.node_id, "cluster subscription ended");
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Publishes queued envelopes one at a time, in queue order.
async fn drain_outbox(
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    publisher: Arc<dyn ClusterPublisher>,
    channel: String,
    counters: Arc<BusCounters>,
) {
    while let Some(Outgoing { event, bytes }) = rx.recv().await {
        match publisher.publish(&channel, bytes).await {
            Ok(()) => bump(&counters.published),
            Err(e) => {
                bump(&counters.publish_failures);
                tracing::warn!(channel = %channel, event = %event, error = %e, "cluster publish failed");
            }
        }
    }
    tracing::debug!(channel = %channel, "cluster publisher task stopped");
}

impl MembershipMirror for ClusterBus {
    fn mirror(&self, mutation: MembershipMutation) {
        let message = ClusterMessage::from_mutation(self.node_id.clone(), &mutation);
        self.publish_detached(&message);
        self.deliver_local(&message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::{JOIN_EVENT, LEAVE_EVENT};
    use crate::domain::connection::{Connection, Handshake, OutboundMessage, SessionRef};
    use crate::domain::foundation::{ConnectionId, SessionId};
    use crate::ports::PubSubError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingPublisher {
        fn messages(&self) -> Vec<ClusterMessage> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, bytes)| ClusterMessage::decode(bytes).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl ClusterPublisher for RecordingPublisher {
        async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), PubSubError> {
            self.sent.lock().unwrap().push((channel.to_string(), payload));
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl ClusterPublisher for FailingPublisher {
        async fn publish(&self, _: &str, _: Vec<u8>) -> Result<(), PubSubError> {
            Err(PubSubError::Publish("connection reset".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<ClusterMessage>>,
        connects: AtomicU64,
        disconnects: AtomicU64,
    }

    impl ClusterListener for RecordingListener {
        fn on_message(&self, message: &ClusterMessage) {
            self.seen.lock().unwrap().push(message.clone());
        }
        fn on_bus_connected(&self) {
            bump(&self.connects);
        }
        fn on_bus_disconnected(&self) {
            bump(&self.disconnects);
        }
        fn name(&self) -> &'static str {
            "RecordingListener"
        }
    }

    fn bus_with(publisher: Arc<dyn ClusterPublisher>) -> (ClusterBus, Arc<RecordingListener>) {
        let bus = ClusterBus::with_node_id(NodeId::new("node-a"), publisher, "test:cluster");
        let listener = Arc::new(RecordingListener::default());
        bus.add_listener(listener.clone());
        (bus, listener)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn member(registry: &RoomRegistry, id: &str, rooms: &[&str]) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(8);
        let conn = Connection::new(
            ConnectionId::from(id),
            Handshake::new(None),
            SessionRef { id: SessionId::new("s"), anonymous: true },
            tx,
        );
        registry.register(Arc::new(conn)).await;
        for room in rooms {
            registry.join([id], room).await.unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn send_message_publishes_with_origin_and_delivers_locally_once() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (bus, listener) = bus_with(publisher.clone());

        bus.send_message("deploy", json!({"v": 3})).unwrap();
        settle().await;

        let published = publisher.messages();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].origin_id, Some(NodeId::new("node-a")));
        assert_eq!(publisher.sent.lock().unwrap()[0].0, "test:cluster");
        assert_eq!(listener.seen.lock().unwrap().len(), 1);
        assert_eq!(bus.stats().published, 1);
    }

    #[tokio::test]
    async fn blast_publishes_without_origin_and_skips_local_delivery() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (bus, listener) = bus_with(publisher.clone());

        bus.blast("reload", json!(null)).unwrap();
        settle().await;

        assert_eq!(publisher.messages()[0].origin_id, None);
        assert!(listener.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_event_name_is_rejected() {
        let (bus, _) = bus_with(Arc::new(RecordingPublisher::default()));
        assert_eq!(bus.send_message("", json!({})), Err(UsageError::EmptyEventName));
        assert_eq!(bus.blast("", json!({})), Err(UsageError::EmptyEventName));
    }

    #[tokio::test]
    async fn own_echo_is_dropped_without_mutating() {
        let (bus, listener) = bus_with(Arc::new(RecordingPublisher::default()));
        let registry = RoomRegistry::new();
        let _rx = member(&registry, "b", &["team-7", "lobby"]).await;

        let echo = ClusterMessage::suppressed(
            NodeId::new("node-a"),
            LEAVE_EVENT,
            json!({"sourceRoom": "team-7", "destRooms": ["lobby"]}),
        );
        let outcome = bus.handle_payload(&echo.encode().unwrap(), &registry).await;

        assert_eq!(outcome, ReceiveOutcome::EchoDropped);
        assert!(registry.is_member("lobby", "b").await);
        assert!(listener.seen.lock().unwrap().is_empty());
        assert_eq!(bus.stats().echoes_dropped, 1);
    }

    #[tokio::test]
    async fn remote_leave_is_replayed_without_mirroring() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (bus, listener) = bus_with(publisher.clone());
        let bus = Arc::new(bus);
        let registry = RoomRegistry::with_mirror(bus.clone());
        let _rx = member(&registry, "b", &["team-7", "lobby"]).await;

        let remote = ClusterMessage::suppressed(
            NodeId::new("node-x"),
            LEAVE_EVENT,
            json!({"sourceRoom": "team-7", "destRooms": ["lobby"]}),
        );
        let outcome = bus.handle_payload(&remote.encode().unwrap(), &registry).await;
        settle().await;

        assert_eq!(outcome, ReceiveOutcome::Applied);
        assert!(!registry.is_member("lobby", "b").await);
        assert!(publisher.messages().is_empty());
        assert_eq!(listener.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsuppressed_message_is_applied_even_on_sender() {
        let (bus, listener) = bus_with(Arc::new(RecordingPublisher::default()));
        let registry = RoomRegistry::new();
        let _rx = member(&registry, "b", &["team-7"]).await;

        let message = ClusterMessage::unsuppressed(
            JOIN_EVENT,
            json!({"sourceRoom": "team-7", "destRooms": ["lobby"]}),
        );
        let outcome = bus.handle_payload(&message.encode().unwrap(), &registry).await;

        assert_eq!(outcome, ReceiveOutcome::Applied);
        assert!(registry.is_member("lobby", "b").await);
        assert_eq!(listener.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped() {
        let (bus, listener) = bus_with(Arc::new(RecordingPublisher::default()));
        let registry = RoomRegistry::new();

        assert_eq!(
            bus.handle_payload(b"not json", &registry).await,
            ReceiveOutcome::Malformed
        );
        let bad = ClusterMessage::unsuppressed(LEAVE_EVENT, json!({"destRooms": ["lobby"]}));
        assert_eq!(
            bus.handle_payload(&bad.encode().unwrap(), &registry).await,
            ReceiveOutcome::Malformed
        );

        assert!(listener.seen.lock().unwrap().is_empty());
        let stats = bus.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.malformed_dropped, 2);
    }

    #[tokio::test]
    async fn local_mutation_is_mirrored_as_suppressed_message() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (bus, listener) = bus_with(publisher.clone());
        let bus = Arc::new(bus);
        let registry = RoomRegistry::with_mirror(bus.clone());

        registry
            .remove_room_members_from_rooms("team-7", &["lobby"], MutationOrigin::Local)
            .await
            .unwrap();
        settle().await;

        let published = publisher.messages();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event, LEAVE_EVENT);
        assert_eq!(published[0].origin_id, Some(NodeId::new("node-a")));
        assert_eq!(published[0].payload["sourceRoom"], "team-7");
        assert_eq!(listener.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_failures_are_counted_not_raised() {
        let (bus, _) = bus_with(Arc::new(FailingPublisher));

        bus.send_message("deploy", json!({})).unwrap();
        settle().await;

        let stats = bus.stats();
        assert_eq!(stats.published, 0);
        assert_eq!(stats.publish_failures, 1);
    }

    /// Stalls on its first publish so later publishes could overtake it.
    #[derive(Default)]
    struct SlowFirstPublisher {
        calls: AtomicU64,
        wire: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClusterPublisher for SlowFirstPublisher {
        async fn publish(&self, _: &str, payload: Vec<u8>) -> Result<(), PubSubError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            let message = ClusterMessage::decode(&payload).unwrap();
            self.wire.lock().unwrap().push(message.event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn mirrored_mutations_reach_the_wire_in_issue_order() {
        let publisher = Arc::new(SlowFirstPublisher::default());
        let (bus, _) = bus_with(publisher.clone());
        let registry = RoomRegistry::with_mirror(Arc::new(bus));

        registry
            .add_room_members_to_rooms("team-7", &["lobby"], MutationOrigin::Local)
            .await
            .unwrap();
        registry
            .remove_room_members_from_rooms("team-7", &["lobby"], MutationOrigin::Local)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(*publisher.wire.lock().unwrap(), vec![JOIN_EVENT, LEAVE_EVENT]);
    }

    #[test]
    fn publish_without_runtime_is_counted_as_failure() {
        let (bus, listener) = bus_with(Arc::new(RecordingPublisher::default()));

        bus.send_message("deploy", json!({})).unwrap();

        assert_eq!(bus.stats().publish_failures, 1);
        assert_eq!(listener.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_surfaces_connection_signals_and_stops_on_shutdown() {
        let (bus, listener) = bus_with(Arc::new(RecordingPublisher::default()));
        let bus = Arc::new(bus);
        let registry = Arc::new(RoomRegistry::new());
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(signal_rx).boxed();
        let handle = tokio::spawn(bus.clone().run(stream, registry, shutdown_rx));

        signal_tx.send(BusSignal::Connected).unwrap();
        signal_tx.send(BusSignal::Disconnected).unwrap();
        signal_tx.send(BusSignal::Connected).unwrap();
        settle().await;

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(listener.connects.load(Ordering::Relaxed), 2);
        assert_eq!(listener.disconnects.load(Ordering::Relaxed), 1);
    }
}
