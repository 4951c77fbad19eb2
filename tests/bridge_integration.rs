//! Integration tests for a single node: frames decoded off the wire, pushed
//! through the request bridge, and room traffic delivered to connections.
//!
//! The websocket itself is replaced by the connection's outbound queue, so
//! these tests see exactly what the send task would write.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use room_relay::adapters::websocket::{teardown, ClientFrame};
use room_relay::application::{BridgeSettings, FrameOutcome, RequestBridge, RoomRegistry};
use room_relay::domain::bridge::{CanonicalRequest, HttpMethod, ParseError, ResponseSink};
use room_relay::domain::connection::{
    Connection, Handshake, OutboundMessage, SessionRef, SDK_VERSION_PARAM,
};
use room_relay::domain::foundation::{ConnectionId, SessionId};
use room_relay::ports::RequestRouter;

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Router that records requests and answers `{"ok": true}` unless silent.
#[derive(Default)]
struct TestRouter {
    requests: Mutex<Vec<CanonicalRequest>>,
    silent: bool,
}

impl TestRouter {
    fn requests(&self) -> Vec<CanonicalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestRouter for TestRouter {
    async fn route(&self, request: CanonicalRequest, sink: ResponseSink) {
        self.requests.lock().unwrap().push(request);
        if self.silent {
            return;
        }
        sink.set_status(200);
        sink.send(json!({"ok": true}));
        // A second send must be ignored.
        sink.send(json!({"ok": false}));
    }
}

struct Client {
    connection: Arc<Connection>,
    outbound: mpsc::Receiver<OutboundMessage>,
}

impl Client {
    fn drain(&mut self) -> Vec<OutboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }
}

async fn connect(registry: &RoomRegistry, id: &str, handshake: Handshake) -> Client {
    let (tx, rx) = mpsc::channel(16);
    let connection = Arc::new(Connection::new(
        ConnectionId::from(id),
        handshake,
        SessionRef {
            id: SessionId::new(format!("session-{id}")),
            anonymous: false,
        },
        tx,
    ));
    registry.register(connection.clone()).await;
    Client {
        connection,
        outbound: rx,
    }
}

fn bridge(router: Arc<TestRouter>) -> RequestBridge {
    RequestBridge::new(router, BridgeSettings::default())
}

// =============================================================================
// Rooms
// =============================================================================

#[tokio::test]
async fn lobby_member_receives_exactly_one_chat_event() {
    let registry = RoomRegistry::new();
    let mut a = connect(&registry, "a", Handshake::new(None)).await;
    registry.join(["a"], "lobby").await.unwrap();

    registry
        .broadcast("lobby", "chat", json!({"msg": "hi"}), None)
        .await
        .unwrap();

    assert_eq!(
        a.drain(),
        vec![OutboundMessage::event("chat", json!({"msg": "hi"}))]
    );
}

#[tokio::test]
async fn broadcast_can_omit_the_sender() {
    let registry = RoomRegistry::new();
    let mut a = connect(&registry, "a", Handshake::new(None)).await;
    let mut b = connect(&registry, "b", Handshake::new(None)).await;
    registry.join(["a", "b"], "lobby").await.unwrap();

    let delivered = registry
        .broadcast("lobby", "typing", json!({}), Some(a.connection.id()))
        .await
        .unwrap();

    assert_eq!(delivered, 1);
    assert!(a.drain().is_empty());
    assert_eq!(b.drain().len(), 1);
}

#[tokio::test]
async fn teardown_removes_connection_from_every_room() {
    let registry = RoomRegistry::new();
    let a = connect(&registry, "a", Handshake::new(None)).await;
    let _b = connect(&registry, "b", Handshake::new(None)).await;
    registry.join(["a", "b"], "lobby").await.unwrap();
    registry.join(["a"], "team-7").await.unwrap();

    teardown(&registry, &a.connection).await;

    assert_eq!(registry.subscribers("lobby").await, vec![ConnectionId::from("b")]);
    assert!(registry.subscribers("team-7").await.is_empty());
    assert!(registry.connection(a.connection.id()).await.is_none());
    assert!(!a.connection.is_open());
}

// =============================================================================
// Request bridge
// =============================================================================

#[tokio::test]
async fn get_frame_without_ack_dispatches_params_as_body() {
    let registry = RoomRegistry::new();
    let router = Arc::new(TestRouter::default());
    let mut a = connect(&registry, "a", Handshake::new(None)).await;
    let mut session = bridge(router.clone()).bind(a.connection.clone(), SessionId::new("s-a"));

    let frame = ClientFrame::parse(r#"{"method":"get","url":"/items","params":{"id":1}}"#).unwrap();
    let callback = frame.callback(&a.connection);
    let outcome = session.handle_frame(&frame.method, &frame.payload, callback).await;

    assert_eq!(outcome, FrameOutcome::Dispatched);
    let requests = router.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, HttpMethod::Get);
    assert_eq!(requests[0].url, "/items");
    assert_eq!(requests[0].body, json!({"id": 1}));
    assert!(requests[0].is_persistent_connection);
    assert_eq!(requests[0].connection_id, ConnectionId::from("a"));

    // Router answered, but with no callback nothing goes back on the wire.
    assert!(a.drain().is_empty());
}

#[tokio::test]
async fn acked_frame_gets_exactly_one_reply() {
    let registry = RoomRegistry::new();
    let router = Arc::new(TestRouter::default());
    let handshake = Handshake::new(None).with_header("Cookie", "relay.sid=abc");
    let mut a = connect(&registry, "a", handshake).await;
    let mut session = bridge(router.clone()).bind(a.connection.clone(), SessionId::new("s-a"));

    let frame = ClientFrame::parse(
        r#"{"method":"post","url":"/todos","data":{"title":"x"},"headers":{"X-Trace":"t1"},"ack":7}"#,
    )
    .unwrap();
    let callback = frame.callback(&a.connection);
    session.handle_frame(&frame.method, &frame.payload, callback).await;

    let request = &router.requests()[0];
    assert_eq!(request.header("cookie"), Some("relay.sid=abc"));
    assert_eq!(request.header("x-trace"), Some("t1"));

    let replies = a.drain();
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        OutboundMessage::Ack { ack, body } => {
            assert_eq!(*ack, 7);
            assert_eq!(body["body"], json!({"ok": true}));
        }
        other => panic!("expected ack, got {other:?}"),
    }
}

#[tokio::test]
async fn legacy_client_gets_bare_body() {
    let registry = RoomRegistry::new();
    let router = Arc::new(TestRouter::default());
    let handshake = Handshake::new(None).with_query(SDK_VERSION_PARAM, "0.9.0");
    let mut a = connect(&registry, "a", handshake).await;
    let mut session = bridge(router).bind(a.connection.clone(), SessionId::new("s-a"));
    assert!(session.is_legacy_client());

    let frame = ClientFrame::parse(r#"{"method":"get","url":"/ping","ack":1}"#).unwrap();
    let callback = frame.callback(&a.connection);
    session.handle_frame(&frame.method, &frame.payload, callback).await;

    assert_eq!(
        a.drain(),
        vec![OutboundMessage::Ack {
            ack: 1,
            body: json!({"ok": true})
        }]
    );
}

#[tokio::test]
async fn frame_missing_url_is_rejected_through_callback() {
    let registry = RoomRegistry::new();
    let router = Arc::new(TestRouter::default());
    let mut a = connect(&registry, "a", Handshake::new(None)).await;
    let mut session = bridge(router.clone()).bind(a.connection.clone(), SessionId::new("s-a"));

    let frame = ClientFrame::parse(r#"{"method":"get","ack":2}"#).unwrap();
    let callback = frame.callback(&a.connection);
    let outcome = session.handle_frame(&frame.method, &frame.payload, callback).await;

    assert_eq!(outcome, FrameOutcome::Rejected(ParseError::MissingUrl));
    assert!(router.requests().is_empty());
    match a.drain().as_slice() {
        [OutboundMessage::Ack { ack: 2, body }] => assert_eq!(body["statusCode"], json!(400)),
        other => panic!("expected one ack, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_method_without_ack_reports_error_frame() {
    let registry = RoomRegistry::new();
    let router = Arc::new(TestRouter::default());
    let mut a = connect(&registry, "a", Handshake::new(None)).await;
    let mut session = bridge(router.clone()).bind(a.connection.clone(), SessionId::new("s-a"));

    let frame = ClientFrame::parse(r#"{"method":"trace","url":"/x"}"#).unwrap();
    let callback = frame.callback(&a.connection);
    let outcome = session.handle_frame(&frame.method, &frame.payload, callback).await;

    assert!(matches!(outcome, FrameOutcome::Rejected(ParseError::UnknownMethod(_))));
    assert!(router.requests().is_empty());
    assert!(matches!(a.drain().as_slice(), [OutboundMessage::Error { .. }]));
}

#[tokio::test]
async fn silent_router_leaves_client_waiting() {
    let registry = RoomRegistry::new();
    let router = Arc::new(TestRouter {
        silent: true,
        ..Default::default()
    });
    let mut a = connect(&registry, "a", Handshake::new(None)).await;
    let mut session = bridge(router.clone()).bind(a.connection.clone(), SessionId::new("s-a"));

    let frame = ClientFrame::parse(r#"{"method":"delete","url":"/todos/1","ack":9}"#).unwrap();
    let callback = frame.callback(&a.connection);
    let outcome = session.handle_frame(&frame.method, &frame.payload, callback).await;

    assert_eq!(outcome, FrameOutcome::Dispatched);
    assert_eq!(router.requests().len(), 1);
    assert!(a.drain().is_empty());
}
