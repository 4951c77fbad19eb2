//! WebSocket upgrade handler - the reference transport.
//!
//! Manages the connection lifecycle:
//! 1. Build the handshake from headers, query and peer address
//! 2. Run admission (rejected attempts never upgrade)
//! 3. Bind a session
//! 4. Upgrade, register the connection and send `connected`
//! 5. Feed request frames through the bridge until disconnect
//! 6. Tear down: leave every room and close

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use http::{HeaderMap, StatusCode};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::application::{
    BoundSession, ConnectionAdmission, RequestBridge, RoomRegistry, SessionBinder,
};
use crate::domain::connection::{Connection, Handshake, OutboundMessage, SessionRef};
use crate::domain::foundation::{ConnectionId, DomainError, Timestamp};

use super::messages::{encode, ClientFrame};

/// State shared by every websocket connection on this node.
#[derive(Clone)]
pub struct RelayState {
    pub admission: Arc<ConnectionAdmission>,
    pub sessions: Arc<SessionBinder>,
    pub bridge: Arc<RequestBridge>,
    pub registry: Arc<RoomRegistry>,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
}

/// Collects the handshake from the upgrade request.
pub fn handshake_from_parts(
    headers: &HeaderMap,
    query: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
) -> Handshake {
    let mut handshake = Handshake::new(remote_addr);
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            handshake.insert_header(name.as_str(), value);
        }
    }
    for (name, value) in query {
        handshake = handshake.with_query(name, value);
    }
    handshake
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<RelayState>,
) -> Response {
    let handshake = handshake_from_parts(&headers, query, connect_info.map(|ci| ci.0));

    if let Err(rejected) = state.admission.admit(&handshake).await {
        let body = DomainError::from(&rejected).to_body();
        return (StatusCode::FORBIDDEN, axum::Json(body)).into_response();
    }

    let bound = state.sessions.bind(&handshake).await;

    ws.on_upgrade(move |socket| handle_socket(socket, handshake, bound, state))
}

/// Handle an established WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    handshake: Handshake,
    bound: BoundSession,
    state: RelayState,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.outbound_buffer);

    let connection = Arc::new(Connection::new(
        ConnectionId::new(),
        handshake,
        SessionRef::from(&bound.session),
        tx,
    ));
    let connection_id = connection.id().clone();
    state.registry.register(Arc::clone(&connection)).await;
    tracing::info!(
        connection_id = %connection_id,
        session_id = %bound.session.id(),
        session_source = ?bound.source,
        "connection established"
    );

    connection.send(OutboundMessage::Connected {
        connection_id: connection_id.to_string(),
        timestamp: Timestamp::now().to_rfc3339(),
    });

    // Drain the outbound queue onto the socket
    let mut send_task = {
        let connection_id = connection_id.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match encode(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(connection_id = %connection_id, error = %e, "failed to encode frame");
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(text)).await {
                    tracing::debug!(connection_id = %connection_id, error = %e, "send error, closing connection");
                    break;
                }
            }
        })
    };

    // Feed request frames through the bridge, in arrival order
    let mut recv_task = {
        let connection = Arc::clone(&connection);
        let mut bridge = state
            .bridge
            .bind(Arc::clone(&connection), bound.session.id().clone());
        tokio::spawn(async move {
            while let Some(result) = receiver.next().await {
                match result {
                    Ok(Message::Text(text)) => match ClientFrame::parse(&text) {
                        Ok(frame) => {
                            let callback = frame.callback(&connection);
                            bridge
                                .handle_frame(&frame.method, &frame.payload, callback)
                                .await;
                        }
                        Err(e) => {
                            let error = DomainError::from(&e);
                            connection.send(OutboundMessage::Error {
                                code: error.code.to_string(),
                                message: error.message,
                            });
                        }
                    },
                    Ok(Message::Binary(_)) => {
                        tracing::warn!(connection_id = %connection.id(), "received unsupported binary message");
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        tracing::debug!(connection_id = %connection.id(), "client sent close frame");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(connection_id = %connection.id(), error = %e, "receive error");
                        break;
                    }
                }
            }
        })
    };

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    teardown(&state.registry, &connection).await;
}

/// Close a connection and remove it from every local room.
pub async fn teardown(registry: &RoomRegistry, connection: &Connection) {
    connection.begin_close();
    let rooms = registry.unregister(connection.id()).await;
    connection.mark_closed();
    tracing::info!(
        connection_id = %connection.id(),
        rooms = rooms.len(),
        dropped = connection.drop_count(),
        "connection closed"
    );
}

/// Create the axum router for the websocket endpoint.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so
/// the peer address reaches the handshake.
pub fn relay_router(state: RelayState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
