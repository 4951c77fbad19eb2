//! RequestBridge - turns request frames into canonical requests for the
//! external router and carries the router's reply back.
//!
//! One [`BridgeSession`] per connection. Frames on a connection are handled
//! in arrival order; each connection runs on its own task, so a slow router
//! call on one connection never holds up another.
//!
//! ```text
//! Idle ──frame──► AwaitingHandler(method) ──parsed──► Dispatched ──routed──► Idle
//!                          │
//!                          └──parse error──► error reply ──► Idle
//! ```

use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{BridgeConfig, ValidationError};
use crate::domain::bridge::{
    CanonicalRequest, FrameCallback, HttpMethod, ParseError, RequestFrame, ResponseShape,
    ResponseSink, SdkVersion,
};
use crate::domain::connection::{Connection, OutboundMessage};
use crate::domain::foundation::{DomainError, SessionId};
use crate::ports::RequestRouter;

/// Status attached to parse-error replies.
const PARSE_ERROR_STATUS: u16 = 400;

/// Resolved bridge settings.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub include_headers: bool,
    pub include_status: bool,
    pub legacy_threshold: SdkVersion,
    pub default_host: String,
}

impl BridgeSettings {
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            include_headers: config.include_response_headers,
            include_status: config.include_status_code,
            legacy_threshold: config.legacy_threshold()?,
            default_host: config.default_host.clone(),
        })
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            include_headers: true,
            include_status: true,
            legacy_threshold: SdkVersion::new(0, 11, 0),
            default_host: "localhost".to_string(),
        }
    }
}

/// Per-connection bridge state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    AwaitingHandler(String),
    Dispatched(HttpMethod),
}

/// What became of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Handed to the router.
    Dispatched,
    /// Answered with a parse error; the router never saw it.
    Rejected(ParseError),
}

/// Shared entry point: holds the router and settings for every connection.
pub struct RequestBridge {
    router: Arc<dyn RequestRouter>,
    settings: Arc<BridgeSettings>,
}

impl RequestBridge {
    pub fn new(router: Arc<dyn RequestRouter>, settings: BridgeSettings) -> Self {
        Self {
            router,
            settings: Arc::new(settings),
        }
    }

    pub fn from_config(
        router: Arc<dyn RequestRouter>,
        config: &BridgeConfig,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(router, BridgeSettings::from_config(config)?))
    }

    /// Bind the bridge to a connection.
    pub fn bind(&self, connection: Arc<Connection>, session_id: SessionId) -> BridgeSession {
        let legacy_client = self.is_legacy(&connection);
        BridgeSession {
            router: Arc::clone(&self.router),
            shape: ResponseShape {
                include_headers: self.settings.include_headers,
                include_status: self.settings.include_status,
                legacy_client,
            },
            settings: Arc::clone(&self.settings),
            connection,
            session_id,
            state: BridgeState::Idle,
        }
    }

    fn is_legacy(&self, connection: &Connection) -> bool {
        let Some(raw) = connection.handshake().sdk_version() else {
            return false;
        };
        match raw.parse::<SdkVersion>() {
            Ok(version) => version < self.settings.legacy_threshold,
            Err(e) => {
                tracing::debug!(connection_id = %connection.id(), sdk_version = raw, error = %e, "unparseable sdk version, treating client as current");
                false
            }
        }
    }
}

/// The bridge bound to one connection.
pub struct BridgeSession {
    router: Arc<dyn RequestRouter>,
    settings: Arc<BridgeSettings>,
    shape: ResponseShape,
    connection: Arc<Connection>,
    session_id: SessionId,
    state: BridgeState,
}

impl BridgeSession {
    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    pub fn is_legacy_client(&self) -> bool {
        self.shape.legacy_client
    }

    /// Handle one request frame tagged with `method`.
    pub async fn handle_frame(
        &mut self,
        method: &str,
        payload: &Value,
        callback: FrameCallback,
    ) -> FrameOutcome {
        self.state = BridgeState::AwaitingHandler(method.to_string());
        let outcome = match self.prepare(method, payload, &callback) {
            Ok(request) => {
                self.dispatch(request, callback).await;
                FrameOutcome::Dispatched
            }
            Err(e) => {
                self.reject(&e, &callback);
                FrameOutcome::Rejected(e)
            }
        };
        self.state = BridgeState::Idle;
        outcome
    }

    fn prepare(
        &self,
        method: &str,
        payload: &Value,
        callback: &FrameCallback,
    ) -> Result<CanonicalRequest, ParseError> {
        let method = HttpMethod::from_str(method)?;
        if let FrameCallback::Malformed(found) = callback {
            return Err(ParseError::MalformedCallback(found.clone()));
        }
        let frame = RequestFrame::parse(payload)?;

        Ok(CanonicalRequest::build(
            method,
            frame,
            self.connection.handshake(),
            &self.settings.default_host,
            self.connection.id().clone(),
            self.session_id.clone(),
        ))
    }

    async fn dispatch(&mut self, request: CanonicalRequest, callback: FrameCallback) {
        self.state = BridgeState::Dispatched(request.method);
        let completion = callback.completion().cloned();
        let sink = ResponseSink::new(completion.clone(), self.shape);

        tracing::debug!(
            connection_id = %self.connection.id(),
            method = %request.method,
            url = %request.url,
            "dispatching request"
        );
        self.router.route(request, sink).await;

        if completion.is_some_and(|c| !c.is_spent()) {
            tracing::debug!(connection_id = %self.connection.id(), "router finished without responding");
        }
    }

    fn reject(&self, error: &ParseError, callback: &FrameCallback) {
        tracing::info!(connection_id = %self.connection.id(), error = %error, "rejecting request frame");
        let body = DomainError::from(error).to_body();

        match callback.completion() {
            Some(completion) => {
                let sink = ResponseSink::new(Some(completion.clone()), self.shape);
                sink.set_status(PARSE_ERROR_STATUS);
                sink.send(body);
            }
            None => {
                let code = DomainError::from(error).code.to_string();
                self.connection.send(OutboundMessage::Error {
                    code,
                    message: error.to_string(),
                });
            }
        }
    }
}
