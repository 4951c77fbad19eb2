//! Response side of the request bridge: single-use completions and the
//! sink handed to the router.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

type ReplyFn = Box<dyn FnOnce(Value) + Send>;

/// Client-supplied completion callback. Fires at most once; later calls
/// are no-ops.
#[derive(Clone)]
pub struct Completion {
    reply: Arc<Mutex<Option<ReplyFn>>>,
}

impl Completion {
    pub fn new(reply: impl FnOnce(Value) + Send + 'static) -> Self {
        Self {
            reply: Arc::new(Mutex::new(Some(Box::new(reply)))),
        }
    }

    /// Invokes the callback. Returns `false` if it had already fired.
    pub fn fire(&self, body: Value) -> bool {
        let reply = self
            .reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match reply {
            Some(reply) => {
                reply(body);
                true
            }
            None => false,
        }
    }

    pub fn is_spent(&self) -> bool {
        self.reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("spent", &self.is_spent())
            .finish()
    }
}

/// The callback argument that accompanied a frame.
#[derive(Debug, Clone)]
pub enum FrameCallback {
    /// No callback was supplied.
    Absent,
    /// Something was supplied but it cannot be used as a callback.
    Malformed(String),
    Present(Completion),
}

impl FrameCallback {
    pub fn completion(&self) -> Option<&Completion> {
        match self {
            FrameCallback::Present(c) => Some(c),
            _ => None,
        }
    }
}

/// Structured response written back to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// How the sink shapes what it sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseShape {
    pub include_headers: bool,
    pub include_status: bool,
    /// Client predates envelopes; send the bare body.
    pub legacy_client: bool,
}

/// Response sink handed to the router with each canonical request.
///
/// Status and headers are a side channel: set them before calling
/// [`ResponseSink::send`]. Whether they reach the client depends on the
/// configured [`ResponseShape`].
#[derive(Debug)]
pub struct ResponseSink {
    completion: Option<Completion>,
    shape: ResponseShape,
    status: Mutex<Option<u16>>,
    headers: Mutex<HashMap<String, String>>,
}

impl ResponseSink {
    pub fn new(completion: Option<Completion>, shape: ResponseShape) -> Self {
        Self {
            completion,
            shape,
            status: Mutex::new(None),
            headers: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_status(&self, status: u16) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    pub fn has_callback(&self) -> bool {
        self.completion.is_some()
    }

    /// Whether a response has already been delivered.
    pub fn is_sent(&self) -> bool {
        self.completion.as_ref().is_some_and(Completion::is_spent)
    }

    /// Builds what would be delivered for `body` under this sink's shape.
    pub fn render(&self, body: Value) -> Value {
        if self.shape.legacy_client {
            return body;
        }

        let status = *self.status.lock().unwrap_or_else(PoisonError::into_inner);
        let headers = self
            .headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let envelope = ResponseEnvelope {
            body,
            headers: self.shape.include_headers.then_some(headers),
            status_code: if self.shape.include_status {
                Some(status.unwrap_or(200))
            } else {
                None
            },
        };
        serde_json::to_value(envelope).unwrap_or(Value::Null)
    }

    /// Sends `body` to the client.
    ///
    /// Returns `true` only when the callback fired. Without a callback, or
    /// after a first send, this is a no-op.
    pub fn send(&self, body: Value) -> bool {
        let Some(completion) = &self.completion else {
            tracing::trace!("response discarded: frame carried no callback");
            return false;
        };
        if completion.is_spent() {
            tracing::debug!("response discarded: callback already fired");
            return false;
        }
        completion.fire(self.render(body))
    }
}
