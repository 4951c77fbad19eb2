//! Canonical requests built from inbound request frames.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::connection::Handshake;
use crate::domain::foundation::{ConnectionId, DomainError, ErrorCode, SessionId};

/// Malformed inbound frame. Always answered on the same round trip and
/// never dispatched to the router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unsupported request method '{0}'")]
    UnknownMethod(String),

    #[error("Request frame must be a JSON object")]
    NotAnObject,

    #[error("Request frame is missing a url")]
    MissingUrl,

    #[error("Request url must be a string")]
    UrlNotString,

    #[error("Request headers are invalid: {0}")]
    InvalidHeaders(String),

    #[error("Completion callback is malformed: {0}")]
    MalformedCallback(String),
}

impl From<&ParseError> for DomainError {
    fn from(err: &ParseError) -> Self {
        let code = match err {
            ParseError::UnknownMethod(_) => ErrorCode::UnknownMethod,
            _ => ErrorCode::ParseError,
        };
        DomainError::new(code, err.to_string())
    }
}

/// The fixed set of request methods a client may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Options,
        HttpMethod::Head,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownMethod(s.to_string()))
    }
}

/// Fields read from a request frame payload, before any defaults apply.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub url: String,
    pub params: Option<Value>,
    pub data: Option<Value>,
    pub headers: HashMap<String, String>,
}

impl RequestFrame {
    /// Parses a frame payload such as
    /// `{"url": "/items", "params": {...}, "data": {...}, "headers": {...}}`.
    pub fn parse(payload: &Value) -> Result<Self, ParseError> {
        let obj = payload.as_object().ok_or(ParseError::NotAnObject)?;

        let url = match obj.get("url") {
            None | Some(Value::Null) => return Err(ParseError::MissingUrl),
            Some(Value::String(s)) if s.is_empty() => return Err(ParseError::MissingUrl),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ParseError::UrlNotString),
        };

        let headers = match obj.get("headers") {
            None | Some(Value::Null) => HashMap::new(),
            Some(Value::Object(map)) => parse_headers(map)?,
            Some(_) => {
                return Err(ParseError::InvalidHeaders(
                    "headers must be an object".to_string(),
                ))
            }
        };

        Ok(Self {
            url,
            params: non_null(obj.get("params")),
            data: non_null(obj.get("data")),
            headers,
        })
    }

    /// Merges `params` then `data` into one body; `data` wins on conflicts.
    ///
    /// Object fields are merged key by key. A non-object `data` value
    /// replaces the body outright; a non-object `params` value is used only
    /// when no `data` is present.
    pub fn merged_body(&self) -> Value {
        match (&self.params, &self.data) {
            (None, None) => Value::Object(Map::new()),
            (Some(Value::Object(params)), Some(Value::Object(data))) => {
                let mut merged = params.clone();
                for (k, v) in data {
                    merged.insert(k.clone(), v.clone());
                }
                Value::Object(merged)
            }
            (_, Some(data)) => data.clone(),
            (Some(params), None) => params.clone(),
        }
    }
}

fn non_null(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

fn parse_headers(map: &Map<String, Value>) -> Result<HashMap<String, String>, ParseError> {
    let mut headers = HashMap::with_capacity(map.len());
    for (name, value) in map {
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(ParseError::InvalidHeaders(format!(
                    "header '{}' must be a string",
                    name
                )))
            }
        };
        headers.insert(name.to_ascii_lowercase(), rendered);
    }
    Ok(headers)
}

/// Request handed to the external router.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Value,
    pub headers: HashMap<String, String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub is_persistent_connection: bool,
    pub connection_id: ConnectionId,
    pub session_id: SessionId,
}

impl CanonicalRequest {
    /// Builds the canonical request for a parsed frame.
    ///
    /// Headers start from `host` (the configured default) and the
    /// handshake `cookie`, then client-supplied headers override them.
    pub fn build(
        method: HttpMethod,
        frame: RequestFrame,
        handshake: &Handshake,
        default_host: &str,
        connection_id: ConnectionId,
        session_id: SessionId,
    ) -> Self {
        let body = frame.merged_body();

        let mut headers = HashMap::new();
        headers.insert("host".to_string(), default_host.to_string());
        if let Some(cookie) = handshake.cookie() {
            headers.insert("cookie".to_string(), cookie.to_string());
        }
        headers.extend(frame.headers);

        let client = handshake.client_addr();

        Self {
            method,
            url: frame.url,
            body,
            headers,
            ip: client.ip,
            port: client.port,
            is_persistent_connection: true,
            connection_id,
            session_id,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
