//! Handshake metadata captured when a persistent connection is opened.

use std::collections::HashMap;
use std::net::SocketAddr;

/// Header carrying the originating client address when behind a proxy.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Header carrying the originating client port when behind a proxy.
pub const FORWARDED_PORT_HEADER: &str = "x-forwarded-port";

/// Query parameter the client SDK uses to announce its version.
pub const SDK_VERSION_PARAM: &str = "sdk_version";

/// Headers, query parameters, and transport address of a connection attempt.
///
/// Header names are stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

/// Best-effort client address derived from the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientAddr {
    pub ip: Option<String>,
    pub port: Option<u16>,
}

impl Handshake {
    /// Creates an empty handshake for the given transport address.
    pub fn new(remote_addr: Option<SocketAddr>) -> Self {
        Self {
            headers: HashMap::new(),
            query: HashMap::new(),
            remote_addr,
        }
    }

    /// Adds a header (builder style).
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Adds a query parameter (builder style).
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Inserts a header. A repeated header is appended to the earlier
    /// value: `cookie` values are joined with `; `, others with `, `.
    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.headers.get_mut(&name) {
            Some(existing) => {
                let separator = if name == "cookie" { "; " } else { ", " };
                existing.push_str(separator);
                existing.push_str(&value);
            }
            None => {
                self.headers.insert(name, value);
            }
        }
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers, keyed by lowercase name.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Looks up a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn origin(&self) -> Option<&str> {
        self.header("origin")
    }

    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }

    pub fn cookie(&self) -> Option<&str> {
        self.header("cookie")
    }

    /// Version string announced by the client SDK, if any.
    pub fn sdk_version(&self) -> Option<&str> {
        self.query_param(SDK_VERSION_PARAM)
    }

    /// Raw transport address.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Derives the client address, preferring forwarded headers.
    ///
    /// Order of precedence:
    /// 1. First entry of `X-Forwarded-For` (and `X-Forwarded-Port` if parseable)
    /// 2. Transport socket address
    pub fn client_addr(&self) -> ClientAddr {
        let forwarded_ip = self
            .header(FORWARDED_FOR_HEADER)
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);

        match forwarded_ip {
            Some(ip) => {
                let port = self
                    .header(FORWARDED_PORT_HEADER)
                    .and_then(|p| p.trim().parse().ok())
                    .or_else(|| self.remote_addr.map(|a| a.port()));
                ClientAddr { ip: Some(ip), port }
            }
            None => ClientAddr {
                ip: self.remote_addr.map(|a| a.ip().to_string()),
                port: self.remote_addr.map(|a| a.port()),
            },
        }
    }
}
