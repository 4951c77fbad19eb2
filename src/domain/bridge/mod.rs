//! Bridge module - request/response types for frames on persistent
//! connections.
//!
//! ```text
//! frame {method, url, params, data, headers} + callback
//!        │
//!        ▼  RequestFrame::parse
//! CanonicalRequest {method, url, body, headers, ip, port, ...}
//!        │
//!        ▼  router
//! ResponseSink::send(body) ──► ResponseEnvelope {body, headers?, statusCode?}
//!                              (bare body for legacy clients)
//! ```

mod request;
mod response;
mod version;

pub use request::{CanonicalRequest, HttpMethod, ParseError, RequestFrame};
pub use response::{Completion, FrameCallback, ResponseEnvelope, ResponseShape, ResponseSink};
pub use version::SdkVersion;
