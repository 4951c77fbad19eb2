//! RequestRouter port - the external router that executes bridged requests.

use async_trait::async_trait;

use crate::domain::bridge::{CanonicalRequest, ResponseSink};

/// Port for the HTTP-semantics router.
///
/// The router is solely responsible for producing a response body and
/// delivering it through `sink.send`. Status and headers may be set on the
/// sink beforehand. The bridge tolerates routers that never respond and
/// routers that respond more than once (extra sends are ignored).
#[async_trait]
pub trait RequestRouter: Send + Sync {
    async fn route(&self, request: CanonicalRequest, sink: ResponseSink);
}
