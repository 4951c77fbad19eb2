//! Pub/sub ports - handles onto the shared channel used by the cluster bus.
//!
//! Connecting to the shared store (credentials, handshake, reconnect policy)
//! is the adapter's job. The cluster bus receives an already-connected
//! publisher and an already-subscribed signal stream.

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Errors from the pub/sub transport.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Pub/sub connection unavailable: {0}")]
    Unavailable(String),
}

/// What an already-subscribed handle yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusSignal {
    /// Raw message received on the subscribed channel.
    Message(Vec<u8>),
    /// Subscription (re-)established.
    Connected,
    /// Subscription lost.
    Disconnected,
}

/// Stream of signals from a subscription.
pub type SignalStream = BoxStream<'static, BusSignal>;

/// Port for publishing onto the shared channel.
///
/// Publishing is fire-and-forget from the bus's point of view: failures
/// are reported but never retried or buffered.
#[async_trait]
pub trait ClusterPublisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), PubSubError>;
}
