//! In-memory pub/sub hub.
//!
//! Every subscriber of a channel receives every message published on it,
//! the publisher's own subscription included, which mirrors how a shared
//! Redis channel behaves. Used by tests and single-process deployments
//! running several nodes in one process.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::ports::{BusSignal, ClusterPublisher, PubSubError, SignalStream};

const DEFAULT_CAPACITY: usize = 1024;

pub struct InMemoryPubSub {
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    capacity: usize,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Hub whose per-channel buffer holds `capacity` messages. Slow
    /// subscribers that fall further behind lose the oldest messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to `channel`. The stream opens with [`BusSignal::Connected`].
    pub fn subscribe(&self, channel: &str) -> SignalStream {
        let rx = self.sender(channel).subscribe();
        let channel = channel.to_string();

        let messages = BroadcastStream::new(rx).filter_map(move |item| {
            let channel = channel.clone();
            async move {
                match item {
                    Ok(bytes) => Some(BusSignal::Message(bytes)),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %channel, skipped, "subscriber lagged, messages lost");
                        None
                    }
                }
            }
        });

        futures::stream::once(async { BusSignal::Connected })
            .chain(messages)
            .boxed()
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.sender(channel).receiver_count()
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterPublisher for InMemoryPubSub {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), PubSubError> {
        // No subscribers is not an error on a shared channel.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }
}
