//! Redis pub/sub adapter.
//!
//! Publishing goes through a shared `MultiplexedConnection`. Subscribing
//! needs a dedicated connection, so [`RedisSubscription`] runs a task that
//! owns it, forwards messages as [`BusSignal`]s and re-subscribes after the
//! connection drops.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{MultiplexedConnection, PubSub};
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::RedisConfig;
use crate::ports::{BusSignal, ClusterPublisher, PubSubError, SignalStream};

/// Open a client for `config.url`.
pub fn client(config: &RedisConfig) -> Result<redis::Client, PubSubError> {
    redis::Client::open(config.url.as_str())
        .map_err(|e: redis::RedisError| PubSubError::Unavailable(e.to_string()))
}

/// Publishes cluster envelopes with `PUBLISH`.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: MultiplexedConnection,
}

impl RedisPublisher {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Connect using `config`, failing after `config.timeout()`.
    pub async fn connect(config: &RedisConfig) -> Result<Self, PubSubError> {
        let client = client(config)?;
        let conn = tokio::time::timeout(
            config.timeout(),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| PubSubError::Unavailable("connect timed out".to_string()))?
        .map_err(|e: redis::RedisError| PubSubError::Unavailable(e.to_string()))?;

        Ok(Self::new(conn))
    }
}

#[async_trait]
impl ClusterPublisher for RedisPublisher {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), PubSubError> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e: redis::RedisError| PubSubError::Publish(e.to_string()))?;
        Ok(())
    }
}

/// Dedicated subscription to the cluster channel.
///
/// [`RedisSubscription::into_stream`] spawns a task that owns the pub/sub
/// connection. The stream yields `Connected` each time the subscription is
/// (re-)established and `Disconnected` when it drops. The task exits once
/// the stream is dropped.
pub struct RedisSubscription {
    client: redis::Client,
    channel: String,
    timeout: Duration,
    reconnect_delay: Duration,
}

impl RedisSubscription {
    pub fn new(client: redis::Client, channel: impl Into<String>, config: &RedisConfig) -> Self {
        Self {
            client,
            channel: channel.into(),
            timeout: config.timeout(),
            reconnect_delay: config.reconnect_delay(),
        }
    }

    pub fn into_stream(self) -> SignalStream {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(self, tx));
        UnboundedReceiverStream::new(rx).boxed()
    }
}

async fn open(client: &redis::Client, channel: &str, timeout: Duration) -> Result<PubSub, PubSubError> {
    let conn = tokio::time::timeout(timeout, client.get_async_connection())
        .await
        .map_err(|_| PubSubError::Subscribe("connect timed out".to_string()))?
        .map_err(|e: redis::RedisError| PubSubError::Subscribe(e.to_string()))?;

    let mut pubsub = conn.into_pubsub();
    pubsub
        .subscribe(channel)
        .await
        .map_err(|e: redis::RedisError| PubSubError::Subscribe(e.to_string()))?;
    Ok(pubsub)
}

async fn pump(subscription: RedisSubscription, tx: mpsc::UnboundedSender<BusSignal>) {
    let RedisSubscription {
        client,
        channel,
        timeout,
        reconnect_delay,
    } = subscription;

    loop {
        match open(&client, &channel, timeout).await {
            Ok(mut pubsub) => {
                tracing::info!(channel = %channel, "subscribed to cluster channel");
                if tx.send(BusSignal::Connected).is_err() {
                    return;
                }

                let mut messages = pubsub.on_message();
                while let Some(msg) = messages.next().await {
                    let signal = BusSignal::Message(msg.get_payload_bytes().to_vec());
                    if tx.send(signal).is_err() {
                        return;
                    }
                }

                tracing::warn!(channel = %channel, "cluster subscription dropped");
                if tx.send(BusSignal::Disconnected).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "cluster subscribe failed");
            }
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}
