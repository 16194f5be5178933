//! Redis pub/sub shared channel.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use super::{BusPublisher, BusSource};
use crate::error::GatewayError;

type MessageStream = Pin<Box<dyn Stream<Item = redis::Msg> + Send>>;

/// Redis-backed publisher and source factory.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus")
            .field("server", &self.client.get_connection_info().addr)
            .finish_non_exhaustive()
    }
}

impl RedisBus {
    /// Connects to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BusSource`] if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }

    /// Creates a source with its own pub/sub connection.
    #[must_use]
    pub fn source(&self) -> RedisBusSource {
        RedisBusSource::new(self.client.clone())
    }
}

#[async_trait]
impl BusPublisher for RedisBus {
    async fn publish(&self, channel: &str, record: String) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, record).await?;
        tracing::trace!(channel, receivers, "record published to redis");
        Ok(())
    }
}

/// Consumer of a Redis pub/sub channel.
///
/// If the subscription stream ends (server restart, dropped connection),
/// the next poll reports the failure and the following one resubscribes.
pub struct RedisBusSource {
    client: redis::Client,
    channel: Option<String>,
    // Only reached through `&mut self`; the lock makes the source `Sync`.
    messages: Mutex<Option<MessageStream>>,
}

impl std::fmt::Debug for RedisBusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBusSource")
            .field("channel", &self.channel)
            .field(
                "connected",
                &self.messages.try_lock().map(|m| m.is_some()).unwrap_or(true),
            )
            .finish_non_exhaustive()
    }
}

impl RedisBusSource {
    /// Creates an unsubscribed source for `client`.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            channel: None,
            messages: Mutex::new(None),
        }
    }

    async fn open_stream(
        client: &redis::Client,
        channel: &str,
    ) -> Result<MessageStream, GatewayError> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        tracing::info!(channel, "subscribed to redis channel");
        Ok(Box::pin(pubsub.into_on_message()))
    }
}

#[async_trait]
impl BusSource for RedisBusSource {
    async fn subscribe(&mut self, channel: &str) -> Result<(), GatewayError> {
        self.channel = Some(channel.to_string());
        let stream = Self::open_stream(&self.client, channel).await?;
        *self.messages.get_mut() = Some(stream);
        Ok(())
    }

    async fn next_message(&mut self, timeout: Duration) -> Result<Option<String>, GatewayError> {
        let slot = self.messages.get_mut();
        if slot.is_none() {
            let Some(channel) = self.channel.as_deref() else {
                return Err(GatewayError::BusSource("not subscribed".to_string()));
            };
            *slot = Some(Self::open_stream(&self.client, channel).await?);
        }
        let Some(messages) = slot.as_mut() else {
            return Err(GatewayError::BusSource("not subscribed".to_string()));
        };

        match tokio::time::timeout(timeout, messages.next()).await {
            Err(_) => Ok(None),
            Ok(None) => {
                *slot = None;
                Err(GatewayError::BusSource(
                    "redis subscription closed".to_string(),
                ))
            }
            Ok(Some(msg)) => Ok(Some(msg.get_payload::<String>()?)),
        }
    }
}
