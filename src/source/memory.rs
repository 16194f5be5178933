//! In-process shared channel.
//!
//! [`MemoryBus`] wraps a [`tokio::sync::broadcast`] channel. Every record
//! is tagged with its channel name so one bus can carry several channels;
//! each [`MemoryBusSource`] only yields records of the channel it
//! subscribed to.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::{BusPublisher, BusSource};
use crate::error::GatewayError;

/// Broadcast bus carrying `(channel, record)` pairs.
///
/// When the ring buffer is full, the oldest records are dropped for
/// lagging sources.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<(String, String)>,
}

impl MemoryBus {
    /// Creates a new `MemoryBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a source attached to this bus.
    ///
    /// The source starts buffering immediately, so records published after
    /// this call are not lost even if `subscribe` runs later.
    #[must_use]
    pub fn source(&self) -> MemoryBusSource {
        MemoryBusSource {
            receiver: self.sender.subscribe(),
            channel: None,
        }
    }

    /// Returns the current number of attached sources.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl BusPublisher for MemoryBus {
    async fn publish(&self, channel: &str, record: String) -> Result<(), GatewayError> {
        // No attached source is not an error: the record simply has no audience.
        let _ = self.sender.send((channel.to_string(), record));
        Ok(())
    }
}

/// Consumer of a [`MemoryBus`].
#[derive(Debug)]
pub struct MemoryBusSource {
    receiver: broadcast::Receiver<(String, String)>,
    channel: Option<String>,
}

#[async_trait]
impl BusSource for MemoryBusSource {
    async fn subscribe(&mut self, channel: &str) -> Result<(), GatewayError> {
        self.channel = Some(channel.to_string());
        Ok(())
    }

    async fn next_message(&mut self, timeout: Duration) -> Result<Option<String>, GatewayError> {
        let Some(channel) = self.channel.as_deref() else {
            return Err(GatewayError::BusSource("not subscribed".to_string()));
        };
        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Err(_) => return Ok(None),
                Ok(Ok((ch, record))) if ch == channel => return Ok(Some(record)),
                Ok(Ok(_)) => {}
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    tracing::warn!(lagged = n, "memory bus source lagged behind publishers");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(GatewayError::BusSource("memory bus closed".to_string()));
                }
            }
        }
    }
}
