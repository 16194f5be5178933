//! The shared channel: subscribing to it and publishing onto it.
//!
//! Records on the channel are JSON arrays
//! `[timestamp, site, host, topic, data]`. The delivery loop reads them
//! through a [`BusSource`]; producers write them through a [`Notifier`]
//! backed by a [`BusPublisher`].
//!
//! Two backends are provided: [`RedisBus`] (pub/sub shared by every
//! process attached to the same Redis) and [`MemoryBus`] (a
//! `tokio::broadcast` channel local to this process).

pub mod memory;
pub mod redis;

pub use self::memory::{MemoryBus, MemoryBusSource};
pub use self::redis::{RedisBus, RedisBusSource};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::error::GatewayError;

/// Consumer side of the shared channel.
///
/// The delivery loop is spawned onto the runtime and borrows its source
/// across await points, so implementations must be `Sync` as well.
#[async_trait]
pub trait BusSource: Send + Sync + std::fmt::Debug {
    /// Subscribes to `channel`. Called once before the first poll.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BusSource`] if the subscription cannot be
    /// established.
    async fn subscribe(&mut self, channel: &str) -> Result<(), GatewayError>;

    /// Waits up to `timeout` for the next raw record.
    ///
    /// Returns `Ok(None)` when nothing arrived within the timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BusSource`] if the channel is unavailable.
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<String>, GatewayError>;
}

/// Producer side of the shared channel.
#[async_trait]
pub trait BusPublisher: Send + Sync + std::fmt::Debug {
    /// Publishes one raw record on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BusSource`] if the record cannot be handed
    /// to the channel.
    async fn publish(&self, channel: &str, record: String) -> Result<(), GatewayError>;
}

/// Publishes envelopes stamped with this process's provenance.
#[derive(Debug, Clone)]
pub struct Notifier {
    publisher: Arc<dyn BusPublisher>,
    channel: String,
    site: String,
    host: String,
}

impl Notifier {
    /// Creates a notifier writing to `channel` with the given provenance.
    #[must_use]
    pub fn new(
        publisher: Arc<dyn BusPublisher>,
        channel: impl Into<String>,
        site: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            channel: channel.into(),
            site: site.into(),
            host: host.into(),
        }
    }

    /// Publishes `data` under `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BusSource`] if the publisher fails.
    pub async fn notify(&self, topic: &str, data: Value) -> Result<(), GatewayError> {
        let record = encode_record(&self.site, &self.host, topic, data);
        self.publisher.publish(&self.channel, record).await?;
        tracing::debug!(topic, channel = %self.channel, "notification published");
        Ok(())
    }
}

/// Encodes a `[timestamp, site, host, topic, data]` record stamped now.
#[must_use]
pub fn encode_record(site: &str, host: &str, topic: &str, data: Value) -> String {
    let timestamp = Utc::now().timestamp_millis() as f64 / 1000.0;
    Value::Array(vec![
        Value::from(timestamp),
        Value::from(site),
        Value::from(host),
        Value::from(topic),
        data,
    ])
    .to_string()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Envelope;
    use serde_json::json;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn sources_can_move_into_the_delivery_task() {
        assert_send_sync::<MemoryBusSource>();
        assert_send_sync::<RedisBusSource>();
        assert_send_sync::<Box<dyn BusSource>>();
    }

    #[test]
    fn encoded_record_decodes_as_envelope() {
        let record = encode_record("nebula", "node-1", "objects_changed", json!({"id": 3}));
        let Ok(Envelope::Published(p)) = Envelope::decode(&record) else {
            panic!("record must decode");
        };
        assert_eq!(p.topic, "objects_changed");
        assert_eq!(p.site, json!("nebula"));
        assert_eq!(p.host, json!("node-1"));
        assert!(p.timestamp.is_f64());
    }

    #[tokio::test]
    async fn notifier_publishes_on_its_channel() {
        let bus = MemoryBus::new(16);
        let mut source = bus.source();
        let Ok(()) = source.subscribe("notify").await else {
            panic!("subscribe failed");
        };
        let notifier = Notifier::new(Arc::new(bus.clone()), "notify", "nebula", "node-1");
        let Ok(()) = notifier.notify("server.started", json!({})).await else {
            panic!("notify failed");
        };
        let Ok(Some(raw)) = source.next_message(Duration::from_secs(1)).await else {
            panic!("expected a record");
        };
        let Ok(envelope) = Envelope::decode(&raw) else {
            panic!("decode failed");
        };
        assert_eq!(envelope.topic(), "server.started");
    }
}
