//! Messages flowing through the bus.
//!
//! Records on the shared channel are JSON arrays of five elements,
//! `[timestamp, site, host, topic, data]`. They are decoded into
//! [`Envelope::Published`]; only the topic is interpreted; the remaining
//! fields are opaque and passed through to clients untouched.

use serde::Serialize;
use serde_json::Value;

use crate::error::GatewayError;

/// Topic of the locally synthesized keep-alive envelope.
pub const HEARTBEAT_TOPIC: &str = "heartbeat";

/// Payload-carrying envelope read from the shared channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Published {
    /// Publisher timestamp, passed through as-is.
    pub timestamp: Value,
    /// Originating site.
    pub site: Value,
    /// Originating host.
    pub host: Value,
    /// Segment-structured topic used for prefix matching.
    pub topic: String,
    /// Arbitrary payload owned by the publisher.
    pub data: Value,
}

#[derive(Serialize)]
struct HeartbeatFrame {
    topic: &'static str,
}

/// One unit of information fanned out to connections.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Synthesized when the channel has been idle; never read from the source.
    Heartbeat,
    /// Decoded from a record on the shared channel.
    Published(Published),
}

impl Envelope {
    /// Decodes a raw `[timestamp, site, host, topic, data]` record.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MalformedRecord`] if the record is not valid
    /// JSON, not a five-element array, or its topic is not a string.
    pub fn decode(raw: &str) -> Result<Self, GatewayError> {
        let (timestamp, site, host, topic, data): (Value, Value, Value, String, Value) =
            serde_json::from_str(raw).map_err(|e| GatewayError::MalformedRecord(e.to_string()))?;
        Ok(Self::Published(Published {
            timestamp,
            site,
            host,
            topic,
            data,
        }))
    }

    /// Returns the topic the envelope is matched on.
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::Heartbeat => HEARTBEAT_TOPIC,
            Self::Published(p) => &p.topic,
        }
    }

    /// Serializes the envelope into its client-facing JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Encode`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<Frame, GatewayError> {
        let text = match self {
            Self::Heartbeat => serde_json::to_string(&HeartbeatFrame {
                topic: HEARTBEAT_TOPIC,
            }),
            Self::Published(p) => serde_json::to_string(p),
        }
        .map_err(|e| GatewayError::Encode(e.to_string()))?;
        Ok(Frame {
            topic: self.topic().to_string(),
            text,
        })
    }
}

/// An envelope encoded once per fan-out and shared by every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    topic: String,
    text: String,
}

impl Frame {
    /// Topic of the encoded envelope.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wire text sent to clients.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decode_five_field_record() {
        let raw = r#"[1700000000.5, "site-a", "host-1", "objects_changed", {"id": 42}]"#;
        let Ok(Envelope::Published(p)) = Envelope::decode(raw) else {
            panic!("expected published envelope");
        };
        assert_eq!(p.topic, "objects_changed");
        assert_eq!(p.site, Value::from("site-a"));
        assert_eq!(p.data.get("id"), Some(&Value::from(42)));
    }

    #[test]
    fn decode_rejects_short_record() {
        let result = Envelope::decode(r#"[1, "site", "host", "topic"]"#);
        assert!(matches!(result, Err(GatewayError::MalformedRecord(_))));
    }

    #[test]
    fn decode_rejects_non_string_topic() {
        let result = Envelope::decode(r#"[1, "site", "host", 5, null]"#);
        assert!(matches!(result, Err(GatewayError::MalformedRecord(_))));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Envelope::decode("not json").is_err());
    }

    #[test]
    fn heartbeat_encodes_topic_only() {
        let Ok(frame) = Envelope::Heartbeat.encode() else {
            panic!("heartbeat must encode");
        };
        assert_eq!(frame.topic(), HEARTBEAT_TOPIC);
        assert_eq!(frame.text(), r#"{"topic":"heartbeat"}"#);
    }

    #[test]
    fn published_encodes_named_fields() {
        let raw = r#"[1, "s", "h", "job_progress", {"progress": 50}]"#;
        let Ok(envelope) = Envelope::decode(raw) else {
            panic!("decode failed");
        };
        let Ok(frame) = envelope.encode() else {
            panic!("encode failed");
        };
        let value: Value = serde_json::from_str(frame.text()).unwrap_or_default();
        assert_eq!(value.get("timestamp"), Some(&Value::from(1)));
        assert_eq!(value.get("site"), Some(&Value::from("s")));
        assert_eq!(value.get("host"), Some(&Value::from("h")));
        assert_eq!(value.get("topic"), Some(&Value::from("job_progress")));
        assert_eq!(
            value.pointer("/data/progress"),
            Some(&Value::from(50))
        );
    }
}
