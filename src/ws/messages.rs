//! Client → gateway control frames.
//!
//! Every inbound frame is a JSON object with a string `topic`. The only
//! frame this layer acts on is `auth`; other topics are surfaced as
//! [`ClientFrame::Unhandled`] for higher layers to ignore or extend.

use serde::Deserialize;
use serde_json::Value;

/// Topic of the authorization frame.
pub const AUTH_TOPIC: &str = "auth";

/// Body of an `auth` frame.
///
/// ```json
/// { "topic": "auth", "token": "…", "subscribe": ["objects", "job_progress"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthRequest {
    /// Session token to verify. Absent tokens always fail verification.
    #[serde(default)]
    pub token: Option<String>,
    /// Topic prefixes to subscribe to; `"*"` subscribes to everything.
    #[serde(default)]
    pub subscribe: Vec<String>,
}

/// A well-formed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Authorization request.
    Auth(AuthRequest),
    /// Any other topic.
    Unhandled {
        /// The frame's topic.
        topic: String,
    },
}

impl ClientFrame {
    /// Parses a text frame.
    ///
    /// Returns `None` for invalid JSON, non-object payloads, a missing or
    /// non-string `topic`, or an `auth` frame with a malformed body.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let topic = value.as_object()?.get("topic")?.as_str()?;
        if topic == AUTH_TOPIC {
            return serde_json::from_value::<AuthRequest>(value).ok().map(Self::Auth);
        }
        Some(Self::Unhandled {
            topic: topic.to_string(),
        })
    }
}
