//! Domain layer: core types shared by the bus and the WebSocket layer.
//!
//! Connection identity, the envelope model decoded from the shared channel,
//! and per-connection topic subscriptions.

pub mod connection_id;
pub mod envelope;
pub mod topic_set;

pub use connection_id::ConnectionId;
pub use envelope::{Envelope, Frame, HEARTBEAT_TOPIC, Published};
pub use topic_set::{TopicSet, WILDCARD};
