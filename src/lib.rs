//! # notify-gateway
//!
//! WebSocket notification gateway. Records published on one shared
//! channel (Redis pub/sub or an in-process broadcast) are delivered to
//! every authorized WebSocket client whose topic subscriptions match.
//!
//! ## Architecture
//!
//! ```text
//! Publishers ──► shared channel (source/)
//!                    │
//!                    ▼
//!              delivery loop (bus/) ──► heartbeat when idle
//!                    │
//!                    ├── ConnectionRegistry (bus/)
//!                    │
//!                    ▼
//!              Connection (ws/) ◄── auth frame + SessionVerifier (session/)
//!                    │
//!                    ▼
//!              WebSocket clients
//! ```

pub mod api;
pub mod app_state;
pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod session;
pub mod source;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;
