//! WebSocket layer: connections, client frames, transport adapters.
//!
//! The endpoint at `/ws` accepts a socket, registers it with the bus and
//! then waits for an `auth` frame. Until one is accepted the connection
//! receives nothing and is dropped once its grace period has passed.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod transport;

pub use connection::{ALWAYS_SUBSCRIBE, Connection, Delivery, SERVER_STARTED_TOPIC};
pub use messages::{AuthRequest, ClientFrame};
