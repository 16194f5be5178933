//! Start/stop contract for long-running background services.

use async_trait::async_trait;

use crate::error::GatewayError;

/// A service owning a background task.
///
/// `request_stop` only signals; the task finishes its current unit of work
/// and exits on its own. `await_stopped` waits for that to happen.
#[async_trait]
pub trait BackgroundService: Send + Sync {
    /// Spawns the background task.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AlreadyStarted`] if the service was started
    /// before.
    async fn start(&self) -> Result<(), GatewayError>;

    /// Signals the background task to stop. Idempotent.
    fn request_stop(&self);

    /// Waits until the background task has exited. Returns immediately if
    /// it was never started or has already been awaited.
    async fn await_stopped(&self);
}
