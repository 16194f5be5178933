//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::bus::Bus;
use crate::session::SessionVerifier;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Notification bus owning every live connection.
    pub bus: Arc<Bus>,
    /// Verifies session tokens carried by `auth` frames.
    pub verifier: Arc<dyn SessionVerifier>,
}
