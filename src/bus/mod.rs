//! The notification bus: connection registry, delivery loop, lifecycle.
//!
//! [`Bus`] is constructed explicitly and shared as `Arc<Bus>` with the
//! layer that accepts sockets. It is the only writer of its
//! [`ConnectionRegistry`]: sockets join through [`Bus::join`], leave
//! through [`Bus::leave`], and stale ones are purged by the delivery loop.

mod dispatcher;
pub mod lifecycle;
pub mod registry;

pub use lifecycle::BackgroundService;
pub use registry::ConnectionRegistry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use self::dispatcher::DeliveryLoop;
use crate::config::BusConfig;
use crate::domain::ConnectionId;
use crate::error::GatewayError;
use crate::source::BusSource;
use crate::ws::Connection;
use crate::ws::transport::{NORMAL_CLOSURE, TransportSink, TransportStream};

/// Bridges the shared channel to connected peers.
///
/// A bus runs at most once: it is started, stopped, and then discarded.
pub struct Bus {
    config: BusConfig,
    registry: Arc<ConnectionRegistry>,
    source: Mutex<Option<Box<dyn BusSource>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("channel", &self.config.channel)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Bus {
    /// Creates a stopped bus reading from `source`.
    #[must_use]
    pub fn new(config: BusConfig, source: Box<dyn BusSource>) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            source: Mutex::new(Some(source)),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Delivery loop settings.
    #[must_use]
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Registry of live connections.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Started and not asked to stop.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.cancel.is_cancelled()
    }

    /// Registers a newly accepted transport.
    ///
    /// The caller owns the returned connection's receive cycle and must
    /// call [`Bus::leave`] when the peer goes away.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BusNotRunning`] when the bus is stopped; the
    /// transport is closed with a normal-closure code in that case.
    pub async fn join(
        &self,
        mut sink: Box<dyn TransportSink>,
        stream: Box<dyn TransportStream>,
    ) -> Result<Arc<Connection>, GatewayError> {
        if !self.is_running() {
            let _ = sink.close(NORMAL_CLOSURE).await;
            tracing::warn!("connection refused: bus is not running");
            return Err(GatewayError::BusNotRunning);
        }
        let connection = Arc::new(Connection::new(
            sink,
            stream,
            self.config.auth_grace_period,
        ));
        self.registry.insert(Arc::clone(&connection)).await;
        tracing::debug!(conn_id = %connection.id(), "connection joined");
        Ok(connection)
    }

    /// Handles a peer's disconnect notification.
    pub async fn leave(&self, id: ConnectionId) {
        if let Some(connection) = self.registry.remove(id).await {
            connection.mark_disconnected();
            tracing::debug!(conn_id = %id, "connection left");
        }
    }
}

#[async_trait]
impl BackgroundService for Bus {
    async fn start(&self) -> Result<(), GatewayError> {
        let source = self
            .source
            .lock()
            .await
            .take()
            .ok_or(GatewayError::AlreadyStarted)?;
        let delivery = DeliveryLoop::new(
            Arc::clone(&self.registry),
            source,
            self.config.clone(),
            self.cancel.clone(),
        );
        *self.task.lock().await = Some(tokio::spawn(delivery.run()));
        self.started.store(true, Ordering::Release);
        tracing::info!(channel = %self.config.channel, "bus started");
        Ok(())
    }

    fn request_stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("bus stop requested");
        }
        self.cancel.cancel();
    }

    async fn await_stopped(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "delivery loop task failed");
        }
    }
}
