//! notify-gateway server entry point.
//!
//! Starts the delivery loop, then the Axum HTTP server with the health and
//! WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use notify_gateway::api;
use notify_gateway::app_state::AppState;
use notify_gateway::bus::{BackgroundService, Bus};
use notify_gateway::config::{BusBackend, GatewayConfig};
use notify_gateway::session::JwtSessionVerifier;
use notify_gateway::source::{BusPublisher, BusSource, MemoryBus, Notifier, RedisBus};
use notify_gateway::ws::SERVER_STARTED_TOPIC;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    tracing::info!(addr = %config.listen_addr, backend = ?config.bus_backend, "starting notify-gateway");

    // Shared channel
    let (source, publisher): (Box<dyn BusSource>, Arc<dyn BusPublisher>) =
        match config.bus_backend {
            BusBackend::Redis => {
                let redis = RedisBus::connect(&config.redis_url)
                    .await
                    .with_context(|| format!("connecting to {}", config.redis_url))?;
                (Box::new(redis.source()), Arc::new(redis))
            }
            BusBackend::Memory => {
                let memory = MemoryBus::new(config.memory_bus_capacity);
                (Box::new(memory.source()), Arc::new(memory))
            }
        };

    // Delivery loop
    let bus = Arc::new(Bus::new(config.bus.clone(), source));
    bus.start().await.context("starting delivery loop")?;

    let notifier = Notifier::new(
        publisher,
        config.bus.channel.clone(),
        config.site_name.clone(),
        config.host_name.clone(),
    );
    let started = serde_json::json!({ "version": env!("CARGO_PKG_VERSION") });
    if let Err(e) = notifier.notify(SERVER_STARTED_TOPIC, started).await {
        tracing::warn!(error = %e, "failed to announce server start");
    }

    // Build application state
    let app_state = AppState {
        bus: Arc::clone(&bus),
        verifier: Arc::new(JwtSessionVerifier::new(
            config.session_secret.as_bytes(),
            config.session_issuer.as_deref(),
        )),
    };

    // Build router
    let app = api::build_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bus.request_stop();
    bus.await_stopped().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
}
