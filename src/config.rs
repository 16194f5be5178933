//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Timing knobs for the delivery loop are
//! grouped into [`BusConfig`] so the bus can be built without touching the
//! environment (tests construct it directly).

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::GatewayError;

/// Which shared channel implementation backs the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusBackend {
    /// Redis pub/sub, shared across processes.
    Redis,
    /// In-process broadcast channel; only this process publishes.
    Memory,
}

impl std::str::FromStr for BusBackend {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(GatewayError::InvalidConfig(format!(
                "unknown bus backend: {other}"
            ))),
        }
    }
}

/// Tunables of the delivery loop and connection validity.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Name of the shared channel the loop subscribes to.
    pub channel: String,

    /// Bounded wait for the next record on each iteration.
    pub poll_timeout: Duration,

    /// Idle time after which a heartbeat is synthesized.
    pub idle_threshold: Duration,

    /// Short pause taken when an iteration produced nothing to deliver.
    pub idle_yield: Duration,

    /// Pause after an iteration failed.
    pub error_backoff: Duration,

    /// How long an unauthorized connection stays valid after creation.
    pub auth_grace_period: Duration,

    /// Maximum number of concurrent sends within one fan-out.
    /// `1` delivers strictly sequentially.
    pub max_concurrent_sends: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel: "notify".to_string(),
            poll_timeout: Duration::from_secs(2),
            idle_threshold: Duration::from_secs(3),
            idle_yield: Duration::from_millis(10),
            error_backoff: Duration::from_millis(500),
            auth_grace_period: Duration::from_secs(3),
            max_concurrent_sends: 1,
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Shared channel backend.
    pub bus_backend: BusBackend,

    /// Redis connection string, used when `bus_backend` is [`BusBackend::Redis`].
    pub redis_url: String,

    /// Capacity of the in-process broadcast channel.
    pub memory_bus_capacity: usize,

    /// Delivery loop settings.
    pub bus: BusConfig,

    /// HS256 secret used to verify session tokens.
    pub session_secret: String,

    /// Required `iss` claim, if any.
    pub session_issuer: Option<String>,

    /// Site name stamped on records published by this process.
    pub site_name: String,

    /// Host name stamped on records published by this process.
    pub host_name: String,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` cannot be parsed as a
    /// [`SocketAddr`], if `BUS_BACKEND` names an unknown backend, or if
    /// `SESSION_SECRET` is missing.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let bus_backend: BusBackend = std::env::var("BUS_BACKEND")
            .unwrap_or_else(|_| "redis".to_string())
            .parse()?;

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let memory_bus_capacity = parse_env("MEMORY_BUS_CAPACITY", 10_000);

        let defaults = BusConfig::default();
        let bus = BusConfig {
            channel: std::env::var("BUS_CHANNEL").unwrap_or(defaults.channel),
            poll_timeout: parse_env_millis("BUS_POLL_TIMEOUT_MS", defaults.poll_timeout),
            idle_threshold: parse_env_millis("BUS_IDLE_THRESHOLD_MS", defaults.idle_threshold),
            idle_yield: defaults.idle_yield,
            error_backoff: parse_env_millis("BUS_ERROR_BACKOFF_MS", defaults.error_backoff),
            auth_grace_period: parse_env_millis(
                "AUTH_GRACE_PERIOD_MS",
                defaults.auth_grace_period,
            ),
            max_concurrent_sends: parse_env("DELIVERY_CONCURRENCY", 1_usize).max(1),
        };

        let session_secret = std::env::var("SESSION_SECRET")
            .map_err(|_| GatewayError::InvalidConfig("SESSION_SECRET must be set".to_string()))?;
        let session_issuer = std::env::var("SESSION_ISSUER").ok();
        let site_name = std::env::var("SITE_NAME").unwrap_or_else(|_| "nebula".to_string());
        let host_name = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());

        Ok(Self {
            listen_addr,
            bus_backend,
            redis_url,
            memory_bus_capacity,
            bus,
            session_secret,
            session_issuer,
            site_name,
            host_name,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable holding milliseconds.
fn parse_env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
