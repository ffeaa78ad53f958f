use anyhow::{Context, Result};
use axum::{
    http::{request::Parts, HeaderValue, Method},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::channel::ChannelManager;
use crate::config::BridgeConfig;
use crate::registry::LocatorRegistry;
use crate::telemetry::TelemetryDecoder;

/// Bridge server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<LocatorRegistry>,
    pub channel: Arc<ChannelManager>,
    pub command_topic: Arc<str>,
}

impl AppState {
    /// Wire the registry, decoder and channel together from configuration
    pub fn from_config(config: &BridgeConfig) -> crate::error::Result<Self> {
        let registry = Arc::new(LocatorRegistry::new(&config.locators)?);
        let decoder = TelemetryDecoder::new(Arc::clone(&registry));
        let channel = Arc::new(ChannelManager::new(config, decoder));
        Ok(Self {
            registry,
            channel,
            command_topic: config.command_topic().into(),
        })
    }
}

/// HTTP API plus the MQTT channel that feeds it
pub struct BridgeServer {
    addr: SocketAddr,
    state: AppState,
}

impl BridgeServer {
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let addr = config.bind_addr()?;
        let state = AppState::from_config(config).context("Failed to build locator registry")?;
        Ok(Self { addr, state })
    }

    /// Run until Ctrl-C, then disconnect the channel cleanly
    pub async fn run(self) -> Result<()> {
        let channel = Arc::clone(&self.state.channel);
        let channel_task = tokio::spawn(async move { channel.run().await });

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind to {}", self.addr))?;

        tracing::info!("Bridge API listening on {}", self.addr);
        tracing::info!("Locators: {}", self.state.registry.list_ids().join(", "));
        tracing::info!("Command topic: {}", self.state.command_topic);

        let channel = Arc::clone(&self.state.channel);
        let app = create_router(self.state);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error");

        channel.disconnect().await;
        channel_task.abort();
        served
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Origins of the local map frontend: `http://localhost[:port]` or
/// `http://127.0.0.1[:port]`
pub fn is_local_origin(origin: &str) -> bool {
    let Some(rest) = origin.strip_prefix("http://") else {
        return false;
    };
    let (host, port) = match rest.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (rest, None),
    };
    let port_ok = match port {
        Some(p) => !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()),
        None => true,
    };
    (host == "localhost" || host == "127.0.0.1") && port_ok
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    use super::{handlers, routes};

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _request: &Parts| {
                origin.to_str().map(is_local_origin).unwrap_or(false)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .merge(routes::api_routes())
        .fallback(handlers::not_found_handler)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
