use anyhow::{Context, Result};
use relay::api::{create_ws_router, WsAppState};
use relay::config::{load_config, RelayConfig};
use relay::registry::ConnectionRegistry;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=info".into()),
        )
        .init();

    // TOML file if RELAY_CONFIG points at one, env overrides on top
    let mut config = match std::env::var("RELAY_CONFIG") {
        Ok(path) => load_config(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load config from {}: {}", path, e))?,
        Err(_) => RelayConfig::default(),
    };
    config.apply_env();

    let registry = Arc::new(ConnectionRegistry::new(
        config.broadcast.policy,
        config.broadcast.channel_capacity,
        config.broadcast.write_timeout(),
    ));

    let state = Arc::new(WsAppState { registry });
    let app = create_ws_router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(port = config.server.port, "WebSocket relay listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
