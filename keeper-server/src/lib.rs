pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod password;
pub mod service;
pub mod state;
pub mod store;
pub mod telemetry;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use config::{ConfigOverrides, ServerConfig};
pub use state::AppState;
pub use telemetry::CorrelationId;

use auth::TokenService;
use password::Argon2Hasher;

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;

    let listener = TcpListener::bind(config.bind_address)
        .await
        .with_context(|| {
            format!(
                "failed to bind http listener on {addr}",
                addr = config.bind_address
            )
        })?;

    serve(listener, state, shutdown_signal()).await
}

/// Serves the API on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let http_addr = listener.local_addr()?;
    info!(%http_addr, "http server listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")?;

    info!("http server stopped");
    Ok(())
}

pub async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let store = store::open(config.store, &config.database_url)
        .await
        .with_context(|| format!("failed to open {} store", config.store))?;
    let tokens = Arc::new(TokenService::new(
        &config.token_secret_bytes(),
        config.token_ttl,
    ));
    info!(store = %config.store, ttl_secs = config.token_ttl.as_secs(), "state initialised");
    Ok(AppState::new(store, tokens, Arc::new(Argon2Hasher::new())))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(?err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
