//! Mailbox gateway
//!
//! Single-binary service that:
//! 1. Resolves the caller identity from the `x-user-id` header
//! 2. Issues a short-lived bearer token from encrypted stored credentials,
//!    refreshing against the Microsoft identity platform when needed
//! 3. Serves read-only email endpoints against the Graph API

mod config;
mod error;
mod format;
mod gateway;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use graph_auth::{ConnectionStore, PgConnectionStore, ProviderConfig, TokenCipher, TokenManager};
use graph_mail::{MailClient, SearchEngine};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::AppState;

/// Build the axum router with all routes and shared state.
///
/// Email routes sit behind the auth gateway; health and metrics stay open.
/// The concurrency limit layer bounds in-flight requests process-wide.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let email_routes = Router::new()
        .route("/emails", get(routes::list_emails))
        .route("/emails/search", get(routes::search_emails))
        .route("/emails/{id}", get(routes::read_email))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            gateway::require_user,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(email_routes)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting mail-gateway");

    // Install the Prometheus recorder before any metrics are emitted
    let prometheus = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        tenant = %config.oauth.tenant_id,
        mailbox_base_url = %config.mailbox.base_url,
        "configuration loaded"
    );

    // Construct everything once and pass it down — no global lookups
    let database_url = config.database_url.take().expect("resolved during load");
    let encryption_key = config.encryption_key.take().expect("resolved during load");
    let client_secret = config
        .oauth
        .client_secret
        .take()
        .expect("resolved during load");

    let store = Arc::new(
        PgConnectionStore::connect(database_url.expose_str())
            .await
            .context("failed to connect to the credential store")?,
    );
    let cipher = TokenCipher::from_base64(encryption_key.expose_str())
        .context("invalid TOKEN_ENCRYPTION_KEY")?;
    let provider = ProviderConfig::for_tenant(
        &config.oauth.tenant_id,
        config.oauth.client_id.clone(),
        client_secret,
    );

    let http = reqwest::Client::new();
    let tokens = Arc::new(TokenManager::new(
        store.clone() as Arc<dyn ConnectionStore>,
        cipher,
        provider,
        http.clone(),
    ));
    let mail = MailClient::new(
        http,
        config.mailbox.base_url.clone(),
        Duration::from_secs(config.mailbox.timeout_secs),
    );
    let search = Arc::new(SearchEngine::new(
        mail.clone(),
        config.mailbox.list_fields.clone(),
    ));

    let state = AppState {
        tokens,
        mail,
        search,
        list_fields: config.mailbox.list_fields.clone(),
        detail_fields: config.mailbox.detail_fields.clone(),
        started_at: Instant::now(),
        prometheus,
    };

    let app = build_router(state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!(addr = %config.server.listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // In-flight requests have drained; release the store's connections
    store.close().await;
    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: service identity plus uptime.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "service": "mail-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint — text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
