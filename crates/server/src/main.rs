//! rounds-server: clinical case API binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rounds_server::config::Config;
use rounds_server::db::InMemoryCaseStore;
use rounds_server::state::AppState;

/// How often idle rate limit counters are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    // Log startup info
    if config.api_keys.is_empty() {
        tracing::warn!("No API_KEYS configured, authenticated routes will reject every request");
    } else {
        tracing::info!(keys = config.api_keys.len(), "API key authentication enabled");
    }
    if config.trusted_proxies.is_empty() {
        tracing::info!("No TRUSTED_PROXIES configured, forwarding headers are ignored");
    } else {
        tracing::info!(proxies = ?config.trusted_proxies, "Trusting forwarding headers from proxies");
    }
    for (policy, limits) in config.policies.iter() {
        tracing::info!(
            policy = %policy,
            max_requests = limits.max_requests(),
            window_secs = limits.window().as_secs(),
            "Rate limit policy"
        );
    }
    tracing::info!(
        max_entries = config.cache_max_entries,
        default_ttl_secs = config.cache_default_ttl.as_secs(),
        "Response cache configured"
    );

    let state = AppState::from_config(&config, Arc::new(InMemoryCaseStore::seeded()));

    // Sweep expired counters so idle callers don't accumulate
    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                tracing::debug!(removed, "Swept idle rate limit counters");
            }
        }
    });

    // Build application
    let app = rounds_server::build_app(state, &config);

    // Start server
    let addr: SocketAddr = match config.bind_address.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, address = %config.bind_address, "Invalid bind address");
            std::process::exit(1);
        }
    };
    tracing::info!("Starting rounds server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind listener");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(error = %e, "Server error");
    }

    tracing::info!("Server shutdown complete");
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
