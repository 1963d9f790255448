//! SMARTRASH Backend Server
//!
//! Serves the wallet, bin, task and pricing APIs and runs the notification
//! worker.

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use smartrash_server::app_state::AppState;
use smartrash_server::auth::AuthService;
use smartrash_server::config::Config;
use smartrash_server::db;
use smartrash_server::middleware::{self, RateLimiter};
use smartrash_server::notifications::{HttpMailer, LogMailer, Mailer, NotificationDispatcher};
use smartrash_server::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        storage = ?config.storage,
        database = %config.database_url_masked(),
        "Starting SMARTRASH server"
    );

    let store = db::open_store(&config)
        .await
        .context("failed to open storage")?;

    // Initialize notification worker
    let mailer: Arc<dyn Mailer> = match &config.mail.relay_url {
        Some(url) => {
            tracing::info!(relay = %url, "Mail relay configured");
            Arc::new(HttpMailer::new(
                url.clone(),
                config.mail.api_key.clone(),
                config.mail.from_address.clone(),
            ))
        }
        None => {
            tracing::warn!("MAIL_RELAY_URL not set, notifications will only be logged");
            Arc::new(LogMailer)
        }
    };
    let (notifications, mail_worker) =
        NotificationDispatcher::spawn(store.clone(), mailer, config.mail.queue_capacity);

    let auth_service = Arc::new(AuthService::new(
        config.jwt_secret.clone(),
        config.jwt_ttl_seconds,
    ));
    if config.ingest_api_key.is_none() {
        tracing::warn!("INGEST_API_KEY not set, sensor endpoints accept any caller");
    }

    let app_state = AppState::new(
        store,
        auth_service,
        config.pricing,
        notifications,
        config.ingest_api_key.clone(),
    );

    let rate_limiter = RateLimiter::new(config.rate_limit_rps);
    rate_limiter.spawn_sweeper();

    let mut app = routes::app_router(app_state, rate_limiter)
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));
    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router held the last dispatcher clone; let the queue drain
    if let Err(e) = mail_worker.await {
        tracing::error!(error = %e, "Notification worker panicked");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
