//! commune-api - community platform REST service
//!
//! Startup order: arguments, tracing, TOML config, database, session secret,
//! notifier, maintenance task, HTTP listener.

use anyhow::{Context, Result};
use clap::Parser;
use commune_api::config::log_directives;
use commune_api::maintenance::spawn_maintenance;
use commune_api::{
    build_router, resolve_session_secret, AppState, Args, HttpNotifier, LogNotifier, Notifier,
    ServiceConfig,
};
use commune_common::config::{load_toml_config, write_toml_config};
use commune_common::db::init_database;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Tracing first so config loading is logged; RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env().ok();
    let level_from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| default_filter("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let toml = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;

    let config =
        ServiceConfig::resolve(&args, toml.clone()).context("Invalid configuration")?;

    if !level_from_env {
        filter_handle
            .reload(default_filter(&config.log_level))
            .context("Failed to apply log level")?;
    }

    if let Some(path) = &args.write_default_config {
        write_toml_config(&toml, path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        info!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    info!("Starting commune-api v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let db = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("✓ Database ready");

    let secret = resolve_session_secret(&db, &config)
        .await
        .context("Failed to load session secret")?;
    if config.session_secret.is_some() {
        info!("Session secret: configured");
    } else {
        info!("Session secret: stored in database");
    }

    let notifier: Arc<dyn Notifier> = match &config.notifier_url {
        Some(url) => {
            info!("Notifier: {}", url);
            Arc::new(
                HttpNotifier::new(url, config.notifier_timeout)
                    .context("Failed to build notifier client")?,
            )
        }
        None => {
            info!("Notifier: log only (no notifier URL configured)");
            Arc::new(LogNotifier)
        }
    };

    let maintenance = spawn_maintenance(db.clone(), config.maintenance_interval);

    let bind_address = config.bind_address();
    let state = AppState::new(db, config, secret, notifier);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("commune-api listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    maintenance.abort();
    info!("Server shutdown complete");
    Ok(())
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(log_directives(level))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
