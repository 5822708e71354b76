//! Blog backend server
//!
//! `blog httpserver --environment <name>` loads
//! `configs/environment/env.<name>.yaml`, configures logging, opens the
//! database pool and serves the heartbeat endpoint until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::Request;
use axum::routing::get;
use axum::{Router, ServiceExt};
use clap::{Parser, Subcommand};
use tower::{Layer, ServiceBuilder};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use blog_core::config::{AppConfig, DEFAULT_ENVIRONMENT_DIR};
use blog_db::{Database, DatabaseConfig};

mod health;

use health::AppState;

/// Time in-flight requests get to finish once shutdown starts
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "blog", version, about = "Blog backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Starts application HTTP Server
    Httpserver {
        /// Environment name, selects configs/environment/env.<name>.yaml
        #[arg(long, short = 'e')]
        environment: String,

        /// Directory holding the environment files
        #[arg(long, default_value = DEFAULT_ENVIRONMENT_DIR)]
        config_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Httpserver {
            environment,
            config_dir,
        } => {
            let config = AppConfig::load(&config_dir, &environment)
                .context("failed to load environment config")?;
            init_tracing(&config);
            run_http_server(config).await
        }
    }
}

/// Install the global subscriber: JSON lines in production, human-readable
/// otherwise. `RUST_LOG` takes precedence over the configured level.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

async fn run_http_server(config: AppConfig) -> anyhow::Result<()> {
    info!(
        app = %config.app_name,
        environment = %config.environment_name,
        version = env!("CARGO_PKG_VERSION"),
        "starting blog backend"
    );

    let db = match Database::connect(&DatabaseConfig::from_settings(&config.database)).await {
        Ok(db) => {
            info!("connected to database");
            Some(db)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to connect to database, running without it");
            None
        }
    };

    let state = Arc::new(AppState::new(config.clone(), db.clone()));
    let app = NormalizePathLayer::trim_trailing_slash().layer(build_router(state));

    let addr = config
        .server
        .http
        .socket_addr()
        .context("invalid HTTP listen settings")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("couldn't listen on {}", addr))?;

    info!(
        listen_addr = %addr,
        environment = %config.environment_name,
        "HTTP server is ready to handle requests"
    );

    let server = axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal());

    // The drain limit only starts counting once a signal arrives.
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = async move {
        let result = server.await;
        let _ = drain_tx.send(());
        result
    };
    let watchdog = async move {
        shutdown_signal().await;
        if tokio::time::timeout(SHUTDOWN_DRAIN, drain_rx).await.is_err() {
            tracing::warn!(limit = ?SHUTDOWN_DRAIN, "graceful shutdown timed out");
        }
    };

    tokio::select! {
        result = server => result.context("HTTP server failed")?,
        _ = watchdog => {}
    }

    if let Some(db) = db {
        db.close().await;
    }
    tracing::warn!("HTTP server stopped");
    Ok(())
}

/// Build the application router
fn build_router(state: Arc<AppState>) -> Router {
    let endpoint = state.config.health_check_endpoint.clone();
    with_middleware(
        Router::new()
            .route(&endpoint, get(health::heartbeat))
            .with_state(state),
    )
}

/// Request ids, tracing and panic recovery, outermost first. A panicking
/// handler becomes a 500 that still carries the request id.
fn with_middleware(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CatchPanicLayer::new()),
    )
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down HTTP server"),
        _ = terminate => info!("received SIGTERM, shutting down HTTP server"),
    }
}
