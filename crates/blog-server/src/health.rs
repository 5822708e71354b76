//! Heartbeat endpoint

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use std::sync::Arc;

use blog_core::config::AppConfig;
use blog_db::Database;

/// Upper bound for the database ping behind the heartbeat
const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state of the HTTP server
pub struct AppState {
    pub config: AppConfig,
    pub db: Option<Database>,
}

impl AppState {
    pub fn new(config: AppConfig, db: Option<Database>) -> Self {
        Self { config, db }
    }
}

/// Answers `.` while the process is up. When a database pool is attached it
/// is pinged first; an unreachable database yields 503.
pub async fn heartbeat(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    let Some(db) = &state.db else {
        return (StatusCode::OK, ".");
    };

    match tokio::time::timeout(PING_TIMEOUT, db.ping()).await {
        Ok(Ok(())) => (StatusCode::OK, "."),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "heartbeat database ping failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
        Err(_) => {
            tracing::warn!(timeout = ?PING_TIMEOUT, "heartbeat database ping timed out");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}
