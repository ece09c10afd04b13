//! HTTP routes. Handlers are thin: parse, hand the blocking work to a
//! worker thread, serialize.

mod auth;
mod logs;
mod metrics;

use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub use logs::{DEFAULT_LOG_HOURS, DEFAULT_LOG_LIMIT, MAX_LOG_LIMIT, MAX_LOG_WINDOW_HOURS};
pub use metrics::{DEFAULT_HISTORY_MINUTES, MAX_HISTORY_POINTS};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/metrics/current", get(metrics::current))
        .route("/api/metrics/history", get(metrics::history))
        .route("/api/metrics/save", post(metrics::save))
        .route("/api/logs", get(logs::list))
        .route("/api/logs/stats", get(logs::stats))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run synchronous sampling or database work off the async executor.
pub async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Lenient query parameter: missing or unparsable values use `default`.
fn param<T: FromStr>(q: &HashMap<String, String>, key: &str, default: T) -> T {
    q.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn param_str(q: &HashMap<String, String>, key: &str) -> Option<String> {
    q.get(key).filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_fall_back_to_defaults() {
        let q: HashMap<String, String> = [("minutes", "30"), ("hours", "lots"), ("instance", "")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(param(&q, "minutes", 60i64), 30);
        assert_eq!(param(&q, "hours", 24i64), 24);
        assert_eq!(param(&q, "limit", 100i64), 100);
        assert_eq!(param_str(&q, "instance"), None);
    }
}
