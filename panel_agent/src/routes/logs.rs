use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::Serialize;

use super::{param, param_str, run_blocking};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::audit::{ActionLog, LogFilter, LogStats};

/// Seven days.
pub const MAX_LOG_WINDOW_HOURS: i64 = 168;
pub const MAX_LOG_LIMIT: u32 = 500;
pub const DEFAULT_LOG_HOURS: i64 = 24;
pub const DEFAULT_LOG_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<ActionLog>,
    pub count: usize,
}

fn window_start(q: &HashMap<String, String>) -> chrono::DateTime<Utc> {
    let hours = param(q, "hours", DEFAULT_LOG_HOURS).clamp(0, MAX_LOG_WINDOW_HOURS);
    Utc::now() - Duration::hours(hours)
}

pub async fn list(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<LogsResponse>, ApiError> {
    let filter = LogFilter {
        instance: param_str(&q, "instance"),
        action: param_str(&q, "action"),
        user_id: q.get("user_id").and_then(|v| v.parse().ok()),
        since: window_start(&q),
        limit: param(&q, "limit", DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT),
    };
    let db = state.db.clone();
    let logs = run_blocking(move || Ok(db.query_actions(&filter)?)).await?;
    Ok(Json(LogsResponse {
        count: logs.len(),
        logs,
    }))
}

pub async fn stats(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<LogStats>, ApiError> {
    let since = window_start(&q);
    let db = state.db.clone();
    let stats = run_blocking(move || Ok(db.action_stats(since)?)).await?;
    Ok(Json(stats))
}
