//! Live snapshot, stored history and the collection trigger.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::{param, run_blocking};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::sampler::collect_once;
use crate::state::AppState;
use crate::types::{MetricsSnapshot, StoredMetricPoint};

/// 24 hours at a one-minute collection cadence.
pub const MAX_HISTORY_POINTS: u32 = 1440;
pub const DEFAULT_HISTORY_MINUTES: i64 = 60;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub metrics: Vec<StoredMetricPoint>,
    pub count: usize,
}

pub async fn current(
    _user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MetricsSnapshot>, ApiError> {
    let sampler = state.sampler.clone();
    let snapshot = run_blocking(move || Ok(sampler.sample_all())).await?;
    Ok(Json(snapshot))
}

/// `?minutes=N` both sizes the window and caps the point count, at most
/// `MAX_HISTORY_POINTS`.
pub async fn history(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let minutes =
        param(&q, "minutes", DEFAULT_HISTORY_MINUTES).clamp(0, i64::from(MAX_HISTORY_POINTS));
    let since = Utc::now() - Duration::minutes(minutes);
    let limit = minutes as u32;

    let db = state.db.clone();
    let metrics = run_blocking(move || Ok(db.query_window(since, limit)?)).await?;
    Ok(Json(HistoryResponse {
        count: metrics.len(),
        metrics,
    }))
}

pub async fn save(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if let Some(expected) = state.collect_token.as_ref() {
        match q.get("token") {
            Some(t) if t == expected => {}
            _ => return Err(ApiError::Unauthorized("invalid collection token".into())),
        }
    }
    let id = collect_once(&state).await?;
    info!(id, "metrics point saved");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "metrics saved", "id": id })),
    ))
}
