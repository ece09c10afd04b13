use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::run_blocking;
use crate::auth::{verify_password, AuthUser, RefreshUser, TokenKind};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::users::UserView;

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserView,
}

pub async fn login(
    State(state): State<AppState>,
    body: Option<Json<LoginRequest>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("username and password are required".into()));
    }

    let db = state.db.clone();
    let user = run_blocking(move || {
        let user = db
            .find_user_by_username(&req.username)?
            .filter(|u| verify_password(&req.password, &u.password_hash))
            .ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?;
        let now = Utc::now();
        db.record_login(user.id, now)?;
        let mut view = UserView::from(&user);
        view.last_login = Some(now);
        Ok(view)
    })
    .await?;

    info!(user = %user.username, "login");
    Ok(Json(LoginResponse {
        access_token: state.tokens.issue(user.id, TokenKind::Access)?,
        refresh_token: state.tokens.issue(user.id, TokenKind::Refresh)?,
        user,
    }))
}

pub async fn refresh(
    RefreshUser { user_id }: RefreshUser,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let access_token = state.tokens.issue(user_id, TokenKind::Access)?;
    Ok(Json(json!({ "access_token": access_token })))
}

pub async fn me(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserView>, ApiError> {
    let db = state.db.clone();
    let user = run_blocking(move || Ok(db.find_user_by_id(user_id)?))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
    Ok(Json(UserView::from(&user)))
}

/// Tokens are stateless; the client discards them.
pub async fn logout(_user: AuthUser) -> Json<Value> {
    Json(json!({ "message": "logged out" }))
}
