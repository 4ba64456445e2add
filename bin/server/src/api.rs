//! JSON API: bearer token issuance and the current user's profile.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::{AppState, RequireBearer, RequireSession};
use crate::error::ApiError;

/// Response body of `POST /api/token`.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

/// Response body of `GET /api/me`.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub groups: Vec<String>,
}

/// Issues a bearer token for the user behind the session cookie.
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    RequireSession(auth): RequireSession,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.tokens.issue(auth.user_id())?;

    info!(
        user_id = %auth.user_id(),
        token_id = %token.token_id,
        expires_at = %token.expires_at,
        "issued bearer token"
    );

    Ok(Json(TokenResponse {
        access_token: token.access_token,
        token_type: "Bearer",
        expires_at: token.expires_at,
    }))
}

/// Returns the profile of the user the bearer token was issued to.
pub async fn me(RequireBearer(user): RequireBearer) -> Json<UserProfile> {
    Json(UserProfile {
        id: user.id().to_string(),
        username: user.username().to_string(),
        email: user.email().map(str::to_string),
        is_active: user.is_active(),
        is_staff: user.is_staff(),
        groups: user.groups().iter().cloned().collect(),
    })
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}
