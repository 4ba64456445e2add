//! Authentication extractors for Axum.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use gatehouse_platform_access::{AuthenticatedUser, SessionId, TokenError, User};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::{AppState, SESSION_COOKIE};

/// Extractor for requiring a valid browser session.
///
/// The session must exist, be unexpired and belong to an active user.
pub struct RequireSession(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireSession
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthRejection::InternalError)?;

        let session_cookie = jar
            .get(SESSION_COOKIE)
            .ok_or(AuthRejection::NotAuthenticated)?;

        let session_id = SessionId::new(session_cookie.value().to_string());

        let session = app_state
            .sessions
            .find_by_id(&session_id)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to load session");
                AuthRejection::InternalError
            })?
            .ok_or(AuthRejection::NotAuthenticated)?;

        if session.is_expired() {
            if let Err(e) = app_state.sessions.delete(&session_id).await {
                warn!(session_id = %session_id, error = %e, "failed to delete expired session");
            }
            return Err(AuthRejection::SessionExpired);
        }

        let user = load_active_user(&app_state, session.user_id()).await?;

        Ok(RequireSession(AuthenticatedUser::new(session, user)))
    }
}

/// Extractor for requiring a valid bearer token.
///
/// Reads `Authorization: Bearer <token>`, verifies it and loads the active
/// user it was issued to.
pub struct RequireBearer(pub User);

impl<S> FromRequestParts<S> for RequireBearer
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let token = bearer_token(parts).ok_or(AuthRejection::MissingBearer)?;

        let user_id = app_state.tokens.verify(token).map_err(|e| {
            debug!(error = %e, "bearer token rejected");
            match e {
                TokenError::Expired => AuthRejection::TokenExpired,
                _ => AuthRejection::InvalidToken,
            }
        })?;

        let user = load_active_user(&app_state, user_id).await?;

        Ok(RequireBearer(user))
    }
}

/// Returns the credential from an `Authorization: Bearer` header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

async fn load_active_user(
    app_state: &AppState,
    user_id: gatehouse_core::UserId,
) -> Result<User, AuthRejection> {
    let user = app_state
        .users
        .find_by_id(user_id)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "failed to load user");
            AuthRejection::InternalError
        })?
        .ok_or(AuthRejection::NotAuthenticated)?;

    if !user.is_active() {
        debug!(user_id = %user_id, "inactive user rejected");
        return Err(AuthRejection::Inactive);
    }

    Ok(user)
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    SessionExpired,
    MissingBearer,
    InvalidToken,
    TokenExpired,
    Inactive,
    InternalError,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotAuthenticated => (StatusCode::UNAUTHORIZED, "authentication required"),
            Self::SessionExpired => (StatusCode::UNAUTHORIZED, "session expired"),
            Self::MissingBearer => (StatusCode::UNAUTHORIZED, "missing bearer token"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid token"),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "token expired"),
            Self::Inactive => (StatusCode::UNAUTHORIZED, "user is inactive"),
            Self::InternalError => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_authorization(value: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .header(header::AUTHORIZATION, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn bearer_token_is_extracted() {
        let parts = parts_with_authorization("Bearer abc.def.ghi");
        assert_eq!(bearer_token(&parts), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let parts = parts_with_authorization("bearer abc");
        assert_eq!(bearer_token(&parts), Some("abc"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        let parts = parts_with_authorization("Basic dXNlcjpwYXNz");
        assert_eq!(bearer_token(&parts), None);
    }

    #[test]
    fn empty_bearer_is_ignored() {
        let parts = parts_with_authorization("Bearer  ");
        assert_eq!(bearer_token(&parts), None);
    }

    #[test]
    fn rejections_are_json_with_challenge() {
        let response = AuthRejection::InvalidToken.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn internal_error_is_500() {
        let response = AuthRejection::InternalError.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
