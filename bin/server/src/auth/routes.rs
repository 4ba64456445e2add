//! Authentication routes for the OIDC handshake and logout.

use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatehouse_platform_access::{Session, SessionId, SyncError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::{error, info, warn};

use super::{AppState, LOGIN_STATE_COOKIE, SESSION_COOKIE, oidc::AuthState, oidc::OidcError};

/// Query parameters for starting a login.
#[derive(Debug, Deserialize)]
pub struct AuthenticateQuery {
    /// Local path to return to after login.
    next: Option<String>,
}

/// Parameters of the provider redirect back to the callback.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Login state kept in a short-lived cookie between redirect and callback.
#[derive(Debug, Serialize, Deserialize)]
struct LoginState {
    #[serde(flatten)]
    auth: AuthState,
    next: Option<String>,
}

impl LoginState {
    fn encode(&self) -> Result<String, AuthError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| AuthError::Internal(format!("failed to encode login state: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(value: &str) -> Result<Self, AuthError> {
        let json = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| AuthError::InvalidLoginState)?;
        serde_json::from_slice(&json).map_err(|_| AuthError::InvalidLoginState)
    }
}

/// Returns true for paths on this site only.
///
/// Rejects scheme-relative (`//host`) and backslash forms browsers treat as
/// another origin.
pub fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// Initiates the OIDC login flow by redirecting to the identity provider.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthenticateQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let (auth_url, auth) = state.identity_provider.authorization_url();

    let next = query.next.filter(|next| {
        let local = is_local_path(next);
        if !local {
            warn!(next = %next, "ignoring non-local next parameter");
        }
        local
    });

    let login_state = LoginState { auth, next }.encode()?;

    let cookie = Cookie::build((LOGIN_STATE_COOKIE, login_state))
        .path("/")
        .http_only(true)
        // Providers using response_mode=form_post call back with a cross-site
        // POST, which only carries SameSite=None cookies.
        .secure(true)
        .same_site(SameSite::None)
        .max_age(TimeDuration::minutes(10));

    Ok((jar.add(cookie), Redirect::to(&auth_url)))
}

/// Handles the provider redirect when it arrives as a query string.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AuthError> {
    complete_login(&state, jar, params).await
}

/// Handles the provider redirect when it arrives as a form post.
pub async fn callback_form(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(params): Form<CallbackParams>,
) -> Result<Response, AuthError> {
    complete_login(&state, jar, params).await
}

async fn complete_login(
    state: &AppState,
    jar: CookieJar,
    params: CallbackParams,
) -> Result<Response, AuthError> {
    if let Some(error) = params.error {
        return Err(AuthError::ProviderRejected {
            error,
            description: params.error_description,
        });
    }

    let login_state_cookie = jar
        .get(LOGIN_STATE_COOKIE)
        .ok_or(AuthError::MissingLoginState)?;
    let login_state = LoginState::decode(login_state_cookie.value())?;

    if params.state.as_deref() != Some(login_state.auth.csrf_token.as_str()) {
        return Err(AuthError::StateMismatch);
    }

    let code = params.code.ok_or(AuthError::MissingCode)?;

    let token_result = state
        .identity_provider
        .exchange_code(&code, &login_state.auth)
        .await
        .map_err(|e| match e {
            OidcError::TokenValidation(msg) => AuthError::InvalidIdToken(msg),
            other => AuthError::TokenExchange(other.to_string()),
        })?;

    let outcome = state
        .synchronizer
        .synchronize(&token_result.claims)
        .await
        .map_err(|e| match e {
            SyncError::UserNotFound { subject } => AuthError::UnknownUser(subject),
            SyncError::AccessDenied { subject } => {
                info!(subject = %subject, "refusing first login without access");
                AuthError::InactiveUser
            }
            SyncError::Store { details } => AuthError::Internal(details),
        })?;
    let user = outcome.user;

    if !user.is_active() {
        info!(user_id = %user.id(), "refusing login of inactive user");
        return Err(AuthError::InactiveUser);
    }

    // A session id that existed before login must not survive it.
    if let Some(previous) = jar.get(SESSION_COOKIE) {
        let previous = SessionId::new(previous.value().to_string());
        state
            .sessions
            .delete(&previous)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
    }

    let session = Session::new(
        SessionId::generate(),
        user.id(),
        state.session_config.duration(),
    )
    .with_id_token(token_result.id_token);

    state
        .sessions
        .create(&session)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    info!(
        user_id = %user.id(),
        subject = %user.subject(),
        session_id = %session.id(),
        "user logged in"
    );

    let session_cookie = Cookie::build((SESSION_COOKIE, session.id().as_str().to_string()))
        .path("/")
        .http_only(true)
        .secure(state.session_config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(state.session_config.duration_minutes));

    let remove_login_state = Cookie::build((LOGIN_STATE_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);

    let jar = jar.add(session_cookie).add(remove_login_state);

    let target = login_state
        .next
        .filter(|next| is_local_path(next))
        .unwrap_or_else(|| state.oidc_config.login_redirect_url().to_string());

    Ok((jar, Redirect::to(&target)).into_response())
}

/// Logs out the user and redirects to the provider's end-session endpoint.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let mut id_token_hint = None;

    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        let session_id = SessionId::new(session_cookie.value().to_string());

        match state.sessions.find_by_id(&session_id).await {
            Ok(Some(session)) => {
                info!(user_id = %session.user_id(), session_id = %session_id, "user logged out");
                id_token_hint = session.id_token().map(str::to_string);
            }
            Ok(None) => {}
            Err(e) => warn!(session_id = %session_id, error = %e, "failed to load session"),
        }

        if let Err(e) = state.sessions.delete(&session_id).await {
            warn!(session_id = %session_id, error = %e, "failed to delete session");
        }
    }

    let target = state
        .identity_provider
        .end_session_url(id_token_hint.as_deref())
        .or_else(|| {
            state
                .oidc_config
                .post_logout_redirect_uri()
                .map(str::to_string)
        })
        .unwrap_or_else(|| "/".to_string());

    let remove_session = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);

    (jar.add(remove_session), Redirect::to(&target))
}

/// Authentication errors.
#[derive(Debug)]
pub enum AuthError {
    MissingLoginState,
    InvalidLoginState,
    StateMismatch,
    MissingCode,
    ProviderRejected {
        error: String,
        description: Option<String>,
    },
    TokenExchange(String),
    InvalidIdToken(String),
    UnknownUser(String),
    InactiveUser,
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::MissingLoginState => (StatusCode::BAD_REQUEST, "Missing login state"),
            Self::InvalidLoginState => (StatusCode::BAD_REQUEST, "Invalid login state"),
            Self::StateMismatch => (StatusCode::BAD_REQUEST, "State parameter mismatch"),
            Self::MissingCode => (StatusCode::BAD_REQUEST, "Missing authorization code"),
            Self::ProviderRejected { error, description } => {
                warn!(
                    error = %error,
                    description = description.as_deref().unwrap_or_default(),
                    "identity provider returned an error"
                );
                (StatusCode::BAD_REQUEST, "Authentication failed")
            }
            Self::TokenExchange(msg) => {
                error!("Token exchange failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "Authentication failed")
            }
            Self::InvalidIdToken(msg) => {
                warn!("ID token rejected: {}", msg);
                (StatusCode::UNAUTHORIZED, "Authentication failed")
            }
            Self::UnknownUser(subject) => {
                info!(subject = %subject, "login refused for unknown user");
                (
                    StatusCode::FORBIDDEN,
                    "Access denied - no account exists for this user",
                )
            }
            Self::InactiveUser => (StatusCode::FORBIDDEN, "Access denied - account is inactive"),
            Self::Internal(msg) => {
                error!("Internal error during login: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}
