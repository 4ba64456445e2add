//! HTTP routing for the gatehouse server.

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::{self, AppState};

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // OIDC handshake
        .route("/oidc/authenticate", get(auth::authenticate))
        .route(
            "/oidc/callback",
            get(auth::callback).post(auth::callback_form),
        )
        .route("/oidc/logout", get(auth::logout).post(auth::logout))
        // API
        .route("/api/token", post(api::get_token))
        .route("/api/me", get(api::me))
        .route("/health", get(api::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
