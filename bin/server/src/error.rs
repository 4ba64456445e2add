//! Error types for the JSON API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gatehouse_platform_access::TokenError;
use serde_json::json;
use std::fmt;

/// Errors returned by `/api` handlers after authentication succeeded.
#[derive(Debug)]
pub enum ApiError {
    /// The bearer token could not be issued.
    TokenIssuance { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenIssuance { details } => write!(f, "token issuance failed: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        Self::TokenIssuance {
            details: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "API request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal server error" })),
        )
            .into_response()
    }
}
