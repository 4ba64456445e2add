//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.
//!
//! See [`OidcConfig`](gatehouse_platform_access::OidcConfig) for
//! OIDC authentication configuration.

use chrono::Duration;
use gatehouse_platform_access::{OidcConfig, TokenError, TokenIssuer};
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Socket address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// OIDC authentication configuration.
    pub oidc: OidcConfig,

    /// Bearer token configuration.
    pub token: TokenConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session duration in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Whether to set the Secure flag on the session cookie (requires HTTPS).
    /// Defaults to true; set to false for local HTTP development. The
    /// short-lived login-state cookie is always Secure.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_session_duration_minutes() -> i64 {
    480
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

impl SessionConfig {
    /// Returns the session lifetime.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }
}

/// Bearer token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Comma-separated HMAC secrets. The first signs; all verify.
    pub signing_keys: String,

    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl_seconds")]
    pub ttl_seconds: i64,

    /// Value of the `iss` claim.
    #[serde(default = "default_token_issuer")]
    pub issuer: String,
}

fn default_token_ttl_seconds() -> i64 {
    3600
}

fn default_token_issuer() -> String {
    "gatehouse".to_string()
}

impl TokenConfig {
    /// Returns the configured signing keys, blank entries removed.
    #[must_use]
    pub fn signing_keys(&self) -> Vec<&str> {
        self.signing_keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// Builds the token issuer for this configuration.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::NoSigningKeys` if no key is configured.
    pub fn issuer(&self) -> Result<TokenIssuer, TokenError> {
        TokenIssuer::new(
            &self.signing_keys(),
            self.issuer.clone(),
            Duration::seconds(self.ttl_seconds),
        )
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
