//! Authentication module for the gatehouse server.
//!
//! This module provides:
//! - The OIDC handshake with an external identity provider
//! - User synchronization and database-backed sessions
//! - Authentication extractors for session cookies and bearer tokens
//!
//! A browser logs in through `/oidc/authenticate` and `/oidc/callback` and
//! holds a session cookie. API clients trade that session for a bearer token
//! at `/api/token`. The two credentials are checked independently: a bearer
//! token stays valid until its expiry even after the session is logged out.

pub mod db;
pub mod middleware;
pub mod oidc;
pub mod routes;

use crate::config::SessionConfig;
use gatehouse_platform_access::{OidcConfig, SessionStore, TokenIssuer, UserStore, UserSynchronizer};
use std::sync::Arc;

pub use middleware::{AuthRejection, RequireBearer, RequireSession};
pub use oidc::{AuthState, IdentityProvider, OidcClient, OidcError, TokenResult};
pub use routes::{authenticate, callback, callback_form, logout};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Login state cookie name (CSRF, PKCE and nonce during the OIDC flow).
pub const LOGIN_STATE_COOKIE: &str = "auth_state";

/// Shared application state.
pub struct AppState {
    /// Identity provider used for the OIDC handshake.
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    /// Turns verified claims into local users.
    pub synchronizer: UserSynchronizer,
    pub tokens: TokenIssuer,
    pub oidc_config: OidcConfig,
    pub session_config: SessionConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        identity_provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        tokens: TokenIssuer,
        oidc_config: OidcConfig,
        session_config: SessionConfig,
    ) -> Self {
        let synchronizer = UserSynchronizer::new(
            users.clone(),
            oidc_config.claim_mapping(),
            oidc_config.create_user(),
        );
        Self {
            identity_provider,
            users,
            sessions,
            synchronizer,
            tokens,
            oidc_config,
            session_config,
        }
    }
}
