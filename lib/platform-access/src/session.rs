//! Server-side sessions for browser logins.
//!
//! A session is created after a successful OIDC callback and referenced by
//! an opaque cookie value. It only ties the browser to a user; everything
//! else about the user is read from the user record.

use chrono::{DateTime, Duration, Utc};
use gatehouse_core::UserId;
use serde::{Deserialize, Serialize};

/// Unique identifier for a session.
///
/// Session IDs are opaque strings generated during session creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new session ID from a string.
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An authenticated browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// Raw ID token from the login, sent as `id_token_hint` on logout.
    id_token: Option<String>,
}

impl Session {
    /// Creates a new session for the given user, valid for `duration`.
    #[must_use]
    pub fn new(id: SessionId, user_id: UserId, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            created_at: now,
            expires_at: now + duration,
            id_token: None,
        }
    }

    /// Attaches the raw ID token obtained at login.
    #[must_use]
    pub fn with_id_token(mut self, id_token: String) -> Self {
        self.id_token = Some(id_token);
        self
    }

    /// Reconstitutes a session from storage.
    #[must_use]
    pub fn with_all_fields(
        id: SessionId,
        user_id: UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        id_token: Option<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            created_at,
            expires_at,
            id_token,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
