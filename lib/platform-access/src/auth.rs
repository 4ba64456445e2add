//! Verified identity claims and the authenticated request context.

use crate::session::Session;
use crate::user::User;
use gatehouse_core::UserId;

/// Claims extracted from a verified OIDC ID token (and userinfo response).
///
/// These drive creation and update of the local user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcClaims {
    /// The subject claim (unique user identifier from the provider).
    pub subject: String,
    /// The issuer URL.
    pub issuer: String,
    /// Email address (optional).
    pub email: Option<String>,
    /// The `preferred_username` claim (optional).
    pub preferred_username: Option<String>,
    /// Group memberships (from the configured groups claim).
    pub groups: Vec<String>,
}

impl OidcClaims {
    /// Creates a new set of OIDC claims.
    #[must_use]
    pub fn new(subject: String, issuer: String) -> Self {
        Self {
            subject,
            issuer,
            email: None,
            preferred_username: None,
            groups: Vec::new(),
        }
    }

    /// Sets the email claim.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Sets the preferred username claim.
    #[must_use]
    pub fn with_preferred_username(mut self, username: Option<String>) -> Self {
        self.preferred_username = username;
        self
    }

    /// Sets the groups.
    #[must_use]
    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }
}

/// A session that has been validated together with the user it belongs to.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    session: Session,
    user: User,
}

impl AuthenticatedUser {
    /// Creates a new authenticated user context.
    #[must_use]
    pub fn new(session: Session, user: User) -> Self {
        Self { session, user }
    }

    /// Returns the authenticated user's ID.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user.id()
    }

    /// Returns the current session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the user record.
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }
}
