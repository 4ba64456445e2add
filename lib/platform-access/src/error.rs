//! Error types for the platform-access crate.
//!
//! - `StoreError`: persistence failures, reported through `rootcause::Report`
//! - `SyncError`: a login's claims could not be turned into a user record
//! - `TokenError`: bearer credential issuance or verification failed

use std::fmt;

/// Errors from user and session stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing database rejected or failed the operation.
    Database { details: String },
    /// A stored row could not be turned back into a domain value.
    Corrupt { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { details } => write!(f, "database error: {details}"),
            Self::Corrupt { details } => write!(f, "corrupt stored record: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from synchronizing a user with verified claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No user matches the subject and auto-creation is disabled.
    UserNotFound { subject: String },
    /// A first login without the access group; no user was created.
    AccessDenied { subject: String },
    /// The store failed; nothing was written.
    Store { details: String },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserNotFound { subject } => {
                write!(f, "no user for subject '{subject}' and user creation is disabled")
            }
            Self::AccessDenied { subject } => {
                write!(f, "subject '{subject}' is not allowed to access the platform")
            }
            Self::Store { details } => write!(f, "user store failed: {details}"),
        }
    }
}

impl std::error::Error for SyncError {}

/// Errors from issuing or verifying bearer credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// No signing key is configured.
    NoSigningKeys,
    /// The token could not be signed.
    Signing { details: String },
    /// The token's `exp` is in the past.
    Expired,
    /// Bad signature, wrong issuer, malformed token or subject.
    Invalid { reason: String },
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSigningKeys => write!(f, "no token signing keys configured"),
            Self::Signing { details } => write!(f, "failed to sign token: {details}"),
            Self::Expired => write!(f, "token has expired"),
            Self::Invalid { reason } => write!(f, "invalid token: {reason}"),
        }
    }
}

impl std::error::Error for TokenError {}
