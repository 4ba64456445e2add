//! Mapping from verified claims to local account attributes.
//!
//! The identity provider is the authoritative source for a user's groups.
//! Staff and active flags are derived from group membership using the
//! configured group names.

use std::collections::BTreeSet;

use crate::auth::OidcClaims;

/// Rules for deriving account flags from group claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimMapping {
    staff_group: Option<String>,
    access_group: Option<String>,
}

impl ClaimMapping {
    /// Creates a mapping. `None` disables the corresponding rule.
    #[must_use]
    pub fn new(staff_group: Option<String>, access_group: Option<String>) -> Self {
        Self {
            staff_group,
            access_group,
        }
    }

    #[must_use]
    pub fn staff_group(&self) -> Option<&str> {
        self.staff_group.as_deref()
    }

    #[must_use]
    pub fn access_group(&self) -> Option<&str> {
        self.access_group.as_deref()
    }

    /// Computes the attributes a user with these claims should have.
    #[must_use]
    pub fn attributes(&self, claims: &OidcClaims) -> UserAttributes {
        let groups: BTreeSet<String> = claims
            .groups
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();

        let is_staff = self
            .staff_group
            .as_ref()
            .is_some_and(|staff| groups.contains(staff));

        // Without an access group every authenticated subject may use the app.
        let is_active = self
            .access_group
            .as_ref()
            .is_none_or(|access| groups.contains(access));

        let username = claims
            .preferred_username
            .clone()
            .or_else(|| claims.email.clone())
            .unwrap_or_else(|| claims.subject.clone());

        UserAttributes {
            username,
            email: claims.email.clone(),
            is_active,
            is_staff,
            groups,
        }
    }
}

/// The mutable part of a user record, as dictated by the latest claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAttributes {
    pub username: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub groups: BTreeSet<String>,
}
