//! User domain type.
//!
//! A User is the local record of someone who has logged in through the
//! identity provider. It is keyed internally by `UserId` and matched to the
//! provider by the OIDC subject claim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::group::MembershipChange;
use crate::mapping::UserAttributes;
use gatehouse_core::UserId;

/// A local user account linked to an OIDC subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Internal user ID.
    id: UserId,
    /// OIDC subject claim - unique identifier from the identity provider.
    subject: String,
    username: String,
    email: Option<String>,
    is_active: bool,
    is_staff: bool,
    /// Names of the groups the user belongs to.
    groups: BTreeSet<String>,
    created_at: DateTime<Utc>,
    /// Only moves when a synchronization actually changed something.
    updated_at: DateTime<Utc>,
}

/// What `User::apply` changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChange {
    /// Username, email or one of the flags differed.
    pub attributes_changed: bool,
    /// Group membership delta.
    pub membership: MembershipChange,
}

impl UserChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.attributes_changed && self.membership.is_empty()
    }
}

impl User {
    /// Creates a new active user with no groups.
    #[must_use]
    pub fn new(subject: String, username: String) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            subject,
            username,
            email: None,
            is_active: true,
            is_staff: false,
            groups: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a user from the attributes derived from a first login.
    #[must_use]
    pub fn from_attributes(subject: String, attributes: UserAttributes) -> Self {
        let mut user = Self::new(subject, attributes.username.clone());
        user.email = attributes.email;
        user.is_active = attributes.is_active;
        user.is_staff = attributes.is_staff;
        user.groups = attributes.groups;
        user
    }

    /// Creates a user with all fields specified.
    ///
    /// Use this when reconstituting a user from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: UserId,
        subject: String,
        username: String,
        email: Option<String>,
        is_active: bool,
        is_staff: bool,
        groups: BTreeSet<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subject,
            username,
            email,
            is_active,
            is_staff,
            groups,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Returns the OIDC subject claim.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn is_staff(&self) -> bool {
        self.is_staff
    }

    #[must_use]
    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    #[must_use]
    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Brings the record in line with `attributes`.
    ///
    /// Group membership is replaced, not merged. `updated_at` is touched only
    /// when the returned change is non-empty.
    pub fn apply(&mut self, attributes: UserAttributes) -> UserChange {
        let attributes_changed = self.username != attributes.username
            || self.email != attributes.email
            || self.is_active != attributes.is_active
            || self.is_staff != attributes.is_staff;
        let membership = MembershipChange::between(&self.groups, &attributes.groups);

        let change = UserChange {
            attributes_changed,
            membership,
        };
        if change.is_empty() {
            return change;
        }

        self.username = attributes.username;
        self.email = attributes.email;
        self.is_active = attributes.is_active;
        self.is_staff = attributes.is_staff;
        self.groups = attributes.groups;
        self.updated_at = Utc::now();
        change
    }
}
