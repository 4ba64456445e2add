//! User synchronization from verified claims.
//!
//! Every successful login runs the claims through [`UserSynchronizer`]:
//! the user is looked up by subject, created if allowed, and its attributes
//! and group memberships are replaced with what the claims say. A login
//! whose claims match the stored record writes nothing.

use gatehouse_core::UserId;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::auth::OidcClaims;
use crate::error::SyncError;
use crate::mapping::ClaimMapping;
use crate::store::UserStore;
use crate::user::{User, UserChange};

/// How a synchronization affected the stored user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// First login; the user was created.
    Created,
    /// The stored user differed from the claims and was rewritten.
    Updated(UserChange),
    /// The stored user already matched the claims.
    Unchanged,
}

/// Result of a successful synchronization.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The user as stored after synchronization.
    pub user: User,
    pub status: SyncStatus,
}

/// Creates and updates local users from OIDC claims.
#[derive(Clone)]
pub struct UserSynchronizer {
    store: Arc<dyn UserStore>,
    mapping: ClaimMapping,
    create_user: bool,
}

impl UserSynchronizer {
    /// Creates a synchronizer. With `create_user` false, unknown subjects fail.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, mapping: ClaimMapping, create_user: bool) -> Self {
        Self {
            store,
            mapping,
            create_user,
        }
    }

    /// Brings the local user for `claims.subject` in line with `claims`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UserNotFound` when the subject is unknown and user
    /// creation is disabled, `SyncError::AccessDenied` when an unknown subject
    /// lacks the access group, and `SyncError::Store` when the store fails.
    /// In all cases nothing has been written.
    #[instrument(skip(self, claims), fields(subject = %claims.subject))]
    pub async fn synchronize(&self, claims: &OidcClaims) -> Result<SyncOutcome, SyncError> {
        let attributes = self.mapping.attributes(claims);

        let existing = self
            .store
            .find_by_subject(&claims.subject)
            .await
            .map_err(|e| SyncError::Store {
                details: e.to_string(),
            })?;

        let Some(mut user) = existing else {
            if !self.create_user {
                debug!("unknown subject and user creation disabled");
                return Err(SyncError::UserNotFound {
                    subject: claims.subject.clone(),
                });
            }

            if !attributes.is_active {
                debug!("first login without access; no user created");
                return Err(SyncError::AccessDenied {
                    subject: claims.subject.clone(),
                });
            }

            let user = User::from_attributes(claims.subject.clone(), attributes);
            let stored_id = self.save(&user).await?;
            // A concurrent first login stored this subject under its own ID.
            let user = if stored_id == user.id() {
                user
            } else {
                self.reload(stored_id).await?
            };
            info!(
                user_id = %user.id(),
                groups = user.groups().len(),
                "created user from claims"
            );
            return Ok(SyncOutcome {
                user,
                status: SyncStatus::Created,
            });
        };

        let change = user.apply(attributes);
        if change.is_empty() {
            debug!(user_id = %user.id(), "user already matches claims");
            return Ok(SyncOutcome {
                user,
                status: SyncStatus::Unchanged,
            });
        }

        self.save(&user).await?;
        info!(
            user_id = %user.id(),
            attributes_changed = change.attributes_changed,
            groups_added = change.membership.added().len(),
            groups_removed = change.membership.removed().len(),
            "updated user from claims"
        );
        Ok(SyncOutcome {
            user,
            status: SyncStatus::Updated(change),
        })
    }

    async fn save(&self, user: &User) -> Result<UserId, SyncError> {
        self.store.save(user).await.map_err(|e| SyncError::Store {
            details: e.to_string(),
        })
    }

    async fn reload(&self, id: UserId) -> Result<User, SyncError> {
        self.store
            .find_by_id(id)
            .await
            .map_err(|e| SyncError::Store {
                details: e.to_string(),
            })?
            .ok_or_else(|| SyncError::Store {
                details: format!("user {id} missing after save"),
            })
    }
}
