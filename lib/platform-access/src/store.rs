//! Persistence seams for users and sessions.
//!
//! The server backs these with PostgreSQL; tests use the in-memory
//! implementations in [`crate::memory`].

use async_trait::async_trait;
use gatehouse_core::{Result, UserId};

use crate::error::StoreError;
use crate::session::{Session, SessionId};
use crate::user::User;

/// Storage for user records and their group memberships.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds a user by the OIDC subject claim.
    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>, StoreError>;

    /// Finds a user by internal ID.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Inserts or updates the user and replaces its group memberships.
    ///
    /// Implementations must apply the row and the membership replacement
    /// atomically: readers never observe a partially applied group update.
    /// Users are matched by subject, so when another writer stored the same
    /// subject first its row is updated instead. Returns the ID of the
    /// stored row, which then differs from `user.id()`.
    async fn save(&self, user: &User) -> Result<UserId, StoreError>;

    /// Lists the members of a group.
    async fn group_members(&self, group: &str) -> Result<Vec<UserId>, StoreError>;
}

/// Storage for browser sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Deletes a session. Deleting an unknown session is not an error.
    async fn delete(&self, id: &SessionId) -> Result<(), StoreError>;

    /// Deletes expired sessions, returning how many were removed.
    async fn delete_expired(&self) -> Result<u64, StoreError>;
}
