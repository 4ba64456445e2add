//! In-memory stores.
//!
//! Only built for tests and with the `test-util` feature. A single mutex
//! per store gives the same all-or-nothing visibility the PostgreSQL
//! transaction provides.

use async_trait::async_trait;
use gatehouse_core::{Result, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::session::{Session, SessionId};
use crate::store::{SessionStore, UserStore};
use crate::user::User;

fn poisoned() -> StoreError {
    StoreError::Database {
        details: "store mutex poisoned".to_string(),
    }
}

/// User store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<UserId, User>>,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes every subsequent `save` fail without writing.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.lock().map(|users| users.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().map_err(|_| poisoned())?;
        Ok(users.values().find(|u| u.subject() == subject).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().map_err(|_| poisoned())?;
        Ok(users.get(&id).cloned())
    }

    async fn save(&self, user: &User) -> Result<UserId, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database {
                details: "writes disabled".to_string(),
            }
            .into());
        }

        let mut users = self.users.lock().map_err(|_| poisoned())?;
        let existing = users
            .values()
            .find(|u| u.subject() == user.subject() && u.id() != user.id())
            .map(|u| (u.id(), u.created_at()));

        // Same subject stored under another ID: update that row instead.
        let stored = match existing {
            Some((id, created_at)) => User::with_all_fields(
                id,
                user.subject().to_string(),
                user.username().to_string(),
                user.email().map(str::to_string),
                user.is_active(),
                user.is_staff(),
                user.groups().clone(),
                created_at,
                user.updated_at(),
            ),
            None => user.clone(),
        };

        let id = stored.id();
        users.insert(id, stored);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn group_members(&self, group: &str) -> Result<Vec<UserId>, StoreError> {
        let users = self.users.lock().map_err(|_| poisoned())?;
        let mut members: Vec<UserId> = users
            .values()
            .filter(|u| u.is_member_of(group))
            .map(User::id)
            .collect();
        members.sort_by_key(|id| id.as_ulid());
        Ok(members)
    }
}

/// Session store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .map(|sessions| sessions.len())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        sessions.insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.lock().map_err(|_| poisoned())?;
        Ok(sessions.get(id).cloned())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        sessions.remove(id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}
