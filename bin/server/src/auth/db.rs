//! PostgreSQL implementations of the user and session stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::{Result, UserId};
use gatehouse_platform_access::{Session, SessionId, SessionStore, StoreError, User, UserStore};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database {
        details: e.to_string(),
    }
}

fn parse_user_id(value: &str) -> std::result::Result<UserId, StoreError> {
    UserId::from_str(value).map_err(|e| StoreError::Corrupt {
        details: format!("invalid user id '{value}': {e}"),
    })
}

/// Row type for user queries, groups aggregated into an array.
#[derive(FromRow)]
struct UserRow {
    id: String,
    subject: String,
    username: String,
    email: Option<String>,
    is_active: bool,
    is_staff: bool,
    groups: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> std::result::Result<User, StoreError> {
        let id = parse_user_id(&self.id)?;
        Ok(User::with_all_fields(
            id,
            self.subject,
            self.username,
            self.email,
            self.is_active,
            self.is_staff,
            self.groups.into_iter().collect(),
            self.created_at,
            self.updated_at,
        ))
    }
}

const SELECT_USER: &str = r#"
    SELECT u.id, u.subject, u.username, u.email, u.is_active, u.is_staff,
           COALESCE(
               array_agg(ug.group_name ORDER BY ug.group_name)
                   FILTER (WHERE ug.group_name IS NOT NULL),
               '{}'
           ) AS groups,
           u.created_at, u.updated_at
    FROM users u
    LEFT JOIN user_groups ug ON ug.user_id = u.id
"#;

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    id_token: Option<String>,
}

impl SessionRow {
    fn try_into_session(self) -> std::result::Result<Session, StoreError> {
        let user_id = parse_user_id(&self.user_id)?;
        Ok(Session::with_all_fields(
            SessionId::new(self.id),
            user_id,
            self.created_at,
            self.expires_at,
            self.id_token,
        ))
    }
}

/// Repository for user operations.
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("{SELECT_USER} WHERE u.subject = $1 GROUP BY u.id"))
                .bind(subject)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        match row {
            Some(r) => Ok(Some(r.try_into_user()?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("{SELECT_USER} WHERE u.id = $1 GROUP BY u.id"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        match row {
            Some(r) => Ok(Some(r.try_into_user()?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user: &User) -> Result<UserId, StoreError> {
        let groups: Vec<String> = user.groups().iter().cloned().collect();

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Keyed on subject so a concurrent first login updates the row the
        // other login created instead of failing on the unique constraint.
        let (stored_id,): (String,) = sqlx::query_as(
            r#"
            INSERT INTO users
                (id, subject, username, email, is_active, is_staff, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (subject) DO UPDATE
            SET username = EXCLUDED.username,
                email = EXCLUDED.email,
                is_active = EXCLUDED.is_active,
                is_staff = EXCLUDED.is_staff,
                updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.subject())
        .bind(user.username())
        .bind(user.email())
        .bind(user.is_active())
        .bind(user.is_staff())
        .bind(user.created_at())
        .bind(user.updated_at())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO groups (name)
            SELECT UNNEST($1::text[])
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(&groups)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            DELETE FROM user_groups
            WHERE user_id = $1 AND NOT (group_name = ANY($2::text[]))
            "#,
        )
        .bind(&stored_id)
        .bind(&groups)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO user_groups (user_id, group_name)
            SELECT $1, UNNEST($2::text[])
            ON CONFLICT (user_id, group_name) DO NOTHING
            "#,
        )
        .bind(&stored_id)
        .bind(&groups)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        Ok(parse_user_id(&stored_id)?)
    }

    async fn group_members(&self, group: &str) -> Result<Vec<UserId>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM user_groups
            WHERE group_name = $1
            ORDER BY user_id
            "#,
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut members = Vec::with_capacity(rows.len());
        for (id,) in rows {
            members.push(parse_user_id(&id)?);
        }
        Ok(members)
    }
}

/// Repository for session operations.
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Creates a new session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, created_at, expires_at, id_token)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id().as_str())
        .bind(session.user_id().to_string())
        .bind(session.created_at())
        .bind(session.expires_at())
        .bind(session.id_token())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, created_at, expires_at, id_token
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match row {
            Some(r) => Ok(Some(r.try_into_session()?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}
