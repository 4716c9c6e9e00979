//! Session repository
//!
//! Database operations for user sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL
//!
//! Session identifiers are random v4 UUIDs generated here, on insert, and
//! stored in their hyphenated text form.

use super::StoreError;
use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{NewUserSession, SessionFilter, UserSession};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session under a freshly generated identifier
    async fn create(&self, session: &NewUserSession) -> Result<UserSession, StoreError>;

    /// Get session by identifier; `StoreError::NotFound` if absent
    async fn get(&self, uuid: &Uuid) -> Result<UserSession, StoreError>;

    /// List sessions matching the filter, ordered by expiration
    async fn filter(&self, filter: SessionFilter) -> Result<Vec<UserSession>, StoreError>;

    /// Delete the given sessions, returning how many rows were removed.
    /// Deleting nothing is not an error.
    async fn delete_many(&self, sessions: &[UserSession]) -> Result<u64, StoreError>;

    /// Overwrite the owner and expiration of an existing session
    async fn update(&self, session: &UserSession) -> Result<(), StoreError>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &NewUserSession) -> Result<UserSession, StoreError> {
        let session = UserSession {
            uuid: Uuid::new_v4(),
            user_id: session.user_id,
            expires_at: session.expires_at,
        };

        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_session_sqlite(sqlite(&self.pool)?, &session).await?,
            DatabaseDriver::Mysql => create_session_mysql(mysql(&self.pool)?, &session).await?,
        }
        Ok(session)
    }

    async fn get(&self, uuid: &Uuid) -> Result<UserSession, StoreError> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_session_sqlite(sqlite(&self.pool)?, uuid).await,
            DatabaseDriver::Mysql => get_session_mysql(mysql(&self.pool)?, uuid).await,
        }
    }

    async fn filter(&self, filter: SessionFilter) -> Result<Vec<UserSession>, StoreError> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => filter_sessions_sqlite(sqlite(&self.pool)?, filter).await,
            DatabaseDriver::Mysql => filter_sessions_mysql(mysql(&self.pool)?, filter).await,
        }
    }

    async fn delete_many(&self, sessions: &[UserSession]) -> Result<u64, StoreError> {
        if sessions.is_empty() {
            return Ok(0);
        }

        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_sessions_sqlite(sqlite(&self.pool)?, sessions).await,
            DatabaseDriver::Mysql => delete_sessions_mysql(mysql(&self.pool)?, sessions).await,
        }
    }

    async fn update(&self, session: &UserSession) -> Result<(), StoreError> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => update_session_sqlite(sqlite(&self.pool)?, session).await?,
            DatabaseDriver::Mysql => update_session_mysql(mysql(&self.pool)?, session).await?,
        };

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Ok(Uuid::parse_str(raw)
        .with_context(|| format!("Invalid session identifier in store: {:?}", raw))?)
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &UserSession) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO user_sessions (uuid, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(session.uuid.to_string())
        .bind(session.user_id)
        .bind(session.expires_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(())
}

async fn get_session_sqlite(pool: &SqlitePool, uuid: &Uuid) -> Result<UserSession, StoreError> {
    let row = sqlx::query("SELECT uuid, user_id, expires_at FROM user_sessions WHERE uuid = ?")
        .bind(uuid.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get session")?
        .ok_or(StoreError::NotFound)?;

    row_to_session_sqlite(&row)
}

async fn filter_sessions_sqlite(
    pool: &SqlitePool,
    filter: SessionFilter,
) -> Result<Vec<UserSession>, StoreError> {
    let mut query =
        QueryBuilder::<Sqlite>::new("SELECT uuid, user_id, expires_at FROM user_sessions WHERE 1 = 1");
    if let Some(user_id) = filter.user_id {
        query.push(" AND user_id = ").push_bind(user_id);
    }
    if filter.expired_only {
        query.push(" AND expires_at < ").push_bind(Utc::now());
    }
    query.push(" ORDER BY expires_at");

    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to filter sessions")?;

    rows.iter().map(row_to_session_sqlite).collect()
}

async fn delete_sessions_sqlite(
    pool: &SqlitePool,
    sessions: &[UserSession],
) -> Result<u64, StoreError> {
    let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM user_sessions WHERE uuid IN (");
    let mut separated = query.separated(", ");
    for session in sessions {
        separated.push_bind(session.uuid.to_string());
    }
    separated.push_unseparated(")");

    let result = query
        .build()
        .execute(pool)
        .await
        .context("Failed to delete sessions")?;

    Ok(result.rows_affected())
}

async fn update_session_sqlite(pool: &SqlitePool, session: &UserSession) -> Result<u64, StoreError> {
    let result = sqlx::query("UPDATE user_sessions SET user_id = ?, expires_at = ? WHERE uuid = ?")
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.uuid.to_string())
        .execute(pool)
        .await
        .context("Failed to update session")?;

    Ok(result.rows_affected())
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<UserSession, StoreError> {
    Ok(UserSession {
        uuid: parse_uuid(row.get("uuid"))?,
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &UserSession) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO user_sessions (uuid, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(session.uuid.to_string())
        .bind(session.user_id)
        .bind(session.expires_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(())
}

async fn get_session_mysql(pool: &MySqlPool, uuid: &Uuid) -> Result<UserSession, StoreError> {
    let row = sqlx::query("SELECT uuid, user_id, expires_at FROM user_sessions WHERE uuid = ?")
        .bind(uuid.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get session")?
        .ok_or(StoreError::NotFound)?;

    row_to_session_mysql(&row)
}

async fn filter_sessions_mysql(
    pool: &MySqlPool,
    filter: SessionFilter,
) -> Result<Vec<UserSession>, StoreError> {
    let mut query =
        QueryBuilder::<MySql>::new("SELECT uuid, user_id, expires_at FROM user_sessions WHERE 1 = 1");
    if let Some(user_id) = filter.user_id {
        query.push(" AND user_id = ").push_bind(user_id);
    }
    if filter.expired_only {
        query.push(" AND expires_at < ").push_bind(Utc::now());
    }
    query.push(" ORDER BY expires_at");

    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to filter sessions")?;

    rows.iter().map(row_to_session_mysql).collect()
}

async fn delete_sessions_mysql(pool: &MySqlPool, sessions: &[UserSession]) -> Result<u64, StoreError> {
    let mut query = QueryBuilder::<MySql>::new("DELETE FROM user_sessions WHERE uuid IN (");
    let mut separated = query.separated(", ");
    for session in sessions {
        separated.push_bind(session.uuid.to_string());
    }
    separated.push_unseparated(")");

    let result = query
        .build()
        .execute(pool)
        .await
        .context("Failed to delete sessions")?;

    Ok(result.rows_affected())
}

async fn update_session_mysql(pool: &MySqlPool, session: &UserSession) -> Result<u64, StoreError> {
    let result = sqlx::query("UPDATE user_sessions SET user_id = ?, expires_at = ? WHERE uuid = ?")
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.uuid.to_string())
        .execute(pool)
        .await
        .context("Failed to update session")?;

    Ok(result.rows_affected())
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<UserSession, StoreError> {
    Ok(UserSession {
        uuid: parse_uuid(row.get("uuid"))?,
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use chrono::{Duration, SubsecRound};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_test_user(pool: &DynDatabasePool, login: &str) -> i64 {
        SqlxUserRepository::new(pool.clone())
            .upsert(&User::new(login, "hash", true))
            .await
            .expect("Failed to create test user")
            .id
    }

    fn new_session(user_id: i64, expires_in: Duration) -> NewUserSession {
        NewUserSession {
            user_id,
            expires_at: (Utc::now() + expires_in).trunc_subsecs(6),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "alice").await;

        let input = new_session(user_id, Duration::days(7));
        let created = repo.create(&input).await.expect("Failed to create session");

        assert_eq!(created.user_id, user_id);
        assert_eq!(created.expires_at, input.expires_at);

        let found = repo.get(&created.uuid).await.expect("Failed to get session");
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn test_create_generates_distinct_identifiers() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "alice").await;

        let a = repo.create(&new_session(user_id, Duration::days(1))).await.unwrap();
        let b = repo.create(&new_session(user_id, Duration::days(1))).await.unwrap();

        assert_ne!(a.uuid, b.uuid);
        assert_eq!(a.uuid.get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_get_unknown_session_is_not_found() {
        let (_pool, repo) = setup_test_repo().await;

        let err = repo.get(&Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_filter_expired_for_user() {
        let (pool, repo) = setup_test_repo().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;

        let expired = repo.create(&new_session(alice, -Duration::hours(1))).await.unwrap();
        repo.create(&new_session(alice, Duration::hours(1))).await.unwrap();
        repo.create(&new_session(bob, -Duration::hours(1))).await.unwrap();

        let found = repo
            .filter(SessionFilter::expired_for_user(alice))
            .await
            .unwrap();
        assert_eq!(found, vec![expired]);
    }

    #[tokio::test]
    async fn test_filter_without_constraints_returns_all() {
        let (pool, repo) = setup_test_repo().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;

        repo.create(&new_session(alice, -Duration::hours(1))).await.unwrap();
        repo.create(&new_session(bob, Duration::hours(1))).await.unwrap();

        let all = repo.filter(SessionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].expires_at <= all[1].expires_at);

        let expired = repo
            .filter(SessionFilter {
                user_id: None,
                expired_only: true,
            })
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].user_id, alice);
    }

    #[tokio::test]
    async fn test_delete_many() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "alice").await;

        let a = repo.create(&new_session(user_id, Duration::days(1))).await.unwrap();
        let b = repo.create(&new_session(user_id, Duration::days(1))).await.unwrap();
        let keep = repo.create(&new_session(user_id, Duration::days(1))).await.unwrap();

        let deleted = repo.delete_many(&[a.clone(), b.clone()]).await.unwrap();
        assert_eq!(deleted, 2);

        assert!(repo.get(&a.uuid).await.unwrap_err().is_not_found());
        assert!(repo.get(&b.uuid).await.unwrap_err().is_not_found());
        assert!(repo.get(&keep.uuid).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_many_empty_and_missing() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "alice").await;

        assert_eq!(repo.delete_many(&[]).await.unwrap(), 0);

        let session = repo.create(&new_session(user_id, Duration::days(1))).await.unwrap();
        assert_eq!(repo.delete_many(&[session.clone()]).await.unwrap(), 1);
        assert_eq!(repo.delete_many(&[session]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_session() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "alice").await;

        let mut session = repo.create(&new_session(user_id, Duration::days(1))).await.unwrap();
        session.expires_at = (Utc::now() + Duration::days(30)).trunc_subsecs(6);
        repo.update(&session).await.unwrap();

        let found = repo.get(&session.uuid).await.unwrap();
        assert_eq!(found.expires_at, session.expires_at);
    }

    #[tokio::test]
    async fn test_update_missing_session_is_not_found() {
        let (_pool, repo) = setup_test_repo().await;

        let session = UserSession {
            uuid: Uuid::new_v4(),
            user_id: 1,
            expires_at: Utc::now(),
        };
        assert!(repo.update(&session).await.unwrap_err().is_not_found());
    }
}
