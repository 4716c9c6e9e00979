//! Administrative operations on users and sessions
//!
//! Used by the command line; none of this is reachable over HTTP.

use thiserror::Error;

use crate::db::repositories::{SessionRepository, StoreError, UserRepository};
use crate::models::{SessionFilter, User};
use crate::services::password::{hash_password, PasswordError};

/// Error types for administrative operations
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create a user, or replace the password and active flag of an existing
/// user with the same login.
pub async fn create_user(
    users: &dyn UserRepository,
    login: &str,
    password: &str,
    active: bool,
) -> Result<User, AdminError> {
    if login.trim().is_empty() {
        return Err(AdminError::Validation("login must not be blank".to_string()));
    }
    if password.is_empty() {
        return Err(AdminError::Validation("password must not be empty".to_string()));
    }

    let hashed = hash_password(password)?;
    let user = users.upsert(&User::new(login, hashed, active)).await?;

    tracing::info!(user_id = user.id, login = %user.login, active, "user saved");
    Ok(user)
}

/// Delete sessions, optionally restricted to one user and/or to sessions that
/// have already expired. Returns the number of deleted sessions.
pub async fn purge_sessions(
    users: &dyn UserRepository,
    sessions: &dyn SessionRepository,
    login: Option<&str>,
    expired_only: bool,
) -> Result<u64, AdminError> {
    let user_id = match login {
        Some(login) => match users.get_by_login(login).await {
            Ok(user) => Some(user.id),
            Err(StoreError::NotFound) => return Err(AdminError::UnknownUser(login.to_string())),
            Err(err) => return Err(err.into()),
        },
        None => None,
    };

    let matching = sessions
        .filter(SessionFilter {
            user_id,
            expired_only,
        })
        .await?;
    let deleted = sessions.delete_many(&matching).await?;

    tracing::info!(?user_id, expired_only, deleted, "user sessions deleted");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::NewUserSession;
    use crate::services::password::verify_password;
    use chrono::{Duration, Utc};

    async fn setup() -> (SqlxUserRepository, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (
            SqlxUserRepository::new(pool.clone()),
            SqlxSessionRepository::new(pool),
        )
    }

    async fn add_session(sessions: &SqlxSessionRepository, user_id: i64, expires_in: Duration) {
        sessions
            .create(&NewUserSession {
                user_id,
                expires_at: Utc::now() + expires_in,
            })
            .await
            .expect("Failed to create session");
    }

    #[tokio::test]
    async fn test_create_user_hashes_password() {
        let (users, _) = setup().await;

        let user = create_user(&users, "alice", "s3cret", true).await.unwrap();
        assert!(user.id > 0);

        let mut stored = users.get_by_login("alice").await.unwrap();
        users.fetch_password(&mut stored).await.unwrap();
        assert_ne!(stored.hashed_password, "s3cret");
        assert_eq!(verify_password(&stored.hashed_password, "s3cret"), Ok(()));
    }

    #[tokio::test]
    async fn test_create_user_twice_updates_in_place() {
        let (users, _) = setup().await;

        let first = create_user(&users, "alice", "one", true).await.unwrap();
        let second = create_user(&users, "alice", "two", false).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(!users.get_by_id(first.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_create_user_rejects_blank_input() {
        let (users, _) = setup().await;

        assert!(matches!(
            create_user(&users, "  ", "pw", true).await,
            Err(AdminError::Validation(_))
        ));
        assert!(matches!(
            create_user(&users, "alice", "", true).await,
            Err(AdminError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_expired_sessions_for_user() {
        let (users, sessions) = setup().await;
        let alice = users.upsert(&User::new("alice", "h", true)).await.unwrap();
        let bob = users.upsert(&User::new("bob", "h", true)).await.unwrap();

        add_session(&sessions, alice.id, -Duration::hours(1)).await;
        add_session(&sessions, alice.id, Duration::hours(1)).await;
        add_session(&sessions, bob.id, -Duration::hours(1)).await;

        let deleted = purge_sessions(&users, &sessions, Some("alice"), true).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = sessions.filter(SessionFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_purge_all_sessions() {
        let (users, sessions) = setup().await;
        let alice = users.upsert(&User::new("alice", "h", true)).await.unwrap();
        add_session(&sessions, alice.id, -Duration::hours(1)).await;
        add_session(&sessions, alice.id, Duration::hours(1)).await;

        let deleted = purge_sessions(&users, &sessions, None, false).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(purge_sessions(&users, &sessions, None, false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_for_unknown_login_fails() {
        let (users, sessions) = setup().await;

        let err = purge_sessions(&users, &sessions, Some("nobody"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::UnknownUser(login) if login == "nobody"));
    }
}
