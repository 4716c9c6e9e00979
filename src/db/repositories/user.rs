//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL
//!
//! Lookups never select the password hash. It is only loaded on demand by
//! `fetch_password`, right before credentials are compared.

use super::StoreError;
use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{User, UserFilter};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Get user by login (exact match); `StoreError::NotFound` if absent
    async fn get_by_login(&self, login: &str) -> Result<User, StoreError>;

    /// Get user by ID; `StoreError::NotFound` if absent
    async fn get_by_id(&self, id: i64) -> Result<User, StoreError>;

    /// Load the password hash into `user.hashed_password`.
    ///
    /// The user must carry the id assigned by the store.
    async fn fetch_password(&self, user: &mut User) -> Result<(), StoreError>;

    /// Insert a user, or replace the hash and active flag of the user with
    /// the same login. Returns the stored user with its id.
    async fn upsert(&self, user: &User) -> Result<User, StoreError>;

    /// List users ordered by id, without password hashes
    async fn list(&self, filter: UserFilter) -> Result<Vec<User>, StoreError>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn get_by_login(&self, login: &str) -> Result<User, StoreError> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_login_sqlite(sqlite(&self.pool)?, login).await,
            DatabaseDriver::Mysql => get_user_by_login_mysql(mysql(&self.pool)?, login).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(sqlite(&self.pool)?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(mysql(&self.pool)?, id).await,
        }
    }

    async fn fetch_password(&self, user: &mut User) -> Result<(), StoreError> {
        if user.id == 0 {
            return Err(anyhow!("cannot fetch password of user {:?} without id", user.login).into());
        }

        let hash = match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_password_sqlite(sqlite(&self.pool)?, user.id).await?,
            DatabaseDriver::Mysql => fetch_password_mysql(mysql(&self.pool)?, user.id).await?,
        };
        user.hashed_password = hash;
        Ok(())
    }

    async fn upsert(&self, user: &User) -> Result<User, StoreError> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => upsert_user_sqlite(sqlite(&self.pool)?, user).await?,
            DatabaseDriver::Mysql => upsert_user_mysql(mysql(&self.pool)?, user).await?,
        };

        Ok(User {
            id,
            ..user.clone()
        })
    }

    async fn list(&self, filter: UserFilter) -> Result<Vec<User>, StoreError> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(sqlite(&self.pool)?, filter).await,
            DatabaseDriver::Mysql => list_users_mysql(mysql(&self.pool)?, filter).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_user_by_login_sqlite(pool: &SqlitePool, login: &str) -> Result<User, StoreError> {
    let row = sqlx::query("SELECT id, login, is_active FROM users WHERE login = ?")
        .bind(login)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by login")?
        .ok_or(StoreError::NotFound)?;

    Ok(row_to_user_sqlite(&row))
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<User, StoreError> {
    let row = sqlx::query("SELECT id, login, is_active FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?
        .ok_or(StoreError::NotFound)?;

    Ok(row_to_user_sqlite(&row))
}

async fn fetch_password_sqlite(pool: &SqlitePool, id: i64) -> Result<String, StoreError> {
    let hash: String = sqlx::query_scalar("SELECT hashed_password FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch password hash")?
        .ok_or(StoreError::NotFound)?;

    Ok(hash)
}

async fn upsert_user_sqlite(pool: &SqlitePool, user: &User) -> Result<i64, StoreError> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (login, hashed_password, is_active)
        VALUES (?, ?, ?)
        ON CONFLICT (login) DO UPDATE SET
            hashed_password = excluded.hashed_password,
            is_active = excluded.is_active
        RETURNING id
        "#,
    )
    .bind(&user.login)
    .bind(&user.hashed_password)
    .bind(user.is_active)
    .fetch_one(pool)
    .await
    .context("Failed to upsert user")?;

    Ok(id)
}

async fn list_users_sqlite(pool: &SqlitePool, filter: UserFilter) -> Result<Vec<User>, StoreError> {
    let rows = sqlx::query("SELECT id, login, is_active FROM users ORDER BY id LIMIT ? OFFSET ?")
        .bind(filter.limit.unwrap_or(i64::MAX))
        .bind(filter.offset)
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    Ok(rows.iter().map(row_to_user_sqlite).collect())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        login: row.get("login"),
        hashed_password: String::new(),
        is_active: row.get("is_active"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_user_by_login_mysql(pool: &MySqlPool, login: &str) -> Result<User, StoreError> {
    let row = sqlx::query("SELECT id, login, is_active FROM users WHERE login = ?")
        .bind(login)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by login")?
        .ok_or(StoreError::NotFound)?;

    Ok(row_to_user_mysql(&row))
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<User, StoreError> {
    let row = sqlx::query("SELECT id, login, is_active FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?
        .ok_or(StoreError::NotFound)?;

    Ok(row_to_user_mysql(&row))
}

async fn fetch_password_mysql(pool: &MySqlPool, id: i64) -> Result<String, StoreError> {
    let hash: String = sqlx::query_scalar("SELECT hashed_password FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch password hash")?
        .ok_or(StoreError::NotFound)?;

    Ok(hash)
}

async fn upsert_user_mysql(pool: &MySqlPool, user: &User) -> Result<i64, StoreError> {
    // LAST_INSERT_ID(id) makes the update branch report the existing row id.
    let result = sqlx::query(
        r#"
        INSERT INTO users (login, hashed_password, is_active)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE
            hashed_password = VALUES(hashed_password),
            is_active = VALUES(is_active),
            id = LAST_INSERT_ID(id)
        "#,
    )
    .bind(&user.login)
    .bind(&user.hashed_password)
    .bind(user.is_active)
    .execute(pool)
    .await
    .context("Failed to upsert user")?;

    Ok(result.last_insert_id() as i64)
}

async fn list_users_mysql(pool: &MySqlPool, filter: UserFilter) -> Result<Vec<User>, StoreError> {
    let rows = sqlx::query("SELECT id, login, is_active FROM users ORDER BY id LIMIT ? OFFSET ?")
        .bind(filter.limit.unwrap_or(i64::MAX))
        .bind(filter.offset)
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    Ok(rows.iter().map(row_to_user_mysql).collect())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> User {
    User {
        id: row.get("id"),
        login: row.get("login"),
        hashed_password: String::new(),
        is_active: row.get("is_active"),
    }
}
