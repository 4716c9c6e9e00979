//! Database migrations module
//!
//! Schema migrations are embedded in the binary as SQL strings, one variant
//! per supported driver, and tracked in a `_migrations` table.
//!
//! # Usage
//!
//! ```ignore
//! use hallpass::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use sqlx::{MySqlPool, SqlitePool};
use std::collections::BTreeSet;

use super::pool::{mysql, sqlite};
use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// One schema step, written once per driver.
///
/// Statements are separated by `;` and must not contain one otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login VARCHAR(255) NOT NULL UNIQUE,
                hashed_password VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                login VARCHAR(255) NOT NULL UNIQUE,
                hashed_password VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin;
        "#,
    },
    Migration {
        version: 2,
        name: "create_user_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS user_sessions (
                uuid VARCHAR(36) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_user_sessions_user_id ON user_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_user_sessions_expires_at ON user_sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS user_sessions (
                uuid VARCHAR(36) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at DATETIME(6) NOT NULL,
                INDEX idx_user_sessions_user_id (user_id),
                INDEX idx_user_sessions_expires_at (expires_at),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
];

/// Apply every migration not yet recorded in `_migrations`, in version
/// order. Returns how many were applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    let applied = applied_versions(pool).await?;
    let mut count = 0;

    for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
        tracing::info!(version = migration.version, name = migration.name, "applying migration");
        let result = match pool.driver() {
            DatabaseDriver::Sqlite => apply_sqlite(sqlite(pool)?, migration).await,
            DatabaseDriver::Mysql => apply_mysql(mysql(pool)?, migration).await,
        };
        result.with_context(|| format!("Migration {} ({}) failed", migration.version, migration.name))?;
        count += 1;
    }

    tracing::debug!(applied = count, "database schema up to date");
    Ok(count)
}

/// Number of migrations `run_migrations` would apply
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count())
}

const SQLITE_TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

const MYSQL_TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version BIGINT PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

const SELECT_VERSIONS: &str = "SELECT version FROM _migrations";
const RECORD_MIGRATION: &str = "INSERT INTO _migrations (version, name) VALUES (?, ?)";

/// Versions recorded in `_migrations`, creating the table on first use
async fn applied_versions(pool: &DynDatabasePool) -> Result<BTreeSet<i64>> {
    let versions: Vec<i64> = match pool.driver() {
        DatabaseDriver::Sqlite => {
            let db = sqlite(pool)?;
            sqlx::query(SQLITE_TRACKING_TABLE).execute(db).await?;
            sqlx::query_scalar(SELECT_VERSIONS).fetch_all(db).await?
        }
        DatabaseDriver::Mysql => {
            let db = mysql(pool)?;
            sqlx::query(MYSQL_TRACKING_TABLE).execute(db).await?;
            sqlx::query_scalar(SELECT_VERSIONS).fetch_all(db).await?
        }
    };
    Ok(versions.into_iter().collect())
}

// ============================================================================
// SQLite implementations
// ============================================================================

/// Schema changes and the tracking row commit together
async fn apply_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;
    for (i, statement) in split_sql_statements(migration.up_sqlite).into_iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("statement {}", i + 1))?;
    }
    sqlx::query(RECORD_MIGRATION)
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

/// MySQL commits DDL implicitly, so only the tracking row is transactional
async fn apply_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for (i, statement) in split_sql_statements(migration.up_mysql).into_iter().enumerate() {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("statement {}", i + 1))?;
    }
    sqlx::query(RECORD_MIGRATION)
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;
    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use chrono::Utc;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Running again should apply 0 migrations
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let pending = pending_count(&pool).await.expect("Failed to check");
        assert_eq!(pending, MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");
        let pending = pending_count(&pool).await.expect("Failed to check");
        assert_eq!(pending, 0);
    }

    #[tokio::test]
    async fn test_login_is_unique() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let sqlite_pool = sqlite(&pool).unwrap();
        let insert = "INSERT INTO users (login, hashed_password, is_active) VALUES (?, ?, ?)";

        sqlx::query(insert)
            .bind("alice")
            .bind("hash")
            .bind(true)
            .execute(sqlite_pool)
            .await
            .expect("First insert should succeed");

        let duplicate = sqlx::query(insert)
            .bind("alice")
            .bind("other")
            .bind(true)
            .execute(sqlite_pool)
            .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_sessions_cascade_on_user_delete() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let sqlite_pool = sqlite(&pool).unwrap();

        sqlx::query("INSERT INTO users (login, hashed_password, is_active) VALUES ('bob', 'h', 1)")
            .execute(sqlite_pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO user_sessions (uuid, user_id, expires_at) VALUES ('00000000-0000-0000-0000-000000000001', 1, ?)",
        )
        .bind(Utc::now())
        .execute(sqlite_pool)
        .await
        .unwrap();

        sqlx::query("DELETE FROM users WHERE login = 'bob'")
            .execute(sqlite_pool)
            .await
            .unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_sessions")
            .fetch_one(sqlite_pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_session_requires_existing_user() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let result = sqlx::query(
            "INSERT INTO user_sessions (uuid, user_id, expires_at) VALUES ('x', 999, ?)",
        )
        .bind(Utc::now())
        .execute(sqlite(&pool).unwrap())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pending_count_ignores_unknown_recorded_versions() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        sqlx::query("INSERT INTO _migrations (version, name) VALUES (999, 'from_newer_build')")
            .execute(sqlite(&pool).unwrap())
            .await
            .unwrap();

        assert_eq!(pending_count(&pool).await.unwrap(), 0);
        assert_eq!(run_migrations(&pool).await.unwrap(), 0);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n  ;\nCREATE INDEX i ON a(id);\n";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]);
    }

    #[test]
    fn test_migration_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, i as i64 + 1);
        }
    }
}
