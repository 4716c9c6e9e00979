//! Database repositories
//!
//! Repository pattern implementations for database access. Each repository
//! owns the queries for one entity and dispatches them per driver.

pub mod session;
pub mod user;

pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};

use thiserror::Error;

/// Errors returned by the user and session stores.
///
/// `NotFound` is the only kind callers branch on; everything else is an
/// internal failure from the caller's point of view.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("store operation cancelled: {0}")]
    Cancelled(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinguishable() {
        assert!(StoreError::NotFound.is_not_found());
        assert!(!StoreError::Cancelled("get").is_not_found());
        assert!(!StoreError::from(anyhow::anyhow!("connection reset")).is_not_found());
    }

    #[test]
    fn test_internal_error_is_transparent() {
        let err = StoreError::from(anyhow::anyhow!("connection reset"));
        assert_eq!(err.to_string(), "connection reset");
    }
}
