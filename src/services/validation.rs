//! User validation predicates
//!
//! A validator decides whether an authenticated user may hold or use a
//! session. It is consulted both when a session is created and on every
//! protected request, so it must be cheap and must not touch the store.

use thiserror::Error;

use crate::models::User;

/// Returned by a validator to reject a user
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("user rejected: {reason}")]
pub struct UserRejected {
    pub reason: String,
}

impl UserRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Strategy deciding whether a user is allowed in
pub trait UserValidator: Send + Sync {
    fn validate(&self, user: &User) -> Result<(), UserRejected>;
}

/// Rejects users whose active flag is cleared
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveUserValidator;

impl UserValidator for ActiveUserValidator {
    fn validate(&self, user: &User) -> Result<(), UserRejected> {
        if user.is_active {
            Ok(())
        } else {
            Err(UserRejected::new("inactive user"))
        }
    }
}

impl<F> UserValidator for F
where
    F: Fn(&User) -> Result<(), UserRejected> + Send + Sync,
{
    fn validate(&self, user: &User) -> Result<(), UserRejected> {
        self(user)
    }
}
