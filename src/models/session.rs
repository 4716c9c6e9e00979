//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side login session.
///
/// The `uuid` is the opaque token handed to the browser in the session
/// cookie. A session references its user but does not own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// Session identifier (token), assigned by the store
    pub uuid: Uuid,
    /// Owning user ID
    pub user_id: i64,
    /// Absolute expiration timestamp
    pub expires_at: DateTime<Utc>,
}

impl UserSession {
    /// Check if the session has expired at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Session row to be inserted; the store assigns the identifier.
#[derive(Debug, Clone)]
pub struct NewUserSession {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Filter for listing sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionFilter {
    /// Restrict to sessions owned by this user
    pub user_id: Option<i64>,
    /// Only sessions whose `expires_at` is already in the past
    pub expired_only: bool,
}

impl SessionFilter {
    /// Expired sessions of a single user
    pub fn expired_for_user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            expired_only: true,
        }
    }
}
