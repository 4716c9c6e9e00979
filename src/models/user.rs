//! User model
//!
//! This module defines the User entity and related types.

use serde::{Deserialize, Serialize};

/// User entity.
///
/// `hashed_password` is populated lazily: lookups by id or login and list
/// views leave it empty, only `UserRepository::fetch_password` fills it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier, assigned by the store
    pub id: i64,
    /// Login (unique, case-sensitive)
    pub login: String,
    /// Password hash (argon2 PHC string), empty until explicitly fetched
    #[serde(skip_serializing)]
    pub hashed_password: String,
    /// Whether the user may sign in
    pub is_active: bool,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// Note: The password should already be hashed before calling this function.
    /// Use `services::password::hash_password()` to hash the password.
    pub fn new(login: impl Into<String>, hashed_password: impl Into<String>, is_active: bool) -> Self {
        Self {
            id: 0, // Will be set by the database
            login: login.into(),
            hashed_password: hashed_password.into(),
            is_active,
        }
    }

    /// Whether the password hash has been loaded
    pub fn has_password(&self) -> bool {
        !self.hashed_password.is_empty()
    }
}

/// Filter for listing users
#[derive(Debug, Clone, Copy)]
pub struct UserFilter {
    /// Maximum number of rows, `None` for all
    pub limit: Option<i64>,
    /// Rows to skip
    pub offset: i64,
}

impl Default for UserFilter {
    fn default() -> Self {
        Self {
            limit: Some(50),
            offset: 0,
        }
    }
}
