//! Services layer - Business logic
//!
//! - `password`: credential hashing and verification
//! - `validation`: policies deciding whether a user may hold a session
//! - `auth`: the session authenticator (login and request gate)
//! - `admin`: administrative user and session operations

pub mod admin;
pub mod auth;
pub mod password;
pub mod validation;

pub use admin::{create_user, purge_sessions, AdminError};
pub use auth::{
    Admission, AuthError, Rejection, SessionAuthenticator, SessionAuthenticatorConfig,
    SessionCookie,
};
pub use password::{hash_password, verify_password, PasswordError};
pub use validation::{ActiveUserValidator, UserRejected, UserValidator};
