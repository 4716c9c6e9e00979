//! Data models
//!
//! This module contains the data structures shared by the store, the
//! authenticator and the web layer.

mod session;
mod user;

pub use session::{NewUserSession, SessionFilter, UserSession};
pub use user::{User, UserFilter};
