//! Session authenticator
//!
//! Issues server-side sessions on login and decides, per protected request,
//! whether the presented session cookie admits the caller.
//!
//! The authenticator holds no state besides its configuration. Sessions and
//! users live in the store, which is queried on every decision. Store errors
//! never cross this module: they are translated into `AuthError` for login
//! and into `Rejection` for the request gate.

use axum::http::{HeaderValue, StatusCode};
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Span;
use uuid::Uuid;

use crate::db::repositories::{SessionRepository, StoreError, UserRepository};
use crate::models::{NewUserSession, SessionFilter, User, UserSession};
use crate::services::password::{verify_password, PasswordError};
use crate::services::validation::UserValidator;

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Authenticator configuration, fixed at construction
#[derive(Debug, Clone)]
pub struct SessionAuthenticatorConfig {
    /// Login page; authenticated requests for it are redirected away
    pub login_redirect_url: String,
    /// Where authenticated visitors of the login page are sent
    pub page_redirect_url: String,
    /// Server-side session lifetime, added to the creation time
    pub session_ttl: chrono::Duration,
    pub cookie_name: String,
    /// Browser-side cookie retention in seconds, independent of `session_ttl`
    pub cookie_max_age: i64,
    pub cookie_secure: bool,
    /// Upper bound for a single store call
    pub store_timeout: Duration,
}

impl Default for SessionAuthenticatorConfig {
    fn default() -> Self {
        Self {
            login_redirect_url: "/login".to_string(),
            page_redirect_url: "/".to_string(),
            session_ttl: chrono::Duration::days(31),
            cookie_name: "admin_session_id".to_string(),
            cookie_max_age: 60 * 60 * 24 * 365,
            cookie_secure: false,
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// Login failures
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown login or wrong password; the two are never distinguished
    #[error("invalid login or password")]
    InvalidCredentials,

    /// Credentials may be fine but the validator rejected the user
    #[error("user is not allowed to sign in")]
    Forbidden,

    /// Store or infrastructure failure
    #[error("authentication service unavailable")]
    Internal,
}

/// Positive outcome of the request gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Proceed to the handler with this user attached to the request
    Granted(User),
    /// Permanent redirect instead of running the handler
    Redirect(String),
}

/// Negative outcome of the request gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    /// `401 Unauthorized` or `403 Forbidden`
    pub status: StatusCode,
    /// Whether the response must instruct the client to drop the cookie
    pub clear_cookie: bool,
}

impl Rejection {
    fn unauthorized(clear_cookie: bool) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            clear_cookie,
        }
    }

    fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            clear_cookie: true,
        }
    }
}

/// Session cookie as sent in a `Set-Cookie` header.
///
/// A negative `max_age` marks a deletion cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub max_age: i64,
    pub secure: bool,
}

impl SessionCookie {
    pub fn is_deletion(&self) -> bool {
        self.max_age < 0
    }

    /// Render as a header value.
    ///
    /// Fails only if the configured cookie name contains bytes that are not
    /// allowed in a header.
    pub fn to_header_value(&self) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_deletion() {
            return write!(f, "{}=; Path=/; Max-Age=0", self.name);
        }

        write!(f, "{}={}; Path=/", self.name, self.value)?;
        if self.max_age > 0 {
            write!(f, "; Max-Age={}", self.max_age)?;
        }
        f.write_str("; HttpOnly")?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        f.write_str("; SameSite=Strict")
    }
}

/// Issues sessions and gates requests on them
pub struct SessionAuthenticator {
    config: SessionAuthenticatorConfig,
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    validator: Arc<dyn UserValidator>,
    span: Span,
    clock: Clock,
}

impl SessionAuthenticator {
    pub fn new(
        config: SessionAuthenticatorConfig,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        validator: Arc<dyn UserValidator>,
    ) -> Self {
        Self {
            config,
            users,
            sessions,
            validator,
            span: tracing::info_span!("session_authenticator"),
            clock: Arc::new(Utc::now),
        }
    }

    /// Use `span` as the parent of every event this authenticator emits
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &SessionAuthenticatorConfig {
        &self.config
    }

    /// Verify credentials and open a new session.
    ///
    /// Expired sessions of the same user are purged on the way; failures of
    /// that purge are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for an unknown login or a wrong password
    /// - `Forbidden` if the validator rejects the user
    /// - `Internal` for store failures, timeouts and malformed stored hashes
    pub async fn create_session(&self, login: &str, password: &str) -> Result<UserSession, AuthError> {
        let mut user = match self.store("fetch user by login", self.users.get_by_login(login)).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                tracing::warn!(parent: &self.span, login, "login attempt for unknown user");
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => {
                tracing::error!(parent: &self.span, error = %err, "could not fetch user");
                return Err(AuthError::Internal);
            }
        };

        if let Err(err) = self.validator.validate(&user) {
            tracing::warn!(parent: &self.span, user_id = user.id, error = %err, "invalid user");
            return Err(AuthError::Forbidden);
        }

        let fetched = self
            .store("fetch user password", self.users.fetch_password(&mut user))
            .await;
        if let Err(err) = fetched {
            tracing::error!(parent: &self.span, user_id = user.id, error = %err, "could not fetch user password");
            return Err(AuthError::Internal);
        }

        self.verify(&mut user, password).await?;
        self.purge_expired_sessions(user.id).await;

        let Some(expires_at) = (self.clock)().checked_add_signed(self.config.session_ttl) else {
            tracing::error!(parent: &self.span, user_id = user.id, ttl = %self.config.session_ttl, "session expiry out of range");
            return Err(AuthError::Internal);
        };
        let new_session = NewUserSession {
            user_id: user.id,
            expires_at,
        };
        let session = self
            .store("create session", self.sessions.create(&new_session))
            .await
            .map_err(|err| {
                tracing::error!(parent: &self.span, user_id = user.id, error = %err, "could not create user session");
                AuthError::Internal
            })?;

        tracing::info!(parent: &self.span, user_id = user.id, "user signed in");
        Ok(session)
    }

    /// Decide whether a request carrying `cookie_value` may reach `path`.
    ///
    /// Only sessions that are gone for good (unknown, expired, owner deleted,
    /// owner rejected by the validator) clear the cookie. Transient store
    /// failures reject without touching it.
    pub async fn admit(&self, cookie_value: Option<&str>, path: &str) -> Result<Admission, Rejection> {
        let Some(raw) = cookie_value else {
            tracing::debug!(parent: &self.span, path, "no session cookie");
            return Err(Rejection::unauthorized(false));
        };

        let Ok(session_id) = Uuid::parse_str(raw) else {
            tracing::warn!(parent: &self.span, "malformed session cookie");
            return Err(Rejection::unauthorized(true));
        };

        let session = match self.store("fetch session", self.sessions.get(&session_id)).await {
            Ok(session) => session,
            Err(StoreError::NotFound) => {
                tracing::debug!(parent: &self.span, %session_id, "unknown session");
                return Err(Rejection::unauthorized(true));
            }
            Err(err) => {
                tracing::error!(parent: &self.span, %session_id, error = %err, "could not fetch user session");
                return Err(Rejection::unauthorized(false));
            }
        };

        if session.is_expired_at((self.clock)()) {
            tracing::warn!(parent: &self.span, %session_id, user_id = session.user_id, "user session expired");
            return Err(Rejection::unauthorized(true));
        }

        let user = match self.store("fetch user by id", self.users.get_by_id(session.user_id)).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                tracing::warn!(parent: &self.span, %session_id, user_id = session.user_id, "session owner no longer exists");
                return Err(Rejection::unauthorized(true));
            }
            Err(err) => {
                tracing::error!(parent: &self.span, user_id = session.user_id, error = %err, "could not fetch user");
                return Err(Rejection::unauthorized(false));
            }
        };

        if let Err(err) = self.validator.validate(&user) {
            tracing::warn!(parent: &self.span, user_id = user.id, error = %err, "invalid user");
            return Err(Rejection::forbidden());
        }

        if path == self.config.login_redirect_url {
            return Ok(Admission::Redirect(self.config.page_redirect_url.clone()));
        }

        Ok(Admission::Granted(user))
    }

    /// Delete the session behind `cookie_value`, if any. Best effort.
    pub async fn revoke(&self, cookie_value: Option<&str>) {
        let Some(session_id) = cookie_value.and_then(|raw| Uuid::parse_str(raw).ok()) else {
            return;
        };

        let session = match self.store("fetch session", self.sessions.get(&session_id)).await {
            Ok(session) => session,
            Err(StoreError::NotFound) => return,
            Err(err) => {
                tracing::error!(parent: &self.span, %session_id, error = %err, "could not fetch user session");
                return;
            }
        };

        match self
            .store("delete sessions", self.sessions.delete_many(std::slice::from_ref(&session)))
            .await
        {
            Ok(_) => tracing::info!(parent: &self.span, user_id = session.user_id, "user signed out"),
            Err(err) => {
                tracing::error!(parent: &self.span, %session_id, error = %err, "could not delete user session")
            }
        }
    }

    pub fn make_session_cookie(&self, session_id: &Uuid) -> SessionCookie {
        SessionCookie {
            name: self.config.cookie_name.clone(),
            value: session_id.to_string(),
            max_age: self.config.cookie_max_age,
            secure: self.config.cookie_secure,
        }
    }

    pub fn deletion_session_cookie(&self) -> SessionCookie {
        SessionCookie {
            name: self.config.cookie_name.clone(),
            value: String::new(),
            max_age: -1,
            secure: false,
        }
    }

    async fn verify(&self, user: &mut User, password: &str) -> Result<(), AuthError> {
        let hash = std::mem::take(&mut user.hashed_password);
        let password = password.to_owned();

        match tokio::task::spawn_blocking(move || verify_password(&hash, &password)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(PasswordError::Mismatch)) => {
                tracing::warn!(parent: &self.span, user_id = user.id, "user password input and hash mismatch");
                Err(AuthError::InvalidCredentials)
            }
            Ok(Err(err)) => {
                tracing::error!(parent: &self.span, user_id = user.id, error = %err, "could not verify password");
                Err(AuthError::Internal)
            }
            Err(err) => {
                tracing::error!(parent: &self.span, user_id = user.id, error = %err, "password verification task failed");
                Err(AuthError::Internal)
            }
        }
    }

    async fn purge_expired_sessions(&self, user_id: i64) {
        let expired = match self
            .store("filter sessions", self.sessions.filter(SessionFilter::expired_for_user(user_id)))
            .await
        {
            Ok(expired) => expired,
            Err(err) => {
                tracing::error!(parent: &self.span, user_id, error = %err, "could not filter user sessions");
                return;
            }
        };

        if expired.is_empty() {
            return;
        }

        match self.store("delete sessions", self.sessions.delete_many(&expired)).await {
            Ok(deleted) => tracing::debug!(parent: &self.span, user_id, deleted, "purged expired sessions"),
            Err(err) => {
                tracing::error!(parent: &self.span, user_id, error = %err, "could not delete user sessions")
            }
        }
    }

    async fn store<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.config.store_timeout, call)
            .await
            .unwrap_or(Err(StoreError::Cancelled(op)))
    }
}
