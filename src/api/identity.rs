//! Request-scoped identity
//!
//! The gate attaches the resolved user to the request extensions. Handlers
//! read it back either through the `CurrentUser` extractor or directly from
//! the extensions.

use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, Extensions, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::User;

/// Authenticated user of the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub User);

/// No user is attached to the request
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no authenticated user in request context")]
pub struct MissingIdentityError;

impl IntoResponse for MissingIdentityError {
    fn into_response(self) -> Response {
        // Only reachable when a handler that needs a user is routed around the gate
        tracing::error!("{}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Return `request` carrying `user`
pub fn with_user(mut request: Request, user: User) -> Request {
    request.extensions_mut().insert(CurrentUser(user));
    request
}

pub fn user_from_extensions(extensions: &Extensions) -> Result<&User, MissingIdentityError> {
    extensions
        .get::<CurrentUser>()
        .map(|current| &current.0)
        .ok_or(MissingIdentityError)
}

/// Like `user_from_extensions`, for handlers that only run behind the gate.
///
/// # Panics
///
/// Panics if no user is attached, which means the route is missing the
/// `login_required` layer.
pub fn must_user_from_extensions(extensions: &Extensions) -> &User {
    match user_from_extensions(extensions) {
        Ok(user) => user,
        Err(err) => panic!("{}: route is not behind login_required", err),
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = MissingIdentityError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_extensions(&parts.extensions).cloned().map(CurrentUser)
    }
}
