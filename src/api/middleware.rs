//! API middleware
//!
//! Contains the application state shared by handlers and the
//! `login_required` gate that protects authenticated routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::api::identity::with_user;
use crate::api::views::Views;
use crate::services::{Admission, Rejection, SessionAuthenticator, SessionCookie};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<SessionAuthenticator>,
    pub views: Arc<Views>,
}

/// Value of the cookie called `name`, looking through every `Cookie` header
pub fn session_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.trim_matches('"'))
        })
}

/// Authentication gate.
///
/// Admitted requests continue with the user attached. A request for the login
/// page from a signed-in visitor is redirected with `301 Moved Permanently`.
pub async fn login_required(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authenticator = &state.authenticator;
    let cookie = session_cookie_value(request.headers(), &authenticator.config().cookie_name)
        .map(str::to_owned);
    let path = request.uri().path().to_owned();

    match authenticator.admit(cookie.as_deref(), &path).await {
        Ok(Admission::Granted(user)) => next.run(with_user(request, user)).await,
        Ok(Admission::Redirect(location)) => moved_permanently(&location),
        Err(rejection) => reject(authenticator, rejection),
    }
}

/// `301 Moved Permanently` to `location`
pub fn moved_permanently(location: &str) -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

/// Render a gate rejection, dropping the session cookie when asked to
pub fn reject(authenticator: &SessionAuthenticator, rejection: Rejection) -> Response {
    let reason = rejection.status.canonical_reason().unwrap_or("Unauthorized");
    let mut response = (rejection.status, reason).into_response();
    if rejection.clear_cookie {
        append_cookie(&mut response, &authenticator.deletion_session_cookie());
    }
    response
}

/// Add a `Set-Cookie` header to `response`
pub fn append_cookie(response: &mut Response, cookie: &SessionCookie) {
    match cookie.to_header_value() {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(err) => tracing::error!(error = %err, cookie = %cookie.name, "could not encode cookie"),
    }
}
