//! Authentication API endpoints
//!
//! Handles:
//! - GET  {login_url} - login form
//! - POST {login_url} - credential submission
//! - GET  /logout     - sign out
//! - GET  / and /app  - landing page for signed-in users

use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;

use crate::api::identity::{must_user_from_extensions, CurrentUser};
use crate::api::middleware::{append_cookie, moved_permanently, session_cookie_value, AppState};
use crate::api::views::LoginFormView;
use crate::services::Admission;

const HX_REQUEST: HeaderName = HeaderName::from_static("hx-request");
const HX_REDIRECT: HeaderName = HeaderName::from_static("hx-redirect");

/// Login form submission
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    /// Field-level errors, or `None` if both fields are filled in
    fn validate(&self) -> Option<LoginFormView> {
        let view = LoginFormView {
            login: self.login.clone(),
            login_error: self
                .login
                .trim()
                .is_empty()
                .then(|| "login must not be blank".to_string()),
            password_error: self
                .password
                .is_empty()
                .then(|| "password must not be blank".to_string()),
            error: None,
        };
        view.has_field_errors().then_some(view)
    }
}

/// GET {login_url} - Render the login form.
///
/// Signed-in visitors are sent to the page URL instead. A stale session
/// cookie is dropped while the form is shown.
pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let authenticator = &state.authenticator;
    let config = authenticator.config();
    let cookie = session_cookie_value(&headers, &config.cookie_name);

    let clear_cookie = match authenticator.admit(cookie, &config.login_redirect_url).await {
        Ok(Admission::Redirect(location)) => return moved_permanently(&location),
        Ok(Admission::Granted(_)) => false,
        Err(rejection) => rejection.clear_cookie,
    };

    let mut response = render_form(&state, &headers, &LoginFormView::default());
    if clear_cookie {
        append_cookie(&mut response, &authenticator.deletion_session_cookie());
    }
    response
}

/// POST {login_url} - Verify credentials and start a session.
///
/// Failures re-render the form with HTTP 200. On success the session cookie
/// is set and the client is told to navigate to the page URL.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "could not decode login form");
            let view = LoginFormView::with_error("", "invalid authentication data");
            return render_form(&state, &headers, &view);
        }
    };

    if let Some(view) = form.validate() {
        return render_form(&state, &headers, &view);
    }

    let authenticator = &state.authenticator;
    let session = match authenticator.create_session(&form.login, &form.password).await {
        Ok(session) => session,
        Err(err) => {
            let view = LoginFormView::with_error(form.login, err.to_string());
            return render_form(&state, &headers, &view);
        }
    };

    let page_url = &authenticator.config().page_redirect_url;
    let mut response = StatusCode::OK.into_response();
    match HeaderValue::from_str(page_url) {
        Ok(location) => {
            if is_htmx(&headers) {
                response.headers_mut().insert(HX_REDIRECT, location);
            } else if let Ok(refresh) = HeaderValue::from_str(&format!("0; url={}", page_url)) {
                response.headers_mut().insert(header::REFRESH, refresh);
            }
        }
        Err(err) => tracing::error!(error = %err, "page url is not a valid header value"),
    }
    append_cookie(&mut response, &authenticator.make_session_cookie(&session.uuid));
    response
}

/// GET /logout - End the session and drop the cookie
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let authenticator = &state.authenticator;
    let cookie = session_cookie_value(&headers, &authenticator.config().cookie_name);
    authenticator.revoke(cookie).await;

    let mut response = moved_permanently("/");
    append_cookie(&mut response, &authenticator.deletion_session_cookie());
    response
}

/// GET / - Landing page
pub async fn home(State(state): State<AppState>, extensions: Extensions) -> Response {
    let user = must_user_from_extensions(&extensions);
    state.views.home_page(user).map(Html).into_response()
}

/// GET /app - Landing page, resolved through the extractor
pub async fn app(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Response {
    state.views.home_page(&user).map(Html).into_response()
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key(HX_REQUEST)
}

/// Full page for plain requests, the bare form for htmx swaps
fn render_form(state: &AppState, headers: &HeaderMap, view: &LoginFormView) -> Response {
    let rendered = if is_htmx(headers) {
        state.views.login_form(view)
    } else {
        state.views.login_page(view)
    };
    rendered.map(Html).into_response()
}
