//! API layer - HTTP handlers and routing
//!
//! - `auth`: login, logout and the signed-in landing page
//! - `middleware`: shared state and the `login_required` gate
//! - `identity`: the authenticated user carried by each request
//! - `views`: HTML rendering

pub mod auth;
pub mod identity;
pub mod middleware;
pub mod views;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

pub use identity::{CurrentUser, MissingIdentityError};
pub use middleware::AppState;

/// Build the application router.
///
/// The login route is mounted at the configured login URL and stays outside
/// the gate; every other page requires a session.
pub fn build_router(state: AppState) -> Router {
    let login_url = state.authenticator.config().login_redirect_url.clone();

    let protected = Router::new()
        .route("/", get(auth::home))
        .route("/app", get(auth::app))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::login_required,
        ));

    Router::new()
        .route(&login_url, get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .merge(protected)
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not Found") })
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
