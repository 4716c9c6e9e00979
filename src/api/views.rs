//! HTML views
//!
//! Templates are compiled into the binary and rendered with Tera. Template
//! names end in `.html`, so Tera escapes every interpolated value.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera};
use thiserror::Error;

use crate::models::User;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("login_form.html", include_str!("../../templates/login_form.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("home.html", include_str!("../../templates/home.html")),
];

/// View rendering errors
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Template error: {0}")]
    TemplateError(String),
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "could not render view");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// State of the login form as shown to the visitor.
///
/// The password is never echoed back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoginFormView {
    pub login: String,
    pub login_error: Option<String>,
    pub password_error: Option<String>,
    /// Form-wide error, e.g. rejected credentials
    pub error: Option<String>,
}

impl LoginFormView {
    pub fn with_error(login: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn has_field_errors(&self) -> bool {
        self.login_error.is_some() || self.password_error.is_some()
    }
}

/// Compiled templates
pub struct Views {
    tera: Tera,
    login_url: String,
}

impl Views {
    /// Compile the built-in templates. `login_url` is where the form posts.
    pub fn new(login_url: impl Into<String>) -> Result<Self, ViewError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())
            .map_err(|e| ViewError::TemplateError(describe(&e)))?;

        Ok(Self {
            tera,
            login_url: login_url.into(),
        })
    }

    /// Full login page
    pub fn login_page(&self, form: &LoginFormView) -> Result<String, ViewError> {
        self.render("login.html", &self.login_context(form))
    }

    /// Only the form element, for in-place swaps by htmx
    pub fn login_form(&self, form: &LoginFormView) -> Result<String, ViewError> {
        self.render("login_form.html", &self.login_context(form))
    }

    pub fn home_page(&self, user: &User) -> Result<String, ViewError> {
        let mut context = TeraContext::new();
        context.insert("user", user);
        self.render("home.html", &context)
    }

    fn login_context(&self, form: &LoginFormView) -> TeraContext {
        let mut context = TeraContext::new();
        context.insert("login_url", &self.login_url);
        context.insert("form", form);
        context
    }

    fn render(&self, template: &str, context: &TeraContext) -> Result<String, ViewError> {
        self.tera.render(template, context).map_err(|e| {
            ViewError::TemplateError(format!("Failed to render '{}': {}", template, describe(&e)))
        })
    }
}

/// Flatten a Tera error and its causes into one line
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  Caused by: {}", cause));
        source = cause.source();
    }
    message
}
