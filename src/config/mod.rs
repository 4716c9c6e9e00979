//! Configuration management
//!
//! This module handles loading and parsing configuration for hallpass.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::auth::SessionAuthenticatorConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/hallpass.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session authentication configuration.
///
/// `session_ttl_seconds` bounds the server-side record while
/// `cookie_max_age_seconds` only controls browser retention. The two are
/// independent; the server-side expiry is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Login page path (authenticated visitors are redirected away from it)
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Where authenticated visitors of the login page are sent
    #[serde(default = "default_page_url")]
    pub page_url: String,
    /// Lifetime of a session row, added to the creation time
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    /// Session cookie name
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Browser-side retention of the session cookie
    #[serde(default = "default_cookie_max_age_seconds")]
    pub cookie_max_age_seconds: i64,
    /// Mark the cookie `Secure` (enable when served over HTTPS)
    #[serde(default)]
    pub cookie_secure: bool,
    /// Upper bound for a single store call made by the authenticator
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            page_url: default_page_url(),
            session_ttl_seconds: default_session_ttl_seconds(),
            cookie_name: default_cookie_name(),
            cookie_max_age_seconds: default_cookie_max_age_seconds(),
            cookie_secure: false,
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_login_url() -> String {
    "/login".to_string()
}

fn default_page_url() -> String {
    "/".to_string()
}

fn default_session_ttl_seconds() -> u64 {
    // 31 days
    31 * 24 * 60 * 60
}

fn default_cookie_name() -> String {
    "admin_session_id".to_string()
}

fn default_cookie_max_age_seconds() -> i64 {
    // 1 year
    365 * 24 * 60 * 60
}

fn default_store_timeout_ms() -> u64 {
    5000
}

impl AuthConfig {
    /// Build the authenticator configuration from this section
    pub fn to_authenticator_config(&self) -> SessionAuthenticatorConfig {
        SessionAuthenticatorConfig {
            login_redirect_url: self.login_url.clone(),
            page_redirect_url: self.page_url.clone(),
            // chrono panics past i64::MAX milliseconds
            session_ttl: chrono::Duration::seconds(
                i64::try_from(self.session_ttl_seconds)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
            cookie_name: self.cookie_name.clone(),
            cookie_max_age: self.cookie_max_age_seconds,
            cookie_secure: self.cookie_secure,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LogConfig {
    /// Filter directive used when RUST_LOG is absent
    pub fn default_directive(&self) -> String {
        format!("hallpass={},tower_http=info", self.level)
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Paths served by the router itself; the login page must not shadow them.
const RESERVED_PATHS: &[&str] = &["/", "/app", "/logout"];

/// Longest accepted session lifetime (100 years)
const MAX_SESSION_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - HALLPASS_SERVER_HOST
    /// - HALLPASS_SERVER_PORT
    /// - HALLPASS_DATABASE_DRIVER
    /// - HALLPASS_DATABASE_URL
    /// - HALLPASS_AUTH_SESSION_TTL_SECONDS
    /// - HALLPASS_AUTH_COOKIE_NAME
    /// - HALLPASS_AUTH_COOKIE_MAX_AGE_SECONDS
    /// - HALLPASS_AUTH_COOKIE_SECURE
    /// - HALLPASS_LOG_LEVEL
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the router or the cookie writer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let auth = &self.auth;

        for (key, url) in [("auth.login_url", &auth.login_url), ("auth.page_url", &auth.page_url)] {
            if !url.starts_with('/') {
                return Err(ConfigError::Invalid(format!("{} must start with '/': {:?}", key, url)));
            }
        }
        if RESERVED_PATHS.contains(&auth.login_url.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "auth.login_url collides with a built-in route: {:?}",
                auth.login_url
            )));
        }
        if auth.cookie_name.is_empty()
            || !auth
                .cookie_name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
        {
            return Err(ConfigError::Invalid(format!(
                "auth.cookie_name is not a valid cookie name: {:?}",
                auth.cookie_name
            )));
        }
        if auth.session_ttl_seconds == 0 || auth.session_ttl_seconds > MAX_SESSION_TTL_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "auth.session_ttl_seconds must be between 1 and {}: {}",
                MAX_SESSION_TTL_SECONDS, auth.session_ttl_seconds
            )));
        }
        // Zero keeps the cookie for the browser session; negative would delete it
        if auth.cookie_max_age_seconds < 0 {
            return Err(ConfigError::Invalid(format!(
                "auth.cookie_max_age_seconds must not be negative: {}",
                auth.cookie_max_age_seconds
            )));
        }
        if auth.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "auth.store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HALLPASS_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("HALLPASS_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(driver) = std::env::var("HALLPASS_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("HALLPASS_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(ttl) = std::env::var("HALLPASS_AUTH_SESSION_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.auth.session_ttl_seconds = ttl;
            }
        }
        if let Ok(name) = std::env::var("HALLPASS_AUTH_COOKIE_NAME") {
            if !name.trim().is_empty() {
                self.auth.cookie_name = name;
            }
        }
        if let Ok(max_age) = std::env::var("HALLPASS_AUTH_COOKIE_MAX_AGE_SECONDS") {
            if let Ok(max_age) = max_age.parse::<i64>() {
                self.auth.cookie_max_age_seconds = max_age;
            }
        }
        if let Ok(secure) = std::env::var("HALLPASS_AUTH_COOKIE_SECURE") {
            if let Ok(secure) = secure.parse::<bool>() {
                self.auth.cookie_secure = secure;
            }
        }

        if let Ok(level) = std::env::var("HALLPASS_LOG_LEVEL") {
            self.log.level = level;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
