//! hallpass - server-side session authentication
//!
//! This library provides the credential verifier, the session store, the
//! session authenticator and the axum web layer built on top of them.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
