//! authlink core library.
//!
//! An authenticated client for a remote identity service. Every request
//! made through [`ApiClient`] carries the current access token, and an
//! expired token is renewed transparently: concurrent requests that fail
//! with `401 Unauthorized` share a single renewal call and are each
//! retried exactly once.
//!
//! [`SessionManager`] sits on top of the client and owns the session
//! lifecycle (restore on startup, login, logout) together with the
//! persisted copy of the access token.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ApiResponse};
pub use auth::{AccessToken, SessionManager, SessionState, TokenStore};
pub use config::Config;
