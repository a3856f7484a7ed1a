//! REST API client module for the identity service.
//!
//! This module provides the `ApiClient` request pipeline together with
//! typed wrappers for the authentication and profile endpoints.
//!
//! The service uses short-lived JWT bearer tokens; the long-lived refresh
//! token travels as an HTTP-only cookie and is handled by the client's
//! cookie store.

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod response;
pub mod users;

pub use client::{ApiClient, ApiRequest};
pub use error::ApiError;
pub use response::ApiResponse;
