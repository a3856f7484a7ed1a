//! Data models for identity-service payloads.
//!
//! This module contains the request and response bodies exchanged with
//! the service:
//!
//! - `User`, `UserProfile`, `ProfileUpdate`: the signed-in identity
//! - `LoginResponse`, `SignupResponse`, `RenewalResponse`: auth flows
//! - `GoogleAuthStart` and the small acknowledgement bodies

pub mod auth;
pub mod user;

pub use auth::{
    Acknowledged, GoogleAuthStart, LoginRequest, LoginResponse, PasswordReset, RenewalResponse,
    SignupRequest, SignupResponse, VerificationResult,
};
pub use user::{ProfileUpdate, User, UserProfile};
