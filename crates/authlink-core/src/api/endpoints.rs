//! Endpoint paths exposed by the identity service.
//!
//! Paths are relative; [`Config::build_url`](crate::Config::build_url)
//! joins them onto the configured base URL and prefix.

pub const LOGIN: &str = "/auth/login";
pub const SIGNUP: &str = "/auth/signup";
pub const REFRESH: &str = "/auth/refresh";
pub const LOGOUT: &str = "/auth/logout";
pub const FORGOT_PASSWORD: &str = "/auth/password/forgot";
pub const RESET_PASSWORD: &str = "/auth/password/reset";
pub const VERIFY_EMAIL: &str = "/auth/verify/confirm";
pub const VERIFY_REQUEST: &str = "/auth/verify/request";
pub const GOOGLE_START: &str = "/auth/google/start";

pub const USERS_ME: &str = "/users/me";
