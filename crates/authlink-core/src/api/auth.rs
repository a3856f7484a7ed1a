//! Authentication endpoints.
//!
//! These wrappers only talk to the service. Storing the issued token is
//! left to [`SessionManager`](crate::SessionManager).

use serde_json::json;

use super::{endpoints, ApiClient, ApiError, ApiRequest};
use crate::models::{
    Acknowledged, GoogleAuthStart, LoginRequest, LoginResponse, PasswordReset, SignupRequest,
    SignupResponse, VerificationResult,
};

impl ApiClient {
    /// Exchange email and password for an access token (the refresh cookie
    /// lands in the client's cookie store).
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let request = ApiRequest::post(endpoints::LOGIN)
            .json(&LoginRequest { email, password })?
            .without_renewal();
        self.request_json(&request).await
    }

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignupResponse, ApiError> {
        let request = ApiRequest::post(endpoints::SIGNUP)
            .json(&SignupRequest {
                email,
                password,
                full_name,
            })?
            .without_renewal();
        self.request_json(&request).await
    }

    /// Revoke the refresh token server-side and drop its cookie.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.request_empty(&ApiRequest::post(endpoints::LOGOUT)).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<Acknowledged, ApiError> {
        self.post(endpoints::FORGOT_PASSWORD, &json!({ "email": email }))
            .await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<PasswordReset, ApiError> {
        self.post(
            endpoints::RESET_PASSWORD,
            &json!({ "token": token, "new_password": new_password }),
        )
        .await
    }

    /// Ask the service to resend the verification email.
    pub async fn request_verification(&self, email: &str) -> Result<Acknowledged, ApiError> {
        self.post(endpoints::VERIFY_REQUEST, &json!({ "email": email }))
            .await
    }

    /// Confirm an email address with the token from the verification link.
    pub async fn verify_email(&self, token: &str) -> Result<VerificationResult, ApiError> {
        self.request_json(&ApiRequest::get(endpoints::VERIFY_EMAIL).query("token", token))
            .await
    }

    /// Begin the Google OAuth flow; the caller sends the user to `auth_url`.
    pub async fn start_google_auth(&self) -> Result<GoogleAuthStart, ApiError> {
        self.get(endpoints::GOOGLE_START).await
    }
}
