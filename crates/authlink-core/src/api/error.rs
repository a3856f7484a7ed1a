use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::auth::RenewalError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session expired: {0}")]
    Renewal(#[from] RenewalError),

    #[error("Session ended while the request was in flight")]
    SessionEnded,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err)
        }
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Pull a human-readable message out of the service's error payload.
    ///
    /// The service reports errors as `{"detail": "..."}`, as
    /// `{"detail": {"message": "...", ...}}` for structured validation
    /// failures, or occasionally as `{"message": "..."}`.
    pub fn message_from_body(body: &str) -> Option<String> {
        let payload: Value = serde_json::from_str(body).ok()?;
        match payload.get("detail") {
            Some(Value::String(detail)) => return Some(detail.clone()),
            Some(Value::Object(detail)) => {
                if let Some(Value::String(message)) = detail.get("message") {
                    return Some(message.clone());
                }
            }
            _ => {}
        }
        payload
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::message_from_body(body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            } else {
                Self::truncate_body(body)
            }
        });

        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::Rejected { status, message },
        }
    }

    /// HTTP status of the response that produced this error, if one arrived.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED),
            ApiError::AccessDenied(_) => Some(StatusCode::FORBIDDEN),
            ApiError::NotFound(_) => Some(StatusCode::NOT_FOUND),
            ApiError::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::ServerError(_) => Some(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Network(e) => e.status(),
            ApiError::Timeout
            | ApiError::InvalidRequest(_)
            | ApiError::InvalidResponse(_)
            | ApiError::Renewal(_)
            | ApiError::SessionEnded => None,
        }
    }

    /// True when the failure means the session is gone and the user must sign in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized(_) | ApiError::Renewal(_) | ApiError::SessionEnded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_from_string_detail() {
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"detail": "Email already registered"}"#);
        assert_eq!(err.to_string(), "Email already registered");
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_message_from_structured_detail() {
        let body = r#"{"detail": {"message": "Password too weak", "score": 1, "feedback": ["add digits"]}}"#;
        let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(err.to_string(), "Password too weak");
    }

    #[test]
    fn test_message_falls_back_to_message_field() {
        let err = ApiError::from_status(StatusCode::FORBIDDEN, r#"{"message": "Email not verified"}"#);
        assert!(matches!(err, ApiError::AccessDenied(ref m) if m == "Email not verified"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"detail": "Invalid credentials"}"#),
            ApiError::Unauthorized(_)
        ));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, ""), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down"),
            ApiError::ServerError(ref m) if m == "upstream down"
        ));
    }

    #[test]
    fn test_empty_body_uses_reason_phrase() {
        let err = ApiError::from_status(StatusCode::CONFLICT, "");
        assert_eq!(err.to_string(), "Conflict");
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 50);
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let message = err.to_string();
        assert!(message.contains("truncated"));
        assert!(message.len() < body.len());
    }

    #[test]
    fn test_session_expired_classification() {
        assert!(ApiError::Unauthorized("x".into()).is_session_expired());
        assert!(ApiError::Renewal(RenewalError::MissingToken).is_session_expired());
        assert!(!ApiError::RateLimited.is_session_expired());
    }
}
