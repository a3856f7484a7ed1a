//! Uniform result envelope handed to callers.

use serde::{Deserialize, Serialize};

use super::ApiError;

/// `{ data, message, ok }` view of a call outcome.
///
/// A failed call never carries data and always carries a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub ok: bool,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            message: None,
            ok: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: None,
            message: Some(message.into()),
            ok: false,
        }
    }
}

impl<T> From<Result<T, ApiError>> for ApiResponse<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}
