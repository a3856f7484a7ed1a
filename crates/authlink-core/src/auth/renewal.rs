//! The renewal call: trade the refresh cookie for a new access token.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use super::AccessToken;
use crate::api::ApiError;
use crate::models::RenewalResponse;

/// Why a renewal attempt produced no usable token.
///
/// Cloneable so one outcome can be handed to every request waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    #[error("token renewal failed: {0}")]
    Transport(String),

    #[error("token renewal timed out")]
    Timeout,

    #[error("token renewal rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("token renewal returned no access token")]
    MissingToken,

    /// The session was reset (login or logout) while the renewal ran.
    #[error("session changed during token renewal")]
    Superseded,
}

/// Performs one renewal call. Implementations do not retry.
#[async_trait]
pub trait Renewer: Send + Sync {
    async fn renew(&self) -> Result<AccessToken, RenewalError>;
}

/// Renews against the identity service's refresh endpoint.
///
/// The refresh token is an HTTP-only cookie, so `client` must be the
/// cookie-enabled client that performed the login.
#[derive(Clone, Debug)]
pub struct HttpRenewer {
    client: Client,
    url: String,
}

impl HttpRenewer {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    fn transport_error(err: reqwest::Error) -> RenewalError {
        if err.is_timeout() {
            RenewalError::Timeout
        } else {
            RenewalError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Renewer for HttpRenewer {
    async fn renew(&self) -> Result<AccessToken, RenewalError> {
        debug!(url = %self.url, "Requesting token renewal");

        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = ApiError::message_from_body(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("renewal failed").to_string());
            warn!(status = status.as_u16(), "Token renewal rejected");
            return Err(RenewalError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(Self::transport_error)?;
        let renewed: RenewalResponse =
            serde_json::from_str(&body).map_err(|_| RenewalError::MissingToken)?;

        match renewed.access_token {
            Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
            _ => Err(RenewalError::MissingToken),
        }
    }
}
