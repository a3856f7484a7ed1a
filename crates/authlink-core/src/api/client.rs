//! API client for communicating with the identity service.
//!
//! Every call made through `ApiClient` goes through the same pipeline:
//! the current access token is attached as a bearer credential, and a
//! `401 Unauthorized` answer triggers one coordinated token renewal
//! followed by exactly one retry of the same call. All other responses,
//! successful or not, come back untouched.

use std::fmt;
use std::sync::Arc;

use reqwest::{header, Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{endpoints, ApiError};
use crate::auth::{AccessToken, HttpRenewer, RenewalCoordinator, Renewer, TokenStore};
use crate::config::Config;

/// One logical call to the service.
///
/// The request itself is never mutated between attempts; the retry state
/// lives in the pipeline.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    renewable: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            renewable: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// A 401 on this call is final: no renewal, no retry.
    ///
    /// Used for the credential-issuing endpoints, where a 401 means the
    /// submitted credentials are wrong rather than that a token expired.
    pub fn without_renewal(mut self) -> Self {
        self.renewable = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_renewable(&self) -> bool {
        self.renewable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    Retry,
}

/// A call in flight together with how many times it has been sent.
#[derive(Debug, Clone, Copy)]
struct PendingCall<'a> {
    call: &'a ApiRequest,
    attempt: Attempt,
}

impl<'a> PendingCall<'a> {
    fn new(call: &'a ApiRequest) -> Self {
        Self {
            call,
            attempt: Attempt::Initial,
        }
    }

    fn may_renew(&self) -> bool {
        self.call.renewable && self.attempt == Attempt::Initial
    }

    fn retried(self) -> Self {
        Self {
            call: self.call,
            attempt: Attempt::Retry,
        }
    }
}

/// API client for the identity service.
/// Clone is cheap - the HTTP client, token holder and coordinator are all shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: Arc<Config>,
    tokens: TokenStore,
    coordinator: RenewalCoordinator,
}

impl ApiClient {
    /// Create a client that renews tokens against the service's refresh endpoint.
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let client = Self::http_client(&config)?;
        let renewer = HttpRenewer::new(client.clone(), config.build_url(endpoints::REFRESH));
        Ok(Self::assemble(client, config, Arc::new(renewer)))
    }

    /// Create a client with a custom renewal operation.
    pub fn with_renewer(config: Config, renewer: Arc<dyn Renewer>) -> Result<Self, ApiError> {
        let client = Self::http_client(&config)?;
        Ok(Self::assemble(client, config, renewer))
    }

    fn http_client(config: &Config) -> Result<Client, ApiError> {
        Client::builder()
            .timeout(config.timeout())
            .cookie_store(true)
            .build()
            .map_err(ApiError::Network)
    }

    fn assemble(client: Client, config: Config, renewer: Arc<dyn Renewer>) -> Self {
        let tokens = TokenStore::new();
        let coordinator = RenewalCoordinator::new(tokens.clone(), renewer);
        Self {
            client,
            config: Arc::new(config),
            tokens,
            coordinator,
        }
    }

    /// The holder of the access token attached to outgoing calls.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn coordinator(&self) -> &RenewalCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Force a renewal now, sharing any renewal already in flight.
    pub async fn renew_token(&self) -> Result<AccessToken, ApiError> {
        let current = self.tokens.get();
        Ok(self.coordinator.acquire(current.as_ref()).await?)
    }

    async fn send(
        &self,
        pending: PendingCall<'_>,
        token: Option<&AccessToken>,
    ) -> Result<Response, ApiError> {
        let call = pending.call;
        let url = self.config.build_url(&call.path);

        let mut builder = self.client.request(call.method.clone(), &url);
        if !call.query.is_empty() {
            builder = builder.query(&call.query);
        }
        if let Some(ref body) = call.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            let value = token.bearer_header().map_err(|_| {
                ApiError::InvalidRequest("Access token is not a valid header value".to_string())
            })?;
            builder = builder.header(header::AUTHORIZATION, value);
        }

        debug!(
            method = %call.method,
            path = %call.path,
            attempt = ?pending.attempt,
            authenticated = token.is_some(),
            "Sending request"
        );

        Ok(builder.send().await?)
    }

    /// Send a call through the pipeline.
    ///
    /// Returns the service's response for anything but a 401. A 401 on a
    /// renewable call that has not been retried yet waits for a renewed
    /// token and resends the call once; a 401 after that (or on a
    /// non-renewable call) becomes `ApiError::Unauthorized`. If renewal
    /// fails, its error is returned instead of the 401.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let mut pending = PendingCall::new(request);
        let mut token = self.tokens.get();

        loop {
            let response = self.send(pending, token.as_ref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if !pending.may_renew() {
                if pending.attempt == Attempt::Retry {
                    warn!(path = %request.path, "Request rejected again after token renewal");
                }
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::from_status(StatusCode::UNAUTHORIZED, &body));
            }

            debug!(path = %request.path, "Request unauthorized, waiting for renewed token");
            let renewed = self.coordinator.acquire(token.as_ref()).await?;
            token = Some(renewed);
            pending = pending.retried();
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Execute a call and decode a successful JSON body.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ApiError> {
        let response = Self::check_response(self.execute(request).await?).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", request.path, e))
        })
    }

    /// Execute a call whose successful body is irrelevant (e.g. `204 No Content`).
    pub async fn request_empty(&self, request: &ApiRequest) -> Result<(), ApiError> {
        Self::check_response(self.execute(request).await?).await?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(&ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request_json(&ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request_json(&ApiRequest::put(path).json(body)?).await
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_url", &self.config.api_url)
            .field("tokens", &self.tokens)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
