//! Mock identity service shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use authlink_core::auth::MemoryCredentialStore;
use authlink_core::{ApiClient, Config, SessionManager};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub fn profile_json(id: &str) -> Value {
    json!({
        "id": id,
        "email": format!("{}@example.com", id),
        "full_name": "Ada Lovelace",
        "roles": ["admin"],
        "permissions": ["users:read"],
        "email_verified_at": "2024-05-01T12:00:00"
    })
}

/// Answers 200 with a profile when the request carries `Bearer <valid>`, 401 otherwise.
pub struct TokenGate {
    valid: String,
}

impl TokenGate {
    pub fn accepting(valid: &str) -> Self {
        Self {
            valid: valid.to_string(),
        }
    }
}

impl Respond for TokenGate {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let expected = format!("Bearer {}", self.valid);
        let authorization = request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok());

        if authorization == Some(expected.as_str()) {
            ResponseTemplate::new(200).set_body_json(profile_json("u1"))
        } else {
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid or expired token"}))
        }
    }
}

pub fn config_for(server: &MockServer) -> Config {
    Config::for_url(server.uri())
}

pub fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(config_for(server)).expect("client builds")
}

pub fn client_with_timeout(server: &MockServer, timeout: Duration) -> ApiClient {
    let mut config = config_for(server);
    config.timeout_ms = timeout.as_millis() as u64;
    ApiClient::new(config).expect("client builds")
}

pub fn session_for(
    server: &MockServer,
    store: Arc<MemoryCredentialStore>,
) -> SessionManager {
    SessionManager::new(client_for(server), store)
}

/// `/users/me` guarded by [`TokenGate`], expecting exactly `calls` hits.
pub async fn mount_profile(server: &MockServer, valid: &str, calls: u64) {
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .respond_with(TokenGate::accepting(valid))
        .expect(calls)
        .mount(server)
        .await;
}

/// `/auth/refresh` answering with `token` after `delay`, expecting exactly `calls` hits.
pub async fn mount_refresh(server: &MockServer, token: &str, delay: Duration, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": token}))
                .set_delay(delay),
        )
        .expect(calls)
        .mount(server)
        .await;
}

pub async fn mount_refresh_rejected(server: &MockServer, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "No refresh token"})),
        )
        .expect(calls)
        .mount(server)
        .await;
}
