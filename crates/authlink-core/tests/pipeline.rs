mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authlink_core::auth::{RenewalError, Renewer};
use authlink_core::{AccessToken, ApiClient, ApiError, ApiResponse};
use futures::future::join_all;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    client_for, client_with_timeout, config_for, mount_profile, mount_refresh,
    mount_refresh_rejected,
};

const RENEWAL_DELAY: Duration = Duration::from_millis(200);

#[tokio::test]
async fn test_attaches_bearer_token() {
    let server = MockServer::start().await;
    mount_profile(&server, "tok-A", 1).await;
    mount_refresh(&server, "unused", Duration::ZERO, 0).await;

    let api = client_for(&server);
    api.tokens().set(Some(AccessToken::from("tok-A")));

    let profile = api.profile().await.expect("profile");
    assert_eq!(profile.id, "u1");
    server.verify().await;
}

#[tokio::test]
async fn test_concurrent_unauthorized_calls_share_one_renewal() {
    let server = MockServer::start().await;
    // 5 initial attempts rejected, 5 retries accepted
    mount_profile(&server, "fresh", 10).await;
    mount_refresh(&server, "fresh", RENEWAL_DELAY, 1).await;

    let api = client_for(&server);
    api.tokens().set(Some(AccessToken::from("expired")));

    let results = join_all((0..5).map(|_| api.profile())).await;

    assert!(results.iter().all(|r| r.is_ok()), "all calls succeed: {:?}", results);
    assert_eq!(api.tokens().get(), Some(AccessToken::from("fresh")));
    assert_eq!(api.coordinator().episodes(), 1);
    server.verify().await;
}

#[tokio::test]
async fn test_second_unauthorized_is_terminal() {
    let server = MockServer::start().await;
    // Nothing is ever accepted: initial attempt plus exactly one retry
    mount_profile(&server, "never-valid", 2).await;
    mount_refresh(&server, "fresh", Duration::ZERO, 1).await;

    let api = client_for(&server);
    api.tokens().set(Some(AccessToken::from("expired")));

    let result = api.profile().await;

    assert!(matches!(result, Err(ApiError::Unauthorized(ref m)) if m == "Invalid or expired token"));
    server.verify().await;
}

#[tokio::test]
async fn test_failed_renewal_fails_every_waiting_call() {
    let server = MockServer::start().await;
    mount_profile(&server, "fresh", 3).await;
    // Renewal answers long after the client gives up
    mount_refresh(&server, "too-late", Duration::from_secs(3), 1).await;

    let api = client_with_timeout(&server, Duration::from_millis(300));
    api.tokens().set(Some(AccessToken::from("expired")));

    let results = join_all((0..3).map(|_| api.profile())).await;

    for result in &results {
        assert!(
            matches!(result, Err(ApiError::Renewal(RenewalError::Timeout))),
            "expected renewal failure, got {:?}",
            result
        );
    }
    assert_eq!(api.tokens().get(), None);
    assert_eq!(api.coordinator().episodes(), 1);
}

#[tokio::test]
async fn test_rejected_renewal_surfaces_renewal_error() {
    let server = MockServer::start().await;
    mount_profile(&server, "fresh", 1).await;
    mount_refresh_rejected(&server, 1).await;

    let api = client_for(&server);
    api.tokens().set(Some(AccessToken::from("expired")));

    let result = api.profile().await;

    assert!(matches!(
        result,
        Err(ApiError::Renewal(RenewalError::Rejected { status: 401, .. }))
    ));
    assert!(!api.tokens().is_set());
    server.verify().await;
}

#[tokio::test]
async fn test_renewal_without_token_in_payload_fails() {
    let server = MockServer::start().await;
    mount_profile(&server, "fresh", 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "bearer"})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server);
    api.tokens().set(Some(AccessToken::from("expired")));

    let result = api.profile().await;
    assert!(matches!(result, Err(ApiError::Renewal(RenewalError::MissingToken))));
    server.verify().await;
}

#[tokio::test]
async fn test_unauthenticated_call_is_renewed_and_retried() {
    let server = MockServer::start().await;
    mount_profile(&server, "from-cookie", 2).await;
    mount_refresh(&server, "from-cookie", Duration::ZERO, 1).await;

    let api = client_for(&server);
    assert!(!api.tokens().is_set());

    let profile = api.profile().await.expect("retried with renewed token");
    assert_eq!(profile.id, "u1");
    assert_eq!(api.tokens().get(), Some(AccessToken::from("from-cookie")));
    server.verify().await;
}

#[tokio::test]
async fn test_other_errors_pass_through_without_renewal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "Forbidden"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, "unused", Duration::ZERO, 0).await;

    let api = client_for(&server);
    api.tokens().set(Some(AccessToken::from("tok-A")));

    let response: ApiResponse<_> = api.profile().await.into();
    assert!(!response.ok);
    assert!(response.data.is_none());
    assert_eq!(response.message.as_deref(), Some("Access denied: Forbidden"));
    assert_eq!(api.tokens().get(), Some(AccessToken::from("tok-A")));
    server.verify().await;
}

#[tokio::test]
async fn test_login_unauthorized_does_not_renew() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid credentials"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, "unused", Duration::ZERO, 0).await;

    let api = client_for(&server);
    let result = api.login("ada@example.com", "wrong").await;

    assert!(matches!(result, Err(ApiError::Unauthorized(ref m)) if m == "Invalid credentials"));
    assert_eq!(api.coordinator().episodes(), 0);
    server.verify().await;
}

#[tokio::test]
async fn test_retry_resends_identical_body() {
    let server = MockServer::start().await;
    let update = json!({"full_name": "Grace Hopper"});

    Mock::given(method("PUT"))
        .and(path("/users/me"))
        .and(header("authorization", "Bearer fresh"))
        .and(wiremock::matchers::body_json(&update))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1", "full_name": "Grace Hopper"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/users/me"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, "fresh", Duration::ZERO, 1).await;

    let api = client_for(&server);
    api.tokens().set(Some(AccessToken::from("expired")));

    let profile = api
        .update_profile(&authlink_core::models::ProfileUpdate {
            full_name: Some("Grace Hopper".to_string()),
            ..Default::default()
        })
        .await
        .expect("update succeeds after renewal");
    assert_eq!(profile.full_name.as_deref(), Some("Grace Hopper"));
    server.verify().await;
}

#[tokio::test]
async fn test_refresh_cookie_from_login_is_sent_on_renewal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "refresh_token=r-123; Path=/; HttpOnly")
                .set_body_json(json!({
                    "access_token": "short-lived",
                    "user": {"id": "u1", "email": "ada@example.com", "name": "Ada"}
                })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(header("cookie", "refresh_token=r-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "renewed"})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server);
    api.login("ada@example.com", "secret").await.expect("login");

    let renewed = api.renew_token().await.expect("renewal uses cookie");
    assert_eq!(renewed, AccessToken::from("renewed"));
    server.verify().await;
}

#[tokio::test]
async fn test_verify_email_sends_token_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/verify/confirm"))
        .and(wiremock::matchers::query_param("token", "v-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"verified": true})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server);
    let result = api.verify_email("v-42").await.expect("verification");
    assert!(result.verified);
    server.verify().await;
}

/// Hands out a fixed token without touching the network.
struct FixedRenewer {
    token: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl Renewer for FixedRenewer {
    async fn renew(&self) -> Result<AccessToken, RenewalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::from(self.token))
    }
}

#[tokio::test]
async fn test_custom_renewer_replaces_refresh_endpoint() {
    let server = MockServer::start().await;
    mount_profile(&server, "scripted", 2).await;
    mount_refresh(&server, "unused", Duration::ZERO, 0).await;

    let renewer = Arc::new(FixedRenewer {
        token: "scripted",
        calls: AtomicUsize::new(0),
    });
    let api = ApiClient::with_renewer(config_for(&server), renewer.clone()).expect("client builds");
    api.tokens().set(Some(AccessToken::from("expired")));

    let profile = api.profile().await.expect("retried with scripted token");

    assert_eq!(profile.id, "u1");
    assert_eq!(renewer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.tokens().get(), Some(AccessToken::from("scripted")));
    server.verify().await;
}
