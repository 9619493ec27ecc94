//! Bearer attachment, pre-request refresh and the 401 retry path

mod common;

use common::*;
use distributech_http::{SessionError, SessionEvent, SessionManager, TokenState, TokenStore};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_orders(server: &MockServer, token: &str, status: u16, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/api/orders/"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!([{"id": 1}])))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_refresh(server: &MockServer, template: ResponseTemplate, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(template)
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_valid_token_is_attached() {
    let server = MockServer::start().await;
    let access = valid_token("a1");
    mount_orders(&server, &access, 200, 1).await;
    mount_refresh(&server, ResponseTemplate::new(500), 0).await;

    let (manager, _) = signed_in(&server, &access, "r1").await;
    let orders: Value = manager.client().get("/orders/").await.unwrap();

    assert_eq!(orders[0]["id"], 1);
}

#[tokio::test]
async fn test_no_token_sends_no_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let manager = SessionManager::in_memory(api(&server));
    let body: Value = manager.client().get("/public/").await.unwrap();
    assert_eq!(body["ok"], true);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_expired_token_refreshed_before_request() {
    let server = MockServer::start().await;
    let stale = expired_token("a1");
    let fresh = valid_token("a2");

    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"access": fresh})),
        1,
    )
    .await;
    mount_orders(&server, &fresh, 200, 1).await;
    mount_orders(&server, &stale, 200, 0).await;

    let (manager, store) = signed_in(&server, &stale, "r1").await;
    assert_eq!(manager.token_state(), TokenState::Expired);
    let mut events = manager.subscribe();

    let _: Value = manager.client().get("/orders/").await.unwrap();

    assert_eq!(manager.access_token(), Some(fresh.clone()));
    assert_eq!(manager.refresh_token().as_deref(), Some("r1"));
    assert_eq!(manager.token_state(), TokenState::Valid);
    assert_eq!(store.load().unwrap().access, Some(fresh));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::TokenRefreshed);
}

#[tokio::test]
async fn test_refresh_failure_aborts_request_and_logs_out() {
    let server = MockServer::start().await;
    let stale = expired_token("a1");

    mount_refresh(
        &server,
        ResponseTemplate::new(401).set_body_json(json!({"detail": "Token is blacklisted"})),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (manager, store) = signed_in(&server, &stale, "r1").await;
    let mut events = manager.subscribe();

    let err = manager.client().get::<Value>("/orders/").await.unwrap_err();

    assert!(matches!(err, SessionError::RefreshFailed(_)));
    assert!(!manager.is_authenticated());
    assert_eq!(manager.access_token(), None);
    assert_eq!(manager.refresh_token(), None);
    assert_eq!(manager.token_state(), TokenState::Failed);
    assert!(store.load().unwrap().is_empty());
    assert!(matches!(
        events.try_recv().unwrap(),
        SessionEvent::LoginRequired { .. }
    ));
}

#[tokio::test]
async fn test_unauthorized_is_retried_once_with_new_token() {
    let server = MockServer::start().await;
    let revoked = valid_token("a1");
    let fresh = valid_token("a2");

    mount_orders(&server, &revoked, 401, 1).await;
    mount_orders(&server, &fresh, 200, 1).await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"access": fresh})),
        1,
    )
    .await;

    let (manager, _) = signed_in(&server, &revoked, "r1").await;
    let orders: Value = manager.client().get("/orders/").await.unwrap();

    assert_eq!(orders[0]["id"], 1);
    assert_eq!(manager.access_token(), Some(fresh));
    assert!(manager.is_authenticated());
}

#[tokio::test]
async fn test_second_unauthorized_requires_login() {
    let server = MockServer::start().await;
    let revoked = valid_token("a1");
    let fresh = valid_token("a2");

    mount_orders(&server, &revoked, 401, 1).await;
    mount_orders(&server, &fresh, 401, 1).await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"access": fresh})),
        1,
    )
    .await;

    let (manager, store) = signed_in(&server, &revoked, "r1").await;
    let mut events = manager.subscribe();

    let err = manager.client().get::<Value>("/orders/").await.unwrap_err();

    assert!(matches!(err, SessionError::LoginRequired(_)));
    assert!(!manager.is_authenticated());
    assert!(store.load().unwrap().is_empty());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::TokenRefreshed);
    assert!(matches!(
        events.try_recv().unwrap(),
        SessionEvent::LoginRequired { .. }
    ));
}

#[tokio::test]
async fn test_other_errors_pass_through() {
    let server = MockServer::start().await;
    let access = valid_token("a1");
    mount_orders(&server, &access, 403, 1).await;
    mount_refresh(&server, ResponseTemplate::new(500), 0).await;

    let (manager, _) = signed_in(&server, &access, "r1").await;
    let err = manager.client().get::<Value>("/orders/").await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Network(distributech_http::ClientError::Forbidden(_))
    ));
    assert!(manager.is_authenticated());
}

#[tokio::test]
async fn test_concurrent_expired_requests_share_one_refresh() {
    let server = MockServer::start().await;
    let stale = expired_token("a1");
    let fresh = valid_token("a2");

    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"access": fresh}))
            .set_delay(Duration::from_millis(200)),
        1,
    )
    .await;
    mount_orders(&server, &fresh, 200, 5).await;

    let (manager, _) = signed_in(&server, &stale, "r1").await;
    let client = manager.client();

    let requests = (0..5).map(|_| client.get::<Value>("/orders/"));
    let results = futures::future::join_all(requests).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(manager.access_token(), Some(fresh));
}

#[tokio::test]
async fn test_expired_token_without_refresh_token_goes_to_login() {
    let server = MockServer::start().await;
    let stale = expired_token("a1");

    // A restored session that only kept its access token
    let store = std::sync::Arc::new(distributech_http::MemoryTokenStore::with_tokens(
        distributech_http::StoredTokens {
            access: Some(stale.clone()),
            refresh: None,
        },
    ));
    Mock::given(method("GET"))
        .and(path("/api/users/me/"))
        .and(header("authorization", format!("Bearer {stale}").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let manager = SessionManager::new(api(&server), store.clone());
    let err = manager.restore().await.unwrap_err();

    assert!(matches!(err, SessionError::LoginRequired(_)));
    assert!(!manager.is_authenticated());
    assert!(store.load().unwrap().is_empty());
}

#[tokio::test]
async fn test_token_state_is_refreshing_while_refresh_in_flight() {
    let server = MockServer::start().await;
    let stale = expired_token("a1");
    let fresh = valid_token("a2");

    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"access": fresh}))
            .set_delay(Duration::from_millis(300)),
        1,
    )
    .await;
    mount_orders(&server, &fresh, 200, 1).await;

    let (manager, _) = signed_in(&server, &stale, "r1").await;
    let client = manager.client();
    let request = tokio::spawn(async move { client.get::<Value>("/orders/").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.token_state(), TokenState::Refreshing);

    request.await.unwrap().unwrap();
    assert_eq!(manager.token_state(), TokenState::Valid);
}

#[tokio::test]
async fn test_refresh_result_after_logout_is_discarded() {
    let server = MockServer::start().await;
    let stale = expired_token("a1");
    let fresh = valid_token("a2");

    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"access": fresh}))
            .set_delay(Duration::from_millis(300)),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (manager, store) = signed_in(&server, &stale, "r1").await;
    let client = manager.client();
    let request = tokio::spawn(async move { client.get::<Value>("/orders/").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.logout();

    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::NotAuthenticated));
    assert!(!manager.is_authenticated());
    assert_eq!(manager.access_token(), None);
    assert_eq!(manager.refresh_token(), None);
    assert!(store.load().unwrap().is_empty());
}

#[tokio::test]
async fn test_late_refresh_failure_keeps_new_login() {
    let server = MockServer::start().await;
    let stale = expired_token("a1");
    let second = valid_token("a2");

    Mock::given(method("POST"))
        .and(path("/api/auth/token/"))
        .and(body_json(json!({"username": "alice", "password": "first"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": stale, "refresh": "r1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/"))
        .and(body_json(json!({"username": "alice", "password": "second"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": second, "refresh": "r2"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/me/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(profile_json(1, "alice", "Supplier")),
        )
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(401)
            .set_body_json(json!({"detail": "Token is invalid or expired"}))
            .set_delay(Duration::from_millis(400)),
        1,
    )
    .await;

    let store = std::sync::Arc::new(distributech_http::MemoryTokenStore::new());
    let manager = SessionManager::new(api(&server), store.clone());
    manager.login("alice", "first").await.unwrap();

    let client = manager.client();
    let request = tokio::spawn(async move { client.get::<Value>("/orders/").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.logout();
    manager.login("alice", "second").await.unwrap();
    assert!(manager.is_authenticated());
    let mut events = manager.subscribe();

    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::RefreshFailed(_)));

    assert!(manager.is_authenticated());
    assert_eq!(manager.access_token(), Some(second.clone()));
    assert_eq!(manager.refresh_token().as_deref(), Some("r2"));
    assert_eq!(manager.token_state(), TokenState::Valid);
    assert_eq!(manager.last_error(), None);
    assert_eq!(store.load().unwrap().refresh.as_deref(), Some("r2"));
    assert!(events.try_recv().is_err());
}
