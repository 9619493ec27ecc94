//! Shared helpers for session integration tests

#![allow(dead_code)]

use chrono::{Duration, Utc};
use distributech_http::session::token::AccessClaims;
use distributech_http::{ApiClient, MemoryTokenStore, SessionManager, StoredTokens};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::MockServer;

/// Sign an access token expiring `ttl` from now
pub fn mint_token(ttl: Duration, jti: &str) -> String {
    let claims = AccessClaims {
        exp: (Utc::now() + ttl).timestamp(),
        iat: Some(Utc::now().timestamp()),
        user_id: Some(1),
        token_type: Some("access".into()),
        jti: Some(jti.into()),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap()
}

pub fn valid_token(jti: &str) -> String {
    mint_token(Duration::minutes(5), jti)
}

pub fn expired_token(jti: &str) -> String {
    mint_token(Duration::minutes(-5), jti)
}

pub fn api(server: &MockServer) -> ApiClient {
    ApiClient::new(format!("{}/api", server.uri())).unwrap()
}

/// Manager with a persisted token pair, not yet restored
pub fn manager_with_tokens(
    server: &MockServer,
    access: &str,
    refresh: &str,
) -> (SessionManager, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::with_tokens(StoredTokens::new(
        access, refresh,
    )));
    (SessionManager::new(api(server), store.clone()), store)
}

pub fn profile_json(id: i64, username: &str, role: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "email": format!("{username}@example.com"),
        "role": {"id": 3, "name": role},
        "department": {"id": 2, "name": "Sales"},
        "created_at": "2024-03-01T10:00:00Z",
        "updated_at": "2024-03-02T10:00:00Z",
    })
}

/// Mount the login endpoints and sign in, returning the manager
///
/// The profile endpoint answers any bearer token.
pub async fn signed_in(
    server: &MockServer,
    access: &str,
    refresh: &str,
) -> (SessionManager, Arc<MemoryTokenStore>) {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    Mock::given(method("POST"))
        .and(path("/api/auth/token/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": access, "refresh": refresh})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/me/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(profile_json(1, "alice", "Warehouse Manager")),
        )
        .mount(server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let manager = SessionManager::new(api(server), store.clone());
    manager.login("alice", "secret").await.unwrap();
    (manager, store)
}
