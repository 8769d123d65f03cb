//! Tests for Keycloak token introspection against a mocked endpoint

use ragstore::auth::{IdentityProvider, KeycloakIdentityProvider};
use ragstore::error::RagError;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_active_token_resolves_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/realms/tenants/protocol/openid-connect/token/introspect"))
        .and(body_string_contains("token=valid-token"))
        .and(body_string_contains("client_id=api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "sub": "user-42",
            "email": "user@example.com",
            "preferred_username": "user42",
            "realm_access": {"roles": ["uma_authorization"]}
        })))
        .mount(&server)
        .await;

    let provider = KeycloakIdentityProvider::new(&server.uri(), "tenants", "api", "secret");
    let user = provider.introspect("valid-token").await.unwrap().unwrap();

    assert_eq!(user.user_id, "user-42");
    assert_eq!(user.email.as_deref(), Some("user@example.com"));
    assert_eq!(user.username.as_deref(), Some("user42"));
    assert_eq!(user.roles, vec!["uma_authorization".to_string()]);
}

#[tokio::test]
async fn test_inactive_token_yields_no_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/realms/tenants/protocol/openid-connect/token/introspect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"active": false})))
        .mount(&server)
        .await;

    let provider = KeycloakIdentityProvider::new(&server.uri(), "tenants", "api", "secret");
    assert!(provider.introspect("expired").await.unwrap().is_none());
}

#[tokio::test]
async fn test_active_token_without_subject_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/realms/tenants/protocol/openid-connect/token/introspect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"active": true})))
        .mount(&server)
        .await;

    let provider = KeycloakIdentityProvider::new(&server.uri(), "tenants", "api", "secret");
    assert!(provider.introspect("odd-token").await.unwrap().is_none());
}

#[tokio::test]
async fn test_provider_failure_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/realms/tenants/protocol/openid-connect/token/introspect"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = KeycloakIdentityProvider::new(&server.uri(), "tenants", "api", "secret");
    let err = provider.introspect("any").await.unwrap_err();
    assert!(matches!(err, RagError::Upstream(_)));
}
