//! Authentication: bearer-token introspection against Keycloak
//!
//! The service never decodes JWTs itself. Tokens are handed to the identity
//! provider; its answer (or the anonymous fallback when no token is sent)
//! becomes the subject recorded in permission rows.

use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const INTROSPECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Subject used when a request carries no Authorization header
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Authenticated caller resolved from a bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Opaque subject identifier, used in permission rows
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub roles: Vec<String>,
}

impl AuthenticatedUser {
    /// The identity assigned to requests without credentials
    pub fn anonymous() -> Self {
        Self {
            user_id: ANONYMOUS_SUBJECT.to_string(),
            email: None,
            username: None,
            roles: vec![],
        }
    }
}

/// Trait for token validation
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate a bearer token. `Ok(None)` means the token is invalid or
    /// expired; errors mean the provider itself failed.
    async fn introspect(&self, token: &str) -> Result<Option<AuthenticatedUser>>;
}

/// Keycloak OIDC token introspection
pub struct KeycloakIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    realm: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    realm_access: Option<RealmAccess>,
}

#[derive(Debug, Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

impl KeycloakIdentityProvider {
    pub fn new(base_url: &str, realm: &str, client_id: &str, client_secret: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(INTROSPECT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            realm: realm.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    fn introspect_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token/introspect",
            self.base_url, self.realm
        )
    }
}

#[async_trait]
impl IdentityProvider for KeycloakIdentityProvider {
    async fn introspect(&self, token: &str) -> Result<Option<AuthenticatedUser>> {
        let response = self
            .client
            .post(self.introspect_url())
            .form(&[
                ("token", token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Upstream(format!(
                "token introspection returned {}",
                status
            )));
        }

        let info: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| RagError::Upstream(format!("invalid introspection response: {}", e)))?;

        if !info.active {
            return Ok(None);
        }
        let Some(sub) = info.sub.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        Ok(Some(AuthenticatedUser {
            user_id: sub,
            email: info.email,
            username: info.preferred_username,
            roles: info.realm_access.map(|r| r.roles).unwrap_or_default(),
        }))
    }
}

/// Provider used when no Keycloak client secret is configured: every bearer
/// token is rejected, so only anonymous access remains.
pub struct RejectAllIdentityProvider;

#[async_trait]
impl IdentityProvider for RejectAllIdentityProvider {
    async fn introspect(&self, _token: &str) -> Result<Option<AuthenticatedUser>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_user() {
        let user = AuthenticatedUser::anonymous();
        assert_eq!(user.user_id, ANONYMOUS_SUBJECT);
        assert!(user.roles.is_empty());
    }

    #[test]
    fn test_introspect_url() {
        let provider = KeycloakIdentityProvider::new("http://kc:8080/", "tenants", "api", "secret");
        assert_eq!(
            provider.introspect_url(),
            "http://kc:8080/realms/tenants/protocol/openid-connect/token/introspect"
        );
    }

    #[tokio::test]
    async fn test_reject_all_provider() {
        let provider = RejectAllIdentityProvider;
        assert!(provider.introspect("any-token").await.unwrap().is_none());
    }
}
