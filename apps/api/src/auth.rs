//! Caller identity for history access.
//!
//! Clients sign in with the identity service (anonymously or with a custom token) and
//! send the resulting ID token as `Authorization: Bearer <token>`. The history owner is
//! always the verified user, never a user id taken from the request.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

pub const IDENTITY_API_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("A bearer token is required")]
    Missing,

    #[error("Token verification is not configured")]
    NotConfigured,

    #[error("Invalid or expired token: {0}")]
    Rejected(String),

    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Verifies ID tokens with the Identity Toolkit `accounts:lookup` endpoint.
pub struct IdentityToolkitVerifier {
    client: Client,
    api_key: String,
    api_base: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
}

impl IdentityToolkitVerifier {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into(),
        }
    }

    fn lookup_url(&self) -> String {
        format!("{}/accounts:lookup", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl IdentityVerifier for IdentityToolkitVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .post(self.lookup_url())
            .query(&[("key", &self.api_key)])
            .json(&LookupRequest { id_token: token })
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected(body));
        }
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        lookup
            .users
            .into_iter()
            .next()
            .map(|user| Identity {
                user_id: user.local_id,
            })
            .ok_or_else(|| AuthError::Rejected("no user for token".to_string()))
    }
}

/// Used when no identity API key is configured: every token is refused.
pub struct DisabledVerifier;

#[async_trait]
impl IdentityVerifier for DisabledVerifier {
    async fn verify(&self, _token: &str) -> Result<Identity, AuthError> {
        Err(AuthError::NotConfigured)
    }
}

pub fn verifier_for(config: &Config) -> Arc<dyn IdentityVerifier> {
    match &config.identity_api_key {
        Some(key) => Arc::new(IdentityToolkitVerifier::new(
            key.clone(),
            config.identity_api_base.clone(),
        )),
        None => {
            tracing::warn!("IDENTITY_API_KEY not set; history requests will be refused");
            Arc::new(DisabledVerifier)
        }
    }
}

/// The raw bearer token of a request, if any. Never rejects; verification is separate.
#[derive(Debug, Clone, Default)]
pub struct BearerToken(pub Option<String>);

fn bearer_from(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(bearer_from(&parts.headers)))
    }
}

/// Verifies the request's token. A missing token is `AuthError::Missing`.
pub async fn authenticate(
    verifier: &dyn IdentityVerifier,
    token: &BearerToken,
) -> Result<Identity, AuthError> {
    let token = token.0.as_deref().ok_or(AuthError::Missing)?;
    verifier.verify(token).await
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;

    use super::*;

    /// Accepts a fixed set of tokens, each mapped to a user id.
    pub struct StaticVerifier {
        tokens: HashMap<String, String>,
    }

    impl StaticVerifier {
        pub fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                tokens: pairs
                    .iter()
                    .map(|(token, user)| (token.to_string(), user.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl IdentityVerifier for StaticVerifier {
        async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
            self.tokens
                .get(token)
                .map(|user_id| Identity {
                    user_id: user_id.clone(),
                })
                .ok_or_else(|| AuthError::Rejected("unknown token".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::testing::StaticVerifier;
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_from(&headers("Bearer abc.def")), Some("abc.def".to_string()));
        assert_eq!(bearer_from(&headers("bearer   xyz ")), Some("xyz".to_string()));
        assert_eq!(bearer_from(&headers("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_from(&headers("Bearer ")), None);
        assert_eq!(bearer_from(&HeaderMap::new()), None);
    }

    #[test]
    fn test_lookup_url() {
        let verifier = IdentityToolkitVerifier::new("key", "https://identitytoolkit.googleapis.com/v1/");
        assert_eq!(
            verifier.lookup_url(),
            "https://identitytoolkit.googleapis.com/v1/accounts:lookup"
        );
    }

    #[tokio::test]
    async fn test_authenticate_requires_a_token() {
        let verifier = StaticVerifier::new(&[("t1", "alice")]);
        assert!(matches!(
            authenticate(&verifier, &BearerToken(None)).await,
            Err(AuthError::Missing)
        ));
        assert_eq!(
            authenticate(&verifier, &BearerToken(Some("t1".to_string())))
                .await
                .unwrap()
                .user_id,
            "alice"
        );
        assert!(matches!(
            authenticate(&verifier, &BearerToken(Some("forged".to_string()))).await,
            Err(AuthError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_verifier_refuses_everything() {
        assert!(matches!(
            DisabledVerifier.verify("anything").await,
            Err(AuthError::NotConfigured)
        ));
    }
}
