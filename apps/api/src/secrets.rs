//! API key retrieval: from the process environment or from Google Secret Manager.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, SecretSource};

pub const SECRET_MANAGER_API_BASE: &str = "https://secretmanager.googleapis.com/v1";
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret '{0}' is not set or empty")]
    Missing(String),

    #[error("Could not obtain a GCP access token: {0}")]
    Token(String),

    #[error("Secret Manager request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Secret Manager returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Secret payload is malformed: {0}")]
    Payload(String),
}

#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<String, SecretError>;
}

/// Reads the secret from an environment variable of the same name.
pub struct EnvSecretProvider;

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn fetch(&self, name: &str) -> Result<String, SecretError> {
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SecretError::Missing(name.to_string()))
    }
}

/// Reads `projects/{project}/secrets/{name}/versions/latest`.
///
/// Authenticates with `GCP_ACCESS_TOKEN` when set, otherwise with a token from the
/// GCE metadata server (Cloud Run, Cloud Functions, GCE).
pub struct SecretManagerProvider {
    client: Client,
    project_id: String,
    api_base: String,
    metadata_token_url: String,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

impl SecretManagerProvider {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            project_id: project_id.into(),
            api_base: SECRET_MANAGER_API_BASE.to_string(),
            metadata_token_url: METADATA_TOKEN_URL.to_string(),
        }
    }

    fn access_url(&self, name: &str) -> String {
        format!(
            "{}/projects/{}/secrets/{}/versions/latest:access",
            self.api_base.trim_end_matches('/'),
            self.project_id,
            name
        )
    }

    async fn access_token(&self) -> Result<String, SecretError> {
        if let Some(token) = std::env::var("GCP_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
        {
            return Ok(token.trim().to_string());
        }

        let response = self
            .client
            .get(&self.metadata_token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| SecretError::Token(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SecretError::Token(format!(
                "metadata server returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| SecretError::Token(e.to_string()))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl SecretProvider for SecretManagerProvider {
    async fn fetch(&self, name: &str) -> Result<String, SecretError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(self.access_url(name))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SecretError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: AccessSecretVersionResponse = response.json().await?;
        let secret = decode_payload(&body.payload.data)?;
        if secret.is_empty() {
            return Err(SecretError::Missing(name.to_string()));
        }

        info!(project = %self.project_id, secret = name, "Secret loaded from Secret Manager");
        Ok(secret)
    }
}

/// Secret Manager returns the payload as standard base64.
fn decode_payload(data: &str) -> Result<String, SecretError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| SecretError::Payload(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| SecretError::Payload(e.to_string()))?;
    Ok(text.trim().to_string())
}

/// The provider selected by `SECRET_SOURCE`.
pub fn provider_for(config: &Config) -> Arc<dyn SecretProvider> {
    match &config.secret_source {
        SecretSource::Env => Arc::new(EnvSecretProvider),
        SecretSource::SecretManager { project_id } => {
            Arc::new(SecretManagerProvider::new(project_id.clone()))
        }
    }
}
