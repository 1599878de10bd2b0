use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::auth::IDENTITY_API_BASE;
use crate::generation::PipelineSettings;
use crate::llm_client::{GeminiSettings, RetryPolicy};

/// Where the provider API key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    Env,
    SecretManager { project_id: String },
}

/// Application configuration loaded from environment variables.
/// Everything has a default except `GCP_PROJECT` when Secret Manager is selected.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Application id half of the history key.
    pub app_id: String,
    /// Empty means permissive CORS.
    pub allowed_origins: Vec<String>,
    pub json_body_limit: usize,
    pub request_timeout: Duration,
    pub gemini: GeminiSettings,
    pub retry: RetryPolicy,
    pub pipeline: PipelineSettings,
    pub secret_source: SecretSource,
    pub secret_name: String,
    /// Delay between initialization attempts. `None` disables retrying.
    pub init_retry: Option<Duration>,
    /// When unset, history lives in memory.
    pub database_url: Option<String>,
    pub rate_limit: RateLimitSettings,
    /// Web API key of the identity project. Without it no bearer token verifies.
    pub identity_api_key: Option<String>,
    pub identity_api_base: String,
}

/// Per-client fixed-window limit applied to every route except `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u32,
    /// Successful (< 400) responses do not count against the limit.
    pub skip_successful: bool,
    /// Key clients by the address the fronting proxy appended to `X-Forwarded-For`.
    pub trust_proxy: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
            skip_successful: false,
            trust_proxy: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `from_env` passes the process environment.
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = GeminiSettings::default();
        let gemini = GeminiSettings {
            api_base: var("GEMINI_API_BASE").unwrap_or(defaults.api_base),
            model: var("GEMINI_MODEL").unwrap_or(defaults.model),
            temperature: parse_or(&var, "GEMINI_TEMPERATURE", defaults.temperature)?,
            top_p: parse_or(&var, "GEMINI_TOP_P", defaults.top_p)?,
            top_k: parse_or(&var, "GEMINI_TOP_K", defaults.top_k)?,
            max_output_tokens: parse_or(&var, "GEMINI_MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
            request_timeout: Duration::from_secs(parse_or(&var, "PROVIDER_TIMEOUT_SECS", 120)?),
        };

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&var, "RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts)?,
            base_delay: Duration::from_millis(parse_or(&var, "RETRY_BASE_DELAY_MS", 1000)?),
            max_delay: Duration::from_millis(parse_or(&var, "RETRY_MAX_DELAY_MS", 10_000)?),
        };

        let pipeline_defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            scoring_char_budget: parse_or(
                &var,
                "SCORING_CHAR_BUDGET",
                pipeline_defaults.scoring_char_budget,
            )?,
            source_char_budget: parse_or(
                &var,
                "SOURCE_CHAR_BUDGET",
                pipeline_defaults.source_char_budget,
            )?,
        };

        let secret_source = match var("SECRET_SOURCE").as_deref() {
            None | Some("env") => SecretSource::Env,
            Some("secret-manager") => SecretSource::SecretManager {
                project_id: var("GCP_PROJECT").context(
                    "GCP_PROJECT is required when SECRET_SOURCE=secret-manager",
                )?,
            },
            Some(other) => bail!("SECRET_SOURCE must be 'env' or 'secret-manager', got '{other}'"),
        };

        let init_retry_secs: u64 = parse_or(&var, "INIT_RETRY_SECS", 30)?;

        let limit_defaults = RateLimitSettings::default();
        let rate_limit = RateLimitSettings {
            window: Duration::from_secs(parse_or(
                &var,
                "RATE_LIMIT_WINDOW_SECS",
                limit_defaults.window.as_secs(),
            )?),
            max_requests: parse_or(&var, "RATE_LIMIT_MAX", limit_defaults.max_requests)?,
            skip_successful: parse_or(
                &var,
                "RATE_LIMIT_SKIP_SUCCESSFUL",
                limit_defaults.skip_successful,
            )?,
            trust_proxy: parse_or(&var, "TRUST_PROXY", limit_defaults.trust_proxy)?,
        };

        Ok(Config {
            port: parse_or(&var, "PORT", 8080)?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            app_id: var("APP_ID").unwrap_or_else(|| "article-forge".to_string()),
            allowed_origins: var("ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            json_body_limit: parse_or(&var, "JSON_BODY_LIMIT_BYTES", 1024 * 1024)?,
            request_timeout: Duration::from_secs(parse_or(&var, "REQUEST_TIMEOUT_SECS", 540)?),
            gemini,
            retry,
            pipeline,
            secret_source,
            secret_name: var("SECRET_NAME").unwrap_or_else(|| "GEMINI_API_KEY".to_string()),
            init_retry: (init_retry_secs > 0).then(|| Duration::from_secs(init_retry_secs)),
            database_url: var("DATABASE_URL"),
            rate_limit,
            identity_api_key: var("IDENTITY_API_KEY"),
            identity_api_base: var("IDENTITY_API_BASE")
                .unwrap_or_else(|| IDENTITY_API_BASE.to_string()),
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
