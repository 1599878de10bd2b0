//! Service lifecycle: process-wide initialization state.
//!
//! Initialization (secret fetch, client construction) runs once in a spawned task.
//! Requests observe the state through `ServiceHandle::pipeline()` and are rejected
//! while it is `Initializing` or `Failed`. Nothing is queued.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::errors::AppError;
use crate::generation::ArticlePipeline;
use crate::llm_client::GeminiClient;
use crate::secrets::SecretProvider;

#[derive(Clone)]
pub enum ServiceState {
    Initializing,
    Ready(Arc<ArticlePipeline>),
    /// Initialization error, reported to clients in `details`.
    Failed(String),
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => f.write_str("Initializing"),
            Self::Ready(_) => f.write_str("Ready"),
            Self::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// Shared handle to the lifecycle. Clones point at the same state.
#[derive(Clone)]
pub struct ServiceHandle {
    state: Arc<RwLock<ServiceState>>,
}

impl Default for ServiceHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ServiceState::Initializing)),
        }
    }

    pub async fn state(&self) -> ServiceState {
        self.state.read().await.clone()
    }

    pub async fn mark_ready(&self, pipeline: Arc<ArticlePipeline>) {
        *self.state.write().await = ServiceState::Ready(pipeline);
    }

    pub async fn mark_failed(&self, reason: impl Into<String>) {
        *self.state.write().await = ServiceState::Failed(reason.into());
    }

    /// The pipeline, or the error a request must fail with.
    pub async fn pipeline(&self) -> Result<Arc<ArticlePipeline>, AppError> {
        match &*self.state.read().await {
            ServiceState::Ready(pipeline) => Ok(Arc::clone(pipeline)),
            ServiceState::Initializing => Err(AppError::Initializing),
            ServiceState::Failed(reason) => Err(AppError::InitializationFailed(reason.clone())),
        }
    }
}

/// Fetches the API key and builds the pipeline.
pub async fn initialize_once(
    config: &Config,
    secrets: &dyn SecretProvider,
) -> Result<Arc<ArticlePipeline>, String> {
    let api_key = secrets
        .fetch(&config.secret_name)
        .await
        .map_err(|e| e.to_string())?;

    let client = GeminiClient::new(api_key, config.gemini.clone(), config.retry)
        .map_err(|e| format!("{e:#}"))?;
    info!(model = client.model(), "Gemini client initialized");

    Ok(Arc::new(ArticlePipeline::new(
        Arc::new(client),
        config.pipeline,
    )))
}

/// Initializes until success. After a failure the handle stays `Failed` while the next
/// attempt waits; with `init_retry = None` the first failure is final.
pub async fn run_initialization(
    handle: ServiceHandle,
    config: Config,
    secrets: Arc<dyn SecretProvider>,
) {
    let mut attempt = 1u32;
    loop {
        match initialize_once(&config, secrets.as_ref()).await {
            Ok(pipeline) => {
                handle.mark_ready(pipeline).await;
                info!(attempt, "Service initialized");
                return;
            }
            Err(reason) => {
                error!(attempt, "Service initialization failed: {reason}");
                handle.mark_failed(reason).await;
            }
        }

        let Some(delay) = config.init_retry else {
            warn!("Initialization retry disabled; service stays unavailable");
            return;
        };
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

pub fn spawn_initialization(
    handle: ServiceHandle,
    config: Config,
    secrets: Arc<dyn SecretProvider>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_initialization(handle, config, secrets))
}
