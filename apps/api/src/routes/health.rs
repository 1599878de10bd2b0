use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::lifecycle::ServiceState;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub message: &'static str,
}

/// GET /health
/// Reports the initialization state. Always 200, available before initialization.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, initialized, error_detail, message) = match state.service.state().await {
        ServiceState::Ready(_) => ("healthy", true, None, "Service is operational"),
        ServiceState::Initializing => (
            "initializing",
            false,
            None,
            "Service is initializing",
        ),
        ServiceState::Failed(reason) => (
            "unhealthy",
            false,
            Some(reason),
            "Service initialization failed",
        ),
    };

    Json(HealthResponse {
        status,
        timestamp: Utc::now(),
        initialized,
        error_detail,
        message,
    })
}
