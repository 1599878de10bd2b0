use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::generation::PipelineError;
use crate::history::StoreError;
use crate::llm_client::{GenerationError, GenerationErrorKind};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Service is still initializing")]
    Initializing,

    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Generation error in {step}: {source}")]
    Generation {
        step: &'static str,
        #[source]
        source: GenerationError,
    },

    #[error("Could not interpret the AI response: {0}")]
    Parse(String),

    #[error("Request timed out")]
    Timeout,

    #[error("History store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unavailable(_) => AppError::Internal(anyhow::Error::new(err)),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Generation { step, source } => AppError::Generation { step, source },
            PipelineError::Parse(e) => AppError::Parse(e.to_string()),
        }
    }
}

/// Status, code and client message for a provider failure.
/// A timeout wins over the kind.
fn generation_response(source: &GenerationError) -> (StatusCode, &'static str, String) {
    if source.timed_out {
        return (
            StatusCode::GATEWAY_TIMEOUT,
            "PROVIDER_TIMEOUT",
            "The generation service did not answer in time. Please try again".to_string(),
        );
    }

    match source.kind {
        GenerationErrorKind::NotFound => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "MODEL_NOT_FOUND",
            "The configured model was not found or is not available in this region".to_string(),
        ),
        GenerationErrorKind::RateLimited | GenerationErrorKind::Unavailable => (
            StatusCode::TOO_MANY_REQUESTS,
            "PROVIDER_OVERLOADED",
            "The generation service is overloaded. Please try again in a few minutes".to_string(),
        ),
        GenerationErrorKind::InvalidRequest => (
            StatusCode::BAD_REQUEST,
            "PROVIDER_INVALID_REQUEST",
            format!("Invalid request to the generation service: {}", source.message),
        ),
        GenerationErrorKind::AuthFailure => (
            StatusCode::FORBIDDEN,
            "PROVIDER_FORBIDDEN",
            "Insufficient permissions for the generation API. Check the API key configuration"
                .to_string(),
        ),
        GenerationErrorKind::EmptyResponse => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "EMPTY_RESPONSE",
            "The AI returned an empty response in an intermediate step. Please try again"
                .to_string(),
        ),
        GenerationErrorKind::Unknown => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "PROVIDER_ERROR",
            format!("Generation API error: {}", source.message),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = None;

        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests from this address. Please try again later".to_string(),
            ),
            AppError::Initializing => {
                tracing::warn!("Request blocked: service initializing");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_INITIALIZING",
                    "The service is initializing. Please try again in a few seconds".to_string(),
                )
            }
            AppError::InitializationFailed(msg) => {
                tracing::error!("Request blocked: initialization failed: {msg}");
                details = Some(msg.clone());
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INITIALIZATION_FAILED",
                    "The service is unavailable because initialization failed".to_string(),
                )
            }
            AppError::Generation { step, source } => {
                tracing::error!("Generation error in {step}: {source}");
                generation_response(source)
            }
            AppError::Parse(msg) => {
                tracing::error!("AI response interpretation error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AI_RESPONSE_UNREADABLE",
                    "Could not interpret the AI response in an intermediate step. Please try again"
                        .to_string(),
                )
            }
            AppError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                "Article generation is taking too long. Please try again".to_string(),
            ),
            AppError::Store(e) => {
                tracing::error!("History store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut body = json!({
            "success": false,
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = json!(details);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::extract::ParseError;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    fn generation(kind_status: u16) -> AppError {
        AppError::Generation {
            step: "Stage 1 (keyword research)",
            source: GenerationError::classify(Some(kind_status), None, "boom"),
        }
    }

    #[test]
    fn test_provider_kinds_map_to_statuses() {
        assert_eq!(status_of(generation(404)), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_of(generation(429)), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_of(generation(503)), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_of(generation(400)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(generation(401)), StatusCode::FORBIDDEN);
        assert_eq!(status_of(generation(500)), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_provider_timeouts_map_to_gateway_timeout() {
        for source in [
            GenerationError::classify(None, None, "operation timed out"),
            GenerationError::classify(Some(500), Some("DEADLINE_EXCEEDED"), "slow"),
            GenerationError::timeout("request deadline"),
        ] {
            let err = AppError::Generation {
                step: "Stage 4 (render)",
                source,
            };
            assert_eq!(status_of(err), StatusCode::GATEWAY_TIMEOUT);
        }
    }

    #[test]
    fn test_local_failures_map_to_statuses() {
        assert_eq!(
            status_of(AppError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(AppError::Initializing), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(AppError::InitializationFailed("no key".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(AppError::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_of(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_of(AppError::from(AuthError::Missing)), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AppError::Forbidden("other user".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(AppError::from(AuthError::Unavailable("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AppError::from(PipelineError::Parse(ParseError::new(
                "Stage 2 (outline)",
                "bad",
                "raw"
            )))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AppError::Generation {
                step: "article summary",
                source: GenerationError::empty_response(),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
