/// LLM Client — the single point of entry for all generative-text calls in Article Forge.
///
/// ARCHITECTURAL RULE: No other module may call the Gemini API directly.
/// All LLM interactions MUST go through a `ContentGenerator`.
///
/// Error classification looks at the HTTP status first, then at the provider's
/// status string, and only falls back to message matching when neither is present.
/// The message fallback is best-effort.
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod gemini;
pub mod prompts;
pub mod retry;

pub use gemini::{GeminiClient, GeminiSettings};
pub use retry::RetryPolicy;

/// Provider-side failure categories. Drives both retry decisions and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GenerationErrorKind {
    RateLimited,
    Unavailable,
    InvalidRequest,
    AuthFailure,
    NotFound,
    Unknown,
    EmptyResponse,
}

impl GenerationErrorKind {
    /// Only overload-type failures are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable)
    }

    fn from_status(status: u16) -> Option<Self> {
        match status {
            400 => Some(Self::InvalidRequest),
            401 | 403 => Some(Self::AuthFailure),
            404 => Some(Self::NotFound),
            429 => Some(Self::RateLimited),
            502..=504 => Some(Self::Unavailable),
            _ => None,
        }
    }

    fn from_provider_status(status: &str) -> Option<Self> {
        match status {
            "RESOURCE_EXHAUSTED" => Some(Self::RateLimited),
            "UNAVAILABLE" | "DEADLINE_EXCEEDED" => Some(Self::Unavailable),
            "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => {
                Some(Self::InvalidRequest)
            }
            "PERMISSION_DENIED" | "UNAUTHENTICATED" => Some(Self::AuthFailure),
            "NOT_FOUND" => Some(Self::NotFound),
            _ => None,
        }
    }

    fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("rate limit") || message.contains("quota exceeded") {
            Self::RateLimited
        } else if message.contains("timeout") || message.contains("timed out") {
            Self::Unavailable
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RateLimited => "rate limited",
            Self::Unavailable => "provider unavailable",
            Self::InvalidRequest => "invalid request",
            Self::AuthFailure => "authorization failure",
            Self::NotFound => "model not found",
            Self::Unknown => "provider error",
            Self::EmptyResponse => "empty response",
        };
        f.write_str(label)
    }
}

/// A classified failure from the generative-text provider.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    /// HTTP status returned by the provider, when there was one.
    pub status: Option<u16>,
    pub message: String,
    /// The call ran out of time. Does not change `kind` or the retry decision.
    pub timed_out: bool,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            timed_out: false,
        }
    }

    /// A call that exceeded its deadline. Retryable like any other overload.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::new(GenerationErrorKind::Unavailable, message)
        }
    }

    pub fn empty_response() -> Self {
        Self::new(
            GenerationErrorKind::EmptyResponse,
            "the provider returned no text",
        )
    }

    /// Classifies a failure using, in order: HTTP status, provider status string, message.
    pub fn classify(status: Option<u16>, provider_status: Option<&str>, message: &str) -> Self {
        let kind = status
            .and_then(GenerationErrorKind::from_status)
            .or_else(|| provider_status.and_then(GenerationErrorKind::from_provider_status))
            .unwrap_or_else(|| GenerationErrorKind::from_message(message));

        Self {
            kind,
            status,
            message: message.to_string(),
            timed_out: is_timeout(status, provider_status, message),
        }
    }
}

fn is_timeout(status: Option<u16>, provider_status: Option<&str>, message: &str) -> bool {
    let message = message.to_lowercase();
    status == Some(504)
        || provider_status == Some("DEADLINE_EXCEEDED")
        || message.contains("timeout")
        || message.contains("timed out")
        || message.contains("deadline exceeded")
}

/// The content-generation seam. Production code uses `GeminiClient`; tests use fakes.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Sends a prompt and returns the model's non-empty text answer.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    type Responder = dyn Fn(usize, &str) -> Result<String, GenerationError> + Send + Sync;

    /// A fake generator that answers each call through a closure and records every prompt.
    pub struct ScriptedGenerator {
        responder: Box<Responder>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn new(
            responder: impl Fn(usize, &str) -> Result<String, GenerationError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            let call = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len() - 1
            };
            let text = (self.responder)(call, prompt)?;
            if text.trim().is_empty() {
                return Err(GenerationError::empty_response());
            }
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_wins_over_message() {
        let err = GenerationError::classify(Some(404), None, "rate limit exceeded");
        assert_eq!(err.kind, GenerationErrorKind::NotFound);
        assert_eq!(err.status, Some(404));
    }

    #[test]
    fn test_transport_gateway_errors_are_retryable() {
        for status in [502, 503, 504] {
            let err = GenerationError::classify(Some(status), None, "bad gateway");
            assert_eq!(err.kind, GenerationErrorKind::Unavailable);
            assert!(err.kind.is_retryable());
        }
    }

    #[test]
    fn test_auth_statuses_map_to_auth_failure() {
        assert_eq!(
            GenerationError::classify(Some(401), None, "").kind,
            GenerationErrorKind::AuthFailure
        );
        assert_eq!(
            GenerationError::classify(Some(403), None, "").kind,
            GenerationErrorKind::AuthFailure
        );
    }

    #[test]
    fn test_provider_status_used_when_code_is_unmapped() {
        let err = GenerationError::classify(Some(500), Some("RESOURCE_EXHAUSTED"), "busy");
        assert_eq!(err.kind, GenerationErrorKind::RateLimited);
    }

    #[test]
    fn test_message_fallback_without_codes() {
        assert_eq!(
            GenerationError::classify(None, None, "Quota exceeded for project").kind,
            GenerationErrorKind::RateLimited
        );
        assert_eq!(
            GenerationError::classify(None, None, "request Timeout after 120s").kind,
            GenerationErrorKind::Unavailable
        );
        assert_eq!(
            GenerationError::classify(None, None, "something odd").kind,
            GenerationErrorKind::Unknown
        );
    }

    #[test]
    fn test_timeouts_are_flagged_on_every_path() {
        let by_message = GenerationError::classify(None, None, "operation timed out");
        assert!(by_message.timed_out);
        assert!(by_message.kind.is_retryable());

        let by_provider = GenerationError::classify(Some(500), Some("DEADLINE_EXCEEDED"), "slow");
        assert!(by_provider.timed_out);

        let by_status = GenerationError::classify(Some(504), None, "gateway");
        assert!(by_status.timed_out);

        assert!(!GenerationError::classify(Some(503), None, "overloaded").timed_out);
        assert!(!GenerationError::classify(Some(429), None, "quota").timed_out);
    }

    #[test]
    fn test_non_overload_kinds_are_not_retryable() {
        for kind in [
            GenerationErrorKind::InvalidRequest,
            GenerationErrorKind::AuthFailure,
            GenerationErrorKind::NotFound,
            GenerationErrorKind::Unknown,
            GenerationErrorKind::EmptyResponse,
        ] {
            assert!(!kind.is_retryable(), "{kind:?} must not be retried");
        }
    }
}
