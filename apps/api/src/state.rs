use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::config::Config;
use crate::history::ArticleStore;
use crate::lifecycle::ServiceHandle;
use crate::routes::rate_limit::RateLimiter;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Initialization state; holds the pipeline once ready.
    pub service: ServiceHandle,
    /// Article history. Postgres when `DATABASE_URL` is set, in-memory otherwise.
    pub history: Arc<dyn ArticleStore>,
    /// Resolves bearer tokens to users; history is keyed by the verified user.
    pub identity: Arc<dyn IdentityVerifier>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Config,
}

#[cfg(test)]
impl AppState {
    /// State with in-memory history, two known tokens and default configuration.
    ///
    /// `token-user-42` belongs to `user-42`; `token-other` to `someone-else`.
    pub(crate) fn for_tests(service: ServiceHandle) -> Self {
        let config = crate::config::Config::from_source(|_| None).unwrap();
        Self {
            service,
            history: Arc::new(crate::history::InMemoryArticleStore::default()),
            identity: Arc::new(crate::auth::testing::StaticVerifier::new(&[
                ("token-user-42", "user-42"),
                ("token-other", "someone-else"),
            ])),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            config,
        }
    }

    pub(crate) fn with_rate_limit(mut self, settings: crate::config::RateLimitSettings) -> Self {
        self.config.rate_limit = settings;
        self.rate_limiter = Arc::new(RateLimiter::new(settings));
        self
    }
}
