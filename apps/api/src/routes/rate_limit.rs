//! Per-client fixed-window rate limiting for every route except `/health`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::config::RateLimitSettings;
use crate::errors::AppError;

/// Expired windows are dropped once this many clients are tracked.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Counts requests per client key. `max_requests = 0` disables limiting.
pub struct RateLimiter {
    settings: RateLimitSettings,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request. Returns false when the client is over its limit.
    pub async fn try_acquire(&self, client: &str) -> bool {
        if self.settings.max_requests == 0 {
            return true;
        }

        let now = Instant::now();
        let window_len = self.settings.window;
        let mut windows = self.windows.lock().await;

        if windows.len() >= PRUNE_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < window_len);
        }

        let window = windows.entry(client.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.duration_since(window.started) >= window_len {
            *window = Window {
                started: now,
                hits: 0,
            };
        }

        if window.hits >= self.settings.max_requests {
            return false;
        }
        window.hits += 1;
        true
    }

    /// Gives back a request that should not count (successful, when configured so).
    pub async fn release(&self, client: &str) {
        if let Some(window) = self.windows.lock().await.get_mut(client) {
            window.hits = window.hits.saturating_sub(1);
        }
    }
}

/// Client key: the address appended by the fronting proxy when it is trusted,
/// otherwise the socket peer.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').map(str::trim).find(|ip| !ip.is_empty()));
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware applied with `route_layer` to the limited routes.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_key(request.headers(), peer, limiter.settings.trust_proxy);

    if !limiter.try_acquire(&client).await {
        warn!(%client, path = %request.uri().path(), "Rate limit exceeded");
        return AppError::RateLimited.into_response();
    }

    let response = next.run(request).await;
    if limiter.settings.skip_successful && response.status().as_u16() < 400 {
        limiter.release(&client).await;
    }
    response
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::HeaderValue;

    use super::*;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitSettings {
            window: Duration::from_secs(60),
            max_requests,
            ..RateLimitSettings::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_applies_per_client_and_resets_with_window() {
        let limiter = limiter(2);
        assert!(limiter.try_acquire("1.1.1.1").await);
        assert!(limiter.try_acquire("1.1.1.1").await);
        assert!(!limiter.try_acquire("1.1.1.1").await);
        assert!(limiter.try_acquire("2.2.2.2").await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.try_acquire("1.1.1.1").await);
    }

    #[tokio::test]
    async fn test_released_requests_do_not_count() {
        let limiter = limiter(1);
        assert!(limiter.try_acquire("a").await);
        limiter.release("a").await;
        assert!(limiter.try_acquire("a").await);
        assert!(!limiter.try_acquire("a").await);
    }

    #[tokio::test]
    async fn test_zero_max_disables_limiting() {
        let limiter = limiter(0);
        for _ in 0..500 {
            assert!(limiter.try_acquire("a").await);
        }
    }

    #[test]
    fn test_client_key_prefers_last_forwarded_hop_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("6.6.6.6, 10.0.0.7"),
        );
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(client_key(&headers, Some(peer), true), "10.0.0.7");
        assert_eq!(client_key(&headers, Some(peer), false), "127.0.0.1");
        assert_eq!(client_key(&HeaderMap::new(), None, true), "unknown");
    }
}
