//! Per-client rate limiting.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
};
use tokio::task::JoinHandle;

use identity_core::config::RateLimitConfig;

use crate::error::IdentityError;

/// Paths that share the stricter credential quota.
const AUTH_PATHS: &[&str] = &[
    "/signup/start",
    "/signup/confirm-email",
    "/login",
    "/token/refresh",
];

/// How often idle client entries are dropped.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Keyed limiter over client addresses.
pub struct ClientRateLimiter<C: Clock = DefaultClock> {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<C::Instant>>,
}

impl ClientRateLimiter {
    /// Create a new rate limiter.
    #[must_use]
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_clock(requests_per_minute, DefaultClock::default())
    }
}

impl<C: Clock> ClientRateLimiter<C> {
    /// Create a rate limiter driven by `clock`.
    #[must_use]
    pub fn with_clock(requests_per_minute: u32, clock: C) -> Self {
        let quota =
            Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::new(quota, DefaultKeyedStateStore::default(), clock),
        }
    }

    /// Check if a request is allowed.
    #[must_use]
    pub fn check(&self, client_id: &str) -> bool {
        self.limiter.check_key(&client_id.to_string()).is_ok()
    }

    /// Drop clients whose quota has fully replenished.
    pub fn purge_idle(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of clients currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}

/// The two quotas applied to the API.
pub struct RateLimits {
    auth: ClientRateLimiter,
    api: ClientRateLimiter,
}

impl RateLimits {
    /// Build limiters from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            auth: ClientRateLimiter::new(config.auth_rpm),
            api: ClientRateLimiter::new(config.api_rpm),
        }
    }

    /// Check a request to `path` from `client`.
    #[must_use]
    pub fn check(&self, path: &str, client: &str) -> bool {
        if is_auth_path(path) {
            self.auth.check(client)
        } else {
            self.api.check(client)
        }
    }

    /// Drop idle clients from both quotas.
    pub fn purge_idle(&self) {
        self.auth.purge_idle();
        self.api.purge_idle();
        tracing::trace!(
            auth = self.auth.tracked(),
            api = self.api.tracked(),
            "Rate limiter clients after purge"
        );
    }

    /// Purge idle clients every `every` until the task is aborted.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limits = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limits.purge_idle();
            }
        })
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits").finish_non_exhaustive()
    }
}

fn is_auth_path(path: &str) -> bool {
    AUTH_PATHS.iter().any(|suffix| path.ends_with(suffix))
}

/// Axum middleware rejecting clients over quota with 429.
///
/// Clients are keyed by peer IP; requests without connection info share one
/// bucket.
pub async fn rate_limit(
    State(limits): State<Arc<RateLimits>>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string());

    if !limits.check(request.uri().path(), &client) {
        tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        return IdentityError::RateLimited.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, middleware, routing::get};
    use governor::clock::FakeRelativeClock;
    use tower::ServiceExt;

    #[test]
    fn test_limiter_quota() {
        let limiter = ClientRateLimiter::new(2);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn test_purge_drops_replenished_clients() {
        let clock = FakeRelativeClock::default();
        let limiter = ClientRateLimiter::with_clock(2, clock.clone());
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
        assert_eq!(limiter.tracked(), 2);

        // Still inside the window: entries are kept.
        limiter.purge_idle();
        assert_eq!(limiter.tracked(), 2);

        clock.advance(Duration::from_secs(61));
        limiter.purge_idle();
        assert_eq!(limiter.tracked(), 0);
        assert!(limiter.check("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_runs() {
        let limits = Arc::new(RateLimits::default());
        assert!(limits.check("/api/v1/login", "10.0.0.1"));

        let task = limits.spawn_cleanup(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!task.is_finished());
        task.abort();
    }

    #[test]
    fn test_auth_paths_use_auth_quota() {
        let limits = RateLimits::from_config(&RateLimitConfig {
            auth_rpm: 1,
            api_rpm: 100,
        });
        assert!(limits.check("/api/v1/login", "c"));
        assert!(!limits.check("/api/v1/token/refresh", "c"));
        assert!(limits.check("/api/v1/orgs/my", "c"));
    }

    #[tokio::test]
    async fn test_middleware_returns_429() {
        let limits = Arc::new(RateLimits::from_config(&RateLimitConfig {
            auth_rpm: 1,
            api_rpm: 1,
        }));
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn_with_state(limits, rate_limit));

        let first = app
            .clone()
            .oneshot(axum::http::Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(axum::http::Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
