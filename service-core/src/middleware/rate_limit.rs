//! Per-user, per-route request limiting.
//!
//! The limiter is a [`RateLimitStore`] behind an `Arc<dyn _>` so the in-process
//! backend and the Redis-coordinated backend are interchangeable without
//! touching the routes that use them.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use redis::aio::ConnectionManager;
use std::{
    num::NonZeroU32,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: None,
        }
    }

    pub fn deny(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request against `key` and report whether it is within quota.
    async fn hit(&self, key: &str) -> Result<RateLimitDecision, AppError>;
}

/// In-process limiter. State is lost on restart and not shared between
/// instances.
pub struct GovernorRateLimitStore {
    limiter: RateLimiter<String, DashMapStateStore<String>, DefaultClock>,
}

impl GovernorRateLimitStore {
    pub fn new(attempts: u32, window_seconds: u64) -> Self {
        let attempts = NonZeroU32::new(attempts.max(1)).unwrap_or(NonZeroU32::MIN);
        let period_ms = (window_seconds.max(1) * 1000) / u64::from(attempts.get());
        let quota = Quota::with_period(Duration::from_millis(period_ms.max(1)))
            .unwrap_or_else(|| Quota::per_minute(attempts))
            .allow_burst(attempts);

        Self {
            limiter: RateLimiter::dashmap(quota),
        }
    }
}

#[async_trait]
impl RateLimitStore for GovernorRateLimitStore {
    async fn hit(&self, key: &str) -> Result<RateLimitDecision, AppError> {
        match self.limiter.check_key(&key.to_string()) {
            Ok(_) => Ok(RateLimitDecision::allow()),
            Err(negative) => {
                let wait = negative.wait_time_from(DefaultClock::default().now());
                Ok(RateLimitDecision::deny(wait.as_secs().max(1)))
            }
        }
    }
}

/// Fixed-window counter in Redis, shared by every instance pointing at the
/// same server.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    manager: ConnectionManager,
    limit: u32,
    window_seconds: u64,
}

impl RedisRateLimitStore {
    pub async fn connect(url: &str, limit: u32, window_seconds: u64) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        tracing::info!(addr = %redis_endpoint(&client), "Connecting to Redis for rate limiting");
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            AppError::from(e)
        })?;

        Ok(Self {
            manager,
            limit: limit.max(1),
            window_seconds: window_seconds.max(1),
        })
    }
}

/// Host and port of the server, without credentials from the URL.
fn redis_endpoint(client: &redis::Client) -> String {
    client.get_connection_info().addr.to_string()
}

/// Key of the fixed window containing `now_secs`, plus seconds left in it.
pub fn fixed_window(key: &str, now_secs: u64, window_seconds: u64) -> (String, u64) {
    let window = window_seconds.max(1);
    let index = now_secs / window;
    let remaining = window - (now_secs % window);
    (format!("ratelimit:{}:{}", key, index), remaining)
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str) -> Result<RateLimitDecision, AppError> {
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let (window_key, remaining) = fixed_window(key, now_secs, self.window_seconds);

        let mut conn = self.manager.clone();
        let (count, _): (u64, i64) = redis::pipe()
            .atomic()
            .incr(&window_key, 1u64)
            .expire(&window_key, self.window_seconds as i64)
            .query_async(&mut conn)
            .await?;

        if count <= u64::from(self.limit) {
            Ok(RateLimitDecision::allow())
        } else {
            Ok(RateLimitDecision::deny(remaining))
        }
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub store: Arc<dyn RateLimitStore>,
}

/// Middleware keyed by `x-user-id` + matched route. Requests pass when the
/// store itself errors.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = format!("{}:{}", user, route);

    match state.store.hit(&key).await {
        Ok(decision) if decision.allowed => Ok(next.run(request).await),
        Ok(decision) => Err(AppError::TooManyRequests(
            "Too many requests. Please try again later.".to_string(),
            decision.retry_after_secs,
        )),
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "Rate limit store unavailable, allowing request");
            Ok(next.run(request).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_endpoint_drops_credentials() {
        let client = redis::Client::open("redis://:hunter2@cache.internal:6380/0").unwrap();
        let endpoint = redis_endpoint(&client);

        assert!(endpoint.contains("cache.internal"));
        assert!(endpoint.contains("6380"));
        assert!(!endpoint.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_governor_store_allows_within_limit() {
        let store = GovernorRateLimitStore::new(3, 60);

        assert!(store.hit("user-1:/api/invoices").await.unwrap().allowed);
        assert!(store.hit("user-1:/api/invoices").await.unwrap().allowed);
        assert!(store.hit("user-1:/api/invoices").await.unwrap().allowed);

        let denied = store.hit("user-1:/api/invoices").await.unwrap();
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs.is_some());
    }

    #[tokio::test]
    async fn test_governor_store_keys_are_independent() {
        let store = GovernorRateLimitStore::new(1, 60);

        assert!(store.hit("user-1:/api/invoices").await.unwrap().allowed);
        assert!(!store.hit("user-1:/api/invoices").await.unwrap().allowed);
        assert!(store.hit("user-2:/api/invoices").await.unwrap().allowed);
        assert!(store.hit("user-1:/api/clients").await.unwrap().allowed);
    }

    #[test]
    fn test_fixed_window_key_and_remaining() {
        let (key, remaining) = fixed_window("u:/r", 125, 60);
        assert_eq!(key, "ratelimit:u:/r:2");
        assert_eq!(remaining, 55);

        let (key, remaining) = fixed_window("u:/r", 120, 60);
        assert_eq!(key, "ratelimit:u:/r:2");
        assert_eq!(remaining, 60);
    }
}
