use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;

const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum requests per minute
    pub requests_per_minute: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }
}

impl RateLimiterConfig {
    /// Read `RATE_LIMIT_PER_MINUTE`, keeping the default for missing or zero values.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("RATE_LIMIT_PER_MINUTE") {
            match raw.parse::<u32>() {
                Ok(value) if value > 0 => config.requests_per_minute = value,
                _ => tracing::warn!(
                    "Invalid RATE_LIMIT_PER_MINUTE '{}', using default: {}",
                    raw,
                    config.requests_per_minute
                ),
            }
        }
        config
    }
}

/// Global rate limiter
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a new rate limiter
pub fn create_rate_limiter(config: &RateLimiterConfig) -> GlobalRateLimiter {
    let per_minute = NonZeroU32::new(config.requests_per_minute)
        .or(NonZeroU32::new(DEFAULT_REQUESTS_PER_MINUTE))
        .unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)))
}

/// Middleware to apply rate limiting
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!("Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "kind": "rate_limited",
                    "error": "Rate limit exceeded. Please try again later.",
                })),
            )
                .into_response()
        }
    }
}
