//! Fixed-window rate limiting for ledger-facing endpoints.
//!
//! Each (endpoint, caller) pair gets a counter inside a fixed window. The
//! first request of a window starts it; once the counter reaches the
//! endpoint's quota, further requests are rejected with 429 until the
//! window ends. The middleware runs before any handler, so a rejected
//! request never touches the ledger or the store.
//!
//! This is deliberately separate from the ledger's internal storage retry:
//! that one retries transient contention, this one sheds load.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

/// Entries are swept once the map grows past this many callers.
const SWEEP_THRESHOLD: usize = 4096;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum RateDecision {
    /// The request is within quota.
    Allowed,

    /// The quota is exhausted for the current window.
    Limited {
        /// Seconds until the window resets.
        retry_after_seconds: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct WindowSlot {
    window_start: Instant,
    count: u32,
}

/// In-memory fixed-window limiter keyed by caller identifier.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, WindowSlot>>,
}

impl RateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against `key` and decide whether it may proceed.
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        let now = Instant::now();
        // A poisoned map only ever holds counters, so it is recovered
        // rather than propagated.
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, slot| now.duration_since(slot.window_start) < window);
        }

        let slot = windows.entry(key.to_string()).or_insert(WindowSlot {
            window_start: now,
            count: 0,
        });

        if now.duration_since(slot.window_start) >= window {
            slot.window_start = now;
            slot.count = 0;
        }

        if slot.count >= limit {
            let elapsed = now.duration_since(slot.window_start);
            let remaining = window.saturating_sub(elapsed);
            return RateDecision::Limited {
                retry_after_seconds: remaining.as_secs().max(1),
            };
        }

        slot.count += 1;
        RateDecision::Allowed
    }
}

/// Middleware that enforces per-endpoint quotas before handlers run.
///
/// Uses the identity headers directly: the limiter must decide before the
/// body is read, and the gateway guarantees `x-user-id` is present on user
/// requests.
pub async fn enforce(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let Some(limit) = quota_for(request.uri().path(), &state.config.rate_limits) else {
        return next.run(request).await;
    };

    let identifier = request
        .headers()
        .get("x-user-id")
        .or_else(|| request.headers().get("x-service-name"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous");
    let key = format!("{}:{identifier}", request.uri().path());
    let window = Duration::from_secs(state.config.rate_limits.window_seconds);

    match state.rate_limiter.check(&key, limit, window) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited {
            retry_after_seconds,
        } => {
            tracing::warn!(
                path = %request.uri().path(),
                identifier = %identifier,
                retry_after_seconds = %retry_after_seconds,
                "Rate limit exceeded"
            );
            ApiError::TooManyRequests {
                retry_after_seconds,
            }
            .into_response()
        }
    }
}

/// Quota for a path, or `None` for unthrottled routes.
fn quota_for(path: &str, limits: &crate::config::RateLimitConfig) -> Option<u32> {
    match path {
        "/v1/usage/estimate" => Some(limits.estimate_limit),
        "/v1/usage/charge" => Some(limits.charge_limit),
        "/v1/credits/consume" => Some(limits.consume_limit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);

        for _ in 0..5 {
            assert_eq!(limiter.check("charge:u1", 5, window), RateDecision::Allowed);
        }
        assert!(matches!(
            limiter.check("charge:u1", 5, window),
            RateDecision::Limited { .. }
        ));
    }

    #[test]
    fn identifiers_are_independent() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);

        assert_eq!(limiter.check("charge:u1", 1, window), RateDecision::Allowed);
        assert!(matches!(
            limiter.check("charge:u1", 1, window),
            RateDecision::Limited { .. }
        ));
        assert_eq!(limiter.check("charge:u2", 1, window), RateDecision::Allowed);
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let limiter = RateLimiter::new();
        let window = Duration::from_millis(50);

        assert_eq!(limiter.check("est:u1", 1, window), RateDecision::Allowed);
        assert!(matches!(
            limiter.check("est:u1", 1, window),
            RateDecision::Limited { .. }
        ));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(limiter.check("est:u1", 1, window), RateDecision::Allowed);
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(2);

        let _ = limiter.check("k", 1, window);
        match limiter.check("k", 1, window) {
            RateDecision::Limited {
                retry_after_seconds,
            } => assert!(retry_after_seconds >= 1),
            RateDecision::Allowed => panic!("second request should be limited"),
        }
    }

    #[test]
    fn only_ledger_paths_have_quotas() {
        let limits = crate::config::RateLimitConfig::default();
        assert_eq!(quota_for("/v1/usage/estimate", &limits), Some(120));
        assert_eq!(quota_for("/v1/usage/charge", &limits), Some(60));
        assert_eq!(quota_for("/v1/credits/consume", &limits), Some(100));
        assert_eq!(quota_for("/v1/credits/balance", &limits), None);
        assert_eq!(quota_for("/health", &limits), None);
    }
}
