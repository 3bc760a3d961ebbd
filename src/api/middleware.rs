//! Inbound rate limiting and request logging (spec §6.3's
//! `RATE_LIMIT_PER_MINUTE`); CORS is layered directly in `routes.rs`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;

/// Fixed-window per-client counter, reset once `window` elapses since the
/// client's first request in the current window.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        RateLimiter { buckets: Arc::new(Mutex::new(HashMap::new())), max_requests, window }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        RateLimiter::new(max_requests, Duration::from_secs(60))
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        match buckets.get_mut(key) {
            Some((count, last_reset)) => {
                if now.duration_since(*last_reset) > self.window {
                    *count = 1;
                    *last_reset = now;
                    true
                } else if *count < self.max_requests {
                    *count += 1;
                    true
                } else {
                    false
                }
            }
            None => {
                buckets.insert(key.to_string(), (1, now));
                true
            }
        }
    }
}

pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let client_key = request
        .headers()
        .get("x-real-ip")
        .or_else(|| request.headers().get("x-forwarded-for"))
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    if !rate_limiter.is_allowed(&client_key) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}

pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    log::info!("{} {} -> {} ({}ms)", method, uri, response.status(), start.elapsed().as_millis());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_blocks_once_bucket_is_exhausted() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.is_allowed("client-a"));
        assert!(limiter.is_allowed("client-a"));
        assert!(!limiter.is_allowed("client-a"));
    }

    #[test]
    fn rate_limiter_tracks_clients_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.is_allowed("client-a"));
        assert!(limiter.is_allowed("client-b"));
    }
}
