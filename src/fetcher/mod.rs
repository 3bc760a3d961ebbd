//! HTTP fetcher (component A): outbound GET with rotating headers,
//! anti-bot detection, and adaptive backoff, grounded in the teacher's
//! `judge_optimized.rs` client setup and `utils/resource_manager.rs`'s
//! global-registry style for per-source shared state.
//!
//! Scoped to direct fetches (extractor targets, the bare egress-ip echo):
//! requests *through* a candidate proxy under test have to negotiate
//! arbitrary HTTP/SOCKS4/SOCKS5 tunnels, which no hyper connector speaks, so
//! those go through [`crate::validator::netclient`]'s raw socket client
//! instead.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use rand::Rng;

use crate::utils::error::{ProxyError, ProxyResult};
use crate::utils::http::{apply_header_bundle, hyper_client, random_header_bundle};

/// Anti-bot classifications the fetcher can detect in a response body
/// (spec §4.1). Never raised as a panic — always returned as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotSignal {
    RateLimited,
    Captcha,
    CloudflareChallenge,
    Blocked,
    SoftRedirect,
}

impl BotSignal {
    fn detect(status: u16, body: &str) -> Option<BotSignal> {
        let lower = body.to_ascii_lowercase();
        if status == 429 || lower.contains("rate limit") || lower.contains("too many requests") {
            return Some(BotSignal::RateLimited);
        }
        if lower.contains("captcha") || lower.contains("recaptcha") || lower.contains("hcaptcha") {
            return Some(BotSignal::Captcha);
        }
        if lower.contains("checking your browser") || lower.contains("cf-browser-verification") {
            return Some(BotSignal::CloudflareChallenge);
        }
        if status == 403 || lower.contains("access denied") || lower.contains("you have been blocked") {
            return Some(BotSignal::Blocked);
        }
        if matches!(status, 301 | 302 | 303 | 307 | 308) {
            return Some(BotSignal::SoftRedirect);
        }
        None
    }
}

/// Fetch call options (spec §4.1's `opts`).
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub inject_referer: bool,
    pub inject_xff: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            timeout: Duration::from_secs(10),
            inject_referer: true,
            inject_xff: true,
        }
    }
}

/// Result of one successful fetch round trip.
pub struct FetchOutcome {
    pub bytes: Vec<u8>,
    pub status: u16,
    pub response_time: Duration,
}

/// Per-source rolling state: success ratio (for backoff escalation) and a
/// rate-limit penalty that decays by 1 on each subsequent call (spec §4.1).
struct SourceStats {
    attempts: AtomicU32,
    successes: AtomicU32,
    rate_limit_penalty: AtomicU32,
    consecutive_failures: AtomicU32,
}

impl SourceStats {
    fn new() -> Self {
        SourceStats {
            attempts: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            rate_limit_penalty: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    fn success_ratio(&self) -> f64 {
        let attempts = self.attempts.load(Ordering::Relaxed);
        if attempts == 0 {
            return 1.0;
        }
        self.successes.load(Ordering::Relaxed) as f64 / attempts as f64
    }

    fn record(&self, ok: bool, rate_limited: bool) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.successes.fetch_add(1, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }
        if rate_limited {
            self.rate_limit_penalty.fetch_add(8, Ordering::Relaxed);
        } else {
            let current = self.rate_limit_penalty.load(Ordering::Relaxed);
            if current > 0 {
                self.rate_limit_penalty.store(current - 1, Ordering::Relaxed);
            }
        }
    }
}

/// Fetcher configuration (the tunable bounds spec §4.1 calls out).
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        FetcherConfig {
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
            max_retries: 3,
        }
    }
}

/// Stateless aside from the per-source rolling counters (spec §4.1:
/// "the counter uses atomic updates").
pub struct Fetcher {
    config: FetcherConfig,
    sources: DashMap<String, SourceStats>,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Fetcher {
            config,
            sources: DashMap::new(),
        }
    }

    /// Computes the next delay for `source` per the adaptive-backoff rule:
    /// a uniform base, multiplied when the rolling ratio degrades, plus any
    /// outstanding rate-limit penalty.
    pub fn backoff_delay(&self, source: &str) -> Duration {
        let stats = self
            .sources
            .entry(source.to_string())
            .or_insert_with(SourceStats::new);
        let ratio = stats.success_ratio();
        let multiplier = if ratio < 0.3 {
            2.0
        } else if ratio < 0.6 {
            1.5
        } else if ratio < 0.8 {
            1.2
        } else {
            1.0
        };

        let base_ms = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.config.min_delay.as_millis() as u64..=self.config.max_delay.as_millis() as u64)
        };
        let penalty_secs = stats.rate_limit_penalty.load(Ordering::Relaxed) as f64;
        Duration::from_millis((base_ms as f64 * multiplier) as u64) + Duration::from_secs_f64(penalty_secs)
    }

    /// Performs one GET with retry and backoff, per spec §4.1. Each attempt
    /// already draws a fresh random header bundle (`fetch_once`) — the
    /// fetcher holds no cookie jar or other per-session state to clear, so
    /// there is nothing beyond that to "rotate" between retries (see
    /// DESIGN.md). Returns the last classification on terminal failure.
    pub async fn fetch(&self, source: &str, url: &str, opts: &FetchOptions) -> ProxyResult<FetchOutcome> {
        let mut last_err = None;
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_delay(source)).await;
            }
            match self.fetch_once(source, url, opts).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    log::debug!("fetch attempt {} for {} failed: {}", attempt + 1, source, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ProxyError::Http(format!("fetch exhausted retries for {}", url))))
    }

    async fn fetch_once(
        &self,
        source: &str,
        url: &str,
        opts: &FetchOptions,
    ) -> ProxyResult<FetchOutcome> {
        let started = std::time::Instant::now();
        let bundle = random_header_bundle();
        let mut builder = Request::builder().uri(url);
        builder = apply_header_bundle(builder, bundle);

        if opts.inject_referer && rand::thread_rng().gen_bool(0.3) {
            if let Ok(value) = hyper::header::HeaderValue::from_str("https://www.google.com/") {
                builder = builder.header("referer", value);
            }
        }
        if opts.inject_xff && rand::thread_rng().gen_bool(0.2) {
            let synthetic = format!(
                "{}.{}.{}.{}",
                rand::thread_rng().gen_range(1..254),
                rand::thread_rng().gen_range(0..254),
                rand::thread_rng().gen_range(0..254),
                rand::thread_rng().gen_range(1..254)
            );
            if let Ok(value) = hyper::header::HeaderValue::from_str(&synthetic) {
                builder = builder.header("x-forwarded-for", value);
            }
        }

        let request = builder
            .body(Empty::new())
            .map_err(|e| ProxyError::Http(format!("failed to build request: {}", e)))?;

        let client = hyper_client();
        let response = tokio::time::timeout(opts.timeout, client.request(request))
            .await
            .map_err(|_| ProxyError::Timeout(opts.timeout))?
            .map_err(|e| ProxyError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProxyError::Http(e.to_string()))?
            .to_bytes();
        let response_time = started.elapsed();

        let preview = String::from_utf8_lossy(&body[..body.len().min(4096)]);
        if let Some(signal) = BotSignal::detect(status, &preview) {
            self.record(source, false, signal == BotSignal::RateLimited);
            return Err(ProxyError::AntiBot(signal));
        }

        self.record(source, (200..300).contains(&status), false);
        Ok(FetchOutcome {
            bytes: body.to_vec(),
            status,
            response_time,
        })
    }

    fn record(&self, source: &str, ok: bool, rate_limited: bool) {
        self.sources
            .entry(source.to_string())
            .or_insert_with(SourceStats::new)
            .record(ok, rate_limited);
    }

    pub fn success_ratio(&self, source: &str) -> f64 {
        self.sources.get(source).map(|s| s.success_ratio()).unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_signal_detects_rate_limit_body() {
        assert_eq!(
            BotSignal::detect(200, "Error: rate limit exceeded, try again later"),
            Some(BotSignal::RateLimited)
        );
    }

    #[test]
    fn bot_signal_detects_captcha_and_cloudflare() {
        assert_eq!(BotSignal::detect(200, "please solve this captcha"), Some(BotSignal::Captcha));
        assert_eq!(
            BotSignal::detect(200, "Checking your browser before accessing"),
            Some(BotSignal::CloudflareChallenge)
        );
    }

    #[test]
    fn bot_signal_is_none_for_normal_body() {
        assert_eq!(BotSignal::detect(200, "{\"ip\":\"1.2.3.4\"}"), None);
    }

    #[test]
    fn backoff_delay_grows_as_success_ratio_drops() {
        let fetcher = Fetcher::new(FetcherConfig::default());
        for _ in 0..10 {
            fetcher.record("flaky", false, false);
        }
        let delay = fetcher.backoff_delay("flaky");
        assert!(delay >= fetcher.config.min_delay);
    }
}
