//! Validator subsystem (component D): `Validate(proxy, level) ->
//! ValidationResult` (spec §4.4). Subtests never panic; each returns a
//! structured outcome and the composite is computed from whatever
//! completed (spec §4.4.7).

pub mod anonymity;
pub mod connectivity;
pub mod geolocation;
pub mod netclient;
pub mod speed;
pub mod stability;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dnsbl::DnsblCheckResults;
use crate::fetcher::Fetcher;
use crate::geo::GeoCache;
use crate::proxy::{Anonymity, Proxy};
use crate::scoring::ScoringProfile;
use crate::utils::error::ProxyResult;

/// Which subtests run for a given request (spec §4.4's table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestLevel {
    Basic,
    Standard,
    Comprehensive,
}

impl TestLevel {
    pub fn runs_speed(self) -> bool {
        matches!(self, TestLevel::Standard | TestLevel::Comprehensive)
    }
    pub fn runs_geolocation(self) -> bool {
        matches!(self, TestLevel::Standard | TestLevel::Comprehensive)
    }
    pub fn runs_anonymity(self) -> bool {
        matches!(self, TestLevel::Comprehensive)
    }
    pub fn runs_full_stability(self) -> bool {
        matches!(self, TestLevel::Comprehensive)
    }
}

/// One subtest's structured outcome (spec §4.4.7): never an exception.
#[derive(Debug, Clone, Serialize)]
pub struct SubtestOutcome {
    pub ok: bool,
    pub subscore: f64,
    pub details: serde_json::Value,
    pub error: Option<String>,
}

impl SubtestOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        SubtestOutcome {
            ok: false,
            subscore: 0.0,
            details: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn skipped() -> Self {
        SubtestOutcome {
            ok: false,
            subscore: 0.0,
            details: serde_json::Value::Null,
            error: None,
        }
    }
}

/// A trimmed prior outcome kept per-proxy for the stability subtest (spec
/// §4.4.5: "last K results ... entries older than 1 hour pruned").
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub rtt_ms: Option<u64>,
    pub composite_score: f64,
}

/// One validation round's full result (spec §3.1).
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub success: bool,
    pub connectivity: SubtestOutcome,
    pub speed: SubtestOutcome,
    pub avg_rtt_ms: Option<u64>,
    pub download_bytes_per_sec: Option<f64>,
    pub geolocation: SubtestOutcome,
    pub anonymity: SubtestOutcome,
    pub anonymity_level: Anonymity,
    pub stability: SubtestOutcome,
    pub composite_score: f64,
    pub test_duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dnsbl: Option<DnsblCheckResults>,
}

/// Echo/judge endpoints the validator probes. Kept small and fixed per
/// SPEC_FULL.md (no judge-discovery subsystem, unlike the teacher's
/// `judge_optimized.rs`).
pub struct ValidatorEndpoints {
    pub ip_echo: &'static str,
    pub header_echo: &'static str,
    pub speed_probes: &'static [&'static str],
    pub bandwidth_probe: &'static str,
}

impl Default for ValidatorEndpoints {
    fn default() -> Self {
        ValidatorEndpoints {
            ip_echo: "http://httpbin.org/ip",
            header_echo: "http://httpbin.org/headers",
            speed_probes: &[
                "http://httpbin.org/get",
                "http://ifconfig.me/ip",
                "http://icanhazip.com",
            ],
            bandwidth_probe: "http://httpbin.org/bytes/1048576",
        }
    }
}

pub struct Validator {
    endpoints: ValidatorEndpoints,
    geo_cache: GeoCache,
    fetcher: Fetcher,
    request_timeout: Duration,
}

impl Validator {
    pub fn new(geo_cache: GeoCache, fetcher: Fetcher, request_timeout: Duration) -> Self {
        Validator {
            endpoints: ValidatorEndpoints::default(),
            geo_cache,
            fetcher,
            request_timeout,
        }
    }

    pub async fn validate(
        &self,
        proxy: &Proxy,
        level: TestLevel,
        history: &[HistoryEntry],
        profile: &ScoringProfile,
        dnsbl_checker: Option<&crate::dnsbl::DnsblChecker>,
    ) -> ValidationResult {
        let started = Instant::now();
        let now = Utc::now();

        let connectivity = connectivity::run(proxy, self.endpoints.ip_echo, self.request_timeout).await;
        let connectivity_ok = connectivity.ok;

        let speed_result = if connectivity_ok && level.runs_speed() {
            Some(speed::run(proxy, self.endpoints.speed_probes, self.endpoints.bandwidth_probe, self.request_timeout).await)
        } else {
            None
        };
        let speed = speed_result.as_ref().map(|r| r.outcome.clone()).unwrap_or_else(SubtestOutcome::skipped);
        let response_time_subscore = speed_result.as_ref().map(|r| r.response_time_subscore).unwrap_or(0.0);
        let speed_subscore = speed_result.as_ref().map(|r| r.speed_subscore).unwrap_or(0.0);
        let avg_rtt_ms = speed_result.as_ref().and_then(|r| r.avg_rtt_ms);
        let download_bytes_per_sec = speed_result.as_ref().and_then(|r| r.download_bytes_per_sec);

        let geolocation = if connectivity_ok && level.runs_geolocation() {
            geolocation::run(proxy, &self.fetcher, &self.geo_cache, self.endpoints.ip_echo, self.request_timeout).await
        } else {
            SubtestOutcome::skipped()
        };

        let (anonymity, anonymity_level) = if connectivity_ok && level.runs_anonymity() {
            anonymity::run(proxy, &self.fetcher, self.endpoints.ip_echo, self.endpoints.header_echo, self.request_timeout).await
        } else {
            (SubtestOutcome::skipped(), Anonymity::Unknown)
        };

        let stability = stability::run(history, level.runs_full_stability());

        let dnsbl = if level == TestLevel::Comprehensive {
            if let Some(checker) = dnsbl_checker {
                checker.check_ip(&proxy.ip.to_string()).await.ok()
            } else {
                None
            }
        } else {
            None
        };

        let subscores = crate::scoring::Subscores {
            connection_success: connectivity.subscore,
            response_time: response_time_subscore,
            anonymity_level: anonymity_level.subscore(),
            stability: stability.subscore,
            geolocation: geolocation.subscore,
            speed: speed_subscore,
        };
        let composite_score = crate::scoring::composite_score(&subscores, proxy, profile, dnsbl.as_ref());
        let recommendations = crate::scoring::recommendations(&subscores, &dnsbl);

        ValidationResult {
            success: connectivity_ok,
            connectivity,
            speed,
            avg_rtt_ms,
            download_bytes_per_sec,
            geolocation,
            anonymity,
            anonymity_level,
            stability,
            composite_score,
            test_duration_ms: started.elapsed().as_millis() as u64,
            timestamp: now,
            recommendations,
            dnsbl,
        }
    }
}

pub async fn fetch_ip_without_proxy(fetcher: &Fetcher, ip_echo_url: &str, timeout: Duration) -> ProxyResult<String> {
    let outcome = fetcher
        .fetch("geo-self", ip_echo_url, &crate::fetcher::FetchOptions {
            timeout,
            inject_referer: false,
            inject_xff: false,
        })
        .await?;
    netclient::extract_ip_field(&outcome.bytes)
        .ok_or_else(|| crate::utils::error::ProxyError::Parse("ip echo response had no ip field".into()))
}
