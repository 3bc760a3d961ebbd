//! Source extractors (component B): per-source parsing of HTML tables or
//! JSON/line APIs into candidate proxy records, normalized to a single
//! `ProxyData` shape before the transformer ever sees them.

pub mod api;
pub mod config;
pub mod html;
pub mod registry;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;
use serde::Serialize;

use crate::fetcher::Fetcher;
use crate::proxy::{Anonymity, Protocol};

/// One normalized candidate row, pre-transformer (spec §4.2).
#[derive(Debug, Clone)]
pub struct ProxyData {
    pub ip: String,
    pub port: u16,
    pub protocol: Option<Protocol>,
    pub anonymity: Option<Anonymity>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub source: String,
    pub source_url: String,
    pub last_checked: DateTime<Utc>,
}

/// Per-run distribution histogram, stored in `ExtractResult.metadata` and
/// later copied onto the `CrawlLog` row (spec §4.2, SPEC_FULL.md §3).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractHistogram {
    pub by_protocol: HashMap<String, u32>,
    pub by_country: HashMap<String, u32>,
    pub by_anonymity: HashMap<String, u32>,
}

impl ExtractHistogram {
    fn record(&mut self, row: &ProxyData) {
        let protocol = row.protocol.map(|p| p.as_str().to_string()).unwrap_or_else(|| "unknown".to_string());
        *self.by_protocol.entry(protocol).or_insert(0) += 1;

        let country = row.country.clone().unwrap_or_else(|| "unknown".to_string());
        *self.by_country.entry(country).or_insert(0) += 1;

        let anonymity = match row.anonymity {
            Some(Anonymity::Elite) => "elite",
            Some(Anonymity::Anonymous) => "anonymous",
            Some(Anonymity::Transparent) => "transparent",
            _ => "unknown",
        };
        *self.by_anonymity.entry(anonymity.to_string()).or_insert(0) += 1;
    }
}

/// Result of one extractor invocation (spec §4.2).
#[derive(Debug, Clone)]
pub struct ExtractResult {
    pub source: String,
    pub proxies: Vec<ProxyData>,
    pub success: bool,
    pub error: Option<String>,
    pub metadata: ExtractHistogram,
}

impl ExtractResult {
    fn from_rows(source: &str, proxies: Vec<ProxyData>, any_page_succeeded: bool, error: Option<String>) -> Self {
        let mut metadata = ExtractHistogram::default();
        for row in &proxies {
            metadata.record(row);
        }
        ExtractResult {
            source: source.to_string(),
            proxies,
            success: any_page_succeeded,
            error,
            metadata,
        }
    }
}

/// Single contract every source implements (spec §4.2): `Extract() ->
/// ExtractResult`. Both bundled shapes (`html::TableExtractor`,
/// `api::ApiExtractor`) implement this against a `SourceConfig` value.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self, fetcher: &Fetcher) -> ExtractResult;
}

lazy_static::lazy_static! {
    static ref IP_RE: Regex =
        Regex::new(r"^(?:25[0-5]|2[0-4]\d|[01]?\d\d?)(?:\.(?:25[0-5]|2[0-4]\d|[01]?\d\d?)){3}$").unwrap();
    static ref COUNTRY_CODE_RE: Regex = Regex::new(r"\(([A-Za-z]{2})\)|\b([A-Z]{2})\b").unwrap();
}

/// Validates an IP/port pair per spec §4.2's exact grammar and range.
pub fn parse_ip_port(ip_text: &str, port_text: &str) -> Option<(String, u16)> {
    let ip = ip_text.trim();
    if !IP_RE.is_match(ip) {
        return None;
    }
    let port: u16 = port_text.trim().parse().ok()?;
    if port == 0 {
        return None;
    }
    Some((ip.to_string(), port))
}

/// Maps arbitrary anonymity strings to the canonical four-valued enum via
/// case-insensitive substring rules (spec §4.2).
pub fn normalize_anonymity(raw: &str) -> Anonymity {
    let lower = raw.to_lowercase();
    if lower.contains("elite") || raw.contains("高匿") || lower.contains("level 1") {
        Anonymity::Elite
    } else if lower.contains("anonymous") || lower.contains("anon") || raw.contains("匿名") {
        Anonymity::Anonymous
    } else if lower.contains("transparent") || raw.contains("透明") {
        Anonymity::Transparent
    } else {
        Anonymity::Unknown
    }
}

/// Best-effort protocol normalization, defaulting to HTTP when unknown
/// (the transformer re-applies this default too; extractors apply it
/// early so the histogram is accurate).
pub fn normalize_protocol(raw: &str) -> Option<Protocol> {
    raw.trim().to_lowercase().parse().ok()
}

/// Extracts a two-letter country code, preferring a parenthesized or
/// standalone uppercase substring (spec §4.2/§4.3).
pub fn extract_country_code(raw: &str) -> Option<String> {
    COUNTRY_CODE_RE.captures(raw).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_uppercase())
    })
}

/// Parses relative timestamps ("3 minutes ago", "剛剛") into absolute UTC
/// time by subtracting from now (spec §4.2).
pub fn parse_relative_time(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() || lower.contains("just now") || raw.contains("剛剛") || raw.contains("刚刚") {
        return now;
    }

    let re = Regex::new(r"(\d+)\s*(second|minute|hour|day|分鐘|分钟|小時|小时|秒|天)").unwrap();
    if let Some(caps) = re.captures(&lower).or_else(|| re.captures(raw)) {
        let amount: i64 = caps[1].parse().unwrap_or(0);
        let unit = &caps[2];
        let delta = match unit {
            u if u.starts_with("second") || *u == *"秒" => ChronoDuration::seconds(amount),
            u if u.starts_with("minute") || u.contains('分') => ChronoDuration::minutes(amount),
            u if u.starts_with("hour") || u.contains('時') || u.contains('时') => ChronoDuration::hours(amount),
            u if u.starts_with("day") || *u == *"天" => ChronoDuration::days(amount),
            _ => ChronoDuration::zero(),
        };
        return now - delta;
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ip_port_rejects_out_of_range_octets_and_ports() {
        assert!(parse_ip_port("999.1.1.1", "80").is_none());
        assert!(parse_ip_port("1.2.3.4", "70000").is_none());
        assert_eq!(parse_ip_port("1.2.3.4", "8080"), Some(("1.2.3.4".to_string(), 8080)));
    }

    #[test]
    fn normalize_anonymity_maps_common_variants() {
        assert_eq!(normalize_anonymity("Elite Proxy"), Anonymity::Elite);
        assert_eq!(normalize_anonymity("高匿代理"), Anonymity::Elite);
        assert_eq!(normalize_anonymity("Transparent"), Anonymity::Transparent);
        assert_eq!(normalize_anonymity("garbage"), Anonymity::Unknown);
    }

    #[test]
    fn extract_country_code_prefers_parenthesized_form() {
        assert_eq!(extract_country_code("United States (US)"), Some("US".to_string()));
        assert_eq!(extract_country_code("HK"), Some("HK".to_string()));
    }

    #[test]
    fn parse_relative_time_subtracts_from_now() {
        let now = Utc::now();
        let parsed = parse_relative_time("3 minutes ago", now);
        let delta = now - parsed;
        assert_eq!(delta.num_minutes(), 3);
    }
}
