//! A single JSON/line-oriented API extractor parameterized by
//! `SourceConfig` (spec §4.2's "API extractors").

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::fetcher::{FetchOptions, Fetcher};
use crate::sources::config::{ApiFormat, SourceConfig, SourceKind};
use crate::sources::{extract_country_code, normalize_anonymity, normalize_protocol, parse_ip_port};
use crate::sources::{Extractor, ExtractResult, ProxyData};

/// Loose JSON shape accepted from an API source: only `ip`/`port` are
/// required, everything else normalizes the same way the HTML path does.
#[derive(Debug, Deserialize)]
struct ApiProxyRecord {
    ip: String,
    port: u16,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    anonymity: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

pub struct ApiExtractor {
    config: SourceConfig,
}

impl ApiExtractor {
    pub fn new(config: SourceConfig) -> Self {
        assert!(
            matches!(config.kind, SourceKind::Api { .. }),
            "ApiExtractor requires a SourceConfig::Api kind"
        );
        ApiExtractor { config }
    }

    fn format(&self) -> ApiFormat {
        match self.config.kind {
            SourceKind::Api { format } => format,
            SourceKind::Html { .. } => unreachable!("constructor asserts Api kind"),
        }
    }

    fn parse_body(&self, body: &str, source_url: &str) -> Vec<ProxyData> {
        let now = Utc::now();
        match self.format() {
            ApiFormat::Json => {
                let records: Vec<ApiProxyRecord> = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|value| {
                        let array = value.as_array().cloned().unwrap_or_else(|| {
                            value.get("data").and_then(|d| d.as_array()).cloned().unwrap_or_default()
                        });
                        serde_json::from_value(serde_json::Value::Array(array)).ok()
                    })
                    .unwrap_or_default();

                records
                    .into_iter()
                    .filter_map(|record| {
                        let (ip, port) = parse_ip_port(&record.ip, &record.port.to_string())?;
                        Some(ProxyData {
                            ip,
                            port,
                            protocol: record.protocol.as_deref().and_then(normalize_protocol),
                            anonymity: record.anonymity.as_deref().map(normalize_anonymity),
                            country: record
                                .country
                                .as_deref()
                                .and_then(extract_country_code)
                                .or(record.country),
                            city: record.city,
                            source: self.config.name.to_string(),
                            source_url: source_url.to_string(),
                            last_checked: now,
                        })
                    })
                    .collect()
            }
            ApiFormat::Lines => body
                .lines()
                .filter_map(|line| {
                    let mut parts = line.trim().splitn(2, ':');
                    let ip = parts.next()?;
                    let port = parts.next()?;
                    let (ip, port) = parse_ip_port(ip, port)?;
                    Some(ProxyData {
                        ip,
                        port,
                        protocol: None,
                        anonymity: None,
                        country: None,
                        city: None,
                        source: self.config.name.to_string(),
                        source_url: source_url.to_string(),
                        last_checked: now,
                    })
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Extractor for ApiExtractor {
    fn name(&self) -> &str {
        self.config.name
    }

    async fn extract(&self, fetcher: &Fetcher) -> ExtractResult {
        let url = self.config.page_url(1);
        let opts = FetchOptions::default();
        match fetcher.fetch(self.config.name, &url, &opts).await {
            Ok(outcome) => {
                let body = String::from_utf8_lossy(&outcome.bytes);
                let rows = self.parse_body(&body, &url);
                ExtractResult::from_rows(self.config.name, rows, true, None)
            }
            Err(e) => ExtractResult::from_rows(self.config.name, Vec::new(), false, Some(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn json_config() -> SourceConfig {
        SourceConfig {
            name: "proxydb",
            kind: SourceKind::Api { format: ApiFormat::Json },
            url_template: "https://example.invalid/api".to_string(),
            max_pages: 1,
            rate_limit_delay: Duration::from_secs(1),
            priority: 5,
            enabled: true,
            crawl_interval: Duration::from_secs(3600),
        }
    }

    #[test]
    fn parses_json_array_of_records() {
        let extractor = ApiExtractor::new(json_config());
        let body = r#"[{"ip":"1.2.3.4","port":8080,"protocol":"http","country":"US"}]"#;
        let rows = extractor.parse_body(body, "https://example.invalid/api");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ip, "1.2.3.4");
        assert_eq!(rows[0].port, 8080);
    }

    #[test]
    fn parses_line_oriented_ip_port_pairs() {
        let mut config = json_config();
        config.kind = SourceKind::Api { format: ApiFormat::Lines };
        let extractor = ApiExtractor::new(config);
        let rows = extractor.parse_body("1.2.3.4:80\n5.6.7.8:3128\nbad-line\n", "src");
        assert_eq!(rows.len(), 2);
    }
}
