//! Anonymity subtest (spec §4.4.4): classifies the proxy's anonymity tier
//! by comparing egress IPs and inspecting which headers a header-echo
//! endpoint saw when reached through the proxy.

use std::time::Duration;

use serde_json::json;

use crate::fetcher::Fetcher;
use crate::proxy::Anonymity;
use crate::proxy::Proxy;
use crate::validator::netclient::{extract_ip_field, get_through_proxy};
use crate::validator::{fetch_ip_without_proxy, SubtestOutcome};

/// Header names that reveal a real client IP or the presence of a proxy
/// in the path (spec §4.4.4's exact list).
const PROXY_INDICATIVE_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "forwarded",
    "via",
    "x-originating-ip",
    "x-remote-ip",
    "x-remote-addr",
    "cf-connecting-ip",
    "true-client-ip",
];

fn subscore_for(level: Anonymity) -> f64 {
    match level {
        Anonymity::Elite => 100.0,
        Anonymity::Anonymous => 80.0,
        Anonymity::Transparent => 40.0,
        Anonymity::Unknown => 50.0,
    }
}

/// Pulls the `headers` object an echo endpoint like httpbin reports back,
/// tolerating any body shape that isn't exactly that (never a panic path).
fn parse_echoed_headers(body: &[u8]) -> Vec<(String, String)> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return Vec::new();
    };
    let headers = value.get("headers").cloned().unwrap_or(value);
    let Some(map) = headers.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.to_lowercase(), s.to_string())))
        .collect()
}

pub async fn run(
    proxy: &Proxy,
    fetcher: &Fetcher,
    ip_echo_url: &str,
    header_echo_url: &str,
    timeout: Duration,
) -> (SubtestOutcome, Anonymity) {
    let real_ip = match fetch_ip_without_proxy(fetcher, ip_echo_url, timeout).await {
        Ok(ip) => ip,
        Err(e) => {
            return (
                SubtestOutcome::failed(format!("could not determine real egress ip: {}", e)),
                Anonymity::Unknown,
            )
        }
    };

    let proxy_ip = match get_through_proxy(proxy, ip_echo_url, timeout).await {
        Ok(response) => extract_ip_field(&response.body),
        Err(_) => None,
    };

    let header_response = get_through_proxy(proxy, header_echo_url, timeout).await;
    let Ok(header_response) = header_response else {
        return (
            SubtestOutcome::failed("header echo probe failed"),
            Anonymity::Unknown,
        );
    };
    let echoed = parse_echoed_headers(&header_response.body);

    let Some(proxy_ip) = proxy_ip else {
        return (
            SubtestOutcome::failed("could not determine proxy egress ip"),
            Anonymity::Unknown,
        );
    };

    let real_ip_leaked = proxy_ip == real_ip
        || echoed
            .iter()
            .any(|(_, v)| v.split(',').any(|part| part.trim() == real_ip));
    let has_proxy_header = echoed
        .iter()
        .any(|(name, _)| PROXY_INDICATIVE_HEADERS.contains(&name.as_str()));

    let level = if real_ip_leaked {
        Anonymity::Transparent
    } else if has_proxy_header {
        Anonymity::Anonymous
    } else {
        Anonymity::Elite
    };

    let outcome = SubtestOutcome {
        ok: true,
        subscore: subscore_for(level),
        details: json!({
            "real_ip": real_ip,
            "proxy_ip": proxy_ip,
            "real_ip_leaked": real_ip_leaked,
            "proxy_indicative_header_present": has_proxy_header,
            "headers_seen": echoed.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
        }),
        error: None,
    };

    (outcome, level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_echoed_headers_reads_nested_headers_object() {
        let body = br#"{"headers":{"Via":"1.1 squid","Host":"example.invalid"}}"#;
        let headers = parse_echoed_headers(body);
        assert!(headers.iter().any(|(k, v)| k == "via" && v == "1.1 squid"));
    }

    #[test]
    fn parse_echoed_headers_tolerates_garbage() {
        assert!(parse_echoed_headers(b"not json").is_empty());
    }

    #[test]
    fn subscore_mapping_matches_spec() {
        assert_eq!(subscore_for(Anonymity::Elite), 100.0);
        assert_eq!(subscore_for(Anonymity::Anonymous), 80.0);
        assert_eq!(subscore_for(Anonymity::Transparent), 40.0);
        assert_eq!(subscore_for(Anonymity::Unknown), 50.0);
    }
}
