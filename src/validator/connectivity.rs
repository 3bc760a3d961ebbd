//! Connectivity subtest (spec §4.4.1): GET a small echo endpoint through the
//! proxy under test; success requires HTTP 200 and a body that parses as
//! JSON carrying an `ip`/`origin` field.

use std::time::Duration;

use serde_json::json;

use crate::proxy::Proxy;
use crate::validator::netclient::{extract_ip_field, get_through_proxy};
use crate::validator::SubtestOutcome;

pub async fn run(proxy: &Proxy, ip_echo_url: &str, timeout: Duration) -> SubtestOutcome {
    match get_through_proxy(proxy, ip_echo_url, timeout).await {
        Ok(response) => {
            let rtt_ms = response.elapsed.as_millis() as u64;
            if response.status == 200 && extract_ip_field(&response.body).is_some() {
                SubtestOutcome {
                    ok: true,
                    subscore: 100.0,
                    details: json!({ "status": response.status, "response_time_ms": rtt_ms }),
                    error: None,
                }
            } else if response.status == 0 {
                SubtestOutcome::failed("connection refused or reset before a response was read")
            } else {
                SubtestOutcome {
                    ok: false,
                    subscore: 0.0,
                    details: json!({ "status": response.status }),
                    error: Some(format!("unexpected status {} or missing ip field", response.status)),
                }
            }
        }
        Err(e) => SubtestOutcome::failed(classify(&e)),
    }
}

/// Distinguishes timeout / connection-refused / tunnel-rejected so the
/// recorded `error` string is useful without leaking internal error types
/// (spec §4.4.1: "classify non-200, timeout, and connection-refused
/// distinctly").
fn classify(err: &crate::utils::error::ProxyError) -> String {
    use crate::utils::error::ProxyError;
    match err {
        ProxyError::Timeout(d) => format!("timeout after {:?}", d),
        ProxyError::Network(e) => format!("connection-refused: {}", e),
        ProxyError::Validation(msg) => format!("tunnel rejected: {}", msg),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_labels_timeout_distinctly() {
        let err = crate::utils::error::ProxyError::Timeout(Duration::from_secs(5));
        assert!(classify(&err).starts_with("timeout"));
    }
}
