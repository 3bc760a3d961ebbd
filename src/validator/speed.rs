//! Speed subtest (spec §4.4.2): response-time sampling across several
//! lightweight URLs, plus a bounded bandwidth measurement against one
//! large-body endpoint.

use std::time::Duration;

use serde_json::json;

use crate::proxy::Proxy;
use crate::validator::netclient::get_through_proxy;
use crate::validator::SubtestOutcome;

/// Grading thresholds, spec §4.4.2 ("tunable").
const RTT_EXCELLENT_MS: u64 = 1000;
const RTT_GOOD_MS: u64 = 2000;
const RTT_FAIR_MS: u64 = 5000;

const BW_EXCELLENT_BPS: f64 = 1024.0 * 1024.0;
const BW_GOOD_BPS: f64 = 512.0 * 1024.0;
const BW_FAIR_BPS: f64 = 256.0 * 1024.0;

/// Download cap for the bandwidth probe (spec §4.4.2: "cap measurement at
/// `download_test_size`" — 1 MiB default).
const DOWNLOAD_TEST_SIZE: usize = 1024 * 1024;

fn grade_rtt(mean_ms: u64) -> f64 {
    if mean_ms < RTT_EXCELLENT_MS {
        100.0
    } else if mean_ms < RTT_GOOD_MS {
        80.0
    } else if mean_ms < RTT_FAIR_MS {
        60.0
    } else {
        30.0
    }
}

fn grade_bandwidth(bytes_per_sec: f64) -> f64 {
    if bytes_per_sec > BW_EXCELLENT_BPS {
        100.0
    } else if bytes_per_sec > BW_GOOD_BPS {
        80.0
    } else if bytes_per_sec > BW_FAIR_BPS {
        60.0
    } else {
        30.0
    }
}

/// One speed subtest's result, split into the two dimensions the composite
/// formula (spec §4.4.6) weights independently: `response_time` (RTT) and
/// `speed` (bandwidth). `outcome.subscore` is `response_time`'s subscore,
/// for backward-compatible display purposes; callers that feed the scorer
/// must use `response_time_subscore`/`speed_subscore` separately.
pub struct SpeedResult {
    pub outcome: SubtestOutcome,
    pub response_time_subscore: f64,
    pub speed_subscore: f64,
    pub avg_rtt_ms: Option<u64>,
    pub download_bytes_per_sec: Option<f64>,
}

/// Runs the speed subtest: `>= 3` RTT probes (min/mean/max) plus one bounded
/// download, per spec §4.4.2. Grades RTT and bandwidth separately since the
/// composite formula (spec §4.4.6) weights `response_time` and `speed` as
/// distinct dimensions.
pub async fn run(proxy: &Proxy, probe_urls: &[&str], bandwidth_url: &str, timeout: Duration) -> SpeedResult {
    let mut rtts = Vec::with_capacity(probe_urls.len());
    for url in probe_urls {
        if let Ok(response) = get_through_proxy(proxy, url, timeout).await {
            if (200..400).contains(&response.status) {
                rtts.push(response.elapsed.as_millis() as u64);
            }
        }
    }

    if rtts.is_empty() {
        return SpeedResult {
            outcome: SubtestOutcome::failed("all response-time probes failed"),
            response_time_subscore: 0.0,
            speed_subscore: 0.0,
            avg_rtt_ms: None,
            download_bytes_per_sec: None,
        };
    }

    let min_rtt = *rtts.iter().min().unwrap();
    let max_rtt = *rtts.iter().max().unwrap();
    let mean_rtt = rtts.iter().sum::<u64>() / rtts.len() as u64;
    let rtt_grade = grade_rtt(mean_rtt);

    let bandwidth = match get_through_proxy(proxy, bandwidth_url, timeout).await {
        Ok(response) if response.elapsed.as_secs_f64() > 0.0 => {
            let bytes = response.body.len().min(DOWNLOAD_TEST_SIZE);
            Some(bytes as f64 / response.elapsed.as_secs_f64())
        }
        _ => None,
    };
    // No bandwidth signal (probe failed) falls back to the RTT grade rather
    // than zeroing the dimension out, per spec §4.4.7: "composite is
    // computed from whatever subtests completed".
    let bandwidth_grade = bandwidth.map(grade_bandwidth).unwrap_or(rtt_grade);

    let outcome = SubtestOutcome {
        ok: true,
        subscore: rtt_grade,
        details: json!({
            "min_rtt_ms": min_rtt,
            "mean_rtt_ms": mean_rtt,
            "max_rtt_ms": max_rtt,
            "download_bytes_per_sec": bandwidth,
        }),
        error: None,
    };

    SpeedResult {
        outcome,
        response_time_subscore: rtt_grade,
        speed_subscore: bandwidth_grade,
        avg_rtt_ms: Some(mean_rtt),
        download_bytes_per_sec: bandwidth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtt_grading_matches_thresholds() {
        assert_eq!(grade_rtt(500), 100.0);
        assert_eq!(grade_rtt(1500), 80.0);
        assert_eq!(grade_rtt(3000), 60.0);
        assert_eq!(grade_rtt(9000), 30.0);
    }

    #[test]
    fn bandwidth_grading_matches_thresholds() {
        assert_eq!(grade_bandwidth(2.0 * 1024.0 * 1024.0), 100.0);
        assert_eq!(grade_bandwidth(600.0 * 1024.0), 80.0);
        assert_eq!(grade_bandwidth(300.0 * 1024.0), 60.0);
        assert_eq!(grade_bandwidth(10.0 * 1024.0), 30.0);
    }
}
