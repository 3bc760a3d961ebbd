//! Scoring engine (component E, spec §4.4.6): turns one validation round's
//! subscores into a single composite quality score, plus human-readable
//! recommendations for any dimension that scored poorly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dnsbl::DnsblCheckResults;
use crate::proxy::{Protocol, Proxy};
use crate::utils::error::{ProxyError, ProxyResult};
use crate::validator::TestLevel;

/// Independently-computed per-dimension subscores, each in `[0, 100]`
/// (spec §4.4.6).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Subscores {
    pub connection_success: f64,
    pub response_time: f64,
    pub anonymity_level: f64,
    pub stability: f64,
    pub geolocation: f64,
    pub speed: f64,
}

/// The six weights from spec §4.4.6, one row per bundled profile (SPEC_FULL
/// §6.3). Every profile must sum to 1.0 — enforced by [`ScoringWeights::validate`]
/// at load time (spec §7, error kind 5: "sum-of-weights ≠ 1 ... fatal at load").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub connection_success: f64,
    pub response_time: f64,
    pub anonymity_level: f64,
    pub stability: f64,
    pub geolocation: f64,
    pub speed: f64,
}

impl ScoringWeights {
    pub fn validate(&self) -> ProxyResult<()> {
        let sum = self.connection_success
            + self.response_time
            + self.anonymity_level
            + self.stability
            + self.geolocation
            + self.speed;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ProxyError::Config(format!(
                "scoring weights must sum to 1.0, got {:.6}",
                sum
            )));
        }
        Ok(())
    }

    fn weighted_sum(&self, s: &Subscores) -> f64 {
        self.connection_success * s.connection_success
            + self.response_time * s.response_time
            + self.anonymity_level * s.anonymity_level
            + self.stability * s.stability
            + self.geolocation * s.geolocation
            + self.speed * s.speed
    }
}

impl Default for ScoringWeights {
    /// The normative default from spec §4.4.6.
    fn default() -> Self {
        ScoringWeights {
            connection_success: 0.25,
            response_time: 0.20,
            anonymity_level: 0.20,
            stability: 0.15,
            geolocation: 0.10,
            speed: 0.10,
        }
    }
}

/// A bundled scoring profile (spec §6.3's last row): weights, the minimum
/// score for `is_active`, and the timeouts/test-level a profile implies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringProfile {
    pub name: String,
    pub weights: ScoringWeights,
    pub min_score_threshold: f64,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    pub suggested_level: TestLevel,
    /// Composite-score penalty applied when the DNSBL check (comprehensive
    /// level only) flags the proxy as malicious. Zero for every profile
    /// except `security_focused` (SPEC_FULL.md §4.4: DNSBL enrichment).
    pub dnsbl_penalty: f64,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl ScoringProfile {
    pub fn validate(&self) -> ProxyResult<()> {
        self.weights.validate()
    }

    pub fn standard_validation() -> Self {
        ScoringProfile {
            name: "standard_validation".to_string(),
            weights: ScoringWeights::default(),
            min_score_threshold: 60.0,
            request_timeout: Duration::from_secs(30),
            suggested_level: TestLevel::Standard,
            dnsbl_penalty: 0.0,
        }
    }

    pub fn fast_check() -> Self {
        ScoringProfile {
            name: "fast_check".to_string(),
            weights: ScoringWeights {
                connection_success: 0.45,
                response_time: 0.30,
                anonymity_level: 0.10,
                stability: 0.10,
                geolocation: 0.025,
                speed: 0.025,
            },
            min_score_threshold: 50.0,
            request_timeout: Duration::from_secs(10),
            suggested_level: TestLevel::Basic,
            dnsbl_penalty: 0.0,
        }
    }

    pub fn comprehensive_analysis() -> Self {
        ScoringProfile {
            name: "comprehensive_analysis".to_string(),
            weights: ScoringWeights {
                connection_success: 0.20,
                response_time: 0.15,
                anonymity_level: 0.20,
                stability: 0.20,
                geolocation: 0.15,
                speed: 0.10,
            },
            min_score_threshold: 65.0,
            request_timeout: Duration::from_secs(60),
            suggested_level: TestLevel::Comprehensive,
            dnsbl_penalty: 0.0,
        }
    }

    pub fn security_focused() -> Self {
        ScoringProfile {
            name: "security_focused".to_string(),
            weights: ScoringWeights {
                connection_success: 0.20,
                response_time: 0.10,
                anonymity_level: 0.35,
                stability: 0.15,
                geolocation: 0.15,
                speed: 0.05,
            },
            min_score_threshold: 70.0,
            request_timeout: Duration::from_secs(45),
            suggested_level: TestLevel::Comprehensive,
            dnsbl_penalty: 10.0,
        }
    }

    pub fn performance_optimized() -> Self {
        ScoringProfile {
            name: "performance_optimized".to_string(),
            weights: ScoringWeights {
                connection_success: 0.20,
                response_time: 0.30,
                anonymity_level: 0.10,
                stability: 0.10,
                geolocation: 0.05,
                speed: 0.25,
            },
            min_score_threshold: 60.0,
            request_timeout: Duration::from_secs(20),
            suggested_level: TestLevel::Standard,
            dnsbl_penalty: 0.0,
        }
    }
}

/// All bundled profiles, keyed by name (spec §6.3). Loaded once at startup;
/// each is validated (`sum(weights) == 1`) before the service accepts it.
pub fn bundled_profiles() -> Vec<ScoringProfile> {
    vec![
        ScoringProfile::fast_check(),
        ScoringProfile::standard_validation(),
        ScoringProfile::comprehensive_analysis(),
        ScoringProfile::security_focused(),
        ScoringProfile::performance_optimized(),
    ]
}

/// Computes the composite score (spec §4.4.6): weighted sum of subscores,
/// plus fixed adjustments, clamped to `[0, 100]`.
pub fn composite_score(
    subscores: &Subscores,
    proxy: &Proxy,
    profile: &ScoringProfile,
    dnsbl: Option<&DnsblCheckResults>,
) -> f64 {
    let mut score = profile.weights.weighted_sum(subscores);

    if proxy.anonymity == crate::proxy::Anonymity::Elite {
        score += 5.0;
    }
    if proxy.protocol == Protocol::Socks5 {
        score += 3.0;
    }
    if proxy.protocol == Protocol::Https {
        score += 2.0;
    }
    if Protocol::is_common_port(proxy.port) {
        score += 2.0;
    }
    if let Some(dnsbl) = dnsbl {
        if dnsbl.is_malicious {
            score -= profile.dnsbl_penalty;
        }
    }

    score.clamp(0.0, 100.0)
}

/// A recommendation is appended whenever a named subscore is below 50
/// (SPEC_FULL.md §3's message catalogue).
pub fn recommendations(subscores: &Subscores, dnsbl: &Option<DnsblCheckResults>) -> Vec<String> {
    let mut out = Vec::new();
    if subscores.connection_success < 50.0 {
        out.push("Connectivity is unreliable — deprioritize for latency-sensitive pools.".to_string());
    }
    if subscores.response_time < 50.0 {
        out.push("High latency — consider deprioritizing for latency-sensitive pools.".to_string());
    }
    if subscores.anonymity_level < 50.0 {
        out.push("Transparent proxy — real IP is exposed.".to_string());
    }
    if subscores.stability < 50.0 {
        out.push("Unstable across recent checks — success rate or RTT varies widely.".to_string());
    }
    if subscores.geolocation < 50.0 {
        out.push("Proxy egress location closely matches the real location — low disguise value.".to_string());
    }
    if subscores.speed < 50.0 {
        out.push("Slow throughput — unsuitable for bulk transfer workloads.".to_string());
    }
    if let Some(dnsbl) = dnsbl {
        if dnsbl.is_malicious {
            out.push(format!(
                "Listed on {} of {} DNSBLs checked — treat as compromised.",
                dnsbl.listed_count, dnsbl.total_checked
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn bundled_profiles_all_sum_to_one() {
        for profile in bundled_profiles() {
            profile.validate().unwrap_or_else(|e| panic!("{}: {}", profile.name, e));
        }
    }

    #[test]
    fn composite_score_is_clamped_and_applies_adjustments() {
        let proxy = Proxy::new(Ipv4Addr::new(1, 2, 3, 4), 8080, Protocol::Socks5, "test");
        let mut proxy = proxy;
        proxy.anonymity = crate::proxy::Anonymity::Elite;
        let subscores = Subscores {
            connection_success: 100.0,
            response_time: 100.0,
            anonymity_level: 100.0,
            stability: 100.0,
            geolocation: 100.0,
            speed: 100.0,
        };
        let profile = ScoringProfile::standard_validation();
        let score = composite_score(&subscores, &proxy, &profile, None);
        assert_eq!(score, 100.0); // 100 base + adjustments clamps at 100
    }

    #[test]
    fn security_focused_penalizes_dnsbl_hits() {
        let proxy = Proxy::new(Ipv4Addr::new(1, 2, 3, 4), 80, Protocol::Http, "test");
        let subscores = Subscores {
            connection_success: 70.0,
            response_time: 70.0,
            anonymity_level: 70.0,
            stability: 70.0,
            geolocation: 70.0,
            speed: 70.0,
        };
        let profile = ScoringProfile::security_focused();
        let mut dnsbl = DnsblCheckResults::new("1.2.3.4".to_string());
        dnsbl.is_malicious = true;
        let with_penalty = composite_score(&subscores, &proxy, &profile, Some(&dnsbl));
        let without_penalty = composite_score(&subscores, &proxy, &profile, None);
        assert_eq!(without_penalty - with_penalty, 10.0);
    }

    #[test]
    fn low_subscores_generate_recommendations() {
        let subscores = Subscores {
            connection_success: 100.0,
            response_time: 30.0,
            anonymity_level: 100.0,
            stability: 100.0,
            geolocation: 100.0,
            speed: 100.0,
        };
        let recs = recommendations(&subscores, &None);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("latency"));
    }
}
