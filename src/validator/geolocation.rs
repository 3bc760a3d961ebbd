//! Geolocation subtest (spec §4.4.3): compares the real egress IP's location
//! against the proxy's egress IP location, computing the same-country /
//! same-region / same-city flags, haversine distance, and a risk tier.

use std::time::Duration;

use serde_json::json;

use crate::fetcher::Fetcher;
use crate::geo::{compare, GeoCache, GeoRisk};
use crate::proxy::Proxy;
use crate::validator::netclient::{extract_ip_field, get_through_proxy};
use crate::validator::{fetch_ip_without_proxy, SubtestOutcome};

/// Maps the geolocation comparison's risk tier onto a subscore. A proxy
/// that lands far from the caller's real location is doing its job as a
/// disguise, so distance/country divergence scores *higher*, not lower —
/// this is the spec's Open Question resolution (§9) for geolocation
/// sub-scoring, recorded in DESIGN.md.
fn risk_subscore(risk: GeoRisk) -> f64 {
    match risk {
        GeoRisk::Low => 40.0,
        GeoRisk::Medium => 70.0,
        GeoRisk::High => 100.0,
    }
}

pub async fn run(
    proxy: &Proxy,
    fetcher: &Fetcher,
    geo_cache: &GeoCache,
    ip_echo_url: &str,
    timeout: Duration,
) -> SubtestOutcome {
    let real_ip = match fetch_ip_without_proxy(fetcher, ip_echo_url, timeout).await {
        Ok(ip) => ip,
        Err(e) => return SubtestOutcome::failed(format!("could not determine real egress ip: {}", e)),
    };

    let proxy_ip = match get_through_proxy(proxy, ip_echo_url, timeout).await {
        Ok(response) => match extract_ip_field(&response.body) {
            Some(ip) => ip,
            None => return SubtestOutcome::failed("proxy echo response had no ip field"),
        },
        Err(e) => return SubtestOutcome::failed(format!("could not determine proxy egress ip: {}", e)),
    };

    let (Ok(real_addr), Ok(proxy_addr)) = (real_ip.parse(), proxy_ip.parse()) else {
        return SubtestOutcome::failed("egress ip was not a parseable address");
    };

    let real_geo = match geo_cache.lookup(real_addr).await {
        Ok(geo) => geo,
        Err(e) => return SubtestOutcome::failed(format!("geo lookup failed for real ip: {}", e)),
    };
    let proxy_geo = match geo_cache.lookup(proxy_addr).await {
        Ok(geo) => geo,
        Err(e) => return SubtestOutcome::failed(format!("geo lookup failed for proxy ip: {}", e)),
    };

    let comparison = compare(&real_geo, &proxy_geo);
    let subscore = risk_subscore(comparison.risk);

    SubtestOutcome {
        ok: true,
        subscore,
        details: json!({
            "real_ip": real_ip,
            "proxy_ip": proxy_ip,
            "real_country": real_geo.country_code,
            "proxy_country": proxy_geo.country_code,
            "same_country": comparison.same_country,
            "same_region": comparison.same_region,
            "same_city": comparison.same_city,
            "distance_km": comparison.distance_km,
            "risk": format!("{:?}", comparison.risk).to_lowercase(),
        }),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_subscore_rewards_geographic_divergence() {
        assert!(risk_subscore(GeoRisk::High) > risk_subscore(GeoRisk::Medium));
        assert!(risk_subscore(GeoRisk::Medium) > risk_subscore(GeoRisk::Low));
    }
}
