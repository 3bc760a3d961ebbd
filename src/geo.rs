//! Geolocation lookups for the validator's geolocation test (spec §4.4.3).
//!
//! Generalizes the teacher's single hard-wired MaxMind lookup
//! (`resolver_complex.rs`) into a pluggable `GeoProvider` trait with a
//! TTL-cached ordered provider list, matching the cache idiom in
//! `dnsbl/cache.rs`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_once::AsyncOnce;
use lazy_static::lazy_static;
use maxminddb::{geoip2::City, Reader};
use parking_lot::Mutex;

use crate::utils::error::{ProxyError, ProxyResult};
use crate::utils::geolite_database::open_geolite_db;

/// Normalized geo-IP lookup result (spec §4.4.3: "normalized to
/// `{ip, country, country_code, region, city, lat, lon, isp}`").
#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub ip: IpAddr,
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub isp: String,
}

impl Default for GeoLocation {
    fn default() -> Self {
        GeoLocation {
            ip: IpAddr::from([0, 0, 0, 0]),
            country: "unknown".to_string(),
            country_code: "--".to_string(),
            region: "unknown".to_string(),
            city: "unknown".to_string(),
            lat: 0.0,
            lon: 0.0,
            isp: "unknown".to_string(),
        }
    }
}

/// A pluggable geo-IP data source. The default (and only bundled) provider
/// reads the local GeoLite2-City database; the trait exists so an ordered
/// provider chain (spec §4.4.3: "pluggable ordered list of geo-IP
/// providers") can add a network-backed fallback without touching callers.
#[async_trait::async_trait]
pub trait GeoProvider: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> ProxyResult<GeoLocation>;
    fn name(&self) -> &'static str;
}

lazy_static! {
    static ref GEO_CITY: AsyncOnce<Option<Reader<Vec<u8>>>> = AsyncOnce::new(async {
        open_geolite_db().await.unwrap_or_else(|e| {
            log::warn!("geolite database unavailable: {}", e);
            None
        })
    });
}

pub struct MaxmindProvider;

#[async_trait::async_trait]
impl GeoProvider for MaxmindProvider {
    async fn lookup(&self, ip: IpAddr) -> ProxyResult<GeoLocation> {
        let reader = GEO_CITY.get().await;
        let reader = reader
            .as_ref()
            .ok_or_else(|| ProxyError::Config("GeoLite2-City database unavailable".into()))?;

        let record: City = reader
            .lookup(ip)
            .map_err(|e| ProxyError::Config(format!("geoip lookup failed: {}", e)))?;

        let mut geo = GeoLocation {
            ip,
            ..Default::default()
        };

        if let Some(country) = &record.country {
            if let Some(code) = &country.iso_code {
                geo.country_code = code.to_string();
            }
            if let Some(names) = &country.names {
                if let Some(name) = names.get("en") {
                    geo.country = name.to_string();
                }
            }
        }
        if let Some(subdivisions) = &record.subdivisions {
            if let Some(division) = subdivisions.first() {
                if let Some(names) = &division.names {
                    if let Some(name) = names.get("en") {
                        geo.region = name.to_string();
                    }
                }
            }
        }
        if let Some(city) = &record.city {
            if let Some(names) = &city.names {
                if let Some(name) = names.get("en") {
                    geo.city = name.to_string();
                }
            }
        }
        if let Some(location) = &record.location {
            geo.lat = location.latitude.unwrap_or(0.0);
            geo.lon = location.longitude.unwrap_or(0.0);
        }

        Ok(geo)
    }

    fn name(&self) -> &'static str {
        "maxmind-geolite2"
    }
}

struct CacheEntry {
    value: GeoLocation,
    inserted_at: Instant,
}

/// TTL cache around the provider chain, same read-mostly/lock-guarded-write
/// shape as `dnsbl::cache::DnsblCache`.
pub struct GeoCache {
    entries: Mutex<HashMap<IpAddr, CacheEntry>>,
    ttl: Duration,
    providers: Vec<Arc<dyn GeoProvider>>,
}

impl GeoCache {
    pub fn new(ttl: Duration, providers: Vec<Arc<dyn GeoProvider>>) -> Self {
        GeoCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
            providers,
        }
    }

    pub fn with_default_provider(ttl: Duration) -> Self {
        Self::new(ttl, vec![Arc::new(MaxmindProvider)])
    }

    pub async fn lookup(&self, ip: IpAddr) -> ProxyResult<GeoLocation> {
        if let Some(entry) = self.entries.lock().get(&ip) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }

        let mut last_err = None;
        for provider in &self.providers {
            match provider.lookup(ip).await {
                Ok(geo) => {
                    self.entries.lock().insert(
                        ip,
                        CacheEntry {
                            value: geo.clone(),
                            inserted_at: Instant::now(),
                        },
                    );
                    return Ok(geo);
                }
                Err(e) => {
                    log::debug!("geo provider {} failed for {}: {}", provider.name(), ip, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ProxyError::Config("no geo providers configured".into())))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Great-circle distance in kilometers between two coordinates.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Risk tiers per spec §4.4.3: "low if same country; medium if distance >
/// 500 km; high if different country AND distance > 1000 km."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct GeoComparison {
    pub same_country: bool,
    pub same_region: bool,
    pub same_city: bool,
    pub distance_km: f64,
    pub risk: GeoRisk,
}

pub fn compare(real: &GeoLocation, proxy: &GeoLocation) -> GeoComparison {
    let same_country = !real.country_code.is_empty() && real.country_code == proxy.country_code;
    let same_region = same_country && real.region == proxy.region;
    let same_city = same_region && real.city == proxy.city;
    let distance_km = haversine_km(real.lat, real.lon, proxy.lat, proxy.lon);

    let risk = if same_country {
        GeoRisk::Low
    } else if distance_km > 1000.0 {
        GeoRisk::High
    } else if distance_km > 500.0 {
        GeoRisk::Medium
    } else {
        GeoRisk::Low
    };

    GeoComparison {
        same_country,
        same_region,
        same_city,
        distance_km,
        risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_of_identical_points_is_zero() {
        assert!(haversine_km(40.0, -73.0, 40.0, -73.0) < 1e-6);
    }

    #[test]
    fn haversine_roughly_matches_known_distance() {
        // New York to London, ~5570 km great-circle.
        let d = haversine_km(40.7128, -74.0060, 51.5074, -0.1278);
        assert!((5400.0..5750.0).contains(&d), "unexpected distance: {}", d);
    }

    #[test]
    fn risk_is_low_when_same_country() {
        let real = GeoLocation {
            country_code: "US".into(),
            region: "NY".into(),
            city: "New York".into(),
            lat: 40.0,
            lon: -73.0,
            ..Default::default()
        };
        let proxy = GeoLocation {
            country_code: "US".into(),
            region: "CA".into(),
            city: "Los Angeles".into(),
            lat: 34.0,
            lon: -118.0,
            ..Default::default()
        };
        let cmp = compare(&real, &proxy);
        assert!(cmp.same_country);
        assert_eq!(cmp.risk, GeoRisk::Low);
    }

    #[test]
    fn risk_is_high_for_far_different_countries() {
        let real = GeoLocation {
            country_code: "US".into(),
            lat: 40.7128,
            lon: -74.0060,
            ..Default::default()
        };
        let proxy = GeoLocation {
            country_code: "JP".into(),
            lat: 35.6762,
            lon: 139.6503,
            ..Default::default()
        };
        let cmp = compare(&real, &proxy);
        assert!(!cmp.same_country);
        assert_eq!(cmp.risk, GeoRisk::High);
    }
}
