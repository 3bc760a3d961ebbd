//! Transformer (component C): `Transform(ExtractResult) -> CanonicalProxy[]`
//! (spec §4.3). Sanity-checks, normalizes, and deduplicates within the
//! batch before anything reaches the store.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::proxy::{Anonymity, Protocol, Proxy};
use crate::sources::{ExtractResult, ProxyData};

/// Optional allowlists applied after normalization (spec §4.3: "drop
/// records not matching the configured protocol/country/anonymity
/// allowlists").
#[derive(Debug, Clone, Default)]
pub struct TransformFilters {
    pub protocols: Option<Vec<Protocol>>,
    pub countries: Option<Vec<String>>,
    pub anonymity: Option<Vec<Anonymity>>,
}

impl TransformFilters {
    fn allows(&self, candidate: &Proxy) -> bool {
        if let Some(protocols) = &self.protocols {
            if !protocols.contains(&candidate.protocol) {
                return false;
            }
        }
        if let Some(countries) = &self.countries {
            match &candidate.country {
                Some(c) if countries.iter().any(|allowed| allowed == c) => {}
                _ => return false,
            }
        }
        if let Some(levels) = &self.anonymity {
            if !levels.contains(&candidate.anonymity) {
                return false;
            }
        }
        true
    }
}

/// Transforms one extractor run into canonical, deduplicated proxy
/// candidates.
pub fn transform(result: &ExtractResult, filters: &TransformFilters) -> Vec<Proxy> {
    let mut by_key: HashMap<(Ipv4Addr, u16), Proxy> = HashMap::new();

    for row in &result.proxies {
        let Some(candidate) = to_candidate(row) else {
            continue;
        };
        let key = candidate.key();
        match by_key.get(&key) {
            // Dedup within the batch, keeping the entry with the most
            // specific metadata (spec §4.3): prefer the row carrying more
            // resolved fields (country/city/anonymity known).
            Some(existing) if specificity(existing) >= specificity(&candidate) => {}
            _ => {
                by_key.insert(key, candidate);
            }
        }
    }

    by_key
        .into_values()
        .filter(|candidate| filters.allows(candidate))
        .collect()
}

fn to_candidate(row: &ProxyData) -> Option<Proxy> {
    let ip: Ipv4Addr = row.ip.parse().ok()?;
    if row.port == 0 {
        return None;
    }
    // protocol default (http) when unknown (spec §4.3).
    let protocol = row.protocol.unwrap_or(Protocol::Http);
    let mut candidate = Proxy::new(ip, row.port, protocol, row.source.clone());
    candidate.anonymity = row.anonymity.unwrap_or(Anonymity::Unknown);
    candidate.country = row.country.clone();
    candidate.city = row.city.clone();
    candidate.last_checked = Some(row.last_checked);
    candidate
        .metadata
        .insert("source_url".to_string(), serde_json::Value::String(row.source_url.clone()));
    Some(candidate)
}

fn specificity(candidate: &Proxy) -> u8 {
    let mut score = 0;
    if candidate.country.is_some() {
        score += 1;
    }
    if candidate.city.is_some() {
        score += 1;
    }
    if candidate.anonymity != Anonymity::Unknown {
        score += 1;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ExtractHistogram;
    use chrono::Utc;

    fn row(ip: &str, port: u16, country: Option<&str>) -> ProxyData {
        ProxyData {
            ip: ip.to_string(),
            port,
            protocol: Some(Protocol::Http),
            anonymity: None,
            country: country.map(|c| c.to_string()),
            city: None,
            source: "ip3366".to_string(),
            source_url: "https://example.invalid".to_string(),
            last_checked: Utc::now(),
        }
    }

    #[test]
    fn duplicate_ip_port_in_a_batch_is_deduplicated() {
        let result = ExtractResult {
            source: "ip3366".to_string(),
            proxies: vec![row("9.9.9.9", 80, None), row("9.9.9.9", 80, Some("US"))],
            success: true,
            error: None,
            metadata: ExtractHistogram::default(),
        };
        let canonical = transform(&result, &TransformFilters::default());
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical[0].country.as_deref(), Some("US"));
    }

    #[test]
    fn invalid_ip_rows_are_dropped() {
        let result = ExtractResult {
            source: "ip3366".to_string(),
            proxies: vec![row("not-an-ip", 80, None)],
            success: true,
            error: None,
            metadata: ExtractHistogram::default(),
        };
        assert!(transform(&result, &TransformFilters::default()).is_empty());
    }

    #[test]
    fn country_allowlist_filters_out_non_matching_rows() {
        let result = ExtractResult {
            source: "ip3366".to_string(),
            proxies: vec![row("1.2.3.4", 80, Some("US")), row("5.6.7.8", 80, Some("CN"))],
            success: true,
            error: None,
            metadata: ExtractHistogram::default(),
        };
        let filters = TransformFilters {
            countries: Some(vec!["US".to_string()]),
            ..Default::default()
        };
        let canonical = transform(&result, &filters);
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical[0].country.as_deref(), Some("US"));
    }
}
