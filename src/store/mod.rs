//! Proxy store (component F, spec §4.5): the only owner of `Proxy` rows.
//!
//! `database manager boilerplate` is an explicit out-of-scope boundary
//! (spec §1), so this is a concurrent in-memory structure rather than a SQL
//! driver, grounded in the teacher's `server/multi_cache.rs` /
//! `server/connection_pool.rs` concurrent-structures style (`DashMap`
//! sharding instead of a single lock). [`snapshot`] adds crash-tolerant
//! persistence on top without pulling in a database dependency
//! (SPEC_FULL.md §4.5's Open Question resolution, recorded in DESIGN.md).

pub mod snapshot;

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::proxy::{Anonymity, Protocol, Proxy};
use crate::utils::error::{ProxyError, ProxyResult};
use crate::validator::{HistoryEntry, ValidationResult};

/// Bounded per-proxy history window (spec §4.4.5 / GLOSSARY: "last hour, up
/// to 100 entries").
const HISTORY_MAX_ENTRIES: usize = 100;
const HISTORY_MAX_AGE: ChronoDuration = ChronoDuration::hours(1);

/// Query filter for `Query` (spec §4.5, route params from spec §6.1).
#[derive(Debug, Clone, Default)]
pub struct ProxyFilter {
    pub protocol: Option<Protocol>,
    pub country: Option<String>,
    pub anonymity: Option<Anonymity>,
    pub is_active: Option<bool>,
    pub source: Option<String>,
    pub min_response_time_ms: Option<u64>,
    pub max_response_time_ms: Option<u64>,
}

impl ProxyFilter {
    fn matches(&self, proxy: &Proxy) -> bool {
        if let Some(protocol) = self.protocol {
            if proxy.protocol != protocol {
                return false;
            }
        }
        if let Some(country) = &self.country {
            if proxy.country.as_deref() != Some(country.as_str()) {
                return false;
            }
        }
        if let Some(anonymity) = self.anonymity {
            if proxy.anonymity != anonymity {
                return false;
            }
        }
        if let Some(is_active) = self.is_active {
            if proxy.is_active != is_active {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if proxy.source != *source {
                return false;
            }
        }
        if let Some(min) = self.min_response_time_ms {
            if proxy.response_time_ms.map_or(true, |rt| rt < min) {
                return false;
            }
        }
        if let Some(max) = self.max_response_time_ms {
            if proxy.response_time_ms.map_or(true, |rt| rt > max) {
                return false;
            }
        }
        true
    }
}

/// A page of query results (spec §6.1's `{proxies[], total, page, page_size,
/// total_pages}` response shape).
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Aggregated counts for `GET /proxies/stats` (spec §6.1).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProxyStats {
    pub total: usize,
    pub active: usize,
    pub by_protocol: std::collections::HashMap<String, usize>,
    pub by_anonymity: std::collections::HashMap<String, usize>,
    pub average_quality_score: f64,
}

/// Concurrent in-memory implementation of the store contract (spec §4.5).
/// Mutations are serialized per `(ip, port)` by `DashMap`'s per-shard
/// locking, which gives the required linearizability for a single key
/// without a global lock.
#[derive(Default)]
pub struct ProxyStore {
    proxies: DashMap<(Ipv4Addr, u16), Proxy>,
    by_id: DashMap<Uuid, (Ipv4Addr, u16)>,
    history: DashMap<(Ipv4Addr, u16), VecDeque<HistoryEntry>>,
}

impl ProxyStore {
    pub fn new() -> Self {
        ProxyStore::default()
    }

    /// Rebuilds a store from a flat list, as the snapshot loader does.
    pub fn from_proxies(proxies: Vec<Proxy>) -> Self {
        let store = ProxyStore::new();
        for proxy in proxies {
            store.by_id.insert(proxy.id, proxy.key());
            store.proxies.insert(proxy.key(), proxy);
        }
        store
    }

    /// `Upsert(proxy)` (spec §4.5): merge rule is "overwrite
    /// most-recently-observed fields, union metadata, never downgrade
    /// `last_success`, never reset `created_at`" — and it must be
    /// idempotent (spec §8): upserting twice yields the same id and
    /// `created_at`.
    pub fn upsert(&self, candidate: Proxy) -> Proxy {
        let key = candidate.key();
        let merged = match self.proxies.get(&key) {
            Some(existing) => {
                let mut merged = candidate;
                merged.id = existing.id;
                merged.created_at = existing.created_at;
                merged.last_success = match (existing.last_success, merged.last_success) {
                    (Some(old), Some(new)) => Some(old.max(new)),
                    (Some(old), None) => Some(old),
                    (None, new) => new,
                };
                for (k, v) in existing.metadata.iter() {
                    merged.metadata.entry(k.clone()).or_insert_with(|| v.clone());
                }
                merged.updated_at = Utc::now();
                merged
            }
            None => candidate,
        };
        self.by_id.insert(merged.id, key);
        self.proxies.insert(key, merged.clone());
        merged
    }

    pub fn get_by_id(&self, id: Uuid) -> Option<Proxy> {
        let key = *self.by_id.get(&id)?;
        self.proxies.get(&key).map(|p| p.clone())
    }

    pub fn get(&self, ip: Ipv4Addr, port: u16) -> Option<Proxy> {
        self.proxies.get(&(ip, port)).map(|p| p.clone())
    }

    pub fn query(&self, filter: &ProxyFilter, page: usize, page_size: usize) -> Page<Proxy> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let mut matched: Vec<Proxy> = self
            .proxies
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|p| filter.matches(p))
            .collect();
        matched.sort_by(|a, b| b.quality_score.partial_cmp(&a.quality_score).unwrap_or(std::cmp::Ordering::Equal));

        let total = matched.len();
        let total_pages = total.div_ceil(page_size).max(1);
        let start = (page - 1) * page_size;
        let items = if start >= total {
            Vec::new()
        } else {
            matched[start..(start + page_size).min(total)].to_vec()
        };

        Page { items, total, page, page_size, total_pages }
    }

    /// A uniformly-chosen active proxy matching `filter` (spec §6.1's
    /// `/proxies/random`, implicitly `is_active=true`).
    pub fn random(&self, mut filter: ProxyFilter) -> Option<Proxy> {
        filter.is_active = Some(true);
        let matched: Vec<Proxy> = self
            .proxies
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|p| filter.matches(p))
            .collect();
        if matched.is_empty() {
            return None;
        }
        use rand::Rng;
        let idx = rand::thread_rng().gen_range(0..matched.len());
        Some(matched[idx].clone())
    }

    /// `UpdateStatus(id, validation_result)` (spec §4.5): writes the latest
    /// validation outcome onto the proxy row and appends a bounded history
    /// entry used by the stability subtest.
    pub fn update_status(&self, id: Uuid, result: &ValidationResult) -> ProxyResult<Proxy> {
        let key = *self
            .by_id
            .get(&id)
            .ok_or_else(|| ProxyError::ProxyNotFound)?;
        let mut entry = self
            .proxies
            .get_mut(&key)
            .ok_or_else(|| ProxyError::ProxyNotFound)?;

        let now = Utc::now();
        entry.last_checked = Some(now);
        if result.success {
            entry.last_success = Some(now);
        }
        entry.response_time_ms = result.avg_rtt_ms;
        entry.anonymity = result.anonymity_level;
        entry.quality_score = result.composite_score;
        entry.is_active = result.composite_score >= 60.0;
        entry.updated_at = now;

        self.record_history(key, HistoryEntry {
            timestamp: now,
            success: result.success,
            rtt_ms: result.avg_rtt_ms,
            composite_score: result.composite_score,
        });

        let successes = self.history.get(&key).map(|h| h.iter().filter(|e| e.success).count()).unwrap_or(0);
        let total = self.history.get(&key).map(|h| h.len()).unwrap_or(0);
        if total > 0 {
            entry.success_rate = successes as f64 / total as f64;
        }

        Ok(entry.clone())
    }

    /// Applies the profile's threshold instead of the hardcoded default;
    /// callers that know the active `ScoringProfile` should prefer this.
    pub fn update_status_with_threshold(
        &self,
        id: Uuid,
        result: &ValidationResult,
        min_score_threshold: f64,
    ) -> ProxyResult<Proxy> {
        let mut proxy = self.update_status(id, result)?;
        proxy.is_active = result.composite_score >= min_score_threshold;
        let key = proxy.key();
        self.proxies.insert(key, proxy.clone());
        Ok(proxy)
    }

    fn record_history(&self, key: (Ipv4Addr, u16), entry: HistoryEntry) {
        let mut history = self.history.entry(key).or_default();
        let cutoff = Utc::now() - HISTORY_MAX_AGE;
        history.retain(|e| e.timestamp >= cutoff);
        history.push_back(entry);
        while history.len() > HISTORY_MAX_ENTRIES {
            history.pop_front();
        }
    }

    /// The pruned rolling history the stability subtest reads (spec
    /// §4.4.5 / §9: "window queries over the results table").
    pub fn history_for(&self, ip: Ipv4Addr, port: u16) -> Vec<HistoryEntry> {
        let cutoff = Utc::now() - HISTORY_MAX_AGE;
        self.history
            .get(&(ip, port))
            .map(|h| h.iter().filter(|e| e.timestamp >= cutoff).cloned().collect())
            .unwrap_or_default()
    }

    pub fn delete(&self, id: Uuid) -> ProxyResult<Proxy> {
        let key = self
            .by_id
            .remove(&id)
            .map(|(_, key)| key)
            .ok_or_else(|| ProxyError::ProxyNotFound)?;
        self.history.remove(&key);
        self.proxies
            .remove(&key)
            .map(|(_, proxy)| proxy)
            .ok_or_else(|| ProxyError::ProxyNotFound)
    }

    /// `Cleanup(inactive_days)` (spec §4.5, invariant in §8): removes every
    /// proxy that is inactive AND whose `last_success` predates the
    /// retention window (or has none at all).
    pub fn cleanup(&self, inactive_days: i64) -> usize {
        let cutoff = Utc::now() - ChronoDuration::days(inactive_days);
        let stale: Vec<(Ipv4Addr, u16)> = self
            .proxies
            .iter()
            .filter(|entry| {
                let p = entry.value();
                !p.is_active && p.last_success.map_or(true, |ts| ts < cutoff)
            })
            .map(|entry| *entry.key())
            .collect();

        for key in &stale {
            if let Some((_, proxy)) = self.proxies.remove(key) {
                self.by_id.remove(&proxy.id);
            }
            self.history.remove(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn snapshot_all(&self) -> Vec<Proxy> {
        self.proxies.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn stats(&self) -> ProxyStats {
        let mut stats = ProxyStats::default();
        let mut score_sum = 0.0;
        for entry in self.proxies.iter() {
            let proxy = entry.value();
            stats.total += 1;
            if proxy.is_active {
                stats.active += 1;
            }
            *stats.by_protocol.entry(proxy.protocol.as_str().to_string()).or_insert(0) += 1;
            *stats.by_anonymity.entry(format!("{:?}", proxy.anonymity).to_lowercase()).or_insert(0) += 1;
            score_sum += proxy.quality_score;
        }
        if stats.total > 0 {
            stats.average_quality_score = score_sum / stats.total as f64;
        }
        stats
    }
}

/// Just the fields needed to test the bounded-history eviction rule,
/// kept private to the test module.
#[cfg(test)]
mod tests {
    use super::*;

    fn http_proxy(ip: [u8; 4], port: u16) -> Proxy {
        Proxy::new(Ipv4Addr::from(ip), port, Protocol::Http, "test")
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = ProxyStore::new();
        let first = store.upsert(http_proxy([1, 2, 3, 4], 8080));
        let second = store.upsert(http_proxy([1, 2, 3, 4], 8080));
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_unions_metadata_and_keeps_last_success() {
        let store = ProxyStore::new();
        let mut a = http_proxy([1, 1, 1, 1], 80);
        a.metadata.insert("from".into(), serde_json::json!("src-a"));
        a.last_success = Some(Utc::now());
        let first_success = a.last_success;
        store.upsert(a);

        let mut b = http_proxy([1, 1, 1, 1], 80);
        b.metadata.insert("seen_twice".into(), serde_json::json!(true));
        b.last_success = None;
        let merged = store.upsert(b);

        assert_eq!(merged.last_success, first_success);
        assert!(merged.metadata.contains_key("from"));
        assert!(merged.metadata.contains_key("seen_twice"));
    }

    #[test]
    fn cleanup_removes_only_stale_inactive_rows() {
        let store = ProxyStore::new();
        let mut stale = http_proxy([2, 2, 2, 2], 80);
        stale.is_active = false;
        stale.last_success = Some(Utc::now() - ChronoDuration::days(40));
        store.upsert(stale);

        let mut fresh = http_proxy([3, 3, 3, 3], 80);
        fresh.is_active = false;
        fresh.last_success = Some(Utc::now());
        store.upsert(fresh);

        let removed = store.cleanup(30);
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(Ipv4Addr::new(3, 3, 3, 3), 80).is_some());
    }

    #[test]
    fn query_paginates_and_sorts_by_quality_score() {
        let store = ProxyStore::new();
        for (i, score) in [10.0, 90.0, 50.0].into_iter().enumerate() {
            let mut p = http_proxy([4, 4, 4, i as u8], 80);
            p.quality_score = score;
            store.upsert(p);
        }
        let page = store.query(&ProxyFilter::default(), 1, 2);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].quality_score, 90.0);
    }
}
