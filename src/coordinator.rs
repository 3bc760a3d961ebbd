//! Coordinator (component H, spec §4.7): the periodic driver that turns
//! configured sources into validated candidates in the store.
//!
//! One global timer ticks every `tick_interval`; each tick walks the
//! enabled sources in priority order and runs steps 1-6 of spec §4.7 for
//! each. A source's own rate limit is enforced by a per-source semaphore
//! (grounded in the teacher's per-host concurrency gating in
//! `utils/resource_manager.rs`) rather than a global one, so a slow source
//! never starves the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::scheduler::Scheduler;
use crate::sources::config::SourceConfig;
use crate::sources::{Extractor, ExtractHistogram};
use crate::store::ProxyStore;
use crate::transformer::{self, TransformFilters};
use crate::validator::TestLevel;
use crate::fetcher::Fetcher;

/// One row per (source, run) (spec §3.1). Kept in a bounded in-memory log
/// rather than a database table per the store's own "no database manager
/// boilerplate" resolution (spec §4.5 Open Question, DESIGN.md).
#[derive(Debug, Clone, Serialize)]
pub struct CrawlLog {
    pub id: Uuid,
    pub source: String,
    pub total_found: usize,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Coordinator tuning knobs (spec §6.3's scheduler-adjacent keys).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How often the global timer fires (spec §4.7 default: 1 hour). Each
    /// source additionally carries its own `crawl_interval`; a tick only
    /// actually runs a source once that interval has elapsed since its
    /// last run.
    pub tick_interval: Duration,
    pub default_test_level: TestLevel,
    pub default_priority: u8,
    pub crawl_log_retention: usize,
    pub fetch_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            tick_interval: Duration::from_secs(3600),
            default_test_level: TestLevel::Standard,
            default_priority: 5,
            crawl_log_retention: 500,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

struct SourceEntry {
    config: SourceConfig,
    extractor: Arc<dyn Extractor>,
    last_run: Mutex<Option<DateTime<Utc>>>,
    semaphore: Semaphore,
}

/// Drives the ETL pipeline end to end: extractor (B) -> transformer (C) ->
/// store (F) -> scheduler (G), appending a `CrawlLog` row per source run.
pub struct Coordinator {
    config: CoordinatorConfig,
    sources: HashMap<String, SourceEntry>,
    fetcher: Arc<Fetcher>,
    store: Arc<ProxyStore>,
    scheduler: Arc<Scheduler>,
    filters: TransformFilters,
    crawl_log: DashMap<Uuid, CrawlLog>,
}

/// Summary of one source's run within a tick, returned by `run_source` and
/// used by the `harvest` CLI subcommand to print a table (SPEC_FULL.md §2).
#[derive(Debug, Clone)]
pub struct SourceRunSummary {
    pub source: String,
    pub found: usize,
    pub success: bool,
    pub error: Option<String>,
}

impl Coordinator {
    pub fn new(
        configs: Vec<SourceConfig>,
        fetcher: Arc<Fetcher>,
        store: Arc<ProxyStore>,
        scheduler: Arc<Scheduler>,
        filters: TransformFilters,
        config: CoordinatorConfig,
    ) -> Self {
        let registry = crate::sources::registry::build_registry(configs.clone());
        let mut sources = HashMap::new();
        for source_config in configs {
            if !source_config.enabled {
                continue;
            }
            let Some(extractor) = registry.get(source_config.name).cloned() else {
                continue;
            };
            let permits = source_config.max_pages.max(1) as usize;
            sources.insert(
                source_config.name.to_string(),
                SourceEntry {
                    config: source_config,
                    extractor,
                    last_run: Mutex::new(None),
                    semaphore: Semaphore::new(permits),
                },
            );
        }
        Coordinator {
            config,
            sources,
            fetcher,
            store,
            scheduler,
            filters,
            crawl_log: DashMap::new(),
        }
    }

    /// Source names ordered by priority, highest first (spec §4.7 step 1).
    fn ordered_sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(|s| s.as_str()).collect();
        names.sort_by(|a, b| {
            let pa = self.sources[*a].config.priority;
            let pb = self.sources[*b].config.priority;
            pb.cmp(&pa).then_with(|| a.cmp(b))
        });
        names
    }

    /// Runs every source whose `crawl_interval` has elapsed since its last
    /// run. One source's failure never aborts the tick (spec §4.7: "Failure
    /// of one source never aborts the coordinator").
    pub async fn tick(&self) -> Vec<SourceRunSummary> {
        let mut summaries = Vec::new();
        for name in self.ordered_sources() {
            let entry = &self.sources[name];
            let due = {
                let last_run = entry.last_run.lock();
                match *last_run {
                    Some(ts) => Utc::now() - ts >= chrono::Duration::from_std(entry.config.crawl_interval).unwrap_or_default(),
                    None => true,
                }
            };
            if !due {
                continue;
            }
            summaries.push(self.run_source(name).await);
        }
        summaries
    }

    /// Runs a single named source through the full pipeline regardless of
    /// its due-time, used by the `harvest` CLI subcommand and by
    /// `/crawl/sources/{name}/test` (spec §6.1).
    pub async fn run_source(&self, name: &str) -> SourceRunSummary {
        let Some(entry) = self.sources.get(name) else {
            return SourceRunSummary {
                source: name.to_string(),
                found: 0,
                success: false,
                error: Some("unknown source".to_string()),
            };
        };

        let _permit = entry.semaphore.acquire().await.ok();
        tokio::time::sleep(entry.config.rate_limit_delay).await;

        let result = entry.extractor.extract(&self.fetcher).await;
        *entry.last_run.lock() = Some(Utc::now());

        let canonical = transformer::transform(&result, &self.filters);
        let found = canonical.len();

        let mut proxy_ids = Vec::with_capacity(canonical.len());
        for candidate in canonical {
            let stored = self.store.upsert(candidate);
            proxy_ids.push(stored.id);
        }

        if !proxy_ids.is_empty() {
            if let Err(e) = self.scheduler.submit(
                proxy_ids,
                self.config.default_test_level,
                self.config.default_priority,
                None,
                true,
            ) {
                log::warn!("coordinator failed to submit validation job for {}: {}", name, e);
            }
        }

        self.append_crawl_log(name, found, result.success, result.error.clone(), &result.metadata);

        if !result.success {
            log::warn!("source {} extraction reported failure: {:?}", name, result.error);
        }

        SourceRunSummary {
            source: name.to_string(),
            found,
            success: result.success,
            error: result.error,
        }
    }

    fn append_crawl_log(
        &self,
        source: &str,
        total_found: usize,
        success: bool,
        error: Option<String>,
        histogram: &ExtractHistogram,
    ) {
        let entry = CrawlLog {
            id: Uuid::new_v4(),
            source: source.to_string(),
            total_found,
            success,
            error,
            timestamp: Utc::now(),
            metadata: serde_json::to_value(histogram).unwrap_or(serde_json::Value::Null),
        };
        self.crawl_log.insert(entry.id, entry);
        if self.crawl_log.len() > self.config.crawl_log_retention {
            // Evict the oldest entries once the bounded log overflows.
            let mut entries: Vec<(Uuid, DateTime<Utc>)> = self
                .crawl_log
                .iter()
                .map(|e| (e.id, e.timestamp))
                .collect();
            entries.sort_by_key(|(_, ts)| *ts);
            let overflow = entries.len() - self.config.crawl_log_retention;
            for (id, _) in entries.into_iter().take(overflow) {
                self.crawl_log.remove(&id);
            }
        }
    }

    pub fn crawl_history(&self, limit: usize) -> Vec<CrawlLog> {
        let mut entries: Vec<CrawlLog> = self.crawl_log.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        entries
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// Spawns the background tick loop until `shutdown` is cancelled.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.tick_interval) => {
                        let summaries = self.tick().await;
                        for s in &summaries {
                            log::info!(
                                "coordinator tick: source={} found={} success={}",
                                s.source, s.found, s.success
                            );
                        }
                    }
                    _ = shutdown.cancelled() => return,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetcherConfig;
    use crate::scoring::ScoringProfile;
    use crate::validator::Validator;
    use crate::geo::GeoCache;
    use crate::scheduler::SchedulerConfig;

    fn test_coordinator() -> Coordinator {
        let fetcher = Arc::new(Fetcher::new(FetcherConfig::default()));
        let store = Arc::new(ProxyStore::new());
        let geo_cache = GeoCache::with_default_provider(Duration::from_secs(3600));
        let validator = Arc::new(Validator::new(geo_cache, Fetcher::new(FetcherConfig::default()), Duration::from_secs(10)));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            validator,
            ScoringProfile::standard_validation(),
            SchedulerConfig::default(),
        ));
        let configs = crate::sources::registry::seed_configs();
        Coordinator::new(
            configs,
            fetcher,
            store,
            scheduler,
            TransformFilters::default(),
            CoordinatorConfig::default(),
        )
    }

    #[test]
    fn ordered_sources_are_sorted_by_priority_descending() {
        let coordinator = test_coordinator();
        let names = coordinator.ordered_sources();
        assert_eq!(names.len(), 4);
        // All seed sources share priority 5; ties break alphabetically.
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn unknown_source_name_is_rejected_without_panicking() {
        let coordinator = test_coordinator();
        assert!(!coordinator.sources.contains_key("does-not-exist"));
    }

    #[test]
    fn crawl_history_returns_most_recent_first() {
        let coordinator = test_coordinator();
        coordinator.append_crawl_log("ip3366", 5, true, None, &ExtractHistogram::default());
        std::thread::sleep(Duration::from_millis(2));
        coordinator.append_crawl_log("freeproxylist", 3, false, Some("timeout".into()), &ExtractHistogram::default());
        let history = coordinator.crawl_history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].source, "freeproxylist");
    }

    #[test]
    fn crawl_log_retention_evicts_oldest_entries() {
        let mut coordinator = test_coordinator();
        coordinator.config.crawl_log_retention = 2;
        for i in 0..5 {
            coordinator.append_crawl_log(&format!("src{}", i), 1, true, None, &ExtractHistogram::default());
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(coordinator.crawl_log.len(), 2);
    }
}
