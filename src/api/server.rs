//! The API server (spec §6.1): axum app wiring, shared state, and the
//! listener loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;

use crate::config::SharedConfig;
use crate::coordinator::Coordinator;
use crate::scheduler::Scheduler;
use crate::store::ProxyStore;

/// Everything a handler needs, shared behind `Arc` across connections.
pub struct AppState {
    pub store: Arc<ProxyStore>,
    pub scheduler: Arc<Scheduler>,
    pub coordinator: Arc<Coordinator>,
    pub config: SharedConfig,
    pub started_at: Instant,
}

pub struct ApiServer {
    bind_addr: SocketAddr,
    app: Router,
}

impl ApiServer {
    pub fn new(bind_addr: SocketAddr, state: Arc<AppState>) -> Self {
        let app = crate::api::routes::build_router(state);
        ApiServer { bind_addr, app }
    }

    pub async fn start(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        log::info!("API listening on http://{}/api/v1", self.bind_addr);
        axum::serve(listener, self.app).await
    }
}

#[cfg(test)]
pub fn test_state() -> Arc<AppState> {
    use crate::config::DynamicConfig;
    use crate::fetcher::{Fetcher, FetcherConfig};
    use crate::geo::GeoCache;
    use crate::scheduler::SchedulerConfig;
    use crate::scoring::ScoringProfile;
    use crate::sources::registry::seed_configs;
    use crate::transformer::TransformFilters;
    use std::time::Duration;

    let store = Arc::new(ProxyStore::new());
    let fetcher = Arc::new(Fetcher::new(FetcherConfig::default()));
    let geo_cache = GeoCache::with_default_provider(Duration::from_secs(3600));
    let validator = Arc::new(crate::validator::Validator::new(
        geo_cache,
        Fetcher::new(FetcherConfig::default()),
        Duration::from_secs(10),
    ));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        validator,
        ScoringProfile::standard_validation(),
        SchedulerConfig::default(),
    ));
    let coordinator = Arc::new(Coordinator::new(
        seed_configs(),
        fetcher,
        Arc::clone(&store),
        Arc::clone(&scheduler),
        TransformFilters::default(),
        crate::coordinator::CoordinatorConfig::default(),
    ));
    Arc::new(AppState {
        store,
        scheduler,
        coordinator,
        config: Arc::new(parking_lot::RwLock::new(DynamicConfig::default())),
        started_at: Instant::now(),
    })
}
