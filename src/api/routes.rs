//! Route table (spec §6.1), mounted under `/api/v1`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers::*;
use crate::api::middleware::{logging_middleware, rate_limit_middleware, RateLimiter};
use crate::api::server::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let rate_limit_per_minute = state.config.read().rate_limit.per_minute;
    let rate_limiter = Arc::new(RateLimiter::per_minute(rate_limit_per_minute));

    let v1 = Router::new()
        .route("/proxies", get(list_proxies))
        .route("/proxies/stats", get(proxy_stats))
        .route("/proxies/random", get(random_proxy))
        .route("/proxies/:id", get(get_proxy).delete(delete_proxy))
        .route("/proxies/:id/validate", post(validate_proxy))
        .route("/crawl/start", post(crawl_start))
        .route("/crawl/status/:id", get(crawl_status))
        .route("/crawl/history", get(crawl_history))
        .route("/crawl/sources", get(list_crawl_sources))
        .route("/crawl/sources/:name/test", post(test_crawl_source))
        .route("/crawl/tasks/:id", axum::routing::delete(delete_crawl_task))
        .route("/validation/jobs", post(submit_validation_job))
        .route("/validation/jobs/:id", get(get_validation_job))
        .route("/health", get(health))
        .route("/monitoring/health", get(health))
        .route("/monitoring/metrics", get(metrics))
        .route("/monitoring/status", get(monitoring_status))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware))
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state);

    Router::new().nest("/api/v1", v1).route("/", get(root_info))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}

async fn root_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "proxy-harvester",
        "version": crate::VERSION,
        "api": "/api/v1",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::test_state;

    #[tokio::test]
    async fn router_builds_without_panicking() {
        let _router = build_router(test_state());
    }
}
