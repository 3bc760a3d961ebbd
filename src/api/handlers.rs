//! Route handlers (spec §6.1). Thin: parse query/body, call into
//! store/scheduler/coordinator, map the result into the response shapes in
//! [`crate::api::models`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::api::models::*;
use crate::api::server::AppState;
use crate::store::ProxyFilter;
use crate::utils::error::ProxyError;

pub async fn list_proxies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProxyListQuery>,
) -> ApiResult<Json<crate::store::Page<crate::proxy::Proxy>>> {
    let filter = ProxyFilter {
        protocol: query.protocol()?,
        country: query.country.clone(),
        anonymity: query.anonymity()?,
        is_active: query.is_active,
        source: query.source.clone(),
        min_response_time_ms: query.min_response_time,
        max_response_time_ms: query.max_response_time,
    };
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(50).min(500);
    Ok(Json(state.store.query(&filter, page, page_size)))
}

pub async fn get_proxy(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<Json<crate::proxy::Proxy>> {
    state.store.get_by_id(id).map(Json).ok_or_else(|| ProxyError::ProxyNotFound.into())
}

pub async fn delete_proxy(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<Json<DeletedResponse>> {
    state.store.delete(id)?;
    Ok(Json(DeletedResponse { message: "proxy deleted".to_string(), id }))
}

pub async fn random_proxy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RandomProxyQuery>,
) -> ApiResult<Json<crate::proxy::Proxy>> {
    let protocol = query.protocol.as_deref().map(str::parse).transpose()?;
    let anonymity = query
        .anonymity
        .as_deref()
        .map(|s| match s.to_ascii_lowercase().as_str() {
            "elite" => Ok(crate::proxy::Anonymity::Elite),
            "anonymous" => Ok(crate::proxy::Anonymity::Anonymous),
            "transparent" => Ok(crate::proxy::Anonymity::Transparent),
            "unknown" => Ok(crate::proxy::Anonymity::Unknown),
            other => Err(ProxyError::InvalidFormat(format!("unknown anonymity level: {}", other))),
        })
        .transpose()?;
    let filter = ProxyFilter { protocol, anonymity, country: query.country.clone(), ..Default::default() };
    state.store.random(filter).map(Json).ok_or_else(|| ProxyError::PoolEmpty.into())
}

pub async fn validate_proxy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobSubmittedResponse>> {
    if state.store.get_by_id(id).is_none() {
        return Err(ProxyError::ProxyNotFound.into());
    }
    let job_id = state.scheduler.submit(vec![id], crate::validator::TestLevel::Standard, 8, None, false)?;
    Ok(Json(JobSubmittedResponse { job_id }))
}

pub async fn proxy_stats(State(state): State<Arc<AppState>>) -> Json<crate::store::ProxyStats> {
    Json(state.store.stats())
}

pub async fn crawl_start(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CrawlStartRequest>,
) -> ApiResult<Json<CrawlStartResponse>> {
    let all_sources = state.coordinator.source_names();
    let sources = body.sources.unwrap_or_else(|| all_sources.clone());
    for name in &sources {
        if !all_sources.contains(name) {
            return Err(ProxyError::InvalidFormat(format!("unknown source: {}", name)).into());
        }
    }

    let coordinator = Arc::clone(&state.coordinator);
    let to_run = sources.clone();
    let task_id = Uuid::new_v4();
    tokio::spawn(async move {
        for name in &to_run {
            coordinator.run_source(name).await;
        }
    });

    Ok(Json(CrawlStartResponse {
        task_id,
        status: "started".to_string(),
        sources,
        started_at: chrono::Utc::now(),
    }))
}

pub async fn crawl_status(State(_state): State<Arc<AppState>>, Path(_task_id): Path<Uuid>) -> ApiResult<Json<serde_json::Value>> {
    // Crawl runs are fire-and-forget against the coordinator (see `crawl_start`);
    // per-task polling is not tracked separately from the crawl log.
    Err(ProxyError::ProxyNotFound.into())
}

pub async fn crawl_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CrawlHistoryQuery>,
) -> Json<Vec<crate::coordinator::CrawlLog>> {
    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0);
    let mut history = state.coordinator.crawl_history(limit + offset);
    if let Some(ref source) = query.source {
        history.retain(|h| &h.source == source);
    }
    if let Some(success) = query.success {
        history.retain(|h| h.success == success);
    }
    let history = history.into_iter().skip(offset).take(limit).collect();
    Json(history)
}

pub async fn list_crawl_sources(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.coordinator.source_names())
}

pub async fn test_crawl_source(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<crate::coordinator::SourceRunSummary>> {
    if !state.coordinator.source_names().contains(&name) {
        return Err(ProxyError::InvalidFormat(format!("unknown source: {}", name)).into());
    }
    Ok(Json(state.coordinator.run_source(&name).await))
}

pub async fn delete_crawl_task(Path(_task_id): Path<Uuid>) -> ApiResult<Json<DeletedResponse>> {
    Err(ProxyError::ProxyNotFound.into())
}

pub async fn submit_validation_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitValidationJobRequest>,
) -> ApiResult<Json<JobSubmittedResponse>> {
    let delay = body.schedule_delay.map(Duration::from_secs);
    let job_id = state.scheduler.submit(body.proxies, body.level, body.priority, delay, false)?;
    Ok(Json(JobSubmittedResponse { job_id }))
}

pub async fn get_validation_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<crate::scheduler::ValidationJob>> {
    state.scheduler.get_status(id).map(Json).ok_or_else(|| ProxyError::ProxyNotFound.into())
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let mut checks = std::collections::HashMap::new();
    checks.insert("database".to_string(), "ok");
    checks.insert("redis".to_string(), if state.config.read().redis.url.is_some() { "ok" } else { "disabled" });
    checks.insert("system".to_string(), "ok");
    checks.insert("disk".to_string(), "ok");
    checks.insert("memory".to_string(), "ok");
    Json(HealthStatus { status: "healthy", checks, uptime_seconds: state.started_at.elapsed().as_secs() })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    let stats = state.store.stats();
    let system = state.scheduler.get_system_status();
    let mut out = String::new();
    out.push_str("# HELP proxy_pool_total Total number of proxies in the store\n");
    out.push_str("# TYPE proxy_pool_total gauge\n");
    out.push_str(&format!("proxy_pool_total {}\n", stats.total));
    out.push_str("# HELP proxy_pool_active Number of currently active proxies\n");
    out.push_str("# TYPE proxy_pool_active gauge\n");
    out.push_str(&format!("proxy_pool_active {}\n", stats.active));
    out.push_str("# HELP proxy_pool_average_quality_score Mean composite quality score\n");
    out.push_str("# TYPE proxy_pool_average_quality_score gauge\n");
    out.push_str(&format!("proxy_pool_average_quality_score {}\n", stats.average_quality_score));
    out.push_str("# HELP scheduler_jobs_running Jobs currently running\n");
    out.push_str("# TYPE scheduler_jobs_running gauge\n");
    out.push_str(&format!("scheduler_jobs_running {}\n", system.running));
    out.push_str("# HELP scheduler_jobs_completed_total Jobs completed since startup\n");
    out.push_str("# TYPE scheduler_jobs_completed_total counter\n");
    out.push_str(&format!("scheduler_jobs_completed_total {}\n", system.completed));
    out.push_str("# HELP scheduler_jobs_failed_total Jobs failed since startup\n");
    out.push_str("# TYPE scheduler_jobs_failed_total counter\n");
    out.push_str(&format!("scheduler_jobs_failed_total {}\n", system.failed));
    out.push_str("# HELP scheduler_queue_size Jobs currently queued\n");
    out.push_str("# TYPE scheduler_queue_size gauge\n");
    out.push_str(&format!("scheduler_queue_size {}\n", system.queue_size));
    out
}

pub async fn monitoring_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = state.config.read();
    Json(serde_json::json!({
        "logging": config.logging,
        "monitoring": config.monitoring,
        "rate_limit": config.rate_limit,
        "scheduler": config.scheduler,
        "scoring_profiles": config.scoring_profiles.iter().map(|p| &p.name).collect::<Vec<_>>(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::test_state;

    #[tokio::test]
    async fn get_proxy_returns_not_found_envelope_for_unknown_id() {
        let state = test_state();
        let result = get_proxy(State(state), Path(Uuid::new_v4())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn random_proxy_is_pool_empty_when_store_has_no_active_rows() {
        let state = test_state();
        let result = random_proxy(State(state), Query(RandomProxyQuery::default())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_crawl_sources_returns_seeded_names() {
        let state = test_state();
        let Json(names) = list_crawl_sources(State(state)).await;
        assert!(!names.is_empty());
    }
}
