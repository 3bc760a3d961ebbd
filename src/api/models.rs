//! Request/response shapes for the HTTP API (spec §6.1), including the
//! error envelope every non-2xx response uses.

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proxy::{Anonymity, Protocol};
use crate::utils::error::ProxyError;
use crate::validator::TestLevel;

/// `GET /proxies` query parameters (spec §6.1).
#[derive(Debug, Deserialize, Default)]
pub struct ProxyListQuery {
    pub protocol: Option<String>,
    pub country: Option<String>,
    pub anonymity: Option<String>,
    pub is_active: Option<bool>,
    pub source: Option<String>,
    pub min_response_time: Option<u64>,
    pub max_response_time: Option<u64>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl ProxyListQuery {
    pub fn protocol(&self) -> Result<Option<Protocol>, ProxyError> {
        self.protocol.as_deref().map(str::parse).transpose()
    }

    pub fn anonymity(&self) -> Result<Option<Anonymity>, ProxyError> {
        self.anonymity
            .as_deref()
            .map(|s| match s.to_ascii_lowercase().as_str() {
                "elite" => Ok(Anonymity::Elite),
                "anonymous" => Ok(Anonymity::Anonymous),
                "transparent" => Ok(Anonymity::Transparent),
                "unknown" => Ok(Anonymity::Unknown),
                other => Err(ProxyError::InvalidFormat(format!("unknown anonymity level: {}", other))),
            })
            .transpose()
    }
}

/// `GET /proxies/random` query parameters.
#[derive(Debug, Deserialize, Default)]
pub struct RandomProxyQuery {
    pub protocol: Option<String>,
    pub anonymity: Option<String>,
    pub country: Option<String>,
}

/// `POST /crawl/start` body.
#[derive(Debug, Deserialize)]
pub struct CrawlStartRequest {
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub rate_limit_delay: Option<u64>,
}

/// `GET /crawl/history` query parameters.
#[derive(Debug, Deserialize, Default)]
pub struct CrawlHistoryQuery {
    pub source: Option<String>,
    pub success: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `POST /validation/jobs` body (spec §6.1).
#[derive(Debug, Deserialize)]
pub struct SubmitValidationJobRequest {
    pub proxies: Vec<uuid::Uuid>,
    pub level: TestLevel,
    pub priority: u8,
    #[serde(default)]
    pub schedule_delay: Option<u64>,
}

/// Configuration section PATCH body (`/monitoring/status` companion used by
/// internal tooling, not in the public route table but convenient for
/// operators to script against the same envelope).
#[derive(Debug, Deserialize)]
pub struct ConfigUpdateRequest {
    pub section: String,
    pub config: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: String,
    pub id: uuid::Uuid,
}

#[derive(Debug, Serialize)]
pub struct CrawlStartResponse {
    pub task_id: uuid::Uuid,
    pub status: String,
    pub sources: Vec<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JobSubmittedResponse {
    pub job_id: uuid::Uuid,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub checks: HashMap<String, &'static str>,
    pub uptime_seconds: u64,
}

/// Error envelope (spec §6.1): `{ "error": { code, message, status_code,
/// details, timestamp } }`.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub status_code: u16,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl From<ProxyError> for ApiErrorBody {
    fn from(err: ProxyError) -> Self {
        ApiErrorBody {
            error: ApiErrorDetail {
                code: err.code().as_str(),
                status_code: err.status_code(),
                message: err.to_string(),
                details: serde_json::Value::Null,
                timestamp: Utc::now(),
            },
        }
    }
}

impl IntoResponse for ApiErrorBody {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Wraps any handler's fallible path so `?` on a `ProxyError` produces the
/// right envelope and status code automatically.
pub type ApiResult<T> = Result<T, ApiErrorBody>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_not_found_maps_to_404_envelope() {
        let body = ApiErrorBody::from(ProxyError::ProxyNotFound);
        assert_eq!(body.error.status_code, 404);
        assert_eq!(body.error.code, "PROXY_NOT_FOUND");
    }

    #[test]
    fn query_parses_known_protocol() {
        let query = ProxyListQuery { protocol: Some("socks5".into()), ..Default::default() };
        assert_eq!(query.protocol().unwrap(), Some(Protocol::Socks5));
    }

    #[test]
    fn query_rejects_unknown_anonymity() {
        let query = ProxyListQuery { anonymity: Some("invisible".into()), ..Default::default() };
        assert!(query.anonymity().is_err());
    }
}
