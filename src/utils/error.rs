//! Error types shared across the harvesting, validation, and scheduling subsystems.

use thiserror::Error;

/// Tagged error kinds for the platform. Every fallible operation that crosses a
/// component boundary returns one of these rather than an opaque `Box<dyn Error>`,
/// so callers can match on kind (retry transient network errors, surface
/// configuration errors as fatal, etc.).
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("anti-bot signal detected: {0:?}")]
    AntiBot(crate::fetcher::BotSignal),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("invalid proxy format: {0}")]
    InvalidFormat(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("DNSBL check failed: {0}")]
    Dnsbl(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("job queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("proxy not found")]
    ProxyNotFound,

    #[error("proxy pool is empty for the requested filter")]
    PoolEmpty,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Stable machine-readable codes surfaced in the API error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    ProxyNotFound,
    ProxyPoolEmpty,
    ValidationError,
    RateLimitError,
    ConfigError,
    ScrapingTimeout,
    NetworkError,
    DatabaseConnectionError,
    DatabaseQueryError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ProxyNotFound => "PROXY_NOT_FOUND",
            ErrorCode::ProxyPoolEmpty => "PROXY_POOL_EMPTY",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::RateLimitError => "RATE_LIMIT_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::ScrapingTimeout => "SCRAPING_TIMEOUT",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::DatabaseConnectionError => "DATABASE_CONNECTION_ERROR",
            ErrorCode::DatabaseQueryError => "DATABASE_QUERY_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl ProxyError {
    /// HTTP status code the API surface should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::ProxyNotFound => 404,
            ProxyError::PoolEmpty => 404,
            ProxyError::Validation(_) => 422,
            ProxyError::RateLimited(_) => 429,
            ProxyError::Config(_) => 500,
            ProxyError::Timeout(_) => 504,
            ProxyError::QueueFull(_) => 503,
            ProxyError::Storage(_) => 503,
            _ => 500,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ProxyError::ProxyNotFound => ErrorCode::ProxyNotFound,
            ProxyError::PoolEmpty => ErrorCode::ProxyPoolEmpty,
            ProxyError::Validation(_) => ErrorCode::ValidationError,
            ProxyError::RateLimited(_) => ErrorCode::RateLimitError,
            ProxyError::Config(_) => ErrorCode::ConfigError,
            ProxyError::Timeout(_) => ErrorCode::ScrapingTimeout,
            ProxyError::Network(_) | ProxyError::DnsResolution(_) | ProxyError::Http(_) => {
                ErrorCode::NetworkError
            }
            ProxyError::Storage(_) => ErrorCode::DatabaseQueryError,
            _ => ErrorCode::InternalError,
        }
    }
}

/// Helper for attaching context to a fallible expression.
pub trait SafeUnwrap<T> {
    fn safe_unwrap(self, context: &str) -> ProxyResult<T>;
}

impl<T> SafeUnwrap<T> for Option<T> {
    fn safe_unwrap(self, context: &str) -> ProxyResult<T> {
        self.ok_or_else(|| ProxyError::Config(format!("expected value in {}", context)))
    }
}

impl<T, E> SafeUnwrap<T> for Result<T, E>
where
    E: Into<ProxyError>,
{
    fn safe_unwrap(self, context: &str) -> ProxyResult<T> {
        self.map_err(|e| {
            let err: ProxyError = e.into();
            ProxyError::Config(format!("{}: {}", context, err))
        })
    }
}

/// Logs and rethrows, keeping the call site free of boilerplate.
#[macro_export]
macro_rules! log_error {
    ($result:expr, $context:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => {
                log::error!("{}: {}", $context, e);
                return Err(e);
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_expected_http_responses() {
        assert_eq!(ProxyError::ProxyNotFound.status_code(), 404);
        assert_eq!(ProxyError::QueueFull(100).status_code(), 503);
        assert_eq!(ProxyError::Config("bad weights".into()).status_code(), 500);
    }

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(ErrorCode::ProxyNotFound.as_str(), "PROXY_NOT_FOUND");
        assert_eq!(ErrorCode::RateLimitError.as_str(), "RATE_LIMIT_ERROR");
    }
}
