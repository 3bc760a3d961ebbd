//! The canonical proxy record and the small value types that hang off it.
//!
//! This is the single record every other subsystem agrees on: extractors
//! produce loose candidates that get normalized into a `Proxy`, the
//! validator/scorer mutate its quality fields, and the store owns its
//! lifecycle.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport protocol a proxy endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
        }
    }

    /// Common ports that earn a small scoring adjustment (spec §4.4.6).
    pub fn is_common_port(port: u16) -> bool {
        matches!(port, 80 | 8080 | 3128 | 8081 | 9090)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = crate::utils::error::ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "socks4" => Ok(Protocol::Socks4),
            "socks5" => Ok(Protocol::Socks5),
            other => Err(crate::utils::error::ProxyError::InvalidFormat(format!(
                "unknown protocol: {}",
                other
            ))),
        }
    }
}

/// Canonical anonymity tier (GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anonymity {
    Elite,
    Anonymous,
    Transparent,
    Unknown,
}

impl Anonymity {
    /// Subscore used directly by the anonymity dimension (§4.4.4/§4.4.6).
    pub fn subscore(self) -> f64 {
        match self {
            Anonymity::Elite => 100.0,
            Anonymity::Anonymous => 80.0,
            Anonymity::Transparent => 40.0,
            Anonymity::Unknown => 50.0,
        }
    }
}

/// One validated candidate, identity'd by `(ip, port)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: Uuid,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub protocol: Protocol,
    pub anonymity: Anonymity,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub source: String,
    pub response_time_ms: Option<u64>,
    pub success_rate: f64,
    pub quality_score: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Proxy {
    /// Constructs a fresh, unverified candidate as the transformer would
    /// (§4.3): zero history, inactive until the scheduler validates it.
    pub fn new(ip: Ipv4Addr, port: u16, protocol: Protocol, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Proxy {
            id: Uuid::new_v4(),
            ip,
            port,
            protocol,
            anonymity: Anonymity::Unknown,
            country: None,
            region: None,
            city: None,
            source: source.into(),
            response_time_ms: None,
            success_rate: 0.0,
            quality_score: 0.0,
            is_active: false,
            created_at: now,
            updated_at: now,
            last_checked: None,
            last_success: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// `(ip, port)` is the store's natural key (spec §3.1, §4.5).
    pub fn key(&self) -> (Ipv4Addr, u16) {
        (self.ip, self.port)
    }

    /// The proxy URL used to route requests through this endpoint.
    pub fn proxy_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.ip, self.port)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{} [{}] score={:.1}",
            self.protocol,
            self.ip,
            self.port,
            self.anonymity_label(),
            self.quality_score
        )
    }
}

impl Proxy {
    fn anonymity_label(&self) -> &'static str {
        match self.anonymity {
            Anonymity::Elite => "elite",
            Anonymity::Anonymous => "anonymous",
            Anonymity::Transparent => "transparent",
            Anonymity::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_proxy_is_inactive_with_zero_history() {
        let p = Proxy::new(Ipv4Addr::new(1, 2, 3, 4), 8080, Protocol::Http, "ip3366");
        assert!(!p.is_active);
        assert_eq!(p.quality_score, 0.0);
        assert_eq!(p.key(), (Ipv4Addr::new(1, 2, 3, 4), 8080));
    }

    #[test]
    fn proxy_url_uses_the_declared_protocol() {
        let p = Proxy::new(Ipv4Addr::new(9, 9, 9, 9), 3128, Protocol::Socks5, "manual");
        assert_eq!(p.proxy_url(), "socks5://9.9.9.9:3128");
    }

    #[test]
    fn common_ports_are_recognized() {
        assert!(Protocol::is_common_port(8080));
        assert!(!Protocol::is_common_port(54321));
    }
}
