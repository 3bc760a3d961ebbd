//! Runtime configuration (spec §6.3): every enumerated key plus the bundled
//! scoring profiles, loaded from TOML with compiled-in defaults for
//! anything the file omits.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::dnsbl::DnsblConfig;
use crate::scoring::{bundled_profiles, ScoringProfile};
use crate::utils::error::{ProxyError, ProxyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Sqlite,
    Postgres,
}

/// `DATABASE_URL` / `DATABASE_TYPE` (spec §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub db_type: DatabaseType,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: "sqlite://data/proxies.db".to_string(),
            db_type: DatabaseType::Sqlite,
            pool_size: 10,
        }
    }
}

/// `REDIS_URL` (spec §6.3): optional cache / cross-process queue store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

/// `MAX_CONCURRENT_REQUESTS` / `REQUEST_TIMEOUT` (spec §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub max_concurrent_requests: usize,
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            max_concurrent_requests: 50,
            request_timeout_secs: 10,
        }
    }
}

/// `VALIDATOR_TIMEOUT` / `VALIDATOR_CONCURRENT_WORKERS` (spec §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSectionConfig {
    pub timeout_secs: u64,
    pub concurrent_workers: usize,
}

impl Default for ValidatorSectionConfig {
    fn default() -> Self {
        ValidatorSectionConfig {
            timeout_secs: 120,
            concurrent_workers: 10,
        }
    }
}

/// `RATE_LIMIT_PER_MINUTE` (spec §6.3): inbound API rate cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig { per_minute: 120 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

/// `LOG_LEVEL` / `LOG_FORMAT` (spec §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// `MONITORING_ENABLED` / `PROMETHEUS_ENABLED` (spec §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub prometheus_enabled: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            enabled: true,
            prometheus_enabled: true,
        }
    }
}

/// Scheduler knobs enumerated in spec §6.3's last row, cross-referencing
/// §4.6's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSectionConfig {
    pub max_concurrent_jobs: usize,
    pub job_queue_size: usize,
    pub validation_interval_secs: u64,
    pub retry_failed_interval_secs: u64,
    pub auto_cleanup_interval_secs: u64,
    pub persistence_path: String,
}

impl Default for SchedulerSectionConfig {
    fn default() -> Self {
        SchedulerSectionConfig {
            max_concurrent_jobs: 3,
            job_queue_size: 100,
            validation_interval_secs: 3600,
            retry_failed_interval_secs: 900,
            auto_cleanup_interval_secs: 86400,
            persistence_path: "data/scheduler_jobs.json".to_string(),
        }
    }
}

/// Every enumerated key in spec §6.3, plus the bundled scoring profiles
/// (sum-to-one on every profile's weights is enforced by [`DynamicConfig::validate`],
/// spec §7 error kind 5: "fatal at load").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub http: HttpConfig,
    pub validator: ValidatorSectionConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub monitoring: MonitoringConfig,
    pub scheduler: SchedulerSectionConfig,
    pub dnsbl: DnsblConfig,
    #[serde(default = "bundled_profiles")]
    pub scoring_profiles: Vec<ScoringProfile>,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        DynamicConfig {
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            http: HttpConfig::default(),
            validator: ValidatorSectionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            monitoring: MonitoringConfig::default(),
            scheduler: SchedulerSectionConfig::default(),
            dnsbl: DnsblConfig::default(),
            scoring_profiles: bundled_profiles(),
        }
    }
}

impl DynamicConfig {
    pub fn new() -> Self {
        DynamicConfig::default()
    }

    /// Fatal-at-load validation (spec §7 error kind 5): every bundled
    /// profile's weights must sum to 1.0.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.scoring_profiles.is_empty() {
            return Err(ProxyError::Config("at least one scoring profile is required".into()));
        }
        for profile in &self.scoring_profiles {
            profile.weights.validate().map_err(|e| {
                ProxyError::Config(format!("profile '{}': {}", profile.name, e))
            })?;
        }
        Ok(())
    }

    pub fn scoring_profile(&self, name: &str) -> Option<&ScoringProfile> {
        self.scoring_profiles.iter().find(|p| p.name == name)
    }

    pub fn update_section(&mut self, section: ConfigSection, new_config: serde_json::Value) -> Result<(), String> {
        match section {
            ConfigSection::Database => {
                self.database = serde_json::from_value(new_config).map_err(|e| format!("invalid database config: {}", e))?;
            }
            ConfigSection::Redis => {
                self.redis = serde_json::from_value(new_config).map_err(|e| format!("invalid redis config: {}", e))?;
            }
            ConfigSection::Http => {
                self.http = serde_json::from_value(new_config).map_err(|e| format!("invalid http config: {}", e))?;
            }
            ConfigSection::Validator => {
                self.validator = serde_json::from_value(new_config).map_err(|e| format!("invalid validator config: {}", e))?;
            }
            ConfigSection::RateLimit => {
                self.rate_limit = serde_json::from_value(new_config).map_err(|e| format!("invalid rate limit config: {}", e))?;
            }
            ConfigSection::Logging => {
                self.logging = serde_json::from_value(new_config).map_err(|e| format!("invalid logging config: {}", e))?;
            }
            ConfigSection::Monitoring => {
                self.monitoring = serde_json::from_value(new_config).map_err(|e| format!("invalid monitoring config: {}", e))?;
            }
            ConfigSection::Scheduler => {
                self.scheduler = serde_json::from_value(new_config).map_err(|e| format!("invalid scheduler config: {}", e))?;
            }
            ConfigSection::Dnsbl => {
                self.dnsbl = serde_json::from_value(new_config).map_err(|e| format!("invalid dnsbl config: {}", e))?;
            }
            ConfigSection::ScoringProfiles => {
                let profiles: Vec<ScoringProfile> =
                    serde_json::from_value(new_config).map_err(|e| format!("invalid scoring profiles: {}", e))?;
                for profile in &profiles {
                    profile.weights.validate().map_err(|e| e.to_string())?;
                }
                self.scoring_profiles = profiles;
            }
        }
        Ok(())
    }

    pub fn get_section_as_json(&self, section: ConfigSection) -> serde_json::Value {
        match section {
            ConfigSection::Database => serde_json::to_value(&self.database).unwrap_or_default(),
            ConfigSection::Redis => serde_json::to_value(&self.redis).unwrap_or_default(),
            ConfigSection::Http => serde_json::to_value(&self.http).unwrap_or_default(),
            ConfigSection::Validator => serde_json::to_value(&self.validator).unwrap_or_default(),
            ConfigSection::RateLimit => serde_json::to_value(&self.rate_limit).unwrap_or_default(),
            ConfigSection::Logging => serde_json::to_value(&self.logging).unwrap_or_default(),
            ConfigSection::Monitoring => serde_json::to_value(&self.monitoring).unwrap_or_default(),
            ConfigSection::Scheduler => serde_json::to_value(&self.scheduler).unwrap_or_default(),
            ConfigSection::Dnsbl => serde_json::to_value(&self.dnsbl).unwrap_or_default(),
            ConfigSection::ScoringProfiles => serde_json::to_value(&self.scoring_profiles).unwrap_or_default(),
        }
    }

    /// Reads `path` if it exists, falling back to defaults otherwise
    /// (SPEC_FULL.md §2: "loads `DynamicConfig` (file if present, else
    /// defaults)"), then validates.
    pub fn load_or_default(path: impl AsRef<std::path::Path>) -> ProxyResult<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ProxyError::Config(format!("failed to read {}: {}", path.display(), e)))?;
            super::parser::merge_onto_defaults(&content)?
        } else {
            log::info!("no config file at {:?}, using defaults", path);
            DynamicConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Database,
    Redis,
    Http,
    Validator,
    RateLimit,
    Logging,
    Monitoring,
    Scheduler,
    Dnsbl,
    ScoringProfiles,
}

impl std::fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConfigSection::Database => "database",
            ConfigSection::Redis => "redis",
            ConfigSection::Http => "http",
            ConfigSection::Validator => "validator",
            ConfigSection::RateLimit => "rate_limit",
            ConfigSection::Logging => "logging",
            ConfigSection::Monitoring => "monitoring",
            ConfigSection::Scheduler => "scheduler",
            ConfigSection::Dnsbl => "dnsbl",
            ConfigSection::ScoringProfiles => "scoring_profiles",
        };
        write!(f, "{}", name)
    }
}

pub type SharedConfig = Arc<RwLock<DynamicConfig>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(DynamicConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_profiles_whose_weights_do_not_sum_to_one() {
        let mut config = DynamicConfig::default();
        config.scoring_profiles[0].weights.connection_success += 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn update_section_replaces_only_the_named_section() {
        let mut config = DynamicConfig::default();
        let original_http_timeout = config.http.request_timeout_secs;
        config
            .update_section(ConfigSection::RateLimit, serde_json::json!({"per_minute": 500}))
            .unwrap();
        assert_eq!(config.rate_limit.per_minute, 500);
        assert_eq!(config.http.request_timeout_secs, original_http_timeout);
    }
}
