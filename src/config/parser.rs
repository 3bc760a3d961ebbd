//! TOML parsing and section-merging for [`DynamicConfig`] (spec §6.3).
//!
//! The file on disk is allowed to specify any subset of sections; anything
//! omitted keeps its compiled-in default. Each section is merged field by
//! field rather than wholesale-replaced so a partial `[http]` table doesn't
//! reset its sibling fields back to defaults.

use serde::{Deserialize, Serialize};

use crate::config::dynamic::{
    ConfigSection, DatabaseConfig, DynamicConfig, HttpConfig, LoggingConfig, MonitoringConfig,
    RateLimitConfig, SchedulerSectionConfig, ValidatorSectionConfig,
};
use crate::dnsbl::DnsblConfig;
use crate::scoring::ScoringProfile;
use crate::utils::error::{ProxyError, ProxyResult};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub database: Option<TomlDatabaseConfig>,
    pub redis: Option<TomlRedisConfig>,
    pub http: Option<TomlHttpConfig>,
    pub validator: Option<TomlValidatorConfig>,
    pub rate_limit: Option<TomlRateLimitConfig>,
    pub logging: Option<TomlLoggingConfig>,
    pub monitoring: Option<TomlMonitoringConfig>,
    pub scheduler: Option<TomlSchedulerConfig>,
    pub dnsbl: Option<TomlDnsblConfig>,
    pub scoring_profiles: Option<Vec<ScoringProfile>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlDatabaseConfig {
    pub url: Option<String>,
    pub db_type: Option<String>,
    pub pool_size: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlRedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlHttpConfig {
    pub max_concurrent_requests: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlValidatorConfig {
    pub timeout_secs: Option<u64>,
    pub concurrent_workers: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlRateLimitConfig {
    pub per_minute: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlMonitoringConfig {
    pub enabled: Option<bool>,
    pub prometheus_enabled: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlSchedulerConfig {
    pub max_concurrent_jobs: Option<usize>,
    pub job_queue_size: Option<usize>,
    pub validation_interval_secs: Option<u64>,
    pub retry_failed_interval_secs: Option<u64>,
    pub auto_cleanup_interval_secs: Option<u64>,
    pub persistence_path: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlDnsblConfig {
    pub enabled: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub malicious_threshold: Option<usize>,
}

pub fn parse_toml_config(content: &str) -> ProxyResult<TomlConfig> {
    toml::from_str(content).map_err(|e| ProxyError::Config(format!("invalid TOML: {}", e)))
}

/// Parses `content` and layers it onto [`DynamicConfig::default`].
pub fn merge_onto_defaults(content: &str) -> ProxyResult<DynamicConfig> {
    let toml_config = parse_toml_config(content)?;
    let mut config = DynamicConfig::default();
    update_dynamic_config(&mut config, &toml_config)?;
    Ok(config)
}

#[derive(Debug)]
pub struct ConfigChange {
    pub section: ConfigSection,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
}

/// Merges every section present in `toml_config` into `dynamic_config`,
/// returning one [`ConfigChange`] per section actually touched (consumed by
/// the hot-reload watcher to log what changed).
pub fn update_dynamic_config(
    dynamic_config: &mut DynamicConfig,
    toml_config: &TomlConfig,
) -> ProxyResult<Vec<ConfigChange>> {
    let mut changes = Vec::new();

    if let Some(ref database) = toml_config.database {
        let old_value = serde_json::to_value(&dynamic_config.database)?;
        merge_database_config(&mut dynamic_config.database, database)?;
        changes.push(ConfigChange {
            section: ConfigSection::Database,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.database)?,
        });
    }

    if let Some(ref redis) = toml_config.redis {
        let old_value = serde_json::to_value(&dynamic_config.redis)?;
        if let Some(ref url) = redis.url {
            dynamic_config.redis.url = Some(url.clone());
        }
        changes.push(ConfigChange {
            section: ConfigSection::Redis,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.redis)?,
        });
    }

    if let Some(ref http) = toml_config.http {
        let old_value = serde_json::to_value(&dynamic_config.http)?;
        merge_http_config(&mut dynamic_config.http, http);
        changes.push(ConfigChange {
            section: ConfigSection::Http,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.http)?,
        });
    }

    if let Some(ref validator) = toml_config.validator {
        let old_value = serde_json::to_value(&dynamic_config.validator)?;
        merge_validator_config(&mut dynamic_config.validator, validator);
        changes.push(ConfigChange {
            section: ConfigSection::Validator,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.validator)?,
        });
    }

    if let Some(ref rate_limit) = toml_config.rate_limit {
        let old_value = serde_json::to_value(&dynamic_config.rate_limit)?;
        if let Some(per_minute) = rate_limit.per_minute {
            dynamic_config.rate_limit.per_minute = per_minute;
        }
        changes.push(ConfigChange {
            section: ConfigSection::RateLimit,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.rate_limit)?,
        });
    }

    if let Some(ref logging) = toml_config.logging {
        let old_value = serde_json::to_value(&dynamic_config.logging)?;
        merge_logging_config(&mut dynamic_config.logging, logging)?;
        changes.push(ConfigChange {
            section: ConfigSection::Logging,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.logging)?,
        });
    }

    if let Some(ref monitoring) = toml_config.monitoring {
        let old_value = serde_json::to_value(&dynamic_config.monitoring)?;
        if let Some(enabled) = monitoring.enabled {
            dynamic_config.monitoring.enabled = enabled;
        }
        if let Some(prometheus_enabled) = monitoring.prometheus_enabled {
            dynamic_config.monitoring.prometheus_enabled = prometheus_enabled;
        }
        changes.push(ConfigChange {
            section: ConfigSection::Monitoring,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.monitoring)?,
        });
    }

    if let Some(ref scheduler) = toml_config.scheduler {
        let old_value = serde_json::to_value(&dynamic_config.scheduler)?;
        merge_scheduler_config(&mut dynamic_config.scheduler, scheduler);
        changes.push(ConfigChange {
            section: ConfigSection::Scheduler,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.scheduler)?,
        });
    }

    if let Some(ref dnsbl) = toml_config.dnsbl {
        let old_value = serde_json::to_value(&dynamic_config.dnsbl)?;
        merge_dnsbl_config(&mut dynamic_config.dnsbl, dnsbl);
        changes.push(ConfigChange {
            section: ConfigSection::Dnsbl,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.dnsbl)?,
        });
    }

    if let Some(ref profiles) = toml_config.scoring_profiles {
        let old_value = serde_json::to_value(&dynamic_config.scoring_profiles)?;
        for profile in profiles {
            profile.weights.validate()?;
        }
        dynamic_config.scoring_profiles = profiles.clone();
        changes.push(ConfigChange {
            section: ConfigSection::ScoringProfiles,
            old_value,
            new_value: serde_json::to_value(&dynamic_config.scoring_profiles)?,
        });
    }

    Ok(changes)
}

fn merge_database_config(existing: &mut DatabaseConfig, update: &TomlDatabaseConfig) -> ProxyResult<()> {
    if let Some(ref url) = update.url {
        existing.url = url.clone();
    }
    if let Some(ref db_type) = update.db_type {
        existing.db_type = match db_type.to_ascii_lowercase().as_str() {
            "sqlite" => crate::config::dynamic::DatabaseType::Sqlite,
            "postgres" | "postgresql" => crate::config::dynamic::DatabaseType::Postgres,
            other => return Err(ProxyError::Config(format!("unknown database type: {}", other))),
        };
    }
    if let Some(pool_size) = update.pool_size {
        existing.pool_size = pool_size;
    }
    Ok(())
}

fn merge_http_config(existing: &mut HttpConfig, update: &TomlHttpConfig) {
    if let Some(v) = update.max_concurrent_requests {
        existing.max_concurrent_requests = v;
    }
    if let Some(v) = update.request_timeout_secs {
        existing.request_timeout_secs = v;
    }
}

fn merge_validator_config(existing: &mut ValidatorSectionConfig, update: &TomlValidatorConfig) {
    if let Some(v) = update.timeout_secs {
        existing.timeout_secs = v;
    }
    if let Some(v) = update.concurrent_workers {
        existing.concurrent_workers = v;
    }
}

fn merge_logging_config(existing: &mut LoggingConfig, update: &TomlLoggingConfig) -> ProxyResult<()> {
    if let Some(ref level) = update.level {
        existing.level = level.clone();
    }
    if let Some(ref format) = update.format {
        existing.format = match format.to_ascii_lowercase().as_str() {
            "json" => crate::config::dynamic::LogFormat::Json,
            "text" => crate::config::dynamic::LogFormat::Text,
            other => return Err(ProxyError::Config(format!("unknown log format: {}", other))),
        };
    }
    Ok(())
}

fn merge_scheduler_config(existing: &mut SchedulerSectionConfig, update: &TomlSchedulerConfig) {
    if let Some(v) = update.max_concurrent_jobs {
        existing.max_concurrent_jobs = v;
    }
    if let Some(v) = update.job_queue_size {
        existing.job_queue_size = v;
    }
    if let Some(v) = update.validation_interval_secs {
        existing.validation_interval_secs = v;
    }
    if let Some(v) = update.retry_failed_interval_secs {
        existing.retry_failed_interval_secs = v;
    }
    if let Some(v) = update.auto_cleanup_interval_secs {
        existing.auto_cleanup_interval_secs = v;
    }
    if let Some(ref v) = update.persistence_path {
        existing.persistence_path = v.clone();
    }
}

fn merge_dnsbl_config(existing: &mut DnsblConfig, update: &TomlDnsblConfig) {
    if let Some(v) = update.enabled {
        existing.enabled = v;
    }
    if let Some(v) = update.timeout_secs {
        existing.timeout_secs = v;
    }
    if let Some(v) = update.max_concurrent {
        existing.max_concurrent = v;
    }
    if let Some(v) = update.cache_ttl_secs {
        existing.cache_ttl_secs = v;
    }
    if let Some(v) = update.malicious_threshold {
        existing.malicious_threshold = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_only_touches_named_sections() {
        let toml = r#"
            [http]
            max_concurrent_requests = 200

            [logging]
            level = "debug"
            format = "json"
        "#;
        let config = merge_onto_defaults(toml).unwrap();
        assert_eq!(config.http.max_concurrent_requests, 200);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, crate::config::dynamic::LogFormat::Json);
        // Untouched sections keep their defaults.
        assert_eq!(config.rate_limit.per_minute, RateLimitConfig::default().per_minute);
    }

    #[test]
    fn unknown_database_type_is_rejected() {
        let toml = r#"
            [database]
            db_type = "oracle"
        "#;
        assert!(merge_onto_defaults(toml).is_err());
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = merge_onto_defaults("").unwrap();
        assert_eq!(config.scheduler.max_concurrent_jobs, SchedulerSectionConfig::default().max_concurrent_jobs);
    }
}
