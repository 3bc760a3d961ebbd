//! Maps source name → `SourceConfig` → constructed `Extractor`. This is the
//! "registry" half of the interface+registry redesign (spec §9): adding a
//! source is a new entry here, not a new Rust type.

use std::collections::HashMap;
use std::sync::Arc;

use crate::sources::api::ApiExtractor;
use crate::sources::config::{ApiFormat, SourceConfig, SourceKind, TableSelectors};
use crate::sources::html::TableExtractor;
use crate::sources::Extractor;

/// The bundled seed sources. Names only borrow the original Python
/// extractors' site labels (ip3366, freeproxylist, proxydb,
/// proxylistdownload); these are configuration records, not scrapers
/// wired against live third-party markup.
pub fn seed_configs() -> Vec<SourceConfig> {
    vec![
        SourceConfig::paginated_table(
            "ip3366",
            "https://www.ip3366.net/free/?page={page}",
            TableSelectors {
                container_row: "table.table tbody tr",
                ip_cell: "td:nth-child(1)",
                port_cell: "td:nth-child(2)",
                country_cell: None,
                anonymity_cell: Some("td:nth-child(3)"),
                protocol_cell: Some("td:nth-child(4)"),
                last_checked_cell: Some("td:nth-child(7)"),
                next_page: None,
            },
            3,
        ),
        SourceConfig::paginated_table(
            "freeproxylist",
            "https://free-proxy-list.net/?page={page}",
            TableSelectors {
                container_row: "table#proxylisttable tbody tr",
                ip_cell: "td:nth-child(1)",
                port_cell: "td:nth-child(2)",
                country_cell: Some("td:nth-child(3)"),
                anonymity_cell: Some("td:nth-child(5)"),
                protocol_cell: Some("td:nth-child(7)"),
                last_checked_cell: Some("td:nth-child(8)"),
                next_page: None,
            },
            2,
        ),
        SourceConfig::single_page_api(
            "proxydb",
            "https://proxydb.example.invalid/api/proxies.json",
            ApiFormat::Json,
        ),
        SourceConfig::single_page_api(
            "proxylistdownload",
            "https://www.proxy-list.download/api/v1/get?type=http",
            ApiFormat::Lines,
        ),
    ]
}

/// Builds the name → `Extractor` registry from a config list, skipping
/// disabled entries.
pub fn build_registry(configs: Vec<SourceConfig>) -> HashMap<String, Arc<dyn Extractor>> {
    let mut registry: HashMap<String, Arc<dyn Extractor>> = HashMap::new();
    for config in configs {
        if !config.enabled {
            continue;
        }
        let name = config.name.to_string();
        let extractor: Arc<dyn Extractor> = match &config.kind {
            SourceKind::Html { .. } => Arc::new(TableExtractor::new(config)),
            SourceKind::Api { .. } => Arc::new(ApiExtractor::new(config)),
        };
        registry.insert(name, extractor);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_configs_cover_the_bundled_source_names() {
        let names: Vec<&str> = seed_configs().iter().map(|c| c.name).collect();
        assert!(names.contains(&"ip3366"));
        assert!(names.contains(&"freeproxylist"));
        assert!(names.contains(&"proxydb"));
        assert!(names.contains(&"proxylistdownload"));
    }

    #[test]
    fn registry_builds_one_extractor_per_enabled_source() {
        let registry = build_registry(seed_configs());
        assert_eq!(registry.len(), 4);
        assert!(registry.contains_key("ip3366"));
    }

    #[test]
    fn disabled_sources_are_excluded_from_the_registry() {
        let mut configs = seed_configs();
        configs[0].enabled = false;
        let registry = build_registry(configs);
        assert_eq!(registry.len(), 3);
    }
}
