//! Typed per-source extractor configuration.
//!
//! Resolves the redesign flag in spec §9 ("polymorphic extractors via base
//! class + factory → interface + registry") concretely: every source is a
//! data value, not a bespoke Rust type. Adding a source means registering a
//! `SourceConfig`, never writing new extraction code.

use std::time::Duration;

/// CSS selectors for one HTML proxy-list table (spec §4.2).
#[derive(Debug, Clone)]
pub struct TableSelectors {
    pub container_row: &'static str,
    pub ip_cell: &'static str,
    pub port_cell: &'static str,
    pub country_cell: Option<&'static str>,
    pub anonymity_cell: Option<&'static str>,
    pub protocol_cell: Option<&'static str>,
    pub last_checked_cell: Option<&'static str>,
    pub next_page: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    /// A JSON array/object of proxy records.
    Json,
    /// Newline-delimited `ip:port` pairs.
    Lines,
}

#[derive(Debug, Clone)]
pub enum SourceKind {
    Html { selectors: TableSelectors },
    Api { format: ApiFormat },
}

/// Everything one extractor run needs, decoded once from the store's
/// `ProxySource.config` (`serde_json::Value`) into this typed shape (spec
/// §3's "dynamic config dicts → typed config structs" supplement).
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub name: &'static str,
    pub kind: SourceKind,
    /// `{page}` is substituted with the 1-based page number.
    pub url_template: String,
    pub max_pages: u32,
    pub rate_limit_delay: Duration,
    pub priority: u8,
    pub enabled: bool,
    pub crawl_interval: Duration,
}

impl SourceConfig {
    pub fn single_page_api(name: &'static str, url: impl Into<String>, format: ApiFormat) -> Self {
        SourceConfig {
            name,
            kind: SourceKind::Api { format },
            url_template: url.into(),
            max_pages: 1,
            rate_limit_delay: Duration::from_secs(1),
            priority: 5,
            enabled: true,
            crawl_interval: Duration::from_secs(3600),
        }
    }

    pub fn paginated_table(
        name: &'static str,
        url_template: impl Into<String>,
        selectors: TableSelectors,
        max_pages: u32,
    ) -> Self {
        SourceConfig {
            name,
            kind: SourceKind::Html { selectors },
            url_template: url_template.into(),
            max_pages,
            rate_limit_delay: Duration::from_millis(1500),
            priority: 5,
            enabled: true,
            crawl_interval: Duration::from_secs(3600),
        }
    }

    pub fn page_url(&self, page: u32) -> String {
        self.url_template.replace("{page}", &page.to_string())
    }
}
