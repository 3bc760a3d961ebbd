//! A single HTML-table extractor parameterized by `SourceConfig` (spec
//! §4.2's "HTML extractors") instead of one bespoke scraper per site.

use async_trait::async_trait;
use chrono::Utc;
use scraper::{Html, Selector};

use crate::fetcher::{FetchOptions, Fetcher};
use crate::sources::config::{SourceConfig, SourceKind, TableSelectors};
use crate::sources::{extract_country_code, normalize_anonymity, normalize_protocol, parse_ip_port, parse_relative_time};
use crate::sources::{Extractor, ExtractResult, ProxyData};

pub struct TableExtractor {
    config: SourceConfig,
}

impl TableExtractor {
    pub fn new(config: SourceConfig) -> Self {
        assert!(
            matches!(config.kind, SourceKind::Html { .. }),
            "TableExtractor requires a SourceConfig::Html kind"
        );
        TableExtractor { config }
    }

    fn selectors(&self) -> &TableSelectors {
        match &self.config.kind {
            SourceKind::Html { selectors } => selectors,
            SourceKind::Api { .. } => unreachable!("constructor asserts Html kind"),
        }
    }

    /// Parses one page's rows and, when `selectors.next_page` is set, reports
    /// whether the page's document still carries a next-page link (spec
    /// §4.2: selectors include a `next_page` that callers iterate against,
    /// distinct from pure `{page}` URL templating).
    fn parse_page(&self, body: &str, source_url: &str) -> (Vec<ProxyData>, bool) {
        let selectors = self.selectors();
        let document = Html::parse_document(body);
        let Ok(row_sel) = Selector::parse(selectors.container_row) else {
            return (Vec::new(), false);
        };
        let Ok(ip_sel) = Selector::parse(selectors.ip_cell) else {
            return (Vec::new(), false);
        };
        let Ok(port_sel) = Selector::parse(selectors.port_cell) else {
            return (Vec::new(), false);
        };

        let mut rows = Vec::new();
        let now = Utc::now();

        for row in document.select(&row_sel) {
            let ip_text = row.select(&ip_sel).next().map(|e| e.text().collect::<String>());
            let port_text = row.select(&port_sel).next().map(|e| e.text().collect::<String>());
            let (Some(ip_text), Some(port_text)) = (ip_text, port_text) else {
                continue;
            };
            let Some((ip, port)) = parse_ip_port(&ip_text, &port_text) else {
                log::debug!("skipping malformed row in {}: ip={:?} port={:?}", self.config.name, ip_text, port_text);
                continue;
            };

            let country = selectors
                .country_cell
                .and_then(|sel| Selector::parse(sel).ok())
                .and_then(|sel| row.select(&sel).next().map(|e| e.text().collect::<String>()))
                .and_then(|text| extract_country_code(&text));

            let anonymity = selectors
                .anonymity_cell
                .and_then(|sel| Selector::parse(sel).ok())
                .and_then(|sel| row.select(&sel).next().map(|e| e.text().collect::<String>()))
                .map(|text| normalize_anonymity(&text));

            let protocol = selectors
                .protocol_cell
                .and_then(|sel| Selector::parse(sel).ok())
                .and_then(|sel| row.select(&sel).next().map(|e| e.text().collect::<String>()))
                .and_then(|text| normalize_protocol(&text));

            let last_checked = selectors
                .last_checked_cell
                .and_then(|sel| Selector::parse(sel).ok())
                .and_then(|sel| row.select(&sel).next().map(|e| e.text().collect::<String>()))
                .map(|text| parse_relative_time(&text, now))
                .unwrap_or(now);

            rows.push(ProxyData {
                ip,
                port,
                protocol,
                anonymity,
                country,
                city: None,
                source: self.config.name.to_string(),
                source_url: source_url.to_string(),
                last_checked,
            });
        }

        let has_next = match selectors.next_page {
            Some(sel) => Selector::parse(sel)
                .map(|sel| document.select(&sel).next().is_some())
                .unwrap_or(false),
            None => true,
        };

        (rows, has_next)
    }
}

#[async_trait]
impl Extractor for TableExtractor {
    fn name(&self) -> &str {
        self.config.name
    }

    async fn extract(&self, fetcher: &Fetcher) -> ExtractResult {
        let mut all_rows = Vec::new();
        let mut any_page_succeeded = false;
        let mut last_error = None;

        for page in 1..=self.config.max_pages {
            let url = self.config.page_url(page);
            let opts = FetchOptions::default();
            let mut has_next = true;
            match fetcher.fetch(self.config.name, &url, &opts).await {
                Ok(outcome) => {
                    let body = String::from_utf8_lossy(&outcome.bytes);
                    let (rows, next) = self.parse_page(&body, &url);
                    has_next = next;
                    any_page_succeeded = true;
                    all_rows.extend(rows);
                }
                Err(e) => {
                    // A per-page failure is logged and the extractor moves on
                    // (spec §4.2): only total fetch failure marks success=false.
                    log::warn!("{} page {} failed: {}", self.config.name, page, e);
                    last_error = Some(e.to_string());
                }
            }
            // When the source config carries a `next_page` selector, stop as
            // soon as the page stops advertising a next link instead of
            // always walking to `max_pages` — selector-driven pagination,
            // distinct from pure `{page}` URL templating (spec §4.2).
            if !has_next {
                break;
            }
            if page < self.config.max_pages {
                tokio::time::sleep(self.config.rate_limit_delay).await;
            }
        }

        ExtractResult::from_rows(
            self.config.name,
            all_rows,
            any_page_succeeded,
            if any_page_succeeded { None } else { last_error },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::config::ApiFormat;

    fn selectors(next_page: Option<&'static str>) -> TableSelectors {
        TableSelectors {
            container_row: "tr.row",
            ip_cell: "td.ip",
            port_cell: "td.port",
            country_cell: None,
            anonymity_cell: None,
            protocol_cell: None,
            last_checked_cell: None,
            next_page,
        }
    }

    fn table_config(next_page: Option<&'static str>) -> SourceConfig {
        SourceConfig::paginated_table("test-source", "https://example.invalid/?page={page}", selectors(next_page), 5)
    }

    #[test]
    fn parse_page_reports_next_page_present() {
        let extractor = TableExtractor::new(table_config(Some("a.next")));
        let body = r#"<table>
            <tr class="row"><td class="ip">1.2.3.4</td><td class="port">8080</td></tr>
        </table>
        <a class="next" href="?page=2">Next</a>"#;
        let (rows, has_next) = extractor.parse_page(body, "https://example.invalid/?page=1");
        assert_eq!(rows.len(), 1);
        assert!(has_next);
    }

    #[test]
    fn parse_page_reports_no_next_page_when_selector_absent() {
        let extractor = TableExtractor::new(table_config(Some("a.next")));
        let body = r#"<table>
            <tr class="row"><td class="ip">1.2.3.4</td><td class="port">8080</td></tr>
        </table>"#;
        let (rows, has_next) = extractor.parse_page(body, "https://example.invalid/?page=1");
        assert_eq!(rows.len(), 1);
        assert!(!has_next);
    }

    #[test]
    fn parse_page_without_next_page_selector_always_continues() {
        let extractor = TableExtractor::new(table_config(None));
        let body = r#"<table>
            <tr class="row"><td class="ip">1.2.3.4</td><td class="port">8080</td></tr>
        </table>"#;
        let (_rows, has_next) = extractor.parse_page(body, "https://example.invalid/?page=1");
        assert!(has_next);
    }

    #[test]
    #[should_panic(expected = "TableExtractor requires a SourceConfig::Html kind")]
    fn new_rejects_api_config() {
        let api_config = SourceConfig::single_page_api("bad", "https://example.invalid/api", ApiFormat::Json);
        let _ = TableExtractor::new(api_config);
    }
}
