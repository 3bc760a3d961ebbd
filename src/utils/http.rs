//! Shared HTTP client plumbing: a single reusable `hyper_util` client plus a
//! pool of realistic browser header bundles used by the fetcher and the
//! lightweight external-IP/judge lookups in `geo.rs`.

use hyper::header::{HeaderName, HeaderValue};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use rand::thread_rng;

pub type HyperClient = Client<HttpsConnector<HttpConnector>, http_body_util::Empty<bytes::Bytes>>;

lazy_static! {
    static ref SHARED_CLIENT: HyperClient = {
        let https = HttpsConnector::new();
        Client::builder(hyper_util::rt::TokioExecutor::new()).build(https)
    };
}

/// Returns the process-wide hyper client, built once and cloned cheaply
/// (hyper_util clients are `Clone` handles around a shared pool).
pub fn hyper_client() -> HyperClient {
    SHARED_CLIENT.clone()
}

/// One realistic browser header bundle: a user-agent paired with the
/// `Accept`/`Accept-Language`/`sec-fetch-*` values a browser actually sends
/// alongside it (spec §4.1's header pool).
pub struct HeaderBundle {
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: &'static str,
    pub sec_fetch_dest: &'static str,
    pub sec_fetch_mode: &'static str,
    pub sec_fetch_site: &'static str,
}

const HEADER_POOL: &[HeaderBundle] = &[
    HeaderBundle {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        sec_fetch_dest: "document",
        sec_fetch_mode: "navigate",
        sec_fetch_site: "none",
    },
    HeaderBundle {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        sec_fetch_dest: "document",
        sec_fetch_mode: "navigate",
        sec_fetch_site: "none",
    },
    HeaderBundle {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.5",
        sec_fetch_dest: "document",
        sec_fetch_mode: "navigate",
        sec_fetch_site: "same-origin",
    },
    HeaderBundle {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-GB,en;q=0.5",
        sec_fetch_dest: "document",
        sec_fetch_mode: "navigate",
        sec_fetch_site: "cross-site",
    },
    HeaderBundle {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        sec_fetch_dest: "document",
        sec_fetch_mode: "navigate",
        sec_fetch_site: "same-origin",
    },
    HeaderBundle {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edg/124.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        sec_fetch_dest: "document",
        sec_fetch_mode: "navigate",
        sec_fetch_site: "none",
    },
];

/// Picks a random user-agent string from the header pool.
pub fn random_useragent() -> &'static str {
    HEADER_POOL
        .choose(&mut thread_rng())
        .map(|b| b.user_agent)
        .unwrap_or(HEADER_POOL[0].user_agent)
}

/// Picks a random full header bundle from the pool.
pub fn random_header_bundle() -> &'static HeaderBundle {
    HEADER_POOL.choose(&mut thread_rng()).unwrap_or(&HEADER_POOL[0])
}

/// Applies a header bundle's `Accept`/`Accept-Language`/`User-Agent`/
/// `sec-fetch-*` fields to a request builder, skipping any header that fails
/// to parse as an HTTP header value (never a panic path).
pub fn apply_header_bundle(
    mut builder: hyper::http::request::Builder,
    bundle: &HeaderBundle,
) -> hyper::http::request::Builder {
    for (name, value) in [
        ("user-agent", bundle.user_agent),
        ("accept", bundle.accept),
        ("accept-language", bundle.accept_language),
        ("sec-fetch-dest", bundle.sec_fetch_dest),
        ("sec-fetch-mode", bundle.sec_fetch_mode),
        ("sec-fetch-site", bundle.sec_fetch_site),
    ] {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pool_is_non_empty_and_random_pick_is_valid() {
        assert!(!HEADER_POOL.is_empty());
        let ua = random_useragent();
        assert!(HEADER_POOL.iter().any(|b| b.user_agent == ua));
    }

    #[test]
    fn client_can_be_constructed_repeatedly() {
        let _a = hyper_client();
        let _b = hyper_client();
    }
}
