//! Engine configuration.
//!
//! One `EngineConfig` is built at session start and injected into the HTTP
//! client, the session caches and the fetchers. Defaults carry the design
//! constants; `with_*` methods override individual knobs.

use std::time::Duration;

/// Configuration for the dashboard engine.
///
/// # Example
///
/// ```
/// use washboard::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::default()
///     .with_base_url("https://api.example.com/laundry")
///     .with_request_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.list_ttl, Duration::from_secs(300));
/// ```
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub base_url: String,

    /// Per-request network timeout. A hit surfaces as `Error::Timeout`,
    /// distinct from a generic network error.
    pub request_timeout: Duration,

    /// TTL for paged list caches (customer pages, local search slices).
    pub list_ttl: Duration,

    /// TTL for fully-materialized collections used by reporting.
    pub report_ttl: Duration,

    /// Page cap for per-customer order lookups. The browsing surface never
    /// needs more than this; hitting the cap marks the drain truncated.
    pub order_lookup_max_pages: usize,

    /// Page cap for full-collection drains used by reporting.
    pub full_collection_max_pages: usize,

    /// Maximum materialized collection size the local-search fallback will
    /// scan. Above this bound the fetcher refuses with `Error::Config`
    /// instead of silently walking the whole collection.
    pub local_search_max_records: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            base_url: String::new(),
            request_timeout: Duration::from_secs(20),
            list_ttl: Duration::from_secs(300),
            report_ttl: Duration::from_secs(300),
            order_lookup_max_pages: 20,
            full_collection_max_pages: 200,
            local_search_max_records: 5_000,
        }
    }
}

impl EngineConfig {
    /// Set the API base URL. A trailing slash is stripped so URL joins stay
    /// predictable.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut url: String = base_url.into();
        while url.ends_with('/') {
            url.pop();
        }
        self.base_url = url;
        self
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the paged-list TTL.
    pub fn with_list_ttl(mut self, ttl: Duration) -> Self {
        self.list_ttl = ttl;
        self
    }

    /// Override the full-collection TTL.
    pub fn with_report_ttl(mut self, ttl: Duration) -> Self {
        self.report_ttl = ttl;
        self
    }

    /// Override the order-lookup page cap.
    pub fn with_order_lookup_max_pages(mut self, pages: usize) -> Self {
        self.order_lookup_max_pages = pages;
        self
    }

    /// Override the full-collection page cap.
    pub fn with_full_collection_max_pages(mut self, pages: usize) -> Self {
        self.full_collection_max_pages = pages;
        self
    }

    /// Override the local-search record bound.
    pub fn with_local_search_max_records(mut self, records: usize) -> Self {
        self.local_search_max_records = records;
        self
    }
}
