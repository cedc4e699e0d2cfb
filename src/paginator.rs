//! Cursor-chain pagination over the collection endpoints.
//!
//! Each page response carries a `next` link; [`drain`] follows the chain
//! until it is exhausted or a page cap is hit, yielding a flat ordered
//! sequence of raw records. Pages within one drain are strictly sequential
//! (each cursor comes from the previous page); independent drains for
//! different collections run concurrently with no coordination.

use crate::error::Result;
use crate::http::ApiClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire shape of one paginated page. Field names are bit-exact: the
/// paginator depends on `results` and `next`; the totals are whatever the
/// backend's paginator chose to report.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageEnvelope {
    #[serde(default)]
    pub results: Option<Value>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u64>,
    #[serde(default)]
    pub page_size: Option<u64>,
}

impl PageEnvelope {
    /// Reported total, from whichever field the backend populated.
    ///
    /// `None` means "unknown total": the UI degrades to "at least N items"
    /// rather than failing.
    pub fn total(&self) -> Option<u64> {
        self.count.or(self.total_items)
    }

    /// The page's record rows, if `results` is present and an array.
    fn take_rows(&mut self) -> Option<Vec<Value>> {
        match self.results.take() {
            Some(Value::Array(rows)) => Some(rows),
            _ => None,
        }
    }
}

/// Pagination state exposed to the UI shell.
///
/// Always derived from the server's reported totals when available; only the
/// local-filter fallback computes it from a slice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub current_page: u64,
    pub page_size: u64,
    pub total_items: Option<u64>,
    pub total_pages: Option<u64>,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PaginationState {
    /// Derive state from a server page envelope.
    pub fn from_envelope(envelope: &PageEnvelope, requested_page: u64, requested_size: u64) -> Self {
        let page_size = envelope.page_size.unwrap_or(requested_size).max(1);
        let total_items = envelope.total();
        let total_pages = envelope
            .total_pages
            .or_else(|| total_items.map(|t| t.div_ceil(page_size).max(1)));

        PaginationState {
            current_page: envelope.current_page.unwrap_or(requested_page),
            page_size,
            total_items,
            total_pages,
            has_next: envelope.next.is_some(),
            has_previous: envelope.previous.is_some(),
        }
    }

    /// Derive state for a locally-filtered slice of a materialized
    /// collection. Same semantics as the server-derived state.
    pub fn local(page: u64, page_size: u64, filtered_len: usize) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total_items = filtered_len as u64;
        let total_pages = total_items.div_ceil(page_size).max(1);

        PaginationState {
            current_page: page,
            page_size,
            total_items: Some(total_items),
            total_pages: Some(total_pages),
            has_next: page < total_pages,
            has_previous: page > 1,
        }
    }
}

/// Result of walking a cursor chain.
#[derive(Clone, Debug, Default)]
pub struct Drain {
    /// Records from every fetched page, in page order.
    pub records: Vec<Value>,
    /// True when the walk stopped before exhaustion: page cap reached or a
    /// malformed page encountered.
    pub truncated: bool,
}

/// Follow a `next`-cursor chain from `start_url`, accumulating records.
///
/// Stops when no next link remains, or at `max_pages` (truncated). A
/// malformed page (missing or non-array `results`) is a partial success: the
/// drain truncates and returns what was accumulated, so callers can render
/// partial data with a warning instead of a blank screen.
///
/// # Errors
///
/// Page fetch failures (network, timeout, 401) abort the drain and
/// propagate; nothing accumulated so far is returned with them. Callers that
/// require completeness (report aggregation) fail; callers that tolerate
/// partial views retry or fall back to stale cache.
pub async fn drain(client: &dyn ApiClient, start_url: &str, max_pages: usize) -> Result<Drain> {
    let mut records = Vec::new();
    let mut next = Some(start_url.to_string());
    let mut pages = 0usize;

    while let Some(url) = next {
        if pages >= max_pages {
            debug!("Drain hit page cap ({}) at {}", max_pages, url);
            return Ok(Drain {
                records,
                truncated: true,
            });
        }

        let body = client.get_json(&url).await?;
        let mut envelope: PageEnvelope = match serde_json::from_value(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("⚠ Malformed page at {} ({}), truncating drain", url, e);
                return Ok(Drain {
                    records,
                    truncated: true,
                });
            }
        };

        match envelope.take_rows() {
            Some(rows) => records.extend(rows),
            None => {
                warn!("⚠ Page at {} has no result array, truncating drain", url);
                return Ok(Drain {
                    records,
                    truncated: true,
                });
            }
        }

        pages += 1;
        next = envelope.next;
    }

    debug!("✓ Drain complete: {} records over {} pages", records.len(), pages);
    Ok(Drain {
        records,
        truncated: false,
    })
}

/// Fetch a single page and return its envelope.
///
/// Used by the paged fetchers, which do not walk the chain.
pub async fn fetch_page(client: &dyn ApiClient, url: &str) -> Result<PageEnvelope> {
    let body = client.get_json(url).await?;
    let envelope: PageEnvelope = serde_json::from_value(body)
        .map_err(|e| crate::error::Error::MalformedResponse(format!("{} at {}", e, url)))?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockApi;
    use serde_json::json;

    fn three_page_mock() -> MockApi {
        let api = MockApi::new();
        api.route(
            "https://t/orders/",
            json!({
                "results": [{"n": 1}, {"n": 2}],
                "next": "https://t/orders/?page=2",
                "previous": null,
                "count": 5
            }),
        );
        api.route(
            "https://t/orders/?page=2",
            json!({
                "results": [{"n": 3}, {"n": 4}],
                "next": "https://t/orders/?page=3",
                "previous": "https://t/orders/",
                "count": 5
            }),
        );
        api.route(
            "https://t/orders/?page=3",
            json!({
                "results": [{"n": 5}],
                "next": null,
                "previous": "https://t/orders/?page=2",
                "count": 5
            }),
        );
        api
    }

    #[tokio::test]
    async fn test_drain_complete_in_page_order() {
        let api = three_page_mock();

        let drained = drain(&api, "https://t/orders/", 20)
            .await
            .expect("Failed to drain");

        assert!(!drained.truncated);
        let ns: Vec<i64> = drained
            .records
            .iter()
            .map(|r| r["n"].as_i64().expect("Missing n"))
            .collect();
        assert_eq!(ns, vec![1, 2, 3, 4, 5]);
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_drain_respects_page_cap() {
        let api = three_page_mock();

        let drained = drain(&api, "https://t/orders/", 2)
            .await
            .expect("Failed to drain");

        assert!(drained.truncated);
        assert_eq!(drained.records.len(), 4);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_drain_truncates_on_malformed_page() {
        let api = MockApi::new();
        api.route(
            "https://t/orders/",
            json!({"results": [{"n": 1}], "next": "https://t/orders/?page=2"}),
        );
        // Second page is missing its result array.
        api.route("https://t/orders/?page=2", json!({"detail": "oops"}));

        let drained = drain(&api, "https://t/orders/", 20)
            .await
            .expect("Failed to drain");

        assert!(drained.truncated);
        assert_eq!(drained.records.len(), 1);
    }

    #[tokio::test]
    async fn test_drain_propagates_transport_errors() {
        let api = MockApi::new();
        api.route(
            "https://t/orders/",
            json!({"results": [{"n": 1}], "next": "https://t/orders/?page=2"}),
        );
        api.fail(
            "https://t/orders/?page=2",
            crate::error::Error::Timeout("injected".to_string()),
        );

        let result = drain(&api, "https://t/orders/", 20).await;
        assert!(matches!(result, Err(crate::error::Error::Timeout(_))));
    }

    #[test]
    fn test_pagination_state_from_envelope_totals() {
        let envelope: PageEnvelope = serde_json::from_value(json!({
            "results": [],
            "next": "https://t/x?page=3",
            "previous": "https://t/x?page=1",
            "total_items": 95,
            "total_pages": 4,
            "current_page": 2,
            "page_size": 25
        }))
        .expect("Failed to decode envelope");

        let state = PaginationState::from_envelope(&envelope, 2, 25);
        assert_eq!(state.total_items, Some(95));
        assert_eq!(state.total_pages, Some(4));
        assert!(state.has_next);
        assert!(state.has_previous);
    }

    #[test]
    fn test_pagination_state_unknown_total_degrades() {
        let envelope: PageEnvelope = serde_json::from_value(json!({
            "results": [{"n": 1}],
            "next": "https://t/x?page=2",
            "previous": null
        }))
        .expect("Failed to decode envelope");

        let state = PaginationState::from_envelope(&envelope, 1, 25);
        // Neither count nor total_items: unknown total, but paging still works.
        assert_eq!(state.total_items, None);
        assert_eq!(state.total_pages, None);
        assert!(state.has_next);
        assert!(!state.has_previous);
    }

    #[test]
    fn test_pagination_state_total_pages_derived_from_count() {
        let envelope: PageEnvelope = serde_json::from_value(json!({
            "results": [],
            "next": null,
            "previous": null,
            "count": 51
        }))
        .expect("Failed to decode envelope");

        let state = PaginationState::from_envelope(&envelope, 1, 25);
        assert_eq!(state.total_pages, Some(3));
    }

    #[test]
    fn test_local_pagination_state() {
        let state = PaginationState::local(2, 10, 25);
        assert_eq!(state.total_pages, Some(3));
        assert!(state.has_next);
        assert!(state.has_previous);

        let last = PaginationState::local(3, 10, 25);
        assert!(!last.has_next);

        let empty = PaginationState::local(1, 10, 0);
        assert_eq!(state.total_items, Some(25));
        assert_eq!(empty.total_pages, Some(1));
        assert!(!empty.has_next);
    }
}
