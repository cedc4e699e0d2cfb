//! Cached collection fetchers.
//!
//! One fetch path per collection, each a read-through against the session
//! caches: on a miss the fetcher drains or pages the REST endpoint, decodes
//! rows into typed records, and stores the result under a normalized key.
//! When a refresh fails and an expired entry is still around, the fetcher
//! serves it stale with the failure attached as a notice, so the dashboard
//! degrades instead of blanking.

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::http::ApiClient;
use crate::model::{self, Customer, Expense, HotelExpense, HotelOrder, Order};
use crate::paginator::{self, PaginationState};
use std::future::Future;
use std::sync::Arc;

/// One page of typed records plus the UI pagination state.
#[derive(Clone, Debug)]
pub struct CollectionPage<T> {
    pub records: Vec<T>,
    pub pagination: PaginationState,
    /// True when the underlying drain stopped at a page cap or a malformed
    /// page.
    pub truncated: bool,
    /// True when this is expired data served because a refresh failed.
    pub stale: bool,
    /// The refresh failure, when `stale` is set.
    pub notice: Option<Error>,
}

/// A fully-materialized collection as stored in cache.
#[derive(Clone, Debug, Default)]
pub struct Drained<T> {
    pub records: Vec<T>,
    pub truncated: bool,
}

/// A materialized collection as handed to callers, with staleness attached.
#[derive(Clone, Debug)]
pub struct Snapshot<T> {
    pub records: Vec<T>,
    pub truncated: bool,
    pub stale: bool,
    pub notice: Option<Error>,
}

impl<T> Snapshot<T> {
    fn fresh(drained: Drained<T>) -> Self {
        Snapshot {
            records: drained.records,
            truncated: drained.truncated,
            stale: false,
            notice: None,
        }
    }

    fn stale(drained: Drained<T>, notice: Error) -> Self {
        Snapshot {
            records: drained.records,
            truncated: drained.truncated,
            stale: true,
            notice: Some(notice),
        }
    }
}

/// The session-scoped cache set, one `TtlCache` per cache class.
///
/// Shared via `Arc` between the fetcher and the mutation coordinator so
/// invalidation and read-through always see the same entries.
pub struct SessionCaches {
    pub customer_pages: TtlCache<CollectionPage<Customer>>,
    pub customers_all: TtlCache<Drained<Customer>>,
    pub orders_by_customer: TtlCache<Drained<Order>>,
    pub orders_all: TtlCache<Drained<Order>>,
    pub expenses_all: TtlCache<Drained<Expense>>,
    pub hotel_orders_all: TtlCache<Drained<HotelOrder>>,
    pub hotel_expenses_all: TtlCache<Drained<HotelExpense>>,
}

impl SessionCaches {
    pub fn new(config: &EngineConfig) -> Self {
        SessionCaches {
            customer_pages: TtlCache::new("customer_pages", config.list_ttl),
            customers_all: TtlCache::new("customers", config.report_ttl),
            orders_by_customer: TtlCache::new("customer_orders", config.list_ttl),
            orders_all: TtlCache::new("orders", config.report_ttl),
            expenses_all: TtlCache::new("expenses", config.report_ttl),
            hotel_orders_all: TtlCache::new("hotel_orders", config.report_ttl),
            hotel_expenses_all: TtlCache::new("hotel_expenses", config.report_ttl),
        }
    }

    /// Drop everything derived from the customer collection.
    pub fn invalidate_customers(&self) {
        self.customer_pages.invalidate_all();
        self.customers_all.invalidate_all();
    }

    /// Drop everything derived from the order collection.
    pub fn invalidate_orders(&self) {
        self.orders_all.invalidate_all();
        self.orders_by_customer.invalidate_all();
    }

    /// Drop one customer's order lookup along with the shared order caches.
    pub fn invalidate_orders_for(&self, customer_id: u64) {
        self.orders_by_customer
            .invalidate(&customer_orders_key(customer_id));
        self.orders_all.invalidate_all();
    }

    pub fn invalidate_expenses(&self) {
        self.expenses_all.invalidate_all();
    }

    pub fn invalidate_hotel_orders(&self) {
        self.hotel_orders_all.invalidate_all();
    }

    pub fn invalidate_hotel_expenses(&self) {
        self.hotel_expenses_all.invalidate_all();
    }

    /// Nuke the whole session. Used on logout and token change.
    pub fn invalidate_everything(&self) {
        self.invalidate_customers();
        self.invalidate_orders();
        self.invalidate_expenses();
        self.invalidate_hotel_orders();
        self.invalidate_hotel_expenses();
    }
}

fn customer_page_key(page: u64, page_size: u64) -> String {
    format!("customers:page:{}:size:{}", page, page_size)
}

fn customer_orders_key(customer_id: u64) -> String {
    format!("orders:customer:{}", customer_id)
}

/// Normalize a search term for keying and matching: trim plus lowercase, so
/// "  Wanjiku " and "wanjiku" share a cache entry.
fn normalize_search(search: &str) -> String {
    search.trim().to_lowercase()
}

/// Read-through with stale fallback.
///
/// Transient failures (network, timeout) fall back to the last good entry
/// when one exists. Auth and config failures propagate: stale data must not
/// mask an expired session.
async fn populate_or_stale<T, F, Fut>(
    cache: &TtlCache<T>,
    key: &str,
    force_refresh: bool,
    populate: F,
) -> Result<(T, Option<Error>)>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match cache.get_or_populate(key, populate, force_refresh).await {
        Ok(value) => Ok((value, None)),
        Err(error @ (Error::Network(_) | Error::Timeout(_))) => match cache.get_stale(key) {
            Some(entry) => {
                warn!("⚠ Refresh of {} failed ({}), serving stale entry", key, error);
                Ok((entry.data, Some(error)))
            }
            None => Err(error),
        },
        Err(error) => Err(error),
    }
}

/// Cached fetch paths for every collection the dashboard reads.
///
/// Generic over the transport so tests run against [`crate::MockApi`].
/// `Clone` is cheap: the client, caches and config are shared.
pub struct CollectionFetcher<C: ApiClient> {
    client: Arc<C>,
    caches: Arc<SessionCaches>,
    config: EngineConfig,
}

impl<C: ApiClient> Clone for CollectionFetcher<C> {
    fn clone(&self) -> Self {
        CollectionFetcher {
            client: Arc::clone(&self.client),
            caches: Arc::clone(&self.caches),
            config: self.config.clone(),
        }
    }
}

impl<C: ApiClient> CollectionFetcher<C> {
    pub fn new(client: Arc<C>, caches: Arc<SessionCaches>, config: EngineConfig) -> Self {
        CollectionFetcher {
            client,
            caches,
            config,
        }
    }

    /// The session caches, for wiring up the mutation coordinator.
    pub fn caches(&self) -> Arc<SessionCaches> {
        Arc::clone(&self.caches)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One page of the customer list.
    ///
    /// With an empty search term this is a direct server page. A non-empty
    /// term switches to the local-filter fallback: the materialized customer
    /// collection is filtered by name and phone, then sliced, because the
    /// backend list endpoint has no search parameter.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a search is requested but the customer
    /// collection exceeds `local_search_max_records`.
    pub async fn fetch_customers_page(
        &self,
        page: u64,
        page_size: u64,
        search: &str,
        force_refresh: bool,
    ) -> Result<CollectionPage<Customer>> {
        let term = normalize_search(search);
        if !term.is_empty() {
            return self
                .search_customers_locally(page, page_size, &term, force_refresh)
                .await;
        }

        let key = customer_page_key(page, page_size);
        let url = format!(
            "{}/customers/?page={}&page_size={}",
            self.config.base_url, page, page_size
        );
        let client = Arc::clone(&self.client);

        let (mut result, notice) = populate_or_stale(
            &self.caches.customer_pages,
            &key,
            force_refresh,
            move || async move {
                let mut envelope = paginator::fetch_page(client.as_ref(), &url).await?;
                let pagination = PaginationState::from_envelope(&envelope, page, page_size);
                let rows = match envelope.results.take() {
                    Some(serde_json::Value::Array(rows)) => rows,
                    _ => Vec::new(),
                };
                Ok(CollectionPage {
                    records: model::decode_records(rows),
                    pagination,
                    truncated: false,
                    stale: false,
                    notice: None,
                })
            },
        )
        .await?;

        if let Some(notice) = notice {
            result.stale = true;
            result.notice = Some(notice);
        }
        Ok(result)
    }

    async fn search_customers_locally(
        &self,
        page: u64,
        page_size: u64,
        term: &str,
        force_refresh: bool,
    ) -> Result<CollectionPage<Customer>> {
        let all = self.fetch_all_customers(force_refresh).await?;

        if all.records.len() > self.config.local_search_max_records {
            return Err(Error::Config(format!(
                "customer collection has {} records, above the local search bound of {}",
                all.records.len(),
                self.config.local_search_max_records
            )));
        }

        let matched: Vec<Customer> = all
            .records
            .into_iter()
            .filter(|c| {
                c.name.to_lowercase().contains(term) || c.phone.to_lowercase().contains(term)
            })
            .collect();

        let pagination = PaginationState::local(page, page_size, matched.len());
        let start = ((pagination.current_page - 1) * pagination.page_size) as usize;
        let records: Vec<Customer> = matched
            .into_iter()
            .skip(start)
            .take(pagination.page_size as usize)
            .collect();

        debug!(
            "✓ Local search {:?} -> {} records on page {}",
            term,
            records.len(),
            pagination.current_page
        );
        Ok(CollectionPage {
            records,
            pagination,
            truncated: all.truncated,
            stale: all.stale,
            notice: all.notice,
        })
    }

    /// The fully-materialized customer collection.
    pub async fn fetch_all_customers(&self, force_refresh: bool) -> Result<Snapshot<Customer>> {
        let url = format!("{}/customers/", self.config.base_url);
        self.drain_cached(&self.caches.customers_all, "customers:all", url, force_refresh)
            .await
    }

    /// All orders for one customer, drained under the lookup page cap.
    pub async fn fetch_customer_orders(
        &self,
        customer_id: u64,
        force_refresh: bool,
    ) -> Result<Snapshot<Order>> {
        let key = customer_orders_key(customer_id);
        let url = format!("{}/orders/?customer={}", self.config.base_url, customer_id);
        let client = Arc::clone(&self.client);
        let max_pages = self.config.order_lookup_max_pages;

        let (drained, notice) = populate_or_stale(
            &self.caches.orders_by_customer,
            &key,
            force_refresh,
            move || async move {
                let drain = paginator::drain(client.as_ref(), &url, max_pages).await?;
                Ok(Drained {
                    records: model::decode_records(drain.records),
                    truncated: drain.truncated,
                })
            },
        )
        .await?;

        Ok(match notice {
            Some(notice) => Snapshot::stale(drained, notice),
            None => Snapshot::fresh(drained),
        })
    }

    /// The fully-materialized order collection.
    pub async fn fetch_all_orders(&self, force_refresh: bool) -> Result<Snapshot<Order>> {
        let url = format!("{}/orders/", self.config.base_url);
        self.drain_cached(&self.caches.orders_all, "orders:all", url, force_refresh)
            .await
    }

    /// The laundry expense ledger.
    pub async fn fetch_all_expenses(&self, force_refresh: bool) -> Result<Snapshot<Expense>> {
        let url = format!("{}/expense-records/", self.config.base_url);
        self.drain_cached(&self.caches.expenses_all, "expenses:all", url, force_refresh)
            .await
    }

    /// The hotel order collection.
    pub async fn fetch_all_hotel_orders(
        &self,
        force_refresh: bool,
    ) -> Result<Snapshot<HotelOrder>> {
        let url = format!("{}/hotel/orders/", self.config.base_url);
        self.drain_cached(
            &self.caches.hotel_orders_all,
            "hotel_orders:all",
            url,
            force_refresh,
        )
        .await
    }

    /// The hotel expense ledger.
    pub async fn fetch_all_hotel_expenses(
        &self,
        force_refresh: bool,
    ) -> Result<Snapshot<HotelExpense>> {
        let url = format!("{}/hotel/Hotelexpense-records/", self.config.base_url);
        self.drain_cached(
            &self.caches.hotel_expenses_all,
            "hotel_expenses:all",
            url,
            force_refresh,
        )
        .await
    }

    async fn drain_cached<T>(
        &self,
        cache: &TtlCache<Drained<T>>,
        key: &str,
        url: String,
        force_refresh: bool,
    ) -> Result<Snapshot<T>>
    where
        T: serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let client = Arc::clone(&self.client);
        let max_pages = self.config.full_collection_max_pages;

        let (drained, notice) = populate_or_stale(cache, key, force_refresh, move || async move {
            let drain = paginator::drain(client.as_ref(), &url, max_pages).await?;
            Ok(Drained {
                records: model::decode_records(drain.records),
                truncated: drain.truncated,
            })
        })
        .await?;

        Ok(match notice {
            Some(notice) => Snapshot::stale(drained, notice),
            None => Snapshot::fresh(drained),
        })
    }
}
